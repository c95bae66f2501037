//! Brain server binary: tenant-scoped chat, booking and inventory HTTP
//! endpoints backed by SQLite.

use std::path::PathBuf;
use std::sync::Arc;

use atrium_kiosk::store::BookingStore;
use atrium_kiosk::{KioskConfig, server};
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("atrium_kiosk=info"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to a daily-rolling file when ATRIUM_LOG_DIR is set, else stdout.
    // The guard must outlive main or buffered lines are lost on exit.
    let _appender_guard = match std::env::var("ATRIUM_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "atrium-brain.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_writer(writer)
                .with_ansi(false)
                .with_env_filter(env_filter())
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt().with_env_filter(env_filter()).init();
            None
        }
    };

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = KioskConfig::load(config_path.as_deref())?;

    let store = Arc::new(BookingStore::open(&config.server.db_path)?);
    store.seed_demo()?;

    tokio::select! {
        result = server::run_server(&config, store) => {
            result.map_err(|e| {
                tracing::error!(error = %e, "brain server failed");
                anyhow::anyhow!("brain server failed: {e}")
            })?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    tracing::info!("brain shut down cleanly");
    Ok(())
}

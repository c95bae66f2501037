//! Kiosk front runtime binary.
//!
//! Composes the full voice pipeline and runs until ctrl-c. The screen
//! process connects over the external-intent channel and the event
//! broadcast; the platform voice engine is wired at this composition
//! root. Until a platform voice is integrated, a tone placeholder keeps
//! the pipeline audible end to end.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use atrium_kiosk::coordinator::ExternalIntent;
use atrium_kiosk::tts::{TtsEngine, Voice, VoiceQuality};
use atrium_kiosk::{KioskConfig, KioskCoordinator};
use tokio::sync::mpsc;

/// Bring-up placeholder voice: a short tone per utterance, long enough to
/// exercise barge-in and playback teardown.
struct ToneEngine {
    sample_rate: u32,
}

#[async_trait]
impl TtsEngine for ToneEngine {
    fn voices(&self) -> Vec<Voice> {
        vec![Voice {
            id: "tone".to_owned(),
            name: "Bring-up tone".to_owned(),
            lang: "en-US".to_owned(),
            quality: VoiceQuality::Normal,
        }]
    }

    async fn synthesize(
        &self,
        _voice: &Voice,
        text: &str,
    ) -> atrium_kiosk::Result<Vec<f32>> {
        // ~60ms of tone per word, 440Hz, quiet.
        let words = text.split_whitespace().count().max(1);
        let len = (self.sample_rate as usize * 60 / 1000) * words;
        let samples = (0..len)
            .map(|i| {
                let t = i as f32 / self.sample_rate as f32;
                (t * 440.0 * std::f32::consts::TAU).sin() * 0.1
            })
            .collect();
        Ok(samples)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("atrium_kiosk=info")),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = KioskConfig::load(config_path.as_deref())?;

    let engine = Arc::new(ToneEngine {
        sample_rate: config.tts.sample_rate,
    });

    // The screen process holds the sender; it stays open for the lifetime
    // of the kiosk even when no hardware is attached yet.
    let (_external_tx, external_rx) = mpsc::channel::<ExternalIntent>(16);

    let coordinator =
        KioskCoordinator::new(config, engine).with_external_intents(external_rx);
    let cancel = coordinator.cancel_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            cancel.cancel();
        }
    });

    coordinator.run().await.map_err(|e| {
        tracing::error!(error = %e, "kiosk runtime failed");
        anyhow::anyhow!("kiosk runtime failed: {e}")
    })?;

    tracing::info!("kiosk shut down cleanly");
    Ok(())
}

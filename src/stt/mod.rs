//! Streaming speech-to-text providers.
//!
//! Two providers share one event surface: the websocket relay (the server
//! side holds the vendor credential) and the on-device fallback
//! recognizer. The voice runtime switches between them without caring
//! which is live.

pub mod fallback;
pub mod relay;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SttProvider;
use crate::error::Result;

/// Events emitted by an active STT session.
#[derive(Debug, Clone, PartialEq)]
pub enum SttEvent {
    /// The provider detected the start of speech.
    SpeechStarted,
    /// A partial hypothesis for the current utterance.
    Interim { text: String },
    /// The utterance is complete.
    EndOfTurn { text: String, confidence: f32 },
    /// The session failed; the provider is unusable until reconnected.
    Error { message: String },
}

/// Channel capacity for outbound audio frames.
const FRAME_CHANNEL_SIZE: usize = 64;

/// Channel capacity for inbound STT events.
const EVENT_CHANNEL_SIZE: usize = 32;

/// Handle to one live STT session.
pub struct SttSession {
    frames: mpsc::Sender<Vec<i16>>,
    pub events: mpsc::Receiver<SttEvent>,
    cancel: CancellationToken,
}

impl SttSession {
    /// Assemble a session handle from its channel halves.
    pub(crate) fn new(
        frames: mpsc::Sender<Vec<i16>>,
        events: mpsc::Receiver<SttEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            frames,
            events,
            cancel,
        }
    }

    /// Forward one audio frame. Never blocks: a full channel drops the
    /// frame — audio pacing beats completeness for streaming STT.
    pub fn send_frame(&self, samples: Vec<i16>) {
        if let Err(e) = self.frames.try_send(samples) {
            debug!("dropping audio frame: {e}");
        }
    }

    /// Tear the session down without a closing handshake.
    ///
    /// Cancels the driver task, which detaches its handlers, swallows any
    /// terminal socket error and drops the connection cold. Orphaned
    /// handlers on a half-closed socket have bitten before; nothing here
    /// waits for the peer.
    pub fn close(self) {
        self.cancel.cancel();
    }
}

impl Drop for SttSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A provider able to open STT sessions.
#[async_trait]
pub trait SttConnector: Send + Sync {
    /// Open a session carrying audio at `sample_rate`.
    async fn connect(&self, sample_rate: u32) -> Result<SttSession>;

    /// Which provider this connector drives.
    fn provider(&self) -> SttProvider;
}

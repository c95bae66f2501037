//! On-device fallback recognizer adapter.
//!
//! The platform recognizer (OS speech services) is injected behind the
//! [`Recognizer`] trait; this adapter turns its quirks into the common
//! [`SttEvent`] surface. Platform engines end runs on their own schedule
//! and deliver finals in fragments, so the adapter restarts runs
//! transparently while the session is alive and coalesces consecutive
//! finals inside a short grace window.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{EVENT_CHANNEL_SIZE, FRAME_CHANNEL_SIZE, SttConnector, SttEvent, SttSession};
use crate::config::{SttConfig, SttProvider};
use crate::error::Result;

/// Events produced by a platform recognizer run.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// The engine heard speech begin.
    SpeechStart,
    /// A partial hypothesis.
    Partial(String),
    /// A final fragment. Engines may deliver several per utterance.
    Final { text: String, confidence: f32 },
    /// The run ended — spontaneously or because `stop` was called.
    End,
    /// An engine error, verbatim (e.g. `no-speech`, `aborted`).
    Error(String),
}

/// A continuous platform speech recognizer.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Begin one recognition run, emitting events until it ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot start at all.
    async fn start(&self, events: mpsc::Sender<RecognizerEvent>) -> Result<()>;

    /// End the current run. The engine emits [`RecognizerEvent::End`].
    async fn stop(&self);
}

/// Engine error codes that are routine, not failures.
const BENIGN_ERRORS: [&str; 2] = ["no-speech", "aborted"];

/// STT via the injected platform recognizer.
pub struct FallbackStt {
    engine: Arc<dyn Recognizer>,
    final_debounce: Duration,
}

impl FallbackStt {
    pub fn new(config: &SttConfig, engine: Arc<dyn Recognizer>) -> Self {
        Self {
            engine,
            final_debounce: Duration::from_millis(config.final_debounce_ms),
        }
    }
}

#[async_trait]
impl SttConnector for FallbackStt {
    async fn connect(&self, _sample_rate: u32) -> Result<SttSession> {
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_SIZE);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        tokio::spawn(drive(
            Arc::clone(&self.engine),
            frames_rx,
            events_tx,
            cancel.clone(),
            self.final_debounce,
        ));

        Ok(SttSession::new(frames_tx, events_rx, cancel))
    }

    fn provider(&self) -> SttProvider {
        SttProvider::Fallback
    }
}

async fn drive(
    engine: Arc<dyn Recognizer>,
    mut frames_rx: mpsc::Receiver<Vec<i16>>,
    out_tx: mpsc::Sender<SttEvent>,
    cancel: CancellationToken,
    debounce: Duration,
) {
    let (eng_tx, mut eng_rx) = mpsc::channel::<RecognizerEvent>(EVENT_CHANNEL_SIZE);
    if let Err(e) = engine.start(eng_tx.clone()).await {
        let _ = out_tx
            .send(SttEvent::Error {
                message: format!("recognizer start failed: {e}"),
            })
            .await;
        return;
    }

    let mut pending_final = String::new();
    let mut pending_confidence: f32 = 0.0;
    let mut commit_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Intentional stop: end the run and do not restart.
                engine.stop().await;
                debug!("fallback recognizer session closed");
                return;
            }

            // The engine listens to the device itself; frames only need
            // draining so the common session surface stays uniform.
            Some(_frame) = frames_rx.recv() => {}

            event = eng_rx.recv() => {
                let Some(event) = event else { return };
                match event {
                    RecognizerEvent::SpeechStart => {
                        if out_tx.send(SttEvent::SpeechStarted).await.is_err() {
                            return;
                        }
                    }
                    RecognizerEvent::Partial(text) => {
                        if out_tx.send(SttEvent::Interim { text }).await.is_err() {
                            return;
                        }
                    }
                    RecognizerEvent::Final { text, confidence } => {
                        if !pending_final.is_empty() {
                            pending_final.push(' ');
                        }
                        pending_final.push_str(text.trim());
                        pending_confidence = confidence;
                        commit_at = Some(Instant::now() + debounce);
                    }
                    RecognizerEvent::End => {
                        // Spontaneous end while the session is alive:
                        // restart the run transparently.
                        debug!("recognizer run ended, restarting");
                        if let Err(e) = engine.start(eng_tx.clone()).await {
                            let _ = out_tx
                                .send(SttEvent::Error {
                                    message: format!("recognizer restart failed: {e}"),
                                })
                                .await;
                            return;
                        }
                    }
                    RecognizerEvent::Error(code) => {
                        if BENIGN_ERRORS.contains(&code.as_str()) {
                            debug!("recognizer reported '{code}', ignoring");
                        } else {
                            warn!("recognizer error: {code}");
                            if out_tx
                                .send(SttEvent::Error { message: code })
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                }
            }

            _ = async {
                match commit_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                commit_at = None;
                if !pending_final.is_empty() {
                    let text = std::mem::take(&mut pending_final);
                    let event = SttEvent::EndOfTurn {
                        text,
                        confidence: pending_confidence,
                    };
                    pending_confidence = 0.0;
                    if out_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Recognizer that replays one script of events per `start` call.
    struct ScriptedRecognizer {
        scripts: Mutex<VecDeque<Vec<RecognizerEvent>>>,
        starts: AtomicUsize,
        stopped: AtomicBool,
    }

    impl ScriptedRecognizer {
        fn new(scripts: Vec<Vec<RecognizerEvent>>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                starts: AtomicUsize::new(0),
                stopped: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Recognizer for ScriptedRecognizer {
        async fn start(&self, events: mpsc::Sender<RecognizerEvent>) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
            tokio::spawn(async move {
                for event in script {
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            });
            Ok(())
        }

        async fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn session_for(engine: Arc<ScriptedRecognizer>) -> SttSession {
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_SIZE);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        tokio::spawn(drive(
            engine,
            frames_rx,
            events_tx,
            cancel.clone(),
            Duration::from_millis(250),
        ));
        SttSession::new(frames_tx, events_rx, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_finals_coalesce_inside_grace() {
        let engine = ScriptedRecognizer::new(vec![vec![
            RecognizerEvent::Final {
                text: "two".to_owned(),
                confidence: 0.8,
            },
            RecognizerEvent::Final {
                text: "adults".to_owned(),
                confidence: 0.9,
            },
        ]]);
        let mut session = session_for(engine);

        let event = session.events.recv().await.unwrap();
        assert_eq!(
            event,
            SttEvent::EndOfTurn {
                text: "two adults".to_owned(),
                confidence: 0.9,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spontaneous_end_restarts_the_run() {
        let engine = ScriptedRecognizer::new(vec![
            vec![RecognizerEvent::End],
            vec![RecognizerEvent::Final {
                text: "hello".to_owned(),
                confidence: 1.0,
            }],
        ]);
        let mut session = session_for(Arc::clone(&engine));

        let event = session.events.recv().await.unwrap();
        assert_eq!(
            event,
            SttEvent::EndOfTurn {
                text: "hello".to_owned(),
                confidence: 1.0,
            }
        );
        assert_eq!(engine.starts.load(Ordering::SeqCst), 2);
        assert!(!engine.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn benign_errors_are_suppressed() {
        let engine = ScriptedRecognizer::new(vec![vec![
            RecognizerEvent::Error("no-speech".to_owned()),
            RecognizerEvent::Error("aborted".to_owned()),
            RecognizerEvent::Error("audio-capture".to_owned()),
        ]]);
        let mut session = session_for(engine);

        // Only the real failure surfaces.
        let event = session.events.recv().await.unwrap();
        assert_eq!(
            event,
            SttEvent::Error {
                message: "audio-capture".to_owned()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn partials_and_speech_start_pass_through() {
        let engine = ScriptedRecognizer::new(vec![vec![
            RecognizerEvent::SpeechStart,
            RecognizerEvent::Partial("boo".to_owned()),
            RecognizerEvent::Partial("book".to_owned()),
        ]]);
        let mut session = session_for(engine);

        assert_eq!(session.events.recv().await.unwrap(), SttEvent::SpeechStarted);
        assert_eq!(
            session.events.recv().await.unwrap(),
            SttEvent::Interim {
                text: "boo".to_owned()
            }
        );
        assert_eq!(
            session.events.recv().await.unwrap(),
            SttEvent::Interim {
                text: "book".to_owned()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_engine_without_restart() {
        let engine = ScriptedRecognizer::new(vec![vec![]]);
        let session = session_for(Arc::clone(&engine));

        session.close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(engine.stopped.load(Ordering::SeqCst));
        assert_eq!(engine.starts.load(Ordering::SeqCst), 1);
    }
}

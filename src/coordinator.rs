//! Composition root for the kiosk front runtime.
//!
//! Wires microphone capture → STT providers → voice runtime → intent
//! mediator → TTS into one cooperative event loop, owns the inactivity
//! timer, and broadcasts [`KioskEvent`]s for the screen process. The
//! synthesis engine and the fallback recognizer are platform collaborators
//! injected at build time; everything else is constructed here.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audio::{MicCapture, SpeakerSink};
use crate::brain::HttpBrainClient;
use crate::config::KioskConfig;
use crate::error::Result;
use crate::events::KioskEvent;
use crate::fsm::{Intent, UiState};
use crate::mediator::{BrainApi, InputSource, IntentMediator, TtsSpeaker, VoiceControl};
use crate::stt::fallback::{FallbackStt, Recognizer};
use crate::stt::relay::RelayStt;
use crate::stt::SttConnector;
use crate::tts::{TtsController, TtsEngine};
use crate::voice::{VoiceEvent, VoiceRuntime};

/// Channel size for capture frames into the voice runtime.
const FRAME_CHANNEL_SIZE: usize = 64;

/// Channel size for voice runtime events.
const VOICE_EVENT_CHANNEL_SIZE: usize = 32;

/// An intent arriving from outside the voice pipeline: touch, proximity,
/// scanner, payment terminal, key dispenser.
#[derive(Debug, Clone, Copy)]
pub struct ExternalIntent {
    pub intent: Intent,
    pub source: InputSource,
}

/// Orchestrates the kiosk front runtime.
pub struct KioskCoordinator {
    config: KioskConfig,
    cancel: CancellationToken,
    tts_engine: Arc<dyn TtsEngine>,
    recognizer: Option<Arc<dyn Recognizer>>,
    external_rx: Option<mpsc::Receiver<ExternalIntent>>,
    events: broadcast::Sender<KioskEvent>,
}

impl KioskCoordinator {
    /// Create a coordinator with the given configuration and synthesis
    /// engine.
    pub fn new(config: KioskConfig, tts_engine: Arc<dyn TtsEngine>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            cancel: CancellationToken::new(),
            tts_engine,
            recognizer: None,
            external_rx: None,
            events,
        }
    }

    /// Attach the on-device recognizer backing the STT fallback provider.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Attach the channel carrying touch and hardware intents.
    pub fn with_external_intents(mut self, rx: mpsc::Receiver<ExternalIntent>) -> Self {
        self.external_rx = Some(rx);
        self
    }

    /// Subscribe to runtime events for the screen process.
    pub fn subscribe(&self) -> broadcast::Receiver<KioskEvent> {
        self.events.subscribe()
    }

    /// Token that stops the whole runtime when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the kiosk until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails to initialize; runtime errors
    /// after startup surface as events, not process exits.
    pub async fn run(mut self) -> Result<()> {
        info!("initializing kiosk runtime");

        // Audio in.
        let capture = MicCapture::new(&self.config.audio)?;
        let sample_rate = capture.native_sample_rate();
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_SIZE);

        // Audio out.
        let sink = Arc::new(SpeakerSink::new(&self.config.tts)?);
        let tts = Arc::new(TtsController::new(
            Arc::clone(&self.tts_engine),
            sink,
            &self.config.tts.lang_priority,
        )?);

        // STT providers.
        let relay: Arc<dyn SttConnector> = Arc::new(RelayStt::new(self.config.stt.clone()));
        let fallback: Option<Arc<dyn SttConnector>> = match (
            self.config.stt.enable_fallback,
            self.recognizer.take(),
        ) {
            (true, Some(engine)) => {
                Some(Arc::new(FallbackStt::new(&self.config.stt, engine)))
            }
            (true, None) => {
                warn!("fallback STT enabled but no recognizer injected");
                None
            }
            _ => None,
        };

        // Voice runtime.
        let (voice_events_tx, mut voice_events) = mpsc::channel(VOICE_EVENT_CHANNEL_SIZE);
        let (runtime, voice_handle) = VoiceRuntime::new(
            self.config.voice.clone(),
            relay,
            fallback,
            Arc::clone(&tts),
            sample_rate,
            frames_rx,
            voice_events_tx,
        );
        tokio::spawn(runtime.run());

        let capture_cancel = self.cancel.child_token();
        tokio::spawn(async move {
            if let Err(e) = capture.run(frames_tx, capture_cancel).await {
                warn!("audio capture stopped: {e}");
            }
        });

        // Brain client and tenant identity.
        let brain = HttpBrainClient::new(&self.config.brain, self.config.brain.tenant_slug.clone())?;
        let tenant_name = match brain.tenant().await {
            Ok(tenant) => tenant.name,
            Err(e) => {
                warn!("tenant fetch failed, using slug as display name: {e}");
                self.config.brain.tenant_slug.clone()
            }
        };

        let mut mediator = IntentMediator::new(
            tenant_name,
            Arc::new(brain) as Arc<dyn BrainApi>,
            Arc::new(TtsSpeaker(Arc::clone(&tts))),
            Arc::new(voice_handle) as Arc<dyn VoiceControl>,
            self.events.clone(),
        );

        let mut tts_events = tts.subscribe();
        let mut external_rx = self.external_rx.take();
        let inactivity = Duration::from_millis(self.config.voice.inactivity_timeout_ms);
        let mut dispense_entered: Option<Instant> = None;

        info!("kiosk runtime ready");

        loop {
            let inactivity_at = mediator.last_activity() + inactivity;
            let dispense_at = match (dispense_entered, self.config.flow.dispense_auto_advance_ms) {
                (Some(entered), Some(ms)) => Some(entered + Duration::from_millis(ms)),
                _ => None,
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,

                event = voice_events.recv() => {
                    let Some(event) = event else { break };
                    self.forward_voice_event(&event);
                    match event {
                        VoiceEvent::TranscriptReady { text, confidence } => {
                            mediator.handle_transcript(&text, confidence).await;
                        }
                        VoiceEvent::SessionAborted { .. } => {
                            mediator.on_voice_aborted().await;
                        }
                        _ => {}
                    }
                }

                external = async {
                    match external_rx.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    let Some(ExternalIntent { intent, source }) = external else { break };
                    mediator.handle_intent(intent, source).await;
                }

                event = tts_events.recv() => {
                    if let Ok(event) = event {
                        self.forward_tts_event(event);
                    }
                }

                _ = tokio::time::sleep_until(inactivity_at) => {
                    mediator.on_inactivity().await;
                }

                _ = async {
                    match dispense_at {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {
                    dispense_entered = None;
                    mediator.handle_intent(Intent::DispenseComplete, InputSource::System).await;
                }
            }

            dispense_entered = match (mediator.state(), dispense_entered) {
                (UiState::KeyDispensing, Some(at)) => Some(at),
                (UiState::KeyDispensing, None) => Some(Instant::now()),
                _ => None,
            };
        }

        info!("kiosk runtime stopped");
        Ok(())
    }

    fn forward_voice_event(&self, event: &VoiceEvent) {
        let forwarded = match event {
            VoiceEvent::SessionStarted => Some(KioskEvent::VoiceSessionStarted),
            VoiceEvent::TranscriptPartial { text } => Some(KioskEvent::VoiceTranscriptPartial {
                text: text.clone(),
            }),
            // Acceptance is reported by the mediator after its gates.
            VoiceEvent::TranscriptReady { .. } => None,
            VoiceEvent::SessionEnded => Some(KioskEvent::VoiceSessionEnded),
            VoiceEvent::SessionAborted { reason } => Some(KioskEvent::VoiceSessionAborted {
                reason: reason.clone(),
            }),
            VoiceEvent::SessionError { message } => Some(KioskEvent::VoiceSessionError {
                message: message.clone(),
            }),
        };
        if let Some(event) = forwarded {
            let _ = self.events.send(event);
        }
    }

    fn forward_tts_event(&self, event: crate::tts::TtsEvent) {
        let forwarded = match event {
            crate::tts::TtsEvent::Started { text } => KioskEvent::SpeechStarted { text },
            crate::tts::TtsEvent::Ended => KioskEvent::SpeechEnded { cancelled: false },
            crate::tts::TtsEvent::Cancelled => KioskEvent::SpeechEnded { cancelled: true },
            crate::tts::TtsEvent::Error { message } => {
                warn!("TTS error: {message}");
                KioskEvent::SpeechEnded { cancelled: true }
            }
        };
        let _ = self.events.send(forwarded);
    }
}

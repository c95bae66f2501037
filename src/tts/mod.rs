//! Text-to-speech with single-utterance authority and instant barge-in.
//!
//! One utterance owns the speaker at a time: a new `speak` hard-stops
//! whatever is in flight before it starts. Barge-in and hard-stop flip a
//! shared atomic the playback callback reads every buffer, so speech dies
//! within one audio quantum of the request — the guest never talks over a
//! kiosk that keeps going.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::{KioskError, Result};

/// Quality hint for a synthesizer voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VoiceQuality {
    Low,
    Normal,
    High,
}

/// A voice offered by the synthesis engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub id: String,
    pub name: String,
    /// BCP-47 tag, e.g. `en-IN`.
    pub lang: String,
    pub quality: VoiceQuality,
}

/// A speech synthesis engine.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Voices available right now.
    fn voices(&self) -> Vec<Voice>;

    /// Synthesize text to f32 samples at the engine's output rate.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis fails.
    async fn synthesize(&self, voice: &Voice, text: &str) -> Result<Vec<f32>>;
}

/// A playback sink able to cut output mid-buffer.
pub trait PlaybackSink: Send + Sync {
    /// Play to completion or until `stop` flips; returns `true` when the
    /// audio ran to the end. Blocking — callers use `spawn_blocking`.
    ///
    /// # Errors
    ///
    /// Returns an error if the output stream fails.
    fn play(&self, samples: &[f32], stop: &Arc<AtomicBool>) -> Result<bool>;
}

impl PlaybackSink for crate::audio::SpeakerSink {
    fn play(&self, samples: &[f32], stop: &Arc<AtomicBool>) -> Result<bool> {
        crate::audio::SpeakerSink::play(self, samples, stop)
    }
}

/// Lifecycle events for the active utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum TtsEvent {
    Started { text: String },
    Ended,
    Cancelled,
    Error { message: String },
}

/// How a `speak` call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Completed,
    /// Cut off by barge-in, hard-stop or a newer utterance. Expected, not
    /// an error.
    Cancelled,
}

/// Pick the voice to speak with.
///
/// Quality filter first (anything above `Low`), then the first voice
/// matching the locale priority list — exact tag, then primary subtag —
/// and finally whatever is available.
pub fn select_voice(voices: &[Voice], lang_priority: &[String]) -> Option<Voice> {
    if voices.is_empty() {
        return None;
    }

    let candidates: Vec<&Voice> = {
        let good: Vec<&Voice> = voices.iter().filter(|v| v.quality > VoiceQuality::Low).collect();
        if good.is_empty() {
            voices.iter().collect()
        } else {
            good
        }
    };

    for lang in lang_priority {
        if let Some(v) = candidates.iter().find(|v| v.lang.eq_ignore_ascii_case(lang)) {
            return Some((*v).clone());
        }
        let primary = lang.split('-').next().unwrap_or(lang);
        if let Some(v) = candidates.iter().find(|v| {
            v.lang
                .split('-')
                .next()
                .is_some_and(|p| p.eq_ignore_ascii_case(primary))
        }) {
            return Some((*v).clone());
        }
    }

    candidates.first().map(|v| (*v).clone())
}

/// Speech output controller.
pub struct TtsController {
    engine: Arc<dyn TtsEngine>,
    sink: Arc<dyn PlaybackSink>,
    voice: Voice,
    speaking: Arc<AtomicBool>,
    /// Stop flag of the utterance currently holding the speaker.
    active_stop: std::sync::Mutex<Arc<AtomicBool>>,
    /// Serializes utterances; a new speak preempts then waits its turn.
    turn: tokio::sync::Mutex<()>,
    events: broadcast::Sender<TtsEvent>,
}

impl TtsController {
    /// Build a controller, selecting a voice by locale priority.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine offers no voices at all.
    pub fn new(
        engine: Arc<dyn TtsEngine>,
        sink: Arc<dyn PlaybackSink>,
        lang_priority: &[String],
    ) -> Result<Self> {
        let voice = select_voice(&engine.voices(), lang_priority)
            .ok_or_else(|| KioskError::Tts("engine offers no voices".to_owned()))?;
        info!("selected voice '{}' ({})", voice.name, voice.lang);

        let (events, _) = broadcast::channel(32);
        Ok(Self {
            engine,
            sink,
            voice,
            speaking: Arc::new(AtomicBool::new(false)),
            active_stop: std::sync::Mutex::new(Arc::new(AtomicBool::new(true))),
            turn: tokio::sync::Mutex::new(()),
            events,
        })
    }

    /// Subscribe to utterance lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<TtsEvent> {
        self.events.subscribe()
    }

    /// Whether an utterance currently holds the speaker.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Stop the active utterance for a guest interruption.
    pub fn barge_in(&self) {
        if self.is_speaking() {
            self.cut_active();
            let _ = self.events.send(TtsEvent::Cancelled);
        }
    }

    /// Cancel the active utterance and anything queued. Idempotent and
    /// safe from any state.
    pub fn hard_stop(&self) {
        self.cut_active();
    }

    fn cut_active(&self) {
        let guard = match self.active_stop.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.store(true, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);
    }

    /// Speak one utterance, resolving when it ends or is cut off.
    ///
    /// Any in-flight utterance is hard-stopped first. Cancellation — by
    /// barge-in, hard-stop or a newer `speak` — resolves `Ok(Cancelled)`.
    ///
    /// # Errors
    ///
    /// Returns an error only for synthesis or playback failures.
    pub async fn speak(&self, text: &str) -> Result<SpeakOutcome> {
        if text.trim().is_empty() {
            return Ok(SpeakOutcome::Completed);
        }

        // Preempt the current holder, then take the turn lock.
        self.cut_active();
        let _turn = self.turn.lock().await;

        let stop = Arc::new(AtomicBool::new(false));
        {
            let mut guard = match self.active_stop.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Arc::clone(&stop);
        }

        self.speaking.store(true, Ordering::SeqCst);
        let _ = self.events.send(TtsEvent::Started {
            text: text.to_owned(),
        });

        let samples = match self.engine.synthesize(&self.voice, text).await {
            Ok(s) => s,
            Err(e) => {
                self.speaking.store(false, Ordering::SeqCst);
                let _ = self.events.send(TtsEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        if stop.load(Ordering::SeqCst) {
            self.speaking.store(false, Ordering::SeqCst);
            let _ = self.events.send(TtsEvent::Cancelled);
            return Ok(SpeakOutcome::Cancelled);
        }

        let sink = Arc::clone(&self.sink);
        let stop_for_play = Arc::clone(&stop);
        let played = tokio::task::spawn_blocking(move || sink.play(&samples, &stop_for_play))
            .await
            .map_err(|e| KioskError::Tts(format!("playback task panicked: {e}")))?;

        self.speaking.store(false, Ordering::SeqCst);
        match played {
            Ok(true) => {
                let _ = self.events.send(TtsEvent::Ended);
                Ok(SpeakOutcome::Completed)
            }
            Ok(false) => {
                let _ = self.events.send(TtsEvent::Cancelled);
                Ok(SpeakOutcome::Cancelled)
            }
            Err(e) => {
                warn!("playback failed: {e}");
                let _ = self.events.send(TtsEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

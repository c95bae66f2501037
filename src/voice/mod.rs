//! Duplex voice coordination: turn taking, timers, silence policy.

pub mod runtime;

pub use runtime::{VoiceHandle, VoiceRuntime};

use crate::normalize;

/// Coarse audio mode of the kiosk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceMode {
    Idle,
    Listening,
    Speaking,
}

/// Commands accepted by the voice runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceCommand {
    /// Open a listening session against the active STT provider.
    StartListening,
    /// Close the listening session normally.
    StopListening,
    /// Stop STT and TTS immediately and wipe session data.
    HardStopAll,
    /// Wipe transcripts, counters and metrics without touching audio.
    ClearSession,
}

/// Events the voice runtime emits toward the intent mediator.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    SessionStarted,
    TranscriptPartial { text: String },
    /// A final transcript that survived the validation gate.
    TranscriptReady { text: String, confidence: f32 },
    SessionEnded,
    /// The silent-turn ladder or watchdog gave up on the guest.
    SessionAborted { reason: String },
    /// Voice is unavailable: both providers failed or policy refused.
    SessionError { message: String },
}

/// Spoken after the second consecutive silent turn.
pub const SILENCE_NUDGE: &str = "I didn't catch that. Please speak or tap the screen.";

/// Why the validation gate rejected a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    FillerOnly,
    LowConfidence,
}

/// Gate a final transcript before it may become an intent.
///
/// Low confidence is forgiven when the text carries a command keyword —
/// a guest softly saying "cancel" must still be heard.
pub fn validate_transcript(
    text: &str,
    confidence: f32,
    min_chars: usize,
    min_confidence: f32,
) -> Result<(), RejectReason> {
    let normalized = normalize::normalize(text);
    if normalized.len() < min_chars {
        return Err(RejectReason::TooShort);
    }
    if normalize::is_filler(&normalized) {
        return Err(RejectReason::FillerOnly);
    }
    if confidence < min_confidence && !normalize::has_command_keyword(&normalized) {
        return Err(RejectReason::LowConfidence);
    }
    Ok(())
}

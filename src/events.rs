//! Runtime events broadcast to the UI process and telemetry sinks.
//!
//! The coordinator owns a `tokio::sync::broadcast` sender of these; the
//! screen renderer, dev tooling and telemetry all subscribe. Nothing in the
//! core ever blocks on a subscriber.

use crate::fsm::{Intent, UiState};
use crate::slots::BookingSlots;

/// Events emitted by the kiosk runtime.
#[derive(Debug, Clone)]
pub enum KioskEvent {
    /// The FSM moved to a new screen.
    ScreenChanged {
        from: UiState,
        to: UiState,
        intent: Intent,
    },
    /// View data refreshed for the current screen (rooms, slots, progress).
    ViewDataUpdated(ViewData),
    /// A voice session opened against an STT provider.
    VoiceSessionStarted,
    /// Interim transcript for live captioning.
    VoiceTranscriptPartial { text: String },
    /// A validated final transcript entered the intent pipeline.
    VoiceTranscriptReady { text: String, confidence: f32 },
    /// The listening session closed normally.
    VoiceSessionEnded,
    /// The silent-turn ladder or a watchdog aborted the session.
    VoiceSessionAborted { reason: String },
    /// Both providers failed; voice is unavailable this session.
    VoiceSessionError { message: String },
    /// The kiosk began speaking a prompt.
    SpeechStarted { text: String },
    /// The current prompt finished or was cut off.
    SpeechEnded { cancelled: bool },
    /// An intent passed dedup and entered the dispatch path.
    IntentDispatched { intent: Intent, source: String },
    /// A voice intent was dropped by the rate limiter. Telemetry only.
    VoiceRateLimited,
    /// A duplicate intent was suppressed inside the dedup window. Telemetry only.
    DuplicateSuppressed { intent: Intent },
    /// A voice intent was refused by the per-state authority matrix. Telemetry only.
    VoiceAuthorityRejected { state: UiState, intent: Intent },
}

/// Screen-facing projection of mediator state.
#[derive(Debug, Clone, Default)]
pub struct ViewData {
    /// Rooms last fetched for ROOM_SELECT.
    pub rooms: Vec<RoomSummary>,
    /// Room the guest settled on.
    pub selected_room: Option<RoomSummary>,
    /// Slot-filling progress for BOOKING_COLLECT.
    pub slots: BookingSlots,
    /// Filled-slot count over required-slot count, for the progress bar.
    pub progress: (usize, usize),
    /// Slot the kiosk will ask for next.
    pub next_slot_prompt: Option<String>,
}

/// Room projection used by screens and room inference.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSummary {
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    pub amenities: Vec<String>,
}

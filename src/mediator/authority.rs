//! Input-authority policy per screen state.
//!
//! Voice authority is an explicit allow list. The security- and
//! hardware-sensitive screens (ID scan, payment, key dispense) are
//! strictly voice-off: the mediator refuses to open voice sessions there
//! and hard-stops audio on entry, so a hot microphone can never influence
//! them. Touch authority is absolute — an interrupt-class touch preempts
//! any ongoing audio.

use crate::fsm::{Intent, UiState};

/// Whether voice input may drive this state.
pub fn voice_allowed(state: UiState) -> bool {
    match state {
        UiState::Welcome
        | UiState::AiChat
        | UiState::ManualMenu
        | UiState::RoomSelect
        | UiState::BookingCollect
        | UiState::BookingSummary => true,
        UiState::Idle
        | UiState::ScanId
        | UiState::Payment
        | UiState::KeyDispensing
        | UiState::Complete
        | UiState::Error => false,
    }
}

/// Whether a touch-originated intent preempts ongoing audio.
///
/// Everything a guest can physically tap mid-flow counts; hardware
/// completion events (scan, dispense) do not interrupt speech.
pub fn is_interrupt(intent: Intent) -> bool {
    matches!(
        intent,
        Intent::TouchSelected
            | Intent::BackRequested
            | Intent::CancelRequested
            | Intent::Reset
            | Intent::CheckInSelected
            | Intent::BookRoomSelected
            | Intent::RoomSelected
            | Intent::ConfirmPayment
            | Intent::HelpSelected
    )
}

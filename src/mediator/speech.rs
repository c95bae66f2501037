//! Spoken prompts per screen state.
//!
//! The onboarding prompt plays when a transition lands on a new screen.
//! `{{TENANT_NAME}}` is substituted at speak time; BOOKING_COLLECT derives
//! its prompt from whichever slot is still missing.

use crate::fsm::UiState;
use crate::slots::BookingSlots;

/// Spoken while asking the guest to confirm a cancellation.
pub const CANCEL_CONFIRM_PROMPT: &str =
    "Are you sure you want to cancel? Say yes to cancel, or no to continue.";

/// Spoken when the guest decides not to cancel after all.
pub const CONTINUE_SPEECH: &str = "Okay, continuing where we left off.";

/// Spoken when a confirm hits a date conflict.
pub const DATE_CONFLICT_SPEECH: &str =
    "I'm sorry, that room is already booked for those dates. Could you pick different dates?";

/// Spoken when the brain endpoints are unreachable.
pub const BRAIN_ERROR_SPEECH: &str =
    "I'm having trouble understanding. Please use the touch screen.";

/// Template onboarding prompt for a state, if it has one.
fn template_for(state: UiState) -> Option<&'static str> {
    match state {
        UiState::Idle => None,
        UiState::Welcome => Some(
            "Welcome to {{TENANT_NAME}}. Say check in, book a room, or tap the screen to begin.",
        ),
        UiState::AiChat => Some("How can I help you today?"),
        UiState::ManualMenu => Some("Please choose an option on the screen."),
        UiState::ScanId => Some("Please place your ID face down on the scanner below."),
        UiState::RoomSelect => Some("Sure. I am fetching available rooms for you."),
        // Computed from missing slots, not the template table.
        UiState::BookingCollect => None,
        UiState::BookingSummary => Some(
            "Here is your booking summary. Say confirm to proceed to payment, or modify to make changes.",
        ),
        UiState::Payment => Some("Please complete your payment on the terminal below."),
        UiState::KeyDispensing => Some("Dispensing your room key now."),
        UiState::Complete => Some("You're all set. Enjoy your stay at {{TENANT_NAME}}!"),
        UiState::Error => Some("Something went wrong. Please tap the screen to try again."),
    }
}

/// The prompt to speak when entering `state`.
pub fn onboarding_prompt(
    state: UiState,
    tenant_name: &str,
    slots: &BookingSlots,
) -> Option<String> {
    if state == UiState::BookingCollect {
        let prompt = match slots.next_to_ask() {
            Some(slot) => slot.ask_prompt().to_owned(),
            None => "I have everything I need. Say confirm to review your booking.".to_owned(),
        };
        return Some(prompt);
    }
    template_for(state).map(|t| t.replace("{{TENANT_NAME}}", tenant_name))
}

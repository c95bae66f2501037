//! Deterministic transcript routing that bypasses the LLM.
//!
//! Keyword rules cover the unambiguous cases — navigation, confirmation,
//! menu choices and direct room picks — so the common path costs nothing
//! and cannot be misrouted by a creative model. Anything ambiguous falls
//! through to the LLM path with `None`.

use crate::events::RoomSummary;
use crate::fsm::{Intent, UiState};
use crate::normalize::parse_ordinal;

/// A deterministic routing decision.
#[derive(Debug, Clone, PartialEq)]
pub enum FastRoute {
    Intent(Intent),
    /// A room resolved from the on-screen list.
    RoomChoice(RoomSummary),
}

/// Phrases that signal the guest wants to start a booking.
const BOOKING_PHRASES: [&str; 5] = ["book", "booking", "reserve", "reservation", "new room"];

/// Phrases that signal an arriving guest with a reservation.
const CHECK_IN_PHRASES: [&str; 4] = ["check in", "check-in", "checking in", "i have a reservation"];

/// Phrases that ask for a human or guidance.
const HELP_PHRASES: [&str; 5] = ["help", "human", "manager", "staff", "assistance"];

/// Room questions that must go to the LLM, not the picker.
const INFO_QUERY_MARKERS: [&str; 8] = [
    "amenit",
    "price",
    "cost",
    "how much",
    "compare",
    "difference",
    "tell me about",
    "what about",
];

/// Try to route a normalized transcript without the LLM.
///
/// `rooms` is the list currently on screen; `selected` is the highlighted
/// room, used for deictic picks ("this one").
pub fn fast_route(
    state: UiState,
    normalized: &str,
    rooms: &[RoomSummary],
    selected: Option<&RoomSummary>,
) -> Option<FastRoute> {
    if normalized.is_empty() {
        return None;
    }

    // Global navigation.
    if contains_word(normalized, "back") || normalized.contains("previous") {
        return Some(FastRoute::Intent(Intent::BackRequested));
    }
    if state != UiState::Idle
        && (normalized.contains("cancel") || normalized.contains("start over"))
    {
        return Some(FastRoute::Intent(Intent::CancelRequested));
    }

    match state {
        UiState::BookingSummary => {
            if contains_word(normalized, "confirm")
                || contains_word(normalized, "yes")
                || normalized.contains("proceed")
            {
                return Some(FastRoute::Intent(Intent::ConfirmPayment));
            }
            if normalized.contains("modify")
                || normalized.contains("change")
                || normalized.contains("edit")
            {
                return Some(FastRoute::Intent(Intent::ModifyBooking));
            }
            None
        }

        UiState::Payment => {
            if contains_word(normalized, "pay")
                || normalized.contains("confirm payment")
                || contains_word(normalized, "card")
            {
                return Some(FastRoute::Intent(Intent::ConfirmPayment));
            }
            None
        }

        UiState::Welcome | UiState::AiChat | UiState::ManualMenu => {
            // Check-in first: "I have a reservation" contains "reserve".
            if CHECK_IN_PHRASES.iter().any(|p| normalized.contains(p)) {
                return Some(FastRoute::Intent(Intent::CheckInSelected));
            }
            if BOOKING_PHRASES.iter().any(|p| normalized.contains(p)) {
                return Some(FastRoute::Intent(Intent::BookRoomSelected));
            }
            if HELP_PHRASES.iter().any(|p| contains_word(normalized, p)) {
                return Some(FastRoute::Intent(Intent::HelpSelected));
            }
            None
        }

        UiState::RoomSelect => {
            // Information questions stay conversational.
            if INFO_QUERY_MARKERS.iter().any(|m| normalized.contains(m)) {
                return None;
            }
            infer_room(rooms, selected, normalized).map(FastRoute::RoomChoice)
        }

        _ => None,
    }
}

/// Resolve a spoken room pick from the on-screen list.
///
/// Tried in order: ordinal ("the second one"), deixis ("this one"),
/// exact code, name substring, room-class keyword.
fn infer_room(
    rooms: &[RoomSummary],
    selected: Option<&RoomSummary>,
    normalized: &str,
) -> Option<RoomSummary> {
    if rooms.is_empty() {
        return None;
    }

    if let Some(index) = parse_ordinal(normalized) {
        let room = if index == usize::MAX {
            rooms.last()
        } else {
            rooms.get(index)
        };
        if let Some(room) = room {
            return Some(room.clone());
        }
    }

    if normalized.contains("this one") || normalized.contains("that one") {
        if let Some(room) = selected {
            return Some(room.clone());
        }
        if rooms.len() == 1 {
            return Some(rooms[0].clone());
        }
        return None;
    }

    if let Some(room) = rooms.iter().find(|r| {
        let code = r.code.to_lowercase();
        code == normalized || code.replace('_', " ") == normalized
    }) {
        return Some(room.clone());
    }

    if let Some(room) = rooms.iter().find(|r| {
        let name = r.name.to_lowercase();
        normalized.contains(&name) || (!normalized.is_empty() && name.contains(normalized))
    }) {
        return Some(room.clone());
    }

    for class in ["presidential", "deluxe", "suite", "standard"] {
        if normalized.contains(class) {
            if let Some(room) = rooms.iter().find(|r| {
                r.code.to_lowercase().contains(class) || r.name.to_lowercase().contains(class)
            }) {
                return Some(room.clone());
            }
        }
    }

    None
}

/// Whole-word containment on a space-normalized string.
fn contains_word(text: &str, word: &str) -> bool {
    text.split_whitespace().any(|w| w == word) || (word.contains(' ') && text.contains(word))
}

//! Screen-flow state machine for the kiosk.
//!
//! A pure transition table over `(UiState, Intent)`. No side effects live
//! here: audio teardown, speech prompts and view-data updates all happen in
//! the intent mediator after it consults this table. Any pair without an
//! explicit row is a no-op — the input stream is lossy by design, so
//! unknown intents must never move the screen.

use serde::{Deserialize, Serialize};

/// Kiosk screen states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UiState {
    Idle,
    Welcome,
    AiChat,
    ManualMenu,
    ScanId,
    RoomSelect,
    BookingCollect,
    BookingSummary,
    Payment,
    KeyDispensing,
    Complete,
    Error,
}

impl UiState {
    /// All states, in flow order. Useful for exhaustive property tests.
    pub const ALL: [UiState; 12] = [
        UiState::Idle,
        UiState::Welcome,
        UiState::AiChat,
        UiState::ManualMenu,
        UiState::ScanId,
        UiState::RoomSelect,
        UiState::BookingCollect,
        UiState::BookingSummary,
        UiState::Payment,
        UiState::KeyDispensing,
        UiState::Complete,
        UiState::Error,
    ];
}

/// Intents accepted by the kiosk flow.
///
/// Grouped: system, voice lifecycle, navigation, core flow, booking
/// slot-filling, conversational. `Unknown` is the catch-all for LLM replies
/// that fail to map; it never transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    // system
    ProximityDetected,
    Reset,
    // voice lifecycle
    VoiceStarted,
    VoiceTranscriptReceived,
    VoiceSilence,
    // navigation
    BackRequested,
    CancelRequested,
    TouchSelected,
    // core flow
    CheckInSelected,
    BookRoomSelected,
    ScanCompleted,
    RoomSelected,
    ConfirmPayment,
    DispenseComplete,
    // booking
    SelectRoom,
    ProvideGuests,
    ProvideDates,
    ProvideName,
    ConfirmBooking,
    ModifyBooking,
    CancelBooking,
    AskRoomDetail,
    AskPrice,
    CompareRooms,
    // conversational
    HelpSelected,
    GeneralQuery,
    ExplainCapabilities,
    Unknown,
}

/// Per-state flow metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMetadata {
    /// Whether a back affordance is meaningful in this state.
    pub can_go_back: bool,
}

/// Compute the next state for `(state, intent)`.
///
/// Deterministic and side-effect-free. Pairs without a row return `state`
/// unchanged.
pub fn transition(state: UiState, intent: Intent) -> UiState {
    use Intent as I;
    use UiState as S;

    match (state, intent) {
        (S::Idle, I::ProximityDetected) => S::Welcome,

        (S::Welcome, I::TouchSelected) => S::ManualMenu,
        (S::Welcome, I::VoiceStarted) => S::AiChat,
        (S::Welcome, I::BookRoomSelected) => S::RoomSelect,
        (S::Welcome, I::CheckInSelected) => S::ScanId,

        (S::AiChat, I::CheckInSelected) => S::ScanId,
        (S::AiChat, I::BookRoomSelected) => S::RoomSelect,
        (S::AiChat, I::BackRequested | I::CancelRequested) => S::Welcome,

        (S::ManualMenu, I::CheckInSelected) => S::ScanId,
        (S::ManualMenu, I::BookRoomSelected) => S::RoomSelect,
        (S::ManualMenu, I::BackRequested | I::CancelRequested) => S::Welcome,

        (S::ScanId, I::ScanCompleted) => S::RoomSelect,
        (S::ScanId, I::BackRequested) => S::ManualMenu,
        (S::ScanId, I::CancelRequested) => S::Welcome,

        (S::RoomSelect, I::RoomSelected) => S::BookingCollect,
        (S::RoomSelect, I::BackRequested) => S::ManualMenu,
        (S::RoomSelect, I::CancelRequested) => S::Welcome,

        (
            S::BookingCollect,
            I::SelectRoom
            | I::ProvideGuests
            | I::ProvideDates
            | I::ProvideName
            | I::AskRoomDetail
            | I::AskPrice
            | I::CompareRooms
            | I::GeneralQuery
            | I::ModifyBooking
            | I::HelpSelected,
        ) => S::BookingCollect,
        (S::BookingCollect, I::ConfirmBooking) => S::BookingSummary,
        (S::BookingCollect, I::BackRequested | I::CancelBooking) => S::RoomSelect,
        (S::BookingCollect, I::Reset) => S::Idle,

        (S::BookingSummary, I::ConfirmPayment) => S::Payment,
        (S::BookingSummary, I::ModifyBooking | I::BackRequested) => S::BookingCollect,
        (S::BookingSummary, I::CancelBooking) => S::Welcome,
        (S::BookingSummary, I::Reset) => S::Idle,

        (S::Payment, I::ConfirmPayment) => S::KeyDispensing,
        (S::Payment, I::BackRequested) => S::RoomSelect,
        (S::Payment, I::CancelRequested) => S::Welcome,

        (S::KeyDispensing, I::DispenseComplete) => S::Complete,

        (S::Complete, I::ProximityDetected) => S::Welcome,
        (S::Complete, I::Reset) => S::Idle,

        (S::Error, I::TouchSelected | I::BackRequested | I::CancelRequested) => S::Welcome,

        _ => state,
    }
}

/// Flow metadata for a state.
pub fn metadata(state: UiState) -> StateMetadata {
    let can_go_back = !matches!(
        state,
        UiState::Idle | UiState::Welcome | UiState::KeyDispensing | UiState::Complete
    );
    StateMetadata { can_go_back }
}

/// The state a back/cancel gesture falls through to when the transition
/// table has no explicit row for it.
///
/// Follows the linear backbone IDLE → WELCOME → SCAN_ID → ROOM_SELECT →
/// PAYMENT; the non-linear entries (MANUAL_MENU, AI_CHAT, ERROR) exit to
/// WELCOME. The explicit table rows take precedence over this fallback.
pub fn previous_state(state: UiState) -> UiState {
    use UiState as S;
    match state {
        S::Idle => S::Idle,
        S::Welcome => S::Idle,
        S::ScanId => S::Welcome,
        S::RoomSelect => S::ScanId,
        S::Payment => S::RoomSelect,
        S::BookingCollect => S::RoomSelect,
        S::BookingSummary => S::BookingCollect,
        S::ManualMenu | S::AiChat | S::Error => S::Welcome,
        // Terminal flow states have no back affordance.
        S::KeyDispensing | S::Complete => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_booking_path() {
        let mut s = UiState::Idle;
        for (intent, expect) in [
            (Intent::ProximityDetected, UiState::Welcome),
            (Intent::BookRoomSelected, UiState::RoomSelect),
            (Intent::RoomSelected, UiState::BookingCollect),
            (Intent::ProvideGuests, UiState::BookingCollect),
            (Intent::ProvideDates, UiState::BookingCollect),
            (Intent::ProvideName, UiState::BookingCollect),
            (Intent::ConfirmBooking, UiState::BookingSummary),
            (Intent::ConfirmPayment, UiState::Payment),
            (Intent::ConfirmPayment, UiState::KeyDispensing),
            (Intent::DispenseComplete, UiState::Complete),
        ] {
            s = transition(s, intent);
            assert_eq!(s, expect, "after {intent:?}");
        }
    }

    #[test]
    fn check_in_path() {
        let mut s = transition(UiState::Welcome, Intent::CheckInSelected);
        assert_eq!(s, UiState::ScanId);
        s = transition(s, Intent::ScanCompleted);
        assert_eq!(s, UiState::RoomSelect);
    }

    #[test]
    fn invalid_pairs_are_no_ops() {
        assert_eq!(
            transition(UiState::Idle, Intent::ConfirmPayment),
            UiState::Idle
        );
        assert_eq!(
            transition(UiState::KeyDispensing, Intent::CancelRequested),
            UiState::KeyDispensing
        );
        assert_eq!(
            transition(UiState::Payment, Intent::ProvideGuests),
            UiState::Payment
        );
        assert_eq!(
            transition(UiState::Welcome, Intent::Unknown),
            UiState::Welcome
        );
    }

    #[test]
    fn transition_is_deterministic() {
        for state in UiState::ALL {
            let a = transition(state, Intent::BackRequested);
            let b = transition(state, Intent::BackRequested);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn key_dispensing_only_exits_on_dispense_complete() {
        for intent in [
            Intent::BackRequested,
            Intent::CancelRequested,
            Intent::TouchSelected,
            Intent::Reset,
            Intent::ConfirmPayment,
        ] {
            assert_eq!(
                transition(UiState::KeyDispensing, intent),
                UiState::KeyDispensing
            );
        }
        assert_eq!(
            transition(UiState::KeyDispensing, Intent::DispenseComplete),
            UiState::Complete
        );
    }

    #[test]
    fn error_state_exits_only_by_touch_or_back() {
        assert_eq!(
            transition(UiState::Error, Intent::TouchSelected),
            UiState::Welcome
        );
        assert_eq!(
            transition(UiState::Error, Intent::BackRequested),
            UiState::Welcome
        );
        assert_eq!(
            transition(UiState::Error, Intent::VoiceTranscriptReceived),
            UiState::Error
        );
    }

    #[test]
    fn booking_collect_self_loops() {
        for intent in [
            Intent::SelectRoom,
            Intent::ProvideGuests,
            Intent::ProvideDates,
            Intent::ProvideName,
            Intent::AskRoomDetail,
            Intent::AskPrice,
            Intent::CompareRooms,
            Intent::GeneralQuery,
            Intent::ModifyBooking,
            Intent::HelpSelected,
        ] {
            assert_eq!(
                transition(UiState::BookingCollect, intent),
                UiState::BookingCollect,
                "{intent:?} should keep BOOKING_COLLECT"
            );
        }
    }

    #[test]
    fn back_rows_take_precedence_over_backbone() {
        // The table sends SCAN_ID and ROOM_SELECT back to MANUAL_MENU even
        // though the linear backbone would fall through elsewhere.
        assert_eq!(
            transition(UiState::ScanId, Intent::BackRequested),
            UiState::ManualMenu
        );
        assert_eq!(
            transition(UiState::RoomSelect, Intent::BackRequested),
            UiState::ManualMenu
        );
    }

    #[test]
    fn metadata_flags_back_affordance() {
        assert!(!metadata(UiState::Idle).can_go_back);
        assert!(!metadata(UiState::KeyDispensing).can_go_back);
        assert!(!metadata(UiState::Complete).can_go_back);
        assert!(metadata(UiState::BookingSummary).can_go_back);
        assert!(metadata(UiState::ScanId).can_go_back);
    }

    #[test]
    fn previous_state_backbone() {
        assert_eq!(previous_state(UiState::Payment), UiState::RoomSelect);
        assert_eq!(previous_state(UiState::BookingSummary), UiState::BookingCollect);
        assert_eq!(previous_state(UiState::AiChat), UiState::Welcome);
        assert_eq!(previous_state(UiState::Error), UiState::Welcome);
        assert_eq!(previous_state(UiState::Complete), UiState::Complete);
    }

    #[test]
    fn ui_state_serializes_screaming_snake() {
        let json = serde_json::to_string(&UiState::BookingCollect).unwrap();
        assert_eq!(json, "\"BOOKING_COLLECT\"");
        let back: UiState = serde_json::from_str("\"KEY_DISPENSING\"").unwrap();
        assert_eq!(back, UiState::KeyDispensing);
    }

    #[test]
    fn intent_serializes_screaming_snake() {
        let json = serde_json::to_string(&Intent::BookRoomSelected).unwrap();
        assert_eq!(json, "\"BOOK_ROOM_SELECTED\"");
        let back: Intent = serde_json::from_str("\"PROVIDE_GUESTS\"").unwrap();
        assert_eq!(back, Intent::ProvideGuests);
    }
}

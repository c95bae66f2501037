//! Wire contract for the brain HTTP surface.
//!
//! One set of DTOs shared by the front runtime's client and the server
//! handlers, so the two halves cannot drift.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fsm::{Intent, UiState};
use crate::slots::{BookingSlots, SlotKey, SlotValueKind};

/// Request body for `POST /api/{tenant}/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub transcript: String,
    pub current_state: UiState,
    pub session_id: String,
}

/// Response body for the general chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub speech: String,
    pub intent: Intent,
    pub confidence: f32,
}

/// Request body for `POST /api/{tenant}/chat/booking`.
///
/// Extends [`ChatRequest`] with the slot context the mediator tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingChatRequest {
    pub transcript: String,
    pub current_state: UiState,
    pub session_id: String,
    #[serde(default)]
    pub active_slot: Option<SlotKey>,
    #[serde(default)]
    pub expected_type: Option<SlotValueKind>,
    #[serde(default)]
    pub last_system_prompt: Option<String>,
    #[serde(default)]
    pub filled_slots: BookingSlots,
    #[serde(default)]
    pub conversation_history: Vec<HistoryMessage>,
}

/// A single prior turn echoed by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub role: HistoryRole,
    pub content: String,
}

/// Author of a history message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

/// Response body for the booking endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingChatResponse {
    pub speech: String,
    pub intent: Intent,
    pub confidence: f32,
    /// Slots the brain read out of this turn's transcript.
    pub extracted_slots: BookingSlots,
    /// The session's full slot state after merging this turn.
    pub accumulated_slots: BookingSlots,
    pub missing_slots: Vec<SlotKey>,
    pub next_slot_to_ask: Option<SlotKey>,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted_booking_id: Option<Uuid>,
}

/// Room projection for `GET /api/{tenant}/rooms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDto {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    /// Nightly price in whole dollars at the JSON boundary.
    pub price: f64,
    pub amenities: Vec<String>,
}

/// Rooms list envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomsResponse {
    pub rooms: Vec<RoomDto>,
}

/// Tenant projection for `GET /api/{tenant}/tenant`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantDto {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub timezone: String,
    pub check_in_time: String,
    pub check_out_time: String,
    pub amenities: Vec<String>,
}

/// Tenant envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantResponse {
    pub tenant: TenantDto,
}

/// Error body returned by the brain endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `BOOKING_DATE_CONFLICT`.
    pub error: String,
    pub message: String,
}

/// Health body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::fsm::{Intent, UiState};

    #[test]
    fn booking_request_accepts_minimal_body() {
        let raw = r#"{
            "transcript": "two adults",
            "currentState": "BOOKING_COLLECT",
            "sessionId": "abc"
        }"#;
        let req: BookingChatRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.current_state, UiState::BookingCollect);
        assert!(req.active_slot.is_none());
        assert!(req.filled_slots.adults.is_none());
        assert!(req.conversation_history.is_empty());
    }

    #[test]
    fn booking_request_full_round_trip() {
        let raw = r#"{
            "transcript": "two",
            "currentState": "BOOKING_COLLECT",
            "sessionId": "abc",
            "activeSlot": "adults",
            "expectedType": "number",
            "lastSystemPrompt": "How many adults?",
            "filledSlots": {"roomType": "DELUXE_OCEAN"}
        }"#;
        let req: BookingChatRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.active_slot, Some(crate::slots::SlotKey::Adults));
        assert_eq!(req.expected_type, Some(crate::slots::SlotValueKind::Number));
        assert_eq!(req.filled_slots.room_type.as_deref(), Some("DELUXE_OCEAN"));
    }

    #[test]
    fn chat_response_wire_shape() {
        let resp = ChatResponse {
            speech: "Welcome!".to_owned(),
            intent: Intent::GeneralQuery,
            confidence: 0.9,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["intent"], "GENERAL_QUERY");
        assert_eq!(json["speech"], "Welcome!");
    }

    #[test]
    fn persisted_booking_id_omitted_when_absent() {
        let resp = BookingChatResponse {
            speech: String::new(),
            intent: Intent::ProvideGuests,
            confidence: 1.0,
            extracted_slots: BookingSlots::default(),
            accumulated_slots: BookingSlots::default(),
            missing_slots: vec![],
            next_slot_to_ask: None,
            is_complete: false,
            persisted_booking_id: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("persistedBookingId"));
    }
}

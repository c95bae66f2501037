//! General chat brain: conversational turns outside the booking flow.
//!
//! The LLM proposes `{speech, intent, confidence}`; this module validates
//! the proposal against the strict intent enum and falls back to a canned
//! reply on any failure. The endpoint always answers 200 with a valid
//! `ChatResponse` — a confused model must read as a polite kiosk, not an
//! HTTP error.

use chrono::{Timelike, Utc};

use crate::brain::types::{ChatRequest, ChatResponse, HistoryRole};
use crate::fsm::{Intent, UiState};
use crate::server::llm::{LlmClient, LlmMessage, extract_first_json};
use crate::server::sessions::SessionStore;
use crate::store::Tenant;

/// Spoken when the LLM is unreachable or replies with garbage.
pub const FALLBACK_SPEECH: &str =
    "I'm having trouble understanding. Please use the touch screen.";

/// Messages of history included in each prompt.
const PROMPT_HISTORY: usize = 6;

/// Run one general-chat turn.
///
/// Session memory is wiped when the kiosk reports IDLE or WELCOME, before
/// anything else happens — a guest walking away must not leave transcripts
/// behind for the next one.
pub async fn chat_turn(
    llm: &LlmClient,
    sessions: &SessionStore,
    tenant: &Tenant,
    req: &ChatRequest,
) -> ChatResponse {
    if matches!(req.current_state, UiState::Idle | UiState::Welcome) {
        sessions.wipe(&req.session_id);
    }

    let transcript = req.transcript.trim();
    if transcript.is_empty() {
        return ChatResponse {
            speech: String::new(),
            intent: Intent::VoiceSilence,
            confidence: 1.0,
        };
    }

    let mut messages = vec![LlmMessage::system(build_system_prompt(
        tenant,
        req.current_state,
    ))];
    for msg in sessions.recent_history(&req.session_id, PROMPT_HISTORY) {
        messages.push(match msg.role {
            HistoryRole::User => LlmMessage::user(msg.content),
            HistoryRole::Assistant => LlmMessage::assistant(msg.content),
        });
    }
    messages.push(LlmMessage::user(transcript.to_owned()));

    let response = match llm.complete(&messages).await {
        Ok(raw) => validate_reply(&raw).unwrap_or_else(|| {
            tracing::warn!("chat reply failed schema validation");
            fallback_response()
        }),
        Err(e) => {
            tracing::warn!("chat LLM call failed: {e}");
            fallback_response()
        }
    };

    sessions.append(&req.session_id, HistoryRole::User, transcript);
    sessions.append(&req.session_id, HistoryRole::Assistant, response.speech.clone());

    response
}

fn fallback_response() -> ChatResponse {
    ChatResponse {
        speech: FALLBACK_SPEECH.to_owned(),
        intent: Intent::Unknown,
        confidence: 0.0,
    }
}

/// Parse and validate a raw LLM reply into a `ChatResponse`.
///
/// Returns `None` when no JSON object is found, required fields are
/// missing, the intent is not a known enum value, or confidence leaves
/// `0..=1`.
pub fn validate_reply(raw: &str) -> Option<ChatResponse> {
    let json = extract_first_json(raw)?;
    let value: serde_json::Value = serde_json::from_str(json).ok()?;

    let speech = value.get("speech")?.as_str()?.to_owned();
    let intent: Intent = serde_json::from_value(value.get("intent")?.clone()).ok()?;
    let confidence = value.get("confidence")?.as_f64()?;
    if !(0.0..=1.0).contains(&confidence) {
        return None;
    }

    Some(ChatResponse {
        speech,
        intent,
        confidence: confidence as f32,
    })
}

/// Day-part greeting in the tenant's timezone.
pub fn greeting_for(tenant: &Tenant, now: chrono::DateTime<Utc>) -> &'static str {
    let tz: chrono_tz::Tz = tenant.timezone.parse().unwrap_or(chrono_tz::UTC);
    let hour = now.with_timezone(&tz).hour();
    match hour {
        0..=11 => "Morning",
        12..=16 => "Afternoon",
        _ => "Evening",
    }
}

/// Hotel-context system prompt for the general chat brain.
fn build_system_prompt(tenant: &Tenant, state: UiState) -> String {
    let now = Utc::now();
    let tz: chrono_tz::Tz = tenant.timezone.parse().unwrap_or(chrono_tz::UTC);
    let local = now.with_timezone(&tz);
    let intents = "PROXIMITY_DETECTED, RESET, BACK_REQUESTED, CANCEL_REQUESTED, \
         CHECK_IN_SELECTED, BOOK_ROOM_SELECTED, HELP_SELECTED, GENERAL_QUERY, \
         EXPLAIN_CAPABILITIES, UNKNOWN";

    format!(
        "You are the front-desk voice of {name}, a self-service hotel kiosk.\n\
         It is {greeting} ({time} local time). The kiosk screen currently shows {state}.\n\
         Hotel amenities: {amenities}.\n\
         Check-in from {check_in}, check-out by {check_out}.\n\
         Answer in one or two short spoken sentences.\n\
         Reply with exactly one JSON object and nothing else:\n\
         {{\"speech\": string, \"intent\": one of [{intents}], \"confidence\": number 0..1}}",
        name = tenant.name,
        greeting = greeting_for(tenant, now),
        time = local.format("%H:%M"),
        state = serde_json::to_string(&state).unwrap_or_default(),
        amenities = tenant.amenities.join(", "),
        check_in = tenant.check_in_time,
        check_out = tenant.check_out_time,
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn tenant() -> Tenant {
        Tenant {
            id: Uuid::new_v4(),
            slug: "grand-hotel".to_owned(),
            name: "The Grand Hotel".to_owned(),
            timezone: "Asia/Kolkata".to_owned(),
            check_in_time: "14:00".to_owned(),
            check_out_time: "11:00".to_owned(),
            amenities: vec!["Pool".to_owned()],
        }
    }

    #[test]
    fn validate_accepts_well_formed_reply() {
        let raw = r#"{"speech": "Welcome!", "intent": "GENERAL_QUERY", "confidence": 0.8}"#;
        let resp = validate_reply(raw).unwrap();
        assert_eq!(resp.intent, Intent::GeneralQuery);
        assert_eq!(resp.speech, "Welcome!");
    }

    #[test]
    fn validate_accepts_reply_wrapped_in_prose() {
        let raw = "Here you go: {\"speech\": \"Hi\", \"intent\": \"HELP_SELECTED\", \"confidence\": 1.0} done";
        assert!(validate_reply(raw).is_some());
    }

    #[test]
    fn validate_rejects_unknown_intent() {
        let raw = r#"{"speech": "x", "intent": "MAKE_COFFEE", "confidence": 0.5}"#;
        assert!(validate_reply(raw).is_none());
    }

    #[test]
    fn validate_rejects_out_of_range_confidence() {
        let raw = r#"{"speech": "x", "intent": "GENERAL_QUERY", "confidence": 1.5}"#;
        assert!(validate_reply(raw).is_none());
    }

    #[test]
    fn validate_rejects_missing_fields_and_non_json() {
        assert!(validate_reply(r#"{"intent": "GENERAL_QUERY", "confidence": 1}"#).is_none());
        assert!(validate_reply("the model rambled with no json").is_none());
    }

    #[test]
    fn greeting_follows_tenant_timezone() {
        let t = tenant();
        // 03:00 UTC is 08:30 in Kolkata — morning.
        let morning = Utc.with_ymd_and_hms(2026, 2, 13, 3, 0, 0).unwrap();
        assert_eq!(greeting_for(&t, morning), "Morning");
        // 09:00 UTC is 14:30 in Kolkata — afternoon.
        let afternoon = Utc.with_ymd_and_hms(2026, 2, 13, 9, 0, 0).unwrap();
        assert_eq!(greeting_for(&t, afternoon), "Afternoon");
        // 15:00 UTC is 20:30 in Kolkata — evening.
        let evening = Utc.with_ymd_and_hms(2026, 2, 13, 15, 0, 0).unwrap();
        assert_eq!(greeting_for(&t, evening), "Evening");
    }

    #[test]
    fn system_prompt_carries_hotel_context() {
        let prompt = build_system_prompt(&tenant(), UiState::AiChat);
        assert!(prompt.contains("The Grand Hotel"));
        assert!(prompt.contains("Pool"));
        assert!(prompt.contains("AI_CHAT"));
        assert!(prompt.contains("14:00"));
    }
}

//! Booking brain: conversational slot filling over live room inventory.
//!
//! The LLM proposes intent and extracted slots; deterministic guardrails
//! re-derive anything it missed and override anything it got wrong about
//! the active slot. Persistence happens here too, inside the store's
//! single-transaction upsert, so a "confirm" turn either lands a booking
//! or surfaces a date conflict — never half of each.

use chrono::Utc;
use uuid::Uuid;

use crate::brain::types::{BookingChatRequest, BookingChatResponse, HistoryRole};
use crate::error::{KioskError, Result};
use crate::fsm::Intent;
use crate::normalize::{self, is_topic_change, parse_count, parse_iso_date};
use crate::server::chat::greeting_for;
use crate::server::llm::{LlmClient, LlmMessage, extract_first_json};
use crate::server::sessions::SessionStore;
use crate::slots::{BookingSlots, MAX_ADULTS, MAX_CHILDREN, SlotKey, SlotValueKind};
use crate::store::{BookingStore, PersistBooking, Room, Tenant};

/// Messages of history included in each prompt.
const PROMPT_HISTORY: usize = 6;

/// Intents the LLM may legitimately return while a slot is active.
///
/// `CONFIRM_BOOKING` stays legitimate: the final slot answer often carries
/// the confirmation in the same breath ("John Smith, confirm it"), and
/// coercing it away would leave the booking stuck as a draft.
const ON_SLOT_INTENTS: &[Intent] = &[
    Intent::ProvideGuests,
    Intent::ProvideDates,
    Intent::ProvideName,
    Intent::ConfirmBooking,
    Intent::ModifyBooking,
    Intent::CancelBooking,
    Intent::BackRequested,
];

/// What the LLM proposed for one booking turn.
#[derive(Debug, Clone)]
struct LlmProposal {
    speech: String,
    intent: Intent,
    confidence: f32,
    extracted: BookingSlots,
    is_complete: bool,
}

impl Default for LlmProposal {
    fn default() -> Self {
        Self {
            speech: String::new(),
            intent: Intent::Unknown,
            confidence: 0.0,
            extracted: BookingSlots::default(),
            is_complete: false,
        }
    }
}

/// Run one booking turn. Returns the wire response or a typed error the
/// router maps to 409/404/500.
///
/// # Errors
///
/// `KioskError::BookingConflict` when the requested dates collide with a
/// confirmed stay; `KioskError::Store` on persistence failure.
pub async fn booking_turn(
    llm: &LlmClient,
    sessions: &SessionStore,
    store: &BookingStore,
    tenant: &Tenant,
    req: &BookingChatRequest,
) -> Result<BookingChatResponse> {
    let transcript = req.transcript.trim();
    let normalized = normalize::normalize(transcript);
    let rooms = store.rooms_for_tenant(tenant.id)?;

    // Session slots merged with the client echo; non-empty echo wins.
    let mut accumulated = sessions.slots(&req.session_id);
    accumulated.merge_from(&req.filled_slots);

    let proposal = match ask_llm(llm, sessions, tenant, &rooms, req, &accumulated).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("booking LLM unavailable, using deterministic extraction: {e}");
            LlmProposal::default()
        }
    };

    let mut intent = proposal.intent;
    let mut extracted = proposal.extracted;

    // Guardrail: while a slot is active, an off-topic intent that is not an
    // explicit topic change is coerced to the slot's expected intent.
    if let Some(active) = req.active_slot
        && !ON_SLOT_INTENTS.contains(&intent)
        && !is_topic_change(&normalized)
    {
        intent = active.expected_intent();
    }

    // Guardrail: synthesize the active slot's value from the transcript
    // when the LLM extracted nothing for it.
    if let Some(active) = req.active_slot {
        synthesize_active_slot(&mut extracted, active, req.expected_type, transcript, &normalized);
    }

    accumulated.merge_from(&extracted);

    // Resolve the room against live inventory and canonicalize to its code.
    let resolved_room = accumulated
        .room_type
        .as_deref()
        .and_then(|text| resolve_room(&rooms, text))
        .cloned();
    if let Some(ref room) = resolved_room {
        accumulated.room_type = Some(room.code.clone());
        accumulated.recompute_nights();
        accumulated.recompute_total(room.price_cents);
    }

    let missing = accumulated.missing();
    let next_slot_to_ask = accumulated.next_to_ask();
    let is_complete = accumulated.is_complete() && resolved_room.is_some();

    let confirming = intent == Intent::ConfirmBooking;
    let mut persisted_booking_id = None;
    if (is_complete && proposal.is_complete) || (confirming && is_complete) {
        let room = resolved_room
            .clone()
            .ok_or_else(|| KioskError::Brain("complete booking without a room".to_owned()))?;
        persisted_booking_id = Some(persist(sessions, store, tenant, &room, &accumulated, req, confirming)?);
    }

    sessions.set_slots(&req.session_id, accumulated.clone());

    let speech = if proposal.speech.is_empty() {
        deterministic_speech(&accumulated, next_slot_to_ask, is_complete)
    } else {
        proposal.speech
    };

    if !transcript.is_empty() {
        sessions.append(&req.session_id, HistoryRole::User, transcript);
        sessions.append(&req.session_id, HistoryRole::Assistant, speech.clone());
    }

    // A fully-collected form reads as a confirm regardless of what the
    // model thought the guest meant.
    if is_complete && intent == Intent::Unknown {
        intent = Intent::ConfirmBooking;
    }

    Ok(BookingChatResponse {
        speech,
        intent,
        confidence: if proposal.confidence > 0.0 {
            proposal.confidence
        } else {
            0.9
        },
        extracted_slots: extracted,
        accumulated_slots: accumulated,
        missing_slots: missing,
        next_slot_to_ask,
        is_complete,
        persisted_booking_id,
    })
}

fn persist(
    sessions: &SessionStore,
    store: &BookingStore,
    tenant: &Tenant,
    room: &Room,
    slots: &BookingSlots,
    req: &BookingChatRequest,
    confirm: bool,
) -> Result<Uuid> {
    let (check_in, check_out, guest_name, adults) = match (
        slots.check_in_date,
        slots.check_out_date,
        slots.guest_name.as_deref(),
        slots.adults,
    ) {
        (Some(ci), Some(co), Some(name), Some(adults)) => (ci, co, name, adults),
        _ => return Err(KioskError::Brain("persist called with missing slots".to_owned())),
    };

    let outcome = store.persist_booking(&PersistBooking {
        tenant_id: tenant.id,
        room: room.clone(),
        guest_name: guest_name.to_owned(),
        check_in,
        check_out,
        adults,
        children: slots.children,
        session_id: req.session_id.clone(),
        existing_booking_id: sessions.booking_id(&req.session_id),
        confirm,
    })?;

    sessions.set_booking_id(&req.session_id, outcome.booking.id);
    Ok(outcome.booking.id)
}

/// Fill the active slot from the normalized transcript when the extraction
/// came back empty.
fn synthesize_active_slot(
    extracted: &mut BookingSlots,
    active: SlotKey,
    expected: Option<SlotValueKind>,
    raw: &str,
    normalized: &str,
) {
    let expected = expected.unwrap_or(active.expected_kind());
    match (active, expected) {
        (SlotKey::Adults, SlotValueKind::Number) if extracted.adults.is_none() => {
            if let Some(n) = parse_count(normalized).filter(|n| (1..=MAX_ADULTS).contains(n)) {
                extracted.adults = Some(n);
            }
        }
        (SlotKey::Children, SlotValueKind::Number) if extracted.children.is_none() => {
            if let Some(n) = parse_count(normalized).filter(|n| *n <= MAX_CHILDREN) {
                extracted.children = Some(n);
            }
        }
        (SlotKey::CheckInDate, SlotValueKind::Date) if extracted.check_in_date.is_none() => {
            extracted.check_in_date = parse_iso_date(raw);
        }
        (SlotKey::CheckOutDate, SlotValueKind::Date) if extracted.check_out_date.is_none() => {
            extracted.check_out_date = parse_iso_date(raw);
        }
        (SlotKey::GuestName, SlotValueKind::String)
            if extracted.guest_name.as_deref().is_none_or(str::is_empty) && !raw.is_empty() =>
        {
            extracted.guest_name = Some(raw.to_owned());
        }
        (SlotKey::RoomType, SlotValueKind::String)
            if extracted.room_type.as_deref().is_none_or(str::is_empty) && !raw.is_empty() =>
        {
            extracted.room_type = Some(raw.to_owned());
        }
        _ => {}
    }
}

/// Resolve a spoken room reference against tenant inventory.
///
/// Match order: exact code, name substring (either direction), family
/// keyword.
pub fn resolve_room<'a>(rooms: &'a [Room], text: &str) -> Option<&'a Room> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    if let Some(room) = rooms.iter().find(|r| {
        let code = r.code.to_lowercase();
        code == needle || code.replace('_', " ") == needle
    }) {
        return Some(room);
    }

    if let Some(room) = rooms.iter().find(|r| {
        let name = r.name.to_lowercase();
        needle.contains(&name) || name.contains(&needle)
    }) {
        return Some(room);
    }

    for family in ["PRESIDENTIAL", "DELUXE", "STANDARD"] {
        let family_lower = family.to_lowercase();
        if needle.contains(&family_lower) {
            if let Some(room) = rooms
                .iter()
                .find(|r| r.code.contains(family) || r.name.to_uppercase().contains(family))
            {
                return Some(room);
            }
        }
    }

    None
}

/// Speech produced without the LLM: ask for the next slot, or read back a
/// complete form.
fn deterministic_speech(
    slots: &BookingSlots,
    next: Option<SlotKey>,
    is_complete: bool,
) -> String {
    if is_complete {
        let nights = slots.nights.unwrap_or(0);
        return format!(
            "I have {name}, {adults} adults, {nights} nights in {room}. Shall I confirm?",
            name = slots.guest_name.as_deref().unwrap_or("your booking"),
            adults = slots.adults.unwrap_or(0),
            room = slots.room_type.as_deref().unwrap_or("the room"),
        );
    }
    match next {
        Some(slot) => slot.ask_prompt().to_owned(),
        None => "Could you repeat that?".to_owned(),
    }
}

async fn ask_llm(
    llm: &LlmClient,
    sessions: &SessionStore,
    tenant: &Tenant,
    rooms: &[Room],
    req: &BookingChatRequest,
    accumulated: &BookingSlots,
) -> Result<LlmProposal> {
    if req.transcript.trim().is_empty() {
        return Ok(LlmProposal::default());
    }

    let mut messages = vec![LlmMessage::system(build_system_prompt(
        tenant,
        rooms,
        req,
        accumulated,
    ))];
    for msg in sessions.recent_history(&req.session_id, PROMPT_HISTORY) {
        messages.push(match msg.role {
            HistoryRole::User => LlmMessage::user(msg.content),
            HistoryRole::Assistant => LlmMessage::assistant(msg.content),
        });
    }
    messages.push(LlmMessage::user(req.transcript.trim().to_owned()));

    let raw = llm.complete(&messages).await?;
    parse_proposal(&raw)
        .ok_or_else(|| KioskError::Llm("booking reply failed schema validation".to_owned()))
}

/// Parse and validate the booking brain's strict JSON reply.
fn parse_proposal(raw: &str) -> Option<LlmProposal> {
    let json = extract_first_json(raw)?;
    let value: serde_json::Value = serde_json::from_str(json).ok()?;

    let speech = value.get("speech")?.as_str()?.to_owned();
    let intent: Intent = serde_json::from_value(value.get("intent")?.clone()).ok()?;
    let confidence = value.get("confidence")?.as_f64()?;
    if !(0.0..=1.0).contains(&confidence) {
        return None;
    }

    let extracted: BookingSlots = value
        .get("extractedSlots")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let is_complete = value
        .get("isComplete")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    Some(LlmProposal {
        speech,
        intent,
        confidence: confidence as f32,
        extracted,
        is_complete,
    })
}

fn build_system_prompt(
    tenant: &Tenant,
    rooms: &[Room],
    req: &BookingChatRequest,
    accumulated: &BookingSlots,
) -> String {
    let inventory: String = rooms
        .iter()
        .map(|r| {
            format!(
                "- {code}: {name}, ${price:.2}/night, amenities: {amenities}\n",
                code = r.code,
                name = r.name,
                price = r.price_cents as f64 / 100.0,
                amenities = r.amenities.join(", "),
            )
        })
        .collect();

    let slot_map = serde_json::to_string(accumulated).unwrap_or_else(|_| "{}".to_owned());
    let missing: Vec<String> = accumulated
        .missing()
        .iter()
        .filter_map(|k| serde_json::to_string(k).ok())
        .collect();

    let active_hint = match req.active_slot {
        Some(slot) => format!(
            "The kiosk just asked for {slot} (expects a {kind}). Interpret short answers as that slot.\n",
            slot = serde_json::to_string(&slot).unwrap_or_default(),
            kind = serde_json::to_string(&slot.expected_kind()).unwrap_or_default(),
        ),
        None => String::new(),
    };
    let last_prompt = match req.last_system_prompt.as_deref() {
        Some(p) => format!("The kiosk last said: \"{p}\"\n"),
        None => String::new(),
    };

    format!(
        "You collect hotel booking details at the {name} self-service kiosk. \
         It is {greeting} at the hotel.\n\
         Available rooms:\n{inventory}\
         Slots so far: {slot_map}\n\
         Still missing: [{missing}]\n\
         {active_hint}{last_prompt}\
         Extract any slot values from the guest's words. Dates are ISO YYYY-MM-DD. \
         Keep speech to one short spoken sentence asking for the next missing slot, \
         or summarize when everything is filled.\n\
         Reply with exactly one JSON object and nothing else:\n\
         {{\"speech\": string, \"intent\": one of [SELECT_ROOM, PROVIDE_GUESTS, PROVIDE_DATES, \
         PROVIDE_NAME, CONFIRM_BOOKING, MODIFY_BOOKING, CANCEL_BOOKING, ASK_ROOM_DETAIL, \
         ASK_PRICE, COMPARE_ROOMS, GENERAL_QUERY, BACK_REQUESTED, UNKNOWN], \
         \"confidence\": number 0..1, \
         \"extractedSlots\": {{\"roomType\"?, \"adults\"?, \"children\"?, \"checkInDate\"?, \
         \"checkOutDate\"?, \"guestName\"?}}, \
         \"isComplete\": boolean}}",
        name = tenant.name,
        greeting = greeting_for(tenant, Utc::now()),
        missing = missing.join(", "),
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn rooms() -> Vec<Room> {
        let tenant_id = Uuid::new_v4();
        vec![
            Room {
                id: Uuid::new_v4(),
                tenant_id,
                code: "STANDARD_CITY".to_owned(),
                name: "Standard City Room".to_owned(),
                price_cents: 9_900,
                amenities: vec![],
            },
            Room {
                id: Uuid::new_v4(),
                tenant_id,
                code: "DELUXE_OCEAN".to_owned(),
                name: "Ocean View Deluxe".to_owned(),
                price_cents: 15_000,
                amenities: vec![],
            },
        ]
    }

    #[test]
    fn room_resolution_by_exact_code() {
        let rooms = rooms();
        assert_eq!(
            resolve_room(&rooms, "DELUXE_OCEAN").unwrap().code,
            "DELUXE_OCEAN"
        );
        assert_eq!(
            resolve_room(&rooms, "deluxe ocean").unwrap().code,
            "DELUXE_OCEAN"
        );
    }

    #[test]
    fn room_resolution_by_name_substring() {
        let rooms = rooms();
        assert_eq!(
            resolve_room(&rooms, "the ocean view deluxe").unwrap().code,
            "DELUXE_OCEAN"
        );
        assert_eq!(
            resolve_room(&rooms, "ocean view").unwrap().code,
            "DELUXE_OCEAN"
        );
    }

    #[test]
    fn room_resolution_by_family_keyword() {
        let rooms = rooms();
        assert_eq!(
            resolve_room(&rooms, "something standard please").unwrap().code,
            "STANDARD_CITY"
        );
    }

    #[test]
    fn room_resolution_misses_cleanly() {
        let rooms = rooms();
        assert!(resolve_room(&rooms, "the penthouse").is_none());
        assert!(resolve_room(&rooms, "").is_none());
    }

    #[test]
    fn synthesize_fills_numeric_active_slot() {
        let mut extracted = BookingSlots::default();
        synthesize_active_slot(
            &mut extracted,
            SlotKey::Adults,
            Some(SlotValueKind::Number),
            "two",
            "two",
        );
        assert_eq!(extracted.adults, Some(2));
    }

    #[test]
    fn synthesize_respects_bounds() {
        let mut extracted = BookingSlots::default();
        synthesize_active_slot(
            &mut extracted,
            SlotKey::Adults,
            Some(SlotValueKind::Number),
            "nine",
            "nine",
        );
        assert_eq!(extracted.adults, None);

        synthesize_active_slot(
            &mut extracted,
            SlotKey::Children,
            Some(SlotValueKind::Number),
            "no kids",
            "no kids",
        );
        assert_eq!(extracted.children, Some(0));
    }

    #[test]
    fn synthesize_does_not_overwrite_llm_extraction() {
        let mut extracted = BookingSlots {
            adults: Some(3),
            ..Default::default()
        };
        synthesize_active_slot(
            &mut extracted,
            SlotKey::Adults,
            Some(SlotValueKind::Number),
            "two",
            "two",
        );
        assert_eq!(extracted.adults, Some(3));
    }

    #[test]
    fn synthesize_fills_dates_and_name() {
        let mut extracted = BookingSlots::default();
        synthesize_active_slot(
            &mut extracted,
            SlotKey::CheckInDate,
            Some(SlotValueKind::Date),
            "2026-02-13",
            "2026-02-13",
        );
        assert!(extracted.check_in_date.is_some());

        synthesize_active_slot(
            &mut extracted,
            SlotKey::GuestName,
            Some(SlotValueKind::String),
            "John Smith",
            "john smith",
        );
        assert_eq!(extracted.guest_name.as_deref(), Some("John Smith"));
    }

    #[test]
    fn proposal_parser_accepts_full_reply() {
        let raw = r#"{"speech": "How many adults?", "intent": "SELECT_ROOM",
                      "confidence": 0.8,
                      "extractedSlots": {"roomType": "DELUXE_OCEAN"},
                      "isComplete": false}"#;
        let p = parse_proposal(raw).unwrap();
        assert_eq!(p.intent, Intent::SelectRoom);
        assert_eq!(p.extracted.room_type.as_deref(), Some("DELUXE_OCEAN"));
        assert!(!p.is_complete);
    }

    #[test]
    fn proposal_parser_tolerates_missing_optional_fields() {
        let raw = r#"{"speech": "ok", "intent": "PROVIDE_GUESTS", "confidence": 1.0}"#;
        let p = parse_proposal(raw).unwrap();
        assert_eq!(p.extracted, BookingSlots::default());
        assert!(!p.is_complete);
    }

    #[test]
    fn proposal_parser_rejects_bad_intent() {
        let raw = r#"{"speech": "ok", "intent": "DO_MAGIC", "confidence": 1.0}"#;
        assert!(parse_proposal(raw).is_none());
    }
}

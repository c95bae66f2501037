#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;

use super::*;
use crate::brain::types::{BookingChatResponse, ChatResponse};
use crate::slots::BookingSlots;

struct RecordingSpeaker {
    spoken: Mutex<Vec<String>>,
    stops: AtomicUsize,
}

impl RecordingSpeaker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        })
    }

    fn last(&self) -> Option<String> {
        self.spoken.lock().unwrap().last().cloned()
    }
}

impl Speaker for RecordingSpeaker {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_owned());
    }

    fn hard_stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_speaking(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct RecordingVoice {
    starts: AtomicUsize,
    stops: AtomicUsize,
    hard_stops: AtomicUsize,
    clears: AtomicUsize,
}

impl VoiceControl for RecordingVoice {
    fn start_listening(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_listening(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn hard_stop_all(&self) {
        self.hard_stops.fetch_add(1, Ordering::SeqCst);
    }

    fn clear_session(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedBrain {
    chat_replies: Mutex<VecDeque<Result<ChatResponse>>>,
    booking_replies: Mutex<VecDeque<Result<BookingChatResponse>>>,
    rooms: Vec<RoomSummary>,
}

impl ScriptedBrain {
    fn new(rooms: Vec<RoomSummary>) -> Arc<Self> {
        Arc::new(Self {
            chat_replies: Mutex::new(VecDeque::new()),
            booking_replies: Mutex::new(VecDeque::new()),
            rooms,
        })
    }

    fn push_booking(&self, reply: Result<BookingChatResponse>) {
        self.booking_replies.lock().unwrap().push_back(reply);
    }
}

#[async_trait]
impl BrainApi for ScriptedBrain {
    async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
        self.chat_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ChatResponse {
                    speech: "Happy to help.".to_owned(),
                    intent: Intent::GeneralQuery,
                    confidence: 0.9,
                })
            })
    }

    async fn booking_chat(&self, _req: BookingChatRequest) -> Result<BookingChatResponse> {
        self.booking_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(booking_reply(Intent::GeneralQuery, BookingSlots::default())))
    }

    async fn rooms(&self) -> Result<Vec<RoomSummary>> {
        Ok(self.rooms.clone())
    }
}

fn booking_reply(intent: Intent, accumulated: BookingSlots) -> BookingChatResponse {
    let missing = accumulated.missing();
    let next = accumulated.next_to_ask();
    let complete = accumulated.is_complete();
    BookingChatResponse {
        speech: next
            .map(|s| s.ask_prompt().to_owned())
            .unwrap_or_else(|| "All set.".to_owned()),
        intent,
        confidence: 0.9,
        extracted_slots: BookingSlots::default(),
        accumulated_slots: accumulated,
        missing_slots: missing,
        next_slot_to_ask: next,
        is_complete: complete,
        persisted_booking_id: None,
    }
}

fn rooms() -> Vec<RoomSummary> {
    vec![
        RoomSummary {
            code: "STANDARD_CITY".to_owned(),
            name: "Standard City Room".to_owned(),
            price_cents: 9_900,
            amenities: vec![],
        },
        RoomSummary {
            code: "DELUXE_OCEAN".to_owned(),
            name: "Ocean View Deluxe".to_owned(),
            price_cents: 15_000,
            amenities: vec![],
        },
    ]
}

struct Rig {
    mediator: IntentMediator,
    speaker: Arc<RecordingSpeaker>,
    voice: Arc<RecordingVoice>,
    brain: Arc<ScriptedBrain>,
    events: broadcast::Receiver<KioskEvent>,
}

fn rig() -> Rig {
    let speaker = RecordingSpeaker::new();
    let voice = Arc::new(RecordingVoice::default());
    let brain = ScriptedBrain::new(rooms());
    let (events_tx, events) = broadcast::channel(64);
    let mediator = IntentMediator::new(
        "The Grand Hotel",
        Arc::clone(&brain) as Arc<dyn BrainApi>,
        Arc::clone(&speaker) as Arc<dyn Speaker>,
        Arc::clone(&voice) as Arc<dyn VoiceControl>,
        events_tx,
    );
    Rig {
        mediator,
        speaker,
        voice,
        brain,
        events,
    }
}

/// Let the voice-gate cooldown lapse between spoken turns.
async fn next_turn() {
    tokio::time::sleep(std::time::Duration::from_millis(700)).await;
}

/// Walk a rig into BOOKING_COLLECT with a room already picked.
async fn rig_in_booking_collect() -> Rig {
    let mut r = rig();
    r.mediator
        .handle_transcript("I want to book a room", 0.9)
        .await;
    assert_eq!(r.mediator.state(), UiState::RoomSelect);
    next_turn().await;
    r.mediator
        .handle_transcript("the ocean view deluxe", 0.9)
        .await;
    assert_eq!(r.mediator.state(), UiState::BookingCollect);
    next_turn().await;
    r
}

#[tokio::test(start_paused = true)]
async fn fast_path_routes_booking_to_room_select() {
    let mut r = rig();
    r.mediator
        .handle_transcript("I want to book a room", 0.9)
        .await;

    assert_eq!(r.mediator.state(), UiState::RoomSelect);
    // Rooms were fetched for the screen.
    assert_eq!(r.mediator.view().rooms.len(), 2);
    // The fetching announcement was spoken.
    assert!(r.speaker.last().unwrap().contains("fetching available rooms"));
    // Voice restarted for the new screen.
    assert!(r.voice.starts.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn room_pick_moves_to_collect_and_asks_next_slot() {
    let r = rig_in_booking_collect().await;

    let view = r.mediator.view();
    assert_eq!(view.selected_room.as_ref().unwrap().code, "DELUXE_OCEAN");
    assert_eq!(view.slots.room_type.as_deref(), Some("DELUXE_OCEAN"));
    // The adults prompt was spoken and became the active slot.
    assert_eq!(r.speaker.last().unwrap(), SlotKey::Adults.ask_prompt());
    assert_eq!(
        r.mediator.slot_ctx,
        Some(SlotContext {
            slot: SlotKey::Adults,
            expected: SlotValueKind::Number,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn guardrail_coerces_off_slot_intent_to_provide_guests() {
    let mut r = rig_in_booking_collect().await;

    // The LLM misreads "two" as a room pick; the guardrail coerces it.
    let mut accumulated = r.mediator.view().slots.clone();
    accumulated.adults = Some(2);
    r.brain
        .push_booking(Ok(booking_reply(Intent::SelectRoom, accumulated)));

    r.mediator.handle_transcript("two", 0.9).await;

    assert_eq!(r.mediator.state(), UiState::BookingCollect);
    assert_eq!(r.mediator.view().slots.adults, Some(2));
    // The dispatched intent was the coerced one.
    let mut saw_provide_guests = false;
    while let Ok(event) = r.events.try_recv() {
        if let KioskEvent::IntentDispatched { intent, .. } = event {
            saw_provide_guests |= intent == Intent::ProvideGuests;
            assert_ne!(intent, Intent::SelectRoom, "uncoerced intent leaked through");
        }
    }
    assert!(saw_provide_guests);
}

#[tokio::test(start_paused = true)]
async fn is_complete_coerces_to_confirm_and_advances_to_summary() {
    let mut r = rig_in_booking_collect().await;

    let accumulated = BookingSlots {
        room_type: Some("DELUXE_OCEAN".to_owned()),
        adults: Some(2),
        children: Some(0),
        check_in_date: NaiveDate::parse_from_str("2026-02-13", "%Y-%m-%d").ok(),
        check_out_date: NaiveDate::parse_from_str("2026-02-15", "%Y-%m-%d").ok(),
        guest_name: Some("John Smith".to_owned()),
        nights: Some(2),
        total_price_cents: Some(30_000),
    };
    r.brain
        .push_booking(Ok(booking_reply(Intent::ProvideName, accumulated)));

    r.mediator.handle_transcript("John Smith", 0.9).await;
    assert_eq!(r.mediator.state(), UiState::BookingSummary);
}

#[tokio::test(start_paused = true)]
async fn voice_is_ignored_in_voice_off_states() {
    let mut r = rig();
    r.mediator
        .handle_intent(Intent::CheckInSelected, InputSource::Touch)
        .await;
    assert_eq!(r.mediator.state(), UiState::ScanId);

    let slots_before = r.mediator.view().slots.clone();
    r.mediator
        .handle_transcript("book a room please", 0.9)
        .await;

    // State and slots untouched; only telemetry emitted.
    assert_eq!(r.mediator.state(), UiState::ScanId);
    assert_eq!(r.mediator.view().slots, slots_before);
    let mut saw_rejection = false;
    while let Ok(event) = r.events.try_recv() {
        saw_rejection |= matches!(event, KioskEvent::VoiceAuthorityRejected { .. });
    }
    assert!(saw_rejection);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_rejects_rapid_second_transcript() {
    let mut r = rig();
    r.mediator.handle_transcript("help", 0.9).await;
    // Immediately again: inside the 600ms cooldown.
    r.mediator.handle_transcript("help me please", 0.9).await;

    let mut limited = 0;
    while let Ok(event) = r.events.try_recv() {
        if matches!(event, KioskEvent::VoiceRateLimited) {
            limited += 1;
        }
    }
    assert_eq!(limited, 1);
}

#[tokio::test(start_paused = true)]
async fn dedup_suppresses_identical_touch_intent() {
    let mut r = rig();
    r.mediator
        .handle_intent(Intent::BookRoomSelected, InputSource::Touch)
        .await;
    assert_eq!(r.mediator.state(), UiState::RoomSelect);

    // Double-tap: second arrives within the 800ms window.
    r.mediator
        .handle_intent(Intent::BookRoomSelected, InputSource::Touch)
        .await;

    let mut suppressed = false;
    while let Ok(event) = r.events.try_recv() {
        suppressed |= matches!(
            event,
            KioskEvent::DuplicateSuppressed {
                intent: Intent::BookRoomSelected
            }
        );
    }
    assert!(suppressed);
    assert_eq!(r.mediator.state(), UiState::RoomSelect);
}

#[tokio::test(start_paused = true)]
async fn touch_interrupt_hard_stops_audio_before_dispatch() {
    let mut r = rig();
    r.mediator
        .handle_intent(Intent::TouchSelected, InputSource::Touch)
        .await;

    assert_eq!(r.mediator.state(), UiState::ManualMenu);
    assert!(r.speaker.stops.load(Ordering::SeqCst) >= 1);
    assert!(r.voice.hard_stops.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_booking_asks_for_confirmation() {
    let mut r = rig_in_booking_collect().await;
    let session_before = r.mediator.session_id().to_owned();

    r.mediator.handle_transcript("cancel", 0.9).await;
    assert_eq!(r.mediator.state(), UiState::BookingCollect);
    assert_eq!(r.speaker.last().unwrap(), CANCEL_CONFIRM_PROMPT);

    // "yes" confirms: reset to IDLE and wipe the session.
    next_turn().await;
    r.mediator.handle_transcript("yes", 0.9).await;
    assert_eq!(r.mediator.state(), UiState::Idle);
    assert_ne!(r.mediator.session_id(), session_before);
    assert!(r.mediator.view().slots.room_type.is_none());
}

#[tokio::test(start_paused = true)]
async fn cancel_declined_resumes_the_flow() {
    let mut r = rig_in_booking_collect().await;

    r.mediator.handle_transcript("cancel", 0.9).await;
    next_turn().await;
    r.mediator.handle_transcript("no", 0.9).await;

    assert_eq!(r.mediator.state(), UiState::BookingCollect);
    assert_eq!(r.speaker.last().unwrap(), CONTINUE_SPEECH);
    assert_eq!(
        r.mediator.view().slots.room_type.as_deref(),
        Some("DELUXE_OCEAN")
    );
}

#[tokio::test(start_paused = true)]
async fn hindi_affirmative_confirms_cancel() {
    let mut r = rig_in_booking_collect().await;
    r.mediator.handle_transcript("cancel", 0.9).await;
    next_turn().await;
    r.mediator.handle_transcript("haan ji", 0.9).await;
    assert_eq!(r.mediator.state(), UiState::Idle);
}

#[tokio::test(start_paused = true)]
async fn date_conflict_speaks_regret_and_stays_in_collect() {
    let mut r = rig_in_booking_collect().await;

    r.brain.push_booking(Err(KioskError::BookingConflict(
        "room taken".to_owned(),
    )));
    next_turn().await;
    r.mediator.handle_transcript("2026-02-14", 0.9).await;

    assert_eq!(r.mediator.state(), UiState::BookingCollect);
    assert_eq!(r.speaker.last().unwrap(), DATE_CONFLICT_SPEECH);
}

#[tokio::test(start_paused = true)]
async fn summary_confirm_reaches_payment_which_is_voice_off() {
    let mut r = rig_in_booking_collect().await;

    // Jump to summary via a complete reply.
    let accumulated = BookingSlots {
        room_type: Some("DELUXE_OCEAN".to_owned()),
        adults: Some(2),
        children: Some(0),
        check_in_date: NaiveDate::parse_from_str("2026-02-13", "%Y-%m-%d").ok(),
        check_out_date: NaiveDate::parse_from_str("2026-02-15", "%Y-%m-%d").ok(),
        guest_name: Some("John Smith".to_owned()),
        nights: Some(2),
        total_price_cents: Some(30_000),
    };
    r.brain
        .push_booking(Ok(booking_reply(Intent::ConfirmBooking, accumulated)));
    next_turn().await;
    r.mediator.handle_transcript("confirm it", 0.9).await;
    assert_eq!(r.mediator.state(), UiState::BookingSummary);

    next_turn().await;
    r.mediator.handle_transcript("confirm", 0.9).await;
    assert_eq!(r.mediator.state(), UiState::Payment);

    // Payment is voice-off: further speech does nothing.
    next_turn().await;
    r.mediator.handle_transcript("go back", 0.9).await;
    assert_eq!(r.mediator.state(), UiState::Payment);
}

#[tokio::test(start_paused = true)]
async fn inactivity_returns_to_idle_and_wipes() {
    let mut r = rig_in_booking_collect().await;
    let session_before = r.mediator.session_id().to_owned();

    r.mediator.on_inactivity().await;

    assert_eq!(r.mediator.state(), UiState::Idle);
    assert_ne!(r.mediator.session_id(), session_before);
    assert!(r.voice.hard_stops.load(Ordering::SeqCst) >= 1);
    assert!(r.voice.clears.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn voice_abort_returns_toward_welcome() {
    let mut r = rig_in_booking_collect().await;
    r.mediator.on_voice_aborted().await;
    assert_eq!(r.mediator.state(), UiState::Welcome);
    assert!(r.mediator.view().slots.room_type.is_none());
}

#[tokio::test(start_paused = true)]
async fn back_from_summary_returns_to_collect() {
    let mut r = rig_in_booking_collect().await;

    let accumulated = BookingSlots {
        room_type: Some("DELUXE_OCEAN".to_owned()),
        adults: Some(2),
        children: Some(0),
        check_in_date: NaiveDate::parse_from_str("2026-02-13", "%Y-%m-%d").ok(),
        check_out_date: NaiveDate::parse_from_str("2026-02-15", "%Y-%m-%d").ok(),
        guest_name: Some("John Smith".to_owned()),
        nights: Some(2),
        total_price_cents: Some(30_000),
    };
    r.brain
        .push_booking(Ok(booking_reply(Intent::ConfirmBooking, accumulated)));
    next_turn().await;
    r.mediator.handle_transcript("that is everything", 0.9).await;
    assert_eq!(r.mediator.state(), UiState::BookingSummary);

    next_turn().await;
    r.mediator.handle_transcript("go back", 0.9).await;
    assert_eq!(r.mediator.state(), UiState::BookingCollect);
}

#[tokio::test(start_paused = true)]
async fn chat_brain_failure_speaks_canned_fallback() {
    let mut r = rig();
    r.brain
        .chat_replies
        .lock()
        .unwrap()
        .push_back(Err(KioskError::Brain("unreachable".to_owned())));

    r.mediator
        .handle_transcript("what time is breakfast served", 0.9)
        .await;

    // Free-form speech opened the chat surface even though the LLM failed.
    assert_eq!(r.mediator.state(), UiState::AiChat);
    assert_eq!(r.speaker.last().unwrap(), BRAIN_ERROR_SPEECH);
}

#[tokio::test(start_paused = true)]
async fn free_form_speech_at_welcome_opens_chat() {
    let mut r = rig();
    r.mediator
        .handle_transcript("what time is breakfast served", 0.9)
        .await;

    assert_eq!(r.mediator.state(), UiState::AiChat);
    // The chat reply is what the guest hears last.
    assert_eq!(r.speaker.last().unwrap(), "Happy to help.");
}

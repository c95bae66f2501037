//! The intent mediator: single entry point for kiosk state change.
//!
//! Everything that can move the screen — voice transcripts, touch, scanner
//! and dispenser events, timers — funnels through here. The mediator
//! applies per-state voice authority, rate limiting and dedup, routes
//! transcripts deterministically where it can and through the brain
//! endpoints where it must, then mediates the resulting intent through the
//! FSM. The LLM advises; the transition table decides.

pub mod authority;
pub mod fast_path;
pub mod limiter;
pub mod speech;

use std::sync::Arc;

use tokio::time::Instant;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::brain::types::{BookingChatRequest, BookingChatResponse, ChatRequest, ChatResponse};
use crate::error::{KioskError, Result};
use crate::events::{KioskEvent, RoomSummary, ViewData};
use crate::fsm::{self, Intent, UiState};
use crate::normalize::{self, Confirmation};
use crate::slots::{SlotKey, SlotValueKind, slot_from_prompt};
use fast_path::FastRoute;
use limiter::{GateVerdict, IntentDedup, VoiceGate};
use speech::{
    BRAIN_ERROR_SPEECH, CANCEL_CONFIRM_PROMPT, CONTINUE_SPEECH, DATE_CONFLICT_SPEECH,
    onboarding_prompt,
};

/// Where an intent entered the mediator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Voice,
    Touch,
    /// Hardware and timers: proximity, scanner, dispenser, resets.
    System,
}

/// Brain endpoints as seen from the mediator.
#[async_trait]
pub trait BrainApi: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;
    async fn booking_chat(&self, req: BookingChatRequest) -> Result<BookingChatResponse>;
    async fn rooms(&self) -> Result<Vec<RoomSummary>>;
}

/// Speech output as seen from the mediator. `speak` replaces any in-flight
/// utterance and returns immediately.
pub trait Speaker: Send + Sync {
    fn speak(&self, text: &str);
    fn hard_stop(&self);
    fn is_speaking(&self) -> bool;
}

/// Fire-and-forget speaker over the TTS controller.
pub struct TtsSpeaker(pub Arc<crate::tts::TtsController>);

impl Speaker for TtsSpeaker {
    fn speak(&self, text: &str) {
        let tts = Arc::clone(&self.0);
        let text = text.to_owned();
        tokio::spawn(async move {
            let _ = tts.speak(&text).await;
        });
    }

    fn hard_stop(&self) {
        self.0.hard_stop();
    }

    fn is_speaking(&self) -> bool {
        self.0.is_speaking()
    }
}

/// Voice session control as seen from the mediator.
pub trait VoiceControl: Send + Sync {
    fn start_listening(&self);
    fn stop_listening(&self);
    fn hard_stop_all(&self);
    fn clear_session(&self);
}

impl VoiceControl for crate::voice::VoiceHandle {
    fn start_listening(&self) {
        crate::voice::VoiceHandle::start_listening(self);
    }

    fn stop_listening(&self) {
        crate::voice::VoiceHandle::stop_listening(self);
    }

    fn hard_stop_all(&self) {
        crate::voice::VoiceHandle::hard_stop_all(self);
    }

    fn clear_session(&self) {
        crate::voice::VoiceHandle::clear_session(self);
    }
}

/// The slot the kiosk most recently asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotContext {
    slot: SlotKey,
    expected: SlotValueKind,
}

/// Number of slots the progress bar counts.
const SLOT_COUNT: usize = 6;

/// Central mediator between inputs, brains and the FSM.
pub struct IntentMediator {
    state: UiState,
    view: ViewData,
    session_id: String,
    tenant_name: String,

    gate: VoiceGate,
    dedup: IntentDedup,
    slot_ctx: Option<SlotContext>,
    pending_cancel: bool,
    last_prompt: Option<String>,
    last_activity: Instant,

    brain: Arc<dyn BrainApi>,
    speaker: Arc<dyn Speaker>,
    voice: Arc<dyn VoiceControl>,
    events: broadcast::Sender<KioskEvent>,
}

impl IntentMediator {
    /// Build the mediator. The kiosk resumes at WELCOME after any restart.
    pub fn new(
        tenant_name: impl Into<String>,
        brain: Arc<dyn BrainApi>,
        speaker: Arc<dyn Speaker>,
        voice: Arc<dyn VoiceControl>,
        events: broadcast::Sender<KioskEvent>,
    ) -> Self {
        Self {
            state: UiState::Welcome,
            view: ViewData::default(),
            session_id: Uuid::new_v4().to_string(),
            tenant_name: tenant_name.into(),
            gate: VoiceGate::new(),
            dedup: IntentDedup::new(),
            slot_ctx: None,
            pending_cancel: false,
            last_prompt: None,
            last_activity: Instant::now(),
            brain,
            speaker,
            voice,
            events,
        }
    }

    pub fn state(&self) -> UiState {
        self.state
    }

    pub fn view(&self) -> &ViewData {
        &self.view
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Instant of the last guest activity, for the inactivity timer.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    fn emit(&self, event: KioskEvent) {
        let _ = self.events.send(event);
    }

    fn touch_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Process a validated final transcript from the voice runtime.
    pub async fn handle_transcript(&mut self, text: &str, confidence: f32) {
        self.touch_activity();

        // Voice authority: forbidden states ignore voice entirely.
        if !authority::voice_allowed(self.state) {
            debug!("voice rejected by authority matrix in {:?}", self.state);
            self.emit(KioskEvent::VoiceAuthorityRejected {
                state: self.state,
                intent: Intent::VoiceTranscriptReceived,
            });
            return;
        }

        if self.gate.check(Instant::now()) == GateVerdict::RateLimited {
            self.emit(KioskEvent::VoiceRateLimited);
            return;
        }

        self.emit(KioskEvent::VoiceTranscriptReady {
            text: text.to_owned(),
            confidence,
        });

        let normalized = normalize::normalize(text);

        // A pending cancel owns the turn until resolved.
        if self.pending_cancel {
            self.resolve_pending_cancel(&normalized).await;
            return;
        }

        // Deterministic fast path.
        if let Some(route) = fast_path::fast_route(
            self.state,
            &normalized,
            &self.view.rooms,
            self.view.selected_room.as_ref(),
        ) {
            match route {
                FastRoute::Intent(intent) => {
                    self.dispatch(intent, None, None, InputSource::Voice).await;
                }
                FastRoute::RoomChoice(room) => {
                    self.dispatch(Intent::RoomSelected, Some(room), None, InputSource::Voice)
                        .await;
                }
            }
            return;
        }

        // LLM path.
        if matches!(
            self.state,
            UiState::RoomSelect | UiState::BookingCollect | UiState::BookingSummary
        ) {
            self.booking_llm_turn(text, &normalized).await;
        } else {
            // Free-form speech at the welcome screen opens the chat surface.
            if self.state == UiState::Welcome {
                self.dispatch(Intent::VoiceStarted, None, None, InputSource::Voice)
                    .await;
            }
            self.chat_llm_turn(text).await;
        }
    }

    /// Process an external intent: touch, scanner, dispenser, proximity.
    pub async fn handle_intent(&mut self, intent: Intent, source: InputSource) {
        self.touch_activity();

        // Touch authority is absolute: interrupts kill audio first.
        if source == InputSource::Touch && authority::is_interrupt(intent) {
            self.speaker.hard_stop();
            self.voice.hard_stop_all();
        }

        // A touch cancel resolves any pending confirmation immediately.
        if source == InputSource::Touch {
            self.pending_cancel = false;
        }

        self.dispatch(intent, None, None, source).await;
    }

    /// The guest stopped responding: wipe and fall back to IDLE.
    pub async fn on_inactivity(&mut self) {
        if self.state == UiState::Idle {
            return;
        }
        info!("inactivity timeout, returning to IDLE");
        self.speaker.hard_stop();
        self.voice.hard_stop_all();
        self.force_state(UiState::Idle, Intent::Reset);
    }

    /// The voice runtime aborted the session (silent-turn ladder).
    pub async fn on_voice_aborted(&mut self) {
        if matches!(self.state, UiState::Idle | UiState::Welcome) {
            return;
        }
        self.force_state(UiState::Welcome, Intent::CancelRequested);
    }

    async fn resolve_pending_cancel(&mut self, normalized: &str) {
        match normalize::classify_confirmation(normalized) {
            Confirmation::Affirmative => {
                self.pending_cancel = false;
                self.dispatch(Intent::Reset, None, None, InputSource::Voice).await;
            }
            Confirmation::Negative => {
                self.pending_cancel = false;
                self.speaker.speak(CONTINUE_SPEECH);
            }
            Confirmation::Unclear => {
                self.speaker.speak(CANCEL_CONFIRM_PROMPT);
            }
        }
    }

    async fn chat_llm_turn(&mut self, text: &str) {
        let req = ChatRequest {
            transcript: text.to_owned(),
            current_state: self.state,
            session_id: self.session_id.clone(),
        };
        match self.brain.chat(req).await {
            Ok(resp) => {
                self.dispatch(resp.intent, None, Some(resp.speech), InputSource::Voice)
                    .await;
            }
            Err(e) => {
                warn!("chat brain unavailable: {e}");
                self.speaker.speak(BRAIN_ERROR_SPEECH);
            }
        }
    }

    async fn booking_llm_turn(&mut self, text: &str, normalized: &str) {
        let req = BookingChatRequest {
            transcript: text.to_owned(),
            current_state: self.state,
            session_id: self.session_id.clone(),
            active_slot: self.slot_ctx.map(|c| c.slot),
            expected_type: self.slot_ctx.map(|c| c.expected),
            last_system_prompt: self.last_prompt.clone(),
            filled_slots: self.view.slots.clone(),
            conversation_history: Vec::new(),
        };

        let resp = match self.brain.booking_chat(req).await {
            Ok(resp) => resp,
            Err(KioskError::BookingConflict(_)) => {
                // Spoken regret, then back to date collection.
                self.speaker.speak(DATE_CONFLICT_SPEECH);
                if self.state == UiState::BookingSummary {
                    self.dispatch(Intent::ModifyBooking, None, None, InputSource::System)
                        .await;
                }
                return;
            }
            Err(e) => {
                warn!("booking brain unavailable: {e}");
                self.speaker.speak(BRAIN_ERROR_SPEECH);
                return;
            }
        };

        let mut intent = resp.intent;

        // Guardrail: while a slot is active, off-topic LLM intents are
        // coerced back to the slot unless the guest changed topic.
        if self.state == UiState::BookingCollect
            && let Some(ctx) = self.slot_ctx
            && matches!(
                intent,
                Intent::SelectRoom | Intent::GeneralQuery | Intent::Unknown
            )
            && !normalize::is_topic_change(normalized)
        {
            debug!("guardrail coerced {:?} to {:?}", intent, ctx.slot.expected_intent());
            intent = ctx.slot.expected_intent();
        }

        // A complete form is a confirm, whatever the model called it.
        if self.state == UiState::BookingCollect && resp.is_complete {
            intent = Intent::ConfirmBooking;
        }

        self.apply_booking_view(&resp);
        self.dispatch(intent, None, Some(resp.speech), InputSource::Voice)
            .await;
    }

    fn apply_booking_view(&mut self, resp: &BookingChatResponse) {
        self.view.slots = resp.accumulated_slots.clone();
        self.view.progress = (
            SLOT_COUNT.saturating_sub(resp.missing_slots.len()),
            SLOT_COUNT,
        );
        self.view.next_slot_prompt = resp.next_slot_to_ask.map(|s| s.ask_prompt().to_owned());

        // The active slot is done once a value lands in it.
        if let Some(ctx) = self.slot_ctx
            && slot_is_filled(&self.view, ctx.slot)
        {
            self.slot_ctx = None;
        }

        self.emit(KioskEvent::ViewDataUpdated(self.view.clone()));
    }

    /// Mediate one intent through the FSM and apply the consequences.
    async fn dispatch(
        &mut self,
        intent: Intent,
        room: Option<RoomSummary>,
        llm_speech: Option<String>,
        source: InputSource,
    ) {
        if !self.dedup.accept(intent, Instant::now()) {
            self.emit(KioskEvent::DuplicateSuppressed { intent });
            return;
        }
        self.emit(KioskEvent::IntentDispatched { intent, source: format!("{source:?}") });

        // Cancelling mid-booking is destructive: confirm it first.
        if source == InputSource::Voice
            && matches!(intent, Intent::CancelRequested | Intent::CancelBooking)
            && matches!(self.state, UiState::BookingCollect | UiState::BookingSummary)
        {
            self.pending_cancel = true;
            self.speaker.speak(CANCEL_CONFIRM_PROMPT);
            return;
        }

        let next = compute_next(self.state, intent);

        if let Some(room) = room {
            self.view.selected_room = Some(room.clone());
            self.view.slots.room_type = Some(room.code);
            self.emit(KioskEvent::ViewDataUpdated(self.view.clone()));
        }

        if next == self.state {
            // Conversational turn: audio stays up, the reply is spoken.
            if let Some(speech) = llm_speech.filter(|s| !s.is_empty()) {
                self.speak_prompt(&speech);
            }
            return;
        }

        // State change: tear down the previous screen's audio. The LLM's
        // speech is deliberately dropped — it would be cancelled by this
        // teardown anyway.
        self.speaker.hard_stop();
        self.voice.stop_listening();

        let from = self.state;
        self.state = next;
        self.emit(KioskEvent::ScreenChanged { from, to: next, intent });
        info!("screen {from:?} -> {next:?} on {intent:?}");

        if matches!(next, UiState::Idle | UiState::Welcome) {
            self.privacy_wipe();
        }

        if next == UiState::RoomSelect {
            self.refresh_rooms().await;
        }

        if let Some(prompt) = onboarding_prompt(next, &self.tenant_name, &self.view.slots) {
            self.speak_prompt(&prompt);
        }

        if authority::voice_allowed(next) {
            self.voice.start_listening();
        }
    }

    /// Speak a prompt and track which slot it asks for.
    ///
    /// A prompt that asks for nothing leaves the active slot alone — it is
    /// cleared when a payload fills it, not by small talk in between.
    fn speak_prompt(&mut self, text: &str) {
        self.speaker.speak(text);
        self.last_prompt = Some(text.to_owned());
        if let Some(slot) = slot_from_prompt(text) {
            self.slot_ctx = Some(SlotContext {
                slot,
                expected: slot.expected_kind(),
            });
        }
    }

    async fn refresh_rooms(&mut self) {
        match self.brain.rooms().await {
            Ok(rooms) => {
                self.view.rooms = rooms;
                self.emit(KioskEvent::ViewDataUpdated(self.view.clone()));
            }
            Err(e) => warn!("room fetch failed: {e}"),
        }
    }

    /// Jump straight to a state outside the normal dispatch path
    /// (inactivity, session abort).
    fn force_state(&mut self, to: UiState, intent: Intent) {
        let from = self.state;
        self.state = to;
        self.emit(KioskEvent::ScreenChanged { from, to, intent });
        if matches!(to, UiState::Idle | UiState::Welcome) {
            self.privacy_wipe();
        }
        if let Some(prompt) = onboarding_prompt(to, &self.tenant_name, &self.view.slots) {
            self.speak_prompt(&prompt);
        }
        if authority::voice_allowed(to) {
            self.voice.start_listening();
        }
    }

    /// Forget the guest: view data, slot context, prompts, and the session
    /// id the brains key their memory by.
    fn privacy_wipe(&mut self) {
        self.view = ViewData::default();
        self.slot_ctx = None;
        self.pending_cancel = false;
        self.last_prompt = None;
        self.session_id = Uuid::new_v4().to_string();
        self.voice.clear_session();
    }
}

/// The FSM verdict plus the mediator's overrides.
fn compute_next(state: UiState, intent: Intent) -> UiState {
    if intent == Intent::Reset {
        return UiState::Idle;
    }
    let next = fsm::transition(state, intent);
    if next == state
        && matches!(intent, Intent::BackRequested | Intent::CancelRequested)
        && fsm::metadata(state).can_go_back
    {
        return fsm::previous_state(state);
    }
    next
}

fn slot_is_filled(view: &ViewData, slot: SlotKey) -> bool {
    let slots = &view.slots;
    match slot {
        SlotKey::RoomType => slots.room_type.is_some(),
        SlotKey::Adults => slots.adults.is_some(),
        SlotKey::Children => slots.children.is_some(),
        SlotKey::CheckInDate => slots.check_in_date.is_some(),
        SlotKey::CheckOutDate => slots.check_out_date.is_some(),
        SlotKey::GuestName => slots.guest_name.is_some(),
    }
}

#[cfg(test)]
mod tests;

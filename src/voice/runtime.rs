//! The voice runtime task: one listening session at a time, driven by a
//! single select loop.
//!
//! Owns the mode machine, all per-turn timers, the silent-turn ladder,
//! barge-in, provider failover and the privacy wipe. Audio frames flow in
//! from capture, STT events flow back from the active provider session,
//! and validated transcripts flow out to the intent mediator.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{SILENCE_NUDGE, VoiceCommand, VoiceEvent, VoiceMode, validate_transcript};
use crate::audio::PcmFrame;
use crate::config::VoiceConfig;
use crate::stt::{SttConnector, SttEvent, SttSession};
use crate::tts::TtsController;

/// Sliding window length for reconnect protection.
const RECONNECT_WINDOW: Duration = Duration::from_secs(60);

/// Control handle held by the mediator and the coordinator.
#[derive(Clone)]
pub struct VoiceHandle {
    cmd_tx: mpsc::UnboundedSender<VoiceCommand>,
}

impl VoiceHandle {
    pub fn start_listening(&self) {
        let _ = self.cmd_tx.send(VoiceCommand::StartListening);
    }

    pub fn stop_listening(&self) {
        let _ = self.cmd_tx.send(VoiceCommand::StopListening);
    }

    pub fn hard_stop_all(&self) {
        let _ = self.cmd_tx.send(VoiceCommand::HardStopAll);
    }

    pub fn clear_session(&self) {
        let _ = self.cmd_tx.send(VoiceCommand::ClearSession);
    }
}

/// Which per-turn timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    NoSpeech,
    NoResult,
    MaxSession,
    Watchdog,
}

/// What the select loop decided to do next.
enum Decision {
    Cmd(Option<VoiceCommand>),
    Frame(PcmFrame),
    Stt(Option<SttEvent>),
    Timer(TimerKind),
}

struct ActiveSession {
    stt: SttSession,
    hard_cap_at: Instant,
    no_speech_at: Instant,
    no_result_at: Instant,
    watchdog_at: Instant,
    seen_interim: bool,
}

/// The duplex voice coordinator.
pub struct VoiceRuntime {
    config: VoiceConfig,
    primary: Arc<dyn SttConnector>,
    fallback: Option<Arc<dyn SttConnector>>,
    tts: Arc<TtsController>,
    sample_rate: u32,

    cmd_rx: mpsc::UnboundedReceiver<VoiceCommand>,
    frames_rx: mpsc::Receiver<PcmFrame>,
    events_tx: mpsc::Sender<VoiceEvent>,

    session: Option<ActiveSession>,
    failed_over: bool,
    silent_turns: u32,
    session_starts: VecDeque<Instant>,
}

impl VoiceRuntime {
    /// Build the runtime and its control handle.
    ///
    /// `frames_rx` carries capture frames at `sample_rate`; `events_tx`
    /// feeds the mediator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: VoiceConfig,
        primary: Arc<dyn SttConnector>,
        fallback: Option<Arc<dyn SttConnector>>,
        tts: Arc<TtsController>,
        sample_rate: u32,
        frames_rx: mpsc::Receiver<PcmFrame>,
        events_tx: mpsc::Sender<VoiceEvent>,
    ) -> (Self, VoiceHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                primary,
                fallback,
                tts,
                sample_rate,
                cmd_rx,
                frames_rx,
                events_tx,
                session: None,
                failed_over: false,
                silent_turns: 0,
                session_starts: VecDeque::new(),
            },
            VoiceHandle { cmd_tx },
        )
    }

    /// Current coarse mode.
    fn mode(&self) -> VoiceMode {
        if self.session.is_some() {
            VoiceMode::Listening
        } else if self.tts.is_speaking() {
            VoiceMode::Speaking
        } else {
            VoiceMode::Idle
        }
    }

    /// Run until the command channel closes.
    pub async fn run(mut self) {
        loop {
            let timer = self.next_deadline();

            let decision = tokio::select! {
                cmd = self.cmd_rx.recv() => Decision::Cmd(cmd),

                Some(frame) = self.frames_rx.recv() => Decision::Frame(frame),

                event = async {
                    match self.session.as_mut() {
                        Some(s) => s.stt.events.recv().await,
                        None => std::future::pending().await,
                    }
                } => Decision::Stt(event),

                _ = async {
                    match timer {
                        Some((at, _)) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {
                    match timer {
                        Some((_, kind)) => Decision::Timer(kind),
                        None => continue,
                    }
                }
            };

            match decision {
                Decision::Cmd(None) => {
                    self.teardown();
                    return;
                }
                Decision::Cmd(Some(cmd)) => self.handle_command(cmd).await,
                Decision::Frame(frame) => {
                    if let Some(ref session) = self.session {
                        session.stt.send_frame(frame.samples);
                    }
                }
                Decision::Stt(None) => {
                    // Session task went away without an error event.
                    self.end_session(VoiceEvent::SessionEnded).await;
                }
                Decision::Stt(Some(event)) => self.handle_stt_event(event).await,
                Decision::Timer(kind) => self.handle_timer(kind).await,
            }
        }
    }

    fn next_deadline(&self) -> Option<(Instant, TimerKind)> {
        let session = self.session.as_ref()?;
        let mut earliest = (session.hard_cap_at, TimerKind::MaxSession);

        if !session.seen_interim && session.no_speech_at < earliest.0 {
            earliest = (session.no_speech_at, TimerKind::NoSpeech);
        }
        if session.no_result_at < earliest.0 {
            earliest = (session.no_result_at, TimerKind::NoResult);
        }
        if session.watchdog_at < earliest.0 {
            earliest = (session.watchdog_at, TimerKind::Watchdog);
        }
        Some(earliest)
    }

    async fn handle_command(&mut self, cmd: VoiceCommand) {
        match cmd {
            VoiceCommand::StartListening => self.start_listening().await,
            VoiceCommand::StopListening => {
                if self.session.is_some() {
                    self.end_session(VoiceEvent::SessionEnded).await;
                }
            }
            VoiceCommand::HardStopAll => self.hard_stop_all().await,
            VoiceCommand::ClearSession => self.clear_session_data(),
        }
    }

    async fn start_listening(&mut self) {
        if self.session.is_some() {
            debug!("already listening, ignoring start");
            return;
        }

        // Reconnect protection: bounded session starts per sliding minute.
        let now = Instant::now();
        while let Some(&front) = self.session_starts.front() {
            if now.duration_since(front) > RECONNECT_WINDOW {
                self.session_starts.pop_front();
            } else {
                break;
            }
        }
        if self.session_starts.len() >= self.config.max_session_starts_per_minute as usize {
            warn!("voice session rejected: reconnect window exhausted");
            self.emit(VoiceEvent::SessionError {
                message: "too many voice sessions in the last minute".to_owned(),
            })
            .await;
            return;
        }

        let connector = self.active_connector();
        match connector.connect(self.sample_rate).await {
            Ok(stt) => {
                self.session_starts.push_back(now);
                self.install_session(stt);
                self.emit(VoiceEvent::SessionStarted).await;
                info!("voice session started ({:?})", self.mode());
            }
            Err(e) => {
                warn!("STT connect failed: {e}");
                if self.try_failover().await {
                    return;
                }
                self.emit(VoiceEvent::SessionError {
                    message: format!("cannot reach speech service: {e}"),
                })
                .await;
            }
        }
    }

    fn active_connector(&self) -> Arc<dyn SttConnector> {
        if self.failed_over {
            if let Some(ref fb) = self.fallback {
                return Arc::clone(fb);
            }
        }
        Arc::clone(&self.primary)
    }

    fn install_session(&mut self, stt: SttSession) {
        let now = Instant::now();
        self.session = Some(ActiveSession {
            stt,
            hard_cap_at: now + Duration::from_millis(self.config.max_session_ms),
            no_speech_at: now + Duration::from_millis(self.config.no_speech_timeout_ms),
            no_result_at: now + Duration::from_millis(self.config.no_result_timeout_ms),
            watchdog_at: now + Duration::from_millis(self.config.watchdog_ms),
            seen_interim: false,
        });
    }

    /// Arm the per-turn timers for a fresh turn within the live session.
    fn reset_turn_timers(&mut self) {
        let config = &self.config;
        if let Some(session) = self.session.as_mut() {
            let now = Instant::now();
            session.no_speech_at = now + Duration::from_millis(config.no_speech_timeout_ms);
            session.no_result_at = now + Duration::from_millis(config.no_result_timeout_ms);
            session.watchdog_at = now + Duration::from_millis(config.watchdog_ms);
            session.seen_interim = false;
        }
    }

    fn feed_watchdog(&mut self) {
        let watchdog_ms = self.config.watchdog_ms;
        if let Some(session) = self.session.as_mut() {
            session.watchdog_at = Instant::now() + Duration::from_millis(watchdog_ms);
        }
    }

    async fn handle_stt_event(&mut self, event: SttEvent) {
        self.feed_watchdog();
        match event {
            SttEvent::SpeechStarted => {
                if self.tts.is_speaking() {
                    debug!("barge-in: guest spoke over TTS");
                    self.tts.barge_in();
                }
            }
            SttEvent::Interim { text } => {
                if let Some(session) = self.session.as_mut() {
                    session.seen_interim = true;
                }
                self.emit(VoiceEvent::TranscriptPartial { text }).await;
            }
            SttEvent::EndOfTurn { text, confidence } => {
                self.handle_end_of_turn(text, confidence).await;
            }
            SttEvent::Error { message } => {
                warn!("STT provider error: {message}");
                if self.try_failover().await {
                    return;
                }
                self.end_session(VoiceEvent::SessionError { message }).await;
            }
        }
    }

    async fn handle_end_of_turn(&mut self, text: String, confidence: f32) {
        match validate_transcript(
            &text,
            confidence,
            self.config.min_transcript_chars,
            self.config.min_transcript_confidence,
        ) {
            Ok(()) => {
                self.silent_turns = 0;
                self.reset_turn_timers();
                self.emit(VoiceEvent::TranscriptReady {
                    text: text.trim().to_owned(),
                    confidence,
                })
                .await;
            }
            Err(reason) => {
                debug!("transcript rejected ({reason:?}): \"{text}\"");
                self.silent_turn().await;
            }
        }
    }

    /// Advance the silent-turn ladder: warn at the threshold, abort at the
    /// cap, otherwise keep listening with fresh turn timers.
    async fn silent_turn(&mut self) {
        self.silent_turns += 1;
        let turns = self.silent_turns;
        info!("silent turn {turns}");

        if turns >= self.config.max_silent_turns {
            self.emit(VoiceEvent::SessionAborted {
                reason: format!("{turns} consecutive silent turns"),
            })
            .await;
            self.hard_stop_all().await;
            return;
        }

        if turns == self.config.warn_silent_turns {
            let tts = Arc::clone(&self.tts);
            tokio::spawn(async move {
                let _ = tts.speak(SILENCE_NUDGE).await;
            });
        }

        self.reset_turn_timers();
    }

    async fn handle_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::NoSpeech | TimerKind::NoResult => {
                debug!("turn timer expired: {kind:?}");
                self.silent_turn().await;
            }
            TimerKind::MaxSession => {
                info!("voice session reached its duration cap");
                self.end_session(VoiceEvent::SessionEnded).await;
            }
            TimerKind::Watchdog => {
                warn!("voice watchdog fired: no activity");
                self.end_session(VoiceEvent::SessionEnded).await;
            }
        }
    }

    /// Switch the live session to the fallback provider. Returns `true`
    /// when the switch happened.
    async fn try_failover(&mut self) -> bool {
        if self.failed_over || self.fallback.is_none() {
            return false;
        }
        self.failed_over = true;

        // Zombie-kill the relay session before the fallback takes over.
        if let Some(session) = self.session.take() {
            session.stt.close();
        }

        let connector = self.active_connector();
        match connector.connect(self.sample_rate).await {
            Ok(stt) => {
                info!("failed over to fallback STT provider");
                self.install_session(stt);
                true
            }
            Err(e) => {
                warn!("fallback STT connect failed: {e}");
                false
            }
        }
    }

    async fn end_session(&mut self, event: VoiceEvent) {
        if let Some(session) = self.session.take() {
            session.stt.close();
        }
        self.emit(event).await;
    }

    /// Stop everything audible and wipe session data. Idempotent.
    async fn hard_stop_all(&mut self) {
        if let Some(session) = self.session.take() {
            session.stt.close();
        }
        self.tts.hard_stop();
        self.clear_session_data();
    }

    /// Privacy wipe: counters, provider affinity and turn metrics.
    fn clear_session_data(&mut self) {
        self.silent_turns = 0;
        self.failed_over = false;
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.stt.close();
        }
        self.tts.hard_stop();
    }

    async fn emit(&self, event: VoiceEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("voice event receiver dropped");
        }
    }
}

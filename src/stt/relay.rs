//! WebSocket client for the server-side STT relay.
//!
//! The relay holds the vendor credential and forwards provider results
//! verbatim, so this client speaks the provider's JSON shape: `Results`
//! envelopes with `channel.alternatives`, plus `SpeechStarted`,
//! `UtteranceEnd` and `Metadata` markers. Audio goes up as binary i16 PCM
//! frames with the sample rate declared in the session query.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{EVENT_CHANNEL_SIZE, FRAME_CHANNEL_SIZE, SttConnector, SttEvent, SttSession};
use crate::config::{SttConfig, SttProvider};
use crate::error::{KioskError, Result};

/// Close codes worth one reconnect attempt: abnormal closure, server
/// error, service restart, try-again-later.
const RECOVERABLE_CLOSE_CODES: [u16; 4] = [1006, 1011, 1012, 1013];

/// Delay before the single reconnect attempt.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// STT via the server-side relay websocket.
pub struct RelayStt {
    config: SttConfig,
}

impl RelayStt {
    pub fn new(config: SttConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl SttConnector for RelayStt {
    async fn connect(&self, sample_rate: u32) -> Result<SttSession> {
        let url = session_url(&self.config, sample_rate)?;
        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| KioskError::Stt(format!("relay connect failed: {e}")))?;
        info!("relay STT session open at {url}");

        let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_SIZE);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        tokio::spawn(run_session(
            url,
            ws,
            frames_rx,
            events_tx,
            cancel.clone(),
            Duration::from_millis(self.config.partial_promotion_ms),
        ));

        Ok(SttSession::new(frames_tx, events_rx, cancel))
    }

    fn provider(&self) -> SttProvider {
        SttProvider::Relay
    }
}

/// Build the relay session URL with its query parameters.
pub(crate) fn session_url(config: &SttConfig, sample_rate: u32) -> Result<Url> {
    let mut url = Url::parse(&config.relay_url)
        .map_err(|e| KioskError::Config(format!("bad relay URL '{}': {e}", config.relay_url)))?;
    url.query_pairs_mut()
        .append_pair("sample_rate", &sample_rate.to_string())
        .append_pair("language", &config.language)
        .append_pair("model", &config.model)
        .append_pair("endpointing", &config.endpointing_ms.to_string())
        .append_pair("utterance_end_ms", &config.utterance_end_ms.to_string());
    Ok(url)
}

/// A provider message, decoded from relay JSON.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RelayMessage {
    Results {
        transcript: String,
        is_final: bool,
        confidence: f32,
    },
    SpeechStarted,
    UtteranceEnd,
    /// Metadata and anything unrecognized — ignored.
    Other,
}

/// Decode one relay JSON payload.
pub(crate) fn parse_relay_message(raw: &str) -> RelayMessage {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        return RelayMessage::Other;
    };
    match value.get("type").and_then(|t| t.as_str()) {
        Some("Results") => {
            let alt = &value["channel"]["alternatives"][0];
            let Some(transcript) = alt["transcript"].as_str() else {
                return RelayMessage::Other;
            };
            RelayMessage::Results {
                transcript: transcript.to_owned(),
                is_final: value["is_final"].as_bool().unwrap_or(false),
                confidence: alt["confidence"].as_f64().unwrap_or(0.0) as f32,
            }
        }
        Some("SpeechStarted") => RelayMessage::SpeechStarted,
        Some("UtteranceEnd") => RelayMessage::UtteranceEnd,
        _ => RelayMessage::Other,
    }
}

/// Whether a close code earns the single retry.
pub(crate) fn close_is_recoverable(code: u16) -> bool {
    RECOVERABLE_CLOSE_CODES.contains(&code)
}

/// Per-turn transcript accumulation with aggressive finalization.
///
/// A partial that sits unchanged past the promotion window is committed as
/// final — providers sometimes go quiet without ever sending `is_final`.
pub(crate) struct TurnAccumulator {
    partial: String,
    confidence: f32,
    deadline: Option<Instant>,
    promotion: Duration,
}

impl TurnAccumulator {
    pub(crate) fn new(promotion: Duration) -> Self {
        Self {
            partial: String::new(),
            confidence: 0.0,
            deadline: None,
            promotion,
        }
    }

    /// Deadline for promoting the pending partial, if one is pending.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn clear(&mut self) {
        self.partial.clear();
        self.confidence = 0.0;
        self.deadline = None;
    }

    /// Apply a `Results` message, returning the events to emit.
    pub(crate) fn on_results(
        &mut self,
        transcript: &str,
        is_final: bool,
        confidence: f32,
        now: Instant,
    ) -> Vec<SttEvent> {
        if transcript.is_empty() {
            return Vec::new();
        }

        let mut events = vec![SttEvent::Interim {
            text: transcript.to_owned(),
        }];

        if is_final {
            events.push(SttEvent::EndOfTurn {
                text: transcript.to_owned(),
                confidence,
            });
            self.clear();
        } else {
            self.partial = transcript.to_owned();
            self.confidence = confidence;
            self.deadline = Some(now + self.promotion);
        }
        events
    }

    /// Apply a `SpeechStarted` marker.
    pub(crate) fn on_speech_started(&mut self) -> Vec<SttEvent> {
        self.clear();
        vec![SttEvent::SpeechStarted]
    }

    /// Apply an `UtteranceEnd` marker: commit whatever is accumulated.
    pub(crate) fn on_utterance_end(&mut self) -> Vec<SttEvent> {
        if self.partial.is_empty() {
            return Vec::new();
        }
        let event = SttEvent::EndOfTurn {
            text: std::mem::take(&mut self.partial),
            confidence: self.confidence,
        };
        self.clear();
        vec![event]
    }

    /// Promote a stale partial to final.
    pub(crate) fn promote(&mut self) -> Vec<SttEvent> {
        if self.partial.is_empty() {
            self.deadline = None;
            return Vec::new();
        }
        debug!("promoting stale partial to final: \"{}\"", self.partial);
        let event = SttEvent::EndOfTurn {
            text: std::mem::take(&mut self.partial),
            confidence: self.confidence,
        };
        self.clear();
        vec![event]
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn run_session(
    url: Url,
    mut ws: WsStream,
    mut frames_rx: mpsc::Receiver<Vec<i16>>,
    events_tx: mpsc::Sender<SttEvent>,
    cancel: CancellationToken,
    promotion: Duration,
) {
    let mut acc = TurnAccumulator::new(promotion);
    let mut retried = false;

    loop {
        let deadline = acc.deadline();
        tokio::select! {
            _ = cancel.cancelled() => {
                // Terminate, don't negotiate: drop the socket without the
                // close handshake so no handler outlives the session.
                drop(ws);
                debug!("relay session terminated");
                return;
            }

            Some(frame) = frames_rx.recv() => {
                let bytes: Vec<u8> = frame.iter().flat_map(|s| s.to_le_bytes()).collect();
                if let Err(e) = ws.send(Message::Binary(bytes)).await {
                    debug!("relay send failed (read side will classify): {e}");
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(raw))) => {
                        let events = match parse_relay_message(&raw) {
                            RelayMessage::Results { transcript, is_final, confidence } => {
                                acc.on_results(&transcript, is_final, confidence, Instant::now())
                            }
                            RelayMessage::SpeechStarted => acc.on_speech_started(),
                            RelayMessage::UtteranceEnd => acc.on_utterance_end(),
                            RelayMessage::Other => Vec::new(),
                        };
                        for event in events {
                            if events_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code)).unwrap_or(1006);
                        if !handle_disconnect(code, &mut retried, &url, &mut ws, &events_tx).await {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("relay socket error: {e}");
                        if !handle_disconnect(1006, &mut retried, &url, &mut ws, &events_tx).await {
                            return;
                        }
                    }
                    None => {
                        if !handle_disconnect(1006, &mut retried, &url, &mut ws, &events_tx).await {
                            return;
                        }
                    }
                }
            }

            _ = async {
                match deadline {
                    Some(d) => tokio::time::sleep_until(d).await,
                    None => std::future::pending().await,
                }
            } => {
                for event in acc.promote() {
                    if events_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Classify a disconnect; reconnect once for recoverable codes.
///
/// Returns `false` when the session is over (the caller's loop exits).
async fn handle_disconnect(
    code: u16,
    retried: &mut bool,
    url: &Url,
    ws: &mut WsStream,
    events_tx: &mpsc::Sender<SttEvent>,
) -> bool {
    if code == 1000 {
        debug!("relay closed normally");
        return false;
    }

    if close_is_recoverable(code) && !*retried {
        *retried = true;
        warn!("relay closed with {code}, retrying once in {RETRY_DELAY:?}");
        tokio::time::sleep(RETRY_DELAY).await;
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((new_ws, _)) => {
                *ws = new_ws;
                info!("relay reconnected");
                return true;
            }
            Err(e) => {
                let _ = events_tx
                    .send(SttEvent::Error {
                        message: format!("relay reconnect failed: {e}"),
                    })
                    .await;
                return false;
            }
        }
    }

    let _ = events_tx
        .send(SttEvent::Error {
            message: format!("relay closed with code {code}"),
        })
        .await;
    false
}

//! Atrium: voice-first self-service hotel kiosk runtime.
//!
//! A guest walks up, speaks (or taps), and is guided through check-in or
//! booking: identity scan, room selection, slot-filling, summary, payment
//! and key dispense.
//!
//! # Architecture
//!
//! Two halves share this crate:
//! - **Front runtime** (`atrium-kiosk`): microphone capture → streaming STT
//!   (relay websocket, on-device fallback) → voice runtime (turn taking,
//!   barge-in, silence policy) → intent mediator → FSM → TTS, composed by
//!   [`coordinator::KioskCoordinator`].
//! - **Brain server** (`atrium-brain`): tenant-scoped axum endpoints for
//!   general chat and slot-filling booking, backed by an LLM advisor and a
//!   SQLite booking store.
//!
//! The LLM only ever advises. Every reply is schema-validated, guardrailed
//! against the active slot, and mediated through the pure transition table
//! in [`fsm`] before anything on screen changes.

pub mod audio;
pub mod brain;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod fsm;
pub mod mediator;
pub mod normalize;
pub mod server;
pub mod slots;
pub mod store;
pub mod stt;
pub mod tts;
pub mod voice;

pub use config::KioskConfig;
pub use coordinator::KioskCoordinator;
pub use error::{KioskError, Result};
pub use events::KioskEvent;
pub use fsm::{Intent, UiState};

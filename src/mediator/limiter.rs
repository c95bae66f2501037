//! Voice-intent rate limiting and duplicate suppression.
//!
//! Sliding windows over explicit `Instant`s so the policies are
//! deterministic under test. Telemetry for rejected intents is emitted by
//! the mediator, not here.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::fsm::Intent;

/// Minimum spacing between accepted voice intents.
const COOLDOWN: Duration = Duration::from_millis(600);

/// Burst policy: at most `BURST_LIMIT` accepted intents per `BURST_WINDOW`.
const BURST_LIMIT: usize = 6;
const BURST_WINDOW: Duration = Duration::from_secs(12);

/// Identical intents inside this window are suppressed.
const DEDUP_WINDOW: Duration = Duration::from_millis(800);

/// Outcome of the voice gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Accepted,
    RateLimited,
}

/// Cooldown + burst limiter for voice-originated intents.
#[derive(Debug, Default)]
pub struct VoiceGate {
    last_accept: Option<Instant>,
    window: VecDeque<Instant>,
}

impl VoiceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one voice intent at `now`, recording it when accepted.
    pub fn check(&mut self, now: Instant) -> GateVerdict {
        if let Some(last) = self.last_accept
            && now.duration_since(last) < COOLDOWN
        {
            return GateVerdict::RateLimited;
        }

        while let Some(&front) = self.window.front() {
            if now.duration_since(front) > BURST_WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
        if self.window.len() >= BURST_LIMIT {
            return GateVerdict::RateLimited;
        }

        self.last_accept = Some(now);
        self.window.push_back(now);
        GateVerdict::Accepted
    }
}

/// Suppresses identical intents arriving in quick succession.
#[derive(Debug, Default)]
pub struct IntentDedup {
    last: HashMap<Intent, Instant>,
}

impl IntentDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the intent should be processed.
    pub fn accept(&mut self, intent: Intent, now: Instant) -> bool {
        if let Some(&last) = self.last.get(&intent)
            && now.duration_since(last) < DEDUP_WINDOW
        {
            return false;
        }
        self.last.insert(intent, now);
        true
    }
}

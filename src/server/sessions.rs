//! In-memory per-session state for the brain endpoints.
//!
//! One map entry per kiosk session: bounded chat history, partial booking
//! slots and the draft booking id. Entries appear lazily on first use and
//! are wiped whenever the kiosk returns to IDLE or WELCOME — transcripts
//! and guest names never outlive the guest who spoke them.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::brain::types::{HistoryMessage, HistoryRole};
use crate::slots::BookingSlots;

/// Session-scoped chat and slot state.
#[derive(Debug, Default, Clone)]
pub struct ChatSession {
    history: Vec<HistoryMessage>,
    pub slots: BookingSlots,
    pub booking_id: Option<Uuid>,
}

/// Store of all live sessions, keyed by session id.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, ChatSession>>,
    /// Maximum history messages retained per session.
    history_cap: usize,
}

impl SessionStore {
    pub fn new(history_cap: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_cap,
        }
    }

    fn with_session<T>(&self, session_id: &str, f: impl FnOnce(&mut ChatSession) -> T) -> T {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let session = sessions.entry(session_id.to_owned()).or_default();
        f(session)
    }

    /// Append one message, evicting the oldest past the cap.
    pub fn append(&self, session_id: &str, role: HistoryRole, content: impl Into<String>) {
        let cap = self.history_cap;
        self.with_session(session_id, |s| {
            s.history.push(HistoryMessage {
                role,
                content: content.into(),
            });
            if s.history.len() > cap {
                let excess = s.history.len() - cap;
                s.history.drain(..excess);
            }
        });
    }

    /// The most recent `limit` messages, oldest first.
    pub fn recent_history(&self, session_id: &str, limit: usize) -> Vec<HistoryMessage> {
        self.with_session(session_id, |s| {
            let skip = s.history.len().saturating_sub(limit);
            s.history[skip..].to_vec()
        })
    }

    /// Snapshot of the session's accumulated slots.
    pub fn slots(&self, session_id: &str) -> BookingSlots {
        self.with_session(session_id, |s| s.slots.clone())
    }

    /// Replace the session's accumulated slots.
    pub fn set_slots(&self, session_id: &str, slots: BookingSlots) {
        self.with_session(session_id, |s| s.slots = slots);
    }

    /// The draft booking owned by this session, if any.
    pub fn booking_id(&self, session_id: &str) -> Option<Uuid> {
        self.with_session(session_id, |s| s.booking_id)
    }

    pub fn set_booking_id(&self, session_id: &str, booking_id: Uuid) {
        self.with_session(session_id, |s| s.booking_id = Some(booking_id));
    }

    /// Drop everything known about a session.
    pub fn wipe(&self, session_id: &str) {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions.remove(session_id);
    }

    /// Number of live sessions. Ops/test helper.
    pub fn len(&self) -> usize {
        match self.sessions.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Tenant, room and booking persistence.
//!
//! A thin rusqlite repository; all flow logic stays in the brain handlers.
//! The one piece of business policy that lives here is the booking
//! persistence transaction — overlap check, draft upsert and idempotent
//! reuse must be a single critical section.

mod schema;
mod sqlite;

pub use sqlite::BookingStore;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A resolved tenant row with its embedded hotel config.
#[derive(Debug, Clone, PartialEq)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub timezone: String,
    pub check_in_time: String,
    pub check_out_time: String,
    pub amenities: Vec<String>,
}

/// A bookable room type, unique per `(tenant, code)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    /// Nightly price in cents.
    pub price_cents: i64,
    pub amenities: Vec<String>,
}

/// Booking lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Draft,
    Confirmed,
}

impl BookingStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Draft => "DRAFT",
            BookingStatus::Confirmed => "CONFIRMED",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(BookingStatus::Draft),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            _ => None,
        }
    }
}

/// A persisted booking row.
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub room_type_id: Uuid,
    pub guest_name: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub adults: u8,
    pub children: Option<u8>,
    pub nights: u32,
    pub total_price_cents: Option<i64>,
    pub status: BookingStatus,
    pub idempotency_key: Option<String>,
    pub session_id: Option<String>,
    pub payment_ref: Option<String>,
}

/// Inputs to the booking persistence transaction.
#[derive(Debug, Clone)]
pub struct PersistBooking {
    pub tenant_id: Uuid,
    pub room: Room,
    pub guest_name: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub adults: u8,
    pub children: Option<u8>,
    pub session_id: String,
    /// Booking already owned by this session, if any.
    pub existing_booking_id: Option<Uuid>,
    /// Confirm instead of keeping the draft.
    pub confirm: bool,
}

/// Result of the booking persistence transaction.
#[derive(Debug, Clone)]
pub struct PersistOutcome {
    pub booking: Booking,
    /// False when an existing row was updated or reused.
    pub created: bool,
}

/// Deterministic key identifying one logical booking attempt.
///
/// `sha256(tenant | session | room | check_in | check_out | lowercase(name))`,
/// hex-encoded. Enforced unique per tenant so retries of the same turn land
/// on the same row.
pub fn idempotency_key(
    tenant_id: Uuid,
    session_id: &str,
    room_id: Uuid,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guest_name: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant_id.to_string());
    hasher.update(b"|");
    hasher.update(session_id);
    hasher.update(b"|");
    hasher.update(room_id.to_string());
    hasher.update(b"|");
    hasher.update(check_in.to_string());
    hasher.update(b"|");
    hasher.update(check_out.to_string());
    hasher.update(b"|");
    hasher.update(guest_name.trim().to_lowercase());
    hex::encode(hasher.finalize())
}

/// Whether two `[check_in, check_out)` ranges overlap.
pub(crate) fn ranges_overlap(
    a_in: NaiveDate,
    a_out: NaiveDate,
    b_in: NaiveDate,
    b_out: NaiveDate,
) -> bool {
    a_in < b_out && b_in < a_out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn idempotency_key_is_stable_and_case_insensitive_on_name() {
        let tenant = Uuid::nil();
        let room = Uuid::nil();
        let a = idempotency_key(
            tenant,
            "s1",
            room,
            date("2026-02-13"),
            date("2026-02-15"),
            "John Smith",
        );
        let b = idempotency_key(
            tenant,
            "s1",
            room,
            date("2026-02-13"),
            date("2026-02-15"),
            "  john smith ",
        );
        assert_eq!(a, b);

        let c = idempotency_key(
            tenant,
            "s2",
            room,
            date("2026-02-13"),
            date("2026-02-15"),
            "John Smith",
        );
        assert_ne!(a, c);
    }

    #[test]
    fn half_open_overlap_semantics() {
        // Adjacent stays share a turnover day and do not overlap.
        assert!(!ranges_overlap(
            date("2026-02-13"),
            date("2026-02-15"),
            date("2026-02-15"),
            date("2026-02-17"),
        ));
        assert!(ranges_overlap(
            date("2026-02-13"),
            date("2026-02-15"),
            date("2026-02-14"),
            date("2026-02-16"),
        ));
        assert!(ranges_overlap(
            date("2026-02-13"),
            date("2026-02-20"),
            date("2026-02-14"),
            date("2026-02-15"),
        ));
    }
}

//! Booking slot model shared by the mediator and the booking brain.
//!
//! A `BookingSlots` value is the partially-filled form the kiosk walks a
//! guest through. Both sides of the wire (front runtime and brain server)
//! exchange it verbatim, so it lives here rather than in either half.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Maximum adults per booking.
pub const MAX_ADULTS: u8 = 4;

/// Maximum children per booking.
pub const MAX_CHILDREN: u8 = 3;

/// The slot the system is currently trying to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotKey {
    RoomType,
    Adults,
    Children,
    CheckInDate,
    CheckOutDate,
    GuestName,
}

/// Value shape the active slot expects from the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotValueKind {
    Number,
    Date,
    String,
}

impl SlotKey {
    /// The value shape this slot expects.
    pub fn expected_kind(self) -> SlotValueKind {
        match self {
            SlotKey::Adults | SlotKey::Children => SlotValueKind::Number,
            SlotKey::CheckInDate | SlotKey::CheckOutDate => SlotValueKind::Date,
            SlotKey::RoomType | SlotKey::GuestName => SlotValueKind::String,
        }
    }

    /// The booking intent a value for this slot maps to.
    pub fn expected_intent(self) -> crate::fsm::Intent {
        use crate::fsm::Intent;
        match self {
            SlotKey::Adults | SlotKey::Children => Intent::ProvideGuests,
            SlotKey::CheckInDate | SlotKey::CheckOutDate => Intent::ProvideDates,
            SlotKey::GuestName => Intent::ProvideName,
            SlotKey::RoomType => Intent::SelectRoom,
        }
    }

    /// Collection order used when asking for the next missing slot.
    pub const ASK_ORDER: [SlotKey; 6] = [
        SlotKey::RoomType,
        SlotKey::Adults,
        SlotKey::Children,
        SlotKey::CheckInDate,
        SlotKey::CheckOutDate,
        SlotKey::GuestName,
    ];
}

/// Partially-filled booking form.
///
/// All fields optional; invariants are enforced when values land
/// (`set_*` helpers) and re-checked by the store before persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingSlots {
    /// Tenant room code (e.g. `DELUXE_OCEAN`), resolved by the brain.
    pub room_type: Option<String>,
    pub adults: Option<u8>,
    pub children: Option<u8>,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
    pub guest_name: Option<String>,
    /// Derived: whole nights between check-in and check-out.
    pub nights: Option<u32>,
    /// Derived: nights × nightly price, in cents.
    pub total_price_cents: Option<i64>,
}

impl BookingSlots {
    /// Slots still required before the booking can be confirmed.
    ///
    /// `children` is optional in the data model but the flow still asks for
    /// it, so it participates here; `nights`/`total_price` are derived and
    /// never asked.
    pub fn missing(&self) -> Vec<SlotKey> {
        let mut out = Vec::new();
        if self.room_type.is_none() {
            out.push(SlotKey::RoomType);
        }
        if self.adults.is_none() {
            out.push(SlotKey::Adults);
        }
        if self.children.is_none() {
            out.push(SlotKey::Children);
        }
        if self.check_in_date.is_none() {
            out.push(SlotKey::CheckInDate);
        }
        if self.check_out_date.is_none() {
            out.push(SlotKey::CheckOutDate);
        }
        if self.guest_name.as_deref().is_none_or(str::is_empty) {
            out.push(SlotKey::GuestName);
        }
        out
    }

    /// The next slot to ask for, in collection order.
    pub fn next_to_ask(&self) -> Option<SlotKey> {
        let missing = self.missing();
        SlotKey::ASK_ORDER.iter().copied().find(|k| missing.contains(k))
    }

    /// Whether every required slot is present and date-consistent.
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty() && self.dates_valid()
    }

    /// `check_out > check_in` when both are present (or either absent).
    pub fn dates_valid(&self) -> bool {
        match (self.check_in_date, self.check_out_date) {
            (Some(check_in), Some(check_out)) => check_out > check_in,
            _ => true,
        }
    }

    /// Recompute the derived `nights` field from the date pair.
    ///
    /// Clears it when the pair is absent or inverted.
    pub fn recompute_nights(&mut self) {
        self.nights = match (self.check_in_date, self.check_out_date) {
            (Some(check_in), Some(check_out)) if check_out > check_in => {
                u32::try_from((check_out - check_in).num_days()).ok()
            }
            _ => None,
        };
    }

    /// Recompute `total_price_cents` from `nights` and a nightly rate.
    pub fn recompute_total(&mut self, nightly_price_cents: i64) {
        self.total_price_cents = self
            .nights
            .map(|n| nightly_price_cents.saturating_mul(i64::from(n)));
    }

    /// Merge non-empty values from `other` over this set.
    ///
    /// Used for the client-echo merge in the booking brain: the incoming
    /// value wins only when it actually carries something.
    pub fn merge_from(&mut self, other: &BookingSlots) {
        if let Some(ref v) = other.room_type
            && !v.is_empty()
        {
            self.room_type = Some(v.clone());
        }
        if other.adults.is_some() {
            self.adults = other.adults;
        }
        if other.children.is_some() {
            self.children = other.children;
        }
        if other.check_in_date.is_some() {
            self.check_in_date = other.check_in_date;
        }
        if other.check_out_date.is_some() {
            self.check_out_date = other.check_out_date;
        }
        if let Some(ref v) = other.guest_name
            && !v.is_empty()
        {
            self.guest_name = Some(v.clone());
        }
        self.recompute_nights();
    }

    /// Set the adult count, rejecting out-of-range values.
    pub fn set_adults(&mut self, n: u8) -> bool {
        if (1..=MAX_ADULTS).contains(&n) {
            self.adults = Some(n);
            true
        } else {
            false
        }
    }

    /// Set the child count, rejecting out-of-range values.
    pub fn set_children(&mut self, n: u8) -> bool {
        if n <= MAX_CHILDREN {
            self.children = Some(n);
            true
        } else {
            false
        }
    }
}

impl SlotKey {
    /// The spoken prompt asking the guest for this slot.
    pub fn ask_prompt(self) -> &'static str {
        match self {
            SlotKey::RoomType => "Which room would you like to book?",
            SlotKey::Adults => "How many adults will be staying?",
            SlotKey::Children => "And how many children?",
            SlotKey::CheckInDate => "What date would you like to arrive?",
            SlotKey::CheckOutDate => "And what date will you leave?",
            SlotKey::GuestName => "What name should I put the booking under?",
        }
    }

    /// Fragment that identifies this slot's prompt in spoken output.
    ///
    /// Each fragment is a substring of the matching `ask_prompt`, matched
    /// case-insensitively by `slot_from_prompt`.
    pub fn prompt_fragment(self) -> &'static str {
        match self {
            SlotKey::RoomType => "which room",
            SlotKey::Adults => "how many adults",
            SlotKey::Children => "how many children",
            SlotKey::CheckInDate => "like to arrive",
            SlotKey::CheckOutDate => "date will you leave",
            SlotKey::GuestName => "name should i put",
        }
    }
}

/// The slot a spoken system prompt is asking for, if any.
///
/// The mediator runs every spoken prompt through this to keep its active
/// slot in step with what the guest actually heard.
pub fn slot_from_prompt(spoken: &str) -> Option<SlotKey> {
    let lowered = spoken.to_lowercase();
    SlotKey::ASK_ORDER
        .iter()
        .copied()
        .find(|k| lowered.contains(k.prompt_fragment()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn missing_tracks_unfilled_slots() {
        let mut slots = BookingSlots::default();
        assert_eq!(slots.missing().len(), 6);
        assert_eq!(slots.next_to_ask(), Some(SlotKey::RoomType));

        slots.room_type = Some("DELUXE_OCEAN".to_owned());
        slots.adults = Some(2);
        assert_eq!(slots.next_to_ask(), Some(SlotKey::Children));
    }

    #[test]
    fn nights_computed_from_date_pair() {
        let mut slots = BookingSlots {
            check_in_date: Some(date("2026-02-13")),
            check_out_date: Some(date("2026-02-15")),
            ..Default::default()
        };
        slots.recompute_nights();
        assert_eq!(slots.nights, Some(2));

        slots.recompute_total(15_000);
        assert_eq!(slots.total_price_cents, Some(30_000));
    }

    #[test]
    fn inverted_dates_invalid_and_clear_nights() {
        let mut slots = BookingSlots {
            check_in_date: Some(date("2026-02-15")),
            check_out_date: Some(date("2026-02-13")),
            nights: Some(9),
            ..Default::default()
        };
        assert!(!slots.dates_valid());
        slots.recompute_nights();
        assert_eq!(slots.nights, None);
    }

    #[test]
    fn guest_count_bounds() {
        let mut slots = BookingSlots::default();
        assert!(!slots.set_adults(0));
        assert!(!slots.set_adults(5));
        assert!(slots.set_adults(4));
        assert!(slots.set_children(0));
        assert!(!slots.set_children(4));
    }

    #[test]
    fn merge_prefers_non_empty_incoming() {
        let mut base = BookingSlots {
            room_type: Some("STANDARD".to_owned()),
            adults: Some(1),
            ..Default::default()
        };
        let incoming = BookingSlots {
            room_type: Some(String::new()),
            adults: Some(2),
            guest_name: Some("John Smith".to_owned()),
            ..Default::default()
        };
        base.merge_from(&incoming);
        // Empty string must not clobber an existing value.
        assert_eq!(base.room_type.as_deref(), Some("STANDARD"));
        assert_eq!(base.adults, Some(2));
        assert_eq!(base.guest_name.as_deref(), Some("John Smith"));
    }

    #[test]
    fn complete_requires_all_slots_and_valid_dates() {
        let mut slots = BookingSlots {
            room_type: Some("DELUXE_OCEAN".to_owned()),
            adults: Some(2),
            children: Some(0),
            check_in_date: Some(date("2026-02-13")),
            check_out_date: Some(date("2026-02-15")),
            guest_name: Some("John Smith".to_owned()),
            ..Default::default()
        };
        assert!(slots.is_complete());
        slots.check_out_date = Some(date("2026-02-12"));
        assert!(!slots.is_complete());
    }

    #[test]
    fn every_fragment_is_a_substring_of_its_prompt() {
        for slot in SlotKey::ASK_ORDER {
            let prompt = slot.ask_prompt().to_lowercase();
            assert!(
                prompt.contains(slot.prompt_fragment()),
                "{slot:?} fragment must match its own prompt"
            );
        }
    }

    #[test]
    fn spoken_prompts_map_back_to_their_slot() {
        for slot in SlotKey::ASK_ORDER {
            assert_eq!(slot_from_prompt(slot.ask_prompt()), Some(slot));
        }
        assert_eq!(slot_from_prompt("Welcome to the hotel"), None);
    }

    #[test]
    fn slot_wire_names_are_camel_case() {
        let json = serde_json::to_string(&SlotKey::CheckInDate).unwrap();
        assert_eq!(json, "\"checkInDate\"");
        let slots = BookingSlots {
            guest_name: Some("Asha".to_owned()),
            ..Default::default()
        };
        let json = serde_json::to_string(&slots).unwrap();
        assert!(json.contains("\"guestName\":\"Asha\""));
    }
}

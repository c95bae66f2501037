//! Deterministic transcript normalization and token classification.
//!
//! Everything here is pure text work: hygiene, filler detection, command
//! keywords, yes/no classification and number-word parsing. The LLM never
//! sees raw audio-transcript noise, and slot extraction never depends on
//! the LLM for values the normalizer can read directly. The guest mix is
//! Hindi/English, so the affirmation sets carry both.

use chrono::NaiveDate;

/// Filler tokens rejected outright when they are the whole utterance.
const FILLER_TOKENS: &[&str] = &["uh", "um", "hmm", "huh", "ah", "oh"];

/// Command keywords that rescue a low-confidence transcript.
///
/// `amenit` is a deliberate stem: it matches "amenity" and "amenities".
const COMMAND_KEYWORDS: &[&str] = &[
    "book",
    "booking",
    "room",
    "check-in",
    "pay",
    "payment",
    "confirm",
    "cancel",
    "back",
    "help",
    "yes",
    "no",
    "continue",
    "proceed",
    "modify",
    "change",
    "amenit",
    "price",
];

/// Affirmative replies for the cancel-confirmation prompt (Hindi + English).
const AFFIRMATIVE: &[&str] = &[
    "yes", "yeah", "confirm", "sure", "ok", "okay", "proceed", "haan", "han", "ji", "correct",
];

/// Negative replies for the cancel-confirmation prompt (Hindi + English).
const NEGATIVE: &[&str] = &["no", "nope", "continue", "nah", "nahi"];

/// Phrases that count as an explicit topic change during slot filling.
const TOPIC_CHANGE: &[&str] = &[
    "cancel",
    "back",
    "never mind",
    "nevermind",
    "start over",
    "modify",
    "change",
];

/// Normalize a raw transcript: lowercase, strip punctuation to spaces,
/// collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for ch in text.chars() {
        let ch = if ch.is_alphanumeric() || ch == '-' || ch == '\'' {
            ch.to_ascii_lowercase()
        } else {
            ' '
        };
        if ch == ' ' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out.trim().to_owned()
}

/// Whether the normalized utterance is exactly one filler token.
pub fn is_filler(normalized: &str) -> bool {
    FILLER_TOKENS.contains(&normalized)
}

/// Whether the normalized utterance contains a command keyword.
pub fn has_command_keyword(normalized: &str) -> bool {
    COMMAND_KEYWORDS.iter().any(|k| normalized.contains(k))
}

/// Classify a cancel-confirmation reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Affirmative,
    Negative,
    Unclear,
}

/// Classify a normalized reply against the yes/no sets.
///
/// Whole-word match on any token; "no problem, continue" reads negative
/// because `no` and `continue` both land in the negative set first.
pub fn classify_confirmation(normalized: &str) -> Confirmation {
    for word in normalized.split_whitespace() {
        if NEGATIVE.contains(&word) {
            return Confirmation::Negative;
        }
        if AFFIRMATIVE.contains(&word) {
            return Confirmation::Affirmative;
        }
    }
    Confirmation::Unclear
}

/// Whether the guest explicitly changed topic away from the active slot.
pub fn is_topic_change(normalized: &str) -> bool {
    TOPIC_CHANGE.iter().any(|p| {
        normalized == *p
            || normalized.starts_with(&format!("{p} "))
            || normalized.contains(&format!(" {p}"))
    })
}

/// Parse a small count from digits or number words.
///
/// Accepts "2", "two", "two adults", "just one", "do" (Hindi two) and
/// similar. Returns the first count found, scanning left to right.
pub fn parse_count(normalized: &str) -> Option<u8> {
    const WORDS: &[(&str, u8)] = &[
        ("zero", 0),
        ("no", 0),
        ("none", 0),
        ("one", 1),
        ("a", 1),
        ("an", 1),
        ("single", 1),
        ("ek", 1),
        ("two", 2),
        ("couple", 2),
        ("do", 2),
        ("three", 3),
        ("teen", 3),
        ("four", 4),
        ("char", 4),
        ("five", 5),
        ("six", 6),
        ("seven", 7),
        ("eight", 8),
        ("nine", 9),
        ("ten", 10),
    ];

    for token in normalized.split_whitespace() {
        if let Ok(n) = token.parse::<u8>() {
            return Some(n);
        }
        if let Some(&(_, n)) = WORDS.iter().find(|(w, _)| *w == token) {
            return Some(n);
        }
    }
    None
}

/// Parse an ISO `YYYY-MM-DD` date from anywhere in the text.
pub fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    for token in text.split(|c: char| c.is_whitespace() || c == ',') {
        let token = token.trim_matches(|c: char| !c.is_ascii_digit() && c != '-');
        if token.len() == 10
            && let Ok(d) = NaiveDate::parse_from_str(token, "%Y-%m-%d")
        {
            return Some(d);
        }
    }
    None
}

/// Ordinal index ("first" → 0) spoken by the guest, if any.
pub fn parse_ordinal(normalized: &str) -> Option<usize> {
    const ORDINALS: &[(&str, usize)] = &[
        ("first", 0),
        ("1st", 0),
        ("second", 1),
        ("2nd", 1),
        ("third", 2),
        ("3rd", 2),
        ("fourth", 3),
        ("4th", 3),
        ("fifth", 4),
        ("5th", 4),
        ("last", usize::MAX),
    ];
    for token in normalized.split_whitespace() {
        if let Some(&(_, i)) = ORDINALS.iter().find(|(w, _)| *w == token) {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("  I want to BOOK, a room!!  "), "i want to book a room");
        assert_eq!(normalize("check-in please"), "check-in please");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn filler_only_utterances() {
        assert!(is_filler("um"));
        assert!(is_filler("hmm"));
        assert!(!is_filler("um yes"));
        assert!(!is_filler("yes"));
    }

    #[test]
    fn command_keywords_rescue() {
        assert!(has_command_keyword("i want to book"));
        assert!(has_command_keyword("what amenities does it have"));
        assert!(has_command_keyword("the price"));
        assert!(!has_command_keyword("the weather is nice"));
    }

    #[test]
    fn confirmation_classification() {
        assert_eq!(classify_confirmation("yes"), Confirmation::Affirmative);
        assert_eq!(classify_confirmation("haan ji"), Confirmation::Affirmative);
        assert_eq!(classify_confirmation("nahi"), Confirmation::Negative);
        assert_eq!(classify_confirmation("please continue"), Confirmation::Negative);
        assert_eq!(classify_confirmation("what"), Confirmation::Unclear);
    }

    #[test]
    fn negative_wins_over_affirmative_in_mixed_reply() {
        assert_eq!(classify_confirmation("no continue"), Confirmation::Negative);
    }

    #[test]
    fn topic_change_detection() {
        assert!(is_topic_change("cancel"));
        assert!(is_topic_change("never mind that"));
        assert!(is_topic_change("actually change the dates"));
        assert!(!is_topic_change("two adults"));
    }

    #[test]
    fn count_parsing_digits_and_words() {
        assert_eq!(parse_count("two adults"), Some(2));
        assert_eq!(parse_count("just 1"), Some(1));
        assert_eq!(parse_count("3 kids"), Some(3));
        assert_eq!(parse_count("do log"), Some(2));
        assert_eq!(parse_count("no kids"), Some(0));
        assert_eq!(parse_count("some people"), None);
    }

    #[test]
    fn iso_date_extraction() {
        assert_eq!(
            parse_iso_date("from 2026-02-13 please"),
            NaiveDate::parse_from_str("2026-02-13", "%Y-%m-%d").ok()
        );
        assert_eq!(parse_iso_date("february thirteenth"), None);
        assert_eq!(parse_iso_date("2026-13-45"), None);
    }

    #[test]
    fn ordinal_parsing() {
        assert_eq!(parse_ordinal("the first one"), Some(0));
        assert_eq!(parse_ordinal("second"), Some(1));
        assert_eq!(parse_ordinal("the last one"), Some(usize::MAX));
        assert_eq!(parse_ordinal("that one"), None);
    }
}

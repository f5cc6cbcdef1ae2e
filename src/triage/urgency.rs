//! Urgency classifier — pure text heuristics, no I/O.

/// Keywords that mark a message as urgent (matched case-insensitively,
/// anywhere in the text).
pub const URGENT_KEYWORDS: &[&str] = &[
    "emergency",
    "urgent",
    "asap",
    "now",
    "immediately",
    "help",
    "911",
    "critical",
    "important",
    "hospital",
    "police",
];

/// Minimum alphabetic length before the caps-ratio rule applies.
/// Guards short strings like "OK" from triggering false positives.
const CAPS_MIN_LETTERS: usize = 10;

/// Classify a message as urgent.
///
/// True if any of: an urgent keyword appears, the text contains 3+ `!`
/// characters, or more than half of 10+ alphabetic characters are
/// uppercase. Empty text is never urgent.
pub fn is_urgent(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    let lower = text.to_lowercase();
    if URGENT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return true;
    }

    if text.matches('!').count() >= 3 {
        return true;
    }

    let letters = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    let caps = text.chars().filter(|c| c.is_ascii_uppercase()).count();
    letters > CAPS_MIN_LETTERS && caps * 2 > letters
}

//! Command parser for the primary user's own messages.
//!
//! A small fixed grammar checked in priority order; first match wins.
//! Anything that matches no pattern is ordinary conversation, except a
//! malformed `/status` or `/digest`, which is a visible parse error —
//! the primary user gets actionable feedback instead of silence.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CommandError;
use crate::relay::directive::{SendPolicy, UserStatus};

/// A recognized instruction from the primary user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    /// `@<target> send: <message>` — send a message to a named contact.
    Send { target: String, message: String },
    /// `reply: <message>` — reply to the most recent counterpart.
    Reply { message: String },
    /// `/status check` — report the current status.
    StatusCheck,
    /// `/status <mode>` — change the current status.
    StatusSet(UserStatus),
    /// `/digest [hours]` — summarize recent relay activity.
    Digest { hours_back: i64 },
    /// Free-text "go yolo" / "stop yolo" send-policy toggle.
    PolicySet(SendPolicy),
}

/// Outcome of parsing a primary-user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    /// A recognized command.
    Command(RelayCommand),
    /// Ordinary conversational text — not a command.
    Ordinary,
    /// A command-shaped message that failed validation.
    Invalid(CommandError),
}

static SEND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^@([\w+\-]+)\s+send:\s*(.+)$").expect("valid send regex"));

static REPLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^reply:\s*(.+)$").expect("valid reply regex"));

/// Default digest window in hours when `/digest` carries no argument.
pub const DEFAULT_DIGEST_HOURS: i64 = 2;

/// Parse a primary-user message into a command, ordinary text, or a
/// validation error. Whitespace-trimmed, case-insensitive keywords.
pub fn parse_command(text: &str) -> ParsedInput {
    let text = text.trim();
    if text.is_empty() {
        return ParsedInput::Ordinary;
    }

    if let Some(caps) = SEND_RE.captures(text) {
        return ParsedInput::Command(RelayCommand::Send {
            target: caps[1].trim().to_string(),
            message: caps[2].trim().to_string(),
        });
    }

    if let Some(caps) = REPLY_RE.captures(text) {
        return ParsedInput::Command(RelayCommand::Reply {
            message: caps[1].trim().to_string(),
        });
    }

    let lower = text.to_lowercase();
    let mut tokens = lower.split_whitespace();

    match tokens.next() {
        Some("/status") => {
            return match tokens.next() {
                Some("check") => ParsedInput::Command(RelayCommand::StatusCheck),
                Some(mode) => match mode.parse::<UserStatus>() {
                    Ok(status) => ParsedInput::Command(RelayCommand::StatusSet(status)),
                    Err(_) => ParsedInput::Invalid(CommandError::UnknownStatus {
                        mode: mode.to_string(),
                    }),
                },
                None => ParsedInput::Invalid(CommandError::MissingStatusMode),
            };
        }
        Some("/digest") => {
            return match tokens.next() {
                None => ParsedInput::Command(RelayCommand::Digest {
                    hours_back: DEFAULT_DIGEST_HOURS,
                }),
                Some(arg) => match arg.parse::<i64>() {
                    Ok(hours) if hours > 0 => {
                        ParsedInput::Command(RelayCommand::Digest { hours_back: hours })
                    }
                    _ => ParsedInput::Invalid(CommandError::BadDigestWindow {
                        value: arg.to_string(),
                    }),
                },
            };
        }
        _ => {}
    }

    // Free-text send-policy toggles, checked after the structured forms.
    if lower.contains("stop yolo") {
        return ParsedInput::Command(RelayCommand::PolicySet(SendPolicy::Draft));
    }
    if lower.contains("go yolo") {
        return ParsedInput::Command(RelayCommand::PolicySet(SendPolicy::Yolo));
    }

    ParsedInput::Ordinary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_with_case_insensitive_keyword() {
        let parsed = parse_command("@henry Send: call me");
        assert_eq!(
            parsed,
            ParsedInput::Command(RelayCommand::Send {
                target: "henry".into(),
                message: "call me".into(),
            })
        );
    }

    #[test]
    fn send_target_allows_plus_and_dash() {
        let parsed = parse_command("@+1-555-0100 send: running late");
        assert_eq!(
            parsed,
            ParsedInput::Command(RelayCommand::Send {
                target: "+1-555-0100".into(),
                message: "running late".into(),
            })
        );
    }

    #[test]
    fn send_message_spans_lines() {
        let parsed = parse_command("@ana send: first line\nsecond line");
        match parsed {
            ParsedInput::Command(RelayCommand::Send { message, .. }) => {
                assert_eq!(message, "first line\nsecond line");
            }
            other => panic!("Expected Send, got {:?}", other),
        }
    }

    #[test]
    fn parses_reply() {
        let parsed = parse_command("Reply: sounds good");
        assert_eq!(
            parsed,
            ParsedInput::Command(RelayCommand::Reply {
                message: "sounds good".into(),
            })
        );
    }

    #[test]
    fn parses_status_check() {
        assert_eq!(
            parse_command("/status check"),
            ParsedInput::Command(RelayCommand::StatusCheck)
        );
    }

    #[test]
    fn parses_status_set() {
        assert_eq!(
            parse_command("/status dnd"),
            ParsedInput::Command(RelayCommand::StatusSet(UserStatus::Dnd))
        );
        assert_eq!(
            parse_command("  /STATUS Busy "),
            ParsedInput::Command(RelayCommand::StatusSet(UserStatus::Busy))
        );
    }

    #[test]
    fn unknown_status_is_a_visible_error_not_ordinary() {
        let parsed = parse_command("/status bogus");
        assert_eq!(
            parsed,
            ParsedInput::Invalid(CommandError::UnknownStatus {
                mode: "bogus".into()
            })
        );
    }

    #[test]
    fn bare_status_is_a_visible_error() {
        assert_eq!(
            parse_command("/status"),
            ParsedInput::Invalid(CommandError::MissingStatusMode)
        );
    }

    #[test]
    fn digest_defaults_to_two_hours() {
        assert_eq!(
            parse_command("/digest"),
            ParsedInput::Command(RelayCommand::Digest { hours_back: 2 })
        );
    }

    #[test]
    fn digest_accepts_explicit_window() {
        assert_eq!(
            parse_command("/digest 6"),
            ParsedInput::Command(RelayCommand::Digest { hours_back: 6 })
        );
    }

    #[test]
    fn digest_rejects_bad_window() {
        assert_eq!(
            parse_command("/digest soon"),
            ParsedInput::Invalid(CommandError::BadDigestWindow {
                value: "soon".into()
            })
        );
        assert_eq!(
            parse_command("/digest -3"),
            ParsedInput::Invalid(CommandError::BadDigestWindow {
                value: "-3".into()
            })
        );
    }

    #[test]
    fn policy_toggles_from_free_text() {
        assert_eq!(
            parse_command("ok let's go yolo for the afternoon"),
            ParsedInput::Command(RelayCommand::PolicySet(SendPolicy::Yolo))
        );
        assert_eq!(
            parse_command("please stop yolo"),
            ParsedInput::Command(RelayCommand::PolicySet(SendPolicy::Draft))
        );
    }

    #[test]
    fn ordinary_text_is_not_a_command() {
        assert_eq!(parse_command("lunch at 1?"), ParsedInput::Ordinary);
        assert_eq!(parse_command(""), ParsedInput::Ordinary);
        // "@name" without "send:" is just a mention
        assert_eq!(parse_command("@henry what's up"), ParsedInput::Ordinary);
    }
}

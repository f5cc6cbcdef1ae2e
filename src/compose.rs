//! Response composer — generated reply bodies, the deterministic
//! outbound wrapper, and notification templates.
//!
//! Only the reply body goes through the text generator; everything else
//! is a fixed template so escalations and confirmations stay predictable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::warn;

use crate::llm::LlmProvider;
use crate::relay::directive::{RelayDirective, StyleProfile, UserStatus};

/// Maximum number of lines kept from a generated reply.
pub const MAX_REPLY_LINES: usize = 6;

/// Composer for all outbound text.
pub struct Composer {
    llm: Arc<dyn LlmProvider>,
    agent_name: String,
    reference_prefix: String,
}

impl Composer {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        agent_name: impl Into<String>,
        reference_prefix: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            agent_name: agent_name.into(),
            reference_prefix: reference_prefix.into(),
        }
    }

    /// Generate a contact-facing reply body.
    ///
    /// The prompt combines the user's style profile, current status, and
    /// the optional context hint. The result is clamped to
    /// [`MAX_REPLY_LINES`] and stripped of pictographic emoji. Provider
    /// failure falls back to a fixed apology naming the user's
    /// unavailability, so this never errors out of the dispatch path.
    pub async fn generate_reply(
        &self,
        directive: &RelayDirective,
        profile: &StyleProfile,
        inbound_text: &str,
    ) -> String {
        let system = self.build_system_prompt(directive, profile);
        match self.llm.generate(&system, inbound_text).await {
            Ok(text) => sanitize_reply(&text),
            Err(e) => {
                warn!(error = %e, "Generation failed, using fallback reply");
                fallback_reply(directive.status)
            }
        }
    }

    fn build_system_prompt(&self, directive: &RelayDirective, profile: &StyleProfile) -> String {
        let phrases = if profile.common_phrases.is_empty() {
            "none".to_string()
        } else {
            profile.common_phrases.join(", ")
        };

        let mut prompt = format!(
            "You are {}, an AI assistant replying on behalf of a user who is {}.\n\n\
             Communication style: {}. Common phrases: {}. Emoji usage: {}.\n\n\
             Reply naturally and briefly (1-2 sentences) to acknowledge the message \
             and let the sender know the user will follow up. {}.",
            self.agent_name,
            directive.status,
            profile.tone,
            phrases,
            profile.emoji_usage,
            directive.status.unavailability_phrase(),
        );

        if let Some(ref context) = directive.context {
            prompt.push_str(&format!("\nAdditional context from the user: {}", context));
        }

        prompt
    }

    /// Wrap an approved or auto-sent reply body for delivery: header
    /// glyph, trimmed body, and a footer with a UTC timestamp and a
    /// unique reference token for audit.
    pub fn wrap_outbound(&self, body: &str) -> String {
        let now = Utc::now();
        format!(
            "🤖 {}\n\n{} UTC · {}",
            body.trim(),
            now.format("%Y-%m-%d %H:%M:%S"),
            self.reference_token(now),
        )
    }

    /// Reference token: `<PREFIX>-<YYYYMMDD>-<HHMMSS>-<8 hex chars>`.
    /// The random suffix makes the token unique per message.
    fn reference_token(&self, now: DateTime<Utc>) -> String {
        let suffix: u32 = rand::thread_rng().r#gen();
        format!(
            "{}-{}-{:08x}",
            self.reference_prefix,
            now.format("%Y%m%d-%H%M%S"),
            suffix,
        )
    }
}

/// Clamp a generated reply to [`MAX_REPLY_LINES`] and strip emoji.
fn sanitize_reply(text: &str) -> String {
    let clamped = text
        .trim()
        .lines()
        .take(MAX_REPLY_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    strip_emoji(&clamped).trim().to_string()
}

/// Fixed apology used when the generator fails.
pub fn fallback_reply(status: UserStatus) -> String {
    format!(
        "Thanks for your message! {}. I'll get back to you as soon as I can.",
        status.unavailability_phrase()
    )
}

/// Remove pictographic emoji characters. Best-effort block filter, not
/// guaranteed complete.
pub fn strip_emoji(text: &str) -> String {
    text.chars().filter(|&c| !is_pictographic(c)).collect()
}

fn is_pictographic(c: char) -> bool {
    matches!(
        u32::from(c),
        0x1F000..=0x1FAFF   // emoticons, pictographs, transport, supplemental
        | 0x2600..=0x27BF   // misc symbols and dingbats
        | 0x2B00..=0x2BFF   // arrows and stars used as emoji
        | 0xFE0F            // variation selector
        | 0x200D // zero-width joiner
    )
}

// ── Notification templates ──────────────────────────────────────────

/// Escalation sent to the primary user for an urgent inbound message.
pub fn urgent_escalation(sender: &str, text: &str) -> String {
    format!("🚨 URGENT from {sender}:\n\"{text}\"")
}

/// Forward of an ordinary contact message with reply instructions.
pub fn relay_forward(sender: &str, text: &str) -> String {
    format!("📨 From {sender}:\n\"{text}\"\n\nReply with: reply: <your message>")
}

/// Notification to the primary user after an auto-response was sent.
pub fn auto_respond_notice(sender: &str, inbound: &str, outbound: &str) -> String {
    format!(
        "✅ Auto-responded to {sender}:\n\nTheir message:\n\"{inbound}\"\n\nMy response:\n\"{outbound}\""
    )
}

/// Draft preview shown to the contact awaiting their approval.
pub fn draft_preview(body: &str) -> String {
    format!(
        "📝 Draft reply:\n\n{body}\n\nReply \"send\" to deliver it, \"cancel\" to discard it, \
         or \"edit: <new text>\" to replace it."
    )
}

/// Notification to the primary user after an approved draft was delivered.
pub fn delivered_notice(contact: &str, body: &str) -> String {
    format!("✅ Sent approved reply to {contact}:\n\"{body}\"")
}

/// Confirmation of a manual `@target send:` or `reply:`.
pub fn sent_confirmation(target: &str) -> String {
    format!("✅ Sent to {target}")
}

pub fn status_report(status: UserStatus) -> String {
    format!("Current status: {status}")
}

pub fn status_confirmation(status: UserStatus) -> String {
    format!("✅ Status set to: {status}")
}

pub fn policy_confirmation(policy: crate::relay::directive::SendPolicy) -> String {
    match policy {
        crate::relay::directive::SendPolicy::Yolo => {
            "✅ Send policy: yolo. Generated replies go out immediately.".to_string()
        }
        crate::relay::directive::SendPolicy::Draft => {
            "✅ Send policy: draft. Generated replies wait for approval.".to_string()
        }
    }
}

pub fn no_reply_target() -> String {
    "❌ No recent conversation to reply to".to_string()
}

/// Short diagnostic for the primary user when handling an event failed.
pub fn diagnostic(detail: &str) -> String {
    format!("❌ Error: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::LlmError;
    use crate::relay::directive::SendPolicy;

    struct CannedLlm(Result<String, ()>);

    #[async_trait]
    impl LlmProvider for CannedLlm {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
            self.0.clone().map_err(|_| LlmError::RequestFailed {
                provider: "test".into(),
                reason: "boom".into(),
            })
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn composer(reply: Result<String, ()>) -> Composer {
        Composer::new(Arc::new(CannedLlm(reply)), "Relay", "RLY")
    }

    fn directive(status: UserStatus) -> RelayDirective {
        RelayDirective {
            status,
            send_policy: SendPolicy::Draft,
            context: None,
        }
    }

    #[tokio::test]
    async fn generated_reply_is_clamped_and_deemojied() {
        let long = (1..=8)
            .map(|i| format!("line {i} 🎉"))
            .collect::<Vec<_>>()
            .join("\n");
        let composer = composer(Ok(long));
        let reply = composer
            .generate_reply(&directive(UserStatus::Busy), &StyleProfile::default(), "hey")
            .await;

        assert_eq!(reply.lines().count(), MAX_REPLY_LINES);
        assert!(!reply.contains('🎉'));
        assert!(reply.contains("line 1"));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_apology() {
        let composer = composer(Err(()));
        let reply = composer
            .generate_reply(&directive(UserStatus::Sleep), &StyleProfile::default(), "hey")
            .await;
        assert!(reply.contains("I'm sleeping right now"));
    }

    #[test]
    fn wrapper_has_footer_with_reference_token() {
        let composer = composer(Ok(String::new()));
        let wrapped = composer.wrap_outbound("  see you at 6  ");

        assert!(wrapped.starts_with("🤖 see you at 6"));
        let footer = wrapped.lines().last().unwrap();
        let re = regex::Regex::new(
            r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2} UTC · RLY-\d{8}-\d{6}-[0-9a-f]{8}$",
        )
        .unwrap();
        assert!(re.is_match(footer), "unexpected footer: {footer}");
    }

    #[test]
    fn reference_tokens_are_unique() {
        let composer = composer(Ok(String::new()));
        let a = composer.wrap_outbound("x");
        let b = composer.wrap_outbound("x");
        assert_ne!(a, b);
    }

    #[test]
    fn strip_emoji_keeps_plain_text() {
        assert_eq!(strip_emoji("on my way 🚗💨"), "on my way ");
        assert_eq!(strip_emoji("plain text"), "plain text");
        // Accented letters survive
        assert_eq!(strip_emoji("café ☕"), "café ");
    }

    #[test]
    fn templates_carry_the_essentials() {
        assert!(urgent_escalation("ana", "call me").contains("URGENT from ana"));
        assert!(relay_forward("ana", "hi").contains("reply: <your message>"));
        let notice = auto_respond_notice("ana", "in", "out");
        assert!(notice.contains("\"in\"") && notice.contains("\"out\""));
        assert!(draft_preview("body").contains("\"send\""));
        assert!(status_report(UserStatus::Dnd).contains("dnd"));
    }
}

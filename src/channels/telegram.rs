//! Telegram transport — long-polls the Bot API for updates.
//!
//! Native Bot API implementation: `poll_once` fetches a batch of
//! updates and normalizes them into [`InboundEvent`]s; `send` delivers
//! text with Markdown-first formatting and a plain-text retry.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::channels::{InboundEvent, Transport};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u32 = 30;

/// Telegram transport — connects to the Bot API via long-polling.
pub struct TelegramTransport {
    bot_token: String,
    primary_user: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Deserialize)]
struct TgMessage {
    text: Option<String>,
    from: Option<TgUser>,
    chat: TgChat,
}

#[derive(Deserialize)]
struct TgUser {
    id: i64,
    username: Option<String>,
}

#[derive(Deserialize)]
struct TgChat {
    id: i64,
}

impl TelegramTransport {
    pub fn new(bot_token: String, primary_user: String) -> Self {
        Self {
            bot_token,
            primary_user,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Whether a sender identity belongs to the primary user. Accepts
    /// the numeric user id or the username, with or without `@`.
    fn is_primary(&self, user: &TgUser) -> bool {
        if user.id.to_string() == self.primary_user {
            return true;
        }
        let configured = self.primary_user.trim_start_matches('@');
        user.username
            .as_deref()
            .is_some_and(|u| u.eq_ignore_ascii_case(configured))
    }

    /// Fetch one batch of updates and advance `offset` past them.
    ///
    /// Empty-bodied messages (stickers, joins) are skipped. Transport
    /// errors bubble up; the caller decides whether to back off.
    pub async fn poll_once(&self, offset: &mut i64) -> Result<Vec<InboundEvent>, ChannelError> {
        let body = serde_json::json!({
            "offset": *offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message"],
        });

        let resp = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Http(format!(
                "getUpdates failed ({status}): {detail}"
            )));
        }

        let updates: UpdatesResponse = resp
            .json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;

        if !updates.ok {
            return Err(ChannelError::InvalidMessage(
                "getUpdates returned ok=false".to_string(),
            ));
        }

        let mut events = Vec::new();
        for update in updates.result {
            *offset = (*offset).max(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                debug!("Skipping update without text");
                continue;
            };
            let Some(from) = message.from else {
                continue;
            };

            events.push(InboundEvent {
                is_from_primary: self.is_primary(&from),
                sender: from
                    .username
                    .clone()
                    .unwrap_or_else(|| from.id.to_string()),
                text,
                conversation_id: message.chat.id.to_string(),
            });
        }

        Ok(events)
    }

    /// Send a single chunk (≤4096 chars), Markdown-first with fallback.
    async fn send_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    fn direct_conversation(&self, user_id: &str) -> String {
        user_id.trim_start_matches('@').to_string()
    }

    async fn send(&self, conversation_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_chunk(conversation_id, &chunk).await?;
        }
        Ok(())
    }
}

/// Split a message into chunks of at most `limit` characters, preferring
/// newline boundaries.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > limit {
            // A single oversized line gets hard-split on char boundaries.
            let mut piece = String::new();
            let mut piece_len = 0usize;
            for c in line.chars() {
                if piece_len == limit {
                    chunks.push(std::mem::take(&mut piece));
                    piece_len = 0;
                }
                piece.push(c);
                piece_len += 1;
            }
            current = piece;
            current_len = piece_len;
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_one_chunk() {
        let chunks = split_message("hello", 4096);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn long_message_splits_on_newlines() {
        let text = format!("{}\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = split_message(&text, 40);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with('a'));
        assert!(chunks[1].starts_with('b'));
    }

    #[test]
    fn oversized_line_is_hard_split() {
        let text = "x".repeat(100);
        let chunks = split_message(&text, 40);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn primary_detection_by_id_and_username() {
        let transport = TelegramTransport::new("token".into(), "@Mira".into());
        let by_name = TgUser {
            id: 7,
            username: Some("mira".into()),
        };
        let by_other = TgUser {
            id: 8,
            username: Some("ana".into()),
        };
        assert!(transport.is_primary(&by_name));
        assert!(!transport.is_primary(&by_other));

        let transport = TelegramTransport::new("token".into(), "42".into());
        let by_id = TgUser {
            id: 42,
            username: None,
        };
        assert!(transport.is_primary(&by_id));
    }

    #[test]
    fn direct_conversation_strips_handle_sigil() {
        let transport = TelegramTransport::new("token".into(), "mira".into());
        assert_eq!(transport.direct_conversation("@henry"), "henry");
        assert_eq!(transport.direct_conversation("12345"), "12345");
    }
}

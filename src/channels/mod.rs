//! Transport boundary — inbound events and the outbound send contract.
//!
//! The dispatcher only ever sees [`InboundEvent`] and talks back through
//! [`Transport`]; everything vendor-specific stays in the adapter.

pub mod telegram;

use async_trait::async_trait;

use crate::error::ChannelError;

pub use telegram::TelegramTransport;

/// A single inbound message event, normalized from the transport's
/// native payload.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Sender identifier (handle or numeric id).
    pub sender: String,
    /// Whether the sender is the primary user the relay acts for.
    pub is_from_primary: bool,
    /// Message body. Empty-bodied events are dropped by the adapter.
    pub text: String,
    /// Conversation the message arrived in; replies go back here.
    pub conversation_id: String,
}

/// Outbound message transport — pure I/O, no relay logic.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name (e.g. "telegram").
    fn name(&self) -> &str;

    /// The conversation id for a direct message to the given user.
    fn direct_conversation(&self, user_id: &str) -> String;

    /// Deliver text to a conversation.
    async fn send(&self, conversation_id: &str, text: &str) -> Result<(), ChannelError>;
}

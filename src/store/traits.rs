//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::relay::directive::{RelayDirective, SendPolicy, StyleProfile, UserStatus};
use crate::relay::draft::PendingDraft;

/// How a relay event reached its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMethod {
    /// Forwarded to or sent by the primary user.
    Manual,
    /// Answered by the generator.
    Auto,
    /// Escalated as urgent.
    Urgent,
}

impl std::fmt::Display for RelayMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Auto => write!(f, "auto"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for RelayMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Unknown relay method: {}", s)),
        }
    }
}

/// An immutable record of one relay event. Append-only; the core never
/// mutates or deletes these.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RelayLogRecord {
    pub id: Uuid,
    pub conversation_id: String,
    pub from_user: String,
    pub to_user: String,
    pub original_text: String,
    pub relayed_text: String,
    pub method: RelayMethod,
    pub was_auto_responded: bool,
    pub is_urgent: bool,
    pub created_at: DateTime<Utc>,
}

impl RelayLogRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversation_id: impl Into<String>,
        from_user: impl Into<String>,
        to_user: impl Into<String>,
        original_text: impl Into<String>,
        relayed_text: impl Into<String>,
        method: RelayMethod,
        was_auto_responded: bool,
        is_urgent: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.into(),
            from_user: from_user.into(),
            to_user: to_user.into(),
            original_text: original_text.into(),
            relayed_text: relayed_text.into(),
            method,
            was_auto_responded,
            is_urgent,
            created_at: Utc::now(),
        }
    }
}

/// Backend-agnostic database trait covering relay state, style profiles,
/// contact preferences, drafts, and the relay log.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Relay state ─────────────────────────────────────────────────

    /// Get the user's directive row (status + send policy + context).
    async fn get_relay_state(
        &self,
        user_id: &str,
    ) -> Result<Option<RelayDirective>, DatabaseError>;

    /// Seed the default directive row if the user has none yet.
    async fn init_relay_state(&self, user_id: &str) -> Result<(), DatabaseError>;

    async fn set_status(&self, user_id: &str, status: UserStatus) -> Result<(), DatabaseError>;

    async fn set_send_policy(
        &self,
        user_id: &str,
        policy: SendPolicy,
    ) -> Result<(), DatabaseError>;

    async fn set_context(&self, user_id: &str, context: Option<&str>)
    -> Result<(), DatabaseError>;

    // ── Style profile ───────────────────────────────────────────────

    async fn get_style_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<StyleProfile>, DatabaseError>;

    async fn upsert_style_profile(
        &self,
        user_id: &str,
        profile: &StyleProfile,
    ) -> Result<(), DatabaseError>;

    // ── Contact preferences ─────────────────────────────────────────

    /// Whether a contact accepts auto-responses. `None` when no
    /// preference is stored (callers treat that as allowed).
    async fn get_auto_respond_allowed(
        &self,
        user_id: &str,
        contact_id: &str,
    ) -> Result<Option<bool>, DatabaseError>;

    async fn set_auto_respond_allowed(
        &self,
        user_id: &str,
        contact_id: &str,
        allowed: bool,
    ) -> Result<(), DatabaseError>;

    // ── Drafts ──────────────────────────────────────────────────────

    /// The contact's most recent draft with `expires_at > now`. Expired
    /// drafts are invisible here — expiry is a filter, not a sweep.
    async fn get_active_draft(
        &self,
        contact_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingDraft>, DatabaseError>;

    async fn insert_draft(&self, draft: &PendingDraft) -> Result<(), DatabaseError>;

    async fn update_draft(
        &self,
        id: Uuid,
        body: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn delete_draft(&self, id: Uuid) -> Result<(), DatabaseError>;

    // ── Relay log ───────────────────────────────────────────────────

    async fn append_relay_record(&self, record: &RelayLogRecord) -> Result<(), DatabaseError>;

    /// Records with `created_at >= since`, oldest first (digest grouping
    /// relies on first-seen order).
    async fn records_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RelayLogRecord>, DatabaseError>;

    /// Most recent records, newest first, up to `limit`.
    async fn recent_records(&self, limit: usize) -> Result<Vec<RelayLogRecord>, DatabaseError>;

    /// The most recent sender who reached the given user — the `reply:`
    /// target.
    async fn last_counterpart(&self, user_id: &str) -> Result<Option<String>, DatabaseError>;
}

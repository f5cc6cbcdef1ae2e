//! Pending drafts — generated replies staged for contact approval.
//!
//! One state machine per contact: `NoDraft → DraftPending → {Sent |
//! Cancelled}`, with `edit:` looping back to `DraftPending`. Expiry is a
//! filter predicate on lookup, not a background sweep — an expired draft
//! is simply invisible.

use std::sync::Arc;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::Database;

/// A generated reply awaiting the contact's approval.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PendingDraft {
    pub id: Uuid,
    /// The contact this draft answers.
    pub contact_id: String,
    /// Conversation the reply will be delivered to.
    pub conversation_id: String,
    /// Draft body text.
    pub body: String,
    /// Optional context hint captured at generation time.
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingDraft {
    pub fn new(
        contact_id: impl Into<String>,
        conversation_id: impl Into<String>,
        body: impl Into<String>,
        context: Option<String>,
        expire_minutes: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            contact_id: contact_id.into(),
            conversation_id: conversation_id.into(),
            body: body.into(),
            context,
            created_at: now,
            expires_at: now + Duration::minutes(expire_minutes as i64),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A contact's instruction against their own active draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftAction {
    /// Literal `send` — approve and deliver the draft.
    Send,
    /// Literal `cancel` — discard the draft.
    Cancel,
    /// `edit: <text>` — replace the body verbatim, bypassing the generator.
    Edit(String),
}

static EDIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^edit:\s*(.+)$").expect("valid edit regex"));

/// Parse a contact message as a draft-lifecycle command, if it is one.
pub fn parse_draft_action(text: &str) -> Option<DraftAction> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("send") {
        return Some(DraftAction::Send);
    }
    if trimmed.eq_ignore_ascii_case("cancel") {
        return Some(DraftAction::Cancel);
    }
    EDIT_RE
        .captures(trimmed)
        .map(|caps| DraftAction::Edit(caps[1].trim().to_string()))
}

/// Result of applying a draft action for a contact.
#[derive(Debug, Clone)]
pub enum DraftOutcome {
    /// The draft was approved; deliver `draft.body` and log it.
    Sent { draft: PendingDraft },
    /// The draft was discarded.
    Cancelled,
    /// The body was replaced and the expiry refreshed.
    Edited { draft: PendingDraft },
    /// No active draft — the command is a silent no-op.
    NoActiveDraft,
}

/// Draft lifecycle engine over the store.
///
/// All lookups go through `active_draft`, which filters expired rows, so
/// callers never observe a stale draft.
#[derive(Clone)]
pub struct DraftEngine {
    db: Arc<dyn Database>,
    expire_minutes: u32,
}

impl DraftEngine {
    pub fn new(db: Arc<dyn Database>, expire_minutes: u32) -> Self {
        Self { db, expire_minutes }
    }

    /// The contact's active (unexpired) draft, if any.
    pub async fn active_draft(
        &self,
        contact_id: &str,
    ) -> Result<Option<PendingDraft>, DatabaseError> {
        self.db.get_active_draft(contact_id, Utc::now()).await
    }

    /// Stage a freshly generated reply for approval. If the contact
    /// already has an active draft, its body is replaced and the expiry
    /// refreshed — a contact never accumulates competing drafts.
    pub async fn stage(
        &self,
        contact_id: &str,
        conversation_id: &str,
        body: &str,
        context: Option<String>,
    ) -> Result<PendingDraft, DatabaseError> {
        if let Some(mut existing) = self.active_draft(contact_id).await? {
            existing.body = body.to_string();
            existing.expires_at = Utc::now() + Duration::minutes(self.expire_minutes as i64);
            self.db
                .update_draft(existing.id, &existing.body, existing.expires_at)
                .await?;
            return Ok(existing);
        }

        let draft = PendingDraft::new(
            contact_id,
            conversation_id,
            body,
            context,
            self.expire_minutes,
        );
        self.db.insert_draft(&draft).await?;
        Ok(draft)
    }

    /// Apply a contact's draft command. Commands with no active draft
    /// resolve to `NoActiveDraft`; the caller stays silent toward the
    /// contact in that case.
    pub async fn apply(
        &self,
        contact_id: &str,
        action: DraftAction,
    ) -> Result<DraftOutcome, DatabaseError> {
        let Some(mut draft) = self.active_draft(contact_id).await? else {
            return Ok(DraftOutcome::NoActiveDraft);
        };

        match action {
            DraftAction::Send => {
                self.db.delete_draft(draft.id).await?;
                Ok(DraftOutcome::Sent { draft })
            }
            DraftAction::Cancel => {
                self.db.delete_draft(draft.id).await?;
                Ok(DraftOutcome::Cancelled)
            }
            DraftAction::Edit(new_body) => {
                draft.body = new_body;
                draft.expires_at = Utc::now() + Duration::minutes(self.expire_minutes as i64);
                self.db
                    .update_draft(draft.id, &draft.body, draft.expires_at)
                    .await?;
                Ok(DraftOutcome::Edited { draft })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_draft_is_not_expired() {
        let draft = PendingDraft::new("ana", "chat_1", "on my way", None, 120);
        assert!(!draft.is_expired(Utc::now()));
        assert!(draft.expires_at > draft.created_at);
    }

    #[test]
    fn draft_expiry_is_inclusive_at_the_boundary() {
        let draft = PendingDraft::new("ana", "chat_1", "soon", None, 120);
        assert!(draft.is_expired(draft.expires_at));
        assert!(draft.is_expired(draft.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn parses_send_and_cancel_ignoring_case() {
        assert_eq!(parse_draft_action("send"), Some(DraftAction::Send));
        assert_eq!(parse_draft_action("  SEND "), Some(DraftAction::Send));
        assert_eq!(parse_draft_action("Cancel"), Some(DraftAction::Cancel));
    }

    #[test]
    fn parses_edit_with_verbatim_body() {
        assert_eq!(
            parse_draft_action("edit: Actually, make it Tuesday"),
            Some(DraftAction::Edit("Actually, make it Tuesday".into()))
        );
    }

    #[test]
    fn edit_body_spans_lines() {
        assert_eq!(
            parse_draft_action("edit: line one\nline two"),
            Some(DraftAction::Edit("line one\nline two".into()))
        );
    }

    #[test]
    fn ordinary_text_is_not_a_draft_action() {
        assert_eq!(parse_draft_action("can you send it later?"), None);
        assert_eq!(parse_draft_action("editing the doc"), None);
        assert_eq!(parse_draft_action(""), None);
    }
}

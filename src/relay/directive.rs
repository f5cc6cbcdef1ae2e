//! Relay directive state — the primary user's availability, send policy,
//! and communication-style profile.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::Database;

/// The primary user's availability status. Exactly one value is current
/// at any time; changed only via `/status <mode>` or initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Available,
    Busy,
    Away,
    Sleep,
    Dnd,
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Busy => write!(f, "busy"),
            Self::Away => write!(f, "away"),
            Self::Sleep => write!(f, "sleep"),
            Self::Dnd => write!(f, "dnd"),
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "busy" => Ok(Self::Busy),
            "away" => Ok(Self::Away),
            "sleep" => Ok(Self::Sleep),
            "dnd" => Ok(Self::Dnd),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

impl UserStatus {
    /// Short phrase describing the user's unavailability, used in
    /// prompts and fallback replies.
    pub fn unavailability_phrase(&self) -> &'static str {
        match self {
            Self::Available => "I'm available",
            Self::Busy => "I'm busy at the moment",
            Self::Away => "I'm currently away",
            Self::Sleep => "I'm sleeping right now",
            Self::Dnd => "I'm unavailable",
        }
    }
}

/// Global flag controlling whether generated replies are sent
/// immediately ("yolo") or staged as drafts for approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicy {
    Draft,
    Yolo,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self::Draft
    }
}

impl std::fmt::Display for SendPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Yolo => write!(f, "yolo"),
        }
    }
}

impl std::str::FromStr for SendPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "yolo" => Ok(Self::Yolo),
            _ => Err(format!("Unknown send policy: {}", s)),
        }
    }
}

/// A read snapshot of the relay state consumed by policy and composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayDirective {
    pub status: UserStatus,
    pub send_policy: SendPolicy,
    /// Optional free-text hint from the primary user ("at a wedding
    /// until 6pm"), woven into generated replies.
    pub context: Option<String>,
}

impl Default for RelayDirective {
    fn default() -> Self {
        Self {
            status: UserStatus::Available,
            send_policy: SendPolicy::Draft,
            context: None,
        }
    }
}

/// The primary user's communication-style profile, fed into the
/// generation prompt so auto-responses sound like them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleProfile {
    pub tone: String,
    pub common_phrases: Vec<String>,
    pub emoji_usage: String,
}

impl Default for StyleProfile {
    fn default() -> Self {
        Self {
            tone: "friendly and professional".to_string(),
            common_phrases: vec![
                "sounds good".to_string(),
                "let me check".to_string(),
                "thanks".to_string(),
            ],
            emoji_usage: "moderate".to_string(),
        }
    }
}

/// Read/write access to the primary user's relay state.
///
/// Reads degrade to safe defaults on store failure (status falls back to
/// `available`, so a broken store never silently auto-responds); writes
/// propagate errors to the caller.
#[derive(Clone)]
pub struct DirectiveStore {
    db: Arc<dyn Database>,
    user_id: String,
}

impl DirectiveStore {
    pub fn new(db: Arc<dyn Database>, user_id: impl Into<String>) -> Self {
        Self {
            db,
            user_id: user_id.into(),
        }
    }

    /// Seed the default status row and style profile if absent.
    pub async fn initialize(&self) -> Result<(), crate::error::DatabaseError> {
        self.db.init_relay_state(&self.user_id).await?;
        if self.db.get_style_profile(&self.user_id).await?.is_none() {
            self.db
                .upsert_style_profile(&self.user_id, &StyleProfile::default())
                .await?;
        }
        Ok(())
    }

    /// Current status; `available` if unset or unreadable.
    pub async fn status(&self) -> UserStatus {
        self.directive().await.status
    }

    /// Current directive snapshot; defaults on store failure.
    pub async fn directive(&self) -> RelayDirective {
        match self.db.get_relay_state(&self.user_id).await {
            Ok(Some(directive)) => directive,
            Ok(None) => RelayDirective::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read relay state, defaulting to available");
                RelayDirective::default()
            }
        }
    }

    /// Style profile; the default friendly profile on failure or absence.
    pub async fn style_profile(&self) -> StyleProfile {
        match self.db.get_style_profile(&self.user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => StyleProfile::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read style profile, using default");
                StyleProfile::default()
            }
        }
    }

    pub async fn set_status(&self, status: UserStatus) -> Result<(), crate::error::DatabaseError> {
        self.db.set_status(&self.user_id, status).await
    }

    pub async fn set_send_policy(
        &self,
        policy: SendPolicy,
    ) -> Result<(), crate::error::DatabaseError> {
        self.db.set_send_policy(&self.user_id, policy).await
    }

    /// Whether a contact accepts auto-responses; allowed when no
    /// preference is stored or the store is unreadable.
    pub async fn auto_respond_allowed(&self, contact_id: &str) -> bool {
        match self.db.get_auto_respond_allowed(&self.user_id, contact_id).await {
            Ok(Some(allowed)) => allowed,
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, contact = %contact_id, "Failed to read contact preference");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_and_fromstr() {
        assert_eq!(UserStatus::Dnd.to_string(), "dnd");
        assert_eq!("sleep".parse::<UserStatus>().unwrap(), UserStatus::Sleep);
        assert!("bogus".parse::<UserStatus>().is_err());
    }

    #[test]
    fn send_policy_defaults_to_draft() {
        assert_eq!(SendPolicy::default(), SendPolicy::Draft);
        assert_eq!("yolo".parse::<SendPolicy>().unwrap(), SendPolicy::Yolo);
        assert!("immediate".parse::<SendPolicy>().is_err());
    }

    #[test]
    fn default_directive_is_safe() {
        let directive = RelayDirective::default();
        assert_eq!(directive.status, UserStatus::Available);
        assert_eq!(directive.send_policy, SendPolicy::Draft);
        assert!(directive.context.is_none());
    }
}

//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. All timestamps are
//! stored as fixed-width RFC 3339 UTC strings so lexicographic SQL
//! comparisons agree with chronological order.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::relay::directive::{RelayDirective, SendPolicy, StyleProfile, UserStatus};
use crate::relay::draft::PendingDraft;
use crate::store::migrations;
use crate::store::traits::{Database, RelayLogRecord, RelayMethod};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp write format: fixed-width RFC 3339 with `Z`.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn row_to_draft(row: &libsql::Row) -> Result<PendingDraft, DatabaseError> {
    let id_str: String = row.get(0).map_err(query_err)?;
    let contact_id: String = row.get(1).map_err(query_err)?;
    let conversation_id: String = row.get(2).map_err(query_err)?;
    let body: String = row.get(3).map_err(query_err)?;
    let context: Option<String> = row.get(4).ok();
    let created_str: String = row.get(5).map_err(query_err)?;
    let expires_str: String = row.get(6).map_err(query_err)?;

    Ok(PendingDraft {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        contact_id,
        conversation_id,
        body,
        context,
        created_at: parse_datetime(&created_str),
        expires_at: parse_datetime(&expires_str),
    })
}

fn row_to_record(row: &libsql::Row) -> Result<RelayLogRecord, DatabaseError> {
    let id_str: String = row.get(0).map_err(query_err)?;
    let conversation_id: String = row.get(1).map_err(query_err)?;
    let from_user: String = row.get(2).map_err(query_err)?;
    let to_user: String = row.get(3).map_err(query_err)?;
    let original_text: String = row.get(4).map_err(query_err)?;
    let relayed_text: String = row.get(5).map_err(query_err)?;
    let method_str: String = row.get(6).map_err(query_err)?;
    let was_auto_responded: i64 = row.get(7).map_err(query_err)?;
    let is_urgent: i64 = row.get(8).map_err(query_err)?;
    let created_str: String = row.get(9).map_err(query_err)?;

    Ok(RelayLogRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        conversation_id,
        from_user,
        to_user,
        original_text,
        relayed_text,
        method: method_str.parse().unwrap_or(RelayMethod::Manual),
        was_auto_responded: was_auto_responded != 0,
        is_urgent: is_urgent != 0,
        created_at: parse_datetime(&created_str),
    })
}

const RECORD_COLUMNS: &str = "id, conversation_id, from_user, to_user, original_text, \
     relayed_text, relay_method, was_auto_responded, is_urgent, created_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Relay state ─────────────────────────────────────────────────

    async fn get_relay_state(
        &self,
        user_id: &str,
    ) -> Result<Option<RelayDirective>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT status, send_policy, context FROM relay_state WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(query_err)?;

        let Some(row) = rows.next().await.map_err(query_err)? else {
            return Ok(None);
        };

        let status_str: String = row.get(0).map_err(query_err)?;
        let policy_str: String = row.get(1).map_err(query_err)?;
        let context: Option<String> = row.get(2).ok();

        Ok(Some(RelayDirective {
            status: status_str.parse().unwrap_or(UserStatus::Available),
            send_policy: policy_str.parse().unwrap_or(SendPolicy::Draft),
            context,
        }))
    }

    async fn init_relay_state(&self, user_id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO relay_state (user_id, status, send_policy, updated_at)
                 VALUES (?1, 'available', 'draft', ?2)",
                params![user_id, fmt_ts(Utc::now())],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn set_status(&self, user_id: &str, status: UserStatus) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO relay_state (user_id, status, send_policy, updated_at)
                 VALUES (?1, ?2, 'draft', ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     status = excluded.status,
                     updated_at = excluded.updated_at",
                params![user_id, status.to_string(), fmt_ts(Utc::now())],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn set_send_policy(
        &self,
        user_id: &str,
        policy: SendPolicy,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO relay_state (user_id, status, send_policy, updated_at)
                 VALUES (?1, 'available', ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     send_policy = excluded.send_policy,
                     updated_at = excluded.updated_at",
                params![user_id, policy.to_string(), fmt_ts(Utc::now())],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn set_context(
        &self,
        user_id: &str,
        context: Option<&str>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO relay_state (user_id, status, send_policy, context, updated_at)
                 VALUES (?1, 'available', 'draft', ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     context = excluded.context,
                     updated_at = excluded.updated_at",
                params![user_id, opt_text(context), fmt_ts(Utc::now())],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    // ── Style profile ───────────────────────────────────────────────

    async fn get_style_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<StyleProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT tone, common_phrases, emoji_usage FROM style_profiles WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(query_err)?;

        let Some(row) = rows.next().await.map_err(query_err)? else {
            return Ok(None);
        };

        let tone: String = row.get(0).map_err(query_err)?;
        let phrases_json: String = row.get(1).map_err(query_err)?;
        let emoji_usage: String = row.get(2).map_err(query_err)?;

        let common_phrases: Vec<String> = serde_json::from_str(&phrases_json)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        Ok(Some(StyleProfile {
            tone,
            common_phrases,
            emoji_usage,
        }))
    }

    async fn upsert_style_profile(
        &self,
        user_id: &str,
        profile: &StyleProfile,
    ) -> Result<(), DatabaseError> {
        let phrases_json = serde_json::to_string(&profile.common_phrases)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO style_profiles (user_id, tone, common_phrases, emoji_usage, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                     tone = excluded.tone,
                     common_phrases = excluded.common_phrases,
                     emoji_usage = excluded.emoji_usage,
                     updated_at = excluded.updated_at",
                params![
                    user_id,
                    profile.tone.as_str(),
                    phrases_json,
                    profile.emoji_usage.as_str(),
                    fmt_ts(Utc::now())
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    // ── Contact preferences ─────────────────────────────────────────

    async fn get_auto_respond_allowed(
        &self,
        user_id: &str,
        contact_id: &str,
    ) -> Result<Option<bool>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT allow_auto_respond FROM contact_prefs
                 WHERE user_id = ?1 AND contact_id = ?2",
                params![user_id, contact_id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => {
                let allowed: i64 = row.get(0).map_err(query_err)?;
                Ok(Some(allowed != 0))
            }
            None => Ok(None),
        }
    }

    async fn set_auto_respond_allowed(
        &self,
        user_id: &str,
        contact_id: &str,
        allowed: bool,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO contact_prefs (user_id, contact_id, allow_auto_respond, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, contact_id) DO UPDATE SET
                     allow_auto_respond = excluded.allow_auto_respond,
                     updated_at = excluded.updated_at",
                params![user_id, contact_id, allowed as i64, fmt_ts(Utc::now())],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    // ── Drafts ──────────────────────────────────────────────────────

    async fn get_active_draft(
        &self,
        contact_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingDraft>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, contact_id, conversation_id, body, context, created_at, expires_at
                 FROM drafts
                 WHERE contact_id = ?1 AND expires_at > ?2
                 ORDER BY created_at DESC
                 LIMIT 1",
                params![contact_id, fmt_ts(now)],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_draft(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_draft(&self, draft: &PendingDraft) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO drafts (id, contact_id, conversation_id, body, context, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    draft.id.to_string(),
                    draft.contact_id.as_str(),
                    draft.conversation_id.as_str(),
                    draft.body.as_str(),
                    opt_text(draft.context.as_deref()),
                    fmt_ts(draft.created_at),
                    fmt_ts(draft.expires_at)
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn update_draft(
        &self,
        id: Uuid,
        body: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE drafts SET body = ?2, expires_at = ?3 WHERE id = ?1",
                params![id.to_string(), body, fmt_ts(expires_at)],
            )
            .await
            .map_err(query_err)?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "draft".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_draft(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM drafts WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    // ── Relay log ───────────────────────────────────────────────────

    async fn append_relay_record(&self, record: &RelayLogRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO relay_log (id, conversation_id, from_user, to_user, original_text,
                     relayed_text, relay_method, was_auto_responded, is_urgent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id.to_string(),
                    record.conversation_id.as_str(),
                    record.from_user.as_str(),
                    record.to_user.as_str(),
                    record.original_text.as_str(),
                    record.relayed_text.as_str(),
                    record.method.to_string(),
                    record.was_auto_responded as i64,
                    record.is_urgent as i64,
                    fmt_ts(record.created_at)
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn records_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RelayLogRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM relay_log
                     WHERE created_at >= ?1
                     ORDER BY created_at ASC"
                ),
                params![fmt_ts(since)],
            )
            .await
            .map_err(query_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }

    async fn recent_records(&self, limit: usize) -> Result<Vec<RelayLogRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM relay_log
                     ORDER BY created_at DESC
                     LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(query_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }

    async fn last_counterpart(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT from_user FROM relay_log
                 WHERE to_user = ?1
                 ORDER BY created_at DESC
                 LIMIT 1",
                params![user_id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row.get(0).map_err(query_err)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn relay_state_roundtrip() {
        let db = backend().await;
        assert!(db.get_relay_state("mira").await.unwrap().is_none());

        db.init_relay_state("mira").await.unwrap();
        let state = db.get_relay_state("mira").await.unwrap().unwrap();
        assert_eq!(state.status, UserStatus::Available);
        assert_eq!(state.send_policy, SendPolicy::Draft);

        db.set_status("mira", UserStatus::Sleep).await.unwrap();
        db.set_send_policy("mira", SendPolicy::Yolo).await.unwrap();
        db.set_context("mira", Some("at a wedding")).await.unwrap();

        let state = db.get_relay_state("mira").await.unwrap().unwrap();
        assert_eq!(state.status, UserStatus::Sleep);
        assert_eq!(state.send_policy, SendPolicy::Yolo);
        assert_eq!(state.context.as_deref(), Some("at a wedding"));
    }

    #[tokio::test]
    async fn init_does_not_clobber_existing_state() {
        let db = backend().await;
        db.set_status("mira", UserStatus::Dnd).await.unwrap();
        db.init_relay_state("mira").await.unwrap();
        let state = db.get_relay_state("mira").await.unwrap().unwrap();
        assert_eq!(state.status, UserStatus::Dnd);
    }

    #[tokio::test]
    async fn style_profile_roundtrip() {
        let db = backend().await;
        assert!(db.get_style_profile("mira").await.unwrap().is_none());

        let profile = StyleProfile {
            tone: "dry and brief".into(),
            common_phrases: vec!["ack".into(), "on it".into()],
            emoji_usage: "rare".into(),
        };
        db.upsert_style_profile("mira", &profile).await.unwrap();

        let loaded = db.get_style_profile("mira").await.unwrap().unwrap();
        assert_eq!(loaded.tone, "dry and brief");
        assert_eq!(loaded.common_phrases, vec!["ack", "on it"]);
    }

    #[tokio::test]
    async fn contact_prefs_default_to_absent() {
        let db = backend().await;
        assert!(
            db.get_auto_respond_allowed("mira", "ana")
                .await
                .unwrap()
                .is_none()
        );

        db.set_auto_respond_allowed("mira", "ana", false)
            .await
            .unwrap();
        assert_eq!(
            db.get_auto_respond_allowed("mira", "ana").await.unwrap(),
            Some(false)
        );
    }

    #[tokio::test]
    async fn draft_lifecycle() {
        let db = backend().await;
        let draft = PendingDraft::new("ana", "chat_1", "be there soon", None, 120);
        db.insert_draft(&draft).await.unwrap();

        let active = db
            .get_active_draft("ana", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.body, "be there soon");

        let new_expiry = Utc::now() + Duration::minutes(120);
        db.update_draft(draft.id, "be there at 6", new_expiry)
            .await
            .unwrap();
        let active = db
            .get_active_draft("ana", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.body, "be there at 6");

        db.delete_draft(draft.id).await.unwrap();
        assert!(
            db.get_active_draft("ana", Utc::now())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn expired_draft_is_invisible_without_deletion() {
        let db = backend().await;
        let mut draft = PendingDraft::new("ana", "chat_1", "stale", None, 120);
        draft.expires_at = Utc::now() - Duration::minutes(5);
        db.insert_draft(&draft).await.unwrap();

        assert!(
            db.get_active_draft("ana", Utc::now())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn update_missing_draft_is_not_found() {
        let db = backend().await;
        let result = db
            .update_draft(Uuid::new_v4(), "x", Utc::now() + Duration::minutes(1))
            .await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn relay_log_window_and_ordering() {
        let db = backend().await;
        let mut first = RelayLogRecord::new(
            "c1", "ana", "mira", "hi", "hi", RelayMethod::Manual, false, false,
        );
        first.created_at = Utc::now() - Duration::minutes(30);
        let second = RelayLogRecord::new(
            "c2", "ben", "mira", "yo", "yo", RelayMethod::Urgent, false, true,
        );
        db.append_relay_record(&second).await.unwrap();
        db.append_relay_record(&first).await.unwrap();

        let since = Utc::now() - Duration::hours(2);
        let records = db.records_since(since).await.unwrap();
        assert_eq!(records.len(), 2);
        // Oldest first regardless of insert order
        assert_eq!(records[0].from_user, "ana");
        assert_eq!(records[1].from_user, "ben");

        let old_cutoff = Utc::now() - Duration::minutes(10);
        let recent = db.records_since(old_cutoff).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].from_user, "ben");
    }

    #[tokio::test]
    async fn last_counterpart_is_most_recent_sender() {
        let db = backend().await;
        let mut earlier = RelayLogRecord::new(
            "c1", "ana", "mira", "first", "first", RelayMethod::Manual, false, false,
        );
        earlier.created_at = Utc::now() - Duration::minutes(10);
        db.append_relay_record(&earlier).await.unwrap();
        db.append_relay_record(&RelayLogRecord::new(
            "c2", "ben", "mira", "second", "second", RelayMethod::Manual, false, false,
        ))
        .await
        .unwrap();

        assert_eq!(
            db.last_counterpart("mira").await.unwrap().as_deref(),
            Some("ben")
        );
        assert!(db.last_counterpart("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_file_backend_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.set_status("mira", UserStatus::Busy).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let state = db.get_relay_state("mira").await.unwrap().unwrap();
        assert_eq!(state.status, UserStatus::Busy);
    }
}

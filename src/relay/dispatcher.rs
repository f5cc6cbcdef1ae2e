//! Relay dispatcher — the single state-machine driver.
//!
//! Every inbound event enters through [`RelayDispatcher::handle`] and
//! runs to completion in one pass. Primary-user messages go through the
//! command parser; contact messages go urgency → draft lifecycle →
//! auto-respond policy. No error escapes `handle`: failures become a
//! short diagnostic to the primary user and the event counts as handled.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::channels::{InboundEvent, Transport};
use crate::compose::{self, Composer};
use crate::config::RelayConfig;
use crate::error::Result;
use crate::llm::LlmProvider;
use crate::relay::digest::build_digest;
use crate::relay::directive::DirectiveStore;
use crate::relay::draft::{self, DraftEngine, DraftOutcome};
use crate::store::{Database, RelayLogRecord, RelayMethod};
use crate::triage::{self, ParsedInput, RelayCommand};

/// Orchestrates triage, policy, composition, and persistence for one
/// inbound event at a time.
pub struct RelayDispatcher {
    config: RelayConfig,
    db: Arc<dyn Database>,
    directive: DirectiveStore,
    drafts: DraftEngine,
    composer: Composer,
    transport: Arc<dyn Transport>,
}

impl RelayDispatcher {
    pub fn new(
        config: RelayConfig,
        db: Arc<dyn Database>,
        llm: Arc<dyn LlmProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let directive = DirectiveStore::new(Arc::clone(&db), config.primary_user.clone());
        let drafts = DraftEngine::new(Arc::clone(&db), config.draft_expiry_minutes);
        let composer = Composer::new(
            llm,
            config.agent_name.clone(),
            config.reference_prefix.clone(),
        );
        Self {
            config,
            db,
            directive,
            drafts,
            composer,
            transport,
        }
    }

    /// Seed default state for the primary user. Called once at startup.
    pub async fn initialize(&self) -> Result<()> {
        self.directive.initialize().await?;
        Ok(())
    }

    /// Process one inbound event. Never panics or propagates: any
    /// failure is logged, reported to the primary user best-effort, and
    /// the event is considered handled — there is no retry.
    pub async fn handle(&self, event: InboundEvent) {
        if event.text.trim().is_empty() {
            return;
        }

        if let Err(e) = self.process(&event).await {
            error!(error = %e, sender = %event.sender, "Failed to handle inbound event");
            self.notify_primary(&compose::diagnostic(&e.to_string()))
                .await;
        }
    }

    async fn process(&self, event: &InboundEvent) -> Result<()> {
        if event.is_from_primary {
            self.handle_primary(event).await
        } else {
            self.handle_contact(event).await
        }
    }

    // ── Primary-user messages ───────────────────────────────────────

    async fn handle_primary(&self, event: &InboundEvent) -> Result<()> {
        match triage::parse_command(&event.text) {
            ParsedInput::Command(command) => self.execute_command(event, command).await,
            ParsedInput::Invalid(e) => {
                // Malformed commands get actionable feedback, not silence.
                self.reply_to(event, &e.to_string()).await
            }
            ParsedInput::Ordinary => {
                debug!("Ordinary message from primary user, no relay action");
                Ok(())
            }
        }
    }

    async fn execute_command(&self, event: &InboundEvent, command: RelayCommand) -> Result<()> {
        match command {
            RelayCommand::Send { target, message } => {
                self.manual_send(event, &target, &message).await
            }
            RelayCommand::Reply { message } => {
                let Some(target) = self.db.last_counterpart(&self.config.primary_user).await?
                else {
                    return self.reply_to(event, &compose::no_reply_target()).await;
                };
                self.manual_send(event, &target, &message).await
            }
            RelayCommand::StatusCheck => {
                let status = self.directive.status().await;
                self.reply_to(event, &compose::status_report(status)).await
            }
            RelayCommand::StatusSet(status) => {
                self.directive.set_status(status).await?;
                info!(status = %status, "Status changed");
                self.reply_to(event, &compose::status_confirmation(status))
                    .await
            }
            RelayCommand::Digest { hours_back } => {
                let since = Utc::now() - Duration::hours(hours_back);
                let records = self.db.records_since(since).await?;
                let digest = build_digest(&records, hours_back, &self.config.primary_user);
                self.reply_to(event, &digest).await
            }
            RelayCommand::PolicySet(policy) => {
                self.directive.set_send_policy(policy).await?;
                info!(policy = %policy, "Send policy changed");
                self.reply_to(event, &compose::policy_confirmation(policy))
                    .await
            }
        }
    }

    /// Deliver a manual message to a named contact and confirm it.
    async fn manual_send(&self, event: &InboundEvent, target: &str, message: &str) -> Result<()> {
        let conversation = self.transport.direct_conversation(target);
        self.transport.send(&conversation, message).await?;
        self.reply_to(event, &compose::sent_confirmation(target))
            .await?;

        self.log_relay(RelayLogRecord::new(
            conversation,
            &self.config.primary_user,
            target,
            message,
            message,
            RelayMethod::Manual,
            false,
            false,
        ))
        .await;
        Ok(())
    }

    // ── Contact messages ────────────────────────────────────────────

    async fn handle_contact(&self, event: &InboundEvent) -> Result<()> {
        // Urgency always wins: escalate before any draft or policy step.
        if triage::is_urgent(&event.text) {
            return self.escalate_urgent(event).await;
        }

        if let Some(action) = draft::parse_draft_action(&event.text) {
            return self.apply_draft_action(event, action).await;
        }

        let directive = self.directive.directive().await;
        let contact_allows = self.directive.auto_respond_allowed(&event.sender).await;

        if triage::should_auto_respond(directive.status, false, contact_allows) {
            let profile = self.directive.style_profile().await;
            let body = self
                .composer
                .generate_reply(&directive, &profile, &event.text)
                .await;

            match directive.send_policy {
                crate::relay::directive::SendPolicy::Yolo => {
                    self.send_auto_reply(event, &body).await
                }
                crate::relay::directive::SendPolicy::Draft => {
                    self.stage_draft(event, &body, directive.context).await
                }
            }
        } else {
            self.forward_to_primary(event).await
        }
    }

    async fn escalate_urgent(&self, event: &InboundEvent) -> Result<()> {
        info!(sender = %event.sender, "Urgent message, escalating");
        let escalation = compose::urgent_escalation(&event.sender, &event.text);
        let primary_conv = self
            .transport
            .direct_conversation(&self.config.primary_user);
        self.transport.send(&primary_conv, &escalation).await?;

        self.log_relay(RelayLogRecord::new(
            &event.conversation_id,
            &event.sender,
            &self.config.primary_user,
            &event.text,
            escalation,
            RelayMethod::Urgent,
            false,
            true,
        ))
        .await;
        Ok(())
    }

    async fn apply_draft_action(
        &self,
        event: &InboundEvent,
        action: draft::DraftAction,
    ) -> Result<()> {
        match self.drafts.apply(&event.sender, action).await? {
            DraftOutcome::Sent { draft } => {
                let wrapped = self.composer.wrap_outbound(&draft.body);
                self.transport.send(&draft.conversation_id, &wrapped).await?;
                self.notify_primary(&compose::delivered_notice(&event.sender, &draft.body))
                    .await;

                self.log_relay(RelayLogRecord::new(
                    &draft.conversation_id,
                    &event.sender,
                    &event.sender,
                    &draft.body,
                    wrapped,
                    RelayMethod::Auto,
                    true,
                    false,
                ))
                .await;
            }
            DraftOutcome::Cancelled => {
                info!(contact = %event.sender, "Draft cancelled");
            }
            DraftOutcome::Edited { draft } => {
                info!(contact = %event.sender, draft_id = %draft.id, "Draft edited");
            }
            DraftOutcome::NoActiveDraft => {
                // Stray send/cancel/edit must stay silent toward the contact.
                debug!(contact = %event.sender, "Draft command with no active draft, ignoring");
            }
        }
        Ok(())
    }

    async fn send_auto_reply(&self, event: &InboundEvent, body: &str) -> Result<()> {
        let wrapped = self.composer.wrap_outbound(body);
        self.transport.send(&event.conversation_id, &wrapped).await?;
        self.notify_primary(&compose::auto_respond_notice(&event.sender, &event.text, body))
            .await;

        self.log_relay(RelayLogRecord::new(
            &event.conversation_id,
            &event.sender,
            &event.sender,
            &event.text,
            body,
            RelayMethod::Auto,
            true,
            false,
        ))
        .await;
        Ok(())
    }

    async fn stage_draft(
        &self,
        event: &InboundEvent,
        body: &str,
        context: Option<String>,
    ) -> Result<()> {
        let draft = self
            .drafts
            .stage(&event.sender, &event.conversation_id, body, context)
            .await?;
        info!(contact = %event.sender, draft_id = %draft.id, "Draft staged for approval");

        self.transport
            .send(&event.conversation_id, &compose::draft_preview(&draft.body))
            .await?;

        self.log_relay(RelayLogRecord::new(
            &event.conversation_id,
            &event.sender,
            &event.sender,
            &event.text,
            &draft.body,
            RelayMethod::Auto,
            false,
            false,
        ))
        .await;
        Ok(())
    }

    async fn forward_to_primary(&self, event: &InboundEvent) -> Result<()> {
        let forward = compose::relay_forward(&event.sender, &event.text);
        let primary_conv = self
            .transport
            .direct_conversation(&self.config.primary_user);
        self.transport.send(&primary_conv, &forward).await?;

        self.log_relay(RelayLogRecord::new(
            &event.conversation_id,
            &event.sender,
            &self.config.primary_user,
            &event.text,
            forward,
            RelayMethod::Manual,
            false,
            false,
        ))
        .await;
        Ok(())
    }

    // ── Shared helpers ──────────────────────────────────────────────

    /// Reply in the conversation the event arrived in.
    async fn reply_to(&self, event: &InboundEvent, text: &str) -> Result<()> {
        self.transport.send(&event.conversation_id, text).await?;
        Ok(())
    }

    /// Best-effort direct message to the primary user. Its own failure
    /// is swallowed — diagnostics must never cascade.
    async fn notify_primary(&self, text: &str) {
        let conversation = self
            .transport
            .direct_conversation(&self.config.primary_user);
        if let Err(e) = self.transport.send(&conversation, text).await {
            warn!(error = %e, "Failed to notify primary user");
        }
    }

    /// Append to the relay log. Failures are logged, never raised — a
    /// broken log store must not block message flow.
    async fn log_relay(&self, record: RelayLogRecord) {
        if let Err(e) = self.db.append_relay_record(&record).await {
            warn!(error = %e, "Failed to append relay record");
        }
    }
}

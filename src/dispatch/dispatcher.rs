//! Reply dispatch.
//!
//! One inbound event flows through here as one task: claim the in-flight
//! marker, classify, gate, send, record. The marker is claimed before the
//! first suspension point and released on every exit path.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::activity::{ActivityLog, AutoReplyRecord};
use crate::session::SessionRegistry;
use crate::settings::{AccountDirectory, AccountId, SettingsProvider};
use crate::supervisor::react_to_account_error;
use crate::transport::{InboundEvent, InboundMessage, SendOptions};

use super::classifier::{Classification, classify};
use super::guard::{CooldownStore, InFlightGuard};

/// What a dispatch attempt did, mostly for tests and debug logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A reply went out.
    Replied(Classification),
    /// Another task already holds this message's in-flight marker.
    Duplicate,
    /// No session is registered for the account.
    NoSession,
    /// The classifier found nothing to answer.
    NotEligible,
    /// Direct-message chat still inside its cooldown window.
    OnCooldown,
    /// The send reached the transport and failed there.
    SendFailed,
}

/// Sends configured replies for qualifying inbound events.
#[derive(Clone)]
pub struct ReplyDispatcher {
    registry: SessionRegistry,
    cooldowns: CooldownStore,
    in_flight: InFlightGuard,
    settings: Arc<dyn SettingsProvider>,
    directory: Arc<dyn AccountDirectory>,
    activity: Arc<dyn ActivityLog>,
}

impl ReplyDispatcher {
    pub fn new(
        registry: SessionRegistry,
        cooldowns: CooldownStore,
        in_flight: InFlightGuard,
        settings: Arc<dyn SettingsProvider>,
        directory: Arc<dyn AccountDirectory>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            registry,
            cooldowns,
            in_flight,
            settings,
            directory,
            activity,
        }
    }

    /// Handle one inbound event end to end.
    pub async fn handle_event(&self, event: InboundEvent) -> DispatchOutcome {
        let account = event.account;
        let message = &event.message;
        let chat = message.chat.id;

        // Claim before anything can suspend; a concurrent duplicate of this
        // event loses here and never races the reply.
        if !self.in_flight.try_acquire(account, chat, message.id) {
            debug!(
                account = %account,
                chat = %chat,
                message = %message.id,
                "Event already in flight, dropping duplicate"
            );
            return DispatchOutcome::Duplicate;
        }

        let outcome = self.dispatch(account, message).await;

        self.in_flight.release(account, chat, message.id);
        outcome
    }

    async fn dispatch(&self, account: AccountId, message: &InboundMessage) -> DispatchOutcome {
        let (conn, identity) = match (
            self.registry.connection(account),
            self.registry.identity(account),
        ) {
            (Some(conn), Some(identity)) => (conn, identity),
            _ => {
                debug!(account = %account, "Event for unregistered account, dropping");
                return DispatchOutcome::NoSession;
            }
        };
        self.registry.touch_activity(account);

        let Some(settings) = self.settings.account_settings(account).await else {
            debug!(account = %account, "No settings for account, dropping");
            return DispatchOutcome::NotEligible;
        };

        let classification = classify(conn.as_ref(), &identity, &settings, message).await;

        let (text, opts) = match classification {
            Classification::NotEligible => return DispatchOutcome::NotEligible,
            Classification::DirectMessage => {
                let Some(text) = settings.dm_active() else {
                    return DispatchOutcome::NotEligible;
                };
                // Atomic check-and-set: the window opens here, before the
                // send suspends, so racing messages in the same chat cannot
                // both pass the gate.
                if !self.cooldowns.try_mark(account, message.chat.id) {
                    debug!(account = %account, chat = %message.chat.id, "Chat on cooldown, skipping");
                    return DispatchOutcome::OnCooldown;
                }
                (text.to_string(), SendOptions::default())
            }
            Classification::GroupMention | Classification::GroupReplyToSelf => {
                let Some(text) = settings.groups_active() else {
                    return DispatchOutcome::NotEligible;
                };
                (
                    text.to_string(),
                    SendOptions {
                        reply_to: Some(message.id),
                        silent: false,
                    },
                )
            }
        };

        match conn.send_message(message.chat.id, &text, opts).await {
            Ok(sent_id) => {
                debug!(
                    account = %account,
                    chat = %message.chat.id,
                    sent = %sent_id,
                    kind = ?classification,
                    "Auto-reply sent"
                );
                self.log_reply(account, message, &text).await;
                DispatchOutcome::Replied(classification)
            }
            Err(e) => {
                if classification == Classification::DirectMessage {
                    // Nothing went out; reopen the window.
                    self.cooldowns.clear(account, message.chat.id);
                }
                react_to_account_error(
                    &self.registry,
                    self.directory.as_ref(),
                    self.activity.as_ref(),
                    account,
                    "reply dispatch",
                    &e,
                )
                .await;
                DispatchOutcome::SendFailed
            }
        }
    }

    /// Best-effort activity record; failures never undo the send.
    async fn log_reply(&self, account: AccountId, message: &InboundMessage, reply_text: &str) {
        let owner = self.directory.owner_of(account).await;
        let record = AutoReplyRecord::new(
            owner,
            account,
            message.chat.clone(),
            message.text.clone(),
            reply_text.to_string(),
        );
        if let Err(e) = self.activity.log_auto_reply(record).await {
            warn!(account = %account, error = %e, "Activity log delivery failed");
        }
    }
}

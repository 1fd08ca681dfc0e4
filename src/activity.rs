//! Activity-log sink.
//!
//! Delivery is best effort everywhere: a sink failure is logged at `warn`
//! by the caller and never rolls back the action it records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::{AccountId, UserId};
use crate::transport::ChatInfo;

/// Failure to deliver a record to the sink.
#[derive(Debug, Error)]
#[error("activity log delivery failed: {0}")]
pub struct ActivityError(pub String);

/// One dispatched auto-reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoReplyRecord {
    pub id: String,
    pub owner: Option<UserId>,
    pub account: AccountId,
    pub chat: ChatInfo,
    pub original_text: String,
    pub reply_text: String,
    pub sent_at: DateTime<Utc>,
}

impl AutoReplyRecord {
    /// Build a record with a fresh id and the current timestamp.
    pub fn new(
        owner: Option<UserId>,
        account: AccountId,
        chat: ChatInfo,
        original_text: String,
        reply_text: String,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            owner,
            account,
            chat,
            original_text,
            reply_text,
            sent_at: Utc::now(),
        }
    }
}

/// Destination for activity records.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// Record a dispatched auto-reply.
    async fn log_auto_reply(&self, record: AutoReplyRecord) -> Result<(), ActivityError>;

    /// Surface an account losing its authorization. Called once per
    /// removal, never retried.
    async fn log_auth_failure(
        &self,
        owner: Option<UserId>,
        account: AccountId,
        detail: &str,
    ) -> Result<(), ActivityError> {
        let _ = (owner, account, detail);
        Ok(())
    }
}

/// Sink that drops every record.
pub struct NullActivityLog;

#[async_trait]
impl ActivityLog for NullActivityLog {
    async fn log_auto_reply(&self, _record: AutoReplyRecord) -> Result<(), ActivityError> {
        Ok(())
    }
}

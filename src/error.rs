//! Error types shared across the supervisor and dispatch paths.

use thiserror::Error;

use crate::settings::AccountId;

/// Errors surfaced by the chat transport.
///
/// Every transport call site classifies its error through the predicates
/// below and reacts accordingly: transient errors are absorbed and retried
/// on the next maintenance tick, authorization errors tear the account's
/// session down, benign peer errors are ignored by condition.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The call did not complete within the transport's own deadline.
    #[error("transport timeout: {0}")]
    Timeout(String),

    /// The underlying connection dropped mid-call.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Session credentials were revoked or expired.
    #[error("authorization revoked: {0}")]
    Unauthorized(String),

    /// The event subscription could not be attached.
    #[error("subscription registration failed: {0}")]
    Subscription(String),

    /// The referenced chat or user cannot be resolved (deleted account,
    /// invalid peer reference, deactivated chat).
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    /// Anything the transport could not classify further.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Momentary failure worth retrying on the next periodic tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ConnectionLost(_))
    }

    /// Fatal for the account: no retries until settings change.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Expected condition, ignored by the caller rather than logged as
    /// unexpected.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::PeerUnavailable(_))
    }
}

/// Errors from the service lifecycle itself.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service was started twice.
    #[error("service already started")]
    AlreadyStarted,

    /// Connecting an account failed during startup.
    #[error("account {account} failed to connect: {source}")]
    Connect {
        account: AccountId,
        #[source]
        source: TransportError,
    },
}

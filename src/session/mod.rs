//! Session model and lifecycle.
//!
//! A session is one live connection to the chat network bound to exactly
//! one account. The registry owns the connection handles; everything else
//! observes sessions through cheap snapshots.

pub mod lifecycle;
pub mod registry;

pub use lifecycle::{LifecyclePolicy, PersistentLifecycle, PollingLifecycle, policy_for};
pub use registry::SessionRegistry;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::settings::AccountId;
use crate::transport::SelfIdentity;

/// Where a session sits in its connection lifecycle.
///
/// `Connected -> Degraded` on handler loss, `Degraded -> Connected` on
/// re-attach, `Degraded -> Connecting` when only a full reconnect can heal
/// it. `Disconnected` is terminal: reached when settings disable auto-reply
/// or the account's authorization is revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a registered session.
#[derive(Debug, Clone)]
pub struct Session {
    pub account: AccountId,
    pub state: SessionState,
    pub identity: SelfIdentity,
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
}

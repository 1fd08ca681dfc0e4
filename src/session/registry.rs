//! Session registry.
//!
//! The registry is the only holder of connection handles and the only
//! place session state mutates. At most one session exists per account;
//! `connect` is idempotent and a failed attempt never leaves a partial
//! entry behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::settings::AccountId;
use crate::transport::{ChatConnection, ChatTransport, EventSink, SelfIdentity};

use super::lifecycle::LifecyclePolicy;
use super::{Session, SessionState};

// ============================================================================
// Registry
// ============================================================================

struct SessionEntry {
    conn: Arc<dyn ChatConnection>,
    identity: SelfIdentity,
    state: SessionState,
    last_health_check_at: Option<DateTime<Utc>>,
    last_activity_at: DateTime<Utc>,
}

/// Registry of live sessions, keyed by account.
///
/// Thread-safe and cheap to clone; clones share the underlying map.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<AccountId, SessionEntry>>,
    transport: Arc<dyn ChatTransport>,
    policy: Arc<dyn LifecyclePolicy>,
    events: EventSink,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        policy: Arc<dyn LifecyclePolicy>,
        events: EventSink,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            transport,
            policy,
            events,
        }
    }

    // ------------------------------------------------------------------------
    // Core API
    // ------------------------------------------------------------------------

    /// Connect an account, or refresh an already-connected session.
    ///
    /// Idempotent: when a live session exists, only its event subscription
    /// is re-attached so exactly one handler stays active. A failed fresh
    /// attempt leaves no registry entry.
    pub async fn connect(&self, account: AccountId) -> Result<Session, TransportError> {
        // Clone the handle out so no map guard is held across an await.
        let existing = self
            .sessions
            .get(&account)
            .map(|entry| entry.conn.clone());

        if let Some(conn) = existing {
            if conn.is_connected() {
                debug!(account = %account, "Reusing live session, refreshing subscription");
                if let Err(e) = self
                    .policy
                    .attach(account, conn.as_ref(), self.events.clone())
                    .await
                {
                    self.set_state(account, SessionState::Degraded);
                    return Err(e);
                }
                self.set_state(account, SessionState::Connected);
                return self.get(account).ok_or_else(|| {
                    TransportError::ConnectionLost("session removed during refresh".into())
                });
            }
            // Link is dead: replace it in place.
            return Box::pin(self.reconnect(account)).await;
        }

        let (conn, identity) = self.establish(account).await?;
        let now = Utc::now();
        let session = Session {
            account,
            state: SessionState::Connected,
            identity: identity.clone(),
            last_health_check_at: None,
            last_activity_at: now,
        };
        self.sessions.insert(
            account,
            SessionEntry {
                conn,
                identity,
                state: SessionState::Connected,
                last_health_check_at: None,
                last_activity_at: now,
            },
        );
        info!(account = %account, "Session connected");
        Ok(session)
    }

    /// Fully reconnect an already-registered account.
    ///
    /// The entry stays registered in `Connecting` while the attempt runs so
    /// a transient failure is retried on the next periodic tick. Callers
    /// classify the error and remove the entry on authorization failures.
    pub async fn reconnect(&self, account: AccountId) -> Result<Session, TransportError> {
        if !self.sessions.contains_key(&account) {
            return self.connect(account).await;
        }

        self.set_state(account, SessionState::Connecting);
        let (conn, identity) = self.establish(account).await?;

        if let Some(mut entry) = self.sessions.get_mut(&account) {
            entry.conn = conn;
            entry.identity = identity;
            entry.state = SessionState::Connected;
        }
        info!(account = %account, "Session reconnected");
        self.get(account)
            .ok_or_else(|| TransportError::ConnectionLost("session removed during reconnect".into()))
    }

    /// Tear a session down and forget it. No-op for unknown accounts.
    pub async fn disconnect(&self, account: AccountId) {
        let Some((_, entry)) = self.sessions.remove(&account) else {
            debug!(account = %account, "Disconnect for unregistered account, ignoring");
            return;
        };

        if let Err(e) = self.policy.teardown(entry.conn.as_ref()).await {
            warn!(account = %account, error = %e, "Subscription teardown failed");
        }
        if let Err(e) = entry.conn.disconnect().await {
            warn!(account = %account, error = %e, "Connection release failed");
        }
        info!(account = %account, "Session disconnected");
    }

    /// Remove an account whose credentials were revoked.
    ///
    /// The connection is released quietly; no teardown call is attempted
    /// since the transport already rejects the session.
    pub(crate) async fn remove_unauthorized(&self, account: AccountId) {
        if let Some((_, entry)) = self.sessions.remove(&account) {
            let _ = entry.conn.disconnect().await;
            warn!(account = %account, "Session removed after authorization failure");
        }
    }

    /// Snapshot of one session.
    pub fn get(&self, account: AccountId) -> Option<Session> {
        self.sessions.get(&account).map(|entry| Session {
            account,
            state: entry.state,
            identity: entry.identity.clone(),
            last_health_check_at: entry.last_health_check_at,
            last_activity_at: entry.last_activity_at,
        })
    }

    /// All registered accounts.
    pub fn accounts(&self) -> Vec<AccountId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Disconnect every registered session.
    pub async fn shutdown(&self) {
        let accounts = self.accounts();
        if accounts.is_empty() {
            return;
        }
        info!(count = accounts.len(), "Disconnecting all sessions");
        for account in accounts {
            self.disconnect(account).await;
        }
    }

    // ------------------------------------------------------------------------
    // Crate-internal accessors
    // ------------------------------------------------------------------------

    pub(crate) fn connection(&self, account: AccountId) -> Option<Arc<dyn ChatConnection>> {
        self.sessions.get(&account).map(|entry| entry.conn.clone())
    }

    pub(crate) fn identity(&self, account: AccountId) -> Option<SelfIdentity> {
        self.sessions
            .get(&account)
            .map(|entry| entry.identity.clone())
    }

    pub(crate) fn policy(&self) -> Arc<dyn LifecyclePolicy> {
        self.policy.clone()
    }

    pub(crate) fn events(&self) -> EventSink {
        self.events.clone()
    }

    pub(crate) fn set_state(&self, account: AccountId, state: SessionState) {
        if let Some(mut entry) = self.sessions.get_mut(&account) {
            entry.state = state;
        }
    }

    pub(crate) fn mark_health_checked(&self, account: AccountId) {
        if let Some(mut entry) = self.sessions.get_mut(&account) {
            entry.last_health_check_at = Some(Utc::now());
        }
    }

    pub(crate) fn touch_activity(&self, account: AccountId) {
        if let Some(mut entry) = self.sessions.get_mut(&account) {
            entry.last_activity_at = Utc::now();
        }
    }

    // ------------------------------------------------------------------------
    // Private helpers
    // ------------------------------------------------------------------------

    /// Connect, resolve identity, and attach the receptive path.
    ///
    /// Nothing is registered here; callers insert or update the entry only
    /// after every step succeeded. A subscription-registration failure gets
    /// one immediate retry before the attempt counts as failed.
    async fn establish(
        &self,
        account: AccountId,
    ) -> Result<(Arc<dyn ChatConnection>, SelfIdentity), TransportError> {
        let conn = self.transport.connect(account).await?;
        let identity = conn.self_identity().await?;

        if let Err(e) = self
            .policy
            .attach(account, conn.as_ref(), self.events.clone())
            .await
        {
            if !matches!(e, TransportError::Subscription(_)) {
                return Err(e);
            }
            debug!(account = %account, error = %e, "Subscription attach failed, retrying once");
            self.policy
                .attach(account, conn.as_ref(), self.events.clone())
                .await?;
        }
        Ok((conn, identity))
    }
}

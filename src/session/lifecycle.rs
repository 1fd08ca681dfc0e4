//! Stay-receptive-while-offline strategies.
//!
//! Two deployments exist in the wild: a persistent event-driven session
//! that pushes an offline presence on a jittered schedule, and a leaner
//! variant that keeps no standing subscription and sweeps unread messages
//! instead. Both hide behind one policy interface so the supervisor never
//! branches on the strategy.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::LifecycleMode;
use crate::error::TransportError;
use crate::settings::AccountId;
use crate::transport::{ChatConnection, EventSink, InboundEvent};

/// Per-deployment session-lifecycle strategy.
#[async_trait]
pub trait LifecyclePolicy: Send + Sync {
    /// Wire the session's receptive path, replacing any previous wiring.
    ///
    /// Called on connect and again whenever the health monitor heals a
    /// degraded session; must be safe to call repeatedly.
    async fn attach(
        &self,
        account: AccountId,
        conn: &dyn ChatConnection,
        sink: EventSink,
    ) -> Result<(), TransportError>;

    /// One periodic maintenance pass for a connected session.
    async fn maintain(
        &self,
        account: AccountId,
        conn: &dyn ChatConnection,
        sink: EventSink,
    ) -> Result<(), TransportError>;

    /// Whether the receptive path is still wired.
    fn verify(&self, conn: &dyn ChatConnection) -> bool;

    /// Unwind the receptive path before the connection is released.
    async fn teardown(&self, conn: &dyn ChatConnection) -> Result<(), TransportError>;
}

/// Build the policy selected by configuration.
pub fn policy_for(mode: LifecycleMode) -> Arc<dyn LifecyclePolicy> {
    match mode {
        LifecycleMode::Persistent => Arc::new(PersistentLifecycle),
        LifecycleMode::Polling => Arc::new(PollingLifecycle),
    }
}

// ============================================================================
// Persistent strategy
// ============================================================================

/// Standing event subscription plus periodic offline-presence pushes.
pub struct PersistentLifecycle;

#[async_trait]
impl LifecyclePolicy for PersistentLifecycle {
    async fn attach(
        &self,
        account: AccountId,
        conn: &dyn ChatConnection,
        sink: EventSink,
    ) -> Result<(), TransportError> {
        // Drop any previous handler first so exactly one stays active.
        if let Err(e) = conn.unsubscribe().await {
            debug!(account = %account, error = %e, "No previous subscription to remove");
        }
        conn.subscribe(sink).await?;
        conn.set_offline().await?;
        Ok(())
    }

    async fn maintain(
        &self,
        _account: AccountId,
        conn: &dyn ChatConnection,
        _sink: EventSink,
    ) -> Result<(), TransportError> {
        conn.set_offline().await
    }

    fn verify(&self, conn: &dyn ChatConnection) -> bool {
        conn.has_subscription()
    }

    async fn teardown(&self, conn: &dyn ChatConnection) -> Result<(), TransportError> {
        conn.unsubscribe().await
    }
}

// ============================================================================
// Polling strategy
// ============================================================================

/// No standing subscription; each maintenance pass drains unread messages
/// into the dispatch queue and re-asserts the offline presence.
pub struct PollingLifecycle;

#[async_trait]
impl LifecyclePolicy for PollingLifecycle {
    async fn attach(
        &self,
        _account: AccountId,
        conn: &dyn ChatConnection,
        _sink: EventSink,
    ) -> Result<(), TransportError> {
        conn.set_offline().await
    }

    async fn maintain(
        &self,
        account: AccountId,
        conn: &dyn ChatConnection,
        sink: EventSink,
    ) -> Result<(), TransportError> {
        let unread = conn.fetch_unread().await?;
        for message in unread {
            let event = InboundEvent { account, message };
            if sink.send(event).await.is_err() {
                // Dispatch queue closed, the service is stopping.
                break;
            }
        }
        conn.set_offline().await
    }

    fn verify(&self, _conn: &dyn ChatConnection) -> bool {
        true
    }

    async fn teardown(&self, _conn: &dyn ChatConnection) -> Result<(), TransportError> {
        Ok(())
    }
}

//! Dispatch gates.
//!
//! Two expiring maps guard the reply path: the cooldown store keeps one
//! direct-message chat from being answered twice inside its window, and the
//! in-flight guard keeps one message from being handled twice concurrently.
//! Both expire lazily; the in-flight TTL bounds marker leakage when an
//! exceptional path skips the explicit release.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::expiry::ExpiringMap;
use crate::identity::PeerId;
use crate::settings::AccountId;
use crate::transport::MessageId;

type CooldownKey = (AccountId, PeerId);
type InFlightKey = (AccountId, PeerId, MessageId);

// ============================================================================
// CooldownStore
// ============================================================================

/// Last-reply times per (account, chat).
#[derive(Clone)]
pub struct CooldownStore {
    entries: ExpiringMap<CooldownKey>,
}

impl CooldownStore {
    /// Create a store with the given cooldown window.
    pub fn new(window: Duration) -> Self {
        Self {
            entries: ExpiringMap::new(window),
        }
    }

    /// Whether a reply to this chat is still inside its window.
    pub fn is_on_cooldown(&self, account: AccountId, chat: PeerId) -> bool {
        self.entries.contains_live(&(account, chat))
    }

    /// Atomically open the window if it is not already running.
    ///
    /// The check and the stamp happen without a suspension point in
    /// between, so two racing dispatches in one chat cannot both pass.
    pub fn try_mark(&self, account: AccountId, chat: PeerId) -> bool {
        self.entries.try_insert((account, chat))
    }

    /// Stamp the window unconditionally.
    pub fn mark_replied(&self, account: AccountId, chat: PeerId) {
        self.entries.insert((account, chat));
    }

    /// Reopen the window, e.g. after a send that never reached the network.
    pub fn clear(&self, account: AccountId, chat: PeerId) {
        self.entries.remove(&(account, chat));
    }

    /// Spawn the periodic sweep over expired windows.
    pub fn spawn_sweep_task(
        &self,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        self.entries.spawn_sweep_task(interval, shutdown, "cooldowns")
    }
}

// ============================================================================
// InFlightGuard
// ============================================================================

/// Markers for messages currently being handled.
#[derive(Clone)]
pub struct InFlightGuard {
    entries: ExpiringMap<InFlightKey>,
}

impl InFlightGuard {
    /// Create a guard whose markers auto-release after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: ExpiringMap::new(ttl),
        }
    }

    /// Atomically claim a message. True when this caller won the claim.
    pub fn try_acquire(&self, account: AccountId, chat: PeerId, message: MessageId) -> bool {
        self.entries.try_insert((account, chat, message))
    }

    /// Release a claim.
    pub fn release(&self, account: AccountId, chat: PeerId, message: MessageId) {
        self.entries.remove(&(account, chat, message));
    }

    /// Spawn the periodic sweep over stale markers.
    pub fn spawn_sweep_task(
        &self,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        self.entries.spawn_sweep_task(interval, shutdown, "in_flight")
    }
}

//! Health monitor.
//!
//! Fixed-interval verification of every registered session. A dead link
//! gets a full reconnect; a live link with a lost event subscription gets
//! one re-attach attempt (which also re-applies the offline presence)
//! before escalating to a full reconnect. The first pass runs immediately
//! at startup so newly linked accounts never wait a whole interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;
use crate::error::TransportError;
use crate::session::{SessionRegistry, SessionState};
use crate::settings::{AccountDirectory, AccountId};

use super::react_to_account_error;

/// Periodic session verifier and self-healer.
pub struct HealthMonitor {
    registry: SessionRegistry,
    directory: Arc<dyn AccountDirectory>,
    activity: Arc<dyn ActivityLog>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        registry: SessionRegistry,
        directory: Arc<dyn AccountDirectory>,
        activity: Arc<dyn ActivityLog>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            directory,
            activity,
            interval,
        }
    }

    /// Run until the shutdown signal flips. The interval's first tick
    /// fires at once.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.check_all().await,
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Health monitor stopped");
        })
    }

    /// One verification pass over the registry.
    pub async fn check_all(&self) {
        for account in self.registry.accounts() {
            if let Err(e) = self.check_account(account).await {
                react_to_account_error(
                    &self.registry,
                    self.directory.as_ref(),
                    self.activity.as_ref(),
                    account,
                    "health check",
                    &e,
                )
                .await;
            }
            // No-op when the account was just removed.
            self.registry.mark_health_checked(account);
        }
    }

    async fn check_account(&self, account: AccountId) -> Result<(), TransportError> {
        let Some(conn) = self.registry.connection(account) else {
            return Ok(());
        };

        if !conn.is_connected() {
            debug!(account = %account, "Connection down, performing full reconnect");
            self.registry.reconnect(account).await?;
            return Ok(());
        }

        let policy = self.registry.policy();
        if policy.verify(conn.as_ref()) {
            return Ok(());
        }

        // Handler lost on a live link: heal in place first.
        self.registry.set_state(account, SessionState::Degraded);
        warn!(account = %account, "Event subscription lost, re-attaching");

        match policy
            .attach(account, conn.as_ref(), self.registry.events())
            .await
        {
            Ok(()) => {
                self.registry.set_state(account, SessionState::Connected);
                info!(account = %account, "Subscription re-attached");
                Ok(())
            }
            Err(e) => {
                warn!(account = %account, error = %e, "Re-attach failed, performing full reconnect");
                self.registry.reconnect(account).await?;
                Ok(())
            }
        }
    }
}

//! Presence cycler.
//!
//! One process-wide scheduling chain: sleep a freshly randomized interval,
//! walk every registered session, push the offline presence, reschedule.
//! A fixed-period timer would show a detectable pattern on the network, so
//! each pass picks its own delay.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::activity::ActivityLog;
use crate::error::TransportError;
use crate::session::SessionRegistry;
use crate::settings::{AccountDirectory, AccountId};

use super::react_to_account_error;

/// Jittered offline-presence loop over all registered sessions.
pub struct PresenceCycler {
    registry: SessionRegistry,
    directory: Arc<dyn AccountDirectory>,
    activity: Arc<dyn ActivityLog>,
    jitter: (Duration, Duration),
}

impl PresenceCycler {
    pub fn new(
        registry: SessionRegistry,
        directory: Arc<dyn AccountDirectory>,
        activity: Arc<dyn ActivityLog>,
        jitter: (Duration, Duration),
    ) -> Self {
        Self {
            registry,
            directory,
            activity,
            jitter,
        }
    }

    /// Run the scheduling chain until the shutdown signal flips.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let delay = next_delay(self.jitter);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => self.cycle_once().await,
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Presence cycler stopped");
        })
    }

    /// One full walk over the registry.
    pub async fn cycle_once(&self) {
        for account in self.registry.accounts() {
            if let Err(e) = self.maintain_account(account).await {
                react_to_account_error(
                    &self.registry,
                    self.directory.as_ref(),
                    self.activity.as_ref(),
                    account,
                    "presence cycle",
                    &e,
                )
                .await;
            }
        }
    }

    async fn maintain_account(&self, account: AccountId) -> Result<(), TransportError> {
        let Some(conn) = self.registry.connection(account) else {
            return Ok(());
        };

        if !conn.is_connected() {
            debug!(account = %account, "Found disconnected during presence walk, reconnecting");
            self.registry.reconnect(account).await?;
            return Ok(());
        }

        self.registry
            .policy()
            .maintain(account, conn.as_ref(), self.registry.events())
            .await
    }
}

/// Fresh uniform pick from the jitter bounds.
fn next_delay((min, max): (Duration, Duration)) -> Duration {
    let span = max.saturating_sub(min).as_millis() as u64;
    let extra = {
        let mut rng = rand::thread_rng();
        rng.gen_range(0..=span)
    };
    min + Duration::from_millis(extra)
}

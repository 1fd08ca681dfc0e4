//! Service wiring and lifecycle.
//!
//! All shared state lives in this explicitly constructed object: the
//! session registry, the dispatch gates, and the background loops. Nothing
//! is ambient; everything is passed by reference or cheap clone.

use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;
use crate::config::AutoReplyConfig;
use crate::dispatch::{CooldownStore, InFlightGuard, ReplyDispatcher};
use crate::error::ServiceError;
use crate::session::{SessionRegistry, policy_for};
use crate::settings::{AccountDirectory, AccountId, SettingsProvider};
use crate::supervisor::{HealthMonitor, PresenceCycler, react_to_account_error};
use crate::transport::{ChatTransport, InboundEvent};

/// Concurrent connection attempts during startup.
const CONNECT_CONCURRENCY: usize = 8;

/// External collaborators the service consumes.
pub struct ServiceDeps {
    pub transport: Arc<dyn ChatTransport>,
    pub settings: Arc<dyn SettingsProvider>,
    pub directory: Arc<dyn AccountDirectory>,
    pub activity: Arc<dyn ActivityLog>,
}

/// The supervisor and dispatch engine as one owned object.
pub struct AutoReplyService {
    config: AutoReplyConfig,
    registry: SessionRegistry,
    dispatcher: ReplyDispatcher,
    cooldowns: CooldownStore,
    in_flight: InFlightGuard,
    settings: Arc<dyn SettingsProvider>,
    directory: Arc<dyn AccountDirectory>,
    activity: Arc<dyn ActivityLog>,
    // std Mutex: locks below are never held across an await.
    events_rx: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl AutoReplyService {
    /// Wire the service. No connection is made until [`start`].
    ///
    /// [`start`]: AutoReplyService::start
    pub fn new(config: AutoReplyConfig, deps: ServiceDeps) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_depth);
        let policy = policy_for(config.lifecycle);
        let registry = SessionRegistry::new(deps.transport, policy, events_tx);

        let cooldowns = CooldownStore::new(config.cooldown_window());
        let in_flight = InFlightGuard::new(config.in_flight_ttl());
        let dispatcher = ReplyDispatcher::new(
            registry.clone(),
            cooldowns.clone(),
            in_flight.clone(),
            deps.settings.clone(),
            deps.directory.clone(),
            deps.activity.clone(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            registry,
            dispatcher,
            cooldowns,
            in_flight,
            settings: deps.settings,
            directory: deps.directory,
            activity: deps.activity,
            events_rx: Mutex::new(Some(events_rx)),
            tasks: Mutex::new(Vec::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// The session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The reply dispatcher.
    pub fn dispatcher(&self) -> &ReplyDispatcher {
        &self.dispatcher
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Connect every enabled account and start the background loops.
    ///
    /// The health monitor's first pass runs immediately, so accounts linked
    /// while the service was down are picked up without waiting an
    /// interval.
    pub async fn start(&self) -> Result<(), ServiceError> {
        let Some(mut events_rx) = self.events_rx.lock().expect("mutex poisoned").take() else {
            return Err(ServiceError::AlreadyStarted);
        };

        self.connect_enabled_accounts().await;

        // One task per inbound event; the pump itself never blocks on a
        // dispatch.
        let dispatcher = self.dispatcher.clone();
        let mut pump_shutdown = self.shutdown_rx.clone();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_event = events_rx.recv() => match maybe_event {
                        Some(event) => {
                            let dispatcher = dispatcher.clone();
                            tokio::spawn(async move {
                                dispatcher.handle_event(event).await;
                            });
                        }
                        None => break,
                    },
                    _ = pump_shutdown.changed() => break,
                }
            }
            debug!("Event pump stopped");
        });

        let presence = PresenceCycler::new(
            self.registry.clone(),
            self.directory.clone(),
            self.activity.clone(),
            self.config.presence_jitter(),
        )
        .spawn(self.shutdown_rx.clone());

        let health = HealthMonitor::new(
            self.registry.clone(),
            self.directory.clone(),
            self.activity.clone(),
            self.config.health_interval(),
        )
        .spawn(self.shutdown_rx.clone());

        let sweep_interval = self.config.sweep_interval();
        let cooldown_sweep = self
            .cooldowns
            .spawn_sweep_task(sweep_interval, self.shutdown_rx.clone());
        let in_flight_sweep = self
            .in_flight
            .spawn_sweep_task(sweep_interval, self.shutdown_rx.clone());

        {
            let mut tasks = self.tasks.lock().expect("mutex poisoned");
            tasks.extend([pump, presence, health, cooldown_sweep, in_flight_sweep]);
        }

        info!(sessions = self.registry.len(), "Auto-reply service started");
        Ok(())
    }

    /// Stop the loops, then tear down every session.
    ///
    /// Dispatches already past their guard acquisition finish on their own
    /// tasks; only the loops and the pump are stopped here.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(true).is_err() {
            warn!("Shutdown signal had no receivers");
        }

        let tasks: Vec<_> =
            std::mem::take(&mut *self.tasks.lock().expect("mutex poisoned"));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task panicked during shutdown");
            }
        }

        self.registry.shutdown().await;
        info!("Auto-reply service stopped");
    }

    /// React to a settings change for one account: connect it when
    /// auto-reply became enabled, tear it down when disabled.
    pub async fn refresh_account(&self, account: AccountId) {
        let enabled = self
            .settings
            .account_settings(account)
            .await
            .map(|s| s.any_enabled())
            .unwrap_or(false);

        if !enabled {
            self.registry.disconnect(account).await;
            return;
        }

        if let Err(e) = self.registry.connect(account).await {
            react_to_account_error(
                &self.registry,
                self.directory.as_ref(),
                self.activity.as_ref(),
                account,
                "settings refresh",
                &e,
            )
            .await;
        }
    }

    // ------------------------------------------------------------------------
    // Private helpers
    // ------------------------------------------------------------------------

    /// Connect every account the directory reports, re-checking settings
    /// first since directory listings can lag behind disables.
    async fn connect_enabled_accounts(&self) {
        let accounts = self.directory.accounts_with_auto_reply().await;
        if accounts.is_empty() {
            debug!("No accounts with auto-reply enabled");
            return;
        }

        stream::iter(accounts)
            .for_each_concurrent(CONNECT_CONCURRENCY, |account| async move {
                let enabled = self
                    .settings
                    .account_settings(account)
                    .await
                    .map(|s| s.any_enabled())
                    .unwrap_or(false);
                if !enabled {
                    debug!(account = %account, "Auto-reply disabled, not connecting");
                    return;
                }

                if let Err(e) = self.registry.connect(account).await {
                    react_to_account_error(
                        &self.registry,
                        self.directory.as_ref(),
                        self.activity.as_ref(),
                        account,
                        "startup connect",
                        &e,
                    )
                    .await;
                }
            })
            .await;
    }
}

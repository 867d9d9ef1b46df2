//! Wiring of the daemon's tasks and their shutdown order.
//!
//! ```text
//!   cancel ──▶ server returns (listener and links dropped)
//!          ──▶ heartbeat monitor joined
//!          ──▶ registry shutdown (links closed, no reminder)
//!          ──▶ notification worker drained
//! ```

use std::sync::Arc;

use doorwatch_core::{LockSensor, LockState, Notifier, SharedLockState};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use crate::heartbeat::spawn_heartbeat_monitor;
use crate::lock::spawn_lock_poller;
use crate::notify::{spawn_notification_worker, CommandNotifier, DeliveryStats, LogNotifier};
use crate::registry::{spawn_registry, RegistryHandle};
use crate::server::{DeviceServer, ServerError, ServerStats};
use crate::transport::Transport;

/// What each part of the daemon did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonReport {
    pub server: ServerStats,
    /// Devices removed by heartbeat sweeps.
    pub evicted: usize,
    /// Devices still registered at shutdown.
    pub released: usize,
    pub deliveries: DeliveryStats,
}

/// The assembled daemon, ready to run against a transport.
pub struct Daemon {
    config: DaemonConfig,
    cancel_token: CancellationToken,
}

impl Daemon {
    pub fn new(config: DaemonConfig, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            cancel_token,
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Runs with the lock sensor and notifier described by the config.
    ///
    /// # Errors
    ///
    /// Propagates fatal server errors after the remaining tasks were stopped.
    pub async fn run<T: Transport>(self, transport: T) -> Result<DaemonReport, ServerError> {
        let (lock_sensor, poller) = self.start_lock_sensor();
        let notifier = build_notifier(&self.config);

        let result = self.run_with(transport, lock_sensor, notifier).await;

        if let Some(poller) = poller {
            if let Err(e) = poller.await {
                warn!(error = %e, "Lock sensor poller panicked");
            }
        }
        result
    }

    /// Runs with explicit collaborators until `cancel_token` fires (or the
    /// server fails) and every task has stopped.
    ///
    /// # Errors
    ///
    /// Propagates fatal server errors after the remaining tasks were stopped.
    pub async fn run_with<T: Transport>(
        self,
        transport: T,
        lock_sensor: Arc<dyn LockSensor>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<DaemonReport, ServerError> {
        self.spawn_with(transport, lock_sensor, notifier).wait().await
    }

    /// Starts every task and returns immediately.
    pub fn spawn_with<T: Transport>(
        self,
        transport: T,
        lock_sensor: Arc<dyn LockSensor>,
        notifier: Arc<dyn Notifier>,
    ) -> RunningDaemon {
        let (dispatcher, worker) = spawn_notification_worker(notifier);
        let registry = spawn_registry(self.config.max_devices, lock_sensor, dispatcher);
        let heartbeat = spawn_heartbeat_monitor(
            registry.clone(),
            self.config.heartbeat(),
            self.cancel_token.clone(),
        );
        let server = DeviceServer::new(
            transport,
            registry.clone(),
            self.config.frame_processor(),
            self.config.poll_timeout(),
            self.cancel_token.clone(),
        );

        let task = tokio::spawn(supervise(
            server,
            heartbeat,
            registry.clone(),
            worker,
            self.cancel_token.clone(),
        ));

        RunningDaemon {
            registry,
            cancel_token: self.cancel_token,
            task,
        }
    }

    /// Starts the lock poller if a sensor file is configured.
    fn start_lock_sensor(&self) -> (Arc<dyn LockSensor>, Option<JoinHandle<()>>) {
        let state = SharedLockState::new(LockState::Unknown);
        let poller = match &self.config.lock_sensor.value_path {
            Some(path) => Some(spawn_lock_poller(
                path.clone(),
                self.config.lock_poll_interval(),
                state.clone(),
                self.cancel_token.clone(),
            )),
            None => {
                warn!("No lock sensor configured, reminders stay suppressed");
                None
            }
        };
        (Arc::new(state), poller)
    }
}

/// A daemon whose tasks are running.
pub struct RunningDaemon {
    registry: RegistryHandle,
    cancel_token: CancellationToken,
    task: JoinHandle<Result<DaemonReport, ServerError>>,
}

impl RunningDaemon {
    /// Handle to the live registry.
    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Requests shutdown and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Propagates fatal server errors.
    pub async fn stop(self) -> Result<DaemonReport, ServerError> {
        self.cancel_token.cancel();
        self.wait().await
    }

    /// Waits until the daemon stops on its own.
    ///
    /// # Errors
    ///
    /// Propagates fatal server errors.
    pub async fn wait(self) -> Result<DaemonReport, ServerError> {
        drop(self.registry);
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ServerError::Multiplex(format!("daemon task failed: {e}"))),
        }
    }
}

/// Runs the server, then tears everything down in order.
async fn supervise<T: Transport>(
    server: DeviceServer<T>,
    heartbeat: JoinHandle<usize>,
    registry: RegistryHandle,
    worker: JoinHandle<DeliveryStats>,
    cancel_token: CancellationToken,
) -> Result<DaemonReport, ServerError> {
    let served = server.run().await;

    if let Err(e) = &served {
        error!(error = %e, "Device server failed, stopping daemon");
    }
    // A failed server must still bring the other tasks down.
    cancel_token.cancel();

    let evicted = match heartbeat.await {
        Ok(evicted) => evicted,
        Err(e) => {
            warn!(error = %e, "Heartbeat monitor panicked");
            0
        }
    };

    let released = match registry.shutdown().await {
        Ok(released) => released,
        Err(e) => {
            warn!(error = %e, "Registry already stopped");
            0
        }
    };
    drop(registry);

    let deliveries = match worker.await {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %e, "Notification worker panicked");
            DeliveryStats::default()
        }
    };

    let report = DaemonReport {
        server: served?,
        evicted,
        released,
        deliveries,
    };
    info!(
        released = report.released,
        evicted = report.evicted,
        reminders = report.deliveries.delivered,
        "Daemon stopped"
    );
    Ok(report)
}

/// Picks the notifier described by the config.
pub fn build_notifier(config: &DaemonConfig) -> Arc<dyn Notifier> {
    match &config.notifier.command {
        Some(command) => {
            let notifier = CommandNotifier::new(command.clone(), config.notifier.args.clone());
            info!(command = %notifier.program(), "Reminders delivered by command");
            Arc::new(notifier)
        }
        None => Arc::new(LogNotifier),
    }
}

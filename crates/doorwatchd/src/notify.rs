//! Reminder delivery: the dispatcher queue, its worker, and the notifiers.
//!
//! The registry actor must never wait on the network, so a trigger decision
//! only enqueues the token. A single worker task drains the queue and runs the
//! blocking [`Notifier`] on the blocking pool. Outcomes are logged and never
//! retried.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A full or closed queue drops the reminder with a warning
//! - A panicking notifier is reported as a failed delivery

use std::process::{Command, Stdio};
use std::sync::Arc;

use doorwatch_core::{DeliveryToken, Notifier, NotifyError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pending reminders the worker may lag behind by.
const DISPATCH_QUEUE: usize = 16;

// ============================================================================
// Dispatcher
// ============================================================================

/// Sending side of the reminder queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<DeliveryToken>,
}

impl NotificationDispatcher {
    /// Queues one reminder without waiting.
    ///
    /// Returns `false` if the reminder was dropped.
    pub fn dispatch(&self, token: DeliveryToken) -> bool {
        match self.sender.try_send(token) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(token)) => {
                warn!(token = %token.preview(), "Notification queue full, dropping reminder");
                false
            }
            Err(mpsc::error::TrySendError::Closed(token)) => {
                warn!(token = %token.preview(), "Notification worker stopped, dropping reminder");
                false
            }
        }
    }

    /// Builds a dispatcher around an existing channel.
    ///
    /// Useful when the caller wants to observe tokens directly.
    pub fn from_sender(sender: mpsc::Sender<DeliveryToken>) -> Self {
        Self { sender }
    }
}

/// Delivery counters reported when the worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Spawns the notification worker.
///
/// The worker exits once every [`NotificationDispatcher`] clone is dropped
/// and the queue is drained.
pub fn spawn_notification_worker(
    notifier: Arc<dyn Notifier>,
) -> (NotificationDispatcher, JoinHandle<DeliveryStats>) {
    let (sender, receiver) = mpsc::channel(DISPATCH_QUEUE);
    let worker = tokio::spawn(run_worker(notifier, receiver));
    (NotificationDispatcher { sender }, worker)
}

async fn run_worker(
    notifier: Arc<dyn Notifier>,
    mut receiver: mpsc::Receiver<DeliveryToken>,
) -> DeliveryStats {
    debug!("Notification worker starting");
    let mut stats = DeliveryStats::default();

    while let Some(token) = receiver.recv().await {
        let preview = token.preview();
        let notifier = Arc::clone(&notifier);

        match tokio::task::spawn_blocking(move || notifier.notify(&token)).await {
            Ok(Ok(())) => {
                stats.delivered += 1;
                info!(token = %preview, "Door close reminder delivered");
            }
            Ok(Err(e)) => {
                stats.failed += 1;
                error!(token = %preview, error = %e, "Door close reminder failed");
            }
            Err(e) => {
                stats.failed += 1;
                error!(token = %preview, error = %e, "Notifier task aborted");
            }
        }
    }

    debug!(
        delivered = stats.delivered,
        failed = stats.failed,
        "Notification worker stopped"
    );
    stats
}

// ============================================================================
// Notifiers
// ============================================================================

/// Runs an external program per reminder, passing the token as the last
/// argument.
///
/// Whatever signs and sends the push request lives in that program. A
/// non-zero exit status counts as a rejected notification.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, token: &DeliveryToken) -> Result<(), NotifyError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(token.as_str())
            .stdin(Stdio::null())
            .output()
            .map_err(|e| NotifyError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let detail = if stderr.is_empty() {
            format!("{} exited with {}", self.program, output.status)
        } else {
            format!("{} exited with {}: {}", self.program, output.status, stderr)
        };
        Err(NotifyError::Rejected(detail))
    }
}

/// Logs the reminder instead of sending it.
///
/// Used when no delivery command is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, token: &DeliveryToken) -> Result<(), NotifyError> {
        warn!(
            token = %token.preview(),
            "No notifier configured; reminder would have been sent"
        );
        Ok(())
    }
}

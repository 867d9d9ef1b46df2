//! One-shot door-close reminder trigger.
//!
//! ```text
//!             first device registered
//!   Watching ─────────────────────────▶ Armed
//!      ▲                                  │
//!      └──────────────────────────────────┘
//!        last device removed: evaluate once
//! ```
//!
//! The trigger is pure state. It reads the lock sensor only when a token is
//! available and returns its decision; delivery is somebody else's job.

use doorwatch_core::{DeliveryToken, LockSensor, LockState};

/// Where the trigger is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerState {
    /// At least one device has been seen since the last evaluation.
    Armed,
    /// Waiting for a device to show up.
    #[default]
    Watching,
}

impl std::fmt::Display for TriggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Armed => write!(f, "armed"),
            Self::Watching => write!(f, "watching"),
        }
    }
}

/// Why a vacated registry did not produce a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// No departing device ever reported a token.
    NoToken,
    Locked,
    /// The sensor has no reading; a reminder could be wrong either way.
    LockUnknown,
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoToken => write!(f, "no delivery token"),
            Self::Locked => write!(f, "door is locked"),
            Self::LockUnknown => write!(f, "lock state unknown"),
        }
    }
}

/// Result of evaluating the notification condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Notify(DeliveryToken),
    Suppressed(SuppressReason),
}

impl TriggerOutcome {
    pub fn notified(&self) -> bool {
        matches!(self, Self::Notify(_))
    }
}

/// Armed/Watching state machine.
#[derive(Debug, Default)]
pub struct NotificationTrigger {
    state: TriggerState,
}

impl NotificationTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Records a successful registration.
    ///
    /// Returns `true` if this armed the trigger.
    pub fn on_occupied(&mut self) -> bool {
        let armed = self.state == TriggerState::Watching;
        self.state = TriggerState::Armed;
        armed
    }

    /// Records that the registry just became empty.
    ///
    /// Returns `None` when the trigger was not armed, so a cycle is evaluated
    /// at most once no matter how often this is called.
    pub fn on_vacated(
        &mut self,
        last_token: Option<&DeliveryToken>,
        sensor: &dyn LockSensor,
    ) -> Option<TriggerOutcome> {
        if self.state != TriggerState::Armed {
            return None;
        }
        self.state = TriggerState::Watching;

        let Some(token) = last_token.filter(|t| !t.is_empty()) else {
            return Some(TriggerOutcome::Suppressed(SuppressReason::NoToken));
        };

        let outcome = match sensor.read_lock_state() {
            LockState::Unlocked => TriggerOutcome::Notify(token.clone()),
            LockState::Locked => TriggerOutcome::Suppressed(SuppressReason::Locked),
            LockState::Unknown => TriggerOutcome::Suppressed(SuppressReason::LockUnknown),
        };
        Some(outcome)
    }
}

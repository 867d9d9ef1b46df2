//! Integration tests for the Registry Actor.
//!
//! These tests verify the registry works correctly as a complete system,
//! testing the spawn_registry() function and RegistryHandle interface.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

use std::sync::Arc;
use std::time::Duration;

use doorwatch_core::{DeliveryToken, DeviceAddress, LinkId, LockState, SharedLockState};
use doorwatchd::heartbeat::{spawn_heartbeat_monitor, HeartbeatSettings};
use doorwatchd::notify::NotificationDispatcher;
use doorwatchd::registry::{
    spawn_registry, Admission, DeviceEvent, LinkHandle, RegistryError, RegistryHandle,
    RemovalReason,
};
use doorwatchd::trigger::{SuppressReason, TriggerOutcome, TriggerState};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

/// Registry with a controllable lock and an observable reminder queue.
struct TestRegistry {
    handle: RegistryHandle,
    lock: SharedLockState,
    reminders: mpsc::Receiver<DeliveryToken>,
    next_link: u64,
}

impl TestRegistry {
    fn spawn(max_devices: usize) -> Self {
        let lock = SharedLockState::new(LockState::Unlocked);
        let (tx, reminders) = mpsc::channel(16);
        let handle = spawn_registry(
            max_devices,
            Arc::new(lock.clone()),
            NotificationDispatcher::from_sender(tx),
        );
        Self {
            handle,
            lock,
            reminders,
            next_link: 0,
        }
    }

    fn link(&mut self) -> LinkHandle {
        self.next_link += 1;
        LinkHandle::new(LinkId::new(self.next_link))
    }

    async fn admit(&mut self, addr: &str) -> (LinkHandle, Result<Admission, RegistryError>) {
        let link = self.link();
        let result = self.handle.admit(address(addr), link.clone()).await;
        (link, result)
    }

    async fn admit_with_token(&mut self, addr: &str, token: &str) -> LinkHandle {
        let (link, result) = self.admit(addr).await;
        result.expect("admission should succeed");
        self.handle
            .apply_frame(link.id(), Some(DeliveryToken::new(token)))
            .await
            .expect("frame should apply");
        link
    }

    /// Drains reminders that were queued so far.
    fn sent(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.reminders.try_recv().ok())
            .map(|t| t.as_str().to_string())
            .collect()
    }
}

fn address(s: &str) -> DeviceAddress {
    DeviceAddress::parse(s).unwrap()
}

fn long_token(tag: char) -> String {
    tag.to_string().repeat(150)
}

const A: &str = "AA:AA:AA:AA:AA:01";
const B: &str = "AA:AA:AA:AA:AA:02";
const C: &str = "AA:AA:AA:AA:AA:03";

// ============================================================================
// Basic Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_basic_lifecycle() {
    let mut reg = TestRegistry::spawn(10);

    let (link, result) = reg.admit(A).await;
    let admission = result.expect("registration should succeed");
    assert!(!admission.is_reconnect());

    let view = reg.handle.lookup(address(A)).await.expect("device should be found");
    assert_eq!(view.address, address(A));
    assert_eq!(view.link, link.id());
    assert!(!view.has_token());
    assert_eq!(view.frames_received, 0);

    let by_link = reg.handle.lookup_by_link(link.id()).await.unwrap();
    assert_eq!(by_link.address, address(A));

    let removed = reg.handle.remove(address(A), RemovalReason::Explicit).await.unwrap();
    assert!(removed.is_some());
    assert!(link.is_closed());
    assert!(reg.handle.lookup(address(A)).await.is_none());
    assert!(reg.handle.is_connected());
}

#[tokio::test]
async fn test_lookup_is_case_insensitive_through_canonical_address() {
    let mut reg = TestRegistry::spawn(10);
    reg.admit("aa-aa-aa-aa-aa-01").await.1.unwrap();

    assert!(reg.handle.lookup(address(A)).await.is_some());
}

#[tokio::test]
async fn test_register_and_reconnect_operations() {
    let mut reg = TestRegistry::spawn(10);

    let first = reg.link();
    reg.handle.register(address(A), first.clone()).await.unwrap();

    let dup = reg.link();
    let err = reg.handle.register(address(A), dup).await.unwrap_err();
    assert_eq!(err, RegistryError::AlreadyRegistered(address(A)));

    let second = reg.link();
    let view = reg.handle.reconnect(address(A), second.clone()).await.unwrap();
    assert_eq!(view.link, second.id());
    assert!(first.is_closed());

    let stray = reg.link();
    let err = reg.handle.reconnect(address(B), stray).await.unwrap_err();
    assert_eq!(err, RegistryError::DeviceNotFound(address(B)));
}

// ============================================================================
// Capacity Tests
// ============================================================================

#[tokio::test]
async fn test_capacity_two_scenario() {
    let mut reg = TestRegistry::spawn(2);

    assert!(reg.admit(A).await.1.is_ok());
    assert!(reg.admit(B).await.1.is_ok());
    assert!(!reg.handle.has_capacity().await);

    let (_, result) = reg.admit(C).await;
    assert_eq!(result.unwrap_err(), RegistryError::RegistryFull { max: 2 });
    assert_eq!(reg.handle.device_count().await, 2);

    reg.handle.remove(address(A), RemovalReason::Explicit).await.unwrap();
    assert!(reg.handle.has_capacity().await);

    assert!(reg.admit(C).await.1.is_ok());
    assert_eq!(reg.handle.device_count().await, 2);
}

#[tokio::test]
async fn test_reconnect_at_capacity_succeeds() {
    let mut reg = TestRegistry::spawn(1);
    reg.admit(A).await.1.unwrap();

    let (_, result) = reg.admit(A).await;
    assert!(result.unwrap().is_reconnect());
    assert_eq!(reg.handle.device_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_admissions_never_exceed_capacity() {
    let reg = TestRegistry::spawn(10);

    let mut tasks = Vec::new();
    for i in 0..50u8 {
        let handle = reg.handle.clone();
        tasks.push(tokio::spawn(async move {
            let addr = DeviceAddress::from_octets([0xAA, 0, 0, 0, 0, i]);
            let link = LinkHandle::new(LinkId::new(u64::from(i) + 1));
            handle.admit(addr, link).await
        }));
    }

    let mut admitted = 0;
    let mut full = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(RegistryError::RegistryFull { max: 10 }) => full += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(admitted, 10);
    assert_eq!(full, 40);
    assert_eq!(reg.handle.device_count().await, 10);
}

// ============================================================================
// Token and Reconnection Tests
// ============================================================================

#[tokio::test]
async fn test_reconnect_preserves_token() {
    let mut reg = TestRegistry::spawn(10);
    let old = reg.admit_with_token(A, &long_token('a')).await;

    let (new, result) = reg.admit(A).await;
    let view = result.unwrap().view().clone();

    assert!(old.is_closed());
    assert!(!new.is_closed());
    assert!(view.has_token());
    assert_eq!(view.reconnects, 1);
}

#[tokio::test]
async fn test_frames_on_replaced_link_are_rejected() {
    let mut reg = TestRegistry::spawn(10);
    let (old, _) = reg.admit(A).await;
    reg.admit(A).await.1.unwrap();

    let err = reg.handle.apply_frame(old.id(), None).await.unwrap_err();
    assert_eq!(err, RegistryError::LinkNotFound(old.id()));
}

#[tokio::test]
async fn test_remove_absent_is_noop() {
    let reg = TestRegistry::spawn(10);
    let result = reg.handle.remove(address(A), RemovalReason::Explicit).await;
    assert_eq!(result, Ok(None));

    let result = reg
        .handle
        .remove_by_link(LinkId::new(99), RemovalReason::Disconnected)
        .await;
    assert_eq!(result, Ok(None));
}

// ============================================================================
// Heartbeat Sweep Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sweep_removes_exactly_the_stale_devices() {
    let mut reg = TestRegistry::spawn(10);
    reg.lock.set(LockState::Locked);

    let a = reg.admit_with_token(A, &long_token('a')).await;
    tokio::time::advance(Duration::from_secs(30)).await;
    let (b, _) = reg.admit(B).await;
    tokio::time::advance(Duration::from_secs(31)).await;

    assert_eq!(reg.handle.sweep(Duration::from_secs(60)).await.unwrap(), 1);
    assert!(a.is_closed());
    assert!(!b.is_closed());
    assert!(reg.handle.lookup(address(B)).await.is_some());
    assert!(reg.handle.last_vacated_token().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_sweep_of_last_device_triggers_reminder() {
    let mut reg = TestRegistry::spawn(10);
    reg.admit_with_token(A, &long_token('a')).await;

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(reg.handle.sweep(Duration::from_secs(60)).await.unwrap(), 1);

    assert_eq!(reg.sent(), vec![long_token('a')]);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_monitor_evicts_silent_device() {
    let mut reg = TestRegistry::spawn(10);
    let cancel = CancellationToken::new();
    let monitor = spawn_heartbeat_monitor(
        reg.handle.clone(),
        HeartbeatSettings::default(),
        cancel.clone(),
    );

    let silent = reg.admit_with_token(A, &long_token('a')).await;
    let (chatty, _) = reg.admit(B).await;

    // B keeps talking every 20s, A never does
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(20)).await;
        reg.handle.apply_frame(chatty.id(), None).await.unwrap();
    }

    assert!(silent.is_closed());
    assert!(!chatty.is_closed());
    assert_eq!(reg.handle.device_count().await, 1);

    cancel.cancel();
    assert_eq!(monitor.await.unwrap(), 1);
}

// ============================================================================
// Notification Trigger Tests
// ============================================================================

#[tokio::test]
async fn test_single_device_leaves_unlocked_notifies_once() {
    let mut reg = TestRegistry::spawn(10);
    reg.admit_with_token(A, &long_token('a')).await;
    assert_eq!(reg.handle.trigger_state().await, Some(TriggerState::Armed));

    reg.handle.remove(address(A), RemovalReason::Disconnected).await.unwrap();
    reg.handle.remove(address(A), RemovalReason::Disconnected).await.unwrap();

    assert_eq!(reg.sent(), vec![long_token('a')]);
    assert_eq!(reg.handle.trigger_state().await, Some(TriggerState::Watching));
}

#[tokio::test]
async fn test_single_device_leaves_locked_does_not_notify() {
    let mut reg = TestRegistry::spawn(10);
    reg.lock.set(LockState::Locked);
    reg.admit_with_token(A, &long_token('a')).await;

    reg.handle.remove(address(A), RemovalReason::Disconnected).await.unwrap();

    assert!(reg.sent().is_empty());
    assert_eq!(reg.handle.trigger_state().await, Some(TriggerState::Watching));
}

#[tokio::test]
async fn test_each_presence_cycle_notifies() {
    let mut reg = TestRegistry::spawn(10);

    reg.admit_with_token(A, &long_token('a')).await;
    reg.handle.remove(address(A), RemovalReason::Disconnected).await.unwrap();

    // Comes back without sending a token; the saved one is reused
    reg.admit(A).await.1.unwrap();
    reg.handle.remove(address(A), RemovalReason::Disconnected).await.unwrap();

    assert_eq!(reg.sent(), vec![long_token('a'), long_token('a')]);
}

#[tokio::test]
async fn test_no_reminder_while_devices_remain() {
    let mut reg = TestRegistry::spawn(10);
    reg.admit_with_token(A, &long_token('a')).await;
    reg.admit_with_token(B, &long_token('b')).await;

    reg.handle.remove(address(A), RemovalReason::Disconnected).await.unwrap();
    assert!(reg.sent().is_empty());

    reg.handle.remove(address(B), RemovalReason::Disconnected).await.unwrap();
    assert_eq!(reg.sent(), vec![long_token('b')]);
}

#[tokio::test]
async fn test_vacated_event_reports_outcome() {
    let mut reg = TestRegistry::spawn(10);
    reg.lock.set(LockState::Unknown);
    let mut events = reg.handle.subscribe();

    reg.admit_with_token(A, &long_token('a')).await;
    reg.handle.remove(address(A), RemovalReason::Explicit).await.unwrap();

    let outcome = timeout(Duration::from_secs(1), async {
        loop {
            if let DeviceEvent::Vacated { outcome } = events.recv().await.unwrap() {
                return outcome;
            }
        }
    })
    .await
    .expect("vacated event");

    assert_eq!(outcome, TriggerOutcome::Suppressed(SuppressReason::LockUnknown));
}

#[tokio::test]
async fn test_events_follow_lifecycle() {
    let mut reg = TestRegistry::spawn(10);
    let mut events = reg.handle.subscribe();

    reg.admit_with_token(A, &long_token('a')).await;
    reg.admit(A).await.1.unwrap();
    reg.handle.remove(address(A), RemovalReason::Explicit).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(match event {
            DeviceEvent::Registered { .. } => "registered",
            DeviceEvent::Reconnected { .. } => "reconnected",
            DeviceEvent::TokenUpdated { .. } => "token",
            DeviceEvent::Removed { .. } => "removed",
            DeviceEvent::Vacated { .. } => "vacated",
        });
    }
    assert_eq!(kinds, vec!["registered", "token", "reconnected", "removed", "vacated"]);
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_shutdown_releases_links_without_reminder() {
    let mut reg = TestRegistry::spawn(10);
    let a = reg.admit_with_token(A, &long_token('a')).await;
    let (b, _) = reg.admit(B).await;

    assert_eq!(reg.handle.shutdown().await.unwrap(), 2);
    assert!(a.is_closed());
    assert!(b.is_closed());

    // Actor stopped and dropped its dispatcher
    assert!(reg.reminders.recv().await.is_none());

    let (_, result) = reg.admit(C).await;
    assert_eq!(result.unwrap_err(), RegistryError::ChannelClosed);
}

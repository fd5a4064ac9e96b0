//! Reconciliation manager integration tests.
//!
//! Exercises the desired/pending/confirmed state machine end to end
//! against a mock monitoring service: durable intent while disconnected,
//! synchronous expiry rejection, convergence on reconnect, expired-synced
//! cleanup and failure semantics.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use geofence_core::{GeofenceDescriptor, TransitionMask, FALLBACK_HANDLER};
use geofence_monitor::{
    GeofenceEvent, GeofenceEventHandler, HandlerRegistry, MonitorError, MonitorItem,
    MonitorResult, MonitorStatus, MonitoringService,
};
use geofence_sync::{
    GeofenceManager, GeofenceStore, JsonFileStore, KeyValueStore, MemoryStore, SyncListener,
    SYNCED_BUCKET,
};

// =============================================================================
// Mock monitoring service
// =============================================================================

#[derive(Default)]
struct MockMonitor {
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_adds: AtomicBool,
    fail_removes: AtomicBool,
    /// While set, add calls park until it is cleared.
    hold_adds: AtomicBool,
    connect_calls: AtomicUsize,
    /// Recorded `(target, items)` per accepted add call.
    adds: Mutex<Vec<(String, Vec<MonitorItem>)>>,
    /// Recorded id batches per accepted remove call.
    removes: Mutex<Vec<Vec<String>>>,
}

impl MockMonitor {
    fn disconnected_and_unreachable() -> Self {
        let mock = Self::default();
        mock.fail_connect.store(true, Ordering::SeqCst);
        mock
    }

    fn connected() -> Self {
        let mock = Self::default();
        mock.connected.store(true, Ordering::SeqCst);
        mock
    }

    fn go_online(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn added_ids(&self) -> Vec<String> {
        self.adds
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, items)| items.iter().map(|i| i.id.clone()))
            .collect()
    }

    fn removed_ids(&self) -> Vec<String> {
        self.removes.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl MonitoringService for MockMonitor {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> MonitorResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(MonitorError::ConnectionFailed {
                message: "no transport".to_string(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn add_items(&self, items: Vec<MonitorItem>, target: &str) -> MonitorResult<()> {
        if !self.is_connected() {
            return Err(MonitorError::NotConnected);
        }
        while self.hold_adds.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(MonitorError::Rejected {
                code: 1000,
                message: "too many geofences".to_string(),
            });
        }
        self.adds.lock().unwrap().push((target.to_string(), items));
        Ok(())
    }

    async fn remove_items(&self, ids: Vec<String>) -> MonitorResult<()> {
        if !self.is_connected() {
            return Err(MonitorError::NotConnected);
        }
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(MonitorError::Rejected {
                code: 1001,
                message: "removal refused".to_string(),
            });
        }
        self.removes.lock().unwrap().push(ids);
        Ok(())
    }
}

// =============================================================================
// Recording listener
// =============================================================================

#[derive(Default)]
struct RecordingListener {
    adds: Mutex<Vec<(String, MonitorStatus)>>,
    removes: Mutex<Vec<(String, MonitorStatus)>>,
}

impl SyncListener for RecordingListener {
    fn add_status(&self, descriptor: &GeofenceDescriptor, status: &MonitorStatus) {
        self.adds
            .lock()
            .unwrap()
            .push((descriptor.id().to_string(), status.clone()));
    }

    fn remove_status(&self, id: &str, status: &MonitorStatus) {
        self.removes
            .lock()
            .unwrap()
            .push((id.to_string(), status.clone()));
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn manager_over(
    kv: Arc<dyn KeyValueStore>,
    mock: Arc<MockMonitor>,
) -> (GeofenceManager, Arc<RecordingListener>) {
    init_tracing();
    let registry = Arc::new(HandlerRegistry::new());
    let manager = GeofenceManager::new(kv, mock, registry);
    let listener = Arc::new(RecordingListener::default());
    manager.set_listener(listener.clone());
    (manager, listener)
}

fn fence(id: &str) -> GeofenceDescriptor {
    GeofenceDescriptor::builder(id, 2.09, 0.91)
        .radius_m(200.0)
        .transitions(TransitionMask::ENTER | TransitionMask::EXIT)
        .build()
        .unwrap()
}

fn expired_fence(id: &str) -> GeofenceDescriptor {
    let past = chrono::Utc::now().timestamp_millis() - 10_000;
    GeofenceDescriptor::builder(id, 2.09, 0.91)
        .expiration_duration_ms(5_000)
        .build_at(past)
        .unwrap()
}

/// Spawned dispatch tasks resolve asynchronously; poll for their effects.
async fn wait_for(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn add_while_disconnected_is_durable_then_converges_on_connect() {
    let kv = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockMonitor::disconnected_and_unreachable());
    let (manager, listener) = manager_over(kv, mock.clone());

    let accepted = manager.request_add(fence("A")).await.unwrap();
    assert!(accepted);

    // Durably pending before any network response.
    assert_eq!(
        manager.pending_add_ids().await.unwrap(),
        ["A".to_string()].into()
    );
    assert!(manager.synced_ids().await.unwrap().is_empty());
    assert!(mock.added_ids().is_empty());

    // A connection attempt was triggered, and failed without retry.
    wait_for("connection attempt", || {
        mock.connect_calls.load(Ordering::SeqCst) >= 1
    })
    .await;

    // The environment reconnects later.
    mock.go_online();
    manager.on_connection_established().await.unwrap();

    assert_eq!(manager.synced_ids().await.unwrap(), ["A".to_string()].into());
    assert!(manager.pending_add_ids().await.unwrap().is_empty());
    assert_eq!(mock.added_ids(), vec!["A".to_string()]);

    let adds = listener.adds.lock().unwrap();
    assert_eq!(adds.len(), 1);
    assert_eq!(adds[0].0, "A");
    assert!(adds[0].1.is_success());
}

#[tokio::test]
async fn expired_add_is_rejected_with_no_state_change() {
    let kv = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockMonitor::connected());
    let (manager, listener) = manager_over(kv, mock.clone());

    let accepted = manager.request_add(expired_fence("stale")).await.unwrap();
    assert!(!accepted);

    assert!(manager.pending_add_ids().await.unwrap().is_empty());
    assert!(manager.pending_remove_ids().await.unwrap().is_empty());
    assert!(manager.synced_ids().await.unwrap().is_empty());
    assert!(mock.added_ids().is_empty());
    assert!(listener.adds.lock().unwrap().is_empty());
}

#[tokio::test]
async fn repeated_remove_requests_collapse_to_one_pending_entry() {
    let kv = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockMonitor::disconnected_and_unreachable());
    let (manager, _listener) = manager_over(kv, mock);

    manager.request_remove("x").await.unwrap();
    manager.request_remove("x").await.unwrap();

    let pending = manager.pending_remove_ids().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending.contains("x"));
}

#[tokio::test]
async fn offline_sequence_converges_to_net_adds() {
    let kv = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockMonitor::disconnected_and_unreachable());
    let (manager, _listener) = manager_over(kv, mock.clone());

    manager.request_add(fence("A")).await.unwrap();
    manager.request_add(fence("B")).await.unwrap();
    manager.request_remove("A").await.unwrap();

    mock.go_online();
    manager.on_connection_established().await.unwrap();

    assert_eq!(manager.synced_ids().await.unwrap(), ["B".to_string()].into());
    assert!(manager.pending_add_ids().await.unwrap().is_empty());
    assert!(manager.pending_remove_ids().await.unwrap().is_empty());
    assert!(mock.removed_ids().contains(&"A".to_string()));
}

#[tokio::test]
async fn later_add_wins_over_earlier_remove() {
    let kv = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockMonitor::disconnected_and_unreachable());
    let (manager, _listener) = manager_over(kv, mock.clone());

    manager.request_remove("A").await.unwrap();
    manager.request_add(fence("A")).await.unwrap();

    // The newer add superseded the pending removal.
    assert!(manager.pending_remove_ids().await.unwrap().is_empty());

    mock.go_online();
    manager.on_connection_established().await.unwrap();

    assert_eq!(manager.synced_ids().await.unwrap(), ["A".to_string()].into());
    assert!(mock.removed_ids().is_empty());
}

#[tokio::test]
async fn stale_add_completion_cannot_resurrect_a_removed_id() {
    let kv = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockMonitor::connected());
    mock.hold_adds.store(true, Ordering::SeqCst);
    let (manager, listener) = manager_over(kv, mock.clone());

    // The add's remote call parks inside the service; the remove
    // supersedes it and confirms first.
    manager.request_add(fence("A")).await.unwrap();
    manager.request_remove("A").await.unwrap();
    wait_for("remove confirmed", || {
        !listener.removes.lock().unwrap().is_empty()
    })
    .await;
    assert!(manager.pending_remove_ids().await.unwrap().is_empty());

    // The superseded add's result now lands. It may notify, but it must
    // not write the removed id back into the synced bucket.
    mock.hold_adds.store(false, Ordering::SeqCst);
    wait_for("parked add resolution", || {
        !listener.adds.lock().unwrap().is_empty()
    })
    .await;

    assert!(manager.synced_ids().await.unwrap().is_empty());
    assert!(manager.pending_add_ids().await.unwrap().is_empty());
    assert!(manager.pending_remove_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_synced_geofence_is_removed_not_resubmitted() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    // State left behind by an earlier run: an expired geofence still
    // believed live on the remote service.
    let synced = GeofenceStore::new(SYNCED_BUCKET, kv.clone());
    synced.save(&expired_fence("bygone")).await.unwrap();

    let mock = Arc::new(MockMonitor::connected());
    let (manager, listener) = manager_over(kv, mock.clone());

    manager.on_connection_established().await.unwrap();

    assert!(manager.synced_ids().await.unwrap().is_empty());
    assert!(manager.pending_remove_ids().await.unwrap().is_empty());
    assert_eq!(mock.removed_ids(), vec!["bygone".to_string()]);
    // Never resubmitted to the remote service.
    assert!(mock.added_ids().is_empty());

    let removes = listener.removes.lock().unwrap();
    assert_eq!(removes.len(), 1);
    assert!(removes[0].1.is_success());
}

#[tokio::test]
async fn remote_add_failure_keeps_intent_for_the_next_pass() {
    let kv = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockMonitor::connected());
    mock.fail_adds.store(true, Ordering::SeqCst);
    let (manager, listener) = manager_over(kv, mock.clone());

    assert!(manager.request_add(fence("flaky")).await.unwrap());

    wait_for("failed add notification", || {
        !listener.adds.lock().unwrap().is_empty()
    })
    .await;

    {
        let adds = listener.adds.lock().unwrap();
        assert_eq!(adds[0].0, "flaky");
        assert_eq!(adds[0].1.code, 1000);
    }
    assert_eq!(
        manager.pending_add_ids().await.unwrap(),
        ["flaky".to_string()].into()
    );
    assert!(manager.synced_ids().await.unwrap().is_empty());

    // The next trigger retries and converges.
    mock.fail_adds.store(false, Ordering::SeqCst);
    manager.synchronize_all().await.unwrap();

    assert_eq!(
        manager.synced_ids().await.unwrap(),
        ["flaky".to_string()].into()
    );
    assert!(manager.pending_add_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn remote_remove_failure_keeps_intent_for_the_next_pass() {
    let kv = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockMonitor::connected());
    let (manager, listener) = manager_over(kv, mock.clone());

    manager.request_add(fence("doomed")).await.unwrap();
    wait_for("confirmed add", || {
        listener.adds.lock().unwrap().len() == 1
    })
    .await;

    mock.fail_removes.store(true, Ordering::SeqCst);
    manager.request_remove("doomed").await.unwrap();
    wait_for("failed remove notification", || {
        !listener.removes.lock().unwrap().is_empty()
    })
    .await;

    assert_eq!(
        manager.pending_remove_ids().await.unwrap(),
        ["doomed".to_string()].into()
    );
    // The confirmed entry is untouched by the failure.
    assert_eq!(
        manager.synced_ids().await.unwrap(),
        ["doomed".to_string()].into()
    );

    mock.fail_removes.store(false, Ordering::SeqCst);
    manager.synchronize_all().await.unwrap();

    assert!(manager.synced_ids().await.unwrap().is_empty());
    assert!(manager.pending_remove_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn reconnect_reasserts_confirmed_geofences_silently() {
    let kv = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockMonitor::connected());
    let (manager, listener) = manager_over(kv, mock.clone());

    manager.request_add(fence("stable")).await.unwrap();
    wait_for("confirmed add", || {
        listener.adds.lock().unwrap().len() == 1
    })
    .await;
    assert_eq!(mock.added_ids(), vec!["stable".to_string()]);

    // Simulate a reconnect: the confirmed geofence is re-registered, with
    // no new listener notification.
    manager.on_connection_established().await.unwrap();

    assert_eq!(
        mock.added_ids(),
        vec!["stable".to_string(), "stable".to_string()]
    );
    assert_eq!(listener.adds.lock().unwrap().len(), 1);
    assert_eq!(
        manager.synced_ids().await.unwrap(),
        ["stable".to_string()].into()
    );
}

#[tokio::test]
async fn unregistered_handler_name_targets_the_fallback() {
    struct NoopHandler;

    #[async_trait]
    impl GeofenceEventHandler for NoopHandler {
        async fn on_event(&self, _event: &GeofenceEvent) {}
    }

    init_tracing();
    let kv = Arc::new(MemoryStore::new());
    let mock = Arc::new(MockMonitor::connected());
    let registry = Arc::new(HandlerRegistry::new());
    registry.register("app.known", Arc::new(NoopHandler));
    let manager = GeofenceManager::new(kv, mock.clone(), registry);
    let listener = Arc::new(RecordingListener::default());
    manager.set_listener(listener.clone());

    let unknown = GeofenceDescriptor::builder("u", 1.0, 1.0)
        .handler("app.unknown")
        .build()
        .unwrap();
    let known = GeofenceDescriptor::builder("k", 1.0, 1.0)
        .handler("app.known")
        .build()
        .unwrap();
    manager.request_add(unknown).await.unwrap();
    manager.request_add(known).await.unwrap();

    wait_for("both adds confirmed", || {
        listener.adds.lock().unwrap().len() == 2
    })
    .await;

    let adds = mock.adds.lock().unwrap();
    let target_of = |id: &str| {
        adds.iter()
            .find(|(_, items)| items.iter().any(|i| i.id == id))
            .map(|(target, _)| target.clone())
            .unwrap()
    };
    assert_eq!(target_of("u"), FALLBACK_HANDLER);
    assert_eq!(target_of("k"), "app.known");
}

#[tokio::test]
async fn intent_survives_a_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fences.json");

    {
        let kv = Arc::new(JsonFileStore::open(&path).await.unwrap());
        let mock = Arc::new(MockMonitor::disconnected_and_unreachable());
        let (manager, _listener) = manager_over(kv, mock);
        manager.request_add(fence("persistent")).await.unwrap();
        assert_eq!(
            manager.pending_add_ids().await.unwrap(),
            ["persistent".to_string()].into()
        );
    }

    // A new process over the same file picks the intent back up.
    let kv = Arc::new(JsonFileStore::open(&path).await.unwrap());
    let mock = Arc::new(MockMonitor::connected());
    let (manager, _listener) = manager_over(kv, mock.clone());

    assert_eq!(
        manager.pending_add_ids().await.unwrap(),
        ["persistent".to_string()].into()
    );
    manager.on_connection_established().await.unwrap();

    assert_eq!(
        manager.synced_ids().await.unwrap(),
        ["persistent".to_string()].into()
    );
    assert_eq!(mock.added_ids(), vec!["persistent".to_string()]);
}

//! The reconciliation coordinator.
//!
//! [`GeofenceManager`] owns the three state buckets and the monitoring
//! service connection, exposes the public add/remove/list operations, and
//! drives convergence whenever the connection becomes available.
//!
//! Request methods record intent durably and return immediately; the
//! remote outcome arrives later on a spawned task and is delivered through
//! the registered [`SyncListener`]. All store transitions, whether from a
//! public entry point or a remote-call continuation, are serialized by one
//! internal lock.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use geofence_core::GeofenceDescriptor;
use geofence_monitor::{HandlerRegistry, MonitorItem, MonitorStatus, MonitoringService};

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::kv::KeyValueStore;
use crate::listener::SyncListener;
use crate::store::GeofenceStore;

/// Bucket prefix for geofences requested but not yet confirmed added.
pub const TO_ADD_BUCKET: &str = "to_add";
/// Bucket prefix for ids requested but not yet confirmed removed.
pub const TO_REMOVE_BUCKET: &str = "to_remove";
/// Bucket prefix mirroring what is believed live on the remote service.
pub const SYNCED_BUCKET: &str = "synced";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Add,
    Remove,
}

/// In-memory request ordering. Requests get a monotonic sequence number;
/// a completion only applies its store transition while its request is
/// still the latest for that id, so a stale callback cannot clobber the
/// state of a newer request (most-recent-request-wins).
///
/// Every dispatch records or reuses an entry before the remote call goes
/// out, so a completion that finds no entry for its id arrived after its
/// request was resolved or superseded and must not touch the stores.
#[derive(Default)]
struct RequestState {
    next_seq: u64,
    latest: HashMap<String, (u64, RequestKind)>,
}

impl RequestState {
    fn record(&mut self, id: &str, kind: RequestKind) -> u64 {
        self.next_seq += 1;
        self.latest.insert(id.to_string(), (self.next_seq, kind));
        self.next_seq
    }

    /// Sequence number for a reconciliation-pass submission: reuse the
    /// live request's number when one exists, otherwise record a fresh one
    /// (the durable entry predates this process).
    fn ensure(&mut self, id: &str, kind: RequestKind) -> u64 {
        match self.latest.get(id) {
            Some((seq, k)) if *k == kind => *seq,
            _ => self.record(id, kind),
        }
    }

    /// Whether a completion for `seq` may apply its transition. An absent
    /// entry means the request was already resolved or superseded, so the
    /// completion is stale.
    fn is_current(&self, id: &str, seq: u64) -> bool {
        self.latest.get(id).is_some_and(|(s, _)| *s == seq)
    }

    fn clear(&mut self, id: &str, seq: u64) {
        if self.latest.get(id).is_some_and(|(s, _)| *s == seq) {
            self.latest.remove(id);
        }
    }

    fn forget(&mut self, id: &str) {
        self.latest.remove(id);
    }
}

struct Inner {
    service: Arc<dyn MonitoringService>,
    registry: Arc<HandlerRegistry>,
    config: SyncConfig,
    to_add: GeofenceStore,
    to_remove: GeofenceStore,
    synced: GeofenceStore,
    /// Serializes every store transition; held across the local writes of
    /// a transition, never across a remote call.
    state: Mutex<RequestState>,
    listener: RwLock<Option<Arc<dyn SyncListener>>>,
}

/// The reconciliation coordinator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct GeofenceManager {
    inner: Arc<Inner>,
}

impl GeofenceManager {
    /// Create a manager over a durable store, a monitoring service and a
    /// handler registry, with default configuration.
    #[must_use]
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        service: Arc<dyn MonitoringService>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self::with_config(kv, service, registry, SyncConfig::default())
    }

    /// Create a manager with explicit configuration.
    #[must_use]
    pub fn with_config(
        kv: Arc<dyn KeyValueStore>,
        service: Arc<dyn MonitoringService>,
        registry: Arc<HandlerRegistry>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                to_add: GeofenceStore::new(TO_ADD_BUCKET, kv.clone()),
                to_remove: GeofenceStore::new(TO_REMOVE_BUCKET, kv.clone()),
                synced: GeofenceStore::new(SYNCED_BUCKET, kv),
                service,
                registry,
                config,
                state: Mutex::new(RequestState::default()),
                listener: RwLock::new(None),
            }),
        }
    }

    /// Set the status listener, replacing any previous one.
    pub fn set_listener(&self, listener: Arc<dyn SyncListener>) {
        let mut slot = self
            .inner
            .listener
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(listener);
    }

    /// Drop the status listener.
    pub fn clear_listener(&self) {
        let mut slot = self
            .inner
            .listener
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }

    /// Request that a geofence be registered.
    ///
    /// Returns `Ok(false)` without any state change iff the descriptor is
    /// already expired. Otherwise the intent is durably recorded before
    /// this returns; the remote outcome is delivered to the listener. When
    /// the service is disconnected no remote call is made yet, only a
    /// connection attempt is triggered.
    #[instrument(skip(self, descriptor), fields(id = %descriptor.id()))]
    pub async fn request_add(&self, descriptor: GeofenceDescriptor) -> SyncResult<bool> {
        if descriptor.is_expired() {
            warn!("rejecting add of an already-expired geofence");
            return Ok(false);
        }

        let seq = {
            let mut state = self.inner.state.lock().await;
            self.inner.to_add.save(&descriptor).await?;
            // Most-recent-request-wins: an add supersedes a pending remove.
            self.inner.to_remove.discard_id(descriptor.id()).await?;
            state.record(descriptor.id(), RequestKind::Add)
        };

        if self.inner.service.is_connected() {
            let this = self.clone();
            tokio::spawn(async move {
                this.dispatch_add(descriptor, seq).await;
            });
        } else {
            debug!("service disconnected, intent recorded for the next pass");
            self.spawn_connect();
        }
        Ok(true)
    }

    /// Request that a geofence be deregistered.
    ///
    /// The intent is durably recorded before this returns; the remote
    /// outcome is delivered to the listener. Repeated requests for the
    /// same id collapse to one pending entry.
    #[instrument(skip(self))]
    pub async fn request_remove(&self, id: &str) -> SyncResult<()> {
        let seq = {
            let mut state = self.inner.state.lock().await;
            self.inner.to_remove.save_id(id).await?;
            // Most-recent-request-wins: a remove supersedes a pending add.
            self.inner.to_add.discard_id(id).await?;
            state.record(id, RequestKind::Remove)
        };

        if self.inner.service.is_connected() {
            let this = self.clone();
            let id = id.to_string();
            tokio::spawn(async move {
                this.dispatch_remove(id, seq).await;
            });
        } else {
            debug!("service disconnected, intent recorded for the next pass");
            self.spawn_connect();
        }
        Ok(())
    }

    /// To be invoked when the monitoring service reports its connection
    /// established (initially or after a drop). Runs a reconciliation pass.
    pub async fn on_connection_established(&self) -> SyncResult<()> {
        info!("monitoring service connection established");
        self.synchronize_all().await
    }

    /// One full reconciliation pass: re-assert confirmed geofences, submit
    /// pending adds, then pending removals, one remote call per item.
    ///
    /// Does nothing (beyond a connection attempt) while disconnected.
    #[instrument(skip(self))]
    pub async fn synchronize_all(&self) -> SyncResult<()> {
        if !self.inner.service.is_connected() {
            debug!("cannot synchronize while disconnected");
            self.spawn_connect();
            return Ok(());
        }

        let mut reasserts = Vec::new();
        let mut expired_rejects = Vec::new();
        let mut adds = Vec::new();
        let mut removes = Vec::new();

        {
            let mut state = self.inner.state.lock().await;

            // Confirmed geofences first: expired ones are queued for
            // removal and must never be resubmitted, the rest are
            // re-asserted (the service may have forgotten them across the
            // disconnect).
            for descriptor in self.inner.synced.get_all().await? {
                if descriptor.is_expired() {
                    info!(id = %descriptor.id(), "synced geofence expired, queueing removal");
                    self.inner.to_remove.save_id(descriptor.id()).await?;
                } else if self.inner.config.reassert_synced_on_connect {
                    reasserts.push(descriptor);
                }
            }

            // Pending adds. An entry that expired while pending is
            // rejected here: expired geofences are never submitted.
            for descriptor in self.inner.to_add.get_all().await? {
                if descriptor.is_expired() {
                    warn!(id = %descriptor.id(), "pending add expired before submission, dropping");
                    self.inner.to_add.discard_id(descriptor.id()).await?;
                    state.forget(descriptor.id());
                    expired_rejects.push(descriptor);
                } else {
                    let seq = state.ensure(descriptor.id(), RequestKind::Add);
                    adds.push((descriptor, seq));
                }
            }

            // Pending removals last, including those queued above.
            for id in self.inner.to_remove.get_all_ids().await? {
                let seq = state.ensure(&id, RequestKind::Remove);
                removes.push((id, seq));
            }
        }

        info!(
            reasserts = reasserts.len(),
            adds = adds.len(),
            removes = removes.len(),
            "reconciliation pass starting"
        );

        for descriptor in &reasserts {
            self.reassert(descriptor).await;
        }
        for descriptor in &expired_rejects {
            self.notify_add(descriptor, &MonitorStatus::expired_locally());
        }
        for (descriptor, seq) in adds {
            self.dispatch_add(descriptor, seq).await;
        }
        for (id, seq) in removes {
            self.dispatch_remove(id, seq).await;
        }

        debug!("reconciliation pass complete");
        Ok(())
    }

    /// Geofences currently confirmed live on the remote service. Pure
    /// read, no side effects.
    pub async fn list_synced(&self) -> SyncResult<Vec<GeofenceDescriptor>> {
        Ok(self.inner.synced.get_all().await?)
    }

    /// Ids confirmed live on the remote service.
    pub async fn synced_ids(&self) -> SyncResult<BTreeSet<String>> {
        Ok(self.inner.synced.get_all_ids().await?)
    }

    /// Ids with a requested add not yet confirmed.
    pub async fn pending_add_ids(&self) -> SyncResult<BTreeSet<String>> {
        Ok(self.inner.to_add.get_all_ids().await?)
    }

    /// Ids with a requested remove not yet confirmed.
    pub async fn pending_remove_ids(&self) -> SyncResult<BTreeSet<String>> {
        Ok(self.inner.to_remove.get_all_ids().await?)
    }

    /// Submit one add and apply the confirmed transition on success.
    async fn dispatch_add(&self, descriptor: GeofenceDescriptor, seq: u64) {
        let target = self.inner.registry.effective_target(descriptor.handler());
        let item = MonitorItem::from(&descriptor);
        let status = match self.inner.service.add_items(vec![item], &target).await {
            Ok(()) => {
                info!(id = %descriptor.id(), "geofence registered with monitoring service");
                if let Err(err) = self.confirm_add(&descriptor, seq).await {
                    error!(id = %descriptor.id(), "failed to record confirmed add: {err}");
                }
                MonitorStatus::ok()
            }
            Err(err) => {
                error!(id = %descriptor.id(), "geofence not added: {err}");
                err.status()
            }
        };
        self.notify_add(&descriptor, &status);
    }

    async fn confirm_add(&self, descriptor: &GeofenceDescriptor, seq: u64) -> SyncResult<()> {
        let mut state = self.inner.state.lock().await;
        if state.is_current(descriptor.id(), seq) {
            self.inner.synced.save(descriptor).await?;
            self.inner.to_add.discard_id(descriptor.id()).await?;
            state.clear(descriptor.id(), seq);
        } else {
            debug!(id = %descriptor.id(), "add confirmation superseded by a newer request");
        }
        Ok(())
    }

    /// Submit one removal and apply the confirmed transition on success.
    async fn dispatch_remove(&self, id: String, seq: u64) {
        let status = match self.inner.service.remove_items(vec![id.clone()]).await {
            Ok(()) => {
                info!(%id, "geofence removed from monitoring service");
                if let Err(err) = self.confirm_remove(&id, seq).await {
                    error!(%id, "failed to record confirmed removal: {err}");
                }
                MonitorStatus::ok()
            }
            Err(err) => {
                error!(%id, "geofence not removed: {err}");
                err.status()
            }
        };
        self.notify_remove(&id, &status);
    }

    async fn confirm_remove(&self, id: &str, seq: u64) -> SyncResult<()> {
        let mut state = self.inner.state.lock().await;
        if state.is_current(id, seq) {
            // The id may never have reached the synced bucket; both
            // discards tolerate absence.
            self.inner.synced.discard_id(id).await?;
            self.inner.to_remove.discard_id(id).await?;
            state.clear(id, seq);
        } else {
            debug!(id, "remove confirmation superseded by a newer request");
        }
        Ok(())
    }

    /// Best-effort re-registration of an already-confirmed geofence after
    /// a reconnect. No listener notification, no store transition.
    async fn reassert(&self, descriptor: &GeofenceDescriptor) {
        let target = self.inner.registry.effective_target(descriptor.handler());
        let item = MonitorItem::from(descriptor);
        if let Err(err) = self.inner.service.add_items(vec![item], &target).await {
            warn!(id = %descriptor.id(), "re-assertion failed: {err}");
        }
    }

    /// Trigger a connection attempt, if configured and needed. Failures
    /// are logged; the engine schedules no retry of its own.
    fn spawn_connect(&self) {
        if !self.inner.config.connect_on_demand || self.inner.service.is_connected() {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            match this.inner.service.connect().await {
                Ok(()) => {
                    if let Err(err) = this.on_connection_established().await {
                        error!("reconciliation after connect failed: {err}");
                    }
                }
                Err(err) => error!("connection to monitoring service failed: {err}"),
            }
        });
    }

    fn current_listener(&self) -> Option<Arc<dyn SyncListener>> {
        self.inner
            .listener
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn notify_add(&self, descriptor: &GeofenceDescriptor, status: &MonitorStatus) {
        if let Some(listener) = self.current_listener() {
            listener.add_status(descriptor, status);
        }
    }

    fn notify_remove(&self, id: &str, status: &MonitorStatus) {
        if let Some(listener) = self.current_listener() {
            listener.remove_status(id, status);
        }
    }
}

//! Geofence Reconciliation Engine
//!
//! Keeps a set of geofences synchronized between local intent and a remote
//! monitoring service that only accepts commands while a live connection
//! exists. Intent is recorded durably before any network traffic, so every
//! requested add or remove either reaches the service eventually or stays
//! discoverable as pending.
//!
//! # Architecture
//!
//! ```text
//! caller ──► GeofenceManager ──► to_add bucket ─┐
//!                │               to_remove bucket ├── one KeyValueStore
//!                │               synced bucket ───┘
//!                └──► MonitoringService (remote, connection-gated)
//! ```
//!
//! Three buckets of one durable key/value store hold the state machine:
//! `to_add` (requested, unconfirmed), `to_remove` (deregistration
//! requested, unconfirmed) and `synced` (confirmed live on the service).
//! Remote confirmations move ids between buckets; failures leave intent in
//! place for the next reconciliation pass, which runs whenever the
//! connection (re)establishes.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use geofence_core::GeofenceDescriptor;
//! use geofence_monitor::HandlerRegistry;
//! use geofence_sync::{GeofenceManager, JsonFileStore, SyncConfig};
//!
//! let kv = Arc::new(JsonFileStore::open("geofences.json").await?);
//! let manager = GeofenceManager::new(kv, service, Arc::new(HandlerRegistry::new()));
//!
//! let fence = GeofenceDescriptor::builder("office", 48.8789, 2.3675).build()?;
//! let accepted = manager.request_add(fence).await?;
//! ```

pub mod config;
pub mod error;
pub mod kv;
pub mod listener;
pub mod manager;
pub mod store;

pub use config::SyncConfig;
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use kv::{JsonFileStore, KeyValueStore, MemoryStore, StoreValue, WriteBatch};
pub use listener::SyncListener;
pub use manager::{GeofenceManager, SYNCED_BUCKET, TO_ADD_BUCKET, TO_REMOVE_BUCKET};
pub use store::GeofenceStore;

//! Geofence Monitoring Service boundary
//!
//! Trait definitions and wire types for the remote monitoring service the
//! reconciliation engine talks to, plus the event side of the contract: the
//! payload the service delivers when a transition fires and the registry
//! that routes it to a named handler.
//!
//! # Modules
//!
//! - [`service`] - The `MonitoringService` trait
//! - [`wire`] - `MonitorItem`, the wire form of a geofence descriptor
//! - [`status`] - Per-operation status codes surfaced to listeners
//! - [`event`] - Transition event payloads
//! - [`handler`] - Named event handler registry with fallback resolution
//! - [`error`] - `MonitorError`

pub mod error;
pub mod event;
pub mod handler;
pub mod service;
pub mod status;
pub mod wire;

pub use error::{MonitorError, MonitorResult};
pub use event::GeofenceEvent;
pub use handler::{FallbackHandler, GeofenceEventHandler, HandlerRegistry, HandlerResolveError};
pub use service::MonitoringService;
pub use status::MonitorStatus;
pub use wire::MonitorItem;

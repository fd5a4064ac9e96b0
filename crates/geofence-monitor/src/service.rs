//! The monitoring service trait.

use async_trait::async_trait;

use crate::error::MonitorResult;
use crate::wire::MonitorItem;

/// The remote geofence monitoring service.
///
/// The service only accepts commands while a live connection exists. The
/// engine owns exactly one instance for its whole lifetime: the connection
/// is established lazily on first need and re-established by the
/// environment after a drop, at which point the owner is expected to call
/// the engine's connection-established entry point.
///
/// Implementations must be safe to call from concurrently running tasks.
#[async_trait]
pub trait MonitoringService: Send + Sync {
    /// Whether a live connection currently exists.
    fn is_connected(&self) -> bool;

    /// Establish a connection. Idempotent when already connected.
    async fn connect(&self) -> MonitorResult<()>;

    /// Register geofences with the service, routing transition events for
    /// them to the handler named by `target`.
    ///
    /// `Ok(())` means the service accepted and applied the registration.
    async fn add_items(&self, items: Vec<MonitorItem>, target: &str) -> MonitorResult<()>;

    /// Deregister geofences by id.
    async fn remove_items(&self, ids: Vec<String>) -> MonitorResult<()>;
}

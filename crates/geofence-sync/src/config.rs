//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Re-assert every non-expired synced geofence to the remote service
    /// during a reconciliation pass. The service is assumed to forget
    /// registrations across certain connection-loss windows; turn this off
    /// if the deployed service is known to retain state.
    #[serde(default = "default_reassert")]
    pub reassert_synced_on_connect: bool,

    /// Trigger a connection attempt when an operation finds the service
    /// disconnected. The engine never schedules retries on its own; with
    /// this off, connecting is entirely the caller's responsibility.
    #[serde(default = "default_connect_on_demand")]
    pub connect_on_demand: bool,
}

fn default_reassert() -> bool {
    true
}

fn default_connect_on_demand() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reassert_synced_on_connect: default_reassert(),
            connect_on_demand: default_connect_on_demand(),
        }
    }
}

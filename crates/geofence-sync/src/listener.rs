//! Status listener.

use geofence_core::GeofenceDescriptor;
use geofence_monitor::MonitorStatus;

/// Observer of terminal add/remove outcomes.
///
/// Local acceptance is synchronous (the return value of the request
/// methods); remote confirmation or failure arrives here, from an
/// arbitrary task context. The engine holds a single listener slot:
/// setting a new listener replaces the previous one.
pub trait SyncListener: Send + Sync {
    /// A requested add finished, successfully or not.
    fn add_status(&self, descriptor: &GeofenceDescriptor, status: &MonitorStatus);

    /// A requested remove finished, successfully or not.
    fn remove_status(&self, id: &str, status: &MonitorStatus);
}

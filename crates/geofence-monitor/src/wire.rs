//! Wire form of a geofence registration.

use serde::{Deserialize, Serialize};

use geofence_core::{GeofenceDescriptor, NEVER_EXPIRE};

/// The shape the remote monitoring service accepts for a registration.
///
/// Carries the expiration as a duration, never as an absolute deadline: the
/// remote service runs its own clock. For a finite expiration the duration
/// is the time remaining at conversion, so a re-assertion after a long
/// disconnect does not restart the expiry window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorItem {
    pub id: String,
    /// Transition kinds to monitor, in wire bit encoding.
    pub transition_bits: u32,
    /// Dwell loitering delay in milliseconds.
    pub loitering_delay_ms: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f32,
    /// Expiration duration in milliseconds, or `NEVER_EXPIRE`.
    pub expiration_duration_ms: i64,
}

impl From<&GeofenceDescriptor> for MonitorItem {
    fn from(descriptor: &GeofenceDescriptor) -> Self {
        let expiration_duration_ms = descriptor
            .remaining_duration_ms()
            .unwrap_or(NEVER_EXPIRE);
        Self {
            id: descriptor.id().to_string(),
            transition_bits: descriptor.transitions().bits(),
            loitering_delay_ms: descriptor.loitering_delay_ms(),
            latitude: descriptor.latitude(),
            longitude: descriptor.longitude(),
            radius_m: descriptor.radius_m(),
            expiration_duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geofence_core::TransitionMask;

    #[test]
    fn never_expiring_descriptor_passes_sentinel_through() {
        let fence = GeofenceDescriptor::builder("a", 2.09, 0.91)
            .radius_m(200.0)
            .transitions(TransitionMask::ENTER | TransitionMask::EXIT)
            .build()
            .unwrap();
        let item = MonitorItem::from(&fence);
        assert_eq!(item.expiration_duration_ms, NEVER_EXPIRE);
        assert_eq!(item.transition_bits, fence.transitions().bits());
        assert_eq!(item.radius_m, 200.0);
    }

    #[test]
    fn finite_expiration_is_sent_as_remaining_duration() {
        let fence = GeofenceDescriptor::builder("b", 0.0, 0.0)
            .expiration_duration_ms(60_000)
            .build()
            .unwrap();
        let item = MonitorItem::from(&fence);
        // Conversion happens immediately after build, so the remaining
        // duration is within a scheduling jitter of the request.
        assert!(item.expiration_duration_ms > 0);
        assert!(item.expiration_duration_ms <= 60_000);
    }
}

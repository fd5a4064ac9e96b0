//! Transition event payloads.

use serde::{Deserialize, Serialize};

use geofence_core::Transition;

/// The payload the monitoring service delivers when something happens to a
/// monitored geofence: either an error, or a transition with the ordered
/// list of geofence ids that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeofenceEvent {
    /// The service reported an error for the monitored set.
    Error {
        code: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// One or more geofences fired a transition.
    Transition {
        kind: Transition,
        /// Ids of the geofences that triggered, in delivery order.
        triggered_ids: Vec<String>,
    },
}

impl GeofenceEvent {
    /// Build a transition event from wire values.
    #[must_use]
    pub fn transition_from_bits(transition_bits: u32, triggered_ids: Vec<String>) -> Self {
        GeofenceEvent::Transition {
            kind: Transition::from_bits(transition_bits),
            triggered_ids,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, GeofenceEvent::Error { .. })
    }

    /// Minimal human-readable summary of the event, the text the fallback
    /// handler reports: `"Enter-home-office-"` for a transition,
    /// `"Error : <code>"` for an error.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            GeofenceEvent::Error { code, .. } => format!("Error : {code}"),
            GeofenceEvent::Transition {
                kind,
                triggered_ids,
            } => {
                let mut text = String::new();
                text.push_str(kind.as_str());
                text.push('-');
                for id in triggered_ids {
                    text.push_str(id);
                    text.push('-');
                }
                text
            }
        }
    }
}

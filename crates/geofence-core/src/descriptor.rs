//! The geofence descriptor and its expiration model.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::transition::TransitionMask;
use crate::value::DataValue;
use crate::FALLBACK_HANDLER;

/// Sentinel expiration duration: the geofence never expires.
pub const NEVER_EXPIRE: i64 = -1;

/// Default radius when a persisted record lacks one, in meters.
pub const DEFAULT_RADIUS_M: f32 = 100.0;

/// Descriptor construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The geofence id is empty.
    #[error("geofence id must not be empty")]
    EmptyId,

    /// The expiration duration is negative and not the never-expire
    /// sentinel.
    #[error("expiration duration must be non-negative or NEVER_EXPIRE, got {duration_ms}")]
    NegativeExpiration { duration_ms: i64 },
}

/// A geofence the caller wants monitored: a circular region, the transition
/// kinds to watch, an optional expiration, and an optional bag of typed
/// additional data.
///
/// The expiration deadline is computed once, when the descriptor is built,
/// from the requested duration and the clock at that moment. It is never
/// recomputed; remaining-duration queries derive from it dynamically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceDescriptor {
    id: String,
    handler: String,
    latitude: f64,
    longitude: f64,
    radius_m: f32,
    transitions: TransitionMask,
    loitering_delay_ms: i32,
    expiration_duration_ms: i64,
    expiration_deadline_ms: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    data: BTreeMap<String, DataValue>,
}

impl GeofenceDescriptor {
    /// Start building a descriptor for a circular region centered at
    /// (`latitude`, `longitude`) degrees.
    pub fn builder(
        id: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> GeofenceDescriptorBuilder {
        GeofenceDescriptorBuilder {
            id: id.into(),
            handler: None,
            latitude,
            longitude,
            radius_m: DEFAULT_RADIUS_M,
            transitions: TransitionMask::default(),
            loitering_delay_ms: 0,
            expiration_duration_ms: NEVER_EXPIRE,
            data: BTreeMap::new(),
        }
    }

    /// Rebuild a descriptor from already-persisted fields.
    ///
    /// Unlike [`GeofenceDescriptor::builder`], the expiration deadline is
    /// taken as-is rather than recomputed, so a restart does not move the
    /// expiry of a stored geofence.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_parts(
        id: String,
        handler: String,
        latitude: f64,
        longitude: f64,
        radius_m: f32,
        transitions: TransitionMask,
        loitering_delay_ms: i32,
        expiration_duration_ms: i64,
        expiration_deadline_ms: i64,
        data: BTreeMap<String, DataValue>,
    ) -> Self {
        Self {
            id,
            handler,
            latitude,
            longitude,
            radius_m,
            transitions,
            loitering_delay_ms,
            expiration_duration_ms,
            expiration_deadline_ms,
            data,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the event handler to invoke when a transition fires.
    #[must_use]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[must_use]
    pub fn radius_m(&self) -> f32 {
        self.radius_m
    }

    #[must_use]
    pub fn transitions(&self) -> TransitionMask {
        self.transitions
    }

    /// Dwell loitering delay in milliseconds. Only meaningful when the
    /// transition mask contains DWELL.
    #[must_use]
    pub fn loitering_delay_ms(&self) -> i32 {
        self.loitering_delay_ms
    }

    /// Requested expiration duration in milliseconds, or [`NEVER_EXPIRE`].
    #[must_use]
    pub fn expiration_duration_ms(&self) -> i64 {
        self.expiration_duration_ms
    }

    /// Absolute expiration deadline in epoch milliseconds, or 0 when the
    /// geofence never expires.
    #[must_use]
    pub fn expiration_deadline_ms(&self) -> i64 {
        self.expiration_deadline_ms
    }

    #[must_use]
    pub fn data(&self) -> &BTreeMap<String, DataValue> {
        &self.data
    }

    #[must_use]
    pub fn never_expires(&self) -> bool {
        self.expiration_duration_ms == NEVER_EXPIRE
    }

    /// Whether the geofence has a finite expiration that lies in the past
    /// at `now_ms` (epoch milliseconds).
    #[must_use]
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        !self.never_expires() && now_ms > self.expiration_deadline_ms
    }

    /// Whether the geofence is expired right now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Milliseconds left until expiry at `now_ms`, clamped at zero.
    /// `None` when the geofence never expires.
    #[must_use]
    pub fn remaining_duration_ms_at(&self, now_ms: i64) -> Option<i64> {
        if self.never_expires() {
            None
        } else {
            Some((self.expiration_deadline_ms - now_ms).max(0))
        }
    }

    /// Milliseconds left until expiry, or `None` when never-expiring.
    #[must_use]
    pub fn remaining_duration_ms(&self) -> Option<i64> {
        self.remaining_duration_ms_at(Utc::now().timestamp_millis())
    }
}

impl Display for GeofenceDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Geofence {} :", self.id)?;
        writeln!(f, "\t({}, {})", self.latitude, self.longitude)?;
        writeln!(f, "\tradius : {}", self.radius_m)?;
        writeln!(f, "\texpiration : {}", self.expiration_duration_ms)?;
        writeln!(f, "\ttransitions : {}", self.transitions)?;
        write!(f, "\thandler : {}", self.handler)
    }
}

/// Builder for [`GeofenceDescriptor`].
#[derive(Debug, Clone)]
pub struct GeofenceDescriptorBuilder {
    id: String,
    handler: Option<String>,
    latitude: f64,
    longitude: f64,
    radius_m: f32,
    transitions: TransitionMask,
    loitering_delay_ms: i32,
    expiration_duration_ms: i64,
    data: BTreeMap<String, DataValue>,
}

impl GeofenceDescriptorBuilder {
    /// Name the event handler to invoke when a transition fires. Left
    /// unset, events route to the registered fallback handler.
    #[must_use]
    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    #[must_use]
    pub fn radius_m(mut self, radius_m: f32) -> Self {
        self.radius_m = radius_m;
        self
    }

    #[must_use]
    pub fn transitions(mut self, transitions: TransitionMask) -> Self {
        self.transitions = transitions;
        self
    }

    /// Dwell loitering delay in milliseconds.
    #[must_use]
    pub fn loitering_delay_ms(mut self, delay_ms: i32) -> Self {
        self.loitering_delay_ms = delay_ms;
        self
    }

    /// Expire the geofence `duration_ms` milliseconds after it is built.
    /// Pass [`NEVER_EXPIRE`] (the default) for no expiration.
    #[must_use]
    pub fn expiration_duration_ms(mut self, duration_ms: i64) -> Self {
        self.expiration_duration_ms = duration_ms;
        self
    }

    /// Attach a typed additional-data entry. Entries with an empty key are
    /// dropped with a warning.
    #[must_use]
    pub fn data(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        let key = key.into();
        if key.is_empty() {
            warn!("dropping additional data entry with empty key");
            return self;
        }
        self.data.insert(key, value.into());
        self
    }

    /// Build the descriptor, computing the expiration deadline from the
    /// current clock.
    pub fn build(self) -> Result<GeofenceDescriptor, DescriptorError> {
        self.build_at(Utc::now().timestamp_millis())
    }

    /// Build the descriptor with an explicit construction time in epoch
    /// milliseconds. Exposed so expiry behavior can be exercised without
    /// sleeping.
    pub fn build_at(self, now_ms: i64) -> Result<GeofenceDescriptor, DescriptorError> {
        if self.id.is_empty() {
            return Err(DescriptorError::EmptyId);
        }
        if self.expiration_duration_ms != NEVER_EXPIRE && self.expiration_duration_ms < 0 {
            return Err(DescriptorError::NegativeExpiration {
                duration_ms: self.expiration_duration_ms,
            });
        }
        let expiration_deadline_ms = if self.expiration_duration_ms == NEVER_EXPIRE {
            0
        } else {
            now_ms.saturating_add(self.expiration_duration_ms)
        };
        Ok(GeofenceDescriptor {
            id: self.id,
            handler: self.handler.unwrap_or_else(|| FALLBACK_HANDLER.to_string()),
            latitude: self.latitude,
            longitude: self.longitude,
            radius_m: self.radius_m,
            transitions: self.transitions,
            loitering_delay_ms: self.loitering_delay_ms,
            expiration_duration_ms: self.expiration_duration_ms,
            expiration_deadline_ms,
            data: self.data,
        })
    }
}

//! Geofence Core Library
//!
//! Shared domain types for the geofence reconciliation engine.
//!
//! # Modules
//!
//! - [`transition`] - Boundary-crossing transition kinds and bitmasks
//! - [`value`] - Typed scalar values carried as per-geofence additional data
//! - [`descriptor`] - The geofence descriptor and its expiration model
//!
//! # Example
//!
//! ```
//! use geofence_core::{GeofenceDescriptor, TransitionMask};
//!
//! let fence = GeofenceDescriptor::builder("office", 48.8789, 2.3675)
//!     .radius_m(250.0)
//!     .transitions(TransitionMask::ENTER | TransitionMask::EXIT)
//!     .build()
//!     .unwrap();
//!
//! assert!(!fence.is_expired());
//! ```

pub mod descriptor;
pub mod transition;
pub mod value;

pub use descriptor::{DescriptorError, GeofenceDescriptor, GeofenceDescriptorBuilder, NEVER_EXPIRE};
pub use transition::{Transition, TransitionMask};
pub use value::{DataKind, DataValue};

/// Registered name of the built-in fallback event handler.
///
/// Descriptors that do not name a handler, and descriptors whose named
/// handler cannot be resolved, are routed to the handler registered under
/// this name.
pub const FALLBACK_HANDLER: &str = "geofence.fallback";

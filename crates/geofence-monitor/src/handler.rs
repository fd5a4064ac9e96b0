//! Named event handler registry.
//!
//! Transition events carry the name of the handler that should process
//! them. The registry maps those names to registered handler
//! implementations explicitly; an unresolvable name falls back to the
//! built-in fallback handler, which reports the event's text summary.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use geofence_core::FALLBACK_HANDLER;

use crate::event::GeofenceEvent;

/// Resolution failure for a named handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no geofence event handler registered under '{name}'")]
pub struct HandlerResolveError {
    /// The name that failed to resolve.
    pub name: String,
}

/// A handler for geofence transition events.
#[async_trait]
pub trait GeofenceEventHandler: Send + Sync {
    async fn on_event(&self, event: &GeofenceEvent);
}

impl std::fmt::Debug for dyn GeofenceEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GeofenceEventHandler")
    }
}

/// The built-in fallback handler: reports the event's minimal text summary
/// through the log. Registered under [`FALLBACK_HANDLER`] in every
/// registry; it handles events whose named target cannot be resolved.
#[derive(Debug, Default)]
pub struct FallbackHandler;

#[async_trait]
impl GeofenceEventHandler for FallbackHandler {
    async fn on_event(&self, event: &GeofenceEvent) {
        info!(summary = %event.summary(), "geofence event");
    }
}

/// Registry mapping handler names to handler implementations.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn GeofenceEventHandler>>>,
}

impl HandlerRegistry {
    /// Create a registry with the fallback handler pre-registered.
    #[must_use]
    pub fn new() -> Self {
        let mut handlers: HashMap<String, Arc<dyn GeofenceEventHandler>> = HashMap::new();
        handlers.insert(FALLBACK_HANDLER.to_string(), Arc::new(FallbackHandler));
        Self {
            handlers: RwLock::new(handlers),
        }
    }

    /// Register a handler under a name, replacing any previous registration.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn GeofenceEventHandler>) {
        let name = name.into();
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.insert(name, handler);
    }

    /// Resolve a handler by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn GeofenceEventHandler>, HandlerResolveError> {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.get(name).cloned().ok_or_else(|| HandlerResolveError {
            name: name.to_string(),
        })
    }

    /// Resolve a handler by name, falling back to the built-in fallback
    /// handler when the name is unknown.
    #[must_use]
    pub fn resolve_or_fallback(&self, name: &str) -> Arc<dyn GeofenceEventHandler> {
        match self.resolve(name) {
            Ok(handler) => handler,
            Err(err) => {
                warn!(name, "{err}, using fallback handler");
                // The fallback is registered at construction and can only
                // be replaced, never removed.
                self.resolve(FALLBACK_HANDLER)
                    .unwrap_or_else(|_| Arc::new(FallbackHandler) as Arc<dyn GeofenceEventHandler>)
            }
        }
    }

    /// The name a registration should actually target: the requested name
    /// when registered, otherwise the fallback handler's name.
    #[must_use]
    pub fn effective_target(&self, name: &str) -> String {
        if self.resolve(name).is_ok() {
            name.to_string()
        } else {
            warn!(
                name,
                "handler name is not registered, targeting fallback handler"
            );
            FALLBACK_HANDLER.to_string()
        }
    }

    /// Deliver an event to the handler named by `target`, falling back when
    /// the name is unknown.
    pub async fn dispatch(&self, target: &str, event: &GeofenceEvent) {
        let handler = self.resolve_or_fallback(target);
        handler.on_event(event).await;
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

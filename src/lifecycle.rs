//! Connection lifecycle: register on establish, deregister on teardown

use std::sync::Arc;

use crate::error::{PinstreamError, Result};
use crate::registry::ConnectionRegistry;

/// Adds and removes registry entries as push channels come and go
#[derive(Clone)]
pub struct ConnectionLifecycle {
    registry: Arc<dyn ConnectionRegistry>,
}

impl ConnectionLifecycle {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Register a freshly established channel.
    ///
    /// An error here means the channel must be rejected: an unregistered
    /// connection would never receive a push.
    pub fn on_connect(&self, connection_id: &str) -> Result<()> {
        self.registry.add(connection_id).map_err(|e| {
            tracing::error!("Failed to register connection {}: {}", connection_id, e);
            PinstreamError::Registration {
                connection_id: connection_id.to_string(),
                message: e.to_string(),
            }
        })?;
        tracing::info!("Registered connection {}", connection_id);
        Ok(())
    }

    /// Deregister a channel that closed gracefully.
    ///
    /// Failures are only logged; a leftover entry is pruned the first time a
    /// push to it reports the peer as gone.
    pub fn on_disconnect(&self, connection_id: &str) {
        match self.registry.remove(connection_id) {
            Ok(()) => tracing::info!("Deregistered connection {}", connection_id),
            Err(e) => tracing::warn!(
                "Failed to deregister connection {} (left for pruning): {}",
                connection_id,
                e
            ),
        }
    }
}

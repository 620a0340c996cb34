//! Shared state handed to every connection task

use std::sync::Arc;

use crate::delivery::{DeliveryChannel, SessionHub};
use crate::lifecycle::ConnectionLifecycle;
use crate::registry::ConnectionRegistry;

/// Registry, sockets and lifecycle of one daemon process
pub struct DaemonContext {
    pub registry: Arc<dyn ConnectionRegistry>,
    /// Sockets attached to this process
    pub hub: Arc<SessionHub>,
    /// Channel used for relays; the hub itself unless overridden
    pub channel: Arc<dyn DeliveryChannel>,
    pub lifecycle: ConnectionLifecycle,
}

impl DaemonContext {
    pub fn new(registry: Arc<dyn ConnectionRegistry>, hub: Arc<SessionHub>) -> Self {
        let channel: Arc<dyn DeliveryChannel> = hub.clone();
        Self {
            lifecycle: ConnectionLifecycle::new(registry.clone()),
            registry,
            hub,
            channel,
        }
    }

    /// Number of sockets currently attached
    pub fn attached(&self) -> usize {
        self.hub.len()
    }
}

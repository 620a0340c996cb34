//! Change-capture dispatcher
//!
//! Turns one change-log batch into one envelope and pushes it to every
//! registered connection.
//!
//! # Failure isolation
//!
//! Each connection gets its own future that pushes *and* classifies its own
//! outcome (delivered / pruned / failed). The futures are joined on
//! completion only, so one failing peer can neither cancel nor hide the
//! attempts to the others:
//!
//! ```text
//!  batch ──► list_all ──► envelope ──┬─► push(c1) ─► classify ─┐
//!                                    ├─► push(c2) ─► classify ─┼─► report
//!                                    └─► push(c3) ─► classify ─┘
//! ```
//!
//! The only error that escapes [`ChangeDispatcher::handle_batch`] is a
//! registry read failure: nothing was attempted, so the change log should
//! redeliver the batch. Individual delivery failures never fail a batch.

use std::sync::Arc;

use futures_util::future::join_all;

use crate::change::{ChangeRecord, PinChange, PushEnvelope};
use crate::delivery::{DeliveryChannel, DeliveryError};
use crate::error::Result;
use crate::links::LinkResolver;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// Outcome of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Changes folded into the envelope
    pub changes: usize,
    pub delivered: Vec<ConnectionId>,
    /// Connections reported gone and removed from the registry
    pub pruned: Vec<ConnectionId>,
    /// Connections whose push failed for any other reason
    pub failed: Vec<(ConnectionId, DeliveryError)>,
}

impl DispatchReport {
    /// Number of connections a push was attempted for
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.pruned.len() + self.failed.len()
    }

    fn record(&mut self, connection_id: ConnectionId, outcome: PushOutcome) {
        match outcome {
            PushOutcome::Delivered => self.delivered.push(connection_id),
            PushOutcome::Pruned => self.pruned.push(connection_id),
            PushOutcome::Failed(e) => self.failed.push((connection_id, e)),
        }
    }
}

#[derive(Debug)]
enum PushOutcome {
    Delivered,
    Pruned,
    Failed(DeliveryError),
}

/// Fans change batches out to every registered connection
pub struct ChangeDispatcher {
    registry: Arc<dyn ConnectionRegistry>,
    channel: Arc<dyn DeliveryChannel>,
    links: Arc<dyn LinkResolver>,
}

impl ChangeDispatcher {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        channel: Arc<dyn DeliveryChannel>,
        links: Arc<dyn LinkResolver>,
    ) -> Self {
        Self {
            registry,
            channel,
            links,
        }
    }

    /// Handle one change-log batch.
    ///
    /// Returns `Ok` once every push attempt has been classified, whatever the
    /// individual outcomes. Returns `Err` only when the connection set could
    /// not be read.
    pub async fn handle_batch(&self, batch: &[ChangeRecord]) -> Result<DispatchReport> {
        if batch.is_empty() {
            tracing::debug!("Ignoring empty change batch");
            return Ok(DispatchReport::default());
        }

        let connections = self.registry.list_all().map_err(|e| {
            tracing::error!("Aborting dispatch of {} change(s): {}", batch.len(), e);
            e
        })?;

        if connections.is_empty() {
            tracing::debug!("No connections registered, dropping {} change(s)", batch.len());
            return Ok(DispatchReport {
                changes: batch.len(),
                ..Default::default()
            });
        }

        // Links are issued here, right before delivery
        let envelope = self.build_envelope(batch);
        let payload = envelope.to_json()?;

        let mut report = fan_out(
            self.registry.as_ref(),
            self.channel.as_ref(),
            &connections,
            &payload,
        )
        .await;
        report.changes = envelope.len();

        tracing::info!(
            "Dispatched {} change(s) to {} connection(s): {} delivered, {} pruned, {} failed",
            report.changes,
            report.attempted(),
            report.delivered.len(),
            report.pruned.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Fold a batch into an envelope, preserving record order
    pub fn build_envelope(&self, batch: &[ChangeRecord]) -> PushEnvelope {
        PushEnvelope(
            batch
                .iter()
                .cloned()
                .map(|record| {
                    let mut change = PinChange::from(record);
                    change.new_image = change.new_image.map(|pin| self.links.resolve(pin));
                    change
                })
                .collect(),
        )
    }
}

/// Push `payload` to every target concurrently and classify each outcome.
///
/// A gone peer is removed from `registry` inside its own attempt, so the
/// registry is already pruned when this returns.
pub async fn fan_out(
    registry: &dyn ConnectionRegistry,
    channel: &dyn DeliveryChannel,
    targets: &[ConnectionId],
    payload: &str,
) -> DispatchReport {
    let attempts = targets.iter().map(|connection_id| async move {
        let outcome = push_one(registry, channel, connection_id, payload).await;
        (connection_id.clone(), outcome)
    });

    let mut report = DispatchReport::default();
    for (connection_id, outcome) in join_all(attempts).await {
        report.record(connection_id, outcome);
    }
    report
}

async fn push_one(
    registry: &dyn ConnectionRegistry,
    channel: &dyn DeliveryChannel,
    connection_id: &str,
    payload: &str,
) -> PushOutcome {
    match channel.push(connection_id, payload).await {
        Ok(()) => {
            tracing::debug!("Pushed {} bytes to {}", payload.len(), connection_id);
            PushOutcome::Delivered
        }
        Err(DeliveryError::Gone) => {
            tracing::info!("Connection {} is gone, pruning", connection_id);
            if let Err(e) = registry.remove(connection_id) {
                tracing::warn!("Failed to prune stale connection {}: {}", connection_id, e);
            }
            PushOutcome::Pruned
        }
        Err(e) => {
            tracing::warn!("Push to {} failed: {}", connection_id, e);
            PushOutcome::Failed(e)
        }
    }
}

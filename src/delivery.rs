//! Delivery channels: "push this payload to connection X"
//!
//! Every channel reports a peer that no longer exists as
//! [`DeliveryError::Gone`], separately from every other failure. That
//! variant is the only thing the dispatcher inspects to decide whether a
//! registry entry gets pruned.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use crate::error::{PinstreamError, Result};
use crate::registry::ConnectionId;

/// Why a push did not reach its connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The target connection no longer exists
    #[error("connection is gone")]
    Gone,

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("outbound queue is congested")]
    Congested,

    #[error("push timed out after {0:?}")]
    TimedOut(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone)
    }
}

/// Push transport to individual connections
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn push(&self, connection_id: &str, payload: &str) -> std::result::Result<(), DeliveryError>;
}

// ============================================================================
// In-process sessions
// ============================================================================

/// Outbound queues of the sockets attached to this process.
///
/// The hub is the transport, not the source of truth for membership: an id
/// that is registered but not attached here (for example after a restart)
/// is reported as gone and gets pruned.
pub struct SessionHub {
    sessions: RwLock<HashMap<ConnectionId, mpsc::Sender<String>>>,
    max_payload_bytes: usize,
    push_timeout: Duration,
    queue_capacity: usize,
}

impl SessionHub {
    pub fn new(max_payload_bytes: usize, push_timeout: Duration, queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_payload_bytes,
            push_timeout,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Attach a socket and get the receiving end of its outbound queue
    pub fn attach(&self, connection_id: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.sessions.write().insert(connection_id.to_string(), tx);
        rx
    }

    pub fn detach(&self, connection_id: &str) {
        self.sessions.write().remove(connection_id);
    }

    pub fn is_attached(&self, connection_id: &str) -> bool {
        self.sessions.read().contains_key(connection_id)
    }

    /// Ids of the attached sockets
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Number of attached sockets
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl DeliveryChannel for SessionHub {
    async fn push(&self, connection_id: &str, payload: &str) -> std::result::Result<(), DeliveryError> {
        if payload.len() > self.max_payload_bytes {
            return Err(DeliveryError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_payload_bytes,
            });
        }

        // Clone the sender so no lock is held across the await
        let sender = self.sessions.read().get(connection_id).cloned();
        let Some(sender) = sender else {
            return Err(DeliveryError::Gone);
        };

        match sender.send_timeout(payload.to_string(), self.push_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(DeliveryError::Gone),
            Err(SendTimeoutError::Timeout(_)) => Err(DeliveryError::Congested),
        }
    }
}

// ============================================================================
// HTTP management API
// ============================================================================

/// Pushes through a connection-management HTTP endpoint:
/// `POST {endpoint}/@connections/{id}`, where 410 means the peer is gone.
pub struct CallbackChannel {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl CallbackChannel {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PinstreamError::Config {
                message: format!("Failed to build callback client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn connection_url(&self, connection_id: &str) -> String {
        format!(
            "{}/@connections/{}",
            self.endpoint,
            urlencoding::encode(connection_id)
        )
    }
}

#[async_trait]
impl DeliveryChannel for CallbackChannel {
    async fn push(&self, connection_id: &str, payload: &str) -> std::result::Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.connection_url(connection_id))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::TimedOut(self.timeout)
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::GONE {
            Err(DeliveryError::Gone)
        } else {
            Err(DeliveryError::Transport(format!("HTTP {}", status)))
        }
    }
}

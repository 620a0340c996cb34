//! WebSocket listener feeding pushed envelopes into a session cache

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;
use crate::reconciler::{MergeOutcome, SharedReconciler};
use crate::socket_server::protocol::{is_envelope, ServerMessage};

/// Capped exponential reconnect delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// Delay before reconnect attempt `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Keeps one push socket open and merges what arrives on it
pub struct PushListener {
    url: String,
    reconciler: SharedReconciler,
    backoff: Backoff,
    /// Fired with the connection id on the first greeting
    registered: Option<oneshot::Sender<String>>,
    /// Whether the current socket was greeted, i.e. is in the registry
    greeted: bool,
}

impl PushListener {
    pub fn new(url: &str, reconciler: SharedReconciler, backoff: Backoff) -> Self {
        Self {
            url: url.to_string(),
            reconciler,
            backoff,
            registered: None,
            greeted: false,
        }
    }

    /// Report the connection id once the daemon has registered this socket
    pub fn notify_registered(mut self, tx: oneshot::Sender<String>) -> Self {
        self.registered = Some(tx);
        self
    }

    /// Listen until the task is cancelled, reconnecting whenever the socket
    /// drops. The cache is kept across reconnects.
    pub async fn run(mut self) {
        let mut attempt = 0u32;
        loop {
            match self.listen_once().await {
                Ok(frames) => tracing::info!("Push socket closed after {} frame(s)", frames),
                Err(e) => tracing::warn!("Push socket error: {}", e),
            }
            // A socket the daemon refused to register does not reset backoff
            if self.greeted {
                attempt = 0;
            }
            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            tracing::debug!("Reconnecting to {} in {:?}", self.url, delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection: returns the number of frames received once the
    /// server closes the socket.
    pub async fn listen_once(&mut self) -> Result<usize> {
        self.greeted = false;
        let (mut socket, _) = connect_async(self.url.as_str()).await?;
        tracing::info!("Connected to push channel {}", self.url);

        let mut frames = 0;
        while let Some(message) = socket.next().await {
            frames += 1;
            match message? {
                Message::Text(text) => self.handle_text(&text),
                Message::Close(_) => break,
                // Ping/Pong are answered by tungstenite itself
                _ => {}
            }
        }
        Ok(frames)
    }

    /// Whether the last socket received its registration greeting
    pub fn is_greeted(&self) -> bool {
        self.greeted
    }

    fn handle_text(&mut self, text: &str) {
        if is_envelope(text) {
            match self.reconciler.lock().apply_envelope(text) {
                Ok(outcomes) => log_outcomes(&outcomes),
                Err(e) => tracing::warn!("Discarding unreadable envelope: {}", e),
            }
            return;
        }

        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Connected { connection_id }) => {
                if !self.greeted {
                    tracing::info!("Registered as connection {}", connection_id);
                }
                self.greeted = true;
                if let Some(tx) = self.registered.take() {
                    // The receiver may have given up waiting
                    let _ = tx.send(connection_id);
                }
            }
            Ok(ServerMessage::Error { code, message }) => {
                tracing::warn!("Push channel error {}: {}", code, message);
            }
            Ok(other) => tracing::debug!("Ignoring control message {:?}", other),
            Err(e) => tracing::warn!("Unrecognized frame: {}", e),
        }
    }
}

fn log_outcomes(outcomes: &[MergeOutcome]) {
    for outcome in outcomes {
        match outcome {
            MergeOutcome::Rejected(reason) => tracing::warn!("Delta rejected: {}", reason),
            other => tracing::debug!("Delta merged: {:?}", other),
        }
    }
}

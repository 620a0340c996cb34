//! Client session
//!
//! A [`ClientSession`] ties a [`SharedReconciler`] to its two collaborators:
//! the CRUD API (hydration and local mutations) and the push channel
//! (remote deltas). Both paths end in the same merge routine.
//!
//! ```text
//!   PinApi::list_pins ──► hydrate ─┐
//!   PushListener ──► apply_envelope ┼──► ClientStateReconciler
//!   save/rename/delete ──► apply_* ─┘
//! ```

pub mod api;
pub mod listener;

pub use api::{ApiError, ApiResult, HttpPinApi, PinApi};
pub use listener::{Backoff, PushListener};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{PinstreamError, Result};
use crate::pin::{Image, SavedPin};
use crate::reconciler::{ClientStateReconciler, Selection, SharedReconciler};

/// A live view of the pin set for one user
pub struct ClientSession {
    api: Arc<dyn PinApi>,
    reconciler: SharedReconciler,
    listener: Option<JoinHandle<()>>,
}

impl ClientSession {
    /// Session without a push channel; call [`Self::hydrate`] to go live
    pub fn new(api: Arc<dyn PinApi>) -> Self {
        Self {
            api,
            reconciler: ClientStateReconciler::shared(),
            listener: None,
        }
    }

    /// Start listening on `ws_url`, then hydrate once the daemon has
    /// registered the socket.
    ///
    /// Changes committed after registration reach this session by push,
    /// and any that race the listing are queued until it lands. Fails if
    /// no registration arrives within `register_timeout`.
    pub async fn start(
        api: Arc<dyn PinApi>,
        ws_url: &str,
        backoff: Backoff,
        register_timeout: Duration,
    ) -> Result<Self> {
        let mut session = Self::new(api);
        let (tx, rx) = oneshot::channel();
        let listener = PushListener::new(ws_url, session.reconciler.clone(), backoff)
            .notify_registered(tx);
        session.listener = Some(tokio::spawn(listener.run()));

        let connection_id = match tokio::time::timeout(register_timeout, rx).await {
            Ok(Ok(id)) => id,
            Ok(Err(_)) => return Err(channel_error("push listener stopped before registering")),
            Err(_) => {
                return Err(channel_error(&format!(
                    "not registered with {} after {:?}",
                    ws_url, register_timeout
                )))
            }
        };
        tracing::debug!("Hydrating session for connection {}", connection_id);
        session.hydrate().await?;
        Ok(session)
    }

    pub fn reconciler(&self) -> &SharedReconciler {
        &self.reconciler
    }

    /// Fetch the full listing and install it. Returns the cache size.
    pub async fn hydrate(&self) -> Result<usize> {
        let listing = self.api.list_pins().await?;
        let mut reconciler = self.reconciler.lock();
        reconciler.hydrate(listing);
        Ok(reconciler.len())
    }

    /// Store the selected unsaved point as a pin
    pub async fn save(&self, custom_name: &str, image: Option<Image>) -> Result<SavedPin> {
        let pin = match self.reconciler.lock().selection() {
            Selection::Unsaved(pin) => pin.clone(),
            _ => return Err(invalid_selection("save needs an unsaved selection")),
        };
        let image = image.or_else(|| pin.unsaved_image.clone());

        let saved = self.api.save_pin(&pin, image.as_ref(), custom_name).await?;
        tracing::info!("Saved pin {}", saved.point_url);
        self.reconciler.lock().apply_saved(saved.clone());
        Ok(saved)
    }

    /// Rename the selected pin
    pub async fn rename(&self, custom_name: &str) -> Result<SavedPin> {
        let point_url = self.selected_key()?;
        let renamed = self.api.rename_pin(&point_url, custom_name).await?;
        self.reconciler.lock().apply_renamed(renamed.clone());
        Ok(renamed)
    }

    /// Delete the selected pin
    pub async fn delete(&self) -> Result<()> {
        let point_url = self.selected_key()?;
        match self.api.delete_pin(&point_url).await {
            Ok(()) => {}
            // Already removed elsewhere; the merge below is what matters
            Err(ApiError::NotFound { .. }) => {
                tracing::debug!("Pin {} was already deleted", point_url);
            }
            Err(e) => return Err(e.into()),
        }
        self.reconciler.lock().apply_deleted(&point_url);
        Ok(())
    }

    fn selected_key(&self) -> Result<String> {
        match self.reconciler.lock().selection() {
            Selection::Saved(pin) => Ok(pin.point_url.clone()),
            _ => Err(invalid_selection("a saved pin must be selected")),
        }
    }

    /// Stop the push listener
    pub fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn channel_error(message: &str) -> PinstreamError {
    PinstreamError::Channel {
        message: message.to_string(),
    }
}

fn invalid_selection(message: &str) -> PinstreamError {
    PinstreamError::Selection {
        message: message.to_string(),
    }
}

//! Test doubles for the delivery channel and the pin API

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use pinstream::client::{ApiError, ApiResult, PinApi};
use pinstream::{DeliveryChannel, DeliveryError, Image, Pin, SavedPin};

/// Records every successful push; fails or delays pushes for chosen ids
#[derive(Default)]
pub struct RecordingChannel {
    failures: HashMap<String, DeliveryError>,
    delays: HashMap<String, Duration>,
    received: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(mut self, connection_id: &str, error: DeliveryError) -> Self {
        self.failures.insert(connection_id.to_string(), error);
        self
    }

    pub fn delay(mut self, connection_id: &str, delay: Duration) -> Self {
        self.delays.insert(connection_id.to_string(), delay);
        self
    }

    /// Payloads delivered to `connection_id`, in order
    pub fn payloads_for(&self, connection_id: &str) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter(|(to, _)| to == connection_id)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.received.lock().len()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn push(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError> {
        if let Some(delay) = self.delays.get(connection_id) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.failures.get(connection_id) {
            return Err(error.clone());
        }
        self.received
            .lock()
            .push((connection_id.to_string(), payload.to_string()));
        Ok(())
    }
}

/// Pin API backed by a map, with the same conflict and not-found rules as
/// the HTTP API
#[derive(Default)]
pub struct MemoryPinApi {
    pins: Mutex<BTreeMap<String, SavedPin>>,
}

impl MemoryPinApi {
    pub fn with_pins(pins: Vec<SavedPin>) -> Self {
        Self {
            pins: Mutex::new(pins.into_iter().map(|p| (p.point_url.clone(), p)).collect()),
        }
    }

    pub fn stored(&self) -> Vec<String> {
        self.pins.lock().keys().cloned().collect()
    }

    /// Delete behind the session's back, as another client would
    pub fn delete_pin_directly(&self, point_url: &str) {
        self.pins.lock().remove(point_url);
    }
}

#[async_trait]
impl PinApi for MemoryPinApi {
    async fn list_pins(&self) -> ApiResult<Vec<SavedPin>> {
        Ok(self.pins.lock().values().cloned().collect())
    }

    async fn get_pin(&self, point_url: &str) -> ApiResult<SavedPin> {
        self.pins
            .lock()
            .get(point_url)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                point_url: point_url.to_string(),
            })
    }

    async fn save_pin(&self, pin: &Pin, _image: Option<&Image>, custom_name: &str) -> ApiResult<SavedPin> {
        let key = pin.key();
        let mut pins = self.pins.lock();
        if pins.contains_key(&key) {
            return Err(ApiError::AlreadyExists { point_url: key });
        }
        let saved = SavedPin {
            point_url: key.clone(),
            point: pin.point,
            custom_name: custom_name.to_string(),
            address: pin.address.clone(),
            source_ip: "127.0.0.1".to_string(),
            created: 1_700_000_000_000,
            image: None,
            thumbnail: None,
        };
        pins.insert(key, saved.clone());
        Ok(saved)
    }

    async fn rename_pin(&self, point_url: &str, custom_name: &str) -> ApiResult<SavedPin> {
        let mut pins = self.pins.lock();
        let pin = pins.get_mut(point_url).ok_or_else(|| ApiError::NotFound {
            point_url: point_url.to_string(),
        })?;
        pin.custom_name = custom_name.to_string();
        Ok(pin.clone())
    }

    async fn delete_pin(&self, point_url: &str) -> ApiResult<()> {
        self.pins
            .lock()
            .remove(point_url)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound {
                point_url: point_url.to_string(),
            })
    }
}

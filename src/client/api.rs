//! CRUD collaborator for pins

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::error::{PinstreamError, Result};
use crate::pin::{Image, Pin, SavedPin};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Failures of the pin API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("pin {point_url} not found")]
    NotFound { point_url: String },

    #[error("pin already exists at {point_url}")]
    AlreadyExists { point_url: String },

    #[error("{operation} failed with HTTP {status}")]
    Status { operation: &'static str, status: u16 },

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Create/read/rename/delete for stored pins
#[async_trait]
pub trait PinApi: Send + Sync {
    async fn list_pins(&self) -> ApiResult<Vec<SavedPin>>;

    async fn get_pin(&self, point_url: &str) -> ApiResult<SavedPin>;

    async fn save_pin(&self, pin: &Pin, image: Option<&Image>, custom_name: &str) -> ApiResult<SavedPin>;

    async fn rename_pin(&self, point_url: &str, custom_name: &str) -> ApiResult<SavedPin>;

    async fn delete_pin(&self, point_url: &str) -> ApiResult<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenameRequest<'a> {
    custom_name: &'a str,
}

/// [`PinApi`] over HTTP: `GET|POST {base}pin`, `GET|PATCH|DELETE {base}pin/{pointUrl}`
#[derive(Clone)]
pub struct HttpPinApi {
    client: Client,
    pin_url: String,
}

impl HttpPinApi {
    pub fn new(api_base_url: &str) -> Result<Self> {
        Self::with_timeout(api_base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(api_base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PinstreamError::Config {
                message: format!("Failed to build pin API client: {}", e),
            })?;

        let mut base = api_base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            client,
            pin_url: format!("{}pin", base),
        })
    }

    /// Collection URL
    pub fn pin_url(&self) -> &str {
        &self.pin_url
    }

    fn item_url(&self, point_url: &str) -> String {
        format!("{}/{}", self.pin_url, urlencoding::encode(point_url))
    }
}

fn check(response: Response, operation: &'static str, point_url: &str) -> ApiResult<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound {
            point_url: point_url.to_string(),
        }),
        status => Err(ApiError::Status {
            operation,
            status: status.as_u16(),
        }),
    }
}

#[async_trait]
impl PinApi for HttpPinApi {
    async fn list_pins(&self) -> ApiResult<Vec<SavedPin>> {
        let response = self.client.get(&self.pin_url).send().await?;
        let response = check(response, "list", "")?;
        Ok(response.json().await?)
    }

    async fn get_pin(&self, point_url: &str) -> ApiResult<SavedPin> {
        let response = self.client.get(self.item_url(point_url)).send().await?;
        let response = check(response, "get", point_url)?;
        Ok(response.json().await?)
    }

    async fn save_pin(&self, pin: &Pin, image: Option<&Image>, custom_name: &str) -> ApiResult<SavedPin> {
        let body = Pin {
            custom_name: custom_name.to_string(),
            unsaved_image: image.cloned(),
            ..pin.clone()
        };
        let response = self.client.post(&self.pin_url).json(&body).send().await?;

        // The API answers 400 when a pin already holds this point
        if response.status() == StatusCode::BAD_REQUEST {
            return Err(ApiError::AlreadyExists {
                point_url: pin.key(),
            });
        }
        let response = check(response, "save", &pin.key())?;
        Ok(response.json().await?)
    }

    async fn rename_pin(&self, point_url: &str, custom_name: &str) -> ApiResult<SavedPin> {
        let response = self
            .client
            .patch(self.item_url(point_url))
            .json(&RenameRequest { custom_name })
            .send()
            .await?;
        let response = check(response, "rename", point_url)?;
        Ok(response.json().await?)
    }

    async fn delete_pin(&self, point_url: &str) -> ApiResult<()> {
        let response = self.client.delete(self.item_url(point_url)).send().await?;
        check(response, "delete", point_url)?;
        Ok(())
    }
}

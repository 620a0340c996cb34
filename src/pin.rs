//! Pin records and their identity
//!
//! A pin is identified by its `pointUrl`: the latitude and longitude rounded
//! to six decimal places and joined with a comma. The same key addresses a
//! pin in the change log, in push envelopes and in every client cache.

use serde::{Deserialize, Serialize};

/// Number of decimal places kept when deriving a key from a point
pub const LATLNG_DECIMAL_PLACES: i32 = 6;

/// Separator between latitude and longitude inside a key
pub const KEY_SEPARATOR: &str = ",";

/// A geographic point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinPoint {
    pub lat: f64,
    pub lng: f64,
}

impl PinPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Derive the record key for this point
    pub fn to_key(&self) -> String {
        point_to_url(self, KEY_SEPARATOR)
    }

    /// Parse a record key back into a point
    pub fn from_key(key: &str) -> Option<Self> {
        url_to_point(key, KEY_SEPARATOR)
    }
}

fn round(num: f64, decimal_places: i32) -> f64 {
    let factor = 10f64.powi(decimal_places);
    let rounded = (num * factor).round() / factor;
    // "-0" and "0" must map to the same key
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Format a point as `lat<sep>lng` with coordinates rounded to six places.
pub fn point_to_url(point: &PinPoint, separator: &str) -> String {
    format!(
        "{}{}{}",
        round(point.lat, LATLNG_DECIMAL_PLACES),
        separator,
        round(point.lng, LATLNG_DECIMAL_PLACES)
    )
}

/// Parse `lat<sep>lng`. Anything other than exactly two numeric parts is rejected.
pub fn url_to_point(url: &str, separator: &str) -> Option<PinPoint> {
    if url.is_empty() {
        return None;
    }
    let parts: Vec<&str> = url.split(separator).collect();
    if parts.len() != 2 {
        return None;
    }
    let lat = parts[0].trim().parse::<f64>().ok()?;
    let lng = parts[1].trim().parse::<f64>().ok()?;
    Some(PinPoint { lat, lng })
}

/// Reverse-geocoding result attached to a point.
///
/// The geocoder's response is kept verbatim; only the display name is
/// interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub serde_json::Value);

impl Address {
    pub fn display_name(&self) -> Option<&str> {
        self.0.get("display_name").and_then(|v| v.as_str())
    }
}

/// An image chosen on the client but not stored yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    pub last_modified: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

/// An image held in the object store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedImage {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    pub last_modified: i64,
    pub s3key: String,
    /// Download link; ephemeral for originals, stable for thumbnails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A pin that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    #[serde(default)]
    pub custom_name: String,
    pub point: PinPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsaved_image: Option<Image>,
}

impl Pin {
    pub fn at(point: PinPoint) -> Self {
        Self {
            custom_name: String::new(),
            point,
            address: None,
            unsaved_image: None,
        }
    }

    pub fn key(&self) -> String {
        self.point.to_key()
    }
}

/// A stored pin, as returned by the CRUD API and carried in change records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPin {
    pub point_url: String,
    pub point: PinPoint,
    #[serde(default)]
    pub custom_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default)]
    pub source_ip: String,
    /// Creation time, epoch milliseconds
    #[serde(default)]
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<SavedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<SavedImage>,
}

impl SavedPin {
    pub fn key(&self) -> &str {
        &self.point_url
    }
}

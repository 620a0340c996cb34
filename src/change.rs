//! Change records and the push envelope
//!
//! A [`ChangeRecord`] is what the storage change log hands us: one per
//! mutated pin, in source order. A [`PinChange`] is one entry of the envelope
//! pushed to clients. Both carry the pin key and the event name; only
//! non-REMOVE events carry a snapshot.

use serde::{Deserialize, Serialize};

use crate::error::{PinstreamError, Result};
use crate::pin::SavedPin;

/// Kind of mutation captured by the change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventName {
    Insert,
    Modify,
    Remove,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Modify => "MODIFY",
            Self::Remove => "REMOVE",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key attributes of a pin record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinKey {
    pub point_url: String,
}

impl PinKey {
    pub fn new(point_url: impl Into<String>) -> Self {
        Self {
            point_url: point_url.into(),
        }
    }
}

/// One mutation surfaced by the change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub key: PinKey,
    pub event_name: EventName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<SavedPin>,
    /// Pre-mutation snapshot. Carried for completeness, never pushed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_image: Option<SavedPin>,
}

impl ChangeRecord {
    pub fn insert(pin: SavedPin) -> Self {
        Self {
            key: PinKey::new(pin.point_url.clone()),
            event_name: EventName::Insert,
            new_image: Some(pin),
            old_image: None,
        }
    }

    pub fn modify(pin: SavedPin) -> Self {
        Self {
            key: PinKey::new(pin.point_url.clone()),
            event_name: EventName::Modify,
            new_image: Some(pin),
            old_image: None,
        }
    }

    pub fn remove(point_url: impl Into<String>) -> Self {
        Self {
            key: PinKey::new(point_url),
            event_name: EventName::Remove,
            new_image: None,
            old_image: None,
        }
    }
}

/// One entry of a push envelope:
/// `{ "pointUrl": ..., "eventName": ..., "newImage": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinChange {
    #[serde(flatten)]
    pub key: PinKey,
    pub event_name: EventName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<SavedPin>,
}

impl PinChange {
    pub fn point_url(&self) -> &str {
        &self.key.point_url
    }

    /// Check the entry can be merged: it has a key, non-REMOVE events carry a
    /// snapshot, and the snapshot belongs to the key.
    pub fn validate(&self) -> Result<()> {
        if self.key.point_url.trim().is_empty() {
            return Err(PinstreamError::MalformedChange {
                reason: "missing pointUrl".to_string(),
            });
        }
        match (&self.event_name, &self.new_image) {
            (EventName::Remove, _) => Ok(()),
            (event, None) => Err(PinstreamError::MalformedChange {
                reason: format!("{} for {} without newImage", event, self.key.point_url),
            }),
            (_, Some(image)) if image.point_url != self.key.point_url => {
                Err(PinstreamError::MalformedChange {
                    reason: format!(
                        "newImage key {} does not match {}",
                        image.point_url, self.key.point_url
                    ),
                })
            }
            _ => Ok(()),
        }
    }
}

impl From<ChangeRecord> for PinChange {
    fn from(record: ChangeRecord) -> Self {
        // REMOVE never carries a snapshot on the wire
        let new_image = match record.event_name {
            EventName::Remove => None,
            _ => record.new_image,
        };
        Self {
            key: record.key,
            event_name: record.event_name,
            new_image,
        }
    }
}

/// Ordered envelope built from one dispatched batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushEnvelope(pub Vec<PinChange>);

impl PushEnvelope {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parse a pushed payload entry by entry.
///
/// A payload that is not a JSON array fails as a whole; inside an array each
/// entry is decoded and validated on its own so one bad entry does not take
/// the rest down with it.
pub fn parse_envelope(payload: &str) -> Result<Vec<Result<PinChange>>> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(payload)?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let change: PinChange =
                serde_json::from_value(entry).map_err(|e| PinstreamError::MalformedChange {
                    reason: e.to_string(),
                })?;
            change.validate()?;
            Ok(change)
        })
        .collect())
}

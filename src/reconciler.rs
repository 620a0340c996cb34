//! Client-side state reconciliation
//!
//! One [`ClientStateReconciler`] per client session holds the authoritative
//! local cache of pins and the user's current selection. Pushed deltas and
//! the responses of the session's own create/rename/delete calls go through
//! the same merge routine, so the cache never depends on *who* made a change.
//!
//! # Phases
//!
//! ```text
//!   HYDRATING ──(full listing arrives)──► LIVE
//! ```
//!
//! While hydrating, the cache is not authoritative and incoming deltas are
//! queued; they are applied in arrival order right after the listing.
//!
//! # Merge rule
//!
//! For a delta on key K: drop K from the cache; unless the event is REMOVE,
//! re-insert the snapshot under K. A selection on K follows the delta: it is
//! replaced by the snapshot, or, for REMOVE, degraded to the point and
//! address the user was looking at. Applying a delta twice yields the same
//! state as applying it once.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::change::{parse_envelope, ChangeRecord, EventName, PinChange};
use crate::error::Result;
use crate::pin::{Address, Pin, PinPoint, SavedPin};

/// Lifecycle of a session cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Hydrating,
    Live,
}

/// What the user is currently looking at
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Selection {
    #[default]
    None,
    /// A point that has no stored pin (yet)
    Unsaved(Pin),
    /// A stored pin, as last seen
    Saved(SavedPin),
}

impl Selection {
    /// Key of the record this selection refers to
    pub fn key(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Unsaved(pin) => Some(pin.key()),
            Self::Saved(pin) => Some(pin.point_url.clone()),
        }
    }

    pub fn point(&self) -> Option<PinPoint> {
        match self {
            Self::None => None,
            Self::Unsaved(pin) => Some(pin.point),
            Self::Saved(pin) => Some(pin.point),
        }
    }

    pub fn address(&self) -> Option<&Address> {
        match self {
            Self::None => None,
            Self::Unsaved(pin) => pin.address.as_ref(),
            Self::Saved(pin) => pin.address.as_ref(),
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Effect of merging one delta
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Removed,
    /// REMOVE for a key the cache did not hold
    Absent,
    /// Queued until hydration completes
    Deferred,
    Rejected(String),
}

/// Per-session cache of pins plus selection state
#[derive(Debug)]
pub struct ClientStateReconciler {
    phase: SessionPhase,
    pins: HashMap<String, SavedPin>,
    selection: Selection,
    pending: VecDeque<PinChange>,
}

/// Reconciler shared between the push listener and local callers.
/// Every merge runs under this one mutex.
pub type SharedReconciler = Arc<Mutex<ClientStateReconciler>>;

impl Default for ClientStateReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientStateReconciler {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Hydrating,
            pins: HashMap::new(),
            selection: Selection::None,
            pending: VecDeque::new(),
        }
    }

    pub fn shared() -> SharedReconciler {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether the cache reflects a full listing.
    /// An empty cache means "no pins" only when this is true.
    pub fn is_authoritative(&self) -> bool {
        self.phase == SessionPhase::Live
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&SavedPin> {
        self.pins.get(key)
    }

    /// Cached pins ordered by key
    pub fn pins(&self) -> Vec<&SavedPin> {
        let mut pins: Vec<&SavedPin> = self.pins.values().collect();
        pins.sort_by(|a, b| a.point_url.cmp(&b.point_url));
        pins
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Deltas waiting for hydration
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    // ------------------------------------------------------------------------
    // Hydration
    // ------------------------------------------------------------------------

    /// Install a full listing and go live.
    ///
    /// Queued deltas are applied afterwards, in arrival order. Calling this
    /// again later is a full rehydration: the cache is replaced and the
    /// selection re-resolved against it.
    pub fn hydrate(&mut self, listing: Vec<SavedPin>) -> Vec<MergeOutcome> {
        self.pins = listing
            .into_iter()
            .map(|pin| (pin.point_url.clone(), pin))
            .collect();

        // Saved selections follow the listing; an unsaved point that is
        // now stored is promoted, as an INSERT would
        let fresh = self
            .selection
            .key()
            .and_then(|key| self.pins.get(&key).cloned());
        if let Some(fresh) = fresh {
            self.selection = Selection::Saved(fresh);
        } else if let Selection::Saved(selected) = &self.selection {
            self.selection = degrade(selected);
        }

        let was_hydrating = self.phase == SessionPhase::Hydrating;
        self.phase = SessionPhase::Live;
        tracing::info!("Cache hydrated with {} pin(s)", self.pins.len());

        let queued: Vec<PinChange> = self.pending.drain(..).collect();
        if was_hydrating && !queued.is_empty() {
            tracing::debug!("Applying {} delta(s) queued during hydration", queued.len());
        }
        queued.into_iter().map(|change| self.merge_live(change)).collect()
    }

    // ------------------------------------------------------------------------
    // Merging
    // ------------------------------------------------------------------------

    /// Merge one delta, pushed or local
    pub fn apply(&mut self, change: PinChange) -> MergeOutcome {
        if let Err(e) = change.validate() {
            tracing::warn!("Rejected delta: {}", e);
            return MergeOutcome::Rejected(e.to_string());
        }
        match self.phase {
            SessionPhase::Hydrating => {
                self.pending.push_back(change);
                MergeOutcome::Deferred
            }
            SessionPhase::Live => self.merge_live(change),
        }
    }

    /// Merge a pushed envelope entry by entry.
    ///
    /// Fails only if the payload is not an envelope at all; malformed
    /// entries are rejected individually and the rest still apply.
    pub fn apply_envelope(&mut self, payload: &str) -> Result<Vec<MergeOutcome>> {
        let entries = parse_envelope(payload)?;
        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                Ok(change) => self.apply(change),
                Err(e) => {
                    tracing::warn!("Rejected envelope entry: {}", e);
                    MergeOutcome::Rejected(e.to_string())
                }
            })
            .collect())
    }

    /// Merge the response of a local create
    pub fn apply_saved(&mut self, pin: SavedPin) -> MergeOutcome {
        self.apply(ChangeRecord::insert(pin).into())
    }

    /// Merge the response of a local rename
    pub fn apply_renamed(&mut self, pin: SavedPin) -> MergeOutcome {
        self.apply(ChangeRecord::modify(pin).into())
    }

    /// Merge the completion of a local delete
    pub fn apply_deleted(&mut self, point_url: &str) -> MergeOutcome {
        self.apply(ChangeRecord::remove(point_url).into())
    }

    fn merge_live(&mut self, change: PinChange) -> MergeOutcome {
        let key = change.key.point_url;
        let existed = self.pins.remove(&key).is_some();

        let outcome = match (change.event_name, change.new_image) {
            (EventName::Remove, _) => {
                if let Selection::Saved(selected) = &self.selection {
                    if selected.point_url == key {
                        self.selection = degrade(selected);
                    }
                }
                if existed {
                    MergeOutcome::Removed
                } else {
                    MergeOutcome::Absent
                }
            }
            (_, Some(image)) => {
                if self.selection.key().as_deref() == Some(key.as_str()) {
                    self.selection = Selection::Saved(image.clone());
                }
                self.pins.insert(key.clone(), image);
                if existed {
                    MergeOutcome::Replaced
                } else {
                    MergeOutcome::Inserted
                }
            }
            // validate() guarantees a snapshot for INSERT/MODIFY
            (event, None) => MergeOutcome::Rejected(format!("{} without newImage", event)),
        };

        tracing::debug!("Merged {:?} for {}", outcome, key);
        outcome
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Select whatever is at `point`. Returns true if the selection is an
    /// unsaved point that still needs an address.
    pub fn select_point(&mut self, point: PinPoint) -> bool {
        match self.pins.get(&point.to_key()) {
            Some(saved) => {
                self.selection = Selection::Saved(saved.clone());
                false
            }
            None => {
                self.selection = Selection::Unsaved(Pin::at(point));
                true
            }
        }
    }

    /// Select by record key. Returns false (selection untouched) if the key
    /// is neither cached nor a valid point.
    pub fn select_key(&mut self, point_url: &str) -> bool {
        if let Some(saved) = self.pins.get(point_url) {
            self.selection = Selection::Saved(saved.clone());
            return true;
        }
        match PinPoint::from_key(point_url) {
            Some(point) => {
                self.selection = Selection::Unsaved(Pin::at(point));
                true
            }
            None => false,
        }
    }

    /// Select a search result, preferring the stored pin at the same point
    pub fn select_pin(&mut self, pin: Pin) {
        self.selection = match self.pins.get(&pin.key()) {
            Some(saved) => Selection::Saved(saved.clone()),
            None => Selection::Unsaved(pin),
        };
    }

    pub fn unselect(&mut self) {
        self.selection = Selection::None;
    }

    /// Attach a geocoding result to an unsaved selection
    pub fn set_address(&mut self, address: Address) -> bool {
        match &mut self.selection {
            Selection::Unsaved(pin) => {
                pin.address = Some(address);
                true
            }
            _ => false,
        }
    }
}

/// Keep only what the user was looking at: the point and its address
fn degrade(pin: &SavedPin) -> Selection {
    Selection::Unsaved(Pin {
        custom_name: String::new(),
        point: pin.point,
        address: pin.address.clone(),
        unsaved_image: None,
    })
}

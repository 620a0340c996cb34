//! Pinstream: change-capture fan-out and client reconciliation for live pin maps
//!
//! Every mutation of the pin store surfaces as a change record. The push
//! daemon turns each batch of records into one envelope and delivers it to
//! every registered connection, pruning connections that turn out to be gone.
//! Each client merges envelopes into its local cache with the same rule it
//! applies to the responses of its own create/rename/delete calls.
//!
//! # Components
//!
//! - [`registry`] - durable set of live connection ids
//! - [`lifecycle`] - register on connect, deregister on disconnect
//! - [`dispatcher`] - batch → envelope → concurrent, failure-isolated fan-out
//! - [`delivery`] - push transports, with "gone" as a first-class outcome
//! - [`reconciler`] - per-session cache and selection state
//! - [`client`] - CRUD API, push listener and the session tying them together
//! - [`socket_server`] - the WebSocket daemon
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pinstream::{ChangeDispatcher, ChangeRecord, SessionHub, SqliteConnectionRegistry};
//! use pinstream::links::PassthroughLinks;
//!
//! let registry = Arc::new(SqliteConnectionRegistry::open_in_memory()?);
//! let hub = Arc::new(SessionHub::new(128 * 1024, Duration::from_secs(5), 64));
//! let dispatcher = ChangeDispatcher::new(registry, hub, Arc::new(PassthroughLinks));
//!
//! let report = dispatcher.handle_batch(&[ChangeRecord::remove("10,20")]).await?;
//! println!("{} delivered, {} pruned", report.delivered.len(), report.pruned.len());
//! ```

pub mod change;
pub mod changelog;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod links;
pub mod pin;
pub mod reconciler;
pub mod registry;
pub mod socket_server;

// Re-export commonly used types
pub use change::{parse_envelope, ChangeRecord, EventName, PinChange, PinKey, PushEnvelope};
pub use client::{ApiError, ClientSession, HttpPinApi, PinApi, PushListener};
pub use config::DaemonConfig;
pub use delivery::{CallbackChannel, DeliveryChannel, DeliveryError, SessionHub};
pub use dispatcher::{fan_out, ChangeDispatcher, DispatchReport};
pub use error::{PinstreamError, Result};
pub use lifecycle::ConnectionLifecycle;
pub use pin::{Address, Image, Pin, PinPoint, SavedImage, SavedPin};
pub use reconciler::{ClientStateReconciler, MergeOutcome, Selection, SessionPhase, SharedReconciler};
pub use registry::{ConnectionId, ConnectionRegistry, SqliteConnectionRegistry};

//! Common test utilities and fixtures for pinstream integration tests
//!
//! This module provides:
//! - Pin fixtures and an on-disk registry that can be reopened
//! - `RecordingChannel`, a delivery channel with scripted failures and delays
//! - `MemoryPinApi`, an in-memory CRUD collaborator
//! - `Daemon`, a push daemon on a loopback port

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod channels;
pub mod daemon;
pub mod fixtures;

pub use channels::{MemoryPinApi, RecordingChannel};
pub use daemon::{next_json, send_text, Daemon, WAIT};
pub use fixtures::*;

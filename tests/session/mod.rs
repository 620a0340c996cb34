//! Client session tests
//!
//! Reconciliation of pushed envelopes and local API responses.

pub mod session_tests;

//! Server-side fan-out tests
//!
//! Registry, lifecycle, dispatcher and change-log intake working together
//! against an on-disk registry.

pub mod dispatch_tests;
pub mod feed_tests;
pub mod lifecycle_tests;

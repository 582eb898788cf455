//! Test fixtures for Rolegate integration tests
//!
//! Shared setup for the core and binary test suites: a ready-made
//! [`TestFixture`] over the memory backend, a fault-injecting
//! [`FlakyBackend`], and proptest case counts.

#![deny(unsafe_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod fixture;
pub mod flaky;
pub mod proptest_config;

pub use fixture::TestFixture;
pub use flaky::{FlakyBackend, PutGate};

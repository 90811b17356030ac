#![deny(unsafe_code)]

//! Shared test utilities for the hapadmin workspace.
//!
//! Provides a scripted stand-in for the HAProxy stats socket, CSV fixtures,
//! config builders, and tracing helpers so that individual crate tests stay
//! concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! hapadmin-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod script;
pub mod tracing_setup;

pub use daemon::{FakeCluster, FakeDaemon};
pub use script::{DaemonScript, STAT_FIELDS, StatRow, UNKNOWN_COMMAND};

#![deny(unsafe_code)]

//! Client library for the HAProxy stats socket.
//!
//! HAProxy runs one or more worker processes, each exposing its own stats
//! socket. This crate talks to every socket independently and folds the
//! per-process answers back into one view of the load balancer.
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │    Facade    │──▶│  Aggregator  │──▶│ Object Handle │ (one per process)
//! │ HaProxy/...  │   │ reduce_*     │   │ revalidates id│
//! └──────────────┘   └──────────────┘   └───────┬───────┘
//!                                               │
//!                    ┌──────────────┐   ┌───────▼───────┐
//!                    │ Wire Decoder │◀──│   Endpoint    │
//!                    │ info / CSV   │   │ show info/stat│
//!                    └──────────────┘   └───────┬───────┘
//!                                               │
//!                                       ┌───────▼───────┐
//!                                       │   Transport   │ UNIX or TCP,
//!                                       │ retry/timeout │ one conn/command
//!                                       └───────────────┘
//! ```

use std::future::Future;
use std::pin::Pin;

/// Boxed `Send` future returned by [`transport::Channel`], which is used as
/// `Box<dyn Channel>` and so cannot use `async fn`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Cross-process execution and result reduction.
pub mod aggregate;
/// Locating stats sockets and connecting to every HAProxy process.
pub mod discovery;
/// One HAProxy worker process behind one stats socket.
pub mod endpoint;
/// Crate-wide error type.
pub mod error;
/// User-facing objects spanning all processes: HAProxy, frontends, backends, servers.
pub mod facade;
/// Per-process references to frontends, backends and servers.
pub mod handle;
/// Static metric classification and command-output tables.
pub mod tables;
/// Socket transport with retry and fault classification.
pub mod transport;
/// Decoders for `show info` and `show stat` responses.
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::{Lenient, ProcessBound, ResultSet};
pub use discovery::EndpointSource;
pub use endpoint::Endpoint;
pub use error::{EntityKind, HapError};
pub use facade::{Backend, Frontend, HaProxy, Server, ServerState, TableId, Weight};
pub use handle::{BackendHandle, FrontendHandle, ServerHandle};
pub use transport::{Channel, RetryPolicy, SocketAddress, SocketTransport, TransportOptions};
pub use wire::{InfoBlock, MetricValue, Record, StatTable, StatType};

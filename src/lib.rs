//! # Slotwise
//!
//! Client library for sharded in-memory key/value clusters where each node
//! owns a contiguous range of a 16384-slot hash space.
//!
//! ## Features
//!
//! - **Slot routing**: commands go to the node owning their key slot,
//!   computed with CRC16 and hash-tag (`{...}`) support
//! - **Transparent redirection**: MOVED and ASK hints are followed
//!   automatically, with a bounded redirect budget per call
//! - **Topology cache**: slot ownership is cached as an immutable snapshot
//!   and refreshed from `CLUSTER SLOTS` when MOVED hints show it is stale
//! - **Connection multiplexing**: one lazily created connection per node,
//!   shared across callers and dropped when the node leaves the cluster
//! - **Failure recovery**: connection errors rotate through untried nodes,
//!   then back off exponentially with jitter
//! - **Pluggable transport**: the wire protocol sits behind a registered
//!   connection adapter; `"redis"` (RESP2 over TCP) is built in
//!
//! ## Example
//!
//! ```no_run
//! use slotwise::ClusterClient;
//!
//! #[tokio::main]
//! async fn main() -> slotwise::Result<()> {
//!     let client = ClusterClient::builder()
//!         .node("127.0.0.1:7000")
//!         .node("127.0.0.1:7001")
//!         .build()?;
//!
//!     client.set("key", "value").await?;
//!     let value = client.get("key").await?;
//!     println!("{:?}", value);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod adapter;
pub mod command;
pub mod proto;
pub mod topology;

mod builder;
mod client;
mod errors;
mod pipeline;
mod pool;
mod router;
mod slot;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use builder::ClusterClientBuilder;
pub use client::{ClusterClient, RawConnection};
pub use command::Command;
pub use errors::{Error, Result};
pub use pipeline::Pipeline;
pub use proto::frame::Frame;
pub use slot::{key_slot, SLOT_COUNT};

//! # sensortag-app
//!
//! Application layer: the monitoring core and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `AdapterService`: the Bluetooth stack: adapters, discovery, object
//!     tree, connections and characteristic I/O
//!   - `MetricsSink`: time-series persistence of reading batches
//! - Drive the tag through its lifecycle in a single event loop:
//!   - `connection`: discovery, connection and service resolution
//!   - `sensor_controller`: per-sensor period handshake and sensor I/O
//!   - `poll`: fixed-interval enable / settle / read / disable cycles
//!   - `registry`: characteristic handles of the connected target
//! - Provide **in-process infrastructure** (timer continuations) that doesn't
//!   need IO
//!
//! ## Dependency rule
//! Depends on `sensortag-domain` only (plus `tokio` for timers and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod connection;
pub mod event;
pub mod monitor;
pub mod poll;
pub mod ports;
pub mod registry;
pub mod sensor_controller;
pub mod session;
pub mod timer;

#[cfg(test)]
mod testing;

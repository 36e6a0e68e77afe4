//! # sensortag-adapter-storage-sqlite-sqlx
//!
//! `SQLite` time-series adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `MetricsSink` port defined in `sensortag-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Keep raw samples for the longest retention tier and consolidate them
//!   per tier on read
//!
//! ## Dependency rule
//! Depends on `sensortag-app` (for port traits) and `sensortag-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod metrics_sink;
pub mod pool;

pub use metrics_sink::{ConsolidatedPoint, SqliteMetricsSink};
pub use pool::{Config, Database};

//! # sensortag-domain
//!
//! Pure domain model for the sensortag monitor.
//!
//! ## Responsibilities
//! - Foundational types: device addresses, error conventions, timestamps
//! - Define the fixed **sensor table** (kinds, characteristic roles, UUIDs)
//! - Provide the **value codec** translating raw payloads into physical units
//!   and encoding configuration commands
//! - Define **readings** and the batches handed to the metrics sink
//! - Describe the **metrics schema** (sources, retention tiers, consolidation)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod time;

pub mod address;
pub mod codec;
pub mod metrics;
pub mod reading;
pub mod sensor;

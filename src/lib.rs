//! used-by crate
//!
//! This crate is an implementation detail of the `used-by` tool. This crate's API is fluid and may change without warning
//! and in a semver-incompatible way.
//!
//! # Module Organization
//!
//! - [`model`]: Records flowing between pipeline stages
//! - [`pipeline`]: Stage abstraction, bounded channels, observers, and the coordinator
//! - [`stages`]: The concrete stages (dependents, relevance, refs, archive, usage files, usage code, sink)
//! - [`commands`]: Command-line interface and orchestration

/// Result type alias using `ohno::AppError` as the default error type.
pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

#[doc(hidden)]
pub mod commands;

#[doc(hidden)]
pub mod model;

#[doc(hidden)]
pub mod pipeline;

#[doc(hidden)]
pub mod stages;

pub use crate::commands::{Host, run};

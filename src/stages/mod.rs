//! The concrete pipeline stages, in pipeline order.

pub mod archive;
pub mod dependents;
pub mod refs;
pub mod relevance;
pub mod sink;
pub mod usage_code;
pub mod usage_files;

pub use archive::ArchiveFetcher;
pub use dependents::{Dependents, LiveDependents, SnapshotDependents};
pub use refs::{GraphQlClient, RateLimiter, RefResolver};
pub use relevance::RelevanceFilter;
pub use sink::JsonArraySink;
pub use usage_code::{UsageCodeFilter, UsageTarget};
pub use usage_files::UsageFileFilter;

//! Local cache layer
//!
//! Storage for mirrored files plus the two components that keep it filled:
//! the freshness oracle deciding what is stale, and the fetch coordinator
//! running at most one download per resource.

pub mod fetch;
pub mod freshness;
pub mod path;
pub mod store;

pub use fetch::{Dispatch, FetchCoordinator};
pub use freshness::FreshnessOracle;
pub use path::{PathError, ResourcePath};
pub use store::CacheStore;

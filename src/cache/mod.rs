//! Download cache and artifact freshness
//!
//! Two halves share one idea: never redo expensive work that is still valid.
//!
//! - [`DownloadCache`] keeps fetched source files keyed by (source, region),
//!   shared between runs over different regions.
//! - [`ArtifactStore`] decides whether a derived artifact must be rebuilt
//!   from modification times and recorded input digests.
//!
//! # Entry States
//!
//! | State | Description |
//! |-------|-------------|
//! | Miss | Nothing cached, fetch required |
//! | Building | Staging dir from an interrupted fetch, ignored by lookups |
//! | Complete | Marker written and renamed into place, reused as-is |

pub mod entry;
pub mod store;

pub use entry::{format_bytes, CacheEntry, CacheKey, CacheState, CachedItem, DownloadCache, Staging};
pub use store::{
    commit, digest_bytes, staging_path, write_atomic, write_stamp, ArtifactStore, RebuildDecision,
    RebuildReason,
};

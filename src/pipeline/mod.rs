//! Build pipeline for one watershed
//!
//! [`PipelineOrchestrator`] drives the stages; the submodules hold the
//! request inputs, region parsing, stage tracking and the run summary.

pub mod inputs;
pub mod orchestrator;
pub mod region;
pub mod state;
pub mod summary;

pub use inputs::{find_climate, parse_meta, LocalInputs};
pub use orchestrator::{Backends, BuildOutcome, BuildRequest, PipelineOrchestrator, MANIFEST_FILE};
pub use region::RegionId;
pub use state::{Stage, StageTracker};
pub use summary::{pretty_duration, Omission, RunSummary};

//! Raster derivation: per-tile slope/hillshade, mosaics and coverage
//!
//! Derived rasters are always computed per elevation tile and then stitched,
//! never derived from the finished mosaic, so tile seams carry no edge
//! artifacts and fragments can be cached per tile.

mod coverage;
mod derive;
mod mosaic;

pub use coverage::CoverageReport;
pub use derive::TileFragment;
pub use mosaic::{MosaicOutcome, TopographyOutcome, TopographyRequest};

use crate::cache::ArtifactStore;
use crate::ops::RasterOps;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Produces derived rasters through a [`RasterOps`] backend
#[derive(Clone)]
pub struct RasterDerivationEngine {
    ops: Arc<dyn RasterOps>,
    store: ArtifactStore,
    workers: usize,
    cancel: CancellationToken,
}

impl RasterDerivationEngine {
    pub fn new(
        ops: Arc<dyn RasterOps>,
        store: ArtifactStore,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ops,
            store,
            workers: workers.max(1),
            cancel,
        }
    }

    pub fn ops(&self) -> &Arc<dyn RasterOps> {
        &self.ops
    }
}

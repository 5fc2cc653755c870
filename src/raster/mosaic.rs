use super::RasterDerivationEngine;
use crate::cache::{commit, staging_path, write_stamp, RebuildDecision, RebuildReason};
use crate::error::{BasinError, BasinResult};
use crate::ops::{DerivedKind, WarpSpec};
use std::path::{Path, PathBuf};
use tracing::info;

/// Whether a mosaic was rebuilt or reused, and why
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicOutcome {
    pub name: String,
    pub path: PathBuf,
    pub rebuilt: Option<RebuildReason>,
}

impl MosaicOutcome {
    pub fn was_rebuilt(&self) -> bool {
        self.rebuilt.is_some()
    }
}

/// Inputs for the elevation, slope and hillshade mosaics of one region
#[derive(Debug, Clone)]
pub struct TopographyRequest {
    pub tiles: Vec<PathBuf>,
    /// Clip polygon, reference system and seam blend
    pub spec: WarpSpec,
    /// Digest of the clip boundary, a change forces every mosaic to rebuild
    pub boundary_digest: String,
    pub dem: PathBuf,
    pub slope: PathBuf,
    pub hillshade: PathBuf,
    /// Parent of the per-kind fragment directories
    pub fragments_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TopographyOutcome {
    pub dem: MosaicOutcome,
    pub slope: MosaicOutcome,
    pub hillshade: MosaicOutcome,
}

impl TopographyOutcome {
    /// Number of raster computations performed (mosaics only)
    pub fn rebuilt_count(&self) -> usize {
        [&self.dem, &self.slope, &self.hillshade]
            .iter()
            .filter(|m| m.was_rebuilt())
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Mosaic,
    Warp,
}

impl RasterDerivationEngine {
    /// Build `output` from `inputs` unless it is already current
    ///
    /// The mosaic is rebuilt when forced, missing, older than any input,
    /// built against a different boundary, or when `upstream` reports a
    /// rebuilt dependency. Otherwise the file is kept and the skip is logged.
    pub async fn build_mosaic(
        &self,
        name: &str,
        inputs: &[PathBuf],
        output: &Path,
        spec: &WarpSpec,
        boundary_digest: &str,
        upstream: Option<&str>,
    ) -> BasinResult<MosaicOutcome> {
        self.build(Method::Mosaic, name, inputs, output, spec, boundary_digest, upstream)
            .await
    }

    /// Reproject and clip one raster, with the same reuse rules as a mosaic
    pub async fn build_warp(
        &self,
        name: &str,
        input: &Path,
        output: &Path,
        spec: &WarpSpec,
        boundary_digest: &str,
    ) -> BasinResult<MosaicOutcome> {
        self.build(
            Method::Warp,
            name,
            &[input.to_path_buf()],
            output,
            spec,
            boundary_digest,
            None,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn build(
        &self,
        method: Method,
        name: &str,
        inputs: &[PathBuf],
        output: &Path,
        spec: &WarpSpec,
        boundary_digest: &str,
        upstream: Option<&str>,
    ) -> BasinResult<MosaicOutcome> {
        let mut decision = self.store.decide_stamped(output, inputs, boundary_digest);
        if let Some(upstream) = upstream {
            decision = decision.or_upstream(true, upstream);
        }

        let reason = match decision {
            RebuildDecision::Reuse => {
                info!("Skipping {} build because nothing has changed", name);
                return Ok(MosaicOutcome {
                    name: name.to_string(),
                    path: output.to_path_buf(),
                    rebuilt: None,
                });
            }
            RebuildDecision::Rebuild(reason) => reason,
        };

        let Some(first) = inputs.first() else {
            return Err(BasinError::derivation(name, "no input rasters"));
        };
        if self.cancel.is_cancelled() {
            return Err(BasinError::Cancelled);
        }

        info!("Building {} from {} rasters ({})", name, inputs.len(), reason);
        let staging = staging_path(output);
        let produced = match method {
            Method::Mosaic => self.ops.mosaic(inputs, &staging, spec).await,
            Method::Warp => self.ops.warp(first, &staging, spec).await,
        };
        if let Err(e) = produced {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(BasinError::derivation(name, e.to_string()));
        }
        commit(&staging, output).await?;
        write_stamp(output, boundary_digest).await?;

        Ok(MosaicOutcome {
            name: name.to_string(),
            path: output.to_path_buf(),
            rebuilt: Some(reason),
        })
    }

    /// Elevation mosaic, then per-tile slope and hillshade stitched the same way
    pub async fn build_topography(&self, request: &TopographyRequest) -> BasinResult<TopographyOutcome> {
        let dem = self
            .build_mosaic(
                "DEM",
                &request.tiles,
                &request.dem,
                &request.spec,
                &request.boundary_digest,
                None,
            )
            .await?;

        let mut derived = Vec::with_capacity(2);
        for (kind, output) in [
            (DerivedKind::Slope, &request.slope),
            (DerivedKind::Hillshade, &request.hillshade),
        ] {
            let dir = request.fragments_root.join(kind.mode());
            let fragments = self.derive_tiles(&request.tiles, kind, &dir).await?;
            let parts: Vec<PathBuf> = fragments.iter().map(|f| f.path.clone()).collect();

            let upstream = if dem.was_rebuilt() {
                Some("DEM")
            } else if fragments.iter().any(|f| f.rebuilt) {
                Some("tile fragments")
            } else {
                None
            };
            let name = match kind {
                DerivedKind::Slope => "slope",
                DerivedKind::Hillshade => "hillshade",
            };
            let outcome = self
                .build_mosaic(name, &parts, output, &request.spec, &request.boundary_digest, upstream)
                .await?;
            derived.push(outcome);
        }

        let hillshade = derived.pop().ok_or_else(|| BasinError::Internal("hillshade missing".into()))?;
        let slope = derived.pop().ok_or_else(|| BasinError::Internal("slope missing".into()))?;
        Ok(TopographyOutcome {
            dem,
            slope,
            hillshade,
        })
    }
}

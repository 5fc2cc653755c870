use super::RasterDerivationEngine;
use crate::error::{BasinError, BasinResult};
use std::path::Path;
use tracing::{info, warn};

/// Result of comparing a raster's footprint with the expected area
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    pub artifact: String,
    pub ratio: f64,
    pub threshold: f64,
}

impl CoverageReport {
    pub fn is_shortfall(&self) -> bool {
        self.ratio < self.threshold
    }

    /// The shortfall as an error value, for the run summary
    pub fn shortfall(&self) -> Option<BasinError> {
        self.is_shortfall().then(|| BasinError::CoverageShortfall {
            artifact: self.artifact.clone(),
            ratio: self.ratio,
            threshold: self.threshold,
        })
    }
}

impl RasterDerivationEngine {
    /// Compare the valid area of `raster` against `expected_area`
    ///
    /// Both areas must be in the same units. A shortfall is logged as a
    /// warning, never returned as an error: partial coverage along
    /// boundary edges is normal.
    pub async fn verify_coverage(
        &self,
        artifact: &str,
        raster: &Path,
        expected_area: f64,
        threshold: f64,
    ) -> BasinResult<CoverageReport> {
        let covered = self.ops.valid_area(raster).await?;
        let ratio = if expected_area > 0.0 {
            (covered / expected_area).min(1.0)
        } else {
            1.0
        };

        let report = CoverageReport {
            artifact: artifact.to_string(),
            ratio,
            threshold,
        };
        if report.is_shortfall() {
            warn!(
                "{} covers only {:.0}% of the watershed (expected at least {:.0}%)",
                artifact,
                ratio * 100.0,
                threshold * 100.0
            );
        } else {
            info!("{} covers {:.0}% of the watershed", artifact, ratio * 100.0);
        }
        Ok(report)
    }
}

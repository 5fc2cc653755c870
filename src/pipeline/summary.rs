use std::time::Duration;
use tracing::{info, warn};

/// A dataset left out of the project and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Omission {
    pub dataset: String,
    pub reason: String,
}

/// What a run produced, reused and skipped
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Datasets recorded in the manifest
    pub recorded: Vec<String>,
    pub omitted: Vec<Omission>,
    pub warnings: Vec<String>,
    /// Cache entries downloaded during this run
    pub downloaded: usize,
    /// Cache entries served without network I/O
    pub cached: usize,
    /// Raster builds performed (mosaics and warps)
    pub rebuilt: usize,
    /// Raster builds skipped because nothing changed
    pub reused: usize,
    pub elapsed: Option<Duration>,
}

impl RunSummary {
    /// Record and log an omitted dataset
    pub fn omit(&mut self, dataset: impl Into<String>, reason: impl Into<String>) {
        let omission = Omission {
            dataset: dataset.into(),
            reason: reason.into(),
        };
        warn!(dataset = %omission.dataset, "Omitted: {}", omission.reason);
        self.omitted.push(omission);
    }

    /// Record and log a non-fatal warning
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn record(&mut self, dataset: impl Into<String>) {
        self.recorded.push(dataset.into());
    }

    pub fn is_omitted(&self, dataset: &str) -> bool {
        self.omitted.iter().any(|o| o.dataset == dataset)
    }

    /// Log everything that was skipped, for the record before exiting
    pub fn log(&self) {
        info!(
            recorded = self.recorded.len(),
            downloaded = self.downloaded,
            cached = self.cached,
            rebuilt = self.rebuilt,
            reused = self.reused,
            "Run summary"
        );
        for omission in &self.omitted {
            warn!("Skipped {}: {}", omission.dataset, omission.reason);
        }
        for warning in &self.warnings {
            warn!("{}", warning);
        }
    }
}

/// Human readable duration, e.g. `1h 02m 05s`
pub fn pretty_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.1}s", seconds.max(0.0));
    }
    let total = seconds.round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, secs)
    } else {
        format!("{}m {:02}s", minutes, secs)
    }
}

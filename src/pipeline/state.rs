use crate::error::{BasinError, BasinResult};
use std::fmt;
use tracing::debug;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    SourcesFetched,
    DerivedArtifactsReady,
    VectorLayersPrepared,
    Segmented,
    ManifestWritten,
    Done,
    Failed,
}

impl Stage {
    /// The only stage allowed to follow this one
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Init => Some(Self::SourcesFetched),
            Self::SourcesFetched => Some(Self::DerivedArtifactsReady),
            Self::DerivedArtifactsReady => Some(Self::VectorLayersPrepared),
            Self::VectorLayersPrepared => Some(Self::Segmented),
            Self::Segmented => Some(Self::ManifestWritten),
            Self::ManifestWritten => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::SourcesFetched => "sources fetched",
            Self::DerivedArtifactsReady => "derived artifacts ready",
            Self::VectorLayersPrepared => "vector layers prepared",
            Self::Segmented => "segmented",
            Self::ManifestWritten => "manifest written",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Enforces strictly sequential stage transitions
#[derive(Debug)]
pub struct StageTracker {
    current: Stage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self { current: Stage::Init }
    }
}

impl StageTracker {
    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn advance(&mut self, to: Stage) -> BasinResult<()> {
        if self.current.next() != Some(to) {
            return Err(BasinError::Internal(format!(
                "cannot move from stage '{}' to '{}'",
                self.current, to
            )));
        }
        debug!("Stage: {} -> {}", self.current, to);
        self.current = to;
        Ok(())
    }

    /// Any non-terminal stage may fail
    pub fn fail(&mut self) {
        if !self.current.is_terminal() {
            debug!("Stage: {} -> failed", self.current);
            self.current = Stage::Failed;
        }
    }
}

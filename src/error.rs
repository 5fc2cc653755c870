//! Error types for basin
//!
//! All modules use `BasinResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for basin operations
pub type BasinResult<T> = Result<T, BasinError>;

/// All errors that can occur in basin
#[derive(Error, Debug)]
pub enum BasinError {
    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Source errors
    #[error("Source {source_key} for region {region} is incomplete: missing {missing}")]
    SourceIncomplete {
        source_key: String,
        region: String,
        missing: String,
    },

    #[error("Remote file not found: {url}")]
    RemoteNotFound { url: String },

    #[error("HTTP error fetching {url}: {reason}")]
    Http {
        url: String,
        reason: String,
        transient: bool,
    },

    // Derivation errors
    #[error(
        "{artifact} covers {:.0}% of the expected area (threshold {:.0}%)",
        .ratio * 100.0,
        .threshold * 100.0
    )]
    CoverageShortfall {
        artifact: String,
        ratio: f64,
        threshold: f64,
    },

    #[error("Failed to derive {artifact}: {reason}")]
    DerivationFailure { artifact: String, reason: String },

    // Manifest errors
    #[error("Manifest inconsistency: {0}")]
    ManifestInconsistency(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    #[error("Run cancelled")]
    Cancelled,

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl BasinError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a derivation failure for a named artifact
    pub fn derivation(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DerivationFailure {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// Only transient network failures qualify. Domain operations are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http { transient: true, .. })
    }

    /// Whether the pipeline may convert this error into an omitted optional dataset
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SourceIncomplete { .. }
                | Self::RemoteNotFound { .. }
                | Self::Http { .. }
                | Self::DerivationFailure { .. }
                | Self::CommandExecution { .. }
                | Self::PathNotFound(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidInput(_) => Some("Region identifiers are 4, 8, 10 or 12 digit watershed codes"),
            Self::CommandFailed { .. } => Some("Is GDAL installed? basin needs gdalwarp, gdaldem and ogr2ogr on PATH"),
            Self::Http { transient: true, .. } => Some("Upstream service may be busy, re-run later; cached downloads are kept"),
            Self::ManifestInconsistency(_) => Some("This is a bug; please report it with the run log"),
            _ => None,
        }
    }
}

//! Configuration schema for basin
//!
//! Configuration is stored at `~/.config/basin/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Upstream source locations
    pub sources: SourcesConfig,

    /// Default paths for locally held national collections
    pub inputs: InputsConfig,

    /// Spatial processing parameters
    pub processing: ProcessingConfig,

    /// Download behavior
    pub fetch: FetchConfig,

    /// Download cache settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Optional JSON file with extra layer descriptions
    pub layer_descriptions: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            layer_descriptions: None,
        }
    }
}

/// URL templates for the remote sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Hydrography archive per four digit unit, `{huc4}` is substituted
    pub hydrography_url: String,

    /// Transportation archive per state, `{state}` is substituted
    pub transportation_url: String,

    /// Elevation tile, `{tile}` is substituted (e.g. n45w122)
    pub elevation_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            hydrography_url: "https://prd-tnm.s3.amazonaws.com/StagedProducts/Hydrography/NHDPlusHR/Beta/GDB/NHDPLUS_H_{huc4}_HU4_GDB.zip".to_string(),
            transportation_url: "https://prd-tnm.s3.amazonaws.com/StagedProducts/Tran/Shape/TRAN_{state}_State_Shape.zip".to_string(),
            elevation_url: "https://prd-tnm.s3.amazonaws.com/StagedProducts/Elevation/13/TIFF/current/{tile}/USGS_13_{tile}.tif".to_string(),
        }
    }
}

/// Default locations for local collections
///
/// Anything left unset is treated as an absent optional input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    pub landfire_dir: Option<PathBuf>,
    pub ownership: Option<PathBuf>,
    pub fair_market: Option<PathBuf>,
    pub ecoregions: Option<PathBuf>,
    pub states: Option<PathBuf>,
    pub counties: Option<PathBuf>,
    pub geology: Option<PathBuf>,
    pub climate_dir: Option<PathBuf>,
}

/// Spatial processing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// EPSG code of every output layer
    pub output_epsg: u32,

    /// Projected EPSG code used for length-based segmentation
    pub segmentation_epsg: u32,

    /// Minimum covered fraction of the boundary before a shortfall warning
    pub coverage_threshold: f64,

    /// Cutline blend distance in pixels used when warping
    pub cutline_blend: u32,

    /// Buffer around the boundary used to clip national vector layers (meters)
    pub national_buffer_m: f64,

    /// Fixed network buffer used for channel area preparation (meters)
    pub channel_buffer_m: f64,

    /// Feature codes retained for flow areas (empty keeps everything)
    pub flowarea_codes: Vec<String>,

    /// Feature codes retained for waterbodies (empty keeps everything)
    pub waterbody_codes: Vec<String>,

    /// Segmentation lengths
    pub segmentation: SegmentationConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            output_epsg: 4326,
            segmentation_epsg: 5070,
            coverage_threshold: 0.85,
            cutline_blend: 1,
            national_buffer_m: 10_000.0,
            channel_buffer_m: 5.0,
            flowarea_codes: vec![],
            waterbody_codes: vec!["39004".to_string(), "39009".to_string(), "39010".to_string()],
            segmentation: SegmentationConfig::default(),
        }
    }
}

/// Segment length bounds (meters)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub max_length_m: f64,
    pub min_length_m: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_length_m: 300.0,
            min_length_m: 50.0,
        }
    }
}

/// Download behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Worker pool size for downloads and per-tile derivation
    pub workers: usize,

    /// Retries for transient network failures
    pub retries: u32,

    /// Initial backoff between retries, doubled each attempt
    pub retry_backoff_ms: u64,

    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            retries: 3,
            retry_backoff_ms: 500,
            timeout_secs: 600,
        }
    }
}

/// Download cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory (defaults to the platform cache dir)
    pub dir: Option<PathBuf>,

    /// Remove entries older than N days on `cache gc` (0 = disabled)
    pub gc_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            gc_days: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[processing]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.processing.output_epsg, 4326);
        assert_eq!(config.processing.coverage_threshold, 0.85);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [processing.segmentation]
            max_length_m = 500.0

            [fetch]
            workers = 8
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.processing.segmentation.max_length_m, 500.0);
        assert_eq!(config.processing.segmentation.min_length_m, 50.0); // default preserved
        assert_eq!(config.fetch.workers, 8);
        assert_eq!(config.fetch.retries, 3);
    }
}

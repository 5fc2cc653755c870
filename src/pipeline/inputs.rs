//! Run inputs: local collections, metadata pairs and fixed file names

use crate::config::schema::InputsConfig;
use crate::error::{BasinError, BasinResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Vegetation rasters expected in the landfire directory, with their dataset ids
pub const VEGETATION: [(&str, &str); 10] = [
    ("LC20_EVT_220.tif", "EXVEG"),
    ("LC20_BPS_220.tif", "HISTVEG"),
    ("LC22_EVC_220.tif", "VEGCOVER"),
    ("LC22_EVH_220.tif", "VEGHEIGHT"),
    ("LC20_HDst_220.tif", "HDIST"),
    ("LC22_FDst_220.tif", "FDIST"),
    ("LC22_FCCS_220.tif", "FCCS"),
    ("LC20_VCC_220.tif", "VEGCONDITION"),
    ("LC20_VDep_220.tif", "VEGDEPARTURE"),
    ("LC20_SCla_220.tif", "SCLASS"),
];

/// Climate variables matched against `*.bil` file names, with their dataset ids
pub const CLIMATE: [(&str, &str); 7] = [
    ("PPT", "Precip"),
    ("TMEAN", "MeanTemp"),
    ("TMIN", "MinTemp"),
    ("TMAX", "MaxTemp"),
    ("TDMEAN", "MeanDew"),
    ("VPDMIN", "MinVap"),
    ("VPDMAX", "MaxVap"),
];

/// Locally held collections; every one is optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalInputs {
    pub landfire_dir: Option<PathBuf>,
    pub ownership: Option<PathBuf>,
    pub fair_market: Option<PathBuf>,
    pub ecoregions: Option<PathBuf>,
    pub states: Option<PathBuf>,
    pub counties: Option<PathBuf>,
    pub geology: Option<PathBuf>,
    pub climate_dir: Option<PathBuf>,
}

impl LocalInputs {
    /// Fill anything not given explicitly from the config defaults
    pub fn or_config(self, config: &InputsConfig) -> Self {
        Self {
            landfire_dir: self.landfire_dir.or_else(|| config.landfire_dir.clone()),
            ownership: self.ownership.or_else(|| config.ownership.clone()),
            fair_market: self.fair_market.or_else(|| config.fair_market.clone()),
            ecoregions: self.ecoregions.or_else(|| config.ecoregions.clone()),
            states: self.states.or_else(|| config.states.clone()),
            counties: self.counties.or_else(|| config.counties.clone()),
            geology: self.geology.or_else(|| config.geology.clone()),
            climate_dir: self.climate_dir.or_else(|| config.climate_dir.clone()),
        }
    }

    /// Vegetation rasters by dataset id; `None` where the file is absent
    pub fn vegetation(&self) -> Vec<(&'static str, Option<PathBuf>)> {
        VEGETATION
            .iter()
            .map(|(file, id)| {
                let path = self
                    .landfire_dir
                    .as_ref()
                    .map(|dir| dir.join(file))
                    .filter(|p| p.is_file());
                (*id, path)
            })
            .collect()
    }
}

/// Locate each climate variable among the `*.bil` files in `dir`
///
/// Matching is a case-insensitive substring test on the file name; the
/// first file in name order wins. Variables without a match map to `None`.
pub async fn find_climate(dir: Option<&Path>) -> BasinResult<Vec<(&'static str, Option<PathBuf>)>> {
    let mut bil_files = Vec::new();
    if let Some(dir) = dir.filter(|d| d.is_dir()) {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| BasinError::io(format!("reading {}", dir.display()), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BasinError::io(format!("reading {}", dir.display()), e))?
        {
            let path = entry.path();
            let is_bil = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("bil"))
                .unwrap_or(false);
            if is_bil {
                bil_files.push(path);
            }
        }
        bil_files.sort();
        debug!("Found {} climate rasters in {}", bil_files.len(), dir.display());
    }

    Ok(CLIMATE
        .iter()
        .map(|(variable, id)| {
            let needle = variable.to_lowercase();
            let found = bil_files
                .iter()
                .find(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
                .cloned();
            (*id, found)
        })
        .collect())
}

/// Parse `key=value,key=value` metadata pairs
pub fn parse_meta(raw: &str) -> BasinResult<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(BasinError::InvalidInput(format!(
                "Invalid metadata \"{}\": expected key=value",
                pair
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn meta_pairs() {
        let pairs = parse_meta("Operator=ci, Run = 7").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("Operator".to_string(), "ci".to_string()),
                ("Run".to_string(), "7".to_string())
            ]
        );
        assert!(parse_meta("broken").is_err());
        assert!(parse_meta("=value").is_err());
        assert!(parse_meta("").unwrap().is_empty());
    }

    #[test]
    fn explicit_inputs_win_over_config() {
        let explicit = LocalInputs {
            geology: Some(PathBuf::from("/data/geology.shp")),
            ..Default::default()
        };
        let config = InputsConfig {
            geology: Some(PathBuf::from("/config/geology.shp")),
            states: Some(PathBuf::from("/config/states.shp")),
            ..Default::default()
        };
        let merged = explicit.or_config(&config);
        assert_eq!(merged.geology, Some(PathBuf::from("/data/geology.shp")));
        assert_eq!(merged.states, Some(PathBuf::from("/config/states.shp")));
    }

    #[tokio::test]
    async fn climate_matches_case_insensitively() {
        let temp = TempDir::new().unwrap();
        for name in ["PRISM_ppt_30yr.bil", "prism_TMEAN_30yr.BIL", "prism_tmin_30yr.hdr"] {
            std::fs::write(temp.path().join(name), b"x").unwrap();
        }
        let found = find_climate(Some(temp.path())).await.unwrap();
        assert_eq!(found.len(), 7);
        assert!(found[0].1.as_ref().unwrap().ends_with("PRISM_ppt_30yr.bil"));
        assert!(found[1].1.is_some());
        assert!(found[2].1.is_none(), "only .bil files are considered");

        let none = find_climate(None).await.unwrap();
        assert!(none.iter().all(|(_, p)| p.is_none()));
    }

    #[test]
    fn vegetation_skips_missing_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("LC20_EVT_220.tif"), b"x").unwrap();
        let inputs = LocalInputs {
            landfire_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let veg = inputs.vegetation();
        assert_eq!(veg[0].0, "EXVEG");
        assert!(veg[0].1.is_some());
        assert!(veg[1].1.is_none());
    }
}

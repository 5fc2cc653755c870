//! Hydrography package: layer copies, watershed boundary, clip shapes,
//! the flowline attribute table and the channel area

use super::prepare::{present, FeatureFilter, VectorPreparationStage};
use crate::error::{BasinError, BasinResult};
use crate::ops::{geojson, CopyOptions, LayerRef};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Flowlines, clipped to the boundary
pub const FLOWLINE: &str = "NHDFlowline";
pub const FLOW_AREA: &str = "NHDArea";
pub const WATERBODY: &str = "NHDWaterbody";
pub const CATCHMENT: &str = "NHDPlusCatchment";
pub const VAA_TABLE: &str = "NHDPlusFlowlineVAA";
pub const BUFFERED_100: &str = "buffered_clip100m";
pub const BUFFERED_500: &str = "buffered_clip500m";
pub const CHANNEL_AREA: &str = "channel_area";
/// Elevation tile footprints clipped to the boundary
pub const PROCESSING_EXTENT: &str = "processing_extent";

/// Watershed boundary layers carried into the package unfiltered
pub const WBD_LAYERS: [&str; 6] = ["WBDHU2", "WBDHU4", "WBDHU6", "WBDHU8", "WBDHU10", "WBDHU12"];

/// Fields and values identifying one watershed
#[derive(Debug, Clone)]
pub struct WatershedSelector {
    /// Boundary layer, e.g. `WBDHU10`
    pub layer: String,
    /// Attribute holding the code, e.g. `HUC10`
    pub field: String,
    pub code: String,
    /// Reach code prefix for the flowline table
    pub reach_prefix: String,
}

/// What ended up in the hydrology package
#[derive(Debug, Clone)]
pub struct HydrologyLayers {
    pub gpkg: PathBuf,
    pub boundary: LayerRef,
    pub buffered_100: LayerRef,
    pub buffered_500: LayerRef,
    /// Every copied feature layer
    pub layers: Vec<String>,
    pub vaa: Option<LayerRef>,
    /// Boundary `Name` attribute
    pub watershed_name: Option<String>,
    /// Boundary `States` attribute
    pub states: Option<String>,
    /// Layers that could not be copied, with the reason
    pub skipped: Vec<(String, String)>,
}

impl HydrologyLayers {
    pub fn layer(&self, name: &str) -> Option<LayerRef> {
        self.layers
            .iter()
            .any(|l| l == name)
            .then(|| LayerRef::layer(&self.gpkg, name))
    }
}

/// Parameters for the channel area composition
#[derive(Debug, Clone)]
pub struct ChannelAreaInputs {
    pub network: Option<LayerRef>,
    pub flow_areas: Option<LayerRef>,
    pub waterbodies: Option<LayerRef>,
    pub flow_area_filter: Option<FeatureFilter>,
    pub waterbody_filter: Option<FeatureFilter>,
    pub network_buffer_m: f64,
}

impl VectorPreparationStage {
    /// Copy the hydrography geodatabase into `gpkg`
    ///
    /// The boundary and flowlines are required. Other layers that fail to
    /// copy are recorded in `skipped`.
    pub async fn copy_hydrology(
        &self,
        gdb: &Path,
        gpkg: &Path,
        selector: &WatershedSelector,
    ) -> BasinResult<HydrologyLayers> {
        let src = |name: &str| LayerRef::layer(gdb, name);
        let dst = |name: &str| LayerRef::layer(gpkg, name);

        let boundary = dst(&selector.layer);
        let boundary_filter = FeatureFilter::new(&selector.field, &[selector.code.clone()]);
        let options = CopyOptions {
            epsg: Some(self.epsg()),
            attribute_filter: boundary_filter.as_ref().map(FeatureFilter::where_clause),
            clip: None,
        };
        self.ops().copy(&src(&selector.layer), &boundary, &options).await?;

        let features = self.ops().read_features(&boundary, self.epsg()).await?;
        let Some(feature) = features.first() else {
            return Err(BasinError::InvalidInput(format!(
                "Watershed {} not found in {}",
                selector.code, selector.layer
            )));
        };
        let watershed_name = geojson::property_str(feature, "Name");
        let states = geojson::property_str(feature, "States");

        let mut layers = vec![selector.layer.clone()];
        let mut skipped = Vec::new();

        let clipped = CopyOptions {
            epsg: Some(self.epsg()),
            attribute_filter: None,
            clip: Some(boundary.clone()),
        };
        self.ops().copy(&src(FLOWLINE), &dst(FLOWLINE), &clipped).await?;
        layers.push(FLOWLINE.to_string());

        for name in [FLOW_AREA, WATERBODY, CATCHMENT] {
            match self.ops().copy(&src(name), &dst(name), &clipped).await {
                Ok(()) => layers.push(name.to_string()),
                Err(e) if e.is_recoverable() => {
                    debug!("Skipping hydrography layer {}: {}", name, e);
                    skipped.push((name.to_string(), e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        let whole = CopyOptions {
            epsg: Some(self.epsg()),
            ..Default::default()
        };
        for name in WBD_LAYERS.iter().filter(|l| **l != selector.layer) {
            match self.ops().copy(&src(name), &dst(name), &whole).await {
                Ok(()) => layers.push(name.to_string()),
                Err(e) if e.is_recoverable() => {
                    debug!("Skipping hydrography layer {}: {}", name, e);
                    skipped.push((name.to_string(), e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        let buffered_100 = self
            .buffer(Some(&boundary), 100.0, dst(BUFFERED_100))
            .await?
            .ok_or_else(|| BasinError::Internal("boundary vanished before buffering".into()))?;
        let buffered_500 = self
            .buffer(Some(&boundary), 500.0, dst(BUFFERED_500))
            .await?
            .ok_or_else(|| BasinError::Internal("boundary vanished before buffering".into()))?;

        let reach_filter = format!("ReachCode LIKE '{}%'", selector.reach_prefix);
        let vaa = match self
            .ops()
            .export_table(&src(VAA_TABLE), Some(&reach_filter), &dst(VAA_TABLE))
            .await
        {
            Ok(()) => Some(dst(VAA_TABLE)),
            Err(e) if e.is_recoverable() => {
                debug!("Skipping {} table: {}", VAA_TABLE, e);
                skipped.push((VAA_TABLE.to_string(), e.to_string()));
                None
            }
            Err(e) => return Err(e),
        };

        info!(
            "Hydrology package has {} layers for {} {}",
            layers.len(),
            selector.layer,
            selector.code
        );
        Ok(HydrologyLayers {
            gpkg: gpkg.to_path_buf(),
            boundary,
            buffered_100,
            buffered_500,
            layers,
            vaa,
            watershed_name,
            states,
            skipped,
        })
    }

    /// Channel area polygons
    ///
    /// Flow areas are filtered and their islands removed, waterbodies are
    /// filtered, and the two are merged into one water surface. The network
    /// buffer minus that surface, merged back with it, becomes the channel
    /// area. Any missing piece is skipped; with nothing at all the result
    /// is `None`.
    pub async fn channel_area(
        &self,
        inputs: &ChannelAreaInputs,
        work_gpkg: &Path,
        dst: LayerRef,
    ) -> BasinResult<Option<LayerRef>> {
        let work = |name: &str| LayerRef::layer(work_gpkg, name);

        let flow_areas = self
            .filter(
                inputs.flow_areas.as_ref(),
                inputs.flow_area_filter.as_ref(),
                work("flowarea_filtered"),
            )
            .await?;
        let flow_areas = self
            .remove_holes(flow_areas.as_ref(), work("flowarea_no_islands"))
            .await?;
        let waterbodies = self
            .filter(
                inputs.waterbodies.as_ref(),
                inputs.waterbody_filter.as_ref(),
                work("waterbody_filtered"),
            )
            .await?;

        let surface = self
            .merge(&[waterbodies, flow_areas], work("combined_fa_wb"))
            .await?;

        let network_buffer = self
            .buffer(
                present(inputs.network.as_ref()),
                inputs.network_buffer_m,
                work("network_buffer"),
            )
            .await?;

        let result = match (network_buffer, surface) {
            (Some(buffer), Some(surface)) => {
                let remainder = self
                    .difference(Some(&buffer), Some(&surface), work("difference_polygons"))
                    .await?;
                self.merge(&[remainder, Some(surface)], dst.clone()).await?
            }
            (Some(buffer), None) => Some(buffer),
            (None, Some(surface)) => Some(surface),
            (None, None) => {
                warn!("No channel polygons were produced");
                None
            }
        };

        self.materialize(result, dst).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::fake::FakeOps;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn selector() -> WatershedSelector {
        WatershedSelector {
            layer: "WBDHU10".to_string(),
            field: "HUC10".to_string(),
            code: "1701020301".to_string(),
            reach_prefix: "17010203".to_string(),
        }
    }

    fn boundary_feature() -> serde_json::Value {
        json!({
            "type": "Feature",
            "properties": {"HUC10": "1701020301", "Name": "Upper Example Creek", "States": "ID,MT"},
            "geometry": {"type": "Polygon", "coordinates": [[[-116.0, 48.0], [-115.5, 48.0], [-115.5, 48.4], [-116.0, 48.0]]]}
        })
    }

    #[tokio::test]
    async fn copies_package_and_reads_boundary_attributes() {
        let temp = TempDir::new().unwrap();
        let ops = Arc::new(FakeOps::default());
        ops.with_features("WBDHU10", vec![boundary_feature()]);
        ops.fail(CATCHMENT);
        let stage = VectorPreparationStage::new(ops.clone(), 4326);
        let gpkg = temp.path().join("hydrology").join("hydrology.gpkg");

        let layers = stage
            .copy_hydrology(&temp.path().join("x.gdb"), &gpkg, &selector())
            .await
            .unwrap();

        assert_eq!(layers.watershed_name.as_deref(), Some("Upper Example Creek"));
        assert_eq!(layers.states.as_deref(), Some("ID,MT"));
        assert!(layers.layer(FLOWLINE).is_some());
        assert!(layers.layer(CATCHMENT).is_none());
        assert_eq!(layers.skipped.len(), 1);
        assert!(layers.vaa.is_some());
        assert_eq!(ops.count("buffer:"), 2);
    }

    #[tokio::test]
    async fn unknown_watershed_is_invalid_input() {
        let temp = TempDir::new().unwrap();
        let ops = Arc::new(FakeOps::default());
        let stage = VectorPreparationStage::new(ops, 4326);

        let err = stage
            .copy_hydrology(&temp.path().join("x.gdb"), &temp.path().join("h.gpkg"), &selector())
            .await
            .unwrap_err();
        assert!(matches!(err, BasinError::InvalidInput(_)));
    }

    fn existing(temp: &TempDir, name: &str) -> LayerRef {
        let path = temp.path().join(name);
        std::fs::write(&path, b"shp").unwrap();
        LayerRef::file(path)
    }

    #[tokio::test]
    async fn channel_area_full_sequence() {
        let temp = TempDir::new().unwrap();
        let ops = Arc::new(FakeOps::default());
        let stage = VectorPreparationStage::new(ops.clone(), 4326);
        let inputs = ChannelAreaInputs {
            network: Some(existing(&temp, "network.shp")),
            flow_areas: Some(existing(&temp, "area.shp")),
            waterbodies: Some(existing(&temp, "waterbody.shp")),
            flow_area_filter: None,
            waterbody_filter: FeatureFilter::new("FCode", &["39004".to_string()]),
            network_buffer_m: 5.0,
        };
        let dst = LayerRef::layer(temp.path().join("hydrology.gpkg"), CHANNEL_AREA);

        let out = stage
            .channel_area(&inputs, &temp.path().join("work.gpkg"), dst.clone())
            .await
            .unwrap();
        assert_eq!(out, Some(dst));
        assert_eq!(ops.count("difference:"), 1);
        assert_eq!(ops.count("merge:"), 2);
    }

    #[tokio::test]
    async fn channel_area_without_polygons_uses_buffer() {
        let temp = TempDir::new().unwrap();
        let ops = Arc::new(FakeOps::default());
        let stage = VectorPreparationStage::new(ops.clone(), 4326);
        let inputs = ChannelAreaInputs {
            network: Some(existing(&temp, "network.shp")),
            flow_areas: None,
            waterbodies: None,
            flow_area_filter: None,
            waterbody_filter: None,
            network_buffer_m: 5.0,
        };
        let dst = LayerRef::layer(temp.path().join("hydrology.gpkg"), CHANNEL_AREA);

        let out = stage
            .channel_area(&inputs, &temp.path().join("work.gpkg"), dst.clone())
            .await
            .unwrap();
        assert_eq!(out, Some(dst));
        assert_eq!(ops.count("difference:"), 0);
        assert_eq!(ops.count("merge:"), 0);
        assert_eq!(ops.count("copy:channel_area"), 1);
    }

    #[tokio::test]
    async fn channel_area_with_nothing_is_none() {
        let temp = TempDir::new().unwrap();
        let ops = Arc::new(FakeOps::default());
        let stage = VectorPreparationStage::new(ops, 4326);
        let inputs = ChannelAreaInputs {
            network: None,
            flow_areas: None,
            waterbodies: None,
            flow_area_filter: None,
            waterbody_filter: None,
            network_buffer_m: 5.0,
        };
        let out = stage
            .channel_area(&inputs, &temp.path().join("work.gpkg"), LayerRef::layer(temp.path().join("h.gpkg"), CHANNEL_AREA))
            .await
            .unwrap();
        assert!(out.is_none());
    }
}

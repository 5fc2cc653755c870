//! External geospatial operations
//!
//! Raster warping/mosaicking and vector clip/buffer/difference are delegated
//! to GDAL. The pipeline only sees the [`RasterOps`] and [`GeometryOps`]
//! traits, so the command-line backend can be swapped for a fake in tests.

pub mod gdal;
pub mod geojson;
mod process;

#[cfg(test)]
pub(crate) mod fake;

pub use gdal::GdalCli;
pub(crate) use process::run as run_program;

use crate::error::BasinResult;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// A vector layer: a file, optionally naming one layer inside it
/// (geopackage table, file geodatabase feature class)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerRef {
    pub path: PathBuf,
    pub layer: Option<String>,
}

impl LayerRef {
    /// A single-layer file such as a shapefile
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            layer: None,
        }
    }

    /// A named layer inside a container
    pub fn layer(path: impl Into<PathBuf>, layer: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            layer: Some(layer.into()),
        }
    }

    /// Layer name, falling back to the file stem
    pub fn name(&self) -> String {
        match &self.layer {
            Some(layer) => layer.clone(),
            None => self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Whether the backing file (not necessarily the layer) exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl fmt::Display for LayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.layer {
            Some(layer) => write!(f, "{}/{}", self.path.display(), layer),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// Per-tile derived raster kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedKind {
    Slope,
    Hillshade,
}

impl DerivedKind {
    pub const ALL: [DerivedKind; 2] = [DerivedKind::Slope, DerivedKind::Hillshade];

    /// Prefix of per-tile fragment file names
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Slope => "SLOPE",
            Self::Hillshade => "HS",
        }
    }

    /// gdaldem mode
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Slope => "slope",
            Self::Hillshade => "hillshade",
        }
    }

    /// Fragment file name for a tile: `SLOPE__n45w122.tif`
    pub fn fragment_name(&self, tile: &Path) -> String {
        let stem = tile
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = stem.split('.').next().unwrap_or_default();
        format!("{}__{}.tif", self.prefix(), stem)
    }
}

impl fmt::Display for DerivedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode())
    }
}

/// Target of a raster warp
#[derive(Debug, Clone)]
pub struct WarpSpec {
    pub epsg: u32,
    /// Polygon layer to clip to (cutline)
    pub clip: Option<LayerRef>,
    /// Seam blend distance in pixels
    pub cutline_blend: u32,
}

/// Options for copying a vector layer
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub epsg: Option<u32>,
    /// SQL where clause applied before writing
    pub attribute_filter: Option<String>,
    /// Polygon layer to clip features to
    pub clip: Option<LayerRef>,
}

/// Raster operations
#[async_trait]
pub trait RasterOps: Send + Sync {
    /// Compute a slope or hillshade raster for one elevation tile
    async fn derive(&self, kind: DerivedKind, tile: &Path, output: &Path) -> BasinResult<()>;

    /// Stitch tiles into one raster, reprojected and clipped per `spec`
    async fn mosaic(&self, tiles: &[PathBuf], output: &Path, spec: &WarpSpec) -> BasinResult<()>;

    /// Reproject and clip a single raster
    async fn warp(&self, input: &Path, output: &Path, spec: &WarpSpec) -> BasinResult<()>;

    /// Area covered by valid (non-nodata) cells, in the raster's own units
    async fn valid_area(&self, raster: &Path) -> BasinResult<f64>;

    /// Write a polygon layer of the tile footprints
    async fn footprints(&self, tiles: &[PathBuf], output: &LayerRef, epsg: u32) -> BasinResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// Vector operations
#[async_trait]
pub trait GeometryOps: Send + Sync {
    /// Copy a layer, optionally filtering, clipping and reprojecting it
    async fn copy(&self, src: &LayerRef, dst: &LayerRef, options: &CopyOptions) -> BasinResult<()>;

    /// Append every input into one output layer
    async fn merge(&self, inputs: &[LayerRef], dst: &LayerRef, epsg: u32) -> BasinResult<()>;

    /// Features of `a` minus the union of `b`
    async fn difference(&self, a: &LayerRef, b: &LayerRef, dst: &LayerRef, epsg: u32) -> BasinResult<()>;

    /// Buffer every feature by a distance in meters
    async fn buffer(&self, src: &LayerRef, meters: f64, dst: &LayerRef, epsg: u32) -> BasinResult<()>;

    /// Keep features whose extent intersects the extent of `clip`
    async fn filter_intersecting(
        &self,
        src: &LayerRef,
        clip: &LayerRef,
        dst: &LayerRef,
        epsg: u32,
    ) -> BasinResult<()>;

    /// Export a non-spatial table, optionally filtered
    async fn export_table(&self, src: &LayerRef, filter: Option<&str>, dst: &LayerRef) -> BasinResult<()>;

    /// Read a layer as GeoJSON features in the given reference system
    async fn read_features(&self, src: &LayerRef, epsg: u32) -> BasinResult<Vec<Value>>;

    /// Write GeoJSON features (coordinates in `epsg`) to a layer
    async fn write_features(&self, features: Vec<Value>, dst: &LayerRef, epsg: u32) -> BasinResult<()>;

    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_names_follow_tile() {
        let tile = Path::new("/cache/elevation/n45w122/USGS_13_n45w122.tif");
        assert_eq!(DerivedKind::Slope.fragment_name(tile), "SLOPE__USGS_13_n45w122.tif");
        assert_eq!(DerivedKind::Hillshade.fragment_name(tile), "HS__USGS_13_n45w122.tif");
    }

    #[test]
    fn layer_name_falls_back_to_stem() {
        assert_eq!(LayerRef::file("/out/transportation/roads.shp").name(), "roads");
        assert_eq!(LayerRef::layer("/out/hydrology.gpkg", "network").name(), "network");
        assert_eq!(
            LayerRef::layer("/out/hydrology.gpkg", "network").to_string(),
            "/out/hydrology.gpkg/network"
        );
    }
}

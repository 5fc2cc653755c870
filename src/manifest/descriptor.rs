//! Static dataset registry
//!
//! Every dataset the pipeline can produce is declared here once, with its
//! id, label, category and path relative to the project root. Packages
//! list their layers as children whose path is the layer name.

use crate::error::{BasinError, BasinResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetCategory {
    Raster,
    Vector,
    Table,
    /// Multi-layer container (geopackage)
    Package,
}

impl fmt::Display for DatasetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Raster => "raster",
            Self::Vector => "vector",
            Self::Table => "table",
            Self::Package => "package",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub category: DatasetCategory,
    pub path: &'static str,
    pub children: &'static [DatasetDescriptor],
}

impl DatasetDescriptor {
    const fn new(id: &'static str, name: &'static str, category: DatasetCategory, path: &'static str) -> Self {
        Self {
            id,
            name,
            category,
            path,
            children: &[],
        }
    }

    const fn raster(id: &'static str, name: &'static str, path: &'static str) -> Self {
        Self::new(id, name, DatasetCategory::Raster, path)
    }

    const fn vector(id: &'static str, name: &'static str, path: &'static str) -> Self {
        Self::new(id, name, DatasetCategory::Vector, path)
    }

    pub fn child(&self, id: &str) -> Option<&'static DatasetDescriptor> {
        self.children.iter().find(|c| c.id == id)
    }

    /// File name of a raster or vector dataset, e.g. `existing_veg.tif`
    pub fn file_name(&self) -> &'static str {
        self.path.rsplit('/').next().unwrap_or(self.path)
    }
}

use DatasetCategory::{Package, Table, Vector};

const HYDROLOGY_LAYERS: &[DatasetDescriptor] = &[
    DatasetDescriptor::vector("NHDFlowline", "NHD Flowlines", "NHDFlowline"),
    DatasetDescriptor::vector("NHDArea", "NHD Area", "NHDArea"),
    DatasetDescriptor::vector("NHDWaterbody", "NHD Waterbody", "NHDWaterbody"),
    DatasetDescriptor::vector("NHDPlusCatchment", "NHD Plus Catchments", "NHDPlusCatchment"),
    DatasetDescriptor::vector("WBDHU2", "HUC2", "WBDHU2"),
    DatasetDescriptor::vector("WBDHU4", "HUC4", "WBDHU4"),
    DatasetDescriptor::vector("WBDHU6", "HUC6", "WBDHU6"),
    DatasetDescriptor::vector("WBDHU8", "HUC8", "WBDHU8"),
    DatasetDescriptor::vector("WBDHU10", "HUC10", "WBDHU10"),
    DatasetDescriptor::vector("WBDHU12", "HUC12", "WBDHU12"),
    DatasetDescriptor::vector("BUFFERED_CLIP100", "Buffered Clip Shape 100m", "buffered_clip100m"),
    DatasetDescriptor::vector("BUFFERED_CLIP500", "Buffered Clip Shape 500m", "buffered_clip500m"),
    DatasetDescriptor::vector("PROCESSING_EXTENT", "Processing Extent of HUC-DEM Intersection", "processing_extent"),
    DatasetDescriptor::vector("CHANNEL_AREA", "Channel Area Polygons", "channel_area"),
    DatasetDescriptor::vector("NETWORK_300M", "Segmented Flowlines 300m", "network_300m"),
    DatasetDescriptor::vector(
        "NETWORK_INTERSECTED",
        "Flowlines split at roads, rail and ownership",
        "network_intersected",
    ),
    DatasetDescriptor::vector(
        "NETWORK_INTERSECTED_300M",
        "Segmented Flowlines 300m, split at roads, rail and ownership",
        "network_intersected_300m",
    ),
    DatasetDescriptor::new("NHDPlusFlowlineVAA", "NHD Plus Flowline Value Added Attributes", Table, "NHDPlusFlowlineVAA"),
];

/// Every dataset the pipeline knows how to produce
pub static DATASETS: &[DatasetDescriptor] = &[
    DatasetDescriptor::raster("DEM", "NED 10m DEM", "topography/dem.tif"),
    DatasetDescriptor::raster("HILLSHADE", "DEM Hillshade", "topography/dem_hillshade.tif"),
    DatasetDescriptor::raster("SLOPE", "Slope", "topography/slope.tif"),
    DatasetDescriptor::raster("EXVEG", "Existing Vegetation", "vegetation/existing_veg.tif"),
    DatasetDescriptor::raster("HISTVEG", "Historic Vegetation", "vegetation/historic_veg.tif"),
    DatasetDescriptor::raster("VEGCOVER", "Vegetation Cover", "vegetation/veg_cover.tif"),
    DatasetDescriptor::raster("VEGHEIGHT", "Vegetation Height", "vegetation/veg_height.tif"),
    DatasetDescriptor::raster("HDIST", "Historic Disturbance", "vegetation/historic_disturbance.tif"),
    DatasetDescriptor::raster("FDIST", "Fuel Disturbance", "vegetation/fuel_disturbance.tif"),
    DatasetDescriptor::raster("FCCS", "Fuel Characteristic Classification System", "vegetation/fccs.tif"),
    DatasetDescriptor::raster("VEGCONDITION", "Vegetation Condition Class", "vegetation/vegetation_condition.tif"),
    DatasetDescriptor::raster("VEGDEPARTURE", "Vegetation Departure", "vegetation/vegetation_departure.tif"),
    DatasetDescriptor::raster("SCLASS", "Succession Classes", "vegetation/succession_classes.tif"),
    DatasetDescriptor::vector("OWNERSHIP", "Ownership", "ownership/ownership.shp"),
    DatasetDescriptor::raster("FAIR_MARKET", "Fair Market Land Value", "ownership/fair_market_value.tif"),
    DatasetDescriptor::vector("ECOREGIONS", "Ecoregions", "ecoregions/ecoregions.shp"),
    DatasetDescriptor::vector("STATES", "States", "political_boundaries/states.shp"),
    DatasetDescriptor::vector("COUNTIES", "Counties", "political_boundaries/counties.shp"),
    DatasetDescriptor::vector("GEOLOGY", "Geology", "geology/geology.shp"),
    DatasetDescriptor::vector("Roads", "Roads", "transportation/roads.shp"),
    DatasetDescriptor::vector("Rail", "Rail", "transportation/rail.shp"),
    DatasetDescriptor::vector("Trails", "Trails", "transportation/trails.shp"),
    DatasetDescriptor {
        id: "HYDROLOGY",
        name: "Hydrology",
        category: Package,
        path: "hydrology/hydrology.gpkg",
        children: HYDROLOGY_LAYERS,
    },
    DatasetDescriptor::raster("Precip", "Precipitation", "climate/precipitation.tif"),
    DatasetDescriptor::raster("MeanTemp", "Mean Temperature", "climate/mean_temp.tif"),
    DatasetDescriptor::raster("MinTemp", "Minimum Temperature", "climate/min_temp.tif"),
    DatasetDescriptor::raster("MaxTemp", "Maximum Temperature", "climate/max_temp.tif"),
    DatasetDescriptor::raster("MeanDew", "Mean Dew Point Temperature", "climate/mean_dew_temp.tif"),
    DatasetDescriptor::raster("MinVap", "Minimum Vapor Pressure Deficit", "climate/min_vapor_pressure.tif"),
    DatasetDescriptor::raster("MaxVap", "Maximum Vapor Pressure Deficit", "climate/max_vapor_pressure.tif"),
    DatasetDescriptor::new("PROJECT_BOUNDS", "Project Bounds", Vector, "project_bounds.geojson"),
];

/// Extra description metadata for a dataset id
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LayerDescription {
    pub description: String,
    pub source_url: String,
    pub product_version: String,
}

/// Validated view over the dataset table
#[derive(Debug, Clone)]
pub struct Registry {
    datasets: &'static [DatasetDescriptor],
    descriptions: HashMap<String, LayerDescription>,
}

impl Registry {
    /// The built-in table, validated
    pub fn builtin() -> BasinResult<Self> {
        Self::from_table(DATASETS)
    }

    pub fn from_table(datasets: &'static [DatasetDescriptor]) -> BasinResult<Self> {
        let mut ids = HashSet::new();
        let mut paths = HashSet::new();
        for top in datasets {
            for (descriptor, path) in Self::flatten(top) {
                if !ids.insert(descriptor.id) {
                    return Err(BasinError::ManifestInconsistency(format!(
                        "dataset id {} is declared twice",
                        descriptor.id
                    )));
                }
                if !paths.insert(path.clone()) {
                    return Err(BasinError::ManifestInconsistency(format!(
                        "dataset path {} is declared twice",
                        path
                    )));
                }
            }
        }
        Ok(Self {
            datasets,
            descriptions: HashMap::new(),
        })
    }

    fn flatten(top: &'static DatasetDescriptor) -> Vec<(&'static DatasetDescriptor, String)> {
        let mut out = vec![(top, top.path.to_string())];
        out.extend(
            top.children
                .iter()
                .map(|c| (c, format!("{}/{}", top.path, c.path))),
        );
        out
    }

    /// Load `id -> [description, source_url, product_version]` entries
    pub async fn with_descriptions(mut self, path: &Path) -> BasinResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BasinError::io(format!("reading layer descriptions {}", path.display()), e))?;
        let raw: HashMap<String, (String, String, String)> = serde_json::from_str(&content)?;
        for (id, (description, source_url, product_version)) in raw {
            if self.find(&id).is_none() {
                tracing::debug!("Ignoring description for unknown dataset {}", id);
                continue;
            }
            self.descriptions.insert(
                id,
                LayerDescription {
                    description,
                    source_url,
                    product_version,
                },
            );
        }
        Ok(self)
    }

    pub fn insert_description(&mut self, id: &str, description: LayerDescription) {
        self.descriptions.insert(id.to_string(), description);
    }

    pub fn description(&self, id: &str) -> Option<&LayerDescription> {
        self.descriptions.get(id)
    }

    /// Top-level datasets in declaration order
    pub fn datasets(&self) -> &'static [DatasetDescriptor] {
        self.datasets
    }

    /// A top-level dataset by id
    pub fn get(&self, id: &str) -> BasinResult<&'static DatasetDescriptor> {
        self.datasets
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| BasinError::Internal(format!("unknown dataset {}", id)))
    }

    /// Any dataset, top-level or child, by id
    pub fn find(&self, id: &str) -> Option<&'static DatasetDescriptor> {
        self.datasets
            .iter()
            .flat_map(Self::flatten)
            .map(|(d, _)| d)
            .find(|d| d.id == id)
    }
}

//! Sequencing of vector preparation steps
//!
//! Every step takes optional inputs and has a defined result for absent ones:
//! filtering or hole removal of nothing is nothing, merging a single input
//! passes it through unchanged, and subtracting nothing leaves the input as
//! is. Callers never need to catch errors to learn an input was missing.

use crate::error::BasinResult;
use crate::ops::geojson;
use crate::ops::{CopyOptions, GeometryOps, LayerRef};
use std::sync::Arc;
use tracing::{debug, info};

/// Attribute allow-list, e.g. feature codes kept from a layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFilter {
    pub field: String,
    pub values: Vec<String>,
}

impl FeatureFilter {
    pub fn new(field: impl Into<String>, values: &[String]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            field: field.into(),
            values: values.to_vec(),
        })
    }

    /// SQL where clause; numeric values are left unquoted
    pub fn where_clause(&self) -> String {
        let values: Vec<String> = self
            .values
            .iter()
            .map(|v| {
                if !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()) {
                    v.clone()
                } else {
                    format!("'{}'", v.replace('\'', "''"))
                }
            })
            .collect();
        format!("\"{}\" IN ({})", self.field, values.join(", "))
    }
}

/// Treats a layer whose file does not exist as absent
pub fn present(layer: Option<&LayerRef>) -> Option<&LayerRef> {
    layer.filter(|l| l.exists())
}

/// Sequences [`GeometryOps`] calls with pass-through rules for absent inputs
#[derive(Clone)]
pub struct VectorPreparationStage {
    ops: Arc<dyn GeometryOps>,
    epsg: u32,
}

impl VectorPreparationStage {
    pub fn new(ops: Arc<dyn GeometryOps>, epsg: u32) -> Self {
        Self { ops, epsg }
    }

    pub fn ops(&self) -> &Arc<dyn GeometryOps> {
        &self.ops
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Copy `src` into `dst`, keeping only features allowed by `filter`
    pub async fn filter(
        &self,
        src: Option<&LayerRef>,
        filter: Option<&FeatureFilter>,
        dst: LayerRef,
    ) -> BasinResult<Option<LayerRef>> {
        let Some(src) = present(src) else {
            debug!("No input for {}, skipping filter", dst);
            return Ok(None);
        };
        let options = CopyOptions {
            epsg: Some(self.epsg),
            attribute_filter: filter.map(FeatureFilter::where_clause),
            clip: None,
        };
        self.ops.copy(src, &dst, &options).await?;
        Ok(Some(dst))
    }

    /// Rewrite polygons without interior rings
    pub async fn remove_holes(&self, src: Option<&LayerRef>, dst: LayerRef) -> BasinResult<Option<LayerRef>> {
        let Some(src) = present(src) else {
            return Ok(None);
        };
        let features = self.ops.read_features(src, self.epsg).await?;
        let filled: Vec<_> = features.iter().map(geojson::without_holes).collect();
        self.ops.write_features(filled, &dst, self.epsg).await?;
        Ok(Some(dst))
    }

    /// Merge same-type layers
    ///
    /// No present input gives `None`, exactly one is returned unchanged,
    /// two or more are appended into `dst`.
    pub async fn merge(&self, inputs: &[Option<LayerRef>], dst: LayerRef) -> BasinResult<Option<LayerRef>> {
        let available: Vec<LayerRef> = inputs
            .iter()
            .filter_map(|l| present(l.as_ref()).cloned())
            .collect();
        match available.len() {
            0 => Ok(None),
            1 => {
                debug!("Only {} present, passing through", available[0]);
                Ok(available.into_iter().next())
            }
            _ => {
                self.ops.merge(&available, &dst, self.epsg).await?;
                Ok(Some(dst))
            }
        }
    }

    /// `a` minus `b`; without `b` the result is `a` itself
    pub async fn difference(
        &self,
        a: Option<&LayerRef>,
        b: Option<&LayerRef>,
        dst: LayerRef,
    ) -> BasinResult<Option<LayerRef>> {
        match (present(a), present(b)) {
            (None, _) => Ok(None),
            (Some(a), None) => Ok(Some(a.clone())),
            (Some(a), Some(b)) => {
                self.ops.difference(a, b, &dst, self.epsg).await?;
                Ok(Some(dst))
            }
        }
    }

    /// Buffer by a fixed distance in meters
    pub async fn buffer(&self, src: Option<&LayerRef>, meters: f64, dst: LayerRef) -> BasinResult<Option<LayerRef>> {
        let Some(src) = present(src) else {
            return Ok(None);
        };
        self.ops.buffer(src, meters, &dst, self.epsg).await?;
        Ok(Some(dst))
    }

    /// Make sure the result lives at `dst`, copying a passed-through layer
    pub async fn materialize(&self, layer: Option<LayerRef>, dst: LayerRef) -> BasinResult<Option<LayerRef>> {
        match layer {
            None => Ok(None),
            Some(layer) if layer == dst => Ok(Some(dst)),
            Some(layer) => {
                let options = CopyOptions {
                    epsg: Some(self.epsg),
                    ..Default::default()
                };
                self.ops.copy(&layer, &dst, &options).await?;
                Ok(Some(dst))
            }
        }
    }

    /// Filter every source, merge what exists and write the result to `dst`
    pub async fn prepare(
        &self,
        sources: &[Option<LayerRef>],
        filter: Option<&FeatureFilter>,
        work: &LayerRef,
        dst: LayerRef,
    ) -> BasinResult<Option<LayerRef>> {
        let mut filtered = Vec::with_capacity(sources.len());
        for (index, src) in sources.iter().enumerate() {
            let step = LayerRef::layer(&work.path, format!("{}_{}", work.name(), index));
            filtered.push(self.filter(src.as_ref(), filter, step).await?);
        }
        let merged = self.merge(&filtered, work.clone()).await?;
        let result = self.materialize(merged, dst).await?;
        match &result {
            Some(layer) => info!("Prepared {}", layer),
            None => info!("No inputs present for {}", work.name()),
        }
        Ok(result)
    }
}

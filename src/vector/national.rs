//! National datasets clipped to the watershed surroundings, and state
//! transportation layers merged into one layer per kind

use super::prepare::{present, VectorPreparationStage};
use crate::error::BasinResult;
use crate::fetch::TransportKind;
use crate::ops::{CopyOptions, LayerRef};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A transportation layer assembled from several states
#[derive(Debug, Clone)]
pub struct TransportLayer {
    pub kind: TransportKind,
    pub layer: LayerRef,
    /// States that contributed features
    pub states: Vec<String>,
}

impl VectorPreparationStage {
    /// Clip a national dataset to `clip` and write it to `dst`
    ///
    /// A dataset that is not configured or not on disk gives `None`.
    pub async fn clip_national(
        &self,
        src: Option<&Path>,
        clip: &LayerRef,
        dst: LayerRef,
    ) -> BasinResult<Option<LayerRef>> {
        let src = src.map(LayerRef::file);
        let Some(src) = present(src.as_ref()) else {
            debug!("National dataset for {} is not available", dst.name());
            return Ok(None);
        };
        let options = CopyOptions {
            epsg: Some(self.epsg()),
            attribute_filter: None,
            clip: Some(clip.clone()),
        };
        self.ops().copy(src, &dst, &options).await?;
        info!("Clipped {} to {}", src, dst);
        Ok(Some(dst))
    }

    /// Keep whole polygons of `src` that touch the area of `clip`
    pub async fn select_intersecting(
        &self,
        src: Option<&Path>,
        clip: &LayerRef,
        dst: LayerRef,
    ) -> BasinResult<Option<LayerRef>> {
        let src = src.map(LayerRef::file);
        let Some(src) = present(src.as_ref()) else {
            debug!("National dataset for {} is not available", dst.name());
            return Ok(None);
        };
        self.ops().filter_intersecting(src, clip, &dst, self.epsg()).await?;
        Ok(Some(dst))
    }

    /// Clip every state's layer of each kind and merge them
    ///
    /// `states` pairs a state name with its unpacked archive directory.
    /// Kinds with no source layer in any state are left out.
    pub async fn merge_transportation(
        &self,
        states: &[(String, PathBuf)],
        clip: &LayerRef,
        work_gpkg: &Path,
        output_dir: &Path,
    ) -> BasinResult<Vec<TransportLayer>> {
        let mut layers = Vec::new();
        for kind in TransportKind::ALL {
            let mut clipped = Vec::with_capacity(states.len());
            let mut contributors = Vec::new();
            for (index, (state, dir)) in states.iter().enumerate() {
                let src = LayerRef::file(dir.join(kind.source_file()));
                if !src.exists() {
                    continue;
                }
                let step = LayerRef::layer(
                    work_gpkg,
                    format!("{}_{}", kind.label().to_lowercase(), index),
                );
                let options = CopyOptions {
                    epsg: Some(self.epsg()),
                    attribute_filter: None,
                    clip: Some(clip.clone()),
                };
                self.ops().copy(&src, &step, &options).await?;
                clipped.push(Some(step));
                contributors.push(state.clone());
            }

            let merged = self
                .merge(
                    &clipped,
                    LayerRef::layer(work_gpkg, kind.label().to_lowercase()),
                )
                .await?;
            let dst = LayerRef::file(output_dir.join(kind.output_path()));
            match self.materialize(merged, dst).await? {
                Some(layer) => {
                    info!("{} merged from {}", kind.label(), contributors.join(", "));
                    layers.push(TransportLayer {
                        kind,
                        layer,
                        states: contributors,
                    });
                }
                None => info!("No {} layers in the downloaded states", kind.label()),
            }
        }
        Ok(layers)
    }
}

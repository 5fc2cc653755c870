//! GDAL command-line backend
//!
//! Implements [`RasterOps`] and [`GeometryOps`] by shelling out to
//! `gdaldem`, `gdalbuildvrt`, `gdalwarp`, `gdalinfo`, `gdaltindex` and
//! `ogr2ogr`. Vector SQL (buffer, difference) uses the SQLite dialect,
//! which needs a GDAL build with SpatiaLite.

use super::geojson;
use super::process::run;
use super::{CopyOptions, DerivedKind, GeometryOps, LayerRef, RasterOps, WarpSpec};
use crate::error::{BasinError, BasinResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Meters per degree, for slope/hillshade on geographic tiles
const DEGREE_SCALE: &str = "111120";

/// GDAL tools found on PATH
#[derive(Debug, Clone)]
pub struct GdalCli {
    /// Projected reference system used for metric buffers
    metric_epsg: u32,
}

impl GdalCli {
    pub fn new(metric_epsg: u32) -> Self {
        Self { metric_epsg }
    }

    /// Check that the tools respond
    pub async fn is_available() -> bool {
        run("gdalinfo", ["--version"]).await.is_ok() && run("ogr2ogr", ["--version"]).await.is_ok()
    }
}

fn epsg(code: u32) -> String {
    format!("EPSG:{}", code)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Scratch sibling for intermediate files
fn scratch_sibling(target: &Path, extension: &str) -> PathBuf {
    target.with_file_name(format!(".{}.{}", uuid::Uuid::new_v4().simple(), extension))
}

/// OGR driver name from the output extension
fn driver_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("gpkg") => "GPKG",
        Some("geojson") | Some("json") => "GeoJSON",
        Some("csv") => "CSV",
        _ => "ESRI Shapefile",
    }
}

/// Leading ogr2ogr arguments that write `dst` (creating or updating it)
fn dst_args(dst: &LayerRef) -> Vec<String> {
    let mut args = vec!["-f".to_string(), driver_for(&dst.path).to_string()];
    if dst.path.exists() {
        if dst.layer.is_some() {
            args.push("-update".to_string());
        }
        args.push("-overwrite".to_string());
    }
    if let Some(layer) = &dst.layer {
        args.extend(["-nln".to_string(), layer.clone()]);
    }
    args
}

/// Trailing source arguments: datasource then optional layer
fn src_args(src: &LayerRef) -> Vec<String> {
    let mut args = vec![path_arg(&src.path)];
    if let Some(layer) = &src.layer {
        args.push(layer.clone());
    }
    args
}

async fn ensure_parent(path: &Path) -> BasinResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BasinError::io(format!("creating {}", parent.display()), e))?;
    }
    Ok(())
}

/// Valid-cell area from `gdalinfo -json -stats` output
///
/// width * height * |pixel area| scaled by the first band's valid percentage.
pub(crate) fn valid_area_from_info(info: &Value) -> Option<f64> {
    let size = info.get("size")?.as_array()?;
    let width = size.first()?.as_f64()?;
    let height = size.get(1)?.as_f64()?;
    let gt = info.get("geoTransform")?.as_array()?;
    let pixel_area = (gt.get(1)?.as_f64()? * gt.get(5)?.as_f64()?).abs();

    let band = info.get("bands")?.as_array()?.first()?;
    let valid_percent = band
        .get("metadata")
        .and_then(|m| m.get(""))
        .and_then(|m| m.get("STATISTICS_VALID_PERCENT"))
        .and_then(|v| v.as_str().and_then(|s| s.parse::<f64>().ok()).or_else(|| v.as_f64()))
        .unwrap_or(100.0);

    Some(width * height * pixel_area * valid_percent / 100.0)
}

#[async_trait]
impl RasterOps for GdalCli {
    async fn derive(&self, kind: DerivedKind, tile: &Path, output: &Path) -> BasinResult<()> {
        ensure_parent(output).await?;
        let (tile_arg, output_arg) = (path_arg(tile), path_arg(output));
        run(
            "gdaldem",
            [
                kind.mode(),
                tile_arg.as_str(),
                output_arg.as_str(),
                "-s",
                DEGREE_SCALE,
                "-compute_edges",
                "-co",
                "COMPRESS=DEFLATE",
            ],
        )
        .await
        .map_err(|e| BasinError::derivation(kind.fragment_name(tile), e.to_string()))?;
        Ok(())
    }

    async fn mosaic(&self, tiles: &[PathBuf], output: &Path, spec: &WarpSpec) -> BasinResult<()> {
        ensure_parent(output).await?;
        let vrt = scratch_sibling(output, "vrt");

        let mut args = vec![path_arg(&vrt)];
        args.extend(tiles.iter().map(|t| path_arg(t)));
        run("gdalbuildvrt", &args).await?;

        let result = self.warp(&vrt, output, spec).await;
        let _ = tokio::fs::remove_file(&vrt).await;
        result
    }

    async fn warp(&self, input: &Path, output: &Path, spec: &WarpSpec) -> BasinResult<()> {
        ensure_parent(output).await?;
        let mut args = vec![
            "-overwrite".to_string(),
            "-t_srs".to_string(),
            epsg(spec.epsg),
            "-r".to_string(),
            "bilinear".to_string(),
            "-co".to_string(),
            "COMPRESS=DEFLATE".to_string(),
        ];
        if let Some(clip) = &spec.clip {
            args.extend(["-cutline".to_string(), path_arg(&clip.path)]);
            if let Some(layer) = &clip.layer {
                args.extend(["-cl".to_string(), layer.clone()]);
            }
            args.extend([
                "-crop_to_cutline".to_string(),
                "-cblend".to_string(),
                spec.cutline_blend.to_string(),
            ]);
        }
        args.extend([path_arg(input), path_arg(output)]);
        run("gdalwarp", &args).await?;
        Ok(())
    }

    async fn valid_area(&self, raster: &Path) -> BasinResult<f64> {
        let raster_arg = path_arg(raster);
        let stdout = run("gdalinfo", ["-json", "-stats", raster_arg.as_str()]).await?;
        let info: Value = serde_json::from_str(&stdout)?;
        valid_area_from_info(&info).ok_or_else(|| {
            BasinError::derivation(
                raster.display().to_string(),
                "gdalinfo output has no size or geotransform",
            )
        })
    }

    async fn footprints(&self, tiles: &[PathBuf], output: &LayerRef, epsg_code: u32) -> BasinResult<()> {
        ensure_parent(&output.path).await?;
        let mut args = vec![
            "-overwrite".to_string(),
            "-f".to_string(),
            driver_for(&output.path).to_string(),
            "-t_srs".to_string(),
            epsg(epsg_code),
        ];
        if let Some(layer) = &output.layer {
            args.extend(["-lyr_name".to_string(), layer.clone()]);
        }
        args.push(path_arg(&output.path));
        args.extend(tiles.iter().map(|t| path_arg(t)));
        run("gdaltindex", &args).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "gdal"
    }
}

#[async_trait]
impl GeometryOps for GdalCli {
    async fn copy(&self, src: &LayerRef, dst: &LayerRef, options: &CopyOptions) -> BasinResult<()> {
        ensure_parent(&dst.path).await?;
        let mut args = dst_args(dst);
        args.extend(["-nlt".to_string(), "PROMOTE_TO_MULTI".to_string()]);
        if let Some(code) = options.epsg {
            args.extend(["-t_srs".to_string(), epsg(code)]);
        }
        if let Some(filter) = &options.attribute_filter {
            args.extend(["-where".to_string(), filter.clone()]);
        }
        if let Some(clip) = &options.clip {
            args.extend(["-clipsrc".to_string(), path_arg(&clip.path)]);
            if let Some(layer) = &clip.layer {
                args.extend(["-clipsrclayer".to_string(), layer.clone()]);
            }
        }
        args.push(path_arg(&dst.path));
        args.extend(src_args(src));
        run("ogr2ogr", &args).await?;
        Ok(())
    }

    async fn merge(&self, inputs: &[LayerRef], dst: &LayerRef, epsg_code: u32) -> BasinResult<()> {
        let options = CopyOptions {
            epsg: Some(epsg_code),
            ..Default::default()
        };
        let Some((first, rest)) = inputs.split_first() else {
            return Err(BasinError::InvalidInput("merge needs at least one input".to_string()));
        };
        self.copy(first, dst, &options).await?;

        for src in rest {
            let mut args = vec![
                "-f".to_string(),
                driver_for(&dst.path).to_string(),
                "-update".to_string(),
                "-append".to_string(),
                "-nlt".to_string(),
                "PROMOTE_TO_MULTI".to_string(),
                "-t_srs".to_string(),
                epsg(epsg_code),
            ];
            if let Some(layer) = &dst.layer {
                args.extend(["-nln".to_string(), layer.clone()]);
            }
            args.push(path_arg(&dst.path));
            args.extend(src_args(src));
            run("ogr2ogr", &args).await?;
        }
        Ok(())
    }

    async fn difference(&self, a: &LayerRef, b: &LayerRef, dst: &LayerRef, epsg_code: u32) -> BasinResult<()> {
        if a.path != b.path {
            return Err(BasinError::InvalidInput(format!(
                "difference needs both layers in one datasource: {} vs {}",
                a, b
            )));
        }
        let sql = format!(
            "SELECT ST_Difference(a.geom, (SELECT ST_Union(b.geom) FROM \"{}\" b)) AS geom FROM \"{}\" a",
            b.name(),
            a.name()
        );
        let mut args = dst_args(dst);
        args.extend([
            "-dialect".to_string(),
            "SQLite".to_string(),
            "-sql".to_string(),
            sql,
            "-a_srs".to_string(),
            epsg(epsg_code),
            path_arg(&dst.path),
            path_arg(&a.path),
        ]);
        run("ogr2ogr", &args).await?;
        Ok(())
    }

    async fn buffer(&self, src: &LayerRef, meters: f64, dst: &LayerRef, epsg_code: u32) -> BasinResult<()> {
        ensure_parent(&dst.path).await?;
        let sql = format!(
            "SELECT ST_Buffer(ST_Transform(geom, {}), {}) AS geom FROM \"{}\"",
            self.metric_epsg,
            meters,
            src.name()
        );
        let mut args = dst_args(dst);
        args.extend([
            "-dialect".to_string(),
            "SQLite".to_string(),
            "-sql".to_string(),
            sql,
            "-s_srs".to_string(),
            epsg(self.metric_epsg),
            "-t_srs".to_string(),
            epsg(epsg_code),
            path_arg(&dst.path),
            path_arg(&src.path),
        ]);
        run("ogr2ogr", &args).await?;
        Ok(())
    }

    async fn filter_intersecting(
        &self,
        src: &LayerRef,
        clip: &LayerRef,
        dst: &LayerRef,
        epsg_code: u32,
    ) -> BasinResult<()> {
        let clip_features = self.read_features(clip, epsg_code).await?;
        let Some(bbox) = geojson::extent(&clip_features) else {
            return Err(BasinError::InvalidInput(format!("clip layer {} is empty", clip)));
        };

        ensure_parent(&dst.path).await?;
        let mut args = dst_args(dst);
        args.extend([
            "-t_srs".to_string(),
            epsg(epsg_code),
            "-spat_srs".to_string(),
            epsg(epsg_code),
            "-spat".to_string(),
            bbox.min_x.to_string(),
            bbox.min_y.to_string(),
            bbox.max_x.to_string(),
            bbox.max_y.to_string(),
            path_arg(&dst.path),
        ]);
        args.extend(src_args(src));
        run("ogr2ogr", &args).await?;
        Ok(())
    }

    async fn export_table(&self, src: &LayerRef, filter: Option<&str>, dst: &LayerRef) -> BasinResult<()> {
        ensure_parent(&dst.path).await?;
        let mut args = dst_args(dst);
        if let Some(filter) = filter {
            args.extend(["-where".to_string(), filter.to_string()]);
        }
        args.push(path_arg(&dst.path));
        args.extend(src_args(src));
        run("ogr2ogr", &args).await?;
        Ok(())
    }

    async fn read_features(&self, src: &LayerRef, epsg_code: u32) -> BasinResult<Vec<Value>> {
        let mut args = vec![
            "-f".to_string(),
            "GeoJSON".to_string(),
            "-t_srs".to_string(),
            epsg(epsg_code),
            "/vsistdout/".to_string(),
        ];
        args.extend(src_args(src));
        let stdout = run("ogr2ogr", &args).await?;

        let collection: Value = serde_json::from_str(&stdout)?;
        let features = match collection.get("features") {
            Some(Value::Array(features)) => features.clone(),
            _ => vec![],
        };
        debug!("Read {} features from {}", features.len(), src);
        Ok(features)
    }

    async fn write_features(&self, features: Vec<Value>, dst: &LayerRef, epsg_code: u32) -> BasinResult<()> {
        ensure_parent(&dst.path).await?;
        let temp = scratch_sibling(&dst.path, "geojson");
        let collection = json!({"type": "FeatureCollection", "features": features});
        tokio::fs::write(&temp, serde_json::to_vec(&collection)?)
            .await
            .map_err(|e| BasinError::io(format!("writing {}", temp.display()), e))?;

        let mut args = dst_args(dst);
        args.extend([
            "-a_srs".to_string(),
            epsg(epsg_code),
            path_arg(&dst.path),
            path_arg(&temp),
        ]);
        let result = run("ogr2ogr", &args).await;
        let _ = tokio::fs::remove_file(&temp).await;
        result.map(|_| ())
    }

    fn backend_name(&self) -> &'static str {
        "gdal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_area_scales_by_valid_percent() {
        let info = json!({
            "size": [100, 50],
            "geoTransform": [-122.0, 0.001, 0.0, 45.0, 0.0, -0.001],
            "bands": [{"metadata": {"": {"STATISTICS_VALID_PERCENT": "70"}}}]
        });
        let area = valid_area_from_info(&info).unwrap();
        assert!((area - 100.0 * 50.0 * 0.000001 * 0.7).abs() < 1e-12);
    }

    #[test]
    fn valid_area_defaults_to_full_coverage() {
        let info = json!({
            "size": [10, 10],
            "geoTransform": [0.0, 2.0, 0.0, 0.0, 0.0, -2.0],
            "bands": [{}]
        });
        assert_eq!(valid_area_from_info(&info), Some(400.0));
    }

    #[test]
    fn driver_follows_extension() {
        assert_eq!(driver_for(Path::new("out/hydrology.gpkg")), "GPKG");
        assert_eq!(driver_for(Path::new("out/roads.shp")), "ESRI Shapefile");
        assert_eq!(driver_for(Path::new("out/bounds.geojson")), "GeoJSON");
    }

    #[test]
    fn new_layer_in_fresh_file_is_created() {
        let args = dst_args(&LayerRef::layer("/nonexistent/h.gpkg", "network"));
        assert_eq!(args, vec!["-f", "GPKG", "-nln", "network"]);
    }
}

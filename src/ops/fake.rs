//! In-memory stand-in for the GDAL backend
//!
//! Every write touches the output file so freshness checks see it, and
//! features are tracked by layer name so reads return what was written.

use super::{CopyOptions, DerivedKind, GeometryOps, LayerRef, RasterOps, WarpSpec};
use crate::error::{BasinError, BasinResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeOps {
    pub calls: Mutex<Vec<String>>,
    /// Features by layer name
    pub features: Mutex<HashMap<String, Vec<Value>>>,
    /// Names (layer or file name) whose production fails
    pub failing: Mutex<HashSet<String>>,
    /// Reported valid area of every raster
    pub raster_area: Mutex<Option<f64>>,
}

impl FakeOps {
    pub fn with_features(&self, layer: &str, features: Vec<Value>) {
        self.features.lock().unwrap().insert(layer.to_string(), features);
    }

    pub fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn set_raster_area(&self, area: f64) {
        *self.raster_area.lock().unwrap() = Some(area);
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, names: &[String]) -> BasinResult<()> {
        let failing = self.failing.lock().unwrap();
        match names.iter().find(|n| failing.contains(n.as_str())) {
            Some(name) => Err(BasinError::derivation(name.clone(), "simulated failure")),
            None => Ok(()),
        }
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"fake").unwrap();
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn produce(&self, call: &str, dst: &LayerRef, sources: &[&LayerRef]) -> BasinResult<()> {
        self.record(format!("{}:{}", call, dst.name()));
        let mut names = vec![dst.name(), Self::file_name(&dst.path)];
        names.extend(sources.iter().map(|s| s.name()));
        self.check(&names)?;

        Self::touch(&dst.path);
        let mut features = self.features.lock().unwrap();
        let copied: Vec<Value> = sources
            .iter()
            .flat_map(|s| features.get(&s.name()).cloned().unwrap_or_default())
            .collect();
        features.insert(dst.name(), copied);
        Ok(())
    }
}

#[async_trait]
impl RasterOps for FakeOps {
    async fn derive(&self, kind: DerivedKind, tile: &Path, output: &Path) -> BasinResult<()> {
        self.record(format!("derive:{}", kind.fragment_name(tile)));
        self.check(&[Self::file_name(tile)])?;
        Self::touch(output);
        Ok(())
    }

    async fn mosaic(&self, tiles: &[PathBuf], output: &Path, _spec: &WarpSpec) -> BasinResult<()> {
        self.record(format!("mosaic:{}", Self::file_name(output)));
        let mut names = vec![Self::file_name(output)];
        names.extend(tiles.iter().map(|t| Self::file_name(t)));
        self.check(&names)?;
        Self::touch(output);
        Ok(())
    }

    async fn warp(&self, input: &Path, output: &Path, _spec: &WarpSpec) -> BasinResult<()> {
        self.record(format!("warp:{}", Self::file_name(output)));
        self.check(&[Self::file_name(input), Self::file_name(output)])?;
        Self::touch(output);
        Ok(())
    }

    async fn valid_area(&self, raster: &Path) -> BasinResult<f64> {
        self.record(format!("valid_area:{}", Self::file_name(raster)));
        Ok(self.raster_area.lock().unwrap().unwrap_or(1.0))
    }

    async fn footprints(&self, tiles: &[PathBuf], output: &LayerRef, _epsg: u32) -> BasinResult<()> {
        self.record(format!("footprints:{}", tiles.len()));
        Self::touch(&output.path);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}

#[async_trait]
impl GeometryOps for FakeOps {
    async fn copy(&self, src: &LayerRef, dst: &LayerRef, _options: &CopyOptions) -> BasinResult<()> {
        self.produce("copy", dst, &[src])
    }

    async fn merge(&self, inputs: &[LayerRef], dst: &LayerRef, _epsg: u32) -> BasinResult<()> {
        let sources: Vec<&LayerRef> = inputs.iter().collect();
        self.produce("merge", dst, &sources)
    }

    async fn difference(&self, a: &LayerRef, b: &LayerRef, dst: &LayerRef, _epsg: u32) -> BasinResult<()> {
        self.record(format!("difference:{}-{}", a.name(), b.name()));
        self.produce("write", dst, &[a])
    }

    async fn buffer(&self, src: &LayerRef, _meters: f64, dst: &LayerRef, _epsg: u32) -> BasinResult<()> {
        self.produce("buffer", dst, &[src])
    }

    async fn filter_intersecting(
        &self,
        src: &LayerRef,
        _clip: &LayerRef,
        dst: &LayerRef,
        _epsg: u32,
    ) -> BasinResult<()> {
        self.produce("filter", dst, &[src])
    }

    async fn export_table(&self, src: &LayerRef, _filter: Option<&str>, dst: &LayerRef) -> BasinResult<()> {
        self.produce("table", dst, &[src])
    }

    async fn read_features(&self, src: &LayerRef, _epsg: u32) -> BasinResult<Vec<Value>> {
        self.record(format!("read:{}", src.name()));
        Ok(self
            .features
            .lock()
            .unwrap()
            .get(&src.name())
            .cloned()
            .unwrap_or_default())
    }

    async fn write_features(&self, features: Vec<Value>, dst: &LayerRef, _epsg: u32) -> BasinResult<()> {
        self.record(format!("write:{}", dst.name()));
        self.check(&[dst.name()])?;
        Self::touch(&dst.path);
        self.features.lock().unwrap().insert(dst.name(), features);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}

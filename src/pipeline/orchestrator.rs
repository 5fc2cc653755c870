//! Top-level build controller
//!
//! Runs the stages in order, each consuming the previous stage's outputs,
//! and records every kept artifact in the manifest. Optional inputs that
//! are absent or fail recoverably are omitted and reported in the
//! [`RunSummary`]; anything else fails the run. The scratch directory is
//! removed whatever the outcome.

use super::inputs::{find_climate, LocalInputs};
use super::region::RegionId;
use super::state::{Stage, StageTracker};
use super::summary::{pretty_duration, RunSummary};
use crate::cache::{digest_bytes, write_atomic, ArtifactStore, CacheKey, DownloadCache};
use crate::config::Config;
use crate::error::{BasinError, BasinResult};
use crate::fetch::sources::{self, TILE_BUFFER_DEG};
use crate::fetch::{
    FetchResult, HttpTransport, RetryPolicy, SourceFetcher, StateCoverage, Transport, TransportKind,
    Unpacker, UnzipCli,
};
use crate::manifest::{MetaType, NodeId, ProjectManifest, Registry};
use crate::ops::{geojson, CopyOptions, GdalCli, GeometryOps, LayerRef, RasterOps, WarpSpec};
use crate::raster::{RasterDerivationEngine, TopographyRequest};
use crate::segment::{self, SegmentationParams};
use crate::vector::hydrology::{self, ChannelAreaInputs, HydrologyLayers};
use crate::vector::{FeatureFilter, VectorPreparationStage};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Manifest file name inside the output directory
pub const MANIFEST_FILE: &str = "project.json";

pub const PROJECT_TYPE: &str = "BasinContext";

/// Segmentation outputs: by length, at crossings, at crossings then by length
const SEGMENTED_LAYERS: [&str; 3] = ["NETWORK_300M", "NETWORK_INTERSECTED", "NETWORK_INTERSECTED_300M"];

/// Flowline attribute used as the segment source id
const FLOWLINE_ID_FIELD: &str = "NHDPlusID";

const TRANSPORT_DESCRIPTION: &str = "Roads, railroads and trails from the national transportation dataset, downloaded per state and clipped to the watershed boundary.";
const TRANSPORT_SOURCE_URL: &str =
    "https://data.usgs.gov/datacatalog/data/USGS:ad3d631d-f51f-4b6a-91a3-e617d6a58b4e";
const TRANSPORT_VERSION: &str = "2020";

/// Everything a single build needs from the caller
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub region: RegionId,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub force: bool,
    /// Give the scratch directory a per-run suffix
    pub parallel: bool,
    pub meta: Vec<(String, String)>,
    pub inputs: LocalInputs,
}

/// External collaborators used by a build
#[derive(Clone)]
pub struct Backends {
    pub transport: Arc<dyn Transport>,
    pub unpacker: Arc<dyn Unpacker>,
    pub raster: Arc<dyn RasterOps>,
    pub geometry: Arc<dyn GeometryOps>,
}

impl Backends {
    /// HTTP downloads, `unzip` and the GDAL command-line tools
    pub fn production(config: &Config) -> Self {
        let gdal = Arc::new(GdalCli::new(config.processing.segmentation_epsg));
        Self {
            transport: Arc::new(HttpTransport::new(Duration::from_secs(config.fetch.timeout_secs))),
            unpacker: Arc::new(UnzipCli),
            raster: gdal.clone(),
            geometry: gdal,
        }
    }
}

/// Result of a successful build
#[derive(Debug)]
pub struct BuildOutcome {
    pub manifest: PathBuf,
    pub summary: RunSummary,
}

pub struct PipelineOrchestrator<'a> {
    config: &'a Config,
    registry: Registry,
    backends: Backends,
    cache_dir: PathBuf,
    cancel: CancellationToken,
    progress: Option<watch::Sender<Stage>>,
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(
        config: &'a Config,
        registry: Registry,
        backends: Backends,
        cache_dir: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            backends,
            cache_dir,
            cancel,
            progress: None,
        }
    }

    /// Publish each completed stage on `tx`
    pub fn with_progress(mut self, tx: watch::Sender<Stage>) -> Self {
        self.progress = Some(tx);
        self
    }

    fn scratch_for(&self, request: &BuildRequest) -> PathBuf {
        if request.parallel {
            request.scratch_dir.join(format!(
                "{}-{}",
                request.region,
                uuid::Uuid::new_v4().simple()
            ))
        } else {
            request.scratch_dir.join(request.region.as_str())
        }
    }

    /// Build the project for one region
    pub async fn run(&self, request: &BuildRequest) -> BasinResult<BuildOutcome> {
        let started = Instant::now();
        info!(region = %request.region, "Starting build");

        let scratch = self.scratch_for(request);
        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|e| BasinError::io(format!("creating scratch directory {}", scratch.display()), e))?;

        let processing = &self.config.processing;
        let store = ArtifactStore::new(request.force);
        let fetcher = SourceFetcher::new(
            DownloadCache::new(self.cache_dir.clone()),
            self.backends.transport.clone(),
            self.backends.unpacker.clone(),
            RetryPolicy {
                retries: self.config.fetch.retries,
                backoff: Duration::from_millis(self.config.fetch.retry_backoff_ms),
            },
        );
        let mut build = Build {
            config: self.config,
            request,
            scratch: scratch.clone(),
            cancel: self.cancel.clone(),
            fetcher,
            raster: RasterDerivationEngine::new(
                self.backends.raster.clone(),
                store,
                self.config.fetch.workers,
                self.cancel.clone(),
            ),
            vector: VectorPreparationStage::new(self.backends.geometry.clone(), processing.output_epsg),
            manifest: ProjectManifest::new(
                &request.output_dir,
                &format!("Watershed Context for HUC {}", request.region),
                PROJECT_TYPE,
                self.registry.clone(),
            ),
            summary: RunSummary::default(),
            tracker: StageTracker::default(),
            progress: self.progress.as_ref(),
        };

        let result = build.execute(started).await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            debug!("Could not remove scratch directory {}: {}", scratch.display(), e);
        }
        build.summary.elapsed = Some(started.elapsed());

        match result {
            Ok(manifest) => {
                info!(region = %request.region, "Build completed in {}", pretty_duration(started.elapsed().as_secs_f64()));
                Ok(BuildOutcome {
                    manifest,
                    summary: build.summary,
                })
            }
            Err(e) => {
                let stage = build.tracker.current();
                build.tracker.fail();
                build.publish();
                build.summary.log();
                error!(region = %request.region, stage = %stage, "Build failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Fetched inputs handed from the first stage to the rest
struct Sources {
    hydrography_url: Option<String>,
    hydro: HydrologyLayers,
    boundary: Vec<Value>,
    tiles: Vec<PathBuf>,
    tile_urls: Vec<String>,
    transport: Vec<StateSource>,
}

struct StateSource {
    state: String,
    dir: PathBuf,
    url: String,
}

/// Layers the segmentation stage splits on
#[derive(Default)]
struct Prepared {
    roads: Option<LayerRef>,
    rail: Option<LayerRef>,
    ownership: Option<LayerRef>,
    channel_area: bool,
}

/// State of one run
struct Build<'a> {
    config: &'a Config,
    request: &'a BuildRequest,
    scratch: PathBuf,
    cancel: CancellationToken,
    fetcher: SourceFetcher,
    raster: RasterDerivationEngine,
    vector: VectorPreparationStage,
    manifest: ProjectManifest,
    summary: RunSummary,
    tracker: StageTracker,
    progress: Option<&'a watch::Sender<Stage>>,
}

impl Build<'_> {
    async fn execute(&mut self, started: Instant) -> BasinResult<PathBuf> {
        let sources = self.fetch_sources().await?;
        self.advance(Stage::SourcesFetched)?;

        let extent = self.derive_rasters(&sources).await?;
        self.advance(Stage::DerivedArtifactsReady)?;

        let prepared = self.prepare_vectors(&sources).await?;
        self.advance(Stage::VectorLayersPrepared)?;

        let segmented = self.segment_network(&sources, &prepared).await?;
        self.advance(Stage::Segmented)?;

        let path = self
            .write_manifest(&sources, &extent, &prepared, &segmented, started)
            .await?;
        self.tracker.advance(Stage::ManifestWritten)?;
        self.tracker.advance(Stage::Done)?;
        self.publish();
        Ok(path)
    }

    fn advance(&mut self, stage: Stage) -> BasinResult<()> {
        if self.cancel.is_cancelled() {
            return Err(BasinError::Cancelled);
        }
        self.tracker.advance(stage)?;
        self.publish();
        Ok(())
    }

    fn publish(&self) {
        if let Some(tx) = &self.progress {
            tx.send_replace(self.tracker.current());
        }
    }

    fn epsg(&self) -> u32 {
        self.config.processing.output_epsg
    }

    fn work_gpkg(&self) -> PathBuf {
        self.scratch.join("work.gpkg")
    }

    fn output_path(&self, id: &str) -> BasinResult<PathBuf> {
        Ok(self.request.output_dir.join(self.manifest.registry().get(id)?.path))
    }

    /// Record a top-level dataset
    fn add(&mut self, id: &str, path: &Path) -> BasinResult<NodeId> {
        let descriptor = self.manifest.registry().get(id)?;
        let node = self.manifest.add_dataset(self.manifest.datasets(), descriptor, path)?;
        self.summary.record(id);
        Ok(node)
    }

    fn count_fetch(&mut self, fetched: &FetchResult) {
        if fetched.cached {
            self.summary.cached += 1;
        } else {
            self.summary.downloaded += 1;
        }
    }

    fn tally(&mut self, rebuilt: bool) {
        if rebuilt {
            self.summary.rebuilt += 1;
        } else {
            self.summary.reused += 1;
        }
    }

    /// Convert a recoverable failure or absent input into an omission
    fn optional<T>(&mut self, id: &str, result: BasinResult<Option<T>>) -> BasinResult<Option<T>> {
        match result {
            Ok(Some(value)) => Ok(Some(value)),
            Ok(None) => {
                self.summary.omit(id, "no input data available");
                Ok(None)
            }
            Err(e) if e.is_recoverable() => {
                self.summary.omit(id, e.to_string());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_sources(&mut self) -> BasinResult<Sources> {
        if self.cancel.is_cancelled() {
            return Err(BasinError::Cancelled);
        }
        let request = self.request;
        let region = &request.region;
        let force = request.force;

        info!(region = %region, "Fetching hydrography for {}", region.huc4());
        let request = sources::hydrography_request(&self.config.sources, region.huc4())?;
        let gdb = self.fetcher.fetch(&request, force).await?;
        self.count_fetch(&gdb);
        let gdb_path = gdb
            .paths
            .first()
            .cloned()
            .ok_or_else(|| BasinError::Internal("hydrography entry lists no files".into()))?;

        let gpkg = self.output_path("HYDROLOGY")?;
        let hydro = self.vector.copy_hydrology(&gdb_path, &gpkg, &region.selector()).await?;
        for (layer, reason) in &hydro.skipped {
            self.summary.omit(layer.as_str(), reason.as_str());
        }

        let boundary = self.vector.ops().read_features(&hydro.boundary, self.epsg()).await?;
        let bbox = geojson::extent(&boundary).ok_or_else(|| {
            BasinError::InvalidInput(format!("Watershed {} has no boundary geometry", region))
        })?;

        let coverage = StateCoverage::parse(hydro.states.as_deref().unwrap_or_default());
        if coverage.only_canada() {
            error!("Watershed {} lies entirely in Canada, no elevation or transportation data will be available", region);
            self.summary.warnings.push(format!("Watershed {} lies entirely in Canada", region));
        } else if coverage.canada {
            self.summary
                .warn("Watershed is partially in Canada, some data only covers the US portion");
        }
        for code in &coverage.unknown {
            self.summary.warn(format!("Unknown state code '{}' on the watershed boundary", code));
        }

        let mut requests = Vec::new();
        let mut states: HashMap<CacheKey, String> = HashMap::new();
        for state in &coverage.states {
            let request = sources::transportation_request(&self.config.sources, state)?;
            states.insert(request.key.clone(), state.clone());
            requests.push(request);
        }
        let tiles = sources::tile_names(&bbox, TILE_BUFFER_DEG);
        info!(region = %region, "Watershed needs {} elevation tiles and {} state archives", tiles.len(), states.len());
        for tile in &tiles {
            requests.push(sources::elevation_request(&self.config.sources, tile)?);
        }

        let results = self
            .fetcher
            .fetch_all(requests, force, self.config.fetch.workers, &self.cancel)
            .await;
        if self.cancel.is_cancelled() {
            return Err(BasinError::Cancelled);
        }

        let mut transport = Vec::new();
        let mut tile_paths = Vec::new();
        let mut tile_urls = Vec::new();
        for (key, result) in results {
            let fetched = match result {
                Ok(fetched) => fetched,
                Err(BasinError::Cancelled) => return Err(BasinError::Cancelled),
                Err(e) if key.source == sources::TRANSPORTATION => {
                    let state = states.get(&key).cloned().unwrap_or_else(|| key.region.clone());
                    self.summary.omit(format!("transportation ({})", state), e.to_string());
                    continue;
                }
                Err(BasinError::RemoteNotFound { url }) if key.source == sources::ELEVATION => {
                    self.summary
                        .warn(format!("Elevation tile {} does not exist upstream ({})", key.region, url));
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.count_fetch(&fetched);

            if key.source == sources::TRANSPORTATION {
                transport.push(StateSource {
                    state: states.get(&key).cloned().unwrap_or_else(|| key.region.clone()),
                    dir: self.fetcher.cache().entry_dir(&key),
                    url: fetched.origin_urls.first().cloned().unwrap_or_default(),
                });
            } else {
                tile_paths.extend(fetched.paths);
                tile_urls.extend(fetched.origin_urls);
            }
        }

        if tile_paths.is_empty() {
            return Err(BasinError::derivation(
                "DEM",
                format!("no elevation tiles are available for watershed {}", region),
            ));
        }

        Ok(Sources {
            hydrography_url: gdb.origin_urls.first().cloned(),
            hydro,
            boundary,
            tiles: tile_paths,
            tile_urls,
            transport,
        })
    }

    /// Warp target for a clip layer, with the digest of its geometry
    async fn clip_spec(&self, clip: &LayerRef) -> BasinResult<(WarpSpec, String)> {
        let features = self.vector.ops().read_features(clip, self.epsg()).await?;
        let digest = digest_bytes(&serde_json::to_vec(&features)?);
        let spec = WarpSpec {
            epsg: self.epsg(),
            clip: Some(clip.clone()),
            cutline_blend: self.config.processing.cutline_blend,
        };
        Ok((spec, digest))
    }

    async fn optional_warp(&mut self, id: &str, input: &Path, spec: &WarpSpec, digest: &str) -> BasinResult<()> {
        let output = self.output_path(id)?;
        let result = self.raster.build_warp(id, input, &output, spec, digest).await;
        match result {
            Ok(outcome) => {
                self.tally(outcome.was_rebuilt());
                self.add(id, &output)?;
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                self.summary.omit(id, e.to_string());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Processing extent, topography, coverage, vegetation, fair market and climate
    async fn derive_rasters(&mut self, sources: &Sources) -> BasinResult<Vec<Value>> {
        let epsg = self.epsg();
        let footprints = LayerRef::layer(self.work_gpkg(), "tile_footprints");
        self.raster
            .ops()
            .footprints(&sources.tiles, &footprints, epsg)
            .await?;

        let extent = LayerRef::layer(&sources.hydro.gpkg, hydrology::PROCESSING_EXTENT);
        let options = CopyOptions {
            epsg: Some(epsg),
            attribute_filter: None,
            clip: Some(sources.hydro.boundary.clone()),
        };
        self.vector.ops().copy(&footprints, &extent, &options).await?;
        let (spec, digest) = self.clip_spec(&extent).await?;
        let extent_features = self.vector.ops().read_features(&extent, epsg).await?;

        let topography = self
            .raster
            .build_topography(&TopographyRequest {
                tiles: sources.tiles.clone(),
                spec,
                boundary_digest: digest,
                dem: self.output_path("DEM")?,
                slope: self.output_path("SLOPE")?,
                hillshade: self.output_path("HILLSHADE")?,
                fragments_root: self.fetcher.cache().derived_root(),
            })
            .await?;
        for outcome in [&topography.dem, &topography.slope, &topography.hillshade] {
            self.tally(outcome.was_rebuilt());
        }

        let request = self.request;
        let expected = geojson::polygon_area(&sources.boundary);
        let report = self
            .raster
            .verify_coverage(
                "DEM",
                &topography.dem.path,
                expected,
                self.config.processing.coverage_threshold,
            )
            .await?;
        if let Some(shortfall) = report.shortfall() {
            self.summary.warnings.push(shortfall.to_string());
        }

        let dem = self.add("DEM", &topography.dem.path)?;
        self.manifest
            .add_metadata(dem, "num_rasters", sources.tile_urls.len().to_string(), MetaType::Int)?;
        self.manifest.add_metadata(
            dem,
            "origin_urls",
            serde_json::to_string(&sources.tile_urls)?,
            MetaType::Json,
        )?;
        self.add("SLOPE", &topography.slope.path)?;
        self.add("HILLSHADE", &topography.hillshade.path)?;

        let (spec100, digest100) = self.clip_spec(&sources.hydro.buffered_100).await?;
        let landfire = request.inputs.landfire_dir.is_some();
        for (id, input) in request.inputs.vegetation() {
            match input {
                Some(input) => self.optional_warp(id, &input, &spec100, &digest100).await?,
                None if landfire => self.summary.omit(id, "not found in the landfire directory"),
                None => self.summary.omit(id, "no landfire directory supplied"),
            }
        }

        let (spec500, digest500) = self.clip_spec(&sources.hydro.buffered_500).await?;
        match request.inputs.fair_market.as_deref().filter(|p| p.is_file()) {
            Some(input) => {
                self.optional_warp("FAIR_MARKET", input, &spec500, &digest500).await?;
            }
            None => self.summary.omit("FAIR_MARKET", "input not supplied"),
        }

        let climate = find_climate(request.inputs.climate_dir.as_deref()).await?;
        for (id, input) in climate {
            match input {
                Some(input) => self.optional_warp(id, &input, &spec500, &digest500).await?,
                None => self.summary.omit(id, "no matching climate raster"),
            }
        }

        Ok(extent_features)
    }

    async fn prepare_vectors(&mut self, sources: &Sources) -> BasinResult<Prepared> {
        let mut prepared = Prepared::default();
        let config = self.config;
        let request = self.request;
        let inputs = &request.inputs;

        let national_clip = self
            .vector
            .buffer(
                Some(&sources.hydro.boundary),
                config.processing.national_buffer_m,
                LayerRef::layer(self.work_gpkg(), "national_clip"),
            )
            .await?
            .ok_or_else(|| BasinError::Internal("watershed boundary layer is missing".into()))?;

        for (id, src) in [
            ("OWNERSHIP", &inputs.ownership),
            ("STATES", &inputs.states),
            ("COUNTIES", &inputs.counties),
            ("GEOLOGY", &inputs.geology),
        ] {
            let dst = LayerRef::file(self.output_path(id)?);
            let result = self.vector.clip_national(src.as_deref(), &national_clip, dst).await;
            if let Some(layer) = self.optional(id, result)? {
                self.add(id, &layer.path)?;
                if id == "OWNERSHIP" {
                    prepared.ownership = Some(layer);
                }
            }
        }

        let dst = LayerRef::file(self.output_path("ECOREGIONS")?);
        let result = self
            .vector
            .select_intersecting(inputs.ecoregions.as_deref(), &national_clip, dst)
            .await;
        if let Some(layer) = self.optional("ECOREGIONS", result)? {
            self.add("ECOREGIONS", &layer.path)?;
        }

        let states: Vec<(String, PathBuf)> = sources
            .transport
            .iter()
            .map(|s| (s.state.clone(), s.dir.clone()))
            .collect();
        let layers = match self
            .vector
            .merge_transportation(
                &states,
                &sources.hydro.boundary,
                &self.work_gpkg(),
                &request.output_dir,
            )
            .await
        {
            Ok(layers) => layers,
            Err(e) if e.is_recoverable() => {
                self.summary.omit("transportation", e.to_string());
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        for kind in TransportKind::ALL {
            let Some(layer) = layers.iter().find(|l| l.kind == kind) else {
                self.summary.omit(kind.label(), "no downloaded state archive provided it");
                continue;
            };
            let node = self.add(kind.label(), &layer.layer.path)?;
            if self.manifest.registry().description(kind.label()).is_none() {
                self.describe_transport(node, kind)?;
            }
            for state in &layer.states {
                if let Some(source) = sources.transport.iter().find(|s| &s.state == state) {
                    self.manifest
                        .add_metadata(node, state, source.url.clone(), MetaType::Url)?;
                }
            }
            match kind {
                TransportKind::Roads => prepared.roads = Some(layer.layer.clone()),
                TransportKind::Rail => prepared.rail = Some(layer.layer.clone()),
                TransportKind::Trails => {}
            }
        }

        let hydro = &sources.hydro;
        let processing = &config.processing;
        let channel = ChannelAreaInputs {
            network: hydro.layer(hydrology::FLOWLINE),
            flow_areas: hydro.layer(hydrology::FLOW_AREA),
            waterbodies: hydro.layer(hydrology::WATERBODY),
            flow_area_filter: FeatureFilter::new("FCode", &processing.flowarea_codes),
            waterbody_filter: FeatureFilter::new("FCode", &processing.waterbody_codes),
            network_buffer_m: processing.channel_buffer_m,
        };
        let result = self
            .vector
            .channel_area(
                &channel,
                &self.work_gpkg(),
                LayerRef::layer(&hydro.gpkg, hydrology::CHANNEL_AREA),
            )
            .await;
        prepared.channel_area = self.optional("CHANNEL_AREA", result)?.is_some();

        Ok(prepared)
    }

    fn describe_transport(&mut self, node: NodeId, kind: TransportKind) -> BasinResult<()> {
        let entries = [
            ("Description", TRANSPORT_DESCRIPTION.to_string(), MetaType::String),
            (
                "DocsUrl",
                format!("{}#{}", crate::manifest::DOCS_URL, kind.label()),
                MetaType::Url,
            ),
            ("SourceUrl", TRANSPORT_SOURCE_URL.to_string(), MetaType::Url),
            ("ProductVersion", TRANSPORT_VERSION.to_string(), MetaType::String),
        ];
        for (key, value, value_type) in entries {
            self.manifest.add_metadata(node, key, value, value_type)?;
        }
        Ok(())
    }

    /// Resegmented flowlines, plain and split at roads, rail and ownership
    async fn segment_network(&mut self, sources: &Sources, prepared: &Prepared) -> BasinResult<Vec<&'static str>> {
        let processing = &self.config.processing;
        let epsg = processing.segmentation_epsg;
        let params = SegmentationParams::new(
            processing.segmentation.max_length_m,
            processing.segmentation.min_length_m,
        )?;
        let ops = self.vector.ops().clone();

        let flowlines = LayerRef::layer(&sources.hydro.gpkg, hydrology::FLOWLINE);
        let features = ops.read_features(&flowlines, epsg).await?;
        let network = geojson::line_features(&features, FLOWLINE_ID_FIELD);
        if network.is_empty() {
            for id in SEGMENTED_LAYERS {
                self.summary.omit(id, "no flowlines in the watershed");
            }
            return Ok(Vec::new());
        }

        let mut split_layers = Vec::new();
        for layer in [&prepared.roads, &prepared.rail, &prepared.ownership]
            .into_iter()
            .flatten()
        {
            let features = ops.read_features(layer, epsg).await?;
            split_layers.push(geojson::split_lines(&features));
        }

        let plain = segment::segment(&network, params, &[]);
        let crossings = segment::segment(&network, params.crossings_only(), &split_layers);
        let intersected = segment::segment(&network, params, &split_layers);
        info!(
            "Segmented {} flowlines into {} segments ({} pieces between crossings, {} when also split by length)",
            network.len(),
            plain.len(),
            crossings.len(),
            intersected.len()
        );

        let hydrology = self.manifest.registry().get("HYDROLOGY")?;
        let mut written = Vec::new();
        for (id, segments) in SEGMENTED_LAYERS.into_iter().zip([plain, crossings, intersected]) {
            let child = hydrology
                .child(id)
                .ok_or_else(|| BasinError::Internal(format!("{} is not a hydrology layer", id)))?;
            let dst = LayerRef::layer(&sources.hydro.gpkg, child.path);
            let features = segments.iter().map(geojson::segment_feature).collect();
            ops.write_features(features, &dst, epsg).await?;
            written.push(child.id);
        }
        Ok(written)
    }

    async fn write_manifest(
        &mut self,
        sources: &Sources,
        extent: &[Value],
        prepared: &Prepared,
        segmented: &[&'static str],
        started: Instant,
    ) -> BasinResult<PathBuf> {
        let hydro = &sources.hydro;
        let package_descriptor = self.manifest.registry().get("HYDROLOGY")?;
        let package = self.add("HYDROLOGY", &hydro.gpkg)?;

        let mut layers: Vec<&str> = hydro.layers.iter().map(String::as_str).collect();
        layers.extend(["BUFFERED_CLIP100", "BUFFERED_CLIP500", "PROCESSING_EXTENT"]);
        if prepared.channel_area {
            layers.push("CHANNEL_AREA");
        }
        layers.extend(segmented.iter().copied());
        for id in layers {
            match package_descriptor.child(id) {
                Some(child) => {
                    self.manifest.add_layer(package, child)?;
                }
                None => debug!("{} has no manifest entry", id),
            }
        }
        if hydro.vaa.is_some() {
            if let Some(child) = package_descriptor.child(hydrology::VAA_TABLE) {
                let table = self.manifest.add_layer(package, child)?;
                if let Some(url) = &sources.hydrography_url {
                    self.manifest.add_metadata(table, "origin_url", url.clone(), MetaType::Url)?;
                }
            }
        }

        let features = if extent.is_empty() {
            sources.boundary.as_slice()
        } else {
            extent
        };
        let bbox = geojson::extent(features)
            .ok_or_else(|| BasinError::Internal("project extent has no geometry".into()))?;
        let centroid = bbox.centroid();
        let mut properties = Map::new();
        properties.insert("id".to_string(), Value::from(self.request.region.as_str()));
        properties.insert("centroid".to_string(), json!([centroid.x, centroid.y]));
        let collection = json!({
            "type": "FeatureCollection",
            "features": [geojson::bbox_feature(&bbox, properties)],
        });
        let bounds_path = self.output_path("PROJECT_BOUNDS")?;
        write_atomic(&bounds_path, &serde_json::to_vec_pretty(&collection)?).await?;
        let bounds = self.add("PROJECT_BOUNDS", &bounds_path)?;
        self.manifest.add_metadata(
            bounds,
            "Centroid",
            json!([centroid.x, centroid.y]).to_string(),
            MetaType::Json,
        )?;
        self.manifest.add_metadata(
            bounds,
            "BBox",
            json!([bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y]).to_string(),
            MetaType::Json,
        )?;

        let request = self.request;
        let region = &request.region;
        let root = self.manifest.root();
        self.manifest
            .add_metadata(root, &format!("HUC{}", region.len()), region.as_str(), MetaType::String)?;
        self.manifest.add_metadata(root, "HUC", region.as_str(), MetaType::String)?;
        if let Some(name) = &hydro.watershed_name {
            self.manifest.add_metadata(root, "Watershed", name.clone(), MetaType::String)?;
        }
        self.manifest
            .add_metadata(root, "Version", env!("CARGO_PKG_VERSION"), MetaType::String)?;
        for (key, value) in &request.meta {
            self.manifest.add_metadata(root, key, value.clone(), MetaType::String)?;
        }

        let elapsed = started.elapsed().as_secs_f64();
        self.manifest
            .add_metadata(root, "ProcTimeS", format!("{:.2}", elapsed), MetaType::Float)?;
        self.manifest
            .add_metadata(root, "ProcTimeHuman", pretty_duration(elapsed), MetaType::String)?;

        let path = request.output_dir.join(MANIFEST_FILE);
        self.manifest.write(&path).await?;
        info!("Manifest written to {}", path.display());
        Ok(path)
    }
}

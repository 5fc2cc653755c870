//! Project manifest
//!
//! An append-only tree recording every produced dataset with its relative
//! path and provenance metadata. Nodes live in an arena and are addressed
//! by [`NodeId`]; nothing is ever removed. The tree is written once, at
//! the end of a successful run.

pub mod descriptor;
pub mod node;

pub use descriptor::{DatasetCategory, DatasetDescriptor, LayerDescription, Registry, DATASETS};
pub use node::{ManifestNode, MetaEntry, MetaType, NodeDocument, NodeId, NodeKind};

use crate::cache::write_atomic;
use crate::error::{BasinError, BasinResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Keys that may be set at most once per node
pub const SINGLETON_KEYS: [&str; 3] = ["ProcTimeS", "ProcTimeHuman", "Version"];

/// Base URL of per-dataset documentation pages
pub const DOCS_URL: &str = "https://tools.riverscapes.net/data/html";

#[derive(Debug, Serialize)]
struct ManifestDocument<'a> {
    project_type: &'a str,
    generator: String,
    created: DateTime<Utc>,
    project: NodeDocument,
}

pub struct ProjectManifest {
    output_dir: PathBuf,
    project_type: String,
    created: DateTime<Utc>,
    nodes: Vec<ManifestNode>,
    root: NodeId,
    datasets: NodeId,
    ids: HashSet<String>,
    paths: HashSet<String>,
    registry: Registry,
}

impl ProjectManifest {
    pub fn new(output_dir: impl Into<PathBuf>, name: &str, project_type: &str, registry: Registry) -> Self {
        let created = Utc::now();
        let mut manifest = Self {
            output_dir: output_dir.into(),
            project_type: project_type.to_string(),
            created,
            nodes: vec![ManifestNode::new("PROJECT", NodeKind::Project, name, None)],
            root: NodeId(0),
            datasets: NodeId(0),
            ids: HashSet::new(),
            paths: HashSet::new(),
            registry,
        };
        let realization = manifest.push(
            manifest.root,
            ManifestNode::new("REALIZATION1", NodeKind::Realization, "Realization1", None),
        );
        manifest.nodes[realization.0].metadata.push(MetaEntry {
            key: "DateCreated".to_string(),
            value: created.to_rfc3339(),
            value_type: MetaType::Isodate,
        });
        manifest.datasets = manifest.push(
            realization,
            ManifestNode::new("DATASETS", NodeKind::Datasets, "Datasets", None),
        );
        manifest
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Parent of every top-level dataset
    pub fn datasets(&self) -> NodeId {
        self.datasets
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn node(&self, id: NodeId) -> &ManifestNode {
        &self.nodes[id.0]
    }

    /// A node by its dataset id
    pub fn find(&self, id: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.id == id).map(NodeId)
    }

    /// Relative paths of every dataset node, layers as `package/layer`
    pub fn dataset_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.paths.iter().cloned().collect();
        paths.sort();
        paths
    }

    fn push(&mut self, parent: NodeId, node: ManifestNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn claim(&mut self, id: &str, path: &str) -> BasinResult<()> {
        if self.ids.contains(id) {
            return Err(BasinError::ManifestInconsistency(format!(
                "dataset {} is already in the manifest",
                id
            )));
        }
        if self.paths.contains(path) {
            return Err(BasinError::ManifestInconsistency(format!(
                "path {} is already in the manifest",
                path
            )));
        }
        self.ids.insert(id.to_string());
        self.paths.insert(path.to_string());
        Ok(())
    }

    fn relative(&self, actual: &Path) -> BasinResult<String> {
        let rel = actual.strip_prefix(&self.output_dir).map_err(|_| {
            BasinError::ManifestInconsistency(format!(
                "{} is outside the project directory {}",
                actual.display(),
                self.output_dir.display()
            ))
        })?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| match c {
                Component::Normal(part) => Ok(part.to_string_lossy().into_owned()),
                _ => Err(BasinError::ManifestInconsistency(format!(
                    "{} is not a plain relative path",
                    rel.display()
                ))),
            })
            .collect::<BasinResult<_>>()?;
        if parts.is_empty() {
            return Err(BasinError::ManifestInconsistency(
                "the project directory itself is not a dataset".to_string(),
            ));
        }
        Ok(parts.join("/"))
    }

    fn describe(&mut self, node: NodeId, descriptor: &DatasetDescriptor) {
        let Some(description) = self.registry.description(descriptor.id).cloned() else {
            return;
        };
        let entries = [
            ("Description", description.description, MetaType::String),
            ("SourceUrl", description.source_url, MetaType::Url),
            ("ProductVersion", description.product_version, MetaType::String),
            (
                "DocsUrl",
                format!("{}#{}", DOCS_URL, descriptor.id),
                MetaType::Url,
            ),
        ];
        for (key, value, value_type) in entries {
            self.nodes[node.0].metadata.push(MetaEntry {
                key: key.to_string(),
                value,
                value_type,
            });
        }
    }

    /// Record a produced file
    ///
    /// `actual` must exist and lie inside the project directory; the node
    /// stores its path relative to that directory. Adding the same id or
    /// path twice is an error.
    pub fn add_dataset(
        &mut self,
        parent: NodeId,
        descriptor: &DatasetDescriptor,
        actual: &Path,
    ) -> BasinResult<NodeId> {
        let rel = self.relative(actual)?;
        if !actual.exists() {
            return Err(BasinError::ManifestInconsistency(format!(
                "{} was not produced, it cannot be recorded",
                rel
            )));
        }
        self.claim(descriptor.id, &rel)?;

        let kind = match descriptor.category {
            DatasetCategory::Raster => NodeKind::Raster,
            DatasetCategory::Vector => NodeKind::Vector,
            DatasetCategory::Table => NodeKind::DataTable,
            DatasetCategory::Package => NodeKind::Geopackage,
        };
        let node = self.push(
            parent,
            ManifestNode::new(descriptor.id, kind, descriptor.name, Some(rel.clone())),
        );
        self.describe(node, descriptor);
        debug!("Manifest: {} -> {}", descriptor.id, rel);
        Ok(node)
    }

    /// Record a layer inside a package node
    pub fn add_layer(&mut self, package: NodeId, descriptor: &DatasetDescriptor) -> BasinResult<NodeId> {
        let parent = self.node(package);
        let package_path = match (parent.kind, &parent.path) {
            (NodeKind::Geopackage, Some(path)) => path.clone(),
            _ => {
                return Err(BasinError::ManifestInconsistency(format!(
                    "{} is not a package, cannot hold layer {}",
                    parent.id, descriptor.id
                )))
            }
        };
        let key = format!("{}/{}", package_path, descriptor.path);
        self.claim(descriptor.id, &key)?;

        let kind = match descriptor.category {
            DatasetCategory::Table => NodeKind::DataTable,
            _ => NodeKind::Layer,
        };
        let node = self.push(
            package,
            ManifestNode::new(descriptor.id, kind, descriptor.name, Some(descriptor.path.to_string())),
        );
        self.describe(node, descriptor);
        Ok(node)
    }

    /// Append a metadata entry
    ///
    /// Repeated keys accumulate, except [`SINGLETON_KEYS`] which may be set
    /// once per node.
    pub fn add_metadata(
        &mut self,
        node: NodeId,
        key: &str,
        value: impl Into<String>,
        value_type: MetaType,
    ) -> BasinResult<()> {
        let target = &mut self.nodes[node.0];
        if SINGLETON_KEYS.contains(&key) && target.metadata.iter().any(|m| m.key == key) {
            return Err(BasinError::ManifestInconsistency(format!(
                "{} is already set on {}",
                key, target.id
            )));
        }
        target.metadata.push(MetaEntry {
            key: key.to_string(),
            value: value.into(),
            value_type,
        });
        Ok(())
    }

    fn document(&self, id: NodeId) -> NodeDocument {
        let node = self.node(id);
        NodeDocument {
            id: node.id.clone(),
            kind: node.kind,
            name: node.name.clone(),
            path: node.path.clone(),
            metadata: node.metadata.clone(),
            children: node.children.iter().map(|c| self.document(*c)).collect(),
        }
    }

    /// The manifest as a JSON document
    pub fn serialize(&self) -> BasinResult<String> {
        let document = ManifestDocument {
            project_type: &self.project_type,
            generator: format!("basin {}", env!("CARGO_PKG_VERSION")),
            created: self.created,
            project: self.document(self.root),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Serialize and write atomically to `path`
    pub async fn write(&self, path: &Path) -> BasinResult<()> {
        let content = self.serialize()?;
        write_atomic(path, content.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(temp: &TempDir) -> ProjectManifest {
        ProjectManifest::new(temp.path(), "Basin Context for HUC 1701020301", "BasinContext", Registry::builtin().unwrap())
    }

    fn produce(temp: &TempDir, rel: &str) -> PathBuf {
        let path = temp.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"data").unwrap();
        path
    }

    #[test]
    fn records_relative_paths() {
        let temp = TempDir::new().unwrap();
        let mut m = manifest(&temp);
        let dem = Registry::builtin().unwrap().get("DEM").unwrap();
        let node = m.add_dataset(m.datasets(), dem, &produce(&temp, "topography/dem.tif")).unwrap();
        assert_eq!(m.node(node).path.as_deref(), Some("topography/dem.tif"));
        assert_eq!(m.node(node).kind, NodeKind::Raster);
    }

    #[test]
    fn duplicate_dataset_is_inconsistent() {
        let temp = TempDir::new().unwrap();
        let mut m = manifest(&temp);
        let dem = m.registry().get("DEM").unwrap();
        let path = produce(&temp, "topography/dem.tif");
        m.add_dataset(m.datasets(), dem, &path).unwrap();
        let err = m.add_dataset(m.datasets(), dem, &path).unwrap_err();
        assert!(matches!(err, BasinError::ManifestInconsistency(_)));
    }

    #[test]
    fn unproduced_or_outside_paths_are_rejected() {
        let temp = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let mut m = manifest(&temp);
        let slope = m.registry().get("SLOPE").unwrap();
        assert!(m
            .add_dataset(m.datasets(), slope, &temp.path().join("topography/slope.tif"))
            .is_err());
        let outside = other.path().join("slope.tif");
        std::fs::write(&outside, b"x").unwrap();
        assert!(m.add_dataset(m.datasets(), slope, &outside).is_err());
        assert!(m.find("SLOPE").is_none());
    }

    #[test]
    fn metadata_appends_but_singletons_are_set_once() {
        let temp = TempDir::new().unwrap();
        let mut m = manifest(&temp);
        let root = m.root();
        m.add_metadata(root, "Operator", "a", MetaType::String).unwrap();
        m.add_metadata(root, "Operator", "b", MetaType::String).unwrap();
        assert_eq!(m.node(root).values("Operator"), vec!["a", "b"]);

        m.add_metadata(root, "ProcTimeS", "12.50", MetaType::Float).unwrap();
        let err = m.add_metadata(root, "ProcTimeS", "13.00", MetaType::Float).unwrap_err();
        assert!(matches!(err, BasinError::ManifestInconsistency(_)));
    }

    #[test]
    fn layers_live_inside_packages() {
        let temp = TempDir::new().unwrap();
        let mut m = manifest(&temp);
        let registry = Registry::builtin().unwrap();
        let hydro = registry.get("HYDROLOGY").unwrap();
        let package = m
            .add_dataset(m.datasets(), hydro, &produce(&temp, "hydrology/hydrology.gpkg"))
            .unwrap();
        let vaa = hydro.child("NHDPlusFlowlineVAA").unwrap();
        let table = m.add_layer(package, vaa).unwrap();
        assert_eq!(m.node(table).kind, NodeKind::DataTable);
        assert!(m
            .dataset_paths()
            .contains(&"hydrology/hydrology.gpkg/NHDPlusFlowlineVAA".to_string()));

        let flowline = hydro.child("NHDFlowline").unwrap();
        assert!(m.add_layer(m.datasets(), flowline).is_err());
    }

    #[test]
    fn descriptions_become_metadata() {
        let temp = TempDir::new().unwrap();
        let mut registry = Registry::builtin().unwrap();
        registry.insert_description(
            "Roads",
            LayerDescription {
                description: "Road segments".to_string(),
                source_url: "https://example.org/roads".to_string(),
                product_version: "2020".to_string(),
            },
        );
        let mut m = ProjectManifest::new(temp.path(), "p", "BasinContext", registry);
        let roads = m.registry().get("Roads").unwrap();
        let node = m
            .add_dataset(m.datasets(), roads, &produce(&temp, "transportation/roads.shp"))
            .unwrap();
        assert_eq!(
            m.node(node).values("DocsUrl"),
            vec!["https://tools.riverscapes.net/data/html#Roads"]
        );
        assert_eq!(m.node(node).values("ProductVersion"), vec!["2020"]);
    }

    #[tokio::test]
    async fn writes_json_document() {
        let temp = TempDir::new().unwrap();
        let mut m = manifest(&temp);
        let dem = m.registry().get("DEM").unwrap();
        m.add_dataset(m.datasets(), dem, &produce(&temp, "topography/dem.tif")).unwrap();
        let out = temp.path().join("project.json");
        m.write(&out).await.unwrap();

        let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        let datasets = &doc["project"]["children"][0]["children"][0];
        assert_eq!(datasets["type"], "Datasets");
        assert_eq!(datasets["children"][0]["path"], "topography/dem.tif");
    }
}

use serde::Serialize;
use std::fmt;

/// Index of a node in the manifest arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Type tag of a manifest node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    Project,
    Realization,
    Datasets,
    Raster,
    Vector,
    DataTable,
    Geopackage,
    Layer,
}

impl NodeKind {
    /// Nodes of these kinds point at a file or layer
    pub fn is_dataset(&self) -> bool {
        !matches!(self, Self::Project | Self::Realization | Self::Datasets)
    }
}

/// How a metadata value should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaType {
    String,
    Int,
    Float,
    Json,
    Url,
    Isodate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: MetaType,
}

impl fmt::Display for MetaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[derive(Debug, Clone)]
pub struct ManifestNode {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    /// Relative to the project root, or the layer name inside a package
    pub path: Option<String>,
    pub metadata: Vec<MetaEntry>,
    pub children: Vec<NodeId>,
}

impl ManifestNode {
    pub(crate) fn new(id: impl Into<String>, kind: NodeKind, name: impl Into<String>, path: Option<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            path,
            metadata: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Values recorded under `key`, in insertion order
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.metadata
            .iter()
            .filter(|m| m.key == key)
            .map(|m| m.value.as_str())
            .collect()
    }
}

/// Serialized form of one node and its subtree
#[derive(Debug, Serialize)]
pub struct NodeDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetaEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDocument>,
}

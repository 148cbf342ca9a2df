//! Dependency graph: node table, edge list and queries over them.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::sdf;

/// Image and video extensions classified as textures.
const TEXTURE_EXTENSIONS: &[&str] = &[
    ".jpg", ".tex", ".tx", ".png", ".exr", ".hdr", ".tga", ".tif", ".tiff", ".pic", ".gif", ".psd", ".ptex",
    ".cin", ".dpx", ".bmp", ".iff", ".mov", ".m4v", ".mp4", ".webp",
];

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Sublayer,
    Reference,
    Payload,
    Variant,
    Clip,
    Material,
    Ext,
    Tex,
    Error,
}

impl NodeKind {
    /// Kind of a file found in an `asset` attribute.
    ///
    /// The extension is matched as written, so `.PNG` is not a texture.
    pub fn classify_asset(path: &str) -> NodeKind {
        let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        match file_name.rfind('.') {
            Some(dot) if TEXTURE_EXTENSIONS.iter().any(|ext| *ext == &file_name[dot..]) => NodeKind::Tex,
            _ => NodeKind::Ext,
        }
    }

    pub fn as_str(&self) -> &str {
        self.as_ref()
    }
}

/// True when an attribute owner is a shader sitting directly under a material.
pub fn is_material_shader(owner: &sdf::PrimSpec, parent: Option<&sdf::PrimSpec>) -> bool {
    owner.type_name() == "Shader" && parent.is_some_and(|p| p.type_name() == "Material")
}

/// Layer metadata stored on nodes backed by an opened layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerInfo {
    pub specifier: sdf::Specifier,
    pub default_prim: Option<String>,
    pub pseudo_root: String,
    pub root_prims: Vec<String>,
    /// Every prim path in the layer, depth first.
    pub prims: Vec<String>,
    /// Layer metadata except `subLayers` and `subLayerOffsets`.
    pub info: BTreeMap<String, sdf::Value>,
    pub muted: bool,
}

impl LayerInfo {
    pub fn from_layer(layer: &sdf::Layer) -> Self {
        let info = layer
            .pseudo_root
            .metadata
            .iter()
            .filter(|(key, _)| {
                key.as_str() != sdf::FieldKey::SubLayers.as_str()
                    && key.as_str() != sdf::FieldKey::SubLayerOffsets.as_str()
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        LayerInfo {
            specifier: layer.pseudo_root.specifier,
            default_prim: layer.default_prim().map(str::to_owned),
            pseudo_root: layer.pseudo_root.name.clone(),
            root_prims: layer.root_prims().iter().map(|p| p.path.clone()).collect(),
            prims: layer
                .pseudo_root
                .flattened()
                .iter()
                .map(|entry| entry.prim.path.clone())
                .collect(),
            info,
            muted: layer.muted,
        }
    }
}

/// Per-kind extra data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDetail {
    Texture {
        color_space: Option<String>,
    },
    VariantSet {
        variant_set: String,
        variants: Vec<String>,
        current_variant: Option<String>,
    },
    Clip {
        prim_path: String,
        clip_set: String,
    },
}

/// A node of the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub online: bool,
    pub kind: NodeKind,
    pub path: String,
    pub errored: bool,
    pub incoming_edge_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<LayerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<NodeDetail>,
}

impl NodeRecord {
    pub fn new(kind: NodeKind, path: impl Into<String>, online: bool) -> Self {
        NodeRecord {
            online,
            kind,
            path: path.into(),
            errored: false,
            incoming_edge_count: 0,
            layer: None,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: NodeDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Node for a layer that failed to open.
    pub fn error(path: impl Into<String>) -> Self {
        NodeRecord {
            errored: true,
            ..NodeRecord::new(NodeKind::Error, path, true)
        }
    }

    /// Fold a later write for the same key into this record.
    fn merge(&mut self, update: NodeRecord) {
        self.online = update.online;
        self.errored |= update.errored;
        if update.kind == NodeKind::Error {
            self.kind = NodeKind::Error;
        }
        if self.layer.is_none() {
            self.layer = update.layer;
        }
        if self.detail.is_none() {
            self.detail = update.detail;
        }
    }
}

/// A directed `(source, dest, label)` dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    pub source: String,
    pub dest: String,
    pub label: String,
}

/// Node table and edge list of one walk.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    root: Option<String>,
    nodes: Vec<(String, NodeRecord)>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    edge_set: HashSet<Edge>,
    errored_paths: Vec<String>,
    cycles: Vec<(String, String)>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_root(&mut self, key: impl Into<String>) {
        self.root = Some(key.into());
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Insert a node, or merge into the existing record with the same key.
    pub fn upsert_node(&mut self, key: &str, record: NodeRecord) {
        match self.index.get(key) {
            Some(&index) => self.nodes[index].1.merge(record),
            None => {
                self.index.insert(key.to_owned(), self.nodes.len());
                self.nodes.push((key.to_owned(), record));
            }
        }
    }

    /// Store layer metadata on a node that has none yet.
    pub fn set_layer_info(&mut self, key: &str, info: LayerInfo) {
        if let Some(&index) = self.index.get(key) {
            let record = &mut self.nodes[index].1;
            if record.layer.is_none() {
                record.layer = Some(info);
            }
        }
    }

    /// Add an edge unless the same triple exists. Returns whether it was added.
    pub fn add_edge(&mut self, source: &str, dest: &str, label: &str) -> bool {
        let edge = Edge {
            source: source.to_owned(),
            dest: dest.to_owned(),
            label: label.to_owned(),
        };
        if !self.edge_set.insert(edge.clone()) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn record_error(&mut self, path: &str) {
        if !self.errored_paths.iter().any(|p| p == path) {
            self.errored_paths.push(path.to_owned());
        }
    }

    pub fn record_cycle(&mut self, from: &str, to: &str) {
        let pair = (from.to_owned(), to.to_owned());
        if !self.cycles.contains(&pair) {
            self.cycles.push(pair);
        }
    }

    /// Set every node's incoming edge count from the edge list, once the walk is done.
    pub(crate) fn count_incoming(&mut self) {
        for (_, record) in &mut self.nodes {
            record.incoming_edge_count = 0;
        }
        for edge in &self.edges {
            if let Some(&index) = self.index.get(&edge.dest) {
                self.nodes[index].1.incoming_edge_count += 1;
            }
        }
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeRecord)> {
        self.nodes.iter().map(|(key, record)| (key.as_str(), record))
    }

    pub fn node(&self, key: &str) -> Option<&NodeRecord> {
        self.index.get(key).map(|&index| &self.nodes[index].1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn errored_paths(&self) -> &[String] {
        &self.errored_paths
    }

    pub fn cycles(&self) -> &[(String, String)] {
        &self.cycles
    }

    /// Display label of a node: the last path component of its key.
    pub fn label(key: &str) -> &str {
        key.rsplit(['/', '\\']).next().unwrap_or(key)
    }

    /// Keys whose label contains `pattern`, ignoring case.
    pub fn find(&self, pattern: &str) -> Vec<&str> {
        let pattern = pattern.trim_matches('*').to_lowercase();
        self.nodes()
            .map(|(key, _)| key)
            .filter(|key| Self::label(key).to_lowercase().contains(&pattern))
            .collect()
    }

    /// Keys of nodes that are not on disk.
    pub fn offline(&self) -> Vec<&str> {
        self.nodes()
            .filter(|(_, record)| !record.online)
            .map(|(key, _)| key)
            .collect()
    }

    /// Everything `key` depends on, directly or transitively, breadth first.
    pub fn dependencies_of(&self, key: &str) -> Vec<&str> {
        self.traverse(key, |edge| (edge.source.as_str(), edge.dest.as_str()))
    }

    /// Everything that depends on `key`, directly or transitively, breadth first.
    pub fn dependents_of(&self, key: &str) -> Vec<&str> {
        self.traverse(key, |edge| (edge.dest.as_str(), edge.source.as_str()))
    }

    fn traverse<'a>(&'a self, key: &str, direction: impl Fn(&'a Edge) -> (&'a str, &'a str)) -> Vec<&'a str> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            let (from, to) = direction(edge);
            adjacency.entry(from).or_default().push(to);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(key);

        while let Some(current) = queue.pop_front() {
            for &next in adjacency.get(current).into_iter().flatten() {
                if next != key && seen.insert(next) {
                    out.push(next);
                    queue.push_back(next);
                }
            }
        }

        out
    }
}

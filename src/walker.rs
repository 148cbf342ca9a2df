//! Dependency walker.
//!
//! Starting from a root layer, the walker opens every layer reachable through
//! sublayers, references, payloads and the selected variants, and records what
//! each layer depends on in a [`DependencyGraph`]. Materials, variant sets and
//! clip sequences have no file of their own and get synthesized nodes.

use std::{
    collections::{HashMap, HashSet},
    env,
    path::Path,
    sync::Arc,
};

use log::{debug, info, trace, warn};

use crate::{
    clip::ClipSequence,
    graph::{is_material_shader, DependencyGraph, Edge, LayerInfo, NodeDetail, NodeKind, NodeRecord},
    resolve::{self, DefaultResolver, Resolver},
    sdf::{self, CompositionArc},
    source::{FileLayerSource, LayerError, LayerSource},
    usdz,
};

/// Walk configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    walk_attributes: bool,
    cache_layers: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            walk_attributes: false,
            cache_layers: true,
        }
    }
}

impl WalkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also follow `asset` attributes (textures, materials and other files).
    pub fn walk_attributes(mut self, enabled: bool) -> Self {
        self.walk_attributes = enabled;
        self
    }

    /// Keep opened layers for the rest of the run.
    pub fn cache_layers(mut self, enabled: bool) -> Self {
        self.cache_layers = enabled;
        self
    }

    pub fn walks_attributes(&self) -> bool {
        self.walk_attributes
    }

    pub fn caches_layers(&self) -> bool {
        self.cache_layers
    }
}

/// Layer path without its extension, used to key synthesized nodes.
fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind(['/', '\\']).map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    }
}

/// Key prefix for nodes synthesized from a layer's content.
fn layer_stem(real_path: &str) -> String {
    match usdz::split_package_path(real_path) {
        Some((package, entry)) => usdz::package_path(package, strip_extension(entry)),
        None => strip_extension(real_path).to_owned(),
    }
}

/// Layer paths in first-discovery order, each once.
#[derive(Debug, Default)]
struct Targets {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl Targets {
    fn push(&mut self, target: String) {
        if self.seen.insert(target.clone()) {
            self.order.push(target);
        }
    }
}

/// Arcs found in one layer that lead to further layers.
#[derive(Debug, Default)]
struct Discovered {
    sublayers: Targets,
    references: Targets,
    payloads: Targets,
}

/// An authored asset path after resolution.
///
/// Unresolved assets keep the authored path as their key and are never online.
struct Located {
    key: String,
    resolved: bool,
    online: bool,
}

/// Builds the dependency graph of a root layer.
pub struct DependencyWalker<S, R> {
    root: String,
    source: S,
    resolver: R,
    options: WalkOptions,
    graph: DependencyGraph,
    cache: HashMap<String, Arc<sdf::Layer>>,
    in_progress: HashSet<String>,
    completed: HashSet<String>,
}

impl DependencyWalker<FileLayerSource, DefaultResolver> {
    /// Walker reading from the filesystem, with search paths from the environment.
    pub fn on_disk(root: impl Into<String>) -> Self {
        Self::new(root, FileLayerSource::new(), DefaultResolver::from_env())
    }
}

impl<S: LayerSource, R: Resolver> DependencyWalker<S, R> {
    pub fn new(root: impl Into<String>, source: S, resolver: R) -> Self {
        Self {
            root: root.into(),
            source,
            resolver,
            options: WalkOptions::default(),
            graph: DependencyGraph::new(),
            cache: HashMap::new(),
            in_progress: HashSet::new(),
            completed: HashSet::new(),
        }
    }

    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> WalkOptions {
        self.options
    }

    /// Walk from the root and rebuild the graph.
    ///
    /// Failures never propagate: a root that cannot be opened leaves the node
    /// table empty, and a root that fails to parse is also listed in
    /// [`errored_paths`](Self::errored_paths).
    pub fn start(&mut self) {
        self.cache.clear();
        self.in_progress.clear();
        self.completed.clear();

        let mut graph = DependencyGraph::new();
        self.walk_root(&mut graph);
        graph.count_incoming();

        info!(
            "Walked {}: {} nodes, {} edges, {} errored, {} cycles",
            self.root,
            graph.node_count(),
            graph.edges().len(),
            graph.errored_paths().len(),
            graph.cycles().len()
        );

        self.graph = graph;
        self.cache.clear();
    }

    fn absolute_root(&self) -> String {
        if resolve::is_absolute(&self.root) {
            return self.root.clone();
        }
        match env::current_dir() {
            Ok(cwd) => cwd.join(&self.root).to_string_lossy().into_owned(),
            Err(_) => self.root.clone(),
        }
    }

    fn walk_root(&mut self, graph: &mut DependencyGraph) {
        let absolute = self.absolute_root();
        info!("Walking dependencies of {absolute}");

        let basename = Path::new(&absolute)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let root_key = self
            .resolver
            .resolve_anchored(&absolute, &basename)
            .unwrap_or_else(|| resolve::normalize_path(&absolute));

        match self.source.open(&root_key) {
            Ok(Some(layer)) => {
                if self.options.cache_layers {
                    self.cache.insert(root_key.clone(), layer);
                }
            }
            Ok(None) => {
                warn!("Root layer {root_key} could not be found");
                return;
            }
            Err(err) => {
                warn!("{err}");
                graph.record_error(&root_key);
                return;
            }
        }

        graph.set_root(root_key.as_str());
        graph.upsert_node(
            &root_key,
            NodeRecord::new(NodeKind::Sublayer, root_key.as_str(), self.resolver.exists(&root_key)),
        );

        self.walk_layer(graph, &root_key, 1);
    }

    fn open_layer(&mut self, path: &str) -> Result<Option<Arc<sdf::Layer>>, LayerError> {
        if let Some(layer) = self.cache.get(path) {
            return Ok(Some(Arc::clone(layer)));
        }

        let layer = self.source.open(path)?;
        if let (Some(layer), true) = (&layer, self.options.cache_layers) {
            self.cache.insert(path.to_owned(), Arc::clone(layer));
        }
        Ok(layer)
    }

    /// Resolve `asset` against the layer at `anchor`, then without it.
    fn resolve(&self, anchor: &str, asset: &str) -> Option<String> {
        let resolved = self
            .resolver
            .resolve_anchored(anchor, asset)
            .or_else(|| self.resolver.resolve(asset));
        match &resolved {
            Some(path) => trace!("Resolved {asset} from {anchor} to {path}"),
            None => debug!("Unable to resolve {asset} from {anchor}"),
        }
        resolved
    }

    fn locate(&self, anchor: &str, asset: &str) -> Located {
        match self.resolve(anchor, asset) {
            Some(path) => Located {
                online: self.resolver.exists(&path),
                key: path,
                resolved: true,
            },
            None => Located {
                key: asset.to_owned(),
                resolved: false,
                online: false,
            },
        }
    }

    fn walk_layer(&mut self, graph: &mut DependencyGraph, layer_path: &str, depth: usize) {
        let indent = "-".repeat(depth);

        let layer = match self.open_layer(layer_path) {
            Ok(Some(layer)) => layer,
            Ok(None) => {
                debug!("{indent} {layer_path} is not available");
                self.completed.insert(layer_path.to_owned());
                return;
            }
            Err(err) => {
                warn!("{indent} {err}");
                graph.upsert_node(layer_path, NodeRecord::error(layer_path));
                graph.record_error(layer_path);
                self.completed.insert(layer_path.to_owned());
                return;
            }
        };

        debug!("{indent} {layer_path}");
        self.in_progress.insert(layer_path.to_owned());

        graph.set_layer_info(layer_path, LayerInfo::from_layer(&layer));

        let mut found = Discovered::default();

        for entry in layer.pseudo_root.flattened() {
            if self.options.walk_attributes {
                self.scan_attributes(graph, &layer, layer_path, entry);
            }
            self.scan_clips(graph, layer_path, entry.prim);
            self.scan_variant_sets(graph, &layer, layer_path, entry.prim, &mut found);
            self.scan_arcs(graph, layer_path, entry.prim, &mut found);
        }

        for sublayer in layer.sub_layer_paths() {
            let located = self.locate(layer_path, &sublayer);
            graph.upsert_node(
                &located.key,
                NodeRecord::new(NodeKind::Sublayer, located.key.as_str(), located.online),
            );
            graph.add_edge(layer_path, &located.key, NodeKind::Sublayer.as_str());
            if located.resolved {
                found.sublayers.push(located.key);
            }
        }

        for (label, targets) in [
            ("sublayers", &found.sublayers),
            ("references", &found.references),
            ("payloads", &found.payloads),
        ] {
            if !targets.order.is_empty() {
                debug!("{indent} {label}: {:?}", targets.order);
            }
        }

        for target in found
            .sublayers
            .order
            .iter()
            .chain(&found.references.order)
            .chain(&found.payloads.order)
        {
            self.descend(graph, layer_path, target, depth + 1);
        }

        self.in_progress.remove(layer_path);
        self.completed.insert(layer_path.to_owned());
    }

    /// Recurse into `to` unless it is already walked or on the current path.
    fn descend(&mut self, graph: &mut DependencyGraph, from: &str, to: &str, depth: usize) {
        if self.in_progress.contains(to) {
            warn!("Cycle detected: {from} leads back to {to}");
            graph.record_cycle(from, to);
            return;
        }
        if self.completed.contains(to) {
            trace!("{to} already walked");
            return;
        }
        self.walk_layer(graph, to, depth);
    }

    /// Files named by `asset` attributes, grouped under materials where they feed a shader.
    fn scan_attributes(
        &self,
        graph: &mut DependencyGraph,
        layer: &sdf::Layer,
        layer_path: &str,
        entry: sdf::FlatEntry<'_>,
    ) {
        for attribute in entry.prim.attributes.iter().filter(|a| a.is_asset()) {
            let Some(asset) = attribute.asset_path() else {
                continue;
            };

            let located = self.locate(layer_path, asset);
            let resolved = located.key;
            let kind = NodeKind::classify_asset(&resolved);
            let mut record = NodeRecord::new(kind, resolved.as_str(), located.online);
            if kind == NodeKind::Tex {
                record = record.with_detail(NodeDetail::Texture {
                    color_space: attribute.color_space().map(str::to_owned),
                });
            }
            graph.upsert_node(&resolved, record);

            match entry.parent {
                Some(material) if is_material_shader(entry.prim, entry.parent) => {
                    let material_key = format!("{}:{}", layer_stem(&layer.real_path), material.name);
                    graph.upsert_node(
                        &material_key,
                        NodeRecord::new(NodeKind::Material, material_key.as_str(), true),
                    );
                    graph.add_edge(layer_path, &material_key, "materials");
                    graph.add_edge(&material_key, &resolved, &attribute.name);
                }
                _ => {
                    graph.add_edge(layer_path, &resolved, kind.as_str());
                }
            }
        }
    }

    /// One node per clip set, named after the frame span of its assets.
    fn scan_clips(&self, graph: &mut DependencyGraph, layer_path: &str, prim: &sdf::PrimSpec) {
        for clip_set in prim.clip_sets() {
            let Some(sequence) = ClipSequence::infer(&clip_set.asset_paths) else {
                debug!("Clip set {} on {} has no asset paths", clip_set.name, prim.path);
                continue;
            };

            let clip_key = self
                .resolver
                .resolve_anchored(layer_path, &sequence.name)
                .unwrap_or_else(|| resolve::anchor_path(layer_path, &sequence.name));

            let frames: Vec<Located> = clip_set
                .asset_paths
                .iter()
                .map(|asset| self.locate(layer_path, asset))
                .collect();
            let online = frames.iter().all(|frame| frame.online);
            let first_frame = frames.first().map(|frame| frame.key.clone()).unwrap_or_default();

            graph.upsert_node(
                &clip_key,
                NodeRecord::new(NodeKind::Clip, first_frame, online).with_detail(NodeDetail::Clip {
                    prim_path: clip_set.prim_path.clone().unwrap_or_default(),
                    clip_set: clip_set.name.clone(),
                }),
            );
            graph.add_edge(layer_path, &clip_key, NodeKind::Clip.as_str());

            if let Some(manifest) = &clip_set.manifest_asset_path {
                let located = self.locate(layer_path, manifest);
                graph.upsert_node(
                    &located.key,
                    NodeRecord::new(NodeKind::Ext, located.key.as_str(), located.online),
                );
                graph.add_edge(&clip_key, &located.key, "manifest");
            }
        }
    }

    /// Variant set nodes, and the arcs authored inside each set's selected variant.
    fn scan_variant_sets(
        &self,
        graph: &mut DependencyGraph,
        layer: &sdf::Layer,
        layer_path: &str,
        prim: &sdf::PrimSpec,
        found: &mut Discovered,
    ) {
        for variant_set in &prim.variant_sets {
            let variant_key = format!("{}:{}", layer_stem(&layer.real_path), variant_set.name);
            let selection = prim.variant_selection(&variant_set.name);

            graph.upsert_node(
                &variant_key,
                NodeRecord::new(NodeKind::Variant, variant_key.as_str(), true).with_detail(NodeDetail::VariantSet {
                    variant_set: variant_set.name.clone(),
                    variants: variant_set.variant_names(),
                    current_variant: selection.map(str::to_owned),
                }),
            );
            graph.add_edge(layer_path, &variant_key, NodeKind::Variant.as_str());

            let Some(variant) = selection.and_then(|name| variant_set.variant(name)) else {
                continue;
            };

            for entry in variant.prim.flattened() {
                for payload in entry.prim.payloads.flattened() {
                    let resolved = self.link_arc(graph, layer_path, &variant_key, &payload, NodeKind::Payload, &variant.name);
                    if let Some(resolved) = resolved {
                        found.payloads.push(resolved);
                    }
                }
                for reference in entry.prim.references.flattened() {
                    let resolved =
                        self.link_arc(graph, layer_path, &variant_key, &reference, NodeKind::Reference, &variant.name);
                    if let Some(resolved) = resolved {
                        found.references.push(resolved);
                    }
                }
            }
        }
    }

    /// Payloads and references authored directly on a prim.
    fn scan_arcs(&self, graph: &mut DependencyGraph, layer_path: &str, prim: &sdf::PrimSpec, found: &mut Discovered) {
        for payload in prim.payloads.flattened() {
            let label = NodeKind::Payload.as_str();
            if let Some(resolved) = self.link_arc(graph, layer_path, layer_path, &payload, NodeKind::Payload, label) {
                found.payloads.push(resolved);
            }
        }
        for reference in prim.references.flattened() {
            let label = NodeKind::Reference.as_str();
            if let Some(resolved) = self.link_arc(graph, layer_path, layer_path, &reference, NodeKind::Reference, label)
            {
                found.references.push(resolved);
            }
        }
    }

    /// Add the target of an arc and an edge `(source, target, label)` to it.
    ///
    /// Arcs into the same layer (no asset path) are skipped. Returns the target
    /// to walk next, `None` when it could not be resolved.
    fn link_arc(
        &self,
        graph: &mut DependencyGraph,
        layer_path: &str,
        source: &str,
        arc: &impl CompositionArc,
        kind: NodeKind,
        label: &str,
    ) -> Option<String> {
        let asset = arc.asset_path();
        if asset.is_empty() {
            return None;
        }

        let located = self.locate(layer_path, asset);
        graph.upsert_node(&located.key, NodeRecord::new(kind, located.key.as_str(), located.online));
        graph.add_edge(source, &located.key, label);
        located.resolved.then_some(located.key)
    }

    /// Canonical key of the root layer, once walked.
    pub fn root_key(&self) -> Option<&str> {
        self.graph.root()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeRecord)> {
        self.graph.nodes()
    }

    pub fn node(&self, key: &str) -> Option<&NodeRecord> {
        self.graph.node(key)
    }

    pub fn edges(&self) -> &[Edge] {
        self.graph.edges()
    }

    pub fn errored_paths(&self) -> &[String] {
        self.graph.errored_paths()
    }

    /// `(from, to)` pairs where `to` was already being walked when `from` led back to it.
    pub fn cycles(&self) -> &[(String, String)] {
        self.graph.cycles()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn into_graph(self) -> DependencyGraph {
        self.graph
    }
}

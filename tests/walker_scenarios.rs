//! Walks layers written to disk with the filesystem source and resolver.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use usd_noodle::graph::NodeDetail;
use usd_noodle::resolve::normalize_path;
use zip::write::SimpleFileOptions;

use usd_noodle::{DefaultResolver, DependencyGraph, DependencyWalker, FileLayerSource, NodeKind, WalkOptions};

fn write(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture directory");
    }
    fs::write(&path, text).expect("write fixture");
    key(&path)
}

fn key(path: &Path) -> String {
    normalize_path(&path.to_string_lossy())
}

fn walk_with(root: &str, options: WalkOptions) -> DependencyGraph {
    let mut walker = DependencyWalker::new(root, FileLayerSource::new(), DefaultResolver::new()).with_options(options);
    walker.start();
    walker.into_graph()
}

fn walk(root: &str) -> DependencyGraph {
    walk_with(root, WalkOptions::new())
}

fn has_edge(graph: &DependencyGraph, source: &str, dest: &str, label: &str) -> bool {
    graph
        .edges()
        .iter()
        .any(|e| e.source == source && e.dest == dest && e.label == label)
}

fn assert_edge_invariants(graph: &DependencyGraph) {
    let edges = graph.edges();
    for (i, edge) in edges.iter().enumerate() {
        assert!(!edges[..i].contains(edge), "duplicate edge {edge:?}");
    }
    for (key, record) in graph.nodes() {
        let incoming = edges.iter().filter(|e| e.dest == key).count();
        assert_eq!(record.incoming_edge_count, incoming, "incoming edges of {key}");
    }
}

#[test]
fn self_contained_layer_is_a_single_node() {
    let dir = TempDir::new().unwrap();
    let root = write(dir.path(), "root.usda", "#usda 1.0\ndef Xform \"World\" {\n}\n");

    let graph = walk(&root);

    assert_eq!(graph.root(), Some(root.as_str()));
    assert_eq!(graph.node_count(), 1);
    assert!(graph.edges().is_empty());

    let node = graph.node(&root).unwrap();
    assert_eq!(node.kind, NodeKind::Sublayer);
    assert!(node.online);
    assert!(!node.errored);
}

#[test]
fn sublayer_adds_one_node_and_edge() {
    let dir = TempDir::new().unwrap();
    let root = write(dir.path(), "root.usda", "#usda 1.0\n(\n    subLayers = [@./sub.usda@]\n)\n");
    let sub = write(dir.path(), "sub.usda", "#usda 1.0\n");

    let graph = walk(&root);

    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edges().len(), 1);
    assert!(has_edge(&graph, &root, &sub, "sublayer"));
    assert!(graph.node(&sub).unwrap().online);
    assert_eq!(graph.node(&sub).unwrap().incoming_edge_count, 1);
    assert_eq!(graph.node(&root).unwrap().incoming_edge_count, 0);
}

#[test]
fn missing_reference_is_offline() {
    let dir = TempDir::new().unwrap();
    let root = write(
        dir.path(),
        "root.usda",
        "#usda 1.0\ndef \"Prop\" (\n    references = @/missing/foo.ext@</Prop>\n)\n{\n}\n",
    );

    let graph = walk(&root);

    let missing = graph.node("/missing/foo.ext").unwrap();
    assert_eq!(missing.kind, NodeKind::Reference);
    assert!(!missing.online);
    assert!(has_edge(&graph, &root, "/missing/foo.ext", "reference"));
    assert_eq!(graph.offline(), vec!["/missing/foo.ext"]);
    assert!(graph.errored_paths().is_empty());
}

fn clip_layer(dir: &Path) -> String {
    write(
        dir,
        "crowd.usda",
        r#"#usda 1.0
def "Crowd" (
    clips = {
        dictionary default = {
            asset[] assetPaths = [@./clips/shot.1001.usd@, @./clips/shot.1002.usd@, @./clips/shot.1003.usd@, @./clips/shot.1004.usd@, @./clips/shot.1005.usd@]
            asset manifestAssetPath = @./clips/manifest.usda@
            string primPath = "/Crowd"
        }
    }
)
{
}
"#,
    )
}

#[test]
fn clip_sequence_is_online_when_every_frame_exists() {
    let dir = TempDir::new().unwrap();
    let root = clip_layer(dir.path());
    for frame in 1001..=1005 {
        write(dir.path(), &format!("clips/shot.{frame}.usd"), "#usda 1.0\n");
    }

    let graph = walk(&root);

    let clip_key = key(&dir.path().join("clips/shot.1001-1005.usd"));
    assert!(clip_key.contains("1001-1005"));
    let clip = graph.node(&clip_key).unwrap();
    assert_eq!(clip.kind, NodeKind::Clip);
    assert!(clip.online);
    assert_eq!(clip.path, key(&dir.path().join("clips/shot.1001.usd")));
    assert_eq!(
        clip.detail,
        Some(NodeDetail::Clip {
            prim_path: "/Crowd".into(),
            clip_set: "default".into(),
        })
    );
    assert!(has_edge(&graph, &root, &clip_key, "clip"));

    let manifest = key(&dir.path().join("clips/manifest.usda"));
    assert!(has_edge(&graph, &clip_key, &manifest, "manifest"));
    assert!(!graph.node(&manifest).unwrap().online);
}

#[test]
fn clip_sequence_with_a_missing_frame_is_offline() {
    let dir = TempDir::new().unwrap();
    let root = clip_layer(dir.path());
    for frame in [1001, 1002, 1004, 1005] {
        write(dir.path(), &format!("clips/shot.{frame}.usd"), "#usda 1.0\n");
    }

    let graph = walk(&root);

    let clip_key = key(&dir.path().join("clips/shot.1001-1005.usd"));
    assert!(!graph.node(&clip_key).unwrap().online);
}

#[test]
fn clip_set_without_manifest_has_no_manifest_edge() {
    let dir = TempDir::new().unwrap();
    let root = write(
        dir.path(),
        "crowd.usda",
        r#"#usda 1.0
def "Crowd" (
    clips = {
        dictionary default = {
            asset[] assetPaths = [@./clips/shot.1001.usd@, @./clips/shot.1002.usd@]
        }
    }
)
{
}
"#,
    );
    write(dir.path(), "clips/shot.1001.usd", "#usda 1.0\n");
    write(dir.path(), "clips/shot.1002.usd", "#usda 1.0\n");

    let graph = walk(&root);

    let clip_key = key(&dir.path().join("clips/shot.1001-1002.usd"));
    let clip = graph.node(&clip_key).unwrap();
    assert!(clip.online);
    assert_eq!(
        clip.detail,
        Some(NodeDetail::Clip {
            prim_path: String::new(),
            clip_set: "default".into(),
        })
    );
    assert!(has_edge(&graph, &root, &clip_key, "clip"));
    assert!(graph.edges().iter().all(|e| e.label != "manifest"));
    assert_eq!(graph.node_count(), 2);
}

#[test]
fn clip_set_without_assets_is_skipped() {
    let dir = TempDir::new().unwrap();
    let root = write(
        dir.path(),
        "crowd.usda",
        r#"#usda 1.0
def "Crowd" (
    clips = {
        dictionary default = {
            asset[] assetPaths = []
            asset manifestAssetPath = @./clips/manifest.usda@
        }
    }
)
{
}
"#,
    );

    let graph = walk(&root);

    assert_eq!(graph.node_count(), 1);
    assert!(graph.edges().is_empty());
    assert!(graph.nodes().all(|(_, record)| record.kind != NodeKind::Clip));
}

#[test]
fn variant_set_without_selection_follows_nothing() {
    let dir = TempDir::new().unwrap();
    let root = write(
        dir.path(),
        "asset.usda",
        r#"#usda 1.0
def Xform "Asset" (
    prepend variantSets = "modelVariant"
)
{
    variantSet "modelVariant" = {
        "variantA" (
            prepend references = @./a.usda@
        ) {
        }
        "variantB" {
        }
    }
}
"#,
    );
    let a = write(dir.path(), "a.usda", "#usda 1.0\n");

    let graph = walk(&root);

    let variant_key = format!("{}:modelVariant", key(&dir.path().join("asset")));
    assert_eq!(
        graph.node(&variant_key).unwrap().detail,
        Some(NodeDetail::VariantSet {
            variant_set: "modelVariant".into(),
            variants: vec!["variantA".into(), "variantB".into()],
            current_variant: None,
        })
    );
    assert!(!graph.contains(&a));
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edges().len(), 1);
    assert!(has_edge(&graph, &root, &variant_key, "variant"));
}

#[test]
fn only_the_selected_variant_is_followed() {
    let dir = TempDir::new().unwrap();
    let root = write(
        dir.path(),
        "asset.usda",
        r#"#usda 1.0
def Xform "Asset" (
    variants = {
        string modelVariant = "variantB"
    }
    prepend variantSets = "modelVariant"
)
{
    variantSet "modelVariant" = {
        "variantA" (
            prepend references = @./a.usda@
        ) {
        }
        "variantB" {
            def "Geo" (
                payload = @./b.usda@</Geo>
            ) {
            }
        }
    }
}
"#,
    );
    let a = write(dir.path(), "a.usda", "#usda 1.0\n");
    let b = write(dir.path(), "b.usda", "#usda 1.0\n(\n    subLayers = [@./b_sub.usda@]\n)\n");
    let b_sub = write(dir.path(), "b_sub.usda", "#usda 1.0\n");

    let graph = walk(&root);

    let variant_key = format!("{}:modelVariant", key(&dir.path().join("asset")));
    let variant = graph.node(&variant_key).unwrap();
    assert_eq!(variant.kind, NodeKind::Variant);
    assert_eq!(
        variant.detail,
        Some(NodeDetail::VariantSet {
            variant_set: "modelVariant".into(),
            variants: vec!["variantA".into(), "variantB".into()],
            current_variant: Some("variantB".into()),
        })
    );
    assert!(has_edge(&graph, &root, &variant_key, "variant"));

    assert_eq!(graph.node(&b).unwrap().kind, NodeKind::Payload);
    assert!(has_edge(&graph, &variant_key, &b, "variantB"));
    assert!(has_edge(&graph, &b, &b_sub, "sublayer"));
    assert!(!graph.contains(&a));
    assert_edge_invariants(&graph);
}

#[test]
fn reference_cycle_terminates() {
    let dir = TempDir::new().unwrap();
    let root = write(
        dir.path(),
        "root.usda",
        "#usda 1.0\ndef \"A\" (\n    references = @./a.usda@\n)\n{\n}\n",
    );
    let a = write(
        dir.path(),
        "a.usda",
        "#usda 1.0\ndef \"B\" (\n    references = @./root.usda@\n)\n{\n}\n",
    );

    let mut walker = DependencyWalker::new(root.as_str(), FileLayerSource::new(), DefaultResolver::new());
    walker.start();

    assert_eq!(walker.cycles(), &[(a.clone(), root.clone())]);
    assert!(has_edge(walker.graph(), &a, &root, "reference"));
    // Kind is fixed by the first write.
    assert_eq!(walker.node(&root).unwrap().kind, NodeKind::Sublayer);
    assert_edge_invariants(walker.graph());
}

#[test]
fn malformed_layer_does_not_stop_siblings() {
    let dir = TempDir::new().unwrap();
    let root = write(
        dir.path(),
        "root.usda",
        "#usda 1.0\n(\n    subLayers = [@./broken.usda@, @./good.usda@]\n)\n",
    );
    let broken = write(dir.path(), "broken.usda", "#usda 1.0\ndef \"Oops\" {\n    = = =\n");
    let good = write(dir.path(), "good.usda", "#usda 1.0\n(\n    subLayers = [@./leaf.usda@]\n)\n");
    let leaf = write(dir.path(), "leaf.usda", "#usda 1.0\n");

    let graph = walk(&root);

    let node = graph.node(&broken).unwrap();
    assert_eq!(node.kind, NodeKind::Error);
    assert!(node.errored);
    assert!(node.online);
    assert_eq!(graph.errored_paths(), &[broken.clone()]);
    assert!(has_edge(&graph, &good, &leaf, "sublayer"));
    assert_edge_invariants(&graph);
}

#[test]
fn binary_layer_is_recorded_as_error() {
    let dir = TempDir::new().unwrap();
    let root = write(dir.path(), "root.usda", "#usda 1.0\n(\n    subLayers = [@./geo.usdc@]\n)\n");
    let geo = key(&dir.path().join("geo.usdc"));
    fs::write(dir.path().join("geo.usdc"), b"PXR-USDC\0\0\0\0").unwrap();

    let graph = walk(&root);

    assert_eq!(graph.node(&geo).unwrap().kind, NodeKind::Error);
    assert_eq!(graph.errored_paths(), &[geo]);
}

#[test]
fn unreadable_root_leaves_graph_empty() {
    let dir = TempDir::new().unwrap();
    let missing = key(&dir.path().join("nope.usda"));
    let graph = walk(&missing);
    assert!(graph.is_empty());
    assert!(graph.errored_paths().is_empty());

    let root = write(dir.path(), "bad.usda", "this is not usd\n");
    let graph = walk(&root);
    assert!(graph.is_empty());
    assert_eq!(graph.errored_paths(), &[root]);
    assert_eq!(graph.root(), None);
}

#[test]
fn relative_root_is_made_absolute() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let graph = walk("fixtures/./reference.usda");

    let root = key(&dir.join("fixtures/reference.usda"));
    assert_eq!(graph.root(), Some(root.as_str()));
    assert!(graph.node(&root).unwrap().online);
}

#[test]
fn fixtures_with_attributes() {
    let fixtures = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures");
    let root = key(&fixtures.join("reference.usda"));
    let marble = key(&fixtures.join("marble.usda"));

    let graph = walk_with(&root, WalkOptions::new().walk_attributes(true));

    let node = graph.node(&marble).unwrap();
    assert_eq!(node.kind, NodeKind::Reference);
    assert!(node.online);
    // Two prims reference it through one edge; the internal reference adds nothing.
    assert_eq!(node.incoming_edge_count, 1);
    assert_eq!(graph.edges().iter().filter(|e| e.label == "reference").count(), 1);

    let material = format!("{}:Glass", key(&fixtures.join("marble")));
    assert_eq!(graph.node(&material).unwrap().kind, NodeKind::Material);
    assert!(has_edge(&graph, &marble, &material, "materials"));

    let texture = key(&fixtures.join("textures/marble_albedo.png"));
    let tex = graph.node(&texture).unwrap();
    assert_eq!(tex.kind, NodeKind::Tex);
    assert!(!tex.online);
    assert!(has_edge(&graph, &material, &texture, "inputs:file"));

    assert_eq!(graph.dependencies_of(&material), vec![texture.as_str()]);
    assert!(graph.dependents_of(&texture).contains(&root.as_str()));
    assert_eq!(graph.find("ALBEDO"), vec![texture.as_str()]);
    assert_edge_invariants(&graph);
}

#[test]
fn unresolvable_assets_are_offline_and_not_walked() {
    // Cargo runs integration tests from the package root, where this path exists.
    let authored = "fixtures/reference.usda";
    assert!(Path::new(authored).is_file());

    let dir = TempDir::new().unwrap();
    let root = write(
        dir.path(),
        "root.usda",
        &format!("#usda 1.0\n(\n    subLayers = [@{authored}@]\n)\ndef \"Prop\" (\n    references = @{authored}@\n)\n{{\n}}\n"),
    );

    let graph = walk(&root);

    // Prim arcs are scanned before sublayers, so the reference sets the kind.
    let node = graph.node(authored).unwrap();
    assert_eq!(node.kind, NodeKind::Reference);
    assert!(!node.online);
    assert!(has_edge(&graph, &root, authored, "sublayer"));
    assert!(has_edge(&graph, &root, authored, "reference"));
    assert!(graph.nodes().all(|(key, _)| !key.ends_with("marble.usda")));
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.offline(), vec![authored]);
}

fn write_package(path: &Path, entries: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).expect("create package"));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        zip.start_file(*name, options).expect("start package entry");
        zip.write_all(content.as_bytes()).expect("write package entry");
    }
    zip.finish().expect("finish package");
}

#[test]
fn package_layers_resolve_inside_the_archive() {
    let dir = TempDir::new().unwrap();
    let package = dir.path().join("asset.usdz");
    write_package(
        &package,
        &[
            (
                "root.usda",
                "#usda 1.0\ndef \"Asset\" (\n    references = [@./inner.usda@, @./missing.usda@]\n)\n{\n}\n",
            ),
            ("inner.usda", "#usda 1.0\n(\n    subLayers = [@./layers/leaf.usda@]\n)\n"),
            ("layers/leaf.usda", "#usda 1.0\n"),
        ],
    );
    let package = key(&package);

    let graph = walk(&package);

    assert_eq!(graph.root(), Some(package.as_str()));
    assert!(graph.node(&package).unwrap().online);

    let inner = format!("{package}[inner.usda]");
    let leaf = format!("{package}[layers/leaf.usda]");
    let missing = format!("{package}[missing.usda]");

    let node = graph.node(&inner).unwrap();
    assert_eq!(node.kind, NodeKind::Reference);
    assert!(node.online);
    assert!(has_edge(&graph, &package, &inner, "reference"));

    assert!(graph.node(&leaf).unwrap().online);
    assert!(has_edge(&graph, &inner, &leaf, "sublayer"));
    assert!(graph.node(&leaf).unwrap().layer.is_some());

    assert!(!graph.node(&missing).unwrap().online);
    assert!(graph.errored_paths().is_empty());
    assert_edge_invariants(&graph);
}

//! Graph output formats.

use std::fmt::Write;

use serde::Serialize;

use crate::graph::{DependencyGraph, Edge, NodeKind, NodeRecord};

#[derive(Serialize)]
struct NodeEntry<'a> {
    key: &'a str,
    #[serde(flatten)]
    record: &'a NodeRecord,
}

#[derive(Serialize)]
struct GraphDocument<'a> {
    root: Option<&'a str>,
    nodes: Vec<NodeEntry<'a>>,
    edges: &'a [Edge],
    errored_paths: &'a [String],
    cycles: &'a [(String, String)],
}

fn document(graph: &DependencyGraph) -> GraphDocument<'_> {
    GraphDocument {
        root: graph.root(),
        nodes: graph
            .nodes()
            .map(|(key, record)| NodeEntry { key, record })
            .collect(),
        edges: graph.edges(),
        errored_paths: graph.errored_paths(),
        cycles: graph.cycles(),
    }
}

/// JSON value with nodes in discovery order.
pub fn to_json_value(graph: &DependencyGraph) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(document(graph))
}

/// Pretty-printed JSON with nodes in discovery order.
pub fn to_json(graph: &DependencyGraph) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&document(graph))
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Shape and fill colour per node kind.
fn node_style(kind: NodeKind) -> (&'static str, &'static str) {
    match kind {
        NodeKind::Sublayer => ("box", "#9fc5e8"),
        NodeKind::Reference => ("box", "#b6d7a8"),
        NodeKind::Payload => ("box", "#ffe599"),
        NodeKind::Variant => ("diamond", "#d5a6bd"),
        NodeKind::Clip => ("box3d", "#f9cb9c"),
        NodeKind::Material => ("hexagon", "#b4a7d6"),
        NodeKind::Tex => ("note", "#ead1dc"),
        NodeKind::Ext => ("ellipse", "#d9d9d9"),
        NodeKind::Error => ("octagon", "#e06666"),
    }
}

/// Graphviz rendering. Offline nodes are dashed; the root is drawn bold.
pub fn to_dot(graph: &DependencyGraph) -> String {
    let mut out = String::from("digraph dependencies {\n    rankdir=LR;\n    node [style=filled, fontname=\"Helvetica\"];\n");

    for (key, record) in graph.nodes() {
        let (shape, color) = node_style(record.kind);
        let mut style = vec!["filled"];
        if !record.online {
            style.push("dashed");
        }
        if graph.root() == Some(key) {
            style.push("bold");
        }

        let _ = writeln!(
            out,
            "    {} [label={}, shape={shape}, fillcolor=\"{color}\", style=\"{}\", tooltip={}];",
            quote(key),
            quote(DependencyGraph::label(key)),
            style.join(","),
            quote(&record.path),
        );
    }

    for edge in graph.edges() {
        let _ = writeln!(
            out,
            "    {} -> {} [label={}];",
            quote(&edge.source),
            quote(&edge.dest),
            quote(&edge.label)
        );
    }

    out.push_str("}\n");
    out
}

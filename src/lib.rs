//! `usd_noodle` maps everything a USD asset depends on.
//!
//! Starting from a root layer, the [`walker`] follows sublayers, references,
//! payloads, selected variants and value clips, and builds a
//! [`graph::DependencyGraph`] of files and synthesized nodes (materials,
//! variant sets, clip sequences), each marked online or offline.
//!
//! # Modules
//!
//! - `walker` - Dependency traversal
//! - `graph` - Node table, edge list and queries
//! - `source` - Layer sources (`LayerSource` trait, filesystem implementation)
//! - `resolve` - Asset path resolution (`Resolver` trait, default resolver)
//! - `clip` - Clip sequence naming
//! - `export` - JSON and Graphviz output
//! - `sdf` - Scene description data model
//! - `usda` - Text format (.usda) reader
//! - `usdz` - Archive format (.usdz) reader

pub mod clip;
pub mod export;
pub mod graph;
pub mod resolve;
pub mod sdf;
pub mod source;
pub mod usda;
pub mod usdz;
pub mod walker;

pub use graph::{DependencyGraph, Edge, NodeKind, NodeRecord};
pub use resolve::{DefaultResolver, Resolver};
pub use source::{FileLayerSource, LayerError, LayerSource};
pub use walker::{DependencyWalker, WalkOptions};

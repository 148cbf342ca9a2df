//! Scene description data model.
//!
//! A [`Layer`] is what a layer source hands to the walker: the pseudo-root
//! metadata, the prim hierarchy with its attributes and composition arcs,
//! variant sets and value clips. Only the parts of scene description that
//! carry dependencies are modelled in detail; everything else is kept as
//! loosely typed [`Value`]s so it can still be reported as layer info.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use strum::Display;

/// Well-known metadata field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey {
    DefaultPrim,
    SubLayers,
    SubLayerOffsets,
    Documentation,
    Clips,
    ColorSpace,
    References,
    Payload,
    VariantSelection,
    VariantSetNames,
}

impl FieldKey {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FieldKey::DefaultPrim => "defaultPrim",
            FieldKey::SubLayers => "subLayers",
            FieldKey::SubLayerOffsets => "subLayerOffsets",
            FieldKey::Documentation => "documentation",
            FieldKey::Clips => "clips",
            FieldKey::ColorSpace => "colorSpace",
            FieldKey::References => "references",
            FieldKey::Payload => "payload",
            FieldKey::VariantSelection => "variants",
            FieldKey::VariantSetNames => "variantSets",
        }
    }
}

/// Prim specifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize)]
pub enum Specifier {
    #[default]
    Def,
    Over,
    Class,
}

/// Attribute variability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Variability {
    #[default]
    Varying,
    Uniform,
}

/// Loosely typed metadata or attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Token(String),
    AssetPath(String),
    Path(String),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    Dictionary(BTreeMap<String, Value>),
    TimeSamples(Vec<(f64, Value)>),
}

impl Value {
    /// Textual payload of string-like values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Token(s) | Value::AssetPath(s) | Value::Path(s) => Some(s),
            _ => None,
        }
    }

    /// Asset paths held by an `asset` or `asset[]` value, in order.
    pub fn asset_paths(&self) -> Vec<&str> {
        match self {
            Value::AssetPath(path) => vec![path.as_str()],
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::AssetPath(path) => Some(path.as_str()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Time offset and scale applied to a sublayer, reference or payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerOffset {
    pub offset: f64,
    pub scale: f64,
}

impl Default for LayerOffset {
    fn default() -> Self {
        Self { offset: 0.0, scale: 1.0 }
    }
}

/// A reference arc.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reference {
    pub asset_path: String,
    pub prim_path: String,
    pub layer_offset: LayerOffset,
}

/// A payload arc.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub asset_path: String,
    pub prim_path: String,
    pub layer_offset: Option<LayerOffset>,
}

/// Asset path of a composition arc.
pub trait CompositionArc {
    fn asset_path(&self) -> &str;
}

impl CompositionArc for Reference {
    fn asset_path(&self) -> &str {
        &self.asset_path
    }
}

impl CompositionArc for Payload {
    fn asset_path(&self) -> &str {
        &self.asset_path
    }
}

/// List-edited field: each edit operation keeps its own ordered item list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOp<T> {
    pub explicit: bool,
    pub explicit_items: Vec<T>,
    pub added_items: Vec<T>,
    pub prepended_items: Vec<T>,
    pub appended_items: Vec<T>,
    pub deleted_items: Vec<T>,
    pub ordered_items: Vec<T>,
}

impl<T> Default for ListOp<T> {
    fn default() -> Self {
        Self {
            explicit: false,
            explicit_items: Vec::new(),
            added_items: Vec::new(),
            prepended_items: Vec::new(),
            appended_items: Vec::new(),
            deleted_items: Vec::new(),
            ordered_items: Vec::new(),
        }
    }
}

impl<T: Clone + PartialEq> ListOp<T> {
    pub fn is_empty(&self) -> bool {
        self.explicit_items.is_empty()
            && self.added_items.is_empty()
            && self.prepended_items.is_empty()
            && self.appended_items.is_empty()
            && self.deleted_items.is_empty()
            && self.ordered_items.is_empty()
    }

    /// Every item this list op could contribute, deduplicated.
    ///
    /// Appended, explicit, added, prepended and ordered items are merged; how
    /// the edits would stack is not preserved. Deleted items are ignored.
    pub fn flattened(&self) -> Vec<T> {
        let mut out: Vec<T> = Vec::new();
        for item in self
            .appended_items
            .iter()
            .chain(&self.explicit_items)
            .chain(&self.added_items)
            .chain(&self.prepended_items)
            .chain(&self.ordered_items)
        {
            if !out.contains(item) {
                out.push(item.clone());
            }
        }
        out
    }

    /// Fold another edit of the same field into this one.
    pub fn merge(&mut self, other: ListOp<T>) {
        self.explicit |= other.explicit;
        self.explicit_items.extend(other.explicit_items);
        self.added_items.extend(other.added_items);
        self.prepended_items.extend(other.prepended_items);
        self.appended_items.extend(other.appended_items);
        self.deleted_items.extend(other.deleted_items);
        self.ordered_items.extend(other.ordered_items);
    }
}

/// An attribute on a prim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSpec {
    pub name: String,
    pub type_name: String,
    pub custom: bool,
    pub variability: Variability,
    pub default: Option<Value>,
    pub metadata: BTreeMap<String, Value>,
    pub connections: Vec<String>,
}

impl AttributeSpec {
    /// True for scalar `asset` attributes. `asset[]` is not an opaque asset reference.
    pub fn is_asset(&self) -> bool {
        self.type_name == "asset"
    }

    /// Non-empty default asset path.
    pub fn asset_path(&self) -> Option<&str> {
        match &self.default {
            Some(Value::AssetPath(path)) if !path.is_empty() => Some(path),
            _ => None,
        }
    }

    pub fn color_space(&self) -> Option<&str> {
        self.metadata.get(FieldKey::ColorSpace.as_str()).and_then(Value::as_text)
    }
}

/// One variant of a variant set; its content lives in a prim spec of its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantSpec {
    pub name: String,
    pub prim: PrimSpec,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantSetSpec {
    pub name: String,
    pub variants: Vec<VariantSpec>,
}

impl VariantSetSpec {
    pub fn variant_names(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.name.clone()).collect()
    }

    pub fn variant(&self, name: &str) -> Option<&VariantSpec> {
        self.variants.iter().find(|v| v.name == name)
    }
}

/// A named value clip set read from a prim's `clips` metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipSet {
    pub name: String,
    pub asset_paths: Vec<String>,
    pub manifest_asset_path: Option<String>,
    pub prim_path: Option<String>,
}

impl ClipSet {
    pub fn from_dictionary(name: &str, dict: &BTreeMap<String, Value>) -> Self {
        ClipSet {
            name: name.to_owned(),
            asset_paths: dict
                .get("assetPaths")
                .map(|v| v.asset_paths().into_iter().map(str::to_owned).collect())
                .unwrap_or_default(),
            manifest_asset_path: dict
                .get("manifestAssetPath")
                .and_then(Value::as_text)
                .filter(|p| !p.is_empty())
                .map(str::to_owned),
            prim_path: dict.get("primPath").and_then(Value::as_text).map(str::to_owned),
        }
    }
}

/// A prim (or the pseudo-root, or a variant's content root).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimSpec {
    pub name: String,
    pub path: String,
    pub specifier: Specifier,
    pub type_name: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub references: ListOp<Reference>,
    pub payloads: ListOp<Payload>,
    pub variant_selections: BTreeMap<String, String>,
    pub variant_sets: Vec<VariantSetSpec>,
    pub attributes: Vec<AttributeSpec>,
    pub children: Vec<PrimSpec>,
}

/// A prim visited by [`PrimSpec::flattened`], together with its namespace parent.
#[derive(Debug, Clone, Copy)]
pub struct FlatEntry<'a> {
    pub prim: &'a PrimSpec,
    pub parent: Option<&'a PrimSpec>,
}

impl PrimSpec {
    pub fn new(name: impl Into<String>, path: impl Into<String>, specifier: Specifier) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            specifier,
            ..Default::default()
        }
    }

    pub fn type_name(&self) -> &str {
        self.type_name.as_deref().unwrap_or("")
    }

    pub fn variant_selection(&self, set: &str) -> Option<&str> {
        self.variant_selections.get(set).map(String::as_str)
    }

    /// This prim followed by all of its descendants, depth first, each prim path once.
    pub fn flattened(&self) -> Vec<FlatEntry<'_>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        Self::flatten_into(self, None, &mut seen, &mut out);
        out
    }

    fn flatten_into<'a>(
        prim: &'a PrimSpec,
        parent: Option<&'a PrimSpec>,
        seen: &mut HashSet<&'a str>,
        out: &mut Vec<FlatEntry<'a>>,
    ) {
        if !seen.insert(prim.path.as_str()) {
            return;
        }
        out.push(FlatEntry { prim, parent });
        for child in &prim.children {
            Self::flatten_into(child, Some(prim), seen, out);
        }
    }

    /// Clip sets declared in the `clips` dictionary.
    pub fn clip_sets(&self) -> Vec<ClipSet> {
        match self.metadata.get(FieldKey::Clips.as_str()) {
            Some(Value::Dictionary(sets)) => sets
                .iter()
                .filter_map(|(name, set)| match set {
                    Value::Dictionary(dict) => Some(ClipSet::from_dictionary(name, dict)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A parsed layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    /// Path the layer was read from.
    pub real_path: String,
    pub pseudo_root: PrimSpec,
    pub muted: bool,
}

impl Layer {
    pub fn new(real_path: impl Into<String>) -> Self {
        Self {
            real_path: real_path.into(),
            pseudo_root: PrimSpec::new("/", "/", Specifier::Def),
            muted: false,
        }
    }

    pub fn info_keys(&self) -> impl Iterator<Item = &str> {
        self.pseudo_root.metadata.keys().map(String::as_str)
    }

    pub fn info(&self, key: &str) -> Option<&Value> {
        self.pseudo_root.metadata.get(key)
    }

    pub fn default_prim(&self) -> Option<&str> {
        self.info(FieldKey::DefaultPrim.as_str()).and_then(Value::as_text)
    }

    pub fn sub_layer_paths(&self) -> Vec<String> {
        self.info(FieldKey::SubLayers.as_str())
            .map(|v| v.asset_paths().into_iter().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    pub fn root_prims(&self) -> &[PrimSpec] {
        &self.pseudo_root.children
    }
}

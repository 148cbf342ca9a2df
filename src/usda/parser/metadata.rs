use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;

use crate::sdf::{self, FieldKey};
use crate::usda::token::Token;

/// Metadata parsing functions.
impl<'a> super::Parser<'a> {
    /// Parse the layer header block `( ... )` into pseudo-root metadata.
    pub(super) fn read_layer_metadata(&mut self, root: &mut sdf::PrimSpec) -> Result<()> {
        if !self.eat_pun('(')? {
            return Ok(());
        }

        loop {
            let next = self.fetch_next().context("Unable to fetch next layer metadata entry")?;

            match next {
                Token::Punctuation(')') => break,
                Token::String(doc) => {
                    root.metadata.insert(
                        FieldKey::Documentation.as_str().to_owned(),
                        sdf::Value::String(doc.to_owned()),
                    );
                }
                Token::Identifier("subLayers") => {
                    self.ensure_pun('=')?;
                    let (sublayers, offsets) = self.parse_sublayers().context("Unable to parse subLayers")?;
                    root.metadata.insert(
                        FieldKey::SubLayers.as_str().to_owned(),
                        sdf::Value::Array(sublayers.into_iter().map(sdf::Value::AssetPath).collect()),
                    );
                    root.metadata.insert(
                        FieldKey::SubLayerOffsets.as_str().to_owned(),
                        sdf::Value::Array(
                            offsets
                                .into_iter()
                                .map(|o| sdf::Value::Tuple(vec![sdf::Value::Double(o.offset), sdf::Value::Double(o.scale)]))
                                .collect(),
                        ),
                    );
                }
                other => {
                    let Some(name) = Self::name_of(&other) else {
                        bail!("Unexpected token in layer metadata: {other:?}");
                    };
                    let key = if name == "doc" { FieldKey::Documentation.as_str() } else { name };
                    self.ensure_pun('=')?;
                    let value = self
                        .parse_value()
                        .with_context(|| format!("Unable to parse layer metadata value for {name}"))?;
                    root.metadata.insert(key.to_owned(), value);
                }
            }
        }

        Ok(())
    }

    /// Parse prim (or variant) metadata up to, not including, the closing `)`.
    pub(super) fn read_prim_metadata(&mut self, prim: &mut sdf::PrimSpec) -> Result<()> {
        loop {
            if self.is_next_pun(')') {
                break;
            }

            let token = self.fetch_next()?;
            if let Token::String(doc) = token {
                prim.metadata.insert(
                    FieldKey::Documentation.as_str().to_owned(),
                    sdf::Value::String(doc.to_owned()),
                );
                continue;
            }

            self.read_prim_metadata_entry(token, prim)
                .context("Unable to parse prim metadata entry")?;
        }

        Ok(())
    }

    /// Parse a single prim metadata assignment, honoring list ops for composition arcs.
    pub(super) fn read_prim_metadata_entry(&mut self, token: Token<'a>, prim: &mut sdf::PrimSpec) -> Result<()> {
        let (list_op, name_token) = match token {
            Token::Add | Token::Append | Token::Delete | Token::Prepend | Token::Reorder => {
                let name = self.fetch_next()?;
                (Some(token), name)
            }
            _ => (None, token),
        };

        let Some(name) = Self::name_of(&name_token) else {
            bail!("Unexpected metadata name token: {name_token:?}");
        };

        self.ensure_pun('=')?;

        match name {
            n if n == FieldKey::References.as_str() => {
                let references = self.parse_reference_list().context("Unable to parse references")?;
                let list = self
                    .apply_list_op(list_op, references)
                    .context("Unable to build references listOp")?;
                prim.references.merge(list);
            }
            n if n == FieldKey::Payload.as_str() => {
                let payloads = self.parse_payload_list().context("Unable to parse payloads")?;
                let list = self
                    .apply_list_op(list_op, payloads)
                    .context("Unable to build payload listOp")?;
                prim.payloads.merge(list);
            }
            n if n == FieldKey::VariantSelection.as_str() => {
                let selections = self
                    .parse_variant_selection_map()
                    .context("Unable to parse variant selections")?;
                prim.variant_selections.extend(selections);
            }
            "doc" => {
                let value = self.fetch_str().context("Unable to parse doc metadata")?;
                prim.metadata.insert(
                    FieldKey::Documentation.as_str().to_owned(),
                    sdf::Value::String(value.to_owned()),
                );
            }
            // inherits, specializes, apiSchemas, variantSets, kind, clips, customData, ...
            other => {
                let value = self
                    .parse_value()
                    .with_context(|| format!("Unable to parse prim metadata: {other}"))?;
                prim.metadata.insert(other.to_owned(), value);
            }
        }

        Ok(())
    }

    /// Parse a variant selection map `{ string variantSetName = "selectedVariant" }`.
    pub(super) fn parse_variant_selection_map(&mut self) -> Result<BTreeMap<String, String>> {
        self.ensure_pun('{').context("Variant selection must start with {")?;

        let mut selections = BTreeMap::new();

        loop {
            if self.eat_pun('}')? {
                break;
            }

            let type_token = self.fetch_next()?;
            match type_token {
                Token::Identifier("string") => {}
                other => bail!("Expected 'string' type in variant selection, got: {other:?}"),
            }

            let name_token = self.fetch_next()?;
            let name = match name_token {
                Token::String(s) => s,
                other => Self::name_of(&other)
                    .with_context(|| format!("Expected variant set name, got: {other:?}"))?,
            };

            self.ensure_pun('=')?;
            let value = self.fetch_str().context("Expected variant selection value")?;
            selections.insert(name.to_owned(), value.to_owned());

            if !self.eat_pun(',')? {
                self.eat_pun(';')?;
            }
        }

        Ok(selections)
    }

    /// Parse a property metadata block `( key = value ... )` including both parentheses.
    pub(super) fn parse_property_metadata(&mut self, metadata: &mut BTreeMap<String, sdf::Value>) -> Result<()> {
        self.ensure_pun('(')?;

        loop {
            if self.eat_pun(')')? {
                break;
            }

            let token = self.fetch_next()?;
            let name = match token {
                Token::String(doc) => {
                    metadata.insert(
                        FieldKey::Documentation.as_str().to_owned(),
                        sdf::Value::String(doc.to_owned()),
                    );
                    continue;
                }
                other => Self::name_of(&other)
                    .with_context(|| format!("Unexpected property metadata name token: {other:?}"))?,
            };

            self.ensure_pun('=')?;
            let value = self
                .parse_value()
                .with_context(|| format!("Unable to parse property metadata value for {name}"))?;
            let key = if name == "doc" { FieldKey::Documentation.as_str() } else { name };
            metadata.insert(key.to_owned(), value);

            if !self.eat_pun(',')? {
                self.eat_pun(';')?;
            }
        }

        Ok(())
    }
}

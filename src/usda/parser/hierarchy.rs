use anyhow::{anyhow, bail, ensure, Context, Result};

use crate::sdf;
use crate::usda::token::Token;

const CONNECT_SUFFIX: &str = ".connect";
const TIME_SAMPLES_SUFFIX: &str = ".timeSamples";

/// Hierarchy parsing functions for prims, attributes, and relationships.
impl<'a> super::Parser<'a> {
    /// Parse the whole token stream into a layer.
    ///
    /// The returned layer has an empty `real_path`; callers that read from
    /// disk fill it in.
    pub fn parse(&mut self) -> Result<sdf::Layer> {
        self.read_header().context("Unable to read layer header")?;

        let mut layer = sdf::Layer::new("");
        self.read_layer_metadata(&mut layer.pseudo_root)
            .context("Unable to parse layer metadata")?;

        while self.peek_next().is_some() {
            let prim = self.read_prim("/")?;
            layer.pseudo_root.children.push(prim);
        }

        Ok(layer)
    }

    /// Make sure the text starts with `#usda 1.0`.
    ///
    /// The lexer treats the header as a comment, so it is checked on the source itself.
    fn read_header(&self) -> Result<()> {
        let first_line = self.source.trim_start().lines().next().unwrap_or_default();
        let mut words = first_line.split_whitespace();

        ensure!(
            words.next() == Some("#usda"),
            "Text file must start with '#usda', got: {first_line:?}"
        );
        let version = words.next().unwrap_or_default();
        ensure!(version == "1.0", "File must start with '#usda 1.0', got: {version:?}");

        Ok(())
    }

    fn child_path(parent_path: &str, name: &str) -> String {
        if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        }
    }

    /// Parse a prim declaration: specifier, optional type, name, metadata and body.
    pub(super) fn read_prim(&mut self, parent_path: &str) -> Result<sdf::PrimSpec> {
        let specifier = match self.fetch_next().context("Unable to read prim specifier")? {
            Token::Def => sdf::Specifier::Def,
            Token::Over => sdf::Specifier::Over,
            Token::Class => sdf::Specifier::Class,
            other => bail!("Unexpected prim specifier: {other:?}"),
        };

        let mut name_token = self.fetch_next()?;
        let mut type_name = None;
        if let Token::Identifier(prim_type) | Token::NamespacedIdentifier(prim_type) = name_token {
            type_name = Some(prim_type.to_owned());
            name_token = self.fetch_next()?;
        }

        let name = name_token
            .clone()
            .try_as_string()
            .ok_or_else(|| anyhow!("Unexpected token {name_token:?} (want prim name string)"))?;

        let mut prim = sdf::PrimSpec::new(name, Self::child_path(parent_path, name), specifier);
        prim.type_name = type_name;

        if self.eat_pun('(')? {
            self.read_prim_metadata(&mut prim)
                .with_context(|| format!("Unable to parse metadata of {}", prim.path))?;
            self.ensure_pun(')').context("Prim metadata must end with )")?;
        }

        self.ensure_pun('{').context("Prim body must start with {")?;
        self.read_prim_body(&mut prim)
            .with_context(|| format!("Unable to parse body of {}", prim.path))?;

        Ok(prim)
    }

    /// Parse prim body entries up to and including the closing `}`.
    pub(super) fn read_prim_body(&mut self, prim: &mut sdf::PrimSpec) -> Result<()> {
        loop {
            match self.peek_token().context("Unexpected end of prim body")? {
                Token::Punctuation('}') => {
                    self.fetch_next()?;
                    break;
                }
                Token::Def | Token::Over | Token::Class => {
                    let child = self
                        .read_prim(&prim.path)
                        .context("Unable to read nested primitive")?;
                    prim.children.push(child);
                }
                Token::VariantSet => {
                    self.fetch_next()?;
                    self.read_variant_set(prim).context("Unable to read variant set")?;
                }
                Token::Rel => {
                    self.fetch_next()?;
                    self.read_relationship().context("Unable to read relationship")?;
                }
                Token::Add | Token::Append | Token::Delete | Token::Prepend | Token::Reorder => {
                    let list_op = self.fetch_next()?;
                    self.read_list_edited_property(list_op, prim)?;
                }
                _ => {
                    self.read_attribute(prim).context("Unable to read attribute")?;
                }
            }
        }

        Ok(())
    }

    /// Body entries prefixed with a list op: `prepend rel ...`, `add float inputs:a.connect ...`
    /// or a `reorder nameChildren` / `reorder properties` statement.
    fn read_list_edited_property(&mut self, list_op: Token<'a>, prim: &mut sdf::PrimSpec) -> Result<()> {
        if list_op == Token::Reorder
            && matches!(
                self.peek_next(),
                Some(Ok(Token::Identifier("nameChildren" | "properties")))
            )
        {
            self.fetch_next()?;
            self.ensure_pun('=')?;
            self.parse_value().context("Unable to parse reorder statement")?;
            return Ok(());
        }

        if self.is_next(Token::Rel) {
            self.fetch_next()?;
            return self.read_relationship().context("Unable to read relationship");
        }

        self.read_attribute(prim).context("Unable to read attribute")
    }

    fn attribute_mut<'p>(prim: &'p mut sdf::PrimSpec, name: &str) -> &'p mut sdf::AttributeSpec {
        let index = match prim.attributes.iter().position(|a| a.name == name) {
            Some(index) => index,
            None => {
                prim.attributes.push(sdf::AttributeSpec {
                    name: name.to_owned(),
                    ..Default::default()
                });
                prim.attributes.len() - 1
            }
        };
        &mut prim.attributes[index]
    }

    /// Parse an attribute declaration, including variability, metadata and default value.
    ///
    /// `name.connect` and `name.timeSamples` statements are folded into the
    /// attribute called `name`.
    pub(super) fn read_attribute(&mut self, prim: &mut sdf::PrimSpec) -> Result<()> {
        let custom = if self.is_next(Token::Custom) {
            self.fetch_next()?;
            true
        } else {
            false
        };

        let variability = match self.peek_next() {
            Some(Ok(Token::Uniform)) => {
                self.fetch_next()?;
                sdf::Variability::Uniform
            }
            Some(Ok(Token::Varying)) => {
                self.fetch_next()?;
                sdf::Variability::Varying
            }
            _ => sdf::Variability::Varying,
        };

        // `custom rel` is a relationship, not an attribute.
        if self.is_next(Token::Rel) {
            self.fetch_next()?;
            return self.read_relationship();
        }

        let type_token = self.fetch_next()?;
        let type_name = match type_token {
            Token::Identifier(s) | Token::NamespacedIdentifier(s) => s,
            other => bail!("Unexpected token for attribute type, expected identifier, got {other:?}"),
        };

        let full_name = self
            .fetch_name()
            .with_context(|| format!("Attribute name expected after type {type_name}"))?;

        if let Some(base) = full_name.strip_suffix(CONNECT_SUFFIX) {
            let mut targets = Vec::new();
            if self.eat_pun('=')? {
                self.fetch_list_op()?;
                targets = self
                    .parse_one_or_many(|this| this.parse_path_ref())
                    .context("Unable to parse connection targets")?;
            }

            let attribute = Self::attribute_mut(prim, base);
            attribute.type_name = type_name.to_owned();
            attribute.connections.extend(targets);
            return Ok(());
        }

        let (name, time_samples) = match full_name.strip_suffix(TIME_SAMPLES_SUFFIX) {
            Some(base) => (base, true),
            None => (full_name, false),
        };

        let mut metadata = std::collections::BTreeMap::new();
        if self.is_next_pun('(') {
            self.parse_property_metadata(&mut metadata)
                .context("Unable to parse attribute metadata")?;
        }

        let mut value = None;
        if self.eat_pun('=')? {
            value = Some(
                self.parse_value()
                    .with_context(|| format!("Unable to parse value of {full_name}"))?,
            );

            // Metadata may also follow the value.
            if self.is_next_pun('(') {
                self.parse_property_metadata(&mut metadata)
                    .context("Unable to parse attribute metadata")?;
            }
        }

        let attribute = Self::attribute_mut(prim, name);
        attribute.type_name = type_name.to_owned();
        attribute.custom |= custom;
        attribute.variability = variability;
        attribute.metadata.extend(metadata);

        match value {
            Some(samples) if time_samples => {
                attribute.metadata.insert("timeSamples".to_owned(), samples);
            }
            Some(default) => attribute.default = Some(default),
            None => {}
        }

        Ok(())
    }

    /// Parse a relationship declaration. Relationships carry no file
    /// dependencies, so targets and metadata are read and dropped.
    pub(super) fn read_relationship(&mut self) -> Result<()> {
        let name = self.fetch_name().context("Relationship name expected")?;

        let mut metadata = std::collections::BTreeMap::new();
        if self.is_next_pun('(') {
            self.parse_property_metadata(&mut metadata)
                .with_context(|| format!("Unable to parse metadata of relationship {name}"))?;
        }

        if self.eat_pun('=')? {
            self.fetch_list_op()?;
            self.parse_one_or_many(|this| this.parse_path_ref())
                .with_context(|| format!("Unable to parse targets of relationship {name}"))?;

            if self.is_next_pun('(') {
                self.parse_property_metadata(&mut metadata)
                    .with_context(|| format!("Unable to parse metadata of relationship {name}"))?;
            }
        }

        Ok(())
    }

    /// Parse a `variantSet "name" = { "variant" (...) { ... } ... }` block.
    ///
    /// Each variant becomes a prim spec at `/Prim{set=variant}`.
    pub(super) fn read_variant_set(&mut self, prim: &mut sdf::PrimSpec) -> Result<()> {
        let set_name = self
            .fetch_str()
            .context("Expected variant set name string")?
            .to_owned();

        self.ensure_pun('=').context("Expected '=' after variant set name")?;
        self.ensure_pun('{').context("Expected '{' to start variant set block")?;

        let mut variants = Vec::new();

        loop {
            if self.eat_pun('}')? {
                break;
            }

            let variant_name = self.fetch_str().context("Expected variant name string")?;
            let variant_path = format!("{}{{{set_name}={variant_name}}}", prim.path);
            let mut variant_prim = sdf::PrimSpec::new(variant_name, variant_path, sdf::Specifier::Over);

            if self.eat_pun('(')? {
                self.read_prim_metadata(&mut variant_prim)
                    .context("Unable to parse variant metadata")?;
                self.ensure_pun(')').context("Variant metadata must end with )")?;
            }

            self.ensure_pun('{').context("Expected '{' to start variant body")?;
            self.read_prim_body(&mut variant_prim)
                .with_context(|| format!("Unable to parse variant {variant_name}"))?;

            variants.push(sdf::VariantSpec {
                name: variant_name.to_owned(),
                prim: variant_prim,
            });
        }

        match prim.variant_sets.iter_mut().find(|set| set.name == set_name) {
            Some(existing) => existing.variants.extend(variants),
            None => prim.variant_sets.push(sdf::VariantSetSpec {
                name: set_name,
                variants,
            }),
        }

        Ok(())
    }
}

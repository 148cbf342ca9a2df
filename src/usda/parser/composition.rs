use anyhow::{anyhow, bail, Context, Result};

use crate::sdf;
use crate::usda::token::Token;

/// Composition arc parsing functions.
impl<'a> super::Parser<'a> {
    /// Parse a reference arc: `@asset@</Prim> (offset = 1; scale = 2)`.
    ///
    /// Internal references omit the asset and start at the prim path.
    pub(super) fn parse_reference(&mut self) -> Result<sdf::Reference> {
        let (asset_path, prim_path) = self.parse_arc_target().context("Reference target expected")?;

        let mut reference = sdf::Reference {
            asset_path,
            prim_path,
            layer_offset: sdf::LayerOffset::default(),
        };

        if self.is_next_pun('(') {
            self.parse_layer_offset(&mut reference.layer_offset)
                .context("Unable to parse reference layer offset")?;
        }

        Ok(reference)
    }

    /// Parse a payload arc (asset path + optional prim path + optional layer offset).
    pub(super) fn parse_payload(&mut self) -> Result<sdf::Payload> {
        let (asset_path, prim_path) = self.parse_arc_target().context("Payload target expected")?;

        let mut payload = sdf::Payload {
            asset_path,
            prim_path,
            layer_offset: None,
        };

        if self.is_next_pun('(') {
            let mut layer_offset = sdf::LayerOffset::default();
            self.parse_layer_offset(&mut layer_offset)
                .context("Unable to parse payload layer offset")?;
            payload.layer_offset = Some(layer_offset);
        }

        Ok(payload)
    }

    fn parse_arc_target(&mut self) -> Result<(String, String)> {
        match self.fetch_next()? {
            Token::AssetRef(asset) => {
                let prim_path = match self.peek_next() {
                    Some(Ok(Token::PathRef(_))) => self.parse_path_ref()?,
                    _ => String::new(),
                };
                Ok((asset.to_owned(), prim_path))
            }
            Token::PathRef(path) => Ok((String::new(), path.to_owned())),
            other => bail!("Asset or path reference expected, got {other:?}"),
        }
    }

    pub(super) fn parse_path_ref(&mut self) -> Result<String> {
        let token = self.fetch_next()?;
        token
            .clone()
            .try_as_path_ref()
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("Path reference expected, got {token:?}"))
    }

    /// Parse `(offset = ...; scale = ...)` blocks attached to arcs and sublayers.
    ///
    /// Other entries, such as `customData`, are parsed and dropped.
    pub(super) fn parse_layer_offset(&mut self, layer_offset: &mut sdf::LayerOffset) -> Result<()> {
        self.parse_seq_fn(';', |this, _index| {
            let name = this.fetch_name()?;
            this.ensure_pun('=')?;
            let value = this.parse_value()?;

            let number = match value {
                sdf::Value::Int(i) => Some(i as f64),
                sdf::Value::Double(d) => Some(d),
                _ => None,
            };

            match name {
                "offset" => layer_offset.offset = number.context("Expected number for offset")?,
                "scale" => layer_offset.scale = number.context("Expected number for scale")?,
                _ => {}
            }

            Ok(())
        })
    }

    pub(super) fn parse_reference_list(&mut self) -> Result<Vec<sdf::Reference>> {
        self.parse_one_or_many(|this| this.parse_reference())
    }

    pub(super) fn parse_payload_list(&mut self) -> Result<Vec<sdf::Payload>> {
        self.parse_one_or_many(|this| this.parse_payload())
    }

    /// Parse the `subLayers` array: asset paths with optional layer offsets.
    pub(super) fn parse_sublayers(&mut self) -> Result<(Vec<String>, Vec<sdf::LayerOffset>)> {
        let mut sublayers = Vec::new();
        let mut offsets = Vec::new();

        self.parse_array_fn(|this| {
            let token = this.fetch_next()?;
            let path = token
                .clone()
                .try_as_asset_ref()
                .ok_or_else(|| anyhow!("Sublayer asset path expected, got {token:?}"))?;

            let mut offset = sdf::LayerOffset::default();
            if this.is_next_pun('(') {
                this.parse_layer_offset(&mut offset)
                    .context("Unable to parse sublayer offset")?;
            }

            sublayers.push(path.to_owned());
            offsets.push(offset);
            Ok(())
        })?;

        Ok((sublayers, offsets))
    }

    /// Build a ListOp from an optional list operation token and items.
    pub(super) fn apply_list_op<T: Clone + PartialEq>(
        &mut self,
        op: Option<Token<'a>>,
        items: Vec<T>,
    ) -> Result<sdf::ListOp<T>> {
        let mut list = sdf::ListOp::default();

        match op {
            None => {
                list.explicit = true;
                list.explicit_items = items;
            }
            Some(Token::Prepend) => list.prepended_items = items,
            Some(Token::Append) => list.appended_items = items,
            Some(Token::Add) => list.added_items = items,
            Some(Token::Delete) => list.deleted_items = items,
            Some(Token::Reorder) => list.ordered_items = items,
            other => bail!("Unsupported list op: {other:?}"),
        }

        Ok(list)
    }
}

//! USDA text format reader.

pub mod parser;
pub mod token;

use std::{fs, path::Path};

use anyhow::{Context, Result};

use crate::sdf;

/// Reads a text layer into an [`sdf::Layer`].
#[derive(Debug, Clone, Default)]
pub struct TextReader {
    layer: sdf::Layer,
}

impl TextReader {
    /// Read and parse a `.usda` file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).with_context(|| format!("Unable to read file: {}", path.display()))?;
        Self::parse_str(&data, &path.to_string_lossy())
    }

    /// Parse text already in memory. `real_path` is recorded on the layer.
    pub fn parse_str(data: &str, real_path: &str) -> Result<Self> {
        let mut parser = parser::Parser::new(data);

        let mut layer = match parser.parse() {
            Ok(layer) => layer,
            Err(err) => {
                let err = match parser.last_error_highlight() {
                    Some(highlight) => err.context(format!("{real_path}:{highlight}")),
                    None => err,
                };
                return Err(err.context(format!("Unable to parse {real_path}")));
            }
        };

        layer.real_path = real_path.to_owned();
        Ok(Self { layer })
    }

    pub fn from_layer(layer: sdf::Layer) -> Self {
        Self { layer }
    }

    pub fn layer(&self) -> &sdf::Layer {
        &self.layer
    }

    pub fn into_layer(self) -> sdf::Layer {
        self.layer
    }
}

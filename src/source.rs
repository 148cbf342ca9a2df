//! Layer sources: how the walker obtains parsed layers.

use std::{
    fs::File,
    io::{self, Read},
    path::Path,
    sync::Arc,
};

use thiserror::Error;

use crate::{resolve, sdf, usda, usdz};

/// Magic bytes at the start of binary (crate) layers.
pub const CRATE_MAGIC: &[u8] = b"PXR-USDC";

/// Structural failure to open a layer.
#[derive(Debug, Error)]
pub enum LayerError {
    #[error("failed to parse layer {path}: {message}")]
    Parse { path: String, message: String },

    #[error("unsupported layer format '{format}' for {path}")]
    Unsupported { path: String, format: String },

    #[error("failed to read layer {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl LayerError {
    pub fn path(&self) -> &str {
        match self {
            LayerError::Parse { path, .. } | LayerError::Unsupported { path, .. } | LayerError::Io { path, .. } => path,
        }
    }
}

/// Opens layers by resolved path.
///
/// `Ok(None)` means there is no layer at `path`; `Err` means one exists but
/// could not be read.
pub trait LayerSource {
    fn open(&self, path: &str) -> Result<Option<Arc<sdf::Layer>>, LayerError>;
}

impl<T: LayerSource + ?Sized> LayerSource for &T {
    fn open(&self, path: &str) -> Result<Option<Arc<sdf::Layer>>, LayerError> {
        (**self).open(path)
    }
}

/// Reads layers from the filesystem, choosing a reader by extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLayerSource;

impl FileLayerSource {
    pub fn new() -> Self {
        Self
    }

    fn parse_error(path: &str, err: anyhow::Error) -> LayerError {
        LayerError::Parse {
            path: path.to_owned(),
            message: format!("{err:#}"),
        }
    }

    fn extension(path: &str) -> String {
        Path::new(path)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    fn read_text(path: &str) -> Result<sdf::Layer, LayerError> {
        usda::TextReader::read(path)
            .map(usda::TextReader::into_layer)
            .map_err(|err| Self::parse_error(path, err))
    }

    /// A layer stored inside a `.usdz` package; `None` if the package or the entry is missing.
    fn read_package_entry(path: &str, package: &str, entry: &str) -> Result<Option<sdf::Layer>, LayerError> {
        if !resolve::is_absolute(package) || !Path::new(package).is_file() {
            return Ok(None);
        }

        let mut archive = usdz::Archive::open(package).map_err(|err| Self::parse_error(path, err))?;
        if !archive.contains(entry) {
            return Ok(None);
        }

        match Self::extension(entry).as_str() {
            "usda" | "usd" => archive
                .entry_layer(entry)
                .map(Some)
                .map_err(|err| Self::parse_error(path, err)),
            other => Err(LayerError::Unsupported {
                path: path.to_owned(),
                format: other.to_owned(),
            }),
        }
    }

    fn is_binary(path: &str) -> Result<bool, LayerError> {
        let mut header = [0u8; 8];
        let mut file = File::open(path).map_err(|source| LayerError::Io {
            path: path.to_owned(),
            source,
        })?;

        match file.read_exact(&mut header) {
            Ok(()) => Ok(&header[..] == CRATE_MAGIC),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(source) => Err(LayerError::Io {
                path: path.to_owned(),
                source,
            }),
        }
    }
}

impl LayerSource for FileLayerSource {
    fn open(&self, path: &str) -> Result<Option<Arc<sdf::Layer>>, LayerError> {
        if let Some((package, entry)) = usdz::split_package_path(path) {
            return Ok(Self::read_package_entry(path, package, entry)?.map(Arc::new));
        }

        // Relative paths are unresolved assets; never look them up in the working directory.
        if !resolve::is_absolute(path) || !Path::new(path).is_file() {
            return Ok(None);
        }

        let layer = match Self::extension(path).as_str() {
            "usda" => Self::read_text(path)?,
            "usd" => {
                if Self::is_binary(path)? {
                    return Err(LayerError::Unsupported {
                        path: path.to_owned(),
                        format: "usdc".to_owned(),
                    });
                }
                Self::read_text(path)?
            }
            "usdz" => usdz::Archive::open(path)
                .and_then(|mut archive| archive.root_layer())
                .map_err(|err| Self::parse_error(path, err))?,
            other => {
                return Err(LayerError::Unsupported {
                    path: path.to_owned(),
                    format: other.to_owned(),
                })
            }
        };

        Ok(Some(Arc::new(layer)))
    }
}

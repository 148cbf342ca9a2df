//! USDZ archive reader.
//!
//! USDZ is an uncompressed ZIP archive. Its root layer is the first USD file
//! in the archive; only text layers can be opened.
//!
//! An entry inside a package is addressed as `/dir/asset.usdz[inner/layer.usda]`.

use std::{
    fs::File,
    io::Read,
    path::Path,
};

use anyhow::{bail, Context, Result};
use zip::ZipArchive;

use crate::{sdf, usda};

/// True for paths with a `.usdz` extension.
pub fn is_package(path: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("usdz"))
}

/// Split `/dir/asset.usdz[inner/layer.usda]` into the package and the entry name.
pub fn split_package_path(path: &str) -> Option<(&str, &str)> {
    let inner = path.strip_suffix(']')?;
    let open = inner.to_ascii_lowercase().find(".usdz[")? + ".usdz".len();
    Some((&inner[..open], &inner[open + 1..]))
}

/// Path of `entry` inside `package`.
pub fn package_path(package: &str, entry: &str) -> String {
    format!("{package}[{entry}]")
}

/// USDZ archive reader.
pub struct Archive {
    archive: ZipArchive<File>,
    path: String,
}

impl Archive {
    /// Open a USDZ archive from a file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open USDZ archive: {}", path.display()))?;

        let archive =
            ZipArchive::new(file).with_context(|| format!("Failed to read ZIP archive: {}", path.display()))?;

        Ok(Self {
            archive,
            path: path.to_string_lossy().into_owned(),
        })
    }

    /// Returns a list of all file names in the archive.
    pub fn file_names(&self) -> Vec<String> {
        self.archive.file_names().map(|s| s.to_string()).collect()
    }

    /// The first `.usda`, `.usdc` or `.usd` entry in archive order.
    pub fn find_root_layer(&self) -> Option<String> {
        // `file_names` is unordered; index order is the archive order.
        (0..self.archive.len())
            .filter_map(|index| self.archive.name_for_index(index))
            .find(|name| {
                let lower = name.to_lowercase();
                lower.ends_with(".usdc") || lower.ends_with(".usda") || lower.ends_with(".usd")
            })
            .map(str::to_owned)
    }

    /// Whether the archive has an entry named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.archive.file_names().any(|entry| entry == name)
    }

    /// Read the root layer. Its `real_path` is the archive path.
    pub fn root_layer(&mut self) -> Result<sdf::Layer> {
        let name = self
            .find_root_layer()
            .with_context(|| format!("No USD layer found in archive {}", self.path))?;
        let real_path = self.path.clone();
        self.read_layer(&name, &real_path)
    }

    /// Read the text layer stored as `name`. Its `real_path` is the package path of the entry.
    pub fn entry_layer(&mut self, name: &str) -> Result<sdf::Layer> {
        let real_path = package_path(&self.path, name);
        self.read_layer(name, &real_path)
    }

    fn read_layer(&mut self, name: &str, real_path: &str) -> Result<sdf::Layer> {
        let mut file = self
            .archive
            .by_name(name)
            .with_context(|| format!("File '{name}' not found in archive"))?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read file '{name}' from archive"))?;

        if buffer.starts_with(crate::source::CRATE_MAGIC) {
            bail!("Binary layer '{name}' in {} is not supported", self.path);
        }

        let content = String::from_utf8(buffer).with_context(|| format!("File '{name}' is not valid UTF-8"))?;
        let reader = usda::TextReader::parse_str(&content, real_path)
            .with_context(|| format!("Failed to parse '{name}' from archive {}", self.path))?;

        Ok(reader.into_layer())
    }
}

//! Asset path resolution.

use std::{
    env,
    path::{Path, PathBuf},
};

use crate::usdz;

/// Environment variable holding default search paths for bare asset names.
pub const SEARCH_PATH_ENV: &str = "PXR_AR_DEFAULT_SEARCH_PATH";

/// Turns asset paths authored in layers into absolute paths.
///
/// Implementations never panic; a path that cannot be resolved is `None`.
pub trait Resolver {
    /// Resolve `asset` relative to the layer at `anchor`.
    fn resolve_anchored(&self, anchor: &str, asset: &str) -> Option<String>;

    /// Resolve `asset` without an anchoring layer.
    fn resolve(&self, asset: &str) -> Option<String>;

    /// Whether a resolved path points at a file on disk or an entry of a package on disk.
    fn exists(&self, resolved: &str) -> bool {
        path_exists(resolved)
    }
}

impl<T: Resolver + ?Sized> Resolver for &T {
    fn resolve_anchored(&self, anchor: &str, asset: &str) -> Option<String> {
        (**self).resolve_anchored(anchor, asset)
    }

    fn resolve(&self, asset: &str) -> Option<String> {
        (**self).resolve(asset)
    }

    fn exists(&self, resolved: &str) -> bool {
        (**self).exists(resolved)
    }
}

/// True for `/abs`, `\\share` and `C:/...` style paths.
pub fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

fn is_anchor_relative(path: &str) -> bool {
    path.starts_with("./") || path.starts_with("../") || path.starts_with(".\\") || path.starts_with("..\\")
}

/// Whether `path` is an existing file, or an existing entry of a `.usdz` package.
///
/// Relative paths never exist; they are not looked up in the working directory.
pub fn path_exists(path: &str) -> bool {
    match usdz::split_package_path(path) {
        Some((package, entry)) => {
            is_absolute(package) && usdz::Archive::open(package).is_ok_and(|archive| archive.contains(entry))
        }
        None => is_absolute(path) && Path::new(path).is_file(),
    }
}

/// The package and entry of a layer that lives in a `.usdz`; a bare package anchors at its top level.
fn package_anchor(anchor: &str) -> Option<(&str, &str)> {
    usdz::split_package_path(anchor).or_else(|| usdz::is_package(anchor).then_some((anchor, "")))
}

/// Lexically normalize a path: `/` separators, no `.` or empty segments,
/// `..` folded into its parent, upper-case drive letter.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");

    let (prefix, rest) = match path.as_bytes() {
        [drive, b':', ..] if drive.is_ascii_alphabetic() => {
            let prefix = format!("{}:/", char::from(*drive).to_ascii_uppercase());
            (prefix, path[2..].trim_start_matches('/'))
        }
        [b'/', ..] => ("/".to_owned(), path.trim_start_matches('/')),
        _ => (String::new(), path.as_str()),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                // Cannot climb above the root of an absolute path.
                _ if !prefix.is_empty() => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    prefix + &segments.join("/")
}

/// Directory portion of a layer path, `""` if there is none.
fn anchor_dir(anchor: &str) -> String {
    let anchor = anchor.replace('\\', "/");
    match anchor.rfind('/') {
        Some(0) => "/".to_owned(),
        Some(index) => anchor[..index].to_owned(),
        None => String::new(),
    }
}

/// Lexically place `asset` next to the layer at `anchor`, without touching the disk.
pub fn anchor_path(anchor: &str, asset: &str) -> String {
    if is_absolute(asset) {
        normalize_path(asset)
    } else {
        normalize_path(&join(&anchor_dir(anchor), asset))
    }
}

fn join(dir: &str, asset: &str) -> String {
    if dir.is_empty() {
        asset.to_owned()
    } else {
        format!("{}/{asset}", dir.trim_end_matches('/'))
    }
}

/// Filesystem resolver with optional search paths for bare asset names.
#[derive(Debug, Clone, Default)]
pub struct DefaultResolver {
    search_paths: Vec<PathBuf>,
}

impl DefaultResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver with search paths taken from `PXR_AR_DEFAULT_SEARCH_PATH`.
    pub fn from_env() -> Self {
        let search_paths = env::var_os(SEARCH_PATH_ENV)
            .map(|value| env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()).collect())
            .unwrap_or_default();
        Self { search_paths }
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Resolver for DefaultResolver {
    fn resolve_anchored(&self, anchor: &str, asset: &str) -> Option<String> {
        if asset.is_empty() {
            return None;
        }
        if is_absolute(asset) {
            return Some(normalize_path(asset));
        }

        let mut anchor = anchor;
        if let Some((package, entry)) = package_anchor(anchor) {
            let inner = normalize_path(&join(&anchor_dir(entry), asset));
            if inner != ".." && !inner.starts_with("../") {
                let candidate = usdz::package_path(package, &inner);
                return (is_anchor_relative(asset) || self.exists(&candidate)).then_some(candidate);
            }
            // Climbs out of the package: resolve next to the archive instead.
            anchor = package;
        }

        let candidate = normalize_path(&join(&anchor_dir(anchor), asset));
        if is_anchor_relative(asset) || self.exists(&candidate) {
            return Some(candidate);
        }

        // Bare names that are not next to the layer go through the search paths.
        None
    }

    fn resolve(&self, asset: &str) -> Option<String> {
        if asset.is_empty() {
            return None;
        }
        if is_absolute(asset) {
            return Some(normalize_path(asset));
        }
        if is_anchor_relative(asset) {
            return None;
        }

        self.search_paths
            .iter()
            .map(|dir| normalize_path(&join(&dir.to_string_lossy(), asset)))
            .find(|candidate| self.exists(candidate))
    }
}

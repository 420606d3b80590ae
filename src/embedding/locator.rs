//! Product image lookup on disk.
//!
//! Images live flat in one directory as `<id>.<ext>`. Two probe orders exist:
//! `jpg, png, jpeg` for single-item lookups and `jpg, jpeg, png` for the image
//! endpoint and the batch indexer. Which one a caller uses is configuration.

use std::path::{Path, PathBuf};

/// Probe order for single-item lookups that prefer png over jpeg.
pub const LIVE_PROBE_ORDER: &[&str] = &["jpg", "png", "jpeg"];

/// Probe order used while indexing the catalog.
pub const BATCH_PROBE_ORDER: &[&str] = &["jpg", "jpeg", "png"];

/// Probe order for `GET /image/{id}`.
pub const SERVE_PROBE_ORDER: &[&str] = BATCH_PROBE_ORDER;

/// Resolves product identifiers to image files under a root directory.
#[derive(Debug, Clone)]
pub struct ImageLocator {
    root: PathBuf,
    probe_order: Vec<String>,
}

impl ImageLocator {
    /// Create a locator over `root`. Relative roots are anchored at the current
    /// directory so returned paths are absolute.
    pub fn new<S: AsRef<str>>(root: impl AsRef<Path>, probe_order: &[S]) -> Self {
        let root = root.as_ref();
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            root,
            probe_order: probe_order.iter().map(|e| e.as_ref().to_string()).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn probe_order(&self) -> &[String] {
        &self.probe_order
    }

    /// First existing `<id>.<ext>` in probe order, or `None`.
    pub fn locate(&self, id: i64) -> Option<PathBuf> {
        self.probe_order
            .iter()
            .map(|ext| self.root.join(format!("{id}.{ext}")))
            .find(|path| path.is_file())
    }

    /// Resolve a catalog-supplied file name, falling back to probing by id.
    pub fn locate_record(&self, id: i64, image_file: Option<&str>) -> Option<PathBuf> {
        image_file
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .and_then(|name| self.resolve_file(name))
            .or_else(|| self.locate(id))
    }

    /// A named file under the root, rejecting anything that escapes it.
    fn resolve_file(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let stays_inside = relative
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !stays_inside {
            tracing::warn!(file = name, "ignoring image path outside the image directory");
            return None;
        }
        let path = self.root.join(relative);
        path.is_file().then_some(path)
    }
}

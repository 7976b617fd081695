//! File registry the packer reads from and writes bundles into.
//!
//! [`FileStore`] is the narrow contract the packing passes depend on;
//! [`MemoryStore`] implements it over an in-memory file list and can be loaded
//! from, and released to, a project directory.

mod disk;
mod memory;

pub use memory::MemoryStore;

use crate::asset_paths::{is_non_local_url, join_relative, split_url_suffix};
use crate::models::{FileId, SourceFile};

/// Access to the project files during a pack run.
pub trait FileStore {
    /// File registered under `id`.
    ///
    /// Ids are only handed out by the store itself, so every id is valid.
    fn file(&self, id: FileId) -> &SourceFile;

    /// Mutable access to the file registered under `id`.
    fn file_mut(&mut self, id: FileId) -> &mut SourceFile;

    /// Every registered file in registration order.
    fn file_ids(&self) -> Vec<FileId>;

    /// Look a file up by resource id or module id.
    fn find_by_id(&self, id: &str) -> Option<FileId>;

    /// Look a file up by project subpath.
    fn find_by_subpath(&self, subpath: &str) -> Option<FileId>;

    /// Register a new, empty file at `subpath`.
    ///
    /// Returns the existing file when the subpath is already taken.
    fn create_file(&mut self, subpath: &str, use_hash: bool) -> FileId;

    /// Subpath the file is released under, hashed for `use_hash` files.
    fn release_subpath(&self, id: FileId) -> String;

    /// Root-absolute URL of the released file.
    fn release_url(&self, id: FileId) -> String {
        format!("/{}", self.release_subpath(id))
    }

    /// Resolve a URL written inside file `from`.
    ///
    /// Root-absolute URLs resolve from the project root; scheme and
    /// protocol-relative URLs never resolve.
    fn resolve_url(&self, url: &str, from: FileId) -> Option<FileId> {
        let (path, _) = split_url_suffix(url.trim());
        if path.is_empty() {
            return None;
        }
        if let Some(rooted) = path.strip_prefix('/') {
            if rooted.starts_with('/') {
                return None;
            }
            return self.find_by_subpath(rooted);
        }
        if is_non_local_url(path) {
            return None;
        }
        let subpath = join_relative(self.file(from).dirname(), path)?;
        self.find_by_subpath(&subpath)
    }
}

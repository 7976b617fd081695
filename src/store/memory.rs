use std::collections::HashMap;

use crate::amd::{resolve_module_id, split_plugin_resource};
use crate::asset_paths::{generate_lookup_candidates, hashed_subpath};
use crate::models::{FileId, SourceFile, normalize_subpath};

use super::FileStore;

/// In-memory file registry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Vec<SourceFile>,
    by_id: HashMap<String, FileId>,
    by_subpath: HashMap<String, FileId>,
    by_module: HashMap<String, FileId>,
    module_base: String,
}

impl MemoryStore {
    /// Empty store resolving module ids from the project root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store resolving module ids from `base_url`.
    pub fn with_module_base(base_url: impl Into<String>) -> Self {
        Self {
            module_base: base_url.into(),
            ..Self::default()
        }
    }

    /// Register `file`, replacing any file at the same subpath.
    pub fn add(&mut self, file: SourceFile) -> FileId {
        match self.by_subpath.get(&file.subpath).copied() {
            Some(existing) => {
                self.files[existing.0] = file;
                self.reindex(existing);
                existing
            }
            None => {
                let id = FileId(self.files.len());
                self.files.push(file);
                self.index(id);
                id
            }
        }
    }

    /// Recompute the lookup keys of `id` after its id or module id changed.
    pub fn reindex(&mut self, id: FileId) {
        self.by_id.retain(|_, value| *value != id);
        self.by_module.retain(|_, value| *value != id);
        self.index(id);
    }

    fn index(&mut self, id: FileId) {
        let file = &self.files[id.0];
        self.by_subpath.insert(file.subpath.clone(), id);
        self.by_id.insert(file.id.clone(), id);
        if let Some(module_id) = &file.module_id {
            self.by_module.insert(module_id.clone(), id);
        }
    }

    /// Number of registered files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file is registered.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Directory module ids are relative to.
    pub fn module_base(&self) -> &str {
        &self.module_base
    }

    /// Resolve a module reference written in a module `base_module`.
    ///
    /// Plugin ids (`css!./a.css`) resolve to their resource.
    pub fn resolve_module_ref(&self, id: &str, base_module: Option<&str>) -> Option<FileId> {
        let resource = split_plugin_resource(id).map_or(id, |(_, resource)| resource);
        self.find_by_id(&resolve_module_id(resource, base_module))
    }
}

impl FileStore for MemoryStore {
    fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0]
    }

    fn file_mut(&mut self, id: FileId) -> &mut SourceFile {
        &mut self.files[id.0]
    }

    fn file_ids(&self) -> Vec<FileId> {
        (0..self.files.len()).map(FileId).collect()
    }

    fn find_by_id(&self, id: &str) -> Option<FileId> {
        if let Some(found) = self.by_id.get(id).or_else(|| self.by_module.get(id)) {
            return Some(*found);
        }
        generate_lookup_candidates(&self.module_base, id)
            .iter()
            .find_map(|candidate| self.by_subpath.get(candidate).copied())
    }

    fn find_by_subpath(&self, subpath: &str) -> Option<FileId> {
        self.by_subpath.get(&normalize_subpath(subpath)).copied()
    }

    fn create_file(&mut self, subpath: &str, use_hash: bool) -> FileId {
        if let Some(existing) = self.find_by_subpath(subpath) {
            return existing;
        }
        let mut file = SourceFile::new(subpath, "");
        file.use_hash = use_hash;
        file.release = false;
        self.add(file)
    }

    fn release_subpath(&self, id: FileId) -> String {
        let file = self.file(id);
        if file.use_hash {
            hashed_subpath(&file.subpath, file.content().as_bytes())
        } else {
            file.subpath.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_files_by_id_module_and_candidates() {
        let mut store = MemoryStore::with_module_base("src");
        let main = store.add(SourceFile::new("src/app/main.js", "").with_module_id("app/main"));
        let style = store.add(SourceFile::new("src/app/main.css", ""));

        assert_eq!(store.find_by_id("src/app/main.js"), Some(main));
        assert_eq!(store.find_by_id("app/main"), Some(main));
        assert_eq!(store.find_by_id("app/main.css"), Some(style));
        assert_eq!(store.find_by_id("app/missing"), None);
        assert_eq!(store.resolve_module_ref("css!./main.css", Some("app/main")), Some(style));
    }

    #[test]
    fn adding_an_existing_subpath_replaces_it() {
        let mut store = MemoryStore::new();
        let first = store.add(SourceFile::new("a.js", "one"));
        let second = store.add(SourceFile::new("/a.js", "two"));

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(store.file(first).content(), "two");
    }

    #[test]
    fn replacing_a_file_drops_its_old_ids() {
        let mut store = MemoryStore::new();
        let first = store.add(SourceFile::new("a.js", "").with_module_id("old/a"));
        let mut renamed = SourceFile::new("a.js", "").with_module_id("new/a");
        renamed.id = "renamed".into();
        let second = store.add(renamed);

        assert_eq!(first, second);
        assert_eq!(store.find_by_id("renamed"), Some(first));
        assert_eq!(store.find_by_id("new/a"), Some(first));
        assert_eq!(store.find_by_id("old/a"), None);
        assert_eq!(store.find_by_id("a.js"), Some(first));
    }

    #[test]
    fn created_files_are_hashed_and_unreleased_until_filled() {
        let mut store = MemoryStore::new();
        let bundle = store.create_file("pkg/all.js", true);
        assert!(!store.file(bundle).release);
        assert_eq!(store.create_file("pkg/all.js", false), bundle);

        store.file_mut(bundle).set_content("var a;");
        let released = store.release_subpath(bundle);
        assert!(released.starts_with("pkg/all_"));
        assert!(released.ends_with(".js"));
    }

    #[test]
    fn reindex_tracks_changed_ids() {
        let mut store = MemoryStore::new();
        let file = store.add(SourceFile::new("a.js", ""));
        store.file_mut(file).id = "lib/a".into();
        store.reindex(file);

        assert_eq!(store.find_by_id("lib/a"), Some(file));
        assert_eq!(store.by_id.get("a.js"), None);
    }
}

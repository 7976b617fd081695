//! Run-scoped packing state and the collaborator hooks.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::asset_paths::relative_url;
use crate::config::PackConfig;
use crate::models::{FileId, MarkupReference, PackItem, PackedBundle, SourceFile};
use crate::store::FileStore;

/// A member file about to be appended to a bundle.
#[derive(Debug, Clone, Copy)]
pub struct MergeEvent<'a> {
    /// The member.
    pub file: &'a SourceFile,
    /// The bundle it is merged into.
    pub bundle: &'a SourceFile,
    /// Member content after URL rewriting.
    pub content: &'a str,
}

/// Collaborator notified while bundles are written.
pub trait PackHooks {
    /// Called for every member merged into a bundle.
    fn file_merged(&mut self, _event: &MergeEvent<'_>) {}

    /// Final form of a URL written into `from`.
    ///
    /// Receives rewritten stylesheet URLs and the URLs of injected page tags.
    fn finalize_url(&self, url: String, _from: &SourceFile) -> String {
        url
    }
}

/// Hooks that keep every URL as produced.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl PackHooks for NoopHooks {}

/// Hooks turning root-absolute URLs into URLs relative to the referencing file.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelativeUrlHooks;

impl PackHooks for RelativeUrlHooks {
    fn finalize_url(&self, url: String, from: &SourceFile) -> String {
        match url.strip_prefix('/') {
            Some(rooted) if !rooted.starts_with('/') => relative_url(&from.subpath, rooted),
            _ => url,
        }
    }
}

/// State shared by the passes of one pack run.
pub struct PackContext<'c, S: FileStore> {
    /// The project files.
    pub store: S,
    /// Run configuration.
    pub config: &'c PackConfig,
    /// Collaborator hooks.
    pub hooks: &'c mut dyn PackHooks,
    /// Pack items in build order once ordered.
    pub items: Vec<PackItem>,
    /// Pages selected by `page.src`.
    pub pages: Vec<FileId>,
    /// Merged bundles keyed by pack id.
    pub packed: IndexMap<String, PackedBundle>,
    id_counter: usize,
    item_by_id: HashMap<String, usize>,
    item_by_target: HashMap<FileId, usize>,
    membership: HashMap<FileId, Vec<String>>,
    preload: IndexMap<String, Vec<FileId>>,
    script_scans: HashMap<FileId, Vec<MarkupReference>>,
    style_scans: HashMap<FileId, Vec<MarkupReference>>,
}

impl<'c, S: FileStore> PackContext<'c, S> {
    /// Fresh context over `store`.
    pub fn new(store: S, config: &'c PackConfig, hooks: &'c mut dyn PackHooks) -> Self {
        Self {
            store,
            config,
            hooks,
            items: Vec::new(),
            pages: Vec::new(),
            packed: IndexMap::new(),
            id_counter: 0,
            item_by_id: HashMap::new(),
            item_by_target: HashMap::new(),
            membership: HashMap::new(),
            preload: IndexMap::new(),
            script_scans: HashMap::new(),
            style_scans: HashMap::new(),
        }
    }

    /// Allocate a generated pack id.
    pub fn next_auto_id(&mut self) -> String {
        let id = self.config.auto_pack_id(self.id_counter);
        self.id_counter += 1;
        id
    }

    /// Index of the item answering to `id`, aliases included.
    pub fn item_index(&self, id: &str) -> Option<usize> {
        self.item_by_id.get(id).copied()
    }

    /// Index of the item producing the bundle file `target`.
    pub fn item_for_target(&self, target: FileId) -> Option<usize> {
        self.item_by_target.get(&target).copied()
    }

    /// Whether `file` is the target of any pack item.
    pub fn is_bundle_target(&self, file: FileId) -> bool {
        self.item_by_target.contains_key(&file)
    }

    /// Register a new item and return its index.
    pub fn push_item(&mut self, item: PackItem) -> usize {
        let index = self.items.len();
        self.item_by_id.insert(item.id.clone(), index);
        self.item_by_target.insert(item.target, index);
        self.items.push(item);
        index
    }

    /// Make `alias` resolve to the item at `index`.
    pub fn register_alias(&mut self, alias: &str, index: usize) {
        self.item_by_id.insert(alias.to_string(), index);
    }

    /// Replace the item list, rebuilding the lookup tables.
    pub fn replace_items(&mut self, items: Vec<PackItem>) {
        self.item_by_id.clear();
        self.item_by_target.clear();
        self.items = Vec::with_capacity(items.len());
        for item in items {
            let index = self.items.len();
            for alias in &item.aliases {
                self.item_by_id.insert(alias.clone(), index);
            }
            self.push_item(item);
        }
    }

    /// Canonical id for `id`, following aliases.
    pub fn canonical_id<'a>(&'a self, id: &'a str) -> &'a str {
        match self.item_index(id) {
            Some(index) => &self.items[index].id,
            None => id,
        }
    }

    /// Record `members` as the complete member list of `pack_id`.
    pub fn set_members(&mut self, pack_id: &str, members: &[FileId]) {
        for ids in self.membership.values_mut() {
            ids.retain(|id| id != pack_id);
        }
        for member in members {
            let ids = self.membership.entry(*member).or_default();
            if !ids.iter().any(|id| id == pack_id) {
                ids.push(pack_id.to_string());
            }
        }
    }

    /// Whether `file` currently belongs to the pack answering to `pack_id`.
    pub fn is_in_pack(&self, file: FileId, pack_id: &str) -> bool {
        let pack_id = self.canonical_id(pack_id);
        self.membership
            .get(&file)
            .is_some_and(|ids| ids.iter().any(|id| id == pack_id))
    }

    /// Merged bundles containing `file`.
    pub fn bundles_containing(&self, file: FileId) -> Vec<&PackedBundle> {
        self.membership
            .get(&file)
            .map(|ids| ids.iter().filter_map(|id| self.packed.get(id)).collect())
            .unwrap_or_default()
    }

    /// Record a merged bundle and the pages that load it eagerly.
    pub fn register_bundle(&mut self, bundle: PackedBundle) {
        let pages = self.preload.entry(bundle.id.clone()).or_default();
        for page in &bundle.load {
            if !pages.contains(page) {
                pages.push(*page);
            }
        }
        self.packed.insert(bundle.id.clone(), bundle);
    }

    /// Pages that load the bundle `pack_id` eagerly.
    pub fn preloaded_pages(&self, pack_id: &str) -> &[FileId] {
        self.preload.get(pack_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cached script scan of `page`.
    pub fn script_scan(&self, page: FileId) -> Option<&[MarkupReference]> {
        self.script_scans.get(&page).map(Vec::as_slice)
    }

    /// Cached style scan of `page`.
    pub fn style_scan(&self, page: FileId) -> Option<&[MarkupReference]> {
        self.style_scans.get(&page).map(Vec::as_slice)
    }

    pub(crate) fn cache_script_scan(&mut self, page: FileId, references: Vec<MarkupReference>) {
        self.script_scans.insert(page, references);
    }

    pub(crate) fn cache_style_scan(&mut self, page: FileId, references: Vec<MarkupReference>) {
        self.style_scans.insert(page, references);
    }

    /// Consume the context, keeping the store and the bundles.
    pub fn finish(self) -> (S, Vec<PackedBundle>) {
        (self.store, self.packed.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn relative_url_hooks_rewrite_rooted_urls_only() {
        let page = SourceFile::new("site/index.html", "");
        let hooks = RelativeUrlHooks;
        assert_eq!(hooks.finalize_url("/pkg/all.js".into(), &page), "../pkg/all.js");
        assert_eq!(hooks.finalize_url("//cdn/a.js".into(), &page), "//cdn/a.js");
        assert_eq!(hooks.finalize_url("img/a.png".into(), &page), "img/a.png");
    }

    #[test]
    fn membership_follows_latest_member_list() {
        let config = PackConfig::default();
        let mut hooks = NoopHooks;
        let mut ctx = PackContext::new(MemoryStore::new(), &config, &mut hooks);

        ctx.set_members("p0", &[FileId(1), FileId(2)]);
        assert!(ctx.is_in_pack(FileId(2), "p0"));

        ctx.set_members("p0", &[FileId(1)]);
        assert!(ctx.is_in_pack(FileId(1), "p0"));
        assert!(!ctx.is_in_pack(FileId(2), "p0"));
    }

    #[test]
    fn auto_ids_are_sequential_per_run() {
        let config = PackConfig::default();
        let mut hooks = NoopHooks;
        let mut ctx = PackContext::new(MemoryStore::new(), &config, &mut hooks);
        assert_eq!(ctx.next_auto_id(), "p0");
        assert_eq!(ctx.next_auto_id(), "p1");
    }
}

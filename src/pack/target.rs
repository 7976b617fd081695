//! Turning pack requests into pack items, one item per bundle target.

use tracing::{debug, info, warn};

use crate::asset_paths::aio_sibling_path;
use crate::config::{FileSelector, LoadSpec, PackRule};
use crate::error::{PackError, PackResult};
use crate::models::{FileId, MarkupReference, PackItem, PackKind, SourceFile, normalize_subpath};
use crate::pattern::{PatternSet, glob_matches};
use crate::store::FileStore;

use super::context::PackContext;

/// A request for a bundle, produced by a page or a configured rule.
#[derive(Debug, Clone)]
pub struct PackRequest {
    /// Origin of the request.
    pub kind: PackKind,
    /// Bundle path relative to the project root.
    pub target: Option<String>,
    /// Explicit pack id.
    pub pack_id: Option<String>,
    /// Page that triggered the request.
    pub host: Option<FileId>,
    /// Files merged regardless of pattern matching.
    pub seeds: Vec<FileId>,
    /// Include rules.
    pub files: FileSelector,
    /// Pull in transitive requirements of members.
    pub pack_deps: bool,
    /// Pull in non-script requirements of the seed modules.
    pub pack_dep_resource: bool,
    /// Pages that load the bundle eagerly.
    pub load: Option<LoadSpec>,
    /// Position of the bundle tag within pages.
    pub load_order: i32,
    /// Page references the bundle replaces.
    pub replacers: Vec<MarkupReference>,
}

impl PackRequest {
    /// Empty request of the given kind.
    pub fn new(kind: PackKind) -> Self {
        Self {
            kind,
            target: None,
            pack_id: None,
            host: None,
            seeds: Vec::new(),
            files: FileSelector::default(),
            pack_deps: false,
            pack_dep_resource: false,
            load: None,
            load_order: 0,
            replacers: Vec::new(),
        }
    }

    /// Request for a configured rule.
    pub fn from_rule(rule: &PackRule) -> Self {
        Self {
            target: rule.target.clone(),
            pack_id: rule.pack_id.clone(),
            files: rule.files.clone(),
            pack_deps: rule.pack_deps,
            load: rule.load.clone(),
            load_order: rule.load_order.unwrap_or_default(),
            ..Self::new(PackKind::Rule)
        }
    }

    fn describe(&self) -> String {
        match &self.pack_id {
            Some(id) => format!("{:?} request '{id}'", self.kind),
            None => format!("{:?} request", self.kind),
        }
    }
}

/// Outcome of resolving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A new item was created at this index.
    Created(usize),
    /// The request was unioned into the item at this index.
    Merged(usize),
    /// The request produced no item.
    Skipped,
}

impl Resolution {
    /// Index of the resulting item.
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Created(index) | Self::Merged(index) => Some(index),
            Self::Skipped => None,
        }
    }
}

enum Placement {
    New(String),
    Existing(usize),
}

/// Resolve `request` into a pack item.
///
/// Requests targeting an existing bundle are unioned into it. A target taken by
/// an ordinary file moves the bundle to the `_aio` sibling and makes the file
/// its first seed, unless the file is not released or is a fragment.
pub fn resolve_request<S: FileStore>(
    ctx: &mut PackContext<'_, S>,
    request: PackRequest,
) -> PackResult<Resolution> {
    let target = request
        .target
        .as_deref()
        .map(normalize_subpath)
        .filter(|target| !target.is_empty())
        .ok_or_else(|| PackError::missing_target(request.describe()))?;

    let mut seeds = request.seeds.clone();
    let placement = match place_target(ctx, &target, &mut seeds) {
        Some(placement) => placement,
        None => return Ok(Resolution::Skipped),
    };

    let target_path = match &placement {
        Placement::New(path) => path.clone(),
        Placement::Existing(index) => ctx.store.file(ctx.items[*index].target).subpath.clone(),
    };
    if let Some(id) = &request.pack_id {
        if let Some(owner) = ctx.item_index(id) {
            let existing = &ctx.store.file(ctx.items[owner].target).subpath;
            if *existing != target_path {
                return Err(PackError::DuplicatePackId {
                    id: id.clone(),
                    existing: existing.clone(),
                    requested: target_path,
                });
            }
        }
    }

    let patterns = build_patterns(ctx, &request.files, &seeds);
    let pre_load = preload_pages(ctx, request.load.as_ref(), request.host);

    match placement {
        Placement::Existing(index) => {
            union_into(ctx, index, request, seeds, patterns, pre_load);
            Ok(Resolution::Merged(index))
        }
        Placement::New(path) => {
            if seeds.is_empty() && patterns.include.is_empty() {
                info!("{}: nothing to pack into {path}", request.describe());
                return Ok(Resolution::Skipped);
            }

            let file = ctx.store.create_file(&path, true);
            let (id, auto_id) = match request.pack_id {
                Some(id) => (id, false),
                None => (ctx.next_auto_id(), true),
            };
            debug!("pack item {id} -> {path}");
            let index = ctx.push_item(PackItem {
                id,
                auto_id,
                aliases: Vec::new(),
                kind: request.kind,
                target: file,
                host: request.host,
                raw_combines: seeds,
                patterns,
                pack_deps: request.pack_deps,
                pack_dep_resource: request.pack_dep_resource,
                pre_load,
                load_order: request.load_order,
                replacers: request.replacers,
                to_merge_files: Vec::new(),
            });
            Ok(Resolution::Created(index))
        }
    }
}

fn place_target<S: FileStore>(
    ctx: &PackContext<'_, S>,
    target: &str,
    seeds: &mut Vec<FileId>,
) -> Option<Placement> {
    let Some(existing) = ctx.store.find_by_subpath(target) else {
        return Some(Placement::New(target.to_string()));
    };
    if let Some(index) = ctx.item_for_target(existing) {
        return Some(Placement::Existing(index));
    }

    let file = ctx.store.file(existing);
    if !file.release || file.partial {
        warn!("pack target {target} is not released or is part of another file, skipped");
        return None;
    }

    if !seeds.contains(&existing) {
        seeds.insert(0, existing);
    }
    let sibling = aio_sibling_path(target);
    warn!("pack target {target} is an existing file, packing into {sibling}");
    match ctx.store.find_by_subpath(&sibling) {
        None => Some(Placement::New(sibling)),
        Some(taken) => match ctx.item_for_target(taken) {
            Some(index) => Some(Placement::Existing(index)),
            None => {
                warn!("pack target {sibling} is an existing file as well, skipped");
                None
            }
        },
    }
}

fn build_patterns<S: FileStore>(
    ctx: &PackContext<'_, S>,
    files: &FileSelector,
    seeds: &[FileId],
) -> PatternSet {
    match files {
        FileSelector::Patterns(rules) => PatternSet::parse(rules),
        FileSelector::Computed(compute) => {
            let seed_files: Vec<&SourceFile> = seeds.iter().map(|id| ctx.store.file(*id)).collect();
            PatternSet::parse(compute(&seed_files))
        }
        FileSelector::Matching(predicate) => {
            let mut set = PatternSet::default();
            set.push_predicate(predicate.clone());
            set
        }
    }
}

fn preload_pages<S: FileStore>(
    ctx: &PackContext<'_, S>,
    load: Option<&LoadSpec>,
    host: Option<FileId>,
) -> Vec<FileId> {
    match load {
        None | Some(LoadSpec::Flag(false)) => Vec::new(),
        Some(LoadSpec::Flag(true)) => match host {
            Some(host) => vec![host],
            None => ctx.pages.clone(),
        },
        Some(LoadSpec::Pages(patterns)) => ctx
            .store
            .file_ids()
            .into_iter()
            .filter(|id| {
                let subpath = &ctx.store.file(*id).subpath;
                patterns.iter().any(|pattern| glob_matches(pattern, subpath))
            })
            .collect(),
    }
}

fn union_into<S: FileStore>(
    ctx: &mut PackContext<'_, S>,
    index: usize,
    request: PackRequest,
    seeds: Vec<FileId>,
    patterns: PatternSet,
    pre_load: Vec<FileId>,
) {
    let item = &mut ctx.items[index];
    for seed in seeds {
        if !item.raw_combines.contains(&seed) {
            item.raw_combines.push(seed);
        }
    }
    item.patterns.merge(patterns);
    item.pack_deps |= request.pack_deps;
    item.pack_dep_resource |= request.pack_dep_resource;
    for page in pre_load {
        if !item.pre_load.contains(&page) {
            item.pre_load.push(page);
        }
    }
    for replacer in request.replacers {
        if !item.replacers.contains(&replacer) {
            item.replacers.push(replacer);
        }
    }

    let alias = match request.pack_id {
        Some(explicit) if item.auto_id => {
            let generated = std::mem::replace(&mut item.id, explicit.clone());
            item.auto_id = false;
            item.aliases.push(generated);
            Some(explicit)
        }
        Some(explicit) if explicit != item.id => {
            item.aliases.push(explicit.clone());
            Some(explicit)
        }
        _ => None,
    };
    debug!("request unioned into pack item {}", item.id);
    if let Some(alias) = alias {
        ctx.register_alias(&alias, index);
    }
}

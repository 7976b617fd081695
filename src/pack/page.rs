//! Page discovery, page scans and the bundle requests a page produces.

use tracing::warn;

use crate::config::{LoadSpec, PackOptions};
use crate::markup::{ResolvedReference, ScanOptions, ScanOutcome, scan_scripts, scan_styles};
use crate::models::{FileId, MarkupReference, PackKind, SourceFile};
use crate::pattern::glob_matches;
use crate::store::FileStore;

use super::context::PackContext;
use super::target::PackRequest;

/// Files matching the `page.src` patterns, in store order.
pub fn discover_pages<S: FileStore>(ctx: &PackContext<'_, S>) -> Vec<FileId> {
    let patterns = ctx.config.page.src.to_vec();
    ctx.store
        .file_ids()
        .into_iter()
        .filter(|id| {
            let subpath = &ctx.store.file(*id).subpath;
            patterns.iter().any(|pattern| glob_matches(pattern, subpath))
        })
        .collect()
}

/// Packable script references of `page`, inserting placeholders on first use.
pub fn scan_page_scripts<S: FileStore>(
    ctx: &mut PackContext<'_, S>,
    page: FileId,
) -> Vec<MarkupReference> {
    if let Some(references) = ctx.script_scan(page) {
        return references.to_vec();
    }
    let collect = ctx.config.page.pack_js.for_page(ctx.store.file(page)).is_some();
    let references = scan_page(ctx, page, collect, |content, options, resolve| {
        scan_scripts(content, options, resolve)
    });
    ctx.cache_script_scan(page, references.clone());
    references
}

/// Packable stylesheet references of `page`, inserting placeholders on first use.
pub fn scan_page_styles<S: FileStore>(
    ctx: &mut PackContext<'_, S>,
    page: FileId,
) -> Vec<MarkupReference> {
    if let Some(references) = ctx.style_scan(page) {
        return references.to_vec();
    }
    let collect = ctx.config.page.pack_css.for_page(ctx.store.file(page)).is_some();
    let references = scan_page(ctx, page, collect, |content, options, resolve| {
        scan_styles(content, options, resolve)
    });
    ctx.cache_style_scan(page, references.clone());
    references
}

type Resolver<'r> = &'r mut dyn FnMut(&str) -> Option<ResolvedReference>;

fn scan_page<S, F>(
    ctx: &mut PackContext<'_, S>,
    page: FileId,
    collect: bool,
    scan: F,
) -> Vec<MarkupReference>
where
    S: FileStore,
    F: FnOnce(&str, &ScanOptions<'_>, Resolver<'_>) -> ScanOutcome,
{
    let config = ctx.config;
    let options = ScanOptions::new(&config.page, collect);
    let store = &ctx.store;
    let mut resolve = |url: &str| {
        store.resolve_url(url, page).map(|file| ResolvedReference {
            file,
            basename: store.file(file).basename().to_string(),
        })
    };

    let content = store.file(page).content();
    let outcome = scan(content, &options, &mut resolve);
    if outcome.content != content {
        ctx.store.file_mut(page).set_content(outcome.content);
    }
    outcome.references
}

/// Bundle requests of `page`: async entries, their styles, scripts and styles.
pub fn page_requests<S: FileStore>(ctx: &PackContext<'_, S>, page: FileId) -> Vec<PackRequest> {
    let entries = async_entries(ctx, page);
    let page_file = ctx.store.file(page);
    let options = &ctx.config.page;
    let mut requests = Vec::new();

    if let (Some(first), Some(opts)) = (entries.first(), options.pack_async.for_page(page_file)) {
        let default = ctx.store.file(*first).subpath.clone();
        let mut request = page_request(
            PackKind::AsyncEntry,
            page_file,
            page,
            &default,
            opts,
            options.load_order,
        );
        request.seeds = entries.clone();
        request.pack_deps = true;
        requests.push(request);
    }

    if let (false, Some(opts)) = (entries.is_empty(), options.pack_dep_style.for_page(page_file)) {
        let default = format!("{}_dep.css", page_file.subpath_no_ext());
        let mut request = page_request(
            PackKind::DependencyStyle,
            page_file,
            page,
            &default,
            opts,
            options.load_order,
        );
        request.seeds = entries;
        request.pack_dep_resource = true;
        requests.push(request);
    }

    let scripts = ctx.script_scan(page).map(<[MarkupReference]>::to_vec).unwrap_or_default();
    if let (true, Some(opts)) = (scripts.len() > 1, options.pack_js.for_page(page_file)) {
        let default = format!("{}_aio.js", page_file.subpath_no_ext());
        requests.push(reference_request(
            PackKind::PageScript,
            page_file,
            page,
            &default,
            opts,
            options.load_order,
            scripts,
        ));
    }

    let styles = ctx.style_scan(page).map(<[MarkupReference]>::to_vec).unwrap_or_default();
    if let (true, Some(opts)) = (styles.len() > 1, options.pack_css.for_page(page_file)) {
        let default = format!("{}_aio.css", page_file.subpath_no_ext());
        requests.push(reference_request(
            PackKind::PageStyle,
            page_file,
            page,
            &default,
            opts,
            options.load_order,
            styles,
        ));
    }

    requests
}

fn async_entries<S: FileStore>(ctx: &PackContext<'_, S>, page: FileId) -> Vec<FileId> {
    let page_file = ctx.store.file(page);
    page_file
        .asyncs
        .iter()
        .filter_map(|id| {
            let found = ctx.store.find_by_id(id);
            if found.is_none() {
                warn!("{}: async entry module {id} is not found", page_file.subpath);
            }
            found
        })
        .collect()
}

fn page_request(
    kind: PackKind,
    page_file: &SourceFile,
    page: FileId,
    default_target: &str,
    options: PackOptions,
    default_order: i32,
) -> PackRequest {
    let target = match &options.target {
        Some(spec) => spec.resolve(default_target, Some(page_file)),
        None => default_target.to_string(),
    };
    PackRequest {
        target: Some(target),
        pack_id: options.pack_id,
        host: Some(page),
        files: options.files,
        load: Some(options.load.unwrap_or(LoadSpec::Flag(true))),
        load_order: options.load_order.unwrap_or(default_order),
        ..PackRequest::new(kind)
    }
}

fn reference_request(
    kind: PackKind,
    page_file: &SourceFile,
    page: FileId,
    default_target: &str,
    options: PackOptions,
    default_order: i32,
    references: Vec<MarkupReference>,
) -> PackRequest {
    let mut request = page_request(kind, page_file, page, default_target, options, default_order);
    request.seeds = references.iter().map(|reference| reference.file).collect();
    request.replacers = references;
    request
}

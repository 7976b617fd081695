//! Writing bundle tags into the pages that load them.

use tracing::debug;

use crate::markup::{link_style_tags, resource_config_script, script_tags};
use crate::models::{FileId, MarkupReference, PackedBundle};
use crate::store::FileStore;

use super::context::PackContext;

/// Inject the tags of preloaded bundles into every page.
///
/// Tags of files now served by a bundle are removed, bundle tags go to the
/// placeholders (or before `</body>` / `</head>`), the resource-config
/// placeholder is filled and leftover placeholders are dropped.
///
/// Returns the number of pages whose content changed.
pub fn inject_bundles<S: FileStore>(ctx: &mut PackContext<'_, S>) -> usize {
    let mut updated = 0;
    for page in ctx.pages.clone() {
        let content = render_page(ctx, page);
        if content != ctx.store.file(page).content() {
            debug!("bundle tags written into {}", ctx.store.file(page).subpath);
            ctx.store.file_mut(page).set_content(content);
            updated += 1;
        }
    }
    updated
}

fn render_page<S: FileStore>(ctx: &PackContext<'_, S>, page: FileId) -> String {
    let options = &ctx.config.page;
    let page_file = ctx.store.file(page);

    let mut bundles: Vec<&PackedBundle> = ctx
        .packed
        .values()
        .filter(|bundle| ctx.preloaded_pages(&bundle.id).contains(&page))
        .collect();
    bundles.sort_by_key(|bundle| bundle.load_order);

    let mut content = page_file.content().to_string();
    for reference in served_references(ctx, page, &bundles) {
        content = content.replacen(&reference.raw, "", 1);
    }

    let (styles, scripts): (Vec<&PackedBundle>, Vec<&PackedBundle>) = bundles
        .into_iter()
        .partition(|bundle| ctx.store.file(bundle.file).is_style_like());

    if !scripts.is_empty() {
        let tags = bundle_tags(ctx, page, &scripts, script_tags);
        content = insert_tags(content, &options.script_placeholder, &tags, "</body>");
    }
    if !styles.is_empty() {
        let tags = bundle_tags(ctx, page, &styles, link_style_tags);
        content = insert_tags(content, &options.style_placeholder, &tags, "</head>");
    }

    let resource_config = options
        .resource_config
        .as_ref()
        .map(resource_config_script)
        .unwrap_or_default();
    content = content.replacen(&options.resource_config_placeholder, &resource_config, 1);

    for placeholder in [
        &options.script_placeholder,
        &options.style_placeholder,
        &options.resource_config_placeholder,
    ] {
        content = content.replace(placeholder.as_str(), "");
    }
    content
}

/// Page references whose file is delivered by one of `bundles`.
fn served_references<'a, S: FileStore>(
    ctx: &'a PackContext<'_, S>,
    page: FileId,
    bundles: &[&'a PackedBundle],
) -> Vec<&'a MarkupReference> {
    let scanned = ctx
        .script_scan(page)
        .unwrap_or_default()
        .iter()
        .chain(ctx.style_scan(page).unwrap_or_default());

    let mut served: Vec<&MarkupReference> = scanned
        .filter(|reference| bundles.iter().any(|bundle| bundle.members.contains(&reference.file)))
        .collect();
    for &bundle in bundles {
        for replacer in &bundle.replacers {
            if !served.contains(&replacer) {
                served.push(replacer);
            }
        }
    }
    served
}

/// One tag per bundle, carrying the attributes of the first tag it replaces.
fn bundle_tags<S: FileStore>(
    ctx: &PackContext<'_, S>,
    page: FileId,
    bundles: &[&PackedBundle],
    render: fn(&[String], &str) -> String,
) -> String {
    let page_file = ctx.store.file(page);
    bundles
        .iter()
        .map(|bundle| {
            let url = ctx
                .hooks
                .finalize_url(ctx.store.release_url(bundle.file), page_file);
            let attrs = bundle
                .replacers
                .first()
                .map_or("", |reference| reference.attrs.as_str());
            render(&[url], attrs)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn insert_tags(content: String, placeholder: &str, tags: &str, fallback: &str) -> String {
    if content.contains(placeholder) {
        return content.replacen(placeholder, &format!("{tags}\n{placeholder}"), 1);
    }
    match content.to_ascii_lowercase().rfind(fallback) {
        Some(index) => format!("{}{tags}\n{}", &content[..index], &content[index..]),
        None => format!("{content}\n{tags}"),
    }
}

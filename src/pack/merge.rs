//! Concatenating members into their bundle file.

use tracing::{debug, info};

use crate::asset_paths::{is_non_local_url, join_relative, relative_url, split_url_suffix};
use crate::models::{FileId, PackedBundle};
use crate::store::FileStore;

use super::context::{MergeEvent, PackContext, PackHooks};
use super::css::{rewrite_css_urls, strip_charset};
use super::select::select_merge_files;

/// Select the members of the item at `index` and write its bundle.
///
/// Returns `None` when the item ends up without members.
pub fn merge_pack_item<S: FileStore>(
    ctx: &mut PackContext<'_, S>,
    index: usize,
) -> Option<PackedBundle> {
    let members = select_merge_files(ctx, index);
    if members.is_empty() {
        let item = &ctx.items[index];
        info!(
            "pack {} has no files to merge into {}",
            item.id,
            ctx.store.file(item.target).subpath
        );
        return None;
    }
    Some(write_bundle(ctx, index, &members))
}

/// Write `members` into the bundle of the item at `index` and register it.
pub fn write_bundle<S: FileStore>(
    ctx: &mut PackContext<'_, S>,
    index: usize,
    members: &[FileId],
) -> PackedBundle {
    let target = ctx.items[index].target;
    let is_style = ctx.store.file(target).is_style_like();

    let mut content = String::new();
    if is_style {
        if let Some(charset) = &ctx.config.css_charset {
            content.push_str(&format!("@charset \"{charset}\";\n"));
        }
    }

    let mut requires: Vec<String> = Vec::new();
    let mut links: Vec<String> = Vec::new();
    let mut asyncs: Vec<String> = Vec::new();
    for &member in members {
        let file = ctx.store.file(member);
        extend_unique(&mut requires, &file.requires);
        extend_unique(&mut links, &file.links);
        extend_unique(&mut asyncs, &file.asyncs);

        let text = if file.is_style_like() && member != target {
            let store = &ctx.store;
            let hooks: &dyn PackHooks = &*ctx.hooks;
            let rewritten =
                rewrite_css_urls(file.content(), |url| {
                    rewrite_url(store, hooks, member, target, url)
                });
            strip_charset(&rewritten)
        } else {
            file.content().to_string()
        };
        if text.is_empty() {
            continue;
        }

        ctx.hooks.file_merged(&MergeEvent {
            file,
            bundle: ctx.store.file(target),
            content: &text,
        });
        content.push_str(&text);
        content.push('\n');
    }

    let bundle_file = ctx.store.file_mut(target);
    bundle_file.clear_dependencies();
    for id in &requires {
        bundle_file.add_require(id);
    }
    for id in &links {
        bundle_file.add_link(id);
    }
    for id in &asyncs {
        bundle_file.add_async(id);
    }
    bundle_file.set_content(content);
    bundle_file.release = true;

    let item = &ctx.items[index];
    debug!("pack {} merged {} files into {}", item.id, members.len(), bundle_file.subpath);
    let bundle = PackedBundle {
        id: item.id.clone(),
        kind: item.kind,
        file: target,
        members: members.to_vec(),
        load: item.pre_load.clone(),
        host: item.host,
        load_order: item.load_order,
        replacers: item.replacers.clone(),
    };

    let pack_id = bundle.id.clone();
    ctx.set_members(&pack_id, members);
    ctx.register_bundle(bundle.clone());
    bundle
}

fn extend_unique(values: &mut Vec<String>, ids: &[String]) {
    for id in ids {
        if !values.contains(id) {
            values.push(id.clone());
        }
    }
}

/// New form of `url`, written in `member`, once the text lives in `bundle`.
fn rewrite_url<S: FileStore>(
    store: &S,
    hooks: &dyn PackHooks,
    member: FileId,
    bundle: FileId,
    url: &str,
) -> Option<String> {
    if is_non_local_url(url) {
        return None;
    }

    let (path, suffix) = split_url_suffix(url.trim());
    let resolved = match store.resolve_url(path, member) {
        Some(found) => store.release_subpath(found),
        None => join_relative(store.file(member).dirname(), path)?,
    };

    let bundle_file = store.file(bundle);
    let relocated = format!("{}{suffix}", relative_url(&bundle_file.subpath, &resolved));
    let finalized = hooks.finalize_url(relocated, bundle_file);
    (finalized != url).then_some(finalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileSelector, PackConfig, PackRule};
    use crate::models::SourceFile;
    use crate::pack::context::NoopHooks;
    use crate::pack::target::{PackRequest, resolve_request};
    use crate::store::MemoryStore;

    fn rule(target: &str, files: &[&str]) -> PackRequest {
        PackRequest::from_rule(&PackRule {
            target: Some(target.into()),
            files: FileSelector::Patterns(files.iter().map(|rule| rule.to_string()).collect()),
            ..PackRule::default()
        })
    }

    #[derive(Default)]
    struct Recorder {
        merged: Vec<String>,
    }

    impl PackHooks for Recorder {
        fn file_merged(&mut self, event: &MergeEvent<'_>) {
            self.merged.push(format!("{} -> {}", event.file.subpath, event.bundle.subpath));
        }
    }

    #[test]
    fn merges_members_and_their_dependency_metadata() {
        let config = PackConfig::default();
        let mut hooks = Recorder::default();
        let mut store = MemoryStore::new();
        store.add(SourceFile::new("a.js", "var a;").with_requires(["lib.js"]));
        store.add(SourceFile::new("b.js", "var b;").with_asyncs(["page/main"]));
        store.add(SourceFile::new("empty.js", ""));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        let index = resolve_request(&mut ctx, rule("pkg/all.js", &["/*.js"])).unwrap().index().unwrap();
        let bundle = merge_pack_item(&mut ctx, index).unwrap();

        let file = ctx.store.file(bundle.file);
        assert_eq!(file.content(), "var a;\nvar b;\n");
        assert!(file.release);
        assert_eq!(file.requires, vec!["lib.js".to_string()]);
        assert_eq!(file.asyncs, vec!["page/main".to_string()]);
        assert!(ctx.packed.contains_key("p0"));
        drop(ctx);
        assert_eq!(hooks.merged, vec!["a.js -> pkg/all.js", "b.js -> pkg/all.js"]);
    }

    #[test]
    fn style_urls_are_relocated_to_the_bundle() {
        let config = PackConfig::default();
        let mut hooks = NoopHooks;
        let mut store = MemoryStore::new();
        store.add(SourceFile::new(
            "css/theme/a.css",
            "@charset \"utf-8\";\n.a { background: url(../img/a.png?v=2); }\n.b { background: url(/img/b.png); }",
        ));
        store.add(SourceFile::new("css/img/a.png", ""));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        let index = resolve_request(&mut ctx, rule("pkg/all.css", &["css/**/*.css"])).unwrap().index().unwrap();
        let bundle = merge_pack_item(&mut ctx, index).unwrap();

        assert_eq!(
            ctx.store.file(bundle.file).content(),
            "\n.a { background: url(../css/img/a.png?v=2); }\n.b { background: url(/img/b.png); }\n"
        );
    }

    #[test]
    fn urls_escaping_the_project_root_are_kept() {
        let config = PackConfig::default();
        let mut hooks = NoopHooks;
        let mut store = MemoryStore::new();
        store.add(SourceFile::new(
            "css/a.css",
            ".a { background: url(../../../x.png); }\n.b { background: url(\"img/b.png\"); }",
        ));
        store.add(SourceFile::new("css/img/b.png", ""));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        let index = resolve_request(&mut ctx, rule("pkg/all.css", &["/css/*.css"])).unwrap().index().unwrap();
        let bundle = merge_pack_item(&mut ctx, index).unwrap();

        assert_eq!(
            ctx.store.file(bundle.file).content(),
            ".a { background: url(../../../x.png); }\n.b { background: url(\"../css/img/b.png\"); }\n"
        );
    }

    #[test]
    fn configured_charset_is_emitted_once() {
        let config = PackConfig {
            css_charset: Some("utf-8".into()),
            ..PackConfig::default()
        };
        let mut hooks = NoopHooks;
        let mut store = MemoryStore::new();
        store.add(SourceFile::new("a.css", "@charset \"gbk\";.a{}"));
        store.add(SourceFile::new("b.css", ".b{}"));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        let index = resolve_request(&mut ctx, rule("pkg/all.css", &["/*.css"])).unwrap().index().unwrap();
        let bundle = merge_pack_item(&mut ctx, index).unwrap();

        assert_eq!(ctx.store.file(bundle.file).content(), "@charset \"utf-8\";\n.a{}\n.b{}\n");
    }

    #[test]
    fn empty_selection_produces_no_bundle() {
        let config = PackConfig::default();
        let mut hooks = NoopHooks;
        let mut store = MemoryStore::new();
        store.add(SourceFile::new("a.css", ""));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        let index = resolve_request(&mut ctx, rule("pkg/all.js", &["*.js"])).unwrap().index().unwrap();
        assert!(merge_pack_item(&mut ctx, index).is_none());
        assert!(ctx.packed.is_empty());
    }
}

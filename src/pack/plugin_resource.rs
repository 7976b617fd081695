//! Pointing loader-plugin resource ids (`css!theme.css`) at the bundles that absorbed them.

use tracing::{debug, warn};

use crate::amd::{
    ModuleReference, ReferenceKind, module_id_for_path, resolve_module_id, resource_id_for_path,
    split_plugin_resource, update_resource_ids,
};
use crate::models::FileId;
use crate::store::FileStore;

use super::context::PackContext;

/// Rewrite plugin resource ids in every script once bundles are merged.
///
/// Returns the number of scripts whose content changed.
pub fn rewrite_plugin_resources<S: FileStore>(ctx: &mut PackContext<'_, S>) -> usize {
    if ctx.packed.is_empty() {
        return 0;
    }

    let mut updates: Vec<(FileId, String)> = Vec::new();
    for id in ctx.store.file_ids() {
        let file = ctx.store.file(id);
        if !file.is_script_like() || !file.content().contains('!') {
            continue;
        }
        let Some(own_module) = file
            .module_id
            .clone()
            .or_else(|| module_id_for_path(&file.subpath, &ctx.config.module))
        else {
            continue;
        };

        let ctx_ref = &*ctx;
        let rewritten = update_resource_ids(file.content(), |reference| {
            packed_resource_id(ctx_ref, reference, &own_module)
        });
        if rewritten != file.content() {
            debug!("plugin resource ids updated in {}", file.subpath);
            updates.push((id, rewritten));
        }
    }

    let count = updates.len();
    for (id, content) in updates {
        ctx.store.file_mut(id).set_content(content);
    }
    count
}

fn packed_resource_id<S: FileStore>(
    ctx: &PackContext<'_, S>,
    reference: &ModuleReference<'_>,
    own_module: &str,
) -> Option<String> {
    let (plugin, resource) = split_plugin_resource(reference.id)?;
    let base = match reference.kind {
        ReferenceKind::AsyncRequire => None,
        ReferenceKind::Define | ReferenceKind::SyncRequire => {
            Some(reference.declared_module.unwrap_or(own_module))
        }
    };

    let file = ctx.store.find_by_id(&resolve_module_id(resource, base))?;
    let bundles = ctx.bundles_containing(file);
    match bundles.as_slice() {
        [bundle] => {
            let released = ctx.store.release_subpath(bundle.file);
            let packed = resource_id_for_path(&released, &ctx.config.module)?;
            Some(format!("{plugin}!{packed}"))
        }
        [] => None,
        _ => {
            warn!(
                "plugin resource {} is packed into {} bundles, reference left unchanged",
                reference.id,
                bundles.len()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileSelector, PackConfig, PackRule};
    use crate::models::SourceFile;
    use crate::pack::context::NoopHooks;
    use crate::pack::merge::merge_pack_item;
    use crate::pack::target::{PackRequest, resolve_request};
    use crate::store::MemoryStore;

    fn pack<S: FileStore>(ctx: &mut PackContext<'_, S>, target: &str, files: &[&str]) {
        let request = PackRequest::from_rule(&PackRule {
            target: Some(target.into()),
            files: FileSelector::Patterns(files.iter().map(|rule| rule.to_string()).collect()),
            ..PackRule::default()
        });
        let index = resolve_request(ctx, request).unwrap().index().unwrap();
        merge_pack_item(ctx, index).unwrap();
    }

    #[test]
    fn packed_plugin_resources_point_at_their_bundle() {
        let mut config = PackConfig::default();
        config.module.base_url = "src".into();
        let mut hooks = NoopHooks;
        let mut store = MemoryStore::with_module_base("src");
        let view = store.add(SourceFile::new(
            "src/app/view.js",
            "define(['css!./view.css', 'css!../common/reset.css', 'text!./view.tpl'], function () {});",
        ));
        store.add(SourceFile::new("src/app/view.css", ".view{}"));
        store.add(SourceFile::new("src/common/reset.css", "*{}"));
        store.add(SourceFile::new("src/app/view.tpl", "<div></div>"));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        pack(&mut ctx, "src/pkg/all.css", &["src/**/*.css"]);
        assert_eq!(rewrite_plugin_resources(&mut ctx), 1);

        let bundle = ctx.store.find_by_subpath("src/pkg/all.css").unwrap();
        let released = ctx.store.release_subpath(bundle);
        let packed = released.strip_prefix("src/").unwrap();
        assert!(packed.starts_with("pkg/all_"));
        assert_eq!(
            ctx.store.file(view).content(),
            format!("define(['css!{packed}', 'css!{packed}', 'text!./view.tpl'], function () {{}});")
        );
    }

    #[test]
    fn async_requires_resolve_from_the_module_root() {
        let config = PackConfig::default();
        let mut hooks = NoopHooks;
        let mut store = MemoryStore::new();
        let boot = store.add(SourceFile::new(
            "app/boot.js",
            "require(['css!./theme.css', 'css!./app/theme.css'], function () {});",
        ));
        store.add(SourceFile::new("theme.css", ".root{}"));
        store.add(SourceFile::new("app/theme.css", ".app{}"));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        pack(&mut ctx, "pkg/theme.css", &["/theme.css"]);
        rewrite_plugin_resources(&mut ctx);

        let bundle = ctx.store.find_by_subpath("pkg/theme.css").unwrap();
        let packed = ctx.store.release_subpath(bundle);
        assert_eq!(
            ctx.store.file(boot).content(),
            format!("require(['css!{packed}', 'css!./app/theme.css'], function () {{}});")
        );
    }

    #[test]
    fn resources_in_several_bundles_are_left_alone() {
        let config = PackConfig::default();
        let mut hooks = NoopHooks;
        let mut store = MemoryStore::new();
        let main = store.add(SourceFile::new("main.js", "define(['css!./a.css'], function () {});"));
        store.add(SourceFile::new("a.css", ".a{}"));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        pack(&mut ctx, "pkg/one.css", &["/a.css"]);
        pack(&mut ctx, "pkg/two.css", &["/a.css"]);

        assert_eq!(rewrite_plugin_resources(&mut ctx), 0);
        assert_eq!(ctx.store.file(main).content(), "define(['css!./a.css'], function () {});");
    }
}

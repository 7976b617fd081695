//! Splitting third-party modules out of async entry bundles.

use tracing::{debug, info};

use crate::config::{FileSelector, LoadSpec};
use crate::error::PackResult;
use crate::models::{FileId, PackKind, PackedBundle, SourceFile};
use crate::store::FileStore;

use super::context::PackContext;
use super::merge::{merge_pack_item, write_bundle};
use super::target::{PackRequest, resolve_request};

/// Move vendor members of every async entry bundle into a bundle of their own.
///
/// Only entries hosted by pages with vendor extraction enabled are affected.
/// The business bundle is rewritten without the vendor files; the vendor bundle
/// is loaded just before it by every page that loads the business bundle.
pub fn extract_vendor_bundles<S: FileStore>(
    ctx: &mut PackContext<'_, S>,
) -> PackResult<Vec<PackedBundle>> {
    let entries: Vec<PackedBundle> = ctx
        .packed
        .values()
        .filter(|bundle| bundle.kind == PackKind::AsyncEntry)
        .cloned()
        .collect();

    let mut created = Vec::new();
    for entry in entries {
        let Some(page) = entry.host else {
            continue;
        };
        if !ctx.config.page.extract_vendor.enabled_for(ctx.store.file(page)) {
            continue;
        }

        let (vendor, business): (Vec<FileId>, Vec<FileId>) = entry
            .members
            .iter()
            .partition(|id| is_vendor(ctx.store.file(**id), &ctx.config.vendor_dir));
        if vendor.is_empty() {
            debug!("{} has no vendor modules", ctx.store.file(page).subpath);
            continue;
        }
        let Some(index) = ctx.item_index(&entry.id) else {
            continue;
        };

        let pages = ctx.preloaded_pages(&entry.id).to_vec();
        ctx.items[index].to_merge_files = business.clone();
        write_bundle(ctx, index, &business);

        let target = vendor_target(ctx, page);
        info!(
            "{} vendor modules of {} moved to {target}",
            vendor.len(),
            ctx.store.file(page).subpath
        );
        let mut request = PackRequest::new(PackKind::Vendor);
        request.target = Some(target);
        request.host = Some(page);
        request.seeds = vendor;
        request.files = FileSelector::Patterns(vec![format!("!::{}", entry.id)]);
        request.pack_deps = true;
        request.load = Some(LoadSpec::Flag(true));
        request.load_order = entry.load_order - 1;

        if let Some(vendor_index) = resolve_request(ctx, request)?.index() {
            let pre_load = &mut ctx.items[vendor_index].pre_load;
            for page in pages {
                if !pre_load.contains(&page) {
                    pre_load.push(page);
                }
            }
            if let Some(bundle) = merge_pack_item(ctx, vendor_index) {
                created.push(bundle);
            }
        }
    }
    Ok(created)
}

fn is_vendor(file: &SourceFile, vendor_dir: &str) -> bool {
    let vendor_dir = vendor_dir.trim_matches('/');
    !vendor_dir.is_empty() && format!("/{}", file.subpath).contains(&format!("/{vendor_dir}/"))
}

// The release name gets its content hash from the store.
fn vendor_target<S: FileStore>(ctx: &PackContext<'_, S>, page: FileId) -> String {
    let page_file = ctx.store.file(page);
    let stem = page_file.basename().rsplit_once('.').map_or(page_file.basename(), |(stem, _)| stem);
    let name = format!("{stem}_vendor.js");
    match page_file.dirname() {
        "" => name,
        dir => format!("{dir}/{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PackConfig, PageSwitch};
    use crate::pack::context::NoopHooks;
    use crate::store::MemoryStore;

    fn vendor_config() -> PackConfig {
        let mut config = PackConfig::default();
        config.page.extract_vendor = PageSwitch::from(true);
        config
    }

    fn entry_bundle<S: FileStore>(
        ctx: &mut PackContext<'_, S>,
        page: FileId,
        seeds: Vec<FileId>,
    ) -> PackedBundle {
        let mut request = PackRequest::new(PackKind::AsyncEntry);
        request.target = Some("app/main.js".into());
        request.host = Some(page);
        request.seeds = seeds;
        request.pack_deps = true;
        request.load = Some(LoadSpec::Flag(true));
        let index = resolve_request(ctx, request).unwrap().index().unwrap();
        merge_pack_item(ctx, index).unwrap()
    }

    #[test]
    fn vendor_members_move_to_a_page_bound_bundle() {
        let config = vendor_config();
        let mut hooks = NoopHooks;
        let mut store = MemoryStore::new();
        let page = store.add(SourceFile::new("site/index.html", ""));
        let main = store.add(SourceFile::new("src/main.js", "main").with_requires(["dep/jquery.js", "src/util.js"]));
        store.add(SourceFile::new("src/util.js", "util"));
        store.add(SourceFile::new("dep/jquery.js", "jquery"));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        let entry = entry_bundle(&mut ctx, page, vec![main]);
        let created = extract_vendor_bundles(&mut ctx).unwrap();

        assert_eq!(created.len(), 1);
        let vendor = &created[0];
        assert_eq!(ctx.store.file(vendor.file).subpath, "site/index_vendor.js");
        let released = ctx.store.release_subpath(vendor.file);
        assert!(released.starts_with("site/index_vendor_"));
        assert_eq!(released.len(), "site/index_vendor_.js".len() + 8);
        assert_eq!(ctx.store.file(vendor.file).content(), "jquery\n");
        assert_eq!(vendor.load, vec![page]);
        assert_eq!(vendor.load_order, entry.load_order - 1);

        let business = &ctx.packed[&entry.id];
        assert_eq!(ctx.store.file(business.file).content(), "main\nutil\n");
    }

    #[test]
    fn shared_entry_bundles_load_vendors_on_every_page() {
        let config = vendor_config();
        let mut hooks = NoopHooks;
        let mut store = MemoryStore::new();
        let first = store.add(SourceFile::new("a.html", ""));
        let second = store.add(SourceFile::new("b.html", ""));
        let main = store.add(SourceFile::new("src/main.js", "main").with_requires(["dep/jquery.js"]));
        store.add(SourceFile::new("dep/jquery.js", "jquery"));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        entry_bundle(&mut ctx, first, vec![main]);
        let entry = entry_bundle(&mut ctx, second, vec![main]);
        assert_eq!(entry.load, vec![first, second]);

        let created = extract_vendor_bundles(&mut ctx).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].load, vec![first, second]);
        assert_eq!(ctx.preloaded_pages(&created[0].id), [first, second]);
    }

    #[test]
    fn pages_without_vendor_modules_are_untouched() {
        let config = vendor_config();
        let mut hooks = NoopHooks;
        let mut store = MemoryStore::new();
        let page = store.add(SourceFile::new("index.html", ""));
        let main = store.add(SourceFile::new("src/main.js", "main"));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        entry_bundle(&mut ctx, page, vec![main]);
        assert!(extract_vendor_bundles(&mut ctx).unwrap().is_empty());
        assert_eq!(ctx.packed.len(), 1);
    }

    #[test]
    fn disabled_pages_keep_vendor_modules() {
        let config = PackConfig::default();
        let mut hooks = NoopHooks;
        let mut store = MemoryStore::new();
        let page = store.add(SourceFile::new("index.html", ""));
        let lib = store.add(SourceFile::new("dep/lib.js", "lib"));
        let mut ctx = PackContext::new(store, &config, &mut hooks);

        entry_bundle(&mut ctx, page, vec![lib]);
        assert!(extract_vendor_bundles(&mut ctx).unwrap().is_empty());
    }

    #[test]
    fn vendor_directory_matches_at_any_depth() {
        assert!(is_vendor(&SourceFile::new("dep/a.js", ""), "dep"));
        assert!(is_vendor(&SourceFile::new("src/dep/a.js", ""), "/dep/"));
        assert!(!is_vendor(&SourceFile::new("src/deps/a.js", ""), "dep"));
    }
}

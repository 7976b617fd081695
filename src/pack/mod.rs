//! The pack run: from pages and rules to merged bundles and updated pages.
//!
//! A run goes through these passes, each in its own module:
//!
//! 1. [`page`]: discover pages, scan them and build their bundle requests.
//! 2. [`target`]: resolve every request into a pack item, one per target.
//! 3. [`order`]: order items so back-referenced packs are built first.
//! 4. [`select`] and [`merge`]: compute members and write each bundle.
//! 5. [`vendor`]: split third-party modules out of async entry bundles.
//! 6. [`plugin_resource`]: point plugin resource ids at their bundles.
//! 7. [`output`]: write bundle tags into the pages.

pub mod context;
pub mod css;
pub mod merge;
pub mod order;
pub mod output;
pub mod page;
pub mod plugin_resource;
pub mod select;
pub mod target;
pub mod vendor;

use tracing::{debug, info};

use crate::config::PackConfig;
use crate::error::PackResult;
use crate::models::PackedBundle;
use crate::store::FileStore;

pub use context::{MergeEvent, NoopHooks, PackContext, PackHooks, RelativeUrlHooks};
pub use target::{PackRequest, Resolution};

/// Result of a pack run.
#[derive(Debug)]
pub struct PackRun<S> {
    /// The store with bundles written and pages updated.
    pub store: S,
    /// Every bundle produced, in build order.
    pub bundles: Vec<PackedBundle>,
}

/// Runs the packing passes for one configuration.
#[derive(Debug, Clone, Copy)]
pub struct Packer<'c> {
    config: &'c PackConfig,
}

impl<'c> Packer<'c> {
    /// Packer for `config`.
    pub fn new(config: &'c PackConfig) -> Self {
        Self { config }
    }

    /// Pack `store` without collaborator hooks.
    pub fn run<S: FileStore>(&self, store: S) -> PackResult<PackRun<S>> {
        let mut hooks = NoopHooks;
        self.run_with_hooks(store, &mut hooks)
    }

    /// Pack `store`, reporting merges and URLs to `hooks`.
    ///
    /// Duplicate pack ids, missing targets and pack dependency cycles abort the
    /// run; every other problem is logged and skipped.
    pub fn run_with_hooks<S: FileStore>(
        &self,
        store: S,
        hooks: &mut dyn PackHooks,
    ) -> PackResult<PackRun<S>> {
        let mut ctx = PackContext::new(store, self.config, hooks);

        ctx.pages = page::discover_pages(&ctx);
        debug!("{} pages selected", ctx.pages.len());

        let mut requests = Vec::new();
        for page in ctx.pages.clone() {
            page::scan_page_scripts(&mut ctx, page);
            page::scan_page_styles(&mut ctx, page);
            requests.extend(page::page_requests(&ctx, page));
        }
        requests.extend(self.config.rules().iter().map(PackRequest::from_rule));

        for request in requests {
            target::resolve_request(&mut ctx, request)?;
        }

        let ordered = order::order_pack_items(std::mem::take(&mut ctx.items))?;
        ctx.replace_items(ordered);

        for index in 0..ctx.items.len() {
            merge::merge_pack_item(&mut ctx, index);
        }
        let vendors = vendor::extract_vendor_bundles(&mut ctx)?;
        let rewritten = plugin_resource::rewrite_plugin_resources(&mut ctx);
        let pages = output::inject_bundles(&mut ctx);

        let (store, bundles) = ctx.finish();
        info!(
            "{} bundles written ({} vendor), {} scripts with plugin ids updated, {} pages updated",
            bundles.len(),
            vendors.len(),
            rewritten,
            pages
        );
        Ok(PackRun { store, bundles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileSelector, OneOrMany, PackRule, PageSwitch};
    use crate::error::PackError;
    use crate::models::SourceFile;
    use crate::store::MemoryStore;

    fn content<'a>(run: &'a PackRun<MemoryStore>, subpath: &str) -> &'a str {
        let id = run.store.find_by_subpath(subpath).unwrap();
        run.store.file(id).content()
    }

    fn bundle_path(run: &PackRun<MemoryStore>, id: &str) -> String {
        let bundle = run.bundles.iter().find(|bundle| bundle.id == id).unwrap();
        run.store.file(bundle.file).subpath.clone()
    }

    #[test]
    fn page_scripts_and_styles_are_bundled_and_injected() {
        let mut store = MemoryStore::new();
        store.add(SourceFile::new(
            "index.html",
            "<html>\n<head>\n<link rel=\"stylesheet\" href=\"a.css\">\n<link rel=\"stylesheet\" href=\"b.css\">\n</head>\n<body>\n<script src=\"require.js\"></script>\n<script src=\"app.js\"></script>\n<script src=\"util.js\"></script>\n</body>\n</html>",
        ));
        store.add(SourceFile::new("require.js", "var require;"));
        store.add(SourceFile::new("app.js", "var app;"));
        store.add(SourceFile::new("util.js", "var util;"));
        store.add(SourceFile::new("a.css", ".a{}"));
        store.add(SourceFile::new("b.css", ".b{}"));

        let config = PackConfig::default();
        let run = Packer::new(&config).run(store).unwrap();

        assert_eq!(content(&run, "index_aio.js"), "var app;\nvar util;\n");
        assert_eq!(content(&run, "index_aio.css"), ".a{}\n.b{}\n");

        let page = content(&run, "index.html");
        assert!(page.contains("<script src=\"require.js\"></script>"));
        assert!(page.contains("<script src=\"/index_aio_"));
        assert!(page.contains("<link href=\"/index_aio_"));
        assert!(!page.contains("src=\"app.js\""));
        assert!(!page.contains("href=\"a.css\""));
        assert!(!page.contains("PLACEHOLDER"));
    }

    #[test]
    fn same_target_rules_share_one_bundle() {
        let mut store = MemoryStore::new();
        store.add(SourceFile::new("a/x.css", ".x{}"));
        store.add(SourceFile::new("b/y.css", ".y{}"));
        store.add(SourceFile::new("b/z.css", ".z{}"));

        let mut config = PackConfig::default();
        config.pack.insert("dist/all.css".into(), OneOrMany::One("a/*.css".into()));
        config.pack_to.push(PackRule {
            target: Some("/dist/all.css".into()),
            files: FileSelector::Patterns(vec!["b/*.css".into(), "!b/z.css".into()]),
            ..PackRule::default()
        });
        let run = Packer::new(&config).run(store).unwrap();

        assert_eq!(run.bundles.len(), 1);
        assert_eq!(content(&run, "dist/all.css"), ".x{}\n.y{}\n");
    }

    #[test]
    fn back_referenced_packs_are_built_first() {
        let mut store = MemoryStore::new();
        store.add(SourceFile::new("src/lib/base.js", "base"));
        store.add(SourceFile::new("src/app.js", "app"));

        let mut config = PackConfig::default();
        config.pack_to.push(PackRule {
            target: Some("pkg/app.js".into()),
            files: FileSelector::Patterns(vec!["src/**/*.js".into(), "!::base".into()]),
            ..PackRule::default()
        });
        config.pack_to.push(PackRule {
            target: Some("pkg/base.js".into()),
            pack_id: Some("base".into()),
            files: FileSelector::Patterns(vec!["src/lib/**".into()]),
            ..PackRule::default()
        });
        let run = Packer::new(&config).run(store).unwrap();

        assert_eq!(bundle_path(&run, "base"), "pkg/base.js");
        assert_eq!(run.bundles[0].id, "base");
        assert_eq!(content(&run, "pkg/base.js"), "base\n");
        assert_eq!(content(&run, "pkg/app.js"), "app\n");
    }

    #[test]
    fn plugin_ids_point_at_the_released_bundle_name() {
        let mut store = MemoryStore::new();
        let view = store.add(SourceFile::new(
            "app/view.js",
            "define('app/view', ['css!./view.css'], function () {});",
        ));
        store.add(SourceFile::new("app/view.css", ".view{}"));

        let mut config = PackConfig::default();
        config.pack.insert("pkg/all.css".into(), OneOrMany::One("app/*.css".into()));
        let run = Packer::new(&config).run(store).unwrap();

        let bundle = run.store.find_by_subpath("pkg/all.css").unwrap();
        let released = run.store.release_subpath(bundle);
        assert_ne!(released, "pkg/all.css");
        assert_eq!(
            run.store.file(view).content(),
            format!("define('app/view', ['css!{released}'], function () {{}});")
        );
    }

    #[test]
    fn vendor_bundles_reach_every_page_sharing_an_entry() {
        let mut store = MemoryStore::new();
        for page in ["a.html", "b.html"] {
            store.add(SourceFile::new(page, "<body></body>").with_asyncs(["src/main.js"]));
        }
        store.add(SourceFile::new("src/main.js", "main").with_requires(["dep/jquery.js"]));
        store.add(SourceFile::new("dep/jquery.js", "jquery"));

        let mut config = PackConfig::default();
        config.page.extract_vendor = PageSwitch::from(true);
        let run = Packer::new(&config).run(store).unwrap();

        assert_eq!(content(&run, "src/main_aio.js"), "main\n");
        assert_eq!(content(&run, "a_vendor.js"), "jquery\n");

        let vendor = run.store.find_by_subpath("a_vendor.js").unwrap();
        let entry = run.store.find_by_subpath("src/main_aio.js").unwrap();
        let vendor_tag = format!("<script src=\"{}\"></script>", run.store.release_url(vendor));
        let entry_tag = format!("<script src=\"{}\"></script>", run.store.release_url(entry));
        for page in ["a.html", "b.html"] {
            assert_eq!(
                content(&run, page),
                format!("<body>{vendor_tag}\n{entry_tag}\n</body>"),
                "{page}"
            );
        }
    }

    #[test]
    fn pack_cycles_abort_the_run() {
        let mut store = MemoryStore::new();
        store.add(SourceFile::new("a.js", ""));

        let mut config = PackConfig::default();
        for (id, other) in [("one", "two"), ("two", "one")] {
            config.pack_to.push(PackRule {
                target: Some(format!("pkg/{id}.js")),
                pack_id: Some(id.into()),
                files: FileSelector::Patterns(vec!["*.js".into(), format!("::{other}")]),
                ..PackRule::default()
            });
        }

        let error = Packer::new(&config).run(store).unwrap_err();
        assert!(matches!(error, PackError::DependencyCycle(_)));
    }
}

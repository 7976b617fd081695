//! Loading a project tree into a [`MemoryStore`] and releasing it again.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use same_file::is_same_file;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::amd::{extract_async_module_ids, extract_dependency_ids, module_id_for_path};
use crate::config::PackConfig;
use crate::models::{FileClass, FileId, SourceFile, normalize_subpath};

use super::{FileStore, MemoryStore};

/// Per-file dependency metadata supplied by the build that compiled the project.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ManifestEntry {
    id: Option<String>,
    module_id: Option<String>,
    release_ext: Option<String>,
    requires: Option<Vec<String>>,
    links: Vec<String>,
    asyncs: Option<Vec<String>>,
    pack_order: i32,
    release: Option<bool>,
    partial: bool,
}

impl MemoryStore {
    /// Load every file under `root`.
    ///
    /// Hidden entries and the release directory are skipped. Scripts, styles and
    /// pages are read as text; other files are only recorded for release.
    /// Dependency metadata comes from the configured manifest; files it does not
    /// describe get their `requires` (scripts) and `asyncs` (pages) from the AMD
    /// calls in their content.
    pub fn load_dir(root: &Path, config: &PackConfig) -> Result<Self> {
        let mut store = Self::with_module_base(config.module.base_url.clone());
        let output_dir = config.output_path(root);

        let mut paths = Vec::new();
        collect_files(root, Path::new(""), &output_dir, &mut paths)
            .with_context(|| format!("failed to scan {}", root.display()))?;
        paths.sort();

        for relative in paths {
            let source_path = root.join(&relative);
            let subpath = normalize_subpath(&relative.to_string_lossy());
            let content = if FileClass::from_ext(&ext_of(&relative)) == FileClass::Other {
                String::new()
            } else {
                fs::read_to_string(&source_path)
                    .with_context(|| format!("failed to read {}", source_path.display()))?
            };

            let mut file = SourceFile::new(subpath, content);
            if file.is_script_like() {
                file.module_id = module_id_for_path(&file.subpath, &config.module);
            }
            file.source_path = Some(source_path);
            store.add(file);
        }

        let manifest = match config.manifest_path(root) {
            Some(path) => read_manifest(&path)?,
            None => IndexMap::new(),
        };
        store.apply_metadata(&manifest);

        info!(files = store.len(), root = %root.display(), "loaded project files");
        Ok(store)
    }

    fn apply_metadata(&mut self, manifest: &IndexMap<String, ManifestEntry>) {
        for (subpath, entry) in manifest {
            let Some(id) = self.find_by_subpath(subpath) else {
                warn!("manifest entry {subpath} does not match any file");
                continue;
            };
            let file = self.file_mut(id);
            if let Some(value) = &entry.id {
                file.id = value.clone();
            }
            if let Some(value) = &entry.module_id {
                file.module_id = Some(value.clone());
            }
            if let Some(value) = &entry.release_ext {
                file.release_ext = value.clone();
            }
            file.links = entry.links.clone();
            file.pack_order = entry.pack_order;
            file.partial = entry.partial;
            if let Some(release) = entry.release {
                file.release = release;
            }
            self.reindex(id);
        }

        for id in self.file_ids() {
            let described = manifest.get(&self.file(id).subpath);
            let requires = match described.and_then(|entry| entry.requires.clone()) {
                Some(requires) => requires,
                None if self.file(id).is_script_like() => self.derive_requires(id),
                None => Vec::new(),
            };
            let asyncs = match described.and_then(|entry| entry.asyncs.clone()) {
                Some(asyncs) => asyncs,
                None if self.file(id).class() == FileClass::Markup => self.derive_asyncs(id),
                None => Vec::new(),
            };

            let file = self.file_mut(id);
            file.requires = requires;
            file.asyncs = asyncs;
        }
    }

    fn derive_requires(&self, id: FileId) -> Vec<String> {
        let file = self.file(id);
        let base_module = file.module_id.as_deref();
        extract_dependency_ids(file.content())
            .iter()
            .filter_map(|dep| match self.resolve_module_ref(dep, base_module) {
                Some(found) if found != id => Some(self.file(found).id.clone()),
                Some(_) => None,
                None => {
                    debug!("{}: dependency {dep} is not a project file", file.subpath);
                    None
                }
            })
            .collect()
    }

    fn derive_asyncs(&self, id: FileId) -> Vec<String> {
        let file = self.file(id);
        extract_async_module_ids(file.content())
            .iter()
            .filter_map(|module| match self.resolve_module_ref(module, None) {
                Some(found) => Some(self.file(found).id.clone()),
                None => {
                    debug!("{}: async module {module} is not a project file", file.subpath);
                    None
                }
            })
            .collect()
    }

    /// Release every releasable file under `out_dir`.
    ///
    /// Unchanged files are hard-linked (or copied) from their source, changed and
    /// generated files are written. Entries left over from earlier releases are
    /// removed. Returns the number of released files.
    pub fn write_to(&self, out_dir: &Path) -> Result<usize> {
        let released: Vec<(FileId, PathBuf)> = self
            .file_ids()
            .into_iter()
            .filter(|id| {
                let file = self.file(*id);
                file.release && !file.partial
            })
            .map(|id| (id, PathBuf::from(self.release_subpath(id))))
            .collect();

        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        let keep: BTreeSet<PathBuf> = released.iter().map(|(_, path)| path.clone()).collect();
        prune_release_tree(out_dir, &keep)
            .with_context(|| format!("failed to prune {}", out_dir.display()))?;

        for (id, relative) in &released {
            let file = self.file(*id);
            let destination = out_dir.join(relative);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }

            let result = match (&file.source_path, file.is_modified()) {
                (Some(source), false) => install_release_file(source, &destination),
                _ => write_release_file(&destination, file.content()),
            };
            result.with_context(|| format!("failed to release {}", destination.display()))?;
        }

        info!(files = released.len(), out = %out_dir.display(), "released project");
        Ok(released.len())
    }
}

fn read_manifest(path: &Path) -> Result<IndexMap<String, ManifestEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let entries: IndexMap<String, ManifestEntry> = serde_json::from_str(&content)
        .with_context(|| format!("invalid manifest {}", path.display()))?;
    Ok(entries
        .into_iter()
        .map(|(subpath, entry)| (normalize_subpath(&subpath), entry))
        .collect())
}

fn ext_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

fn collect_files(
    root: &Path,
    relative: &Path,
    output_dir: &Path,
    files: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    let current = root.join(relative);
    for entry in fs::read_dir(&current)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let child_relative = relative.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if output_dir.exists() && is_same_file(&path, output_dir)? {
                continue;
            }
            collect_files(root, &child_relative, output_dir, files)?;
        } else if file_type.is_file() {
            files.push(child_relative);
        }
    }
    Ok(())
}

fn prune_release_tree(root: &Path, keep_files: &BTreeSet<PathBuf>) -> std::io::Result<()> {
    if !root.exists() {
        return Ok(());
    }

    prune_release_subtree(root, Path::new(""), keep_files)?;
    Ok(())
}

fn prune_release_subtree(
    root: &Path,
    relative: &Path,
    keep_files: &BTreeSet<PathBuf>,
) -> std::io::Result<bool> {
    let current_path = root.join(relative);

    let mut has_required_descendants = false;
    let entries = match fs::read_dir(&current_path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(err),
    };

    for entry in entries {
        let entry = entry?;
        let child_relative = relative.join(entry.file_name());
        let entry_path = entry.path();

        if entry.file_type()?.is_dir() {
            if prune_release_subtree(root, &child_relative, keep_files)? {
                fs::remove_dir_all(&entry_path)?;
            } else {
                has_required_descendants = true;
            }
        } else if keep_files.contains(&child_relative) {
            has_required_descendants = true;
        } else {
            fs::remove_file(&entry_path)?;
        }
    }

    Ok(!has_required_descendants && !relative.as_os_str().is_empty())
}

fn install_release_file(source: &Path, destination: &Path) -> std::io::Result<()> {
    if destination.exists() {
        if is_same_file(source, destination)? {
            return Ok(());
        }
        fs::remove_file(destination)?;
    }

    match fs::hard_link(source, destination) {
        Ok(_) => Ok(()),
        Err(err) => {
            if err.kind() == ErrorKind::AlreadyExists {
                Ok(())
            } else {
                fs::copy(source, destination).map(|_| ())
            }
        }
    }
}

// A previous release may have hard-linked the source here; unlink before writing.
fn write_release_file(destination: &Path, content: &str) -> std::io::Result<()> {
    match fs::remove_file(destination) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    fs::write(destination, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, content: &str) -> std::io::Result<()> {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    }

    #[test]
    fn load_dir_derives_amd_metadata() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path();
        write(root, "index.html", "<script>require(['app/main']);</script>")?;
        write(
            root,
            "src/app/main.js",
            "define(['./util', 'css!./main.css', 'jquery'], function () {});",
        )?;
        write(root, "src/app/util.js", "define(function () {});")?;
        write(root, "src/app/main.css", "body{}")?;
        write(root, "img/logo.png", "png")?;
        write(root, ".git/HEAD", "ref")?;
        write(root, "output/stale.js", "old")?;

        let mut config = PackConfig::default();
        config.module.base_url = "src".into();
        let store = MemoryStore::load_dir(root, &config)?;

        assert_eq!(store.len(), 5);
        let page = store.find_by_subpath("index.html").expect("page loaded");
        assert_eq!(store.file(page).asyncs, vec!["src/app/main.js".to_string()]);

        let main = store.find_by_id("app/main").expect("module indexed");
        assert_eq!(store.file(main).module_id.as_deref(), Some("app/main"));
        assert_eq!(store.file(main).requires, vec![
            "src/app/util.js".to_string(),
            "src/app/main.css".to_string(),
        ]);

        let logo = store.find_by_subpath("img/logo.png").expect("asset loaded");
        assert_eq!(store.file(logo).content(), "");
        Ok(())
    }

    #[test]
    fn manifest_overrides_derived_metadata() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path();
        write(root, "a.js", "require('b');")?;
        write(root, "b.js", "")?;
        write(root, "theme.less", "")?;
        write(
            root,
            "deps.json",
            r#"{
                "/a.js": {"requires": [], "packOrder": -1},
                "theme.less": {"releaseExt": ".css", "release": false}
            }"#,
        )?;

        let config = PackConfig {
            manifest: Some(PathBuf::from("deps.json")),
            ..PackConfig::default()
        };
        let store = MemoryStore::load_dir(root, &config)?;

        let a = store.find_by_subpath("a.js").expect("a.js");
        assert!(store.file(a).requires.is_empty());
        assert_eq!(store.file(a).pack_order, -1);

        let theme = store.find_by_subpath("theme.less").expect("theme");
        assert!(store.file(theme).is_style_like());
        assert!(!store.file(theme).release);
        Ok(())
    }

    #[test]
    fn write_to_links_unchanged_and_writes_modified_files() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path().join("project");
        let out = temp.path().join("out");
        write(&root, "a.js", "var a;")?;
        write(&root, "b.js", "var b;")?;
        write(&out, "stale/old.js", "old")?;

        let mut store = MemoryStore::load_dir(&root, &PackConfig::default())?;
        let b = store.find_by_subpath("b.js").expect("b.js");
        store.file_mut(b).set_content("var b2;");
        let bundle = store.create_file("pkg/all.js", true);
        store.file_mut(bundle).set_content("var all;");
        store.file_mut(bundle).release = true;

        let count = store.write_to(&out)?;
        assert_eq!(count, 3);
        assert!(is_same_file(root.join("a.js"), out.join("a.js"))?);
        assert_eq!(fs::read_to_string(out.join("b.js"))?, "var b2;");
        assert_eq!(fs::read_to_string(root.join("b.js"))?, "var b;");
        assert!(out.join(store.release_subpath(bundle)).exists());
        assert!(!out.join("stale").exists());
        Ok(())
    }

    #[test]
    fn install_release_file_reuses_existing_links() -> std::io::Result<()> {
        let temp = tempdir()?;
        let source = temp.path().join("file.txt");
        let destination = temp.path().join("copy.txt");
        fs::write(&source, b"content")?;

        install_release_file(&source, &destination)?;
        assert!(is_same_file(&source, &destination)?);
        install_release_file(&source, &destination)?;
        assert!(is_same_file(&source, &destination)?);
        Ok(())
    }
}

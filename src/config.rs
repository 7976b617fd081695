//! Pack configuration: page handling, pack rules and their discovery on disk.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::amd::ModuleConfig;
use crate::models::SourceFile;
use crate::pattern::PathPredicate;

const CONFIG_FILE_NAMES: [&str; 3] = ["pack.config.json", "pack.config.yaml", "pack.config.yml"];

const DEFAULT_OUTPUT_DIR: &str = "output";

/// Computes a bundle target from the default target and the host page.
pub type TargetFn = Arc<dyn Fn(&str, Option<&SourceFile>) -> Option<String> + Send + Sync>;

/// Computes include rules from a request's seed files.
pub type SeedRulesFn = Arc<dyn Fn(&[&SourceFile]) -> Vec<String> + Send + Sync>;

/// Per-page pack options.
pub type PagePackFn = Arc<dyn Fn(&SourceFile) -> Option<PackOptions> + Send + Sync>;

/// Per-page switch.
pub type PagePredicate = Arc<dyn Fn(&SourceFile) -> bool + Send + Sync>;

/// Discoverable pack configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackConfig {
    /// Prefix of generated pack ids.
    pub namespace: Option<String>,
    /// Separator between the namespace and the generated id.
    pub namespace_connector: String,
    /// How pages are scanned and which page bundles are produced.
    pub page: PageOptions,
    /// Explicit pack rules.
    pub pack_to: Vec<PackRule>,
    /// Shorthand rules mapping a target to its include patterns.
    pub pack: IndexMap<String, OneOrMany>,
    /// Directory name marking third-party modules.
    pub vendor_dir: String,
    /// AMD module settings.
    pub module: ModuleConfig,
    /// Charset re-emitted at the top of style bundles.
    pub css_charset: Option<String>,
    /// JSON dependency manifest, relative to the project root.
    pub manifest: Option<PathBuf>,
    /// Release directory, relative to the project root.
    pub output_dir: Option<PathBuf>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            namespace_connector: ":".into(),
            page: PageOptions::default(),
            pack_to: Vec::new(),
            pack: IndexMap::new(),
            vendor_dir: "dep".into(),
            module: ModuleConfig::default(),
            css_charset: None,
            manifest: None,
            output_dir: None,
        }
    }
}

impl PackConfig {
    /// Look for a configuration file in `root`.
    ///
    /// A missing file yields the defaults; a file that fails to parse is an error.
    pub fn discover(root: &Path) -> Result<Self> {
        for name in CONFIG_FILE_NAMES {
            let candidate = root.join(name);
            if candidate.is_file() {
                return Self::from_path(&candidate);
            }
        }
        Ok(Self::default())
    }

    /// Read configuration from a JSON or YAML file, chosen by extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("invalid YAML config {}", path.display())),
            _ => serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON config {}", path.display())),
        }
    }

    /// Generated pack id for the given counter value.
    pub fn auto_pack_id(&self, counter: usize) -> String {
        match self.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            Some(ns) => format!("{ns}{}p{counter}", self.namespace_connector),
            None => format!("p{counter}"),
        }
    }

    /// Explicit rules followed by the shorthand map entries.
    pub fn rules(&self) -> Vec<PackRule> {
        let mut rules = self.pack_to.clone();
        rules.extend(self.pack.iter().map(|(target, files)| PackRule {
            target: Some(target.clone()),
            files: FileSelector::Patterns(files.to_vec()),
            ..PackRule::default()
        }));
        rules
    }
}

impl PackConfig {
    /// Path of the dependency manifest, if configured.
    pub fn manifest_path(&self, root: &Path) -> Option<PathBuf> {
        self.manifest.as_ref().map(|path| root.join(path))
    }

    /// Release directory for the project at `root`.
    pub fn output_path(&self, root: &Path) -> PathBuf {
        root.join(
            self.output_dir
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_OUTPUT_DIR)),
        )
    }
}

/// How pages are scanned and packed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageOptions {
    /// Patterns selecting page files.
    pub src: OneOrMany,
    /// Insert placeholders when a page has none.
    pub auto_insert_placeholder: bool,
    /// File names of module loader scripts.
    pub loader_scripts: Vec<String>,
    /// Token marking where bundled scripts go.
    pub script_placeholder: String,
    /// Token marking where bundled styles go.
    pub style_placeholder: String,
    /// Token marking where the loader configuration goes.
    pub resource_config_placeholder: String,
    /// Bundle the scripts referenced by a page.
    pub pack_js: PackToggle,
    /// Bundle the stylesheets referenced by a page.
    pub pack_css: PackToggle,
    /// Bundle a page's async entry modules with their dependencies.
    pub pack_async: PackToggle,
    /// Bundle the styles required by a page's async entry modules.
    pub pack_dep_style: PackToggle,
    /// Split third-party modules out of async entry bundles.
    pub extract_vendor: PageSwitch,
    /// Default load order of page bundles.
    pub load_order: i32,
    /// Loader configuration emitted at the resource-config placeholder.
    pub resource_config: Option<Value>,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            src: OneOrMany::One("*.html".into()),
            auto_insert_placeholder: true,
            loader_scripts: ["require.js", "esl.js", "mod.js", "sea.js", "system.js"]
                .into_iter()
                .map(String::from)
                .collect(),
            script_placeholder: "<!--SCRIPT_PLACEHOLDER-->".into(),
            style_placeholder: "<!--STYLE_PLACEHOLDER-->".into(),
            resource_config_placeholder: "<!--RESOURCECONFIG_PLACEHOLDER-->".into(),
            pack_js: PackToggle::enabled(),
            pack_css: PackToggle::enabled(),
            pack_async: PackToggle::enabled(),
            pack_dep_style: PackToggle::Off,
            extract_vendor: PageSwitch::Flag(false),
            load_order: 0,
            resource_config: None,
        }
    }
}

/// A string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    /// Single value.
    One(String),
    /// Several values.
    Many(Vec<String>),
}

impl OneOrMany {
    /// Owned list of the values.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value.clone()],
            Self::Many(values) => values.clone(),
        }
    }
}

/// Whether a page bundle kind is produced, and how.
#[derive(Clone, Deserialize)]
#[serde(from = "RawToggle")]
pub enum PackToggle {
    /// Never produced.
    Off,
    /// Produced for every page with these options.
    On(PackOptions),
    /// Decided per page; `None` disables the bundle for that page.
    PerPage(PagePackFn),
}

impl PackToggle {
    /// Enabled with default options.
    pub fn enabled() -> Self {
        Self::On(PackOptions::default())
    }

    /// Options in effect for `page`.
    pub fn for_page(&self, page: &SourceFile) -> Option<PackOptions> {
        match self {
            Self::Off => None,
            Self::On(options) => Some(options.clone()),
            Self::PerPage(decide) => decide(page),
        }
    }
}

impl fmt::Debug for PackToggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("Off"),
            Self::On(options) => f.debug_tuple("On").field(options).finish(),
            Self::PerPage(_) => f.write_str("PerPage(..)"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawToggle {
    Flag(bool),
    Options(PackOptions),
}

impl From<RawToggle> for PackToggle {
    fn from(raw: RawToggle) -> Self {
        match raw {
            RawToggle::Flag(true) => Self::enabled(),
            RawToggle::Flag(false) => Self::Off,
            RawToggle::Options(options) => Self::On(options),
        }
    }
}

/// Options of a page bundle.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackOptions {
    /// Bundle target, the page-derived default when unset.
    pub target: Option<TargetSpec>,
    /// Extra include rules.
    pub files: FileSelector,
    /// Explicit pack id.
    pub pack_id: Option<String>,
    /// Pages that load the bundle eagerly.
    #[serde(alias = "preLoad")]
    pub load: Option<LoadSpec>,
    /// Position of the bundle tag within the page.
    pub load_order: Option<i32>,
}

/// Bundle target of page options.
#[derive(Clone, Deserialize)]
#[serde(from = "String")]
pub enum TargetSpec {
    /// Fixed project path.
    Path(String),
    /// Derived from the default target and the host page.
    Computed(TargetFn),
}

impl TargetSpec {
    /// Target for a request whose default target is `default`.
    pub fn resolve(&self, default: &str, host: Option<&SourceFile>) -> String {
        match self {
            Self::Path(path) => path.clone(),
            Self::Computed(compute) => {
                compute(default, host).unwrap_or_else(|| default.to_string())
            }
        }
    }
}

impl From<String> for TargetSpec {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl fmt::Debug for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Include rules of a pack request.
#[derive(Clone, Deserialize)]
#[serde(from = "OneOrMany")]
pub enum FileSelector {
    /// Textual rules (`glob`, `!glob`, `::id`).
    Patterns(Vec<String>),
    /// Rules computed from the seed files.
    Computed(SeedRulesFn),
    /// Predicate over subpaths.
    Matching(PathPredicate),
}

impl Default for FileSelector {
    fn default() -> Self {
        Self::Patterns(Vec::new())
    }
}

impl From<OneOrMany> for FileSelector {
    fn from(rules: OneOrMany) -> Self {
        Self::Patterns(rules.to_vec())
    }
}

impl fmt::Debug for FileSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patterns(rules) => f.debug_tuple("Patterns").field(rules).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
            Self::Matching(_) => f.write_str("Matching(..)"),
        }
    }
}

/// Pages that load a bundle eagerly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawLoad")]
pub enum LoadSpec {
    /// `true` binds the host page (every page for rules), `false` none.
    Flag(bool),
    /// Patterns selecting pages.
    Pages(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLoad {
    Flag(bool),
    Pages(OneOrMany),
}

impl From<RawLoad> for LoadSpec {
    fn from(raw: RawLoad) -> Self {
        match raw {
            RawLoad::Flag(flag) => Self::Flag(flag),
            RawLoad::Pages(pages) => Self::Pages(pages.to_vec()),
        }
    }
}

/// Per-page boolean option.
#[derive(Clone, Deserialize)]
#[serde(from = "bool")]
pub enum PageSwitch {
    /// Same value for every page.
    Flag(bool),
    /// Decided per page.
    PerPage(PagePredicate),
}

impl PageSwitch {
    /// Value for `page`.
    pub fn enabled_for(&self, page: &SourceFile) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::PerPage(decide) => decide(page),
        }
    }
}

impl From<bool> for PageSwitch {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

impl fmt::Debug for PageSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            Self::PerPage(_) => f.write_str("PerPage(..)"),
        }
    }
}

/// A configured bundle.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackRule {
    /// Bundle path relative to the project root.
    pub target: Option<String>,
    /// Include rules.
    pub files: FileSelector,
    /// Explicit pack id.
    pub pack_id: Option<String>,
    /// Pages that load the bundle eagerly.
    #[serde(alias = "preLoad")]
    pub load: Option<LoadSpec>,
    /// Position of the bundle tag within pages.
    pub load_order: Option<i32>,
    /// Pull in the transitive requirements of members.
    pub pack_deps: bool,
}

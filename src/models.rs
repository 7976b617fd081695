//! Data structures produced and consumed while packing static resources.

use std::fmt;
use std::path::PathBuf;

use crate::pattern::PatternSet;

/// Stable handle of a file registered in a [`crate::store::FileStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub usize);

impl fmt::Display for FileId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Resource class derived from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileClass {
  /// JavaScript and languages compiled to it.
  Script,
  /// CSS and its preprocessors.
  Style,
  /// Pages and templates that reference scripts and styles.
  Markup,
  /// Anything else (images, fonts, data files).
  Other,
}

impl FileClass {
  /// Classify an extension, with or without the leading dot.
  pub fn from_ext(ext: &str) -> Self {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
      "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" | "es6" | "coffee" => Self::Script,
      "css" | "less" | "scss" | "sass" | "styl" | "stylus" => Self::Style,
      "html" | "htm" | "xhtml" | "tpl" | "vm" | "php" | "jsp" => Self::Markup,
      _ => Self::Other,
    }
  }
}

/// A project file as seen by the packer.
///
/// The content is the already-compiled text. Dependency metadata uses file ids
/// (see [`SourceFile::id`]); ids that do not resolve are reported and skipped.
#[derive(Debug, Clone)]
pub struct SourceFile {
  /// Resource identifier, defaults to the subpath.
  pub id: String,
  /// Project relative path using forward slashes, without a leading slash.
  pub subpath: String,
  /// Extension the file is released with, including the leading dot.
  pub release_ext: String,
  /// AMD module id when the file is a module.
  pub module_id: Option<String>,
  /// Ids of the resources this file requires.
  pub requires: Vec<String>,
  /// Ids of stylesheets linked by this file.
  pub links: Vec<String>,
  /// Ids of modules this file loads asynchronously.
  pub asyncs: Vec<String>,
  /// Explicit merge rank, lower ranks are concatenated first.
  pub pack_order: i32,
  /// Whether the file is written to the output.
  pub release: bool,
  /// Whether the file is a fragment embedded in another file.
  pub partial: bool,
  /// Whether the released name carries a content hash.
  pub use_hash: bool,
  /// Origin on disk for files loaded from a project directory.
  pub source_path: Option<PathBuf>,
  content: String,
  modified: bool,
}

impl SourceFile {
  /// Create a file at `subpath` with the given content.
  pub fn new(subpath: impl Into<String>, content: impl Into<String>) -> Self {
    let subpath = normalize_subpath(&subpath.into());
    let release_ext = ext_of(&subpath).to_string();
    Self {
      id: subpath.clone(),
      subpath,
      release_ext,
      module_id: None,
      requires: Vec::new(),
      links: Vec::new(),
      asyncs: Vec::new(),
      pack_order: 0,
      release: true,
      partial: false,
      use_hash: false,
      source_path: None,
      content: content.into(),
      modified: false,
    }
  }

  /// Replace the required ids.
  pub fn with_requires<I, S>(mut self, ids: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.requires = ids.into_iter().map(Into::into).collect();
    self
  }

  /// Replace the asynchronously loaded ids.
  pub fn with_asyncs<I, S>(mut self, ids: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.asyncs = ids.into_iter().map(Into::into).collect();
    self
  }

  /// Set the explicit merge rank.
  pub fn with_pack_order(mut self, order: i32) -> Self {
    self.pack_order = order;
    self
  }

  /// Set the AMD module id.
  pub fn with_module_id(mut self, module_id: impl Into<String>) -> Self {
    self.module_id = Some(module_id.into());
    self
  }

  /// Override the release extension (e.g. `.less` compiled to `.css`).
  pub fn with_release_ext(mut self, ext: impl Into<String>) -> Self {
    self.release_ext = ext.into();
    self
  }

  /// Raw extension of the subpath including the dot, empty when absent.
  pub fn ext(&self) -> &str {
    ext_of(&self.subpath)
  }

  /// Class of the authored source.
  pub fn source_class(&self) -> FileClass {
    FileClass::from_ext(self.ext())
  }

  /// Class of the released file.
  pub fn class(&self) -> FileClass {
    FileClass::from_ext(&self.release_ext)
  }

  /// Whether the released file is a script.
  pub fn is_script_like(&self) -> bool {
    self.class() == FileClass::Script
  }

  /// Whether the released file is a stylesheet.
  pub fn is_style_like(&self) -> bool {
    self.class() == FileClass::Style
  }

  /// File name including the extension.
  pub fn basename(&self) -> &str {
    self
      .subpath
      .rsplit_once('/')
      .map_or(self.subpath.as_str(), |(_, name)| name)
  }

  /// Directory part of the subpath, empty for files at the project root.
  pub fn dirname(&self) -> &str {
    self.subpath.rsplit_once('/').map_or("", |(dir, _)| dir)
  }

  /// Subpath without its extension.
  pub fn subpath_no_ext(&self) -> &str {
    let ext = self.ext();
    &self.subpath[..self.subpath.len() - ext.len()]
  }

  /// Current text content.
  pub fn content(&self) -> &str {
    &self.content
  }

  /// Replace the content and mark the file as modified.
  pub fn set_content(&mut self, content: impl Into<String>) {
    self.content = content.into();
    self.modified = true;
  }

  /// Whether the content changed since the file was loaded.
  pub fn is_modified(&self) -> bool {
    self.modified
  }

  /// Append a required id unless already present.
  pub fn add_require(&mut self, id: &str) {
    push_unique(&mut self.requires, id);
  }

  /// Append a linked stylesheet id unless already present.
  pub fn add_link(&mut self, id: &str) {
    push_unique(&mut self.links, id);
  }

  /// Append an asynchronously loaded id unless already present.
  pub fn add_async(&mut self, id: &str) {
    push_unique(&mut self.asyncs, id);
  }

  /// Drop all dependency metadata.
  pub fn clear_dependencies(&mut self) {
    self.requires.clear();
    self.links.clear();
    self.asyncs.clear();
  }
}

fn push_unique(values: &mut Vec<String>, id: &str) {
  if !values.iter().any(|value| value == id) {
    values.push(id.to_string());
  }
}

/// Normalise a project path to forward slashes without a leading slash.
pub fn normalize_subpath(path: &str) -> String {
  path.replace('\\', "/").trim_start_matches('/').to_string()
}

fn ext_of(subpath: &str) -> &str {
  let name = subpath.rsplit_once('/').map_or(subpath, |(_, name)| name);
  match name.rfind('.') {
    Some(0) | None => "",
    Some(index) => &name[index..],
  }
}

/// A script or stylesheet reference found in page markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupReference {
  /// File the reference resolves to.
  pub file: FileId,
  /// Matched markup text, including surrounding whitespace.
  pub raw: String,
  /// Remaining attributes with the `src`/`href` attribute removed.
  pub attrs: String,
}

/// Why a pack item was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackKind {
  /// Async entry modules of a page and their dependencies.
  AsyncEntry,
  /// Script references found in a page.
  PageScript,
  /// Stylesheet references found in a page.
  PageStyle,
  /// Styles required by a page's async entry modules.
  DependencyStyle,
  /// A configured pack rule.
  Rule,
  /// Third-party modules split out of an async entry bundle.
  Vendor,
}

/// One bundle to be produced.
#[derive(Debug, Clone)]
pub struct PackItem {
  /// Unique package id.
  pub id: String,
  /// Whether the id was generated rather than configured.
  pub auto_id: bool,
  /// Ids of requests that were unioned into this item.
  pub aliases: Vec<String>,
  /// Origin of the item.
  pub kind: PackKind,
  /// Bundle file in the store.
  pub target: FileId,
  /// Page that triggered the item.
  pub host: Option<FileId>,
  /// Files merged regardless of pattern matching.
  pub raw_combines: Vec<FileId>,
  /// Include, ignore and back-reference rules.
  pub patterns: PatternSet,
  /// Whether transitive `requires` of members are pulled in.
  pub pack_deps: bool,
  /// Whether non-script requirements of the seed modules are pulled in.
  pub pack_dep_resource: bool,
  /// Pages that load the bundle eagerly.
  pub pre_load: Vec<FileId>,
  /// Relative position of the bundle tag within a page.
  pub load_order: i32,
  /// Page references the bundle replaces.
  pub replacers: Vec<MarkupReference>,
  /// Resolved, ordered member list.
  pub to_merge_files: Vec<FileId>,
}

/// A merged bundle.
#[derive(Debug, Clone)]
pub struct PackedBundle {
  /// Package id.
  pub id: String,
  /// Origin of the bundle.
  pub kind: PackKind,
  /// Bundle file in the store.
  pub file: FileId,
  /// Merged files in concatenation order.
  pub members: Vec<FileId>,
  /// Pages that load the bundle eagerly.
  pub load: Vec<FileId>,
  /// Page that triggered the bundle.
  pub host: Option<FileId>,
  /// Relative position of the bundle tag within a page.
  pub load_order: i32,
  /// Page references the bundle replaces.
  pub replacers: Vec<MarkupReference>,
}

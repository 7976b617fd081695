//! AMD module helpers: dependency extraction, id resolution and id rewriting.
//!
//! Scripts are scanned with regular expressions rather than parsed; the packer
//! only needs the literal ids listed in `define([...])`, `require([...])` and
//! `require('...')` calls.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;

/// Ids handled by the loader itself rather than resolved to files.
const SPECIAL_IDS: [&str; 3] = ["require", "exports", "module"];

/// Module resolution settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModuleConfig {
  /// Directory module ids are relative to.
  pub base_url: String,
}

/// How a module id is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
  /// Dependency array of a `define` call.
  Define,
  /// Dependency array of a global `require([...])` call, loaded asynchronously.
  AsyncRequire,
  /// Synchronous `require('id')` call.
  SyncRequire,
}

/// A module id literal found in script text.
#[derive(Debug, Clone, Copy)]
pub struct ModuleReference<'a> {
  /// The literal id.
  pub id: &'a str,
  /// Call form the id appears in.
  pub kind: ReferenceKind,
  /// Module id declared by the enclosing `define('id', ...)`, when given.
  pub declared_module: Option<&'a str>,
}

fn dependency_array_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(
      r#"(?P<head>(?:^|[^.\w$])(?P<callee>define|require)\s*\(\s*(?:['"](?P<name>[^'"]*)['"]\s*,\s*)?)\[(?P<deps>[^\]]*)\]"#,
    )
    .expect("invalid dependency array regex")
  })
}

fn sync_require_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?P<head>(?:^|[^.\w$])require\s*\(\s*)(?P<q>['"])(?P<id>[^'"]+)['"](?P<tail>\s*\))"#)
      .expect("invalid require call regex")
  })
}

fn string_literal_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?P<q>['"])(?P<id>[^'"]*)['"]"#).expect("invalid string literal regex")
  })
}

/// Ids loaded through global `require([...])` calls.
pub fn extract_async_module_ids(code: &str) -> Vec<String> {
  let mut ids = Vec::new();
  visit_references(code, |reference| {
    if reference.kind == ReferenceKind::AsyncRequire {
      push_unique(&mut ids, reference.id);
    }
  });
  ids
}

/// Ids a module depends on synchronously (`define` arrays and `require('id')`).
pub fn extract_dependency_ids(code: &str) -> Vec<String> {
  let mut ids = Vec::new();
  visit_references(code, |reference| {
    if reference.kind != ReferenceKind::AsyncRequire {
      push_unique(&mut ids, reference.id);
    }
  });
  ids
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
  if id.is_empty() || SPECIAL_IDS.contains(&id) {
    return;
  }
  if !ids.iter().any(|value| value == id) {
    ids.push(id.to_string());
  }
}

fn visit_references<F>(code: &str, mut visit: F)
where
  F: FnMut(&ModuleReference<'_>),
{
  for caps in dependency_array_regex().captures_iter(code) {
    let kind = array_kind(&caps);
    let declared_module = caps.name("name").map(|m| m.as_str());
    let deps = caps.name("deps").map_or("", |m| m.as_str());
    for literal in string_literal_regex().captures_iter(deps) {
      if let Some(id) = literal.name("id") {
        visit(&ModuleReference {
          id: id.as_str(),
          kind,
          declared_module,
        });
      }
    }
  }

  for caps in sync_require_regex().captures_iter(code) {
    if let Some(id) = caps.name("id") {
      visit(&ModuleReference {
        id: id.as_str(),
        kind: ReferenceKind::SyncRequire,
        declared_module: None,
      });
    }
  }
}

fn array_kind(caps: &Captures<'_>) -> ReferenceKind {
  match caps.name("callee").map(|m| m.as_str()) {
    Some("define") => ReferenceKind::Define,
    _ => ReferenceKind::AsyncRequire,
  }
}

/// Rewrite module id literals.
///
/// `rewrite` returns the replacement id, or `None` to keep the literal as is.
/// Quotes and surrounding code are preserved.
pub fn update_resource_ids<F>(code: &str, mut rewrite: F) -> String
where
  F: FnMut(&ModuleReference<'_>) -> Option<String>,
{
  let arrays_done = dependency_array_regex().replace_all(code, |caps: &Captures<'_>| {
    let kind = array_kind(caps);
    let declared_module = caps.name("name").map(|m| m.as_str());
    let head = caps.name("head").map_or("", |m| m.as_str());
    let deps = caps.name("deps").map_or("", |m| m.as_str());

    let deps = string_literal_regex().replace_all(deps, |literal: &Captures<'_>| {
      let quote = literal.name("q").map_or("'", |m| m.as_str());
      let id = literal.name("id").map_or("", |m| m.as_str());
      let reference = ModuleReference {
        id,
        kind,
        declared_module,
      };
      match rewrite(&reference) {
        Some(updated) => format!("{quote}{updated}{quote}"),
        None => literal[0].to_string(),
      }
    });

    format!("{head}[{deps}]")
  });

  sync_require_regex()
    .replace_all(&arrays_done, |caps: &Captures<'_>| {
      let id = caps.name("id").map_or("", |m| m.as_str());
      let reference = ModuleReference {
        id,
        kind: ReferenceKind::SyncRequire,
        declared_module: None,
      };
      match rewrite(&reference) {
        Some(updated) => format!(
          "{}{quote}{updated}{quote}{}",
          &caps["head"],
          &caps["tail"],
          quote = &caps["q"],
        ),
        None => caps[0].to_string(),
      }
    })
    .into_owned()
}

/// Split `plugin!resource` ids.
pub fn split_plugin_resource(id: &str) -> Option<(&str, &str)> {
  let (plugin, resource) = id.split_once('!')?;
  if plugin.is_empty() {
    return None;
  }
  Some((plugin, resource))
}

/// Resolve a possibly relative module id (`./x`, `../x`) against `base_module`.
///
/// Top-level ids are returned unchanged. Relative ids without a base module
/// are resolved from the module root.
pub fn resolve_module_id(id: &str, base_module: Option<&str>) -> String {
  if !id.starts_with("./") && !id.starts_with("../") {
    return id.to_string();
  }

  let mut segments: Vec<&str> = match base_module.and_then(|base| base.rsplit_once('/')) {
    Some((dir, _)) => dir.split('/').collect(),
    None => Vec::new(),
  };
  for segment in id.split('/') {
    match segment {
      "." | "" => {}
      ".." => {
        segments.pop();
      }
      other => segments.push(other),
    }
  }
  segments.join("/")
}

/// Module id of a script at `subpath`, relative to the configured base directory.
///
/// Returns `None` for scripts outside the base directory.
pub fn module_id_for_path(subpath: &str, config: &ModuleConfig) -> Option<String> {
  let relative = strip_base(subpath, &config.base_url)?;
  let id = relative.strip_suffix(".js").unwrap_or(relative);
  Some(id.to_string())
}

/// Resource id under which a loader plugin addresses the file at `subpath`.
///
/// Unlike module ids the extension is kept, matching how plugin resources such
/// as `css!theme/main.css` are written.
pub fn resource_id_for_path(subpath: &str, config: &ModuleConfig) -> Option<String> {
  strip_base(subpath, &config.base_url).map(str::to_string)
}

fn strip_base<'a>(subpath: &'a str, base_url: &str) -> Option<&'a str> {
  let subpath = subpath.trim_start_matches('/');
  let base = base_url.trim_matches('/');
  if base.is_empty() {
    return Some(subpath);
  }
  subpath.strip_prefix(base)?.strip_prefix('/')
}

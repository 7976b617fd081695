//! Locate packable script and stylesheet references in page markup.
//!
//! Markup is matched with regular expressions, not parsed. Comments are consumed
//! as a whole so that commented-out elements are never reported, and the page
//! text is only modified to insert the configured placeholder tokens.

use std::sync::OnceLock;

use regex::Regex;

use crate::amd::extract_async_module_ids;
use crate::config::PageOptions;
use crate::models::{FileId, MarkupReference};

const SCRIPT_TYPES: [&str; 2] = ["text/javascript", "application/javascript"];

/// Options driving a single scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions<'a> {
  /// Insert placeholders when the page has none.
  pub auto_insert_placeholder: bool,
  /// File names recognised as module loaders.
  pub loader_scripts: &'a [String],
  /// Token marking where bundled scripts go.
  pub script_placeholder: &'a str,
  /// Token marking where bundled styles go.
  pub style_placeholder: &'a str,
  /// Token marking where the loader configuration goes.
  pub resource_config_placeholder: &'a str,
  /// Whether resolved references are reported as pack candidates.
  pub collect_references: bool,
}

impl<'a> ScanOptions<'a> {
  /// Build scan options from page options.
  pub fn new(page: &'a PageOptions, collect_references: bool) -> Self {
    Self {
      auto_insert_placeholder: page.auto_insert_placeholder,
      loader_scripts: &page.loader_scripts,
      script_placeholder: &page.script_placeholder,
      style_placeholder: &page.style_placeholder,
      resource_config_placeholder: &page.resource_config_placeholder,
      collect_references,
    }
  }
}

/// A markup URL resolved to a registered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
  /// The referenced file.
  pub file: FileId,
  /// File name of the referenced file.
  pub basename: String,
}

/// Result of scanning a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
  /// Page content with any inserted placeholders.
  pub content: String,
  /// Packable references in document order.
  pub references: Vec<MarkupReference>,
}

fn script_element_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(
      r"(?i)(?P<comment><!--(?s:.*?)(?:-->|\z))|\s*<script(?P<attrs>[^>]*)>(?P<body>(?s:.*?))</script>\n?",
    )
    .expect("invalid script element regex")
  })
}

fn style_element_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(
      r"(?i)(?P<comment><!--(?s:.*?)(?:-->|\z))|\s*(?:<link\b(?P<attrs>[^>]*?)/?>|<style[^>]*>(?s:.*?)</style>)\n?",
    )
    .expect("invalid style element regex")
  })
}

fn url_attr_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?i)(?:^|\s+)(?:src|href)\s*=\s*(?:"(?P<dq>[^"]+)"|'(?P<sq>[^']+)')"#)
      .expect("invalid src/href regex")
  })
}

fn type_attr_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?i)(?:^|\s)type\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)
      .expect("invalid type regex")
  })
}

fn stylesheet_rel_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?i)(?:^|\s)rel\s*=\s*(?:"stylesheet"|'stylesheet')"#)
      .expect("invalid rel regex")
  })
}

fn loader_attr_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN
    .get_or_init(|| Regex::new(r"(?i)(?:^|\s)data-loader\b").expect("invalid loader regex"))
}

fn entry_attr_regex() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| Regex::new(r"(?i)(?:^|\s)data-entry\b").expect("invalid entry regex"))
}

fn quoted_value<'t>(regex: &Regex, text: &'t str) -> Option<&'t str> {
  let caps = regex.captures(text)?;
  caps
    .name("dq")
    .or_else(|| caps.name("sq"))
    .map(|m| m.as_str())
}

fn remove_url_attr(attrs: &str) -> String {
  url_attr_regex()
    .replace(attrs, "")
    .trim_end()
    .to_string()
}

fn split_leading_whitespace(raw: &str) -> (&str, &str) {
  let trimmed = raw.trim_start();
  raw.split_at(raw.len() - trimmed.len())
}

fn url_basename(url: &str) -> &str {
  let path = url.split(['?', '#']).next().unwrap_or(url);
  path.rsplit('/').next().unwrap_or(path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
  Script,
  ResourceConfig,
}

struct PlaceholderState {
  auto_insert: bool,
  has_script: bool,
  has_resource_config: bool,
}

impl PlaceholderState {
  fn take(&mut self, is_loader: bool) -> Option<Placeholder> {
    if !self.auto_insert {
      return None;
    }

    if is_loader && !self.has_resource_config {
      self.has_resource_config = true;
      Some(Placeholder::ResourceConfig)
    } else if !self.has_script {
      self.has_script = true;
      Some(Placeholder::Script)
    } else {
      None
    }
  }
}

/// Scan page markup for script references.
///
/// Loader scripts (listed in `loader_scripts` or marked `data-loader`) are never
/// packed; the first one gets the resource-config placeholder inserted right
/// before it. Inline scripts marked `data-entry` or containing async
/// `require([...])` calls get the script placeholder inserted before them. When
/// no script placeholder exists afterwards, it is inserted after the last
/// packable reference.
pub fn scan_scripts<R>(content: &str, options: &ScanOptions<'_>, mut resolve: R) -> ScanOutcome
where
  R: FnMut(&str) -> Option<ResolvedReference>,
{
  let mut state = PlaceholderState {
    auto_insert: options.auto_insert_placeholder,
    has_script: content.contains(options.script_placeholder),
    has_resource_config: content.contains(options.resource_config_placeholder),
  };

  let mut output = String::with_capacity(content.len() + 64);
  let mut references = Vec::new();
  let mut last_reference_end = None;
  let mut cursor = 0;

  for caps in script_element_regex().captures_iter(content) {
    let Some(whole) = caps.get(0) else {
      continue;
    };
    output.push_str(&content[cursor..whole.start()]);
    cursor = whole.end();

    let raw = whole.as_str();
    if caps.name("comment").is_some() {
      output.push_str(raw);
      continue;
    }

    let attrs = caps.name("attrs").map_or("", |m| m.as_str());
    let body = caps.name("body").map_or("", |m| m.as_str());

    if let Some(src) = body
      .trim()
      .is_empty()
      .then(|| quoted_value(url_attr_regex(), attrs))
      .flatten()
    {
      let resolved = resolve(src);
      let rest = remove_url_attr(attrs);
      let name = resolved
        .as_ref()
        .map_or_else(|| url_basename(src), |file| file.basename.as_str());

      let is_loader = loader_attr_regex().is_match(&rest)
        || options.loader_scripts.iter().any(|loader| loader == name);

      if is_loader {
        match state.take(true) {
          Some(Placeholder::ResourceConfig) => {
            let (lead, tag) = split_leading_whitespace(raw);
            output.push_str(lead);
            output.push_str(options.resource_config_placeholder);
            output.push_str(tag);
          }
          Some(Placeholder::Script) => {
            output.push_str(raw);
            output.push_str(options.script_placeholder);
          }
          None => output.push_str(raw),
        }
        continue;
      }

      output.push_str(raw);
      if let (Some(resolved), true) = (resolved, options.collect_references) {
        references.push(MarkupReference {
          file: resolved.file,
          raw: raw.to_string(),
          attrs: rest,
        });
        last_reference_end = Some(output.len());
      }
      continue;
    }

    let is_javascript = match quoted_value(type_attr_regex(), attrs) {
      Some(kind) => SCRIPT_TYPES.contains(&kind.trim().to_ascii_lowercase().as_str()),
      None => true,
    };
    let is_entry = is_javascript
      && (entry_attr_regex().is_match(attrs) || !extract_async_module_ids(body).is_empty());

    match is_entry.then(|| state.take(false)).flatten() {
      Some(_) => {
        let (lead, tag) = split_leading_whitespace(raw);
        output.push_str(lead);
        output.push_str(options.script_placeholder);
        output.push_str(tag);
      }
      None => output.push_str(raw),
    }
  }
  output.push_str(&content[cursor..]);

  if let (Some(end), false, true) = (
    last_reference_end,
    state.has_script,
    options.auto_insert_placeholder,
  ) {
    output.insert_str(end, options.script_placeholder);
  }

  ScanOutcome {
    content: output,
    references,
  }
}

/// Scan page markup for stylesheet references.
///
/// Only `<link rel="stylesheet">` elements with an `href` are packable; inline
/// `<style>` blocks are left alone. The style placeholder is inserted after the
/// last packable reference when the page has none.
pub fn scan_styles<R>(content: &str, options: &ScanOptions<'_>, mut resolve: R) -> ScanOutcome
where
  R: FnMut(&str) -> Option<ResolvedReference>,
{
  let mut output = String::with_capacity(content.len() + 32);
  let mut references = Vec::new();
  let mut last_reference_end = None;
  let mut cursor = 0;

  for caps in style_element_regex().captures_iter(content) {
    let Some(whole) = caps.get(0) else {
      continue;
    };
    output.push_str(&content[cursor..whole.start()]);
    cursor = whole.end();
    output.push_str(whole.as_str());

    if caps.name("comment").is_some() {
      continue;
    }
    let Some(attrs) = caps.name("attrs").map(|m| m.as_str()) else {
      continue;
    };
    if !stylesheet_rel_regex().is_match(attrs) {
      continue;
    }
    let Some(href) = quoted_value(url_attr_regex(), attrs) else {
      continue;
    };

    if let (Some(resolved), true) = (resolve(href), options.collect_references) {
      references.push(MarkupReference {
        file: resolved.file,
        raw: whole.as_str().to_string(),
        attrs: remove_url_attr(attrs),
      });
      last_reference_end = Some(output.len());
    }
  }
  output.push_str(&content[cursor..]);

  if let Some(end) = last_reference_end
    .filter(|_| options.auto_insert_placeholder && !content.contains(options.style_placeholder))
  {
    output.insert_str(end, options.style_placeholder);
  }

  ScanOutcome {
    content: output,
    references,
  }
}

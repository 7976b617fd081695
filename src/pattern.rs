//! Include and exclude rules used to pick the files of a bundle.

use std::fmt;
use std::sync::Arc;

use glob_match::glob_match;

/// Predicate over project subpaths.
pub type PathPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Single file selection rule.
#[derive(Clone)]
pub enum FilePattern {
  /// Glob matched against the subpath.
  Glob(String),
  /// Any file already assigned to the pack with this id (`::id`).
  PackMember(String),
  /// Arbitrary predicate over the subpath.
  Predicate(PathPredicate),
}

impl fmt::Debug for FilePattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Glob(glob) => f.debug_tuple("Glob").field(glob).finish(),
      Self::PackMember(id) => f.debug_tuple("PackMember").field(id).finish(),
      Self::Predicate(_) => f.write_str("Predicate(..)"),
    }
  }
}

impl PartialEq for FilePattern {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Glob(a), Self::Glob(b)) => a == b,
      (Self::PackMember(a), Self::PackMember(b)) => a == b,
      (Self::Predicate(a), Self::Predicate(b)) => Arc::ptr_eq(a, b),
      _ => false,
    }
  }
}

impl FilePattern {
  /// Test a file against the rule.
  ///
  /// `in_pack` answers whether the file currently belongs to the given pack id.
  pub fn matches(&self, subpath: &str, in_pack: &dyn Fn(&str) -> bool) -> bool {
    match self {
      Self::Glob(glob) => glob_matches(glob, subpath),
      Self::PackMember(id) => in_pack(id),
      Self::Predicate(predicate) => predicate(subpath),
    }
  }
}

/// Parsed include/ignore rules of a pack item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternSet {
  /// Positive rules.
  pub include: Vec<FilePattern>,
  /// Negative rules, removing files even when matched elsewhere.
  pub ignore: Vec<FilePattern>,
  /// Pack ids referenced through `::id` rules.
  pub dep_pack_ids: Vec<String>,
}

impl PatternSet {
  /// Parse textual rules: `!rule` is negative, `::id` is a back-reference.
  pub fn parse<I, S>(rules: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut set = Self::default();
    for rule in rules {
      set.push_rule(rule.as_ref());
    }
    set
  }

  /// Add one textual rule.
  pub fn push_rule(&mut self, rule: &str) {
    let rule = rule.trim();
    if rule.is_empty() {
      return;
    }

    let (negative, body) = match rule.strip_prefix('!') {
      Some(body) => (true, body),
      None => (false, rule),
    };

    let pattern = match body.strip_prefix("::") {
      Some(id) => {
        if !self.dep_pack_ids.iter().any(|value| value == id) {
          self.dep_pack_ids.push(id.to_string());
        }
        FilePattern::PackMember(id.to_string())
      }
      None => FilePattern::Glob(body.to_string()),
    };

    if negative {
      push_pattern(&mut self.ignore, pattern);
    } else {
      push_pattern(&mut self.include, pattern);
    }
  }

  /// Add a positive predicate rule.
  pub fn push_predicate(&mut self, predicate: PathPredicate) {
    push_pattern(&mut self.include, FilePattern::Predicate(predicate));
  }

  /// Union another set into this one, dropping duplicates.
  pub fn merge(&mut self, other: PatternSet) {
    for pattern in other.include {
      push_pattern(&mut self.include, pattern);
    }
    for pattern in other.ignore {
      push_pattern(&mut self.ignore, pattern);
    }
    for id in other.dep_pack_ids {
      if !self.dep_pack_ids.contains(&id) {
        self.dep_pack_ids.push(id);
      }
    }
  }

  /// Whether any negative rule matches.
  pub fn is_ignored(&self, subpath: &str, in_pack: &dyn Fn(&str) -> bool) -> bool {
    matches_any(&self.ignore, subpath, in_pack)
  }
}

fn push_pattern(patterns: &mut Vec<FilePattern>, pattern: FilePattern) {
  if !patterns.contains(&pattern) {
    patterns.push(pattern);
  }
}

/// Whether any of `patterns` matches.
pub fn matches_any(
  patterns: &[FilePattern],
  subpath: &str,
  in_pack: &dyn Fn(&str) -> bool,
) -> bool {
  patterns
    .iter()
    .any(|pattern| pattern.matches(subpath, in_pack))
}

/// Match a glob against a project subpath.
///
/// A leading `/` anchors the glob at the project root; otherwise the glob may
/// match at any directory depth, so `*.js` selects every script.
pub fn glob_matches(glob: &str, subpath: &str) -> bool {
  let subpath = subpath.trim_start_matches('/');
  match glob.strip_prefix('/') {
    Some(anchored) => glob_match(anchored, subpath),
    None => glob_match(glob, subpath) || glob_match(&format!("**/{glob}"), subpath),
  }
}

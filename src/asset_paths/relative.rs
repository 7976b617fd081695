/// Split a URL into its path and its `?query`/`#hash` suffix.
pub fn split_url_suffix(url: &str) -> (&str, &str) {
  match url.find(['?', '#']) {
    Some(index) => url.split_at(index),
    None => (url, ""),
  }
}

/// Collapse `.` and `..` segments.
///
/// Returns `None` when the path climbs above the project root.
pub fn normalize_path(path: &str) -> Option<String> {
  let path = path.replace('\\', "/");
  let mut segments: Vec<&str> = Vec::new();
  for segment in path.split('/') {
    match segment {
      "" | "." => {}
      ".." => {
        segments.pop()?;
      }
      other => segments.push(other),
    }
  }
  Some(segments.join("/"))
}

/// Resolve `relative` against the directory `base_dir`.
pub fn join_relative(base_dir: &str, relative: &str) -> Option<String> {
  if base_dir.is_empty() {
    normalize_path(relative)
  } else {
    normalize_path(&format!("{base_dir}/{relative}"))
  }
}

/// Relative URL leading from the file `from` to the file `to`.
pub fn relative_url(from: &str, to: &str) -> String {
  let from_dir: Vec<&str> = match from.trim_start_matches('/').rsplit_once('/') {
    Some((dir, _)) => dir.split('/').collect(),
    None => Vec::new(),
  };
  let target: Vec<&str> = to.trim_start_matches('/').split('/').collect();

  let (target_dir, target_name) = target.split_at(target.len().saturating_sub(1));
  let common = from_dir
    .iter()
    .zip(target_dir)
    .take_while(|(left, right)| left == right)
    .count();

  let mut parts: Vec<&str> = vec![".."; from_dir.len() - common];
  parts.extend_from_slice(&target_dir[common..]);
  parts.extend_from_slice(target_name);
  parts.join("/")
}

//! Markup emitted for bundles and loader configuration.

use serde_json::Value;

/// `<script>` tags for `urls`, one per line.
///
/// `attrs` is appended verbatim after the `src` attribute and should start with
/// a space when non-empty.
pub fn script_tags<S: AsRef<str>>(urls: &[S], attrs: &str) -> String {
  urls
    .iter()
    .map(|url| format!(r#"<script src="{}"{attrs}></script>"#, url.as_ref()))
    .collect::<Vec<_>>()
    .join("\n")
}

/// `<link>` stylesheet tags for `urls`, one per line.
///
/// Without explicit attributes a `rel="stylesheet"` attribute is emitted.
pub fn link_style_tags<S: AsRef<str>>(urls: &[S], attrs: &str) -> String {
  let attrs = if attrs.trim().is_empty() {
    r#" rel="stylesheet""#
  } else {
    attrs
  };
  urls
    .iter()
    .map(|url| format!(r#"<link href="{}"{attrs}>"#, url.as_ref()))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Inline script declaring the loader configuration.
pub fn resource_config_script(config: &Value) -> String {
  let body = serde_json::to_string_pretty(config).unwrap_or_else(|_| "{}".to_string());
  format!("<script>\nvar require = {body};\n</script>")
}

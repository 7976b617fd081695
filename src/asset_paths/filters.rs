use regex::Regex;

fn non_local_patterns() -> &'static [Regex] {
    use std::sync::OnceLock;

    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(r"(?i)^[a-z][a-z0-9+.\-]*:").expect("invalid scheme regex"),
                Regex::new(r"^//").expect("invalid protocol-relative regex"),
                Regex::new(r"^/").expect("invalid root-absolute regex"),
                Regex::new(r"^#").expect("invalid fragment regex"),
            ]
        })
        .as_slice()
}

/// Determine whether a URL must be left untouched when content moves into a bundle.
///
/// Scheme URLs (`http:`, `data:`, `about:` ...), protocol-relative and root-absolute
/// URLs and bare fragments do not depend on the location of the referencing file.
pub fn is_non_local_url(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || non_local_patterns()
            .iter()
            .any(|pattern| pattern.is_match(value))
}

//! Stylesheet URL rewriting and charset handling.

use std::sync::OnceLock;

use regex::Regex;

fn css_url_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?is)(?P<comment>/\*.*?\*/)|url\(\s*(?P<url>"[^"]*"|'[^']*'|[^)\s]*)\s*\)|@import\s+(?P<import>"[^"]*"|'[^']*')|\bsrc\s*=\s*(?P<filter>"[^"]*"|'[^']*'|[^,)\s]+)"#,
        )
        .expect("invalid css url regex")
    })
}

fn charset_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)@charset\s+(?:'[^']*'|"[^"]*"|\S*);?"#).expect("invalid charset regex")
    })
}

/// Rewrite the URLs of `url(...)`, `@import "..."` and filter `src=...` forms.
///
/// `rewrite` receives the unquoted URL and returns its replacement, or `None`
/// to keep it. Original quotes are kept; an unquoted URL whose replacement
/// needs quoting is emitted double-quoted. Comments are left alone.
pub fn rewrite_css_urls<F>(content: &str, mut rewrite: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut output = String::with_capacity(content.len());
    let mut cursor = 0;

    for caps in css_url_regex().captures_iter(content) {
        let Some(value) = caps
            .name("url")
            .or_else(|| caps.name("import"))
            .or_else(|| caps.name("filter"))
        else {
            continue;
        };

        let (quote, url) = unquote(value.as_str());
        let Some(updated) = rewrite(url) else {
            continue;
        };

        let quote = match quote {
            "" if needs_quotes(&updated) => "\"",
            other => other,
        };
        output.push_str(&content[cursor..value.start()]);
        output.push_str(quote);
        output.push_str(&updated);
        output.push_str(quote);
        cursor = value.end();
    }

    output.push_str(&content[cursor..]);
    output
}

/// Remove every `@charset` declaration.
pub fn strip_charset(content: &str) -> String {
    charset_regex().replace_all(content, "").into_owned()
}

fn unquote(value: &str) -> (&str, &str) {
    for quote in ["\"", "'"] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return (quote, &value[1..value.len() - 1]);
        }
    }
    ("", value)
}

fn needs_quotes(url: &str) -> bool {
    url.chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"' | ','))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(url: &str) -> Option<String> {
        (!url.starts_with("http") && !url.is_empty()).then(|| format!("../{url}"))
    }

    #[test]
    fn rewrites_every_url_form_and_keeps_quotes() {
        let css = r#"@import "base.css";
.a { background: url(img/a.png) no-repeat; }
.b { background: url( 'img/b.png' ); }
.c { filter: progid:DXImageTransform.Microsoft.AlphaImageLoader(src='img/c.png', sizingMethod='crop'); }"#;
        let rewritten = rewrite_css_urls(css, prefix);

        assert!(rewritten.contains(r#"@import "../base.css";"#));
        assert!(rewritten.contains("url(../img/a.png) no-repeat"));
        assert!(rewritten.contains("url( '../img/b.png' )"));
        assert!(rewritten.contains("src='../img/c.png'"));
    }

    #[test]
    fn leaves_comments_and_declined_urls_alone() {
        let css = "/* url(img/old.png) */ .a { background: url(http://cdn/x.png); }";
        assert_eq!(rewrite_css_urls(css, prefix), css);
    }

    #[test]
    fn quotes_unquoted_urls_when_needed() {
        let css = ".a { background: url(a.png); }";
        let rewritten = rewrite_css_urls(css, |_| Some("my image.png".into()));
        assert_eq!(rewritten, r#".a { background: url("my image.png"); }"#);
    }

    #[test]
    fn strips_charset_declarations() {
        let css = "@charset \"utf-8\";\n.a{}\n@CHARSET 'gbk';";
        assert_eq!(strip_charset(css), "\n.a{}\n");
    }
}

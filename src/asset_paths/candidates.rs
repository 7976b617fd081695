use std::collections::BTreeSet;

/// Generate candidate subpaths for resolving a resource or module id.
///
/// Ids can be plain subpaths, paths relative to the module base directory, or
/// AMD module ids that omit the `.js` extension. The generator expands the
/// value into a deterministic, de-duplicated list tried in order against the
/// file registry.
pub fn generate_lookup_candidates(base_url: &str, id: &str) -> Vec<String> {
    if id.trim().is_empty() {
        return Vec::new();
    }

    let mut builder = CandidateBuilder::new(base_url, id);

    builder.add_plain_candidate();
    builder.add_base_scope_candidates();
    builder.add_script_extension_candidates();

    builder.finish()
}

struct CandidateBuilder<'a> {
    trimmed: &'a str,
    base: Option<&'a str>,
    seen: BTreeSet<String>,
    result: Vec<String>,
}

impl<'a> CandidateBuilder<'a> {
    fn new(base_url: &'a str, id: &'a str) -> Self {
        let base_value = base_url.trim_matches('/');
        let base = if base_value.is_empty() {
            None
        } else {
            Some(base_value)
        };

        Self {
            trimmed: id.trim().trim_start_matches("./").trim_start_matches('/'),
            base,
            seen: BTreeSet::new(),
            result: Vec::new(),
        }
    }

    fn add_plain_candidate(&mut self) {
        self.push(self.trimmed.to_string());
    }

    fn add_base_scope_candidates(&mut self) {
        if let Some(base) = self.base {
            self.push(format!("{base}/{}", self.trimmed));
        }
    }

    fn add_script_extension_candidates(&mut self) {
        if has_extension(self.trimmed) {
            return;
        }

        self.push(format!("{}.js", self.trimmed));
        if let Some(base) = self.base {
            self.push(format!("{base}/{}.js", self.trimmed));
        }
    }

    fn finish(self) -> Vec<String> {
        self.result
    }

    fn push(&mut self, candidate: String) {
        if candidate.is_empty() {
            return;
        }
        if self.seen.insert(candidate.clone()) {
            self.result.push(candidate);
        }
    }
}

fn has_extension(id: &str) -> bool {
    let name = id.rsplit_once('/').map_or(id, |(_, name)| name);
    name.rfind('.').is_some_and(|index| index > 0)
}

#[cfg(test)]
mod tests {
    use super::generate_lookup_candidates;

    #[test]
    fn returns_empty_for_blank_ids() {
        assert!(generate_lookup_candidates("src", " ").is_empty());
    }

    #[test]
    fn expands_module_ids_under_the_base_directory() {
        let candidates = generate_lookup_candidates("src", "app/main");
        assert_eq!(candidates, vec![
            "app/main".to_string(),
            "src/app/main".to_string(),
            "app/main.js".to_string(),
            "src/app/main.js".to_string(),
        ]);
    }

    #[test]
    fn keeps_explicit_extensions() {
        let candidates = generate_lookup_candidates("/src/", "./css/theme.css");
        assert_eq!(candidates, vec![
            "css/theme.css".to_string(),
            "src/css/theme.css".to_string(),
        ]);
    }

    #[test]
    fn deduplicates_without_base_directory() {
        let candidates = generate_lookup_candidates("", "lib/util");
        assert_eq!(candidates, vec!["lib/util".to_string(), "lib/util.js".to_string()]);
    }
}

//! Template variable extraction and substitution (`${NAME}` / `${NAME:-default}`).

use std::collections::HashMap;

use regex::Regex;

fn variable_pattern() -> Regex {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("variable pattern is a fixed, valid regex")
}

/// Scans `text` for `${NAME}` / `${NAME:-default}` references and returns the variable
/// names in first-occurrence order, deduplicated.
#[must_use]
pub fn extract_variables(text: &str) -> Vec<String> {
    let pattern = variable_pattern();
    let mut seen = std::collections::HashSet::new();
    let mut names = Vec::new();
    for caps in pattern.captures_iter(text) {
        let name = caps[1].to_string();
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }
    names
}

/// Replaces every `${NAME}` / `${NAME:-default}` reference in `text` with the value from
/// `values`, falling back to the reference's own default when `values` has no entry, and to
/// the empty string when neither is present.
#[must_use]
pub fn substitute(text: &str, values: &HashMap<String, String>) -> String {
    let pattern = variable_pattern();
    pattern
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            if let Some(value) = values.get(name) {
                value.clone()
            } else if let Some(default) = caps.get(2) {
                default.as_str().to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_names_in_first_seen_order_deduped() {
        let names = extract_variables("${B} ${A} ${B} ${C:-x}");
        assert_eq!(names, vec!["B", "A", "C"]);
    }

    #[test]
    fn substitutes_provided_value() {
        let mut values = HashMap::new();
        values.insert("NAME".to_string(), "hoster".to_string());
        assert_eq!(substitute("hello ${NAME}", &values), "hello hoster");
    }

    #[test]
    fn falls_back_to_inline_default() {
        let values = HashMap::new();
        assert_eq!(substitute("port=${PORT:-8080}", &values), "port=8080");
    }

    #[test]
    fn missing_without_default_becomes_empty() {
        let values = HashMap::new();
        assert_eq!(substitute("x=${MISSING}y", &values), "x=y");
    }

    #[test]
    fn provided_value_overrides_inline_default() {
        let mut values = HashMap::new();
        values.insert("PORT".to_string(), "9090".to_string());
        assert_eq!(substitute("port=${PORT:-8080}", &values), "port=9090");
    }
}

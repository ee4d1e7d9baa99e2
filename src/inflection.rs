//! Minimal English singularization for default join keys.
//!
//! Only covers the regular plural forms table names tend to use. Anything
//! irregular should pass an explicit foreign key through
//! [`JoinOptions`](crate::JoinOptions).

const IRREGULAR: &[(&str, &str)] = &[
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("mice", "mouse"),
    ("data", "datum"),
];

const UNCOUNTABLE: &[&str] = &["news", "series", "species", "equipment", "information"];

/// Singular form of a plural table name
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();

    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((_, singular)) = IRREGULAR.iter().find(|(plural, _)| *plural == lower) {
        return (*singular).to_string();
    }

    if let Some(stem) = word.strip_suffix("ies") {
        if stem.len() > 1 {
            return format!("{stem}y");
        }
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if let Some(stem) = word.strip_suffix("s") {
        if !stem.ends_with('s') && !stem.is_empty() {
            return stem.to_string();
        }
    }

    word.to_string()
}

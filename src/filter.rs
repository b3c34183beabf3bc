//! Filename filtering for directory listings.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RemoteFsError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    /// Keep every entry.
    #[default]
    None,
    /// Case-sensitive equality.
    Exact,
    /// Case-sensitive substring.
    Contains,
    /// `*` matches any run of characters; the whole name must match.
    Wildcard,
    /// Unanchored regular expression.
    Regex,
}

/// Filters `names` by `pattern`. The `.` and `..` pseudo-entries are always
/// dropped, whatever the filter kind.
pub fn match_names(names: Vec<String>, pattern: &str, kind: FilterKind) -> Result<Vec<String>> {
    let names = names.into_iter().filter(|name| name != "." && name != "..");

    let matched = match kind {
        FilterKind::None => names.collect(),
        FilterKind::Exact => names.filter(|name| name == pattern).collect(),
        FilterKind::Contains => names.filter(|name| name.contains(pattern)).collect(),
        FilterKind::Wildcard => {
            let re = compile(pattern, &wildcard_to_regex(pattern))?;
            names.filter(|name| re.is_match(name)).collect()
        }
        FilterKind::Regex => {
            let re = compile(pattern, pattern)?;
            names.filter(|name| re.is_match(name)).collect()
        }
    };

    Ok(matched)
}

/// Translates a wildcard pattern into an anchored regular expression.
pub fn wildcard_to_regex(pattern: &str) -> String {
    format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"))
}

fn compile(pattern: &str, expression: &str) -> Result<Regex> {
    Regex::new(expression).map_err(|source| RemoteFsError::Filter {
        pattern: pattern.to_string(),
        source,
    })
}

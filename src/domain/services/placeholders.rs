//! Placeholder handling for message templates.
//!
//! Approved templates use positional tokens (`{{1}}`, `{{2}}`); free-form templates
//! use semantic keys (`{{customer_name}}`).

use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

fn numbered_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*(\d+)\s*\}\}").expect("valid numbered placeholder regex"))
}

fn named_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([a-z][a-z0-9_]*)\s*\}\}").expect("valid named placeholder regex")
    })
}

/// Number of distinct positional placeholders in a template body
pub fn numbered_count(body: &str) -> usize {
    numbered_regex()
        .captures_iter(body)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Replace `{{n}}` with `values[n - 1]`. Out-of-range tokens are left untouched.
pub fn fill_numbered(body: &str, values: &[String]) -> String {
    numbered_regex()
        .replace_all(body, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|index| values.get(index))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Replace `{{key}}` tokens with their values. Unknown keys are left untouched.
pub fn fill_named(body: &str, values: &HashMap<String, String>) -> String {
    named_regex()
        .replace_all(body, |caps: &Captures| {
            values
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

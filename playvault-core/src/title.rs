//! Title normalization and token similarity used for identity matching.

use std::collections::BTreeSet;

/// Normalize a storefront title for matching.
///
/// Lowercases, drops trademark symbols, turns every other non-alphanumeric
/// character into a space, and collapses runs of whitespace. Two titles that
/// differ only in case or punctuation normalize to the same string.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_space = false;

    for c in title.chars() {
        if matches!(c, '™' | '®' | '©') {
            continue;
        }
        // Apostrophes join words ("Assassin's" -> "assassins").
        if matches!(c, '\'' | '’') {
            continue;
        }
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Split a normalized title into its distinct tokens.
pub fn title_tokens(normalized: &str) -> BTreeSet<&str> {
    normalized.split_whitespace().collect()
}

/// Token-set overlap ratio between two normalized titles.
///
/// Sørensen–Dice coefficient over distinct tokens: `2·|A∩B| / (|A|+|B|)`.
/// Returns `0.0` when either title has no tokens, `1.0` for identical sets.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let ta = title_tokens(a);
    let tb = title_tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count() as f64;
    2.0 * shared / (ta.len() + tb.len()) as f64
}

/// Turn a normalized title into an identifier slug (`"portal 2"` -> `"portal-2"`).
pub fn slugify(normalized: &str) -> String {
    let slug = normalized.split_whitespace().collect::<Vec<_>>().join("-");
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
#[path = "tests/title_tests.rs"]
mod tests;

//! Label normalization for fuzzy matching.
//!
//! Header cells, CSV headers and file names are typed by people (or generated) and drift in
//! cosmetic ways: full-width vs. half-width characters, non-breaking spaces, `테스트 케이스 ID`
//! vs. `테스트케이스ID`, `기능리스트 v1.0.xlsx` vs. `기능리스트`. Everything here reduces such
//! labels to comparable keys.

use std::collections::BTreeSet;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Keys shorter than this (in chars) are dropped from [`variants`].
pub const MIN_VARIANT_CHARS: usize = 2;

/// Canonical comparison key: NFC, NBSP -> space, trimmed, lowercased, whitespace runs collapsed.
pub fn normalize(text: &str) -> String {
    let composed: String = text
        .nfc()
        .map(|c| if c == '\u{a0}' { ' ' } else { c })
        .collect();
    let lowered = composed.trim().to_lowercase();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// [`normalize`]d key folded to compatibility forms (NFKC, so full-width `（ＩＤ）` reads as
/// `(id)`) with everything but letters and digits removed.
pub fn squash(text: &str) -> String {
    normalize(text)
        .nfkc()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Text before the last `.`, or the input when there is none.
pub fn strip_extension(text: &str) -> &str {
    match text.rfind('.') {
        Some(idx) => &text[..idx],
        None => text,
    }
}

/// Removes a trailing `v<digits>(.<digits>)*` marker (e.g. `결함리포트 v1.0` -> `결함리포트`).
pub fn strip_version_suffix(text: &str) -> String {
    static VERSION_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = VERSION_RE
        .get_or_init(|| Regex::new(r"(?i)v\s*\d+(?:[._\-]\d+)*$").expect("valid regex"));
    re.replace(text, "").trim().to_string()
}

/// Every comparison key a label can be known by.
///
/// Contains the normalized and squashed forms of the label, of its extension-stripped stem and
/// of the stem without a version suffix. Keys shorter than [`MIN_VARIANT_CHARS`] are dropped.
pub fn variants(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let normalized = normalize(text);
    if normalized.is_empty() {
        return out;
    }

    let stem = strip_extension(&normalized).to_string();
    let versionless = strip_version_suffix(&stem);
    for key in [normalized, stem, versionless] {
        let squashed = squash(&key);
        out.insert(key);
        out.insert(squashed);
    }

    out.retain(|key| key.chars().count() >= MIN_VARIANT_CHARS);
    out
}

/// Two labels match when their [`variants`] intersect.
pub fn labels_match(a: &str, b: &str) -> bool {
    let a = variants(a);
    if a.is_empty() {
        return false;
    }
    let b = variants(b);
    !a.is_disjoint(&b)
}

/// True when some variant of `name` ends with or contains some variant of `suffix`.
///
/// Used to recognise prefixed copies of a template file, e.g.
/// `GS-B-12-3456 기능리스트 v1.0.xlsx` for the suffix `기능리스트 v1.0.xlsx`.
pub fn suffix_matches(name: &str, suffix: &str) -> bool {
    let suffix_keys = variants(suffix);
    if suffix_keys.is_empty() {
        return false;
    }
    variants(name).iter().any(|key| {
        suffix_keys
            .iter()
            .any(|s| key.ends_with(s.as_str()) || key.contains(s.as_str()))
    })
}

/// Loose containment match used for header cells.
///
/// Equal, containing or contained normalized forms match, as does a squashed `expected` found
/// inside the squashed `actual`. Empty inputs never match.
pub fn loosely_matches(actual: &str, expected: &str) -> bool {
    let actual_norm = normalize(actual);
    let expected_norm = normalize(expected);
    if actual_norm.is_empty() || expected_norm.is_empty() {
        return false;
    }
    if actual_norm.contains(&expected_norm) || expected_norm.contains(&actual_norm) {
        return true;
    }

    let actual_sq = squash(&actual_norm);
    let expected_sq = squash(&expected_norm);
    !actual_sq.is_empty()
        && !expected_sq.is_empty()
        && (actual_sq.contains(&expected_sq) || expected_sq.contains(&actual_sq))
}

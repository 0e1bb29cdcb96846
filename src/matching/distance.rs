//! Field distance functions.
//!
//! Each function compares one local attribute with one candidate attribute and
//! returns a distance in `[0, 1]`: 0 for equivalent values, 1 for maximally
//! different ones. When exactly one side is missing the caller-supplied neutral
//! `missing` distance is returned. All functions are pure.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::PartialCredit;

/// ", The" style article moved to the end of a name: "Beatles, The"
static TRAILING_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*(?:the|a|an)\s*$").expect("valid trailing article regex"));

/// Leading article: "The Beatles"
static LEADING_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:the|a|an)\s+").expect("valid leading article regex"));

/// Anything that is not a letter, digit or whitespace
static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("valid punctuation regex"));

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Normalize free text for comparison.
///
/// Decomposes and strips diacritics, case-folds, spells out `&`, removes
/// punctuation and a leading or trailing article, and collapses whitespace.
///
/// # Examples
///
/// ```
/// use autotag::matching::distance::normalize_text;
///
/// assert_eq!(normalize_text("The Beatles"), "beatles");
/// assert_eq!(normalize_text("Beatles, The"), "beatles");
/// assert_eq!(normalize_text("Sigur Rós"), "sigur ros");
/// assert_eq!(normalize_text("Simon & Garfunkel"), "simon and garfunkel");
/// ```
#[must_use]
pub fn normalize_text(s: &str) -> String {
    let folded: String = s
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .replace('&', " and ");

    let folded = TRAILING_ARTICLE.replace(folded.trim(), "");
    let folded = PUNCTUATION.replace_all(&folded, " ");
    let folded = WHITESPACE.replace_all(folded.trim(), " ");

    let stripped = LEADING_ARTICLE.replace(&folded, "").into_owned();
    if stripped.is_empty() {
        folded.into_owned()
    } else {
        stripped
    }
}

/// Distance between two strings after normalization.
///
/// Uses normalized Levenshtein similarity; distance is `1 - similarity`. Strings
/// that normalize to nothing (e.g. pure punctuation) are compared case-folded.
#[must_use]
pub fn string_distance(local: Option<&str>, candidate: Option<&str>, missing: f64) -> f64 {
    let (Some(a), Some(b)) = (present(local), present(candidate)) else {
        return missing_or_zero(present(local), present(candidate), missing);
    };

    let mut na = normalize_text(a);
    let mut nb = normalize_text(b);
    if na.is_empty() && nb.is_empty() {
        na = a.trim().to_lowercase();
        nb = b.trim().to_lowercase();
    }
    if na == nb {
        return 0.0;
    }

    clamp_unit(1.0 - strsim::normalized_levenshtein(&na, &nb))
}

/// Distance between two numbers, saturating at `tolerance`.
///
/// A tolerance of 0 means any difference is maximal.
#[must_use]
pub fn numeric_distance(
    local: Option<f64>,
    candidate: Option<f64>,
    tolerance: f64,
    missing: f64,
) -> f64 {
    let (Some(a), Some(b)) = (finite(local), finite(candidate)) else {
        return missing_or_zero(finite(local), finite(candidate), missing);
    };

    let diff = (a - b).abs();
    if diff == 0.0 {
        0.0
    } else if tolerance <= 0.0 {
        1.0
    } else {
        clamp_unit(diff / tolerance)
    }
}

/// Distance between two years with a tolerance in years
#[must_use]
pub fn year_distance(
    local: Option<i32>,
    candidate: Option<i32>,
    tolerance: u32,
    missing: f64,
) -> f64 {
    numeric_distance(
        local.map(f64::from),
        candidate.map(f64::from),
        f64::from(tolerance),
        missing,
    )
}

/// Distance between two durations in seconds.
///
/// Differences up to `grace` count as identical; beyond that the distance rises
/// linearly and saturates at 1 once the difference reaches `max`.
#[must_use]
pub fn duration_distance(
    local: Option<f64>,
    candidate: Option<f64>,
    grace: f64,
    max: f64,
    missing: f64,
) -> f64 {
    let (Some(a), Some(b)) = (finite(local), finite(candidate)) else {
        return missing_or_zero(finite(local), finite(candidate), missing);
    };

    let excess = (a - b).abs() - grace;
    if excess <= 0.0 {
        0.0
    } else {
        clamp_unit(excess / (max - grace))
    }
}

/// Exact-match distance for categorical values, with optional partial credit.
///
/// Values are compared case-insensitively after trimming. When they differ, the
/// partial-credit table is consulted in either order before returning 1.
#[must_use]
pub fn categorical_distance(
    local: Option<&str>,
    candidate: Option<&str>,
    partial_credit: &[PartialCredit],
    missing: f64,
) -> f64 {
    let (Some(a), Some(b)) = (present(local), present(candidate)) else {
        return missing_or_zero(present(local), present(candidate), missing);
    };

    let a = a.trim();
    let b = b.trim();
    if a.eq_ignore_ascii_case(b) || normalize_text(a) == normalize_text(b) {
        return 0.0;
    }

    partial_credit
        .iter()
        .find(|credit| {
            (credit.a.eq_ignore_ascii_case(a) && credit.b.eq_ignore_ascii_case(b))
                || (credit.a.eq_ignore_ascii_case(b) && credit.b.eq_ignore_ascii_case(a))
        })
        .map_or(1.0, |credit| clamp_unit(credit.distance))
}

/// Exact-match distance for small integers such as track numbers
#[must_use]
pub fn index_distance(local: Option<u32>, candidate: Option<u32>, missing: f64) -> f64 {
    match (local, candidate) {
        (Some(a), Some(b)) => {
            if a == b {
                0.0
            } else {
                1.0
            }
        }
        (None, None) => 0.0,
        _ => missing,
    }
}

/// Distance between two external identifiers.
///
/// Identifiers only confirm or contradict a match, so the comparison is only
/// made when both sides carry one; otherwise None.
#[must_use]
pub fn identifier_distance(local: Option<&str>, candidate: Option<&str>) -> Option<f64> {
    let (Some(a), Some(b)) = (present(local), present(candidate)) else {
        return None;
    };
    Some(if a.trim().eq_ignore_ascii_case(b.trim()) {
        0.0
    } else {
        1.0
    })
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Both sides absent is "nothing to compare"; the aggregator skips such fields,
/// so 0 here only matters to direct callers.
fn missing_or_zero<T>(local: Option<T>, candidate: Option<T>, missing: f64) -> f64 {
    if local.is_none() && candidate.is_none() {
        0.0
    } else {
        clamp_unit(missing)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        1.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

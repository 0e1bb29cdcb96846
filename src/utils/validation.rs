//! Centralized validation and helper functions.

/// Maximum number of tracks allowed in a local track set or a candidate release
pub const MAX_TRACKS: usize = 1_000;

/// Maximum length of an external identifier
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Convert a count to f64 for ratio calculations.
///
/// Track counts are tiny compared to the f64 mantissa, so the conversion is exact
/// for every input this crate accepts.
#[inline]
#[must_use]
pub fn count_to_f64(count: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        count as f64
    }
}

/// Check if adding another track would exceed the maximum allowed.
///
/// Call this with the current count BEFORE adding a new track.
/// Returns an error message if adding would exceed the limit, None if safe to add.
///
/// # Example
/// ```ignore
/// if check_track_limit(tracks.len()).is_some() {
///     return Err(...);
/// }
/// tracks.push(new_track); // Safe to add
/// ```
#[must_use]
pub fn check_track_limit(count: usize) -> Option<String> {
    if count >= MAX_TRACKS {
        Some(format!(
            "Too many tracks: adding another would exceed maximum of {MAX_TRACKS}"
        ))
    } else {
        None
    }
}

/// Normalize an external identifier (release or recording ID).
///
/// Trims whitespace and lowercases hex-style identifiers such as MusicBrainz
/// UUIDs so that `ABC...` and `abc...` resolve to the same candidate. Returns
/// None for empty, overlong, or control-character-bearing input.
///
/// # Examples
///
/// ```
/// use autotag::utils::validation::normalize_identifier;
///
/// assert_eq!(
///     normalize_identifier(" 0A1B2C3D-0000-0000-0000-000000000000 ").as_deref(),
///     Some("0a1b2c3d-0000-0000-0000-000000000000")
/// );
/// assert_eq!(normalize_identifier("   "), None);
/// ```
#[must_use]
pub fn normalize_identifier(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty()
        || trimmed.len() > MAX_IDENTIFIER_LENGTH
        || trimmed.chars().any(char::is_control)
    {
        return None;
    }

    if is_uuid_like(trimmed) {
        Some(trimmed.to_lowercase())
    } else {
        Some(trimmed.to_string())
    }
}

/// Whether a string has the 8-4-4-4-12 hex layout of a UUID
#[must_use]
pub fn is_uuid_like(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    let expected = [8, 4, 4, 4, 12];
    groups.len() == expected.len()
        && groups
            .iter()
            .zip(expected)
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Trim a free-text field, mapping empty strings to None
#[must_use]
pub fn clean_text(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == v.len() {
            Some(v)
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Remove every leading `marker` from a raw code, e.g. `'004` → `004`.
pub fn strip_marker(raw: &str, marker: char) -> &str {
    raw.trim_start_matches(marker)
}

/// Zero-pad a numeric code to three digits (`4` → `004`).
/// Returns `None` for anything that is not all ASCII digits.
pub fn pad_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{:0>3}", trimmed))
}

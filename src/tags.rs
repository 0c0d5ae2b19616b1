//! Status-tag, color and filter-text parsing over node names.
//!
//! Everything here is derived from the name string on demand; nothing fails.
//! Missing matches fall back to "no tag", [`NO_COLOR_PRIORITY`] or an empty
//! term list.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::StatusTag;

/// Sort key for names without recognized color markup.
pub const NO_COLOR_PRIORITY: i64 = 99;

lazy_static! {
    static ref STATUS_TAG: Regex =
        Regex::new(r"(?i)#(BACKLOG|BLOCKED|TODO|WIP|TEST|DONE)\b").unwrap();
    /// Same tokens plus the whitespace in front of them, for removal.
    static ref STATUS_TAG_WITH_SPACE: Regex =
        Regex::new(r"(?i)\s*#(BACKLOG|BLOCKED|TODO|WIP|TEST|DONE)\b").unwrap();
    static ref COLOR_CLASS: Regex = Regex::new(
        r#"class="[^"]*bc-(red|orange|yellow|green|blue|purple|pink|sky|teal|gray)[^"]*""#
    )
    .unwrap();
}

/// First status tag in `name`, if any. Later tags are ignored.
pub fn extract_status_tag(name: Option<&str>) -> Option<StatusTag> {
    let name = name.filter(|n| !n.is_empty())?;
    let caps = STATUS_TAG.captures(name)?;
    caps[1].parse().ok()
}

/// Removes every status tag (and the whitespace before it), then trims.
pub fn strip_status_tags(name: &str) -> String {
    STATUS_TAG_WITH_SPACE.replace_all(name, "").trim().to_string()
}

/// Rewrites `name` so that `status` is its only tag, placed at the end.
pub fn update_status_tag(name: Option<&str>, status: StatusTag) -> String {
    let base = name.map(strip_status_tags).unwrap_or_default();
    if base.is_empty() {
        format!("#{status}")
    } else {
        format!("{base} #{status}")
    }
}

/// Color named by the first `bc-<color>` class in the name's markup.
pub fn extract_color(name: Option<&str>) -> Option<&str> {
    let caps = COLOR_CLASS.captures(name?)?;
    caps.get(1).map(|m| m.as_str())
}

/// Lower sorts first: red, orange, yellow, pink, purple, blue, sky, teal,
/// green, gray, then everything uncolored.
pub fn color_priority(name: Option<&str>) -> i64 {
    match extract_color(name) {
        Some("red") => 1,
        Some("orange") => 2,
        Some("yellow") => 3,
        Some("pink") => 4,
        Some("purple") => 5,
        Some("blue") => 6,
        Some("sky") => 7,
        Some("teal") => 8,
        Some("green") => 9,
        Some("gray") => 10,
        _ => NO_COLOR_PRIORITY,
    }
}

/// Comma-separated filter text to trimmed, non-empty terms.
pub fn parse_filter_terms(filter_text: &str) -> Vec<String> {
    filter_text
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

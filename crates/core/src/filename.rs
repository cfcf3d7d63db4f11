use crate::timestamp::ResolvedTimestamp;
use chrono::{Datelike, Timelike};

pub fn timestamp_prefix(timestamp: ResolvedTimestamp) -> String {
    let d = timestamp.naive();
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        d.year(),
        d.month(),
        d.day(),
        d.hour(),
        d.minute(),
        d.second()
    )
}

/// `<yyyyMMdd_HHmmss>_<suffix><custom_tag><extension>`. The tag is appended
/// with no separator; `extension` carries its leading dot.
pub fn build_target_filename(
    timestamp: ResolvedTimestamp,
    suffix: &str,
    custom_tag: &str,
    extension: &str,
) -> String {
    format!(
        "{}_{}{}{}",
        timestamp_prefix(timestamp),
        suffix,
        custom_tag,
        extension.to_lowercase()
    )
}

/// Replaces characters that cannot appear inside a single filename, so an
/// operator tag can never turn the target into a path.
pub fn sanitize_tag(value: &str) -> String {
    value
        .chars()
        .map(|ch| if is_disallowed_char(ch) { '_' } else { ch })
        .collect()
}

fn is_disallowed_char(ch: char) -> bool {
    matches!(ch, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
        || ch == '\0'
        || ch.is_control()
}

//! Destination and backup filename templating.
//!
//! Recognised tokens: `{source_filename}`, `{source_extension}`, `{date}`,
//! `{time}`, `{guid}` and `{incremental}`. `{time}` uses a 12-hour clock with
//! no AM/PM marker, so 13:05:09 renders as `01-05-09`.

use chrono::{Local, NaiveDateTime};

use crate::utils::split_extension;

/// Substitutes tokens using the current local time.
pub fn substitute(template: &str, source_filename: &str, object_guid: &str, incremental: u64) -> String {
    substitute_at(
        template,
        source_filename,
        object_guid,
        incremental,
        Local::now().naive_local(),
    )
}

/// Substitutes tokens with an explicit clock reading.
pub fn substitute_at(
    template: &str,
    source_filename: &str,
    object_guid: &str,
    incremental: u64,
    now: NaiveDateTime,
) -> String {
    if template.is_empty() {
        return String::new();
    }

    let (stem, extension) = split_extension(source_filename);

    template
        .replace("{source_filename}", stem)
        .replace("{source_extension}", extension)
        .replace("{date}", &now.format("%Y-%m-%d").to_string())
        .replace("{time}", &now.format("%I-%M-%S").to_string())
        .replace("{guid}", object_guid)
        .replace("{incremental}", &incremental.to_string())
}

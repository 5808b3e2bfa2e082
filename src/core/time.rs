use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub(crate) fn format_offset(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

/// `MM:SS` of the absolute value, two digits each; minutes grow past 99 when needed.
pub(crate) fn format_clock(seconds: i64) -> String {
    let total = seconds.unsigned_abs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// `M:SS` as shown in the submit confirmation dialog.
pub(crate) fn format_short_clock(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let total = seconds.unsigned_abs();
    format!("{sign}{}:{:02}", total / 60, total % 60)
}

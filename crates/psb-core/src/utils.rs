use chrono::{DateTime, Utc};

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for records/telemetry).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

/// Commit message for a subscription update made at `now`.
pub fn commit_message(now: DateTime<Utc>) -> String {
    format!(
        "Update subscription files - {}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().nth(max).is_some() {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn commit_message_uses_utc_timestamp() {
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            commit_message(t),
            "Update subscription files - 2026-03-04 05:06:07 UTC"
        );
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 2), "hé…");
    }
}

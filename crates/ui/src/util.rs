#![forbid(unsafe_code)]

use chrono::{DateTime, Local, Utc};

use provdash_core::{InstanceStatus, PlaybookStatus};

use crate::model::SyncNote;

/// Compact "how long ago" rendering for table cells: recent ages collapse
/// to a relative string, anything older than a day shows the calendar date.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - then).num_seconds();
    if diff < 60 {
        "Just now".to_string()
    } else if diff < 3600 {
        format!("{}m ago", diff / 60)
    } else if diff < 86400 {
        format!("{}h ago", diff / 3600)
    } else {
        then.with_timezone(&Local).format("%Y-%m-%d").to_string()
    }
}

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(t) => relative_time(t, Utc::now()),
        None => "N/A".to_string(),
    }
}

/// Wall-clock time for the sync indicator.
pub fn clock(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%H:%M:%S").to_string()
}

pub fn sync_indicator(note: &SyncNote) -> String {
    match note {
        SyncNote::Updated(at) => format!("Last updated: {}", clock(*at)),
        SyncNote::Failed(at) => format!("Last update failed: {}", clock(*at)),
    }
}

/// Glyph for an instance's overall status, for text frontends.
pub fn status_glyph(status: InstanceStatus) -> &'static str {
    match status {
        InstanceStatus::New => "+",
        InstanceStatus::Provisioning => "~",
        InstanceStatus::Provisioned => "✓",
        InstanceStatus::Failed => "✗",
        InstanceStatus::PartialFailure => "!",
        InstanceStatus::Retrying => "↻",
        InstanceStatus::Skipped => "»",
        InstanceStatus::Orphaned => "?",
        InstanceStatus::Unknown => "·",
    }
}

/// Glyph for one playbook run; the log viewer marks failed-to-fetch tabs
/// with "⚠" regardless of run status.
pub fn playbook_glyph(status: PlaybookStatus) -> &'static str {
    match status {
        PlaybookStatus::Pending => "…",
        PlaybookStatus::Running => "~",
        PlaybookStatus::Success => "✓",
        PlaybookStatus::Failed => "✗",
        PlaybookStatus::Timeout => "⌛",
        PlaybookStatus::Unknown => "·",
    }
}

/// Glyph shown on a tab header: the error marker wins over run status.
pub fn tab_glyph(status: PlaybookStatus, error: bool) -> &'static str {
    if error {
        "⚠"
    } else {
        playbook_glyph(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs_ago: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        (now - chrono::Duration::seconds(secs_ago), now)
    }

    #[test]
    fn under_a_minute_is_just_now() {
        let (then, now) = at(59);
        assert_eq!(relative_time(then, now), "Just now");
    }

    #[test]
    fn minutes_from_sixty_one_seconds() {
        let (then, now) = at(61);
        assert_eq!(relative_time(then, now), "1m ago");
    }

    #[test]
    fn hours_past_the_hour_boundary() {
        let (then, now) = at(3601);
        assert_eq!(relative_time(then, now), "1h ago");
    }

    #[test]
    fn older_than_a_day_is_a_calendar_date() {
        let (then, now) = at(90001);
        let rendered = relative_time(then, now);
        assert!(!rendered.contains("ago"));
        assert_eq!(rendered, then.with_timezone(&Local).format("%Y-%m-%d").to_string());
    }

    #[test]
    fn missing_timestamps_render_na() {
        assert_eq!(format_timestamp(None), "N/A");
    }

    #[test]
    fn error_marker_wins_on_tab_glyphs() {
        assert_eq!(tab_glyph(PlaybookStatus::Success, false), "✓");
        assert_eq!(tab_glyph(PlaybookStatus::Success, true), "⚠");
    }
}

//! Display helpers for timer values.

/// Phase countdown as `mm:ss`.
pub fn format_countdown(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Study time as `h:mm:ss` once past an hour, `m:ss` before that.
pub fn format_elapsed(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_pads_minutes_and_seconds() {
        assert_eq!(format_countdown(1500), "25:00");
        assert_eq!(format_countdown(300), "05:00");
        assert_eq!(format_countdown(9), "00:09");
        assert_eq!(format_countdown(0), "00:00");
    }

    #[test]
    fn elapsed_switches_to_hours() {
        assert_eq!(format_elapsed(0), "0:00");
        assert_eq!(format_elapsed(59), "0:59");
        assert_eq!(format_elapsed(754), "12:34");
        assert_eq!(format_elapsed(3600), "1:00:00");
        assert_eq!(format_elapsed(7384), "2:03:04");
    }
}

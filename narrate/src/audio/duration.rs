//! Human-readable durations.

/// Format whole seconds as `"{h}h {m}m {s}s"`, `"{m}m {s}s"` or `"{s}s"`.
///
/// Larger units are left out only while they are zero.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

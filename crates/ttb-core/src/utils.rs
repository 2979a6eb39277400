use std::time::Duration;

// ============== Time Helpers ==============

/// `"1d 2h 3m 4s"`; zero-valued leading units are skipped, seconds always shown.
pub fn format_uptime(uptime: Option<Duration>) -> String {
    let Some(uptime) = uptime else {
        return "N/A".to_string();
    };
    let total = uptime.as_secs();
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (mins, secs) = (rem / 60, rem % 60);

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if mins > 0 {
        parts.push(format!("{mins}m"));
    }
    parts.push(format!("{secs}s"));
    parts.join(" ")
}

/// Wall-clock timestamp for console output.
pub fn local_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

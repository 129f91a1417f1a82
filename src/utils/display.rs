use chrono::{DateTime, Utc};

/// Time since `since` as "HH:MM:SS"; hours are not wrapped
pub fn format_elapsed(since: DateTime<Utc>) -> String {
    let secs = Utc::now()
        .signed_duration_since(since)
        .num_seconds()
        .unsigned_abs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// One-line preview of a command batch for logs, e.g.
/// "router bgp 65001; no bgp default ipv4-unicast (+2 more)"
pub fn summarize_commands(commands: &[String], limit: usize) -> String {
    let shown = commands.len().min(limit);
    let mut summary = commands[..shown].join("; ");
    if commands.len() > shown {
        summary.push_str(&format!(" (+{} more)", commands.len() - shown));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cmds(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_elapsed() {
        let then = Utc::now() - Duration::seconds(3725);
        let formatted = format_elapsed(then);
        // A slow runner may cross a second boundary
        assert!(formatted == "01:02:05" || formatted == "01:02:06");
        assert_eq!(format_elapsed(Utc::now() + Duration::seconds(61)).len(), 8);
    }

    #[test]
    fn test_summarize_commands() {
        let batch = cmds(&["router bgp 65001", "no bgp default ipv4-unicast", "bgp router-id 1.1.1.1"]);
        assert_eq!(
            summarize_commands(&batch, 2),
            "router bgp 65001; no bgp default ipv4-unicast (+1 more)"
        );
        assert_eq!(summarize_commands(&batch[..1], 2), "router bgp 65001");
        assert_eq!(summarize_commands(&[], 2), "");
    }
}

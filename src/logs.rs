//! Reading back the bot's own log files for `dubber logs`

use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::Result;

pub const LOG_FILE_PREFIX: &str = "dubber.log";

/// Only the tail of the file is considered
const SCAN_WINDOW: usize = 1000;

/// Lines about dubbing jobs, the vendor, and anything that went wrong
const INTERESTING: &[&str] = &[
    "driver.rs",
    "murf.rs",
    "pipeline.rs",
    "publisher.rs",
    "ERROR",
    "WARN",
    "dubbing job",
    "Dub ",
];

/// `.dubber/log` under the working directory
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(std::env::current_dir()?.join(".dubber").join("log"))
}

/// Newest rolled log file in `dir`, by modification time
pub fn latest_log_file<P: AsRef<Path>>(dir: P) -> Option<PathBuf> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in WalkDir::new(dir.as_ref()).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || !entry.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX) {
            continue;
        }

        let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
            Some(modified) => modified,
            None => continue,
        };

        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path().to_path_buf()));
        }
    }

    newest.map(|(_, path)| path)
}

/// Leading RFC 3339 timestamp written by the file layer
fn line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let token = line.split_whitespace().next()?;
    DateTime::parse_from_rfc3339(token).ok().map(|t| t.with_timezone(&Utc))
}

/// Pick the lines worth showing: the last `max_lines` interesting lines among
/// the recent tail, optionally limited to the last `since_mins` minutes.
/// Falls back to the plain tail when nothing interesting is there.
pub fn filter_log(content: &str, max_lines: usize, since_mins: Option<i64>, now: DateTime<Utc>) -> Vec<String> {
    let lines: Vec<&str> = content.lines().collect();
    let tail = &lines[lines.len().saturating_sub(SCAN_WINDOW)..];

    let cutoff = since_mins.map(|mins| now - Duration::minutes(mins));
    let recent: Vec<&str> = tail
        .iter()
        .copied()
        .filter(|line| !line.trim().is_empty())
        // Continuation lines carry no timestamp and stay with their entry
        .filter(|line| match (cutoff, line_timestamp(line)) {
            (Some(cutoff), Some(at)) => at >= cutoff,
            _ => true,
        })
        .collect();

    let interesting: Vec<&str> = recent
        .iter()
        .copied()
        .filter(|line| INTERESTING.iter().any(|k| line.contains(k)))
        .collect();
    let chosen = if interesting.is_empty() { recent } else { interesting };

    chosen[chosen.len().saturating_sub(max_lines)..]
        .iter()
        .map(|line| line.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    const LOG: &str = "\
2026-10-16T10:00:00.000001Z  INFO ThreadId(01) src/main.rs:383: Logging initialized
2026-10-16T10:00:01.000001Z  INFO ThreadId(02) src/dubbing/driver.rs:80: Created dubbing job job-1
2026-10-16T11:50:00.000001Z  INFO ThreadId(02) src/source.rs:60: Fetched 3 mentions

2026-10-16T11:55:00.000001Z  WARN ThreadId(02) src/dubbing/murf.rs:120: Status check failed
2026-10-16T11:58:00.000001Z  INFO ThreadId(02) src/pipeline.rs:154: Dub ready: https://cdn/x.mp4
";

    #[test]
    fn test_filter_keeps_dubbing_lines() {
        let lines = filter_log(LOG, 200, None, now());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("job-1"));
        assert!(lines[2].contains("Dub ready"));
    }

    #[test]
    fn test_filter_since_and_limit() {
        let lines = filter_log(LOG, 200, Some(30), now());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Status check failed"));

        let lines = filter_log(LOG, 1, None, now());
        assert_eq!(lines, vec![LOG.lines().last().unwrap().to_string()]);
    }

    #[test]
    fn test_filter_falls_back_to_tail() {
        let quiet = "2026-10-16T11:59:00Z  INFO ThreadId(01) src/main.rs:383: Logging initialized\n";
        let lines = filter_log(quiet, 200, Some(5), now());
        assert_eq!(lines.len(), 1);

        assert!(filter_log("", 200, None, now()).is_empty());
    }

    #[test]
    fn test_latest_log_file_picks_newest_rolled_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let older = temp.child("dubber.log.2026-10-15");
        older.write_str("old").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let newer = temp.child("dubber.log.2026-10-16");
        newer.write_str("new").unwrap();
        temp.child("notes.txt").write_str("not a log").unwrap();

        assert_eq!(latest_log_file(temp.path()), Some(newer.path().to_path_buf()));
        temp.close().unwrap();
    }

    #[test]
    fn test_latest_log_file_missing_dir() {
        assert_eq!(latest_log_file("/nonexistent/dubber/log"), None);
    }
}

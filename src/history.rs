use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::remote::Remote;
use crate::suggest::RepoContext;

/// One accepted switch, appended to `usage.jsonl`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub identity_id: String,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub at: DateTime<Utc>,
}

impl UsageEvent {
    pub fn new(identity_id: &str, context: &RepoContext, at: DateTime<Utc>) -> Self {
        UsageEvent {
            identity_id: identity_id.to_string(),
            remote_url: context.remote_url.clone().filter(|u| !u.trim().is_empty()),
            path: Some(context.path.clone()).filter(|p| !p.trim().is_empty()),
            at,
        }
    }

    /// Same remote owner (`host/owner`) or the same local path
    pub fn is_similar_to(&self, context: &RepoContext) -> bool {
        let same_owner = match (
            self.remote_url.as_deref().and_then(Remote::parse),
            context.remote_url.as_deref().and_then(Remote::parse),
        ) {
            (Some(ours), Some(theirs)) => {
                ours.owner().is_some() && ours.owner_prefix() == theirs.owner_prefix()
            }
            _ => false,
        };

        let same_path = match (&self.path, context.path.trim()) {
            (Some(ours), theirs) if !theirs.is_empty() => ours.trim_end_matches('/') == theirs.trim_end_matches('/'),
            _ => false,
        };

        same_owner || same_path
    }
}

/// Append a usage event to the history log
pub fn append_event(path: &Path, event: &UsageEvent) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open usage history at {}", path.display()))?;

    let line = serde_json::to_string(event)?;
    writeln!(file, "{}", line)?;

    Ok(())
}

/// Keep only the newest `keep` lines once the log holds more than twice
/// that many. Returns whether the file was rewritten.
pub fn compact(path: &Path, keep: usize) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read usage history at {}", path.display()))?;
    let lines: Vec<&str> = contents.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.len() <= keep.saturating_mul(2) {
        return Ok(false);
    }

    let tail = &lines[lines.len() - keep.min(lines.len())..];
    let tmp = path.with_extension("jsonl.tmp");
    {
        let mut file = fs::File::create(&tmp).context("Failed to write usage history")?;
        for line in tail {
            writeln!(file, "{}", line)?;
        }
    }
    fs::rename(&tmp, path).context("Failed to replace usage history")?;

    tracing::debug!(dropped = lines.len() - tail.len(), kept = tail.len(), "compacted usage history");
    Ok(true)
}

/// Read the last `limit` events; unreadable lines are skipped
pub fn load_recent(path: &Path, limit: usize) -> Result<Vec<UsageEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read usage history at {}", path.display()))?;

    let mut events: Vec<UsageEvent> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("skipping malformed usage history line: {}", e);
                None
            }
        })
        .collect();

    if events.len() > limit {
        events.drain(..events.len() - limit);
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx(url: Option<&str>, path: &str) -> RepoContext {
        RepoContext::new(url.map(str::to_string), path)
    }

    #[test]
    fn append_then_load_keeps_the_tail() {
        let td = tempfile::tempdir().expect("tmpdir");
        let log = td.path().join("nested").join("usage.jsonl");
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        for i in 0..5 {
            let event = UsageEvent::new(&format!("id-{i}"), &ctx(None, "/tmp/x"), at);
            append_event(&log, &event).expect("append");
        }
        fs::OpenOptions::new()
            .append(true)
            .open(&log)
            .and_then(|mut f| writeln!(f, "{{not json"))
            .expect("write garbage");

        let events = load_recent(&log, 3).expect("load");
        let ids: Vec<&str> = events.iter().map(|e| e.identity_id.as_str()).collect();
        assert_eq!(ids, vec!["id-2", "id-3", "id-4"]);
    }

    #[test]
    fn compaction_waits_for_twice_the_limit_then_keeps_the_tail() {
        let td = tempfile::tempdir().expect("tmpdir");
        let log = td.path().join("usage.jsonl");
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        for i in 0..6 {
            append_event(&log, &UsageEvent::new(&format!("id-{i}"), &ctx(None, "/tmp/x"), at)).expect("append");
        }
        assert!(!compact(&log, 3).expect("compact"));
        assert_eq!(fs::read_to_string(&log).expect("read").lines().count(), 6);

        append_event(&log, &UsageEvent::new("id-6", &ctx(None, "/tmp/x"), at)).expect("append");
        assert!(compact(&log, 3).expect("compact"));
        assert!(!log.with_extension("jsonl.tmp").exists());

        let events = load_recent(&log, 100).expect("load");
        let ids: Vec<&str> = events.iter().map(|e| e.identity_id.as_str()).collect();
        assert_eq!(ids, vec!["id-4", "id-5", "id-6"]);

        assert!(!compact(&td.path().join("absent.jsonl"), 3).expect("compact"));
    }

    #[test]
    fn missing_log_is_empty() {
        let td = tempfile::tempdir().expect("tmpdir");
        let events = load_recent(&td.path().join("absent.jsonl"), 10).expect("load");
        assert!(events.is_empty());
    }

    #[test]
    fn similarity_uses_owner_or_path() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let event = UsageEvent::new(
            "work",
            &ctx(Some("git@github.com:acme-corp/api.git"), "/home/me/work/api"),
            at,
        );

        assert!(event.is_similar_to(&ctx(Some("https://github.com/acme-corp/web"), "/elsewhere")));
        assert!(event.is_similar_to(&ctx(None, "/home/me/work/api/")));
        assert!(!event.is_similar_to(&ctx(Some("https://github.com/other/api"), "/home/me/other")));
        assert!(!event.is_similar_to(&ctx(None, "")));
    }
}

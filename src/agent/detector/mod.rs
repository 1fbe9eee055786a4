mod claude;
mod codex;
mod cursor;
mod gemini;
mod opencode;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::agent::{AgentStatus, AgentType};
use crate::cache::{KeyedTtlCache, LruCache};
use crate::config::RuntimeConfig;

/// The significant record role found while walking a session log
/// backwards (spec §4.6 slow path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignificantRole {
    User,
    Assistant,
}

impl SignificantRole {
    pub fn to_status(self) -> AgentStatus {
        match self {
            SignificantRole::User => AgentStatus::Active,
            SignificantRole::Assistant => AgentStatus::Waiting,
        }
    }
}

/// Per-(sessions_dir, worktree) codex "best matching file" cache and the
/// per-file size/mtime -> cwd cache it depends on (spec §4.6). Held by
/// the caller (typically alongside the `TmuxAdapter`) and threaded
/// through every codex detection call so the 5s/LRU windows persist
/// across polls.
pub struct CodexCaches {
    pub best_path: KeyedTtlCache<(String, String), String>,
    pub file_cwd: LruCache<String, (u64, u64, String)>,
}

impl CodexCaches {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            best_path: KeyedTtlCache::new(config.codex_best_path_cache_ttl),
            file_cwd: LruCache::new(config.codex_cwd_cache_capacity),
        }
    }
}

/// Dispatch to the per-agent-type detector. Returns `None` when the
/// caller should keep the prior status (spec's `ok=false`).
pub fn detect_status(
    agent_type: AgentType,
    worktree_path: &Path,
    config: &RuntimeConfig,
    codex_caches: &CodexCaches,
) -> Option<AgentStatus> {
    match agent_type {
        AgentType::Claude => claude::detect(worktree_path, config),
        AgentType::Codex => codex::detect(worktree_path, config, codex_caches),
        AgentType::Gemini => gemini::detect(worktree_path, config),
        AgentType::OpenCode => opencode::detect(worktree_path, config),
        AgentType::Cursor => cursor::detect(),
        AgentType::None | AgentType::Custom | AgentType::Shell => None,
    }
}

/// True when `mtime` falls within `threshold` of now.
pub(super) fn is_fresh(mtime: SystemTime, threshold: Duration) -> bool {
    SystemTime::now()
        .duration_since(mtime)
        .map(|age| age <= threshold)
        .unwrap_or(true) // clock skew into the future counts as fresh
}

pub(super) fn mtime_of(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Read the last `max_bytes` of `path`, dropping a partial first line
/// when the read did not start at byte 0 (spec §4.6 slow path).
pub(super) fn read_tail(path: &Path, max_bytes: u64) -> Option<String> {
    let mut file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    if len == 0 {
        return None;
    }
    let start = len.saturating_sub(max_bytes);
    file.seek(SeekFrom::Start(start)).ok()?;
    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf).ok()?;
    let mut text = String::from_utf8_lossy(&buf).into_owned();
    if start > 0 {
        if let Some(idx) = text.find('\n') {
            text = text.split_off(idx + 1);
        } else {
            return None;
        }
    }
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Walk a JSONL string from the last line to the first, calling
/// `classify` on each parsed record. Returns the first significant
/// role found, or `None` if every record was insignificant (spec's
/// "abandoned candidate" case).
pub(super) fn last_significant_role_jsonl(
    tail: &str,
    classify: impl Fn(&serde_json::Value) -> Option<SignificantRole>,
) -> Option<SignificantRole> {
    tail.lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line.trim()).ok())
        .find_map(|value| classify(&value))
}

pub(super) fn home_dir() -> Option<std::path::PathBuf> {
    dirs::home_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn freshness_respects_threshold() {
        let threshold = Duration::from_secs(30);
        assert!(is_fresh(SystemTime::now(), threshold));
        let old = SystemTime::now() - Duration::from_secs(120);
        assert!(!is_fresh(old, threshold));
    }

    #[test]
    fn read_tail_drops_partial_first_line() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "{{\"type\":\"user\"}}").unwrap();
        writeln!(f, "{{\"type\":\"assistant\"}}").unwrap();
        let tail = read_tail(f.path(), 10).unwrap();
        // Seeked mid-second-line; the partial prefix must be dropped.
        assert!(!tail.contains("user"));
    }

    #[test]
    fn read_tail_full_file_when_small() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "hello").unwrap();
        let tail = read_tail(f.path(), 4096).unwrap();
        assert_eq!(tail.trim(), "hello");
    }

    #[test]
    fn last_significant_role_skips_unrecognized_kinds() {
        let tail = "{\"type\":\"file-history-snapshot\"}\n{\"type\":\"assistant\"}\n";
        let role = last_significant_role_jsonl(tail, |v| match v["type"].as_str() {
            Some("user") => Some(SignificantRole::User),
            Some("assistant") => Some(SignificantRole::Assistant),
            _ => None,
        });
        assert_eq!(role, Some(SignificantRole::Assistant));
    }

    #[test]
    fn last_significant_role_none_when_all_insignificant() {
        let tail = "{\"type\":\"file-history-snapshot\"}\n";
        let role = last_significant_role_jsonl(tail, |v| match v["type"].as_str() {
            Some("user") => Some(SignificantRole::User),
            Some("assistant") => Some(SignificantRole::Assistant),
            _ => None,
        });
        assert_eq!(role, None);
    }
}

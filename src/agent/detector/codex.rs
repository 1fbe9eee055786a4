use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::agent::AgentStatus;
use crate::config::RuntimeConfig;

use super::{home_dir, is_fresh, last_significant_role_jsonl, mtime_of, read_tail, CodexCaches, SignificantRole};

fn sessions_dir() -> Option<PathBuf> {
    Some(home_dir()?.join(".codex").join("sessions"))
}

/// Recursively collect `rollout-*.jsonl` files under the YYYY/MM/DD
/// session tree.
fn walk_rollouts(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("rollout-") && n.ends_with(".jsonl"))
            {
                out.push(path);
            }
        }
    }
    out
}

fn mtime_secs(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Extract `payload.cwd` from a rollout file's first `session_meta`
/// line, using the per-file `(size, mtime) -> cwd` cache keyed by path
/// (spec §4.6).
fn cwd_of(path: &Path, cache: &crate::cache::LruCache<String, (u64, u64, String)>) -> Option<String> {
    let metadata = std::fs::metadata(path).ok()?;
    let size = metadata.len();
    let mtime = mtime_secs(metadata.modified().ok()?);
    let key = path.to_string_lossy().into_owned();

    if let Some((cached_size, cached_mtime, cwd)) = cache.get(&key) {
        if cached_size == size && cached_mtime == mtime {
            return Some(cwd);
        }
    }

    let file = std::fs::File::open(path).ok()?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line).ok()?;
    let value: serde_json::Value = serde_json::from_str(first_line.trim()).ok()?;
    if value["type"].as_str() != Some("session_meta") {
        return None;
    }
    let cwd = value["payload"]["cwd"].as_str()?.to_string();
    cache.put(key, (size, mtime, cwd.clone()));
    Some(cwd)
}

fn cwd_matches(candidate_cwd: &str, worktree_path: &str) -> bool {
    let cleaned = candidate_cwd.trim_end_matches('/');
    worktree_path == cleaned || worktree_path.starts_with(&format!("{cleaned}/"))
}

fn find_best_path(sessions_dir: &Path, worktree_path: &str, caches: &CodexCaches) -> Option<PathBuf> {
    walk_rollouts(sessions_dir)
        .into_iter()
        .filter(|path| cwd_of(path, &caches.file_cwd).is_some_and(|cwd| cwd_matches(&cwd, worktree_path)))
        .filter_map(|path| mtime_of(&path).map(|m| (path, m)))
        .max_by_key(|(_, m)| *m)
        .map(|(path, _)| path)
}

fn classify(value: &serde_json::Value) -> Option<SignificantRole> {
    if value["type"].as_str() != Some("response_item") {
        return None;
    }
    if value["payload"]["type"].as_str() != Some("message") {
        return None;
    }
    match value["payload"]["role"].as_str() {
        Some("user") => Some(SignificantRole::User),
        Some("assistant") => Some(SignificantRole::Assistant),
        _ => None,
    }
}

pub fn detect(worktree_path: &Path, config: &RuntimeConfig, caches: &CodexCaches) -> Option<AgentStatus> {
    let sessions_dir = sessions_dir()?;
    let worktree_str = worktree_path.to_string_lossy().into_owned();
    let cache_key = (sessions_dir.to_string_lossy().into_owned(), worktree_str.clone());

    let best_path = if let Some(cached) = caches.best_path.get(&cache_key) {
        Some(PathBuf::from(cached))
    } else {
        let found = find_best_path(&sessions_dir, &worktree_str, caches);
        if let Some(path) = &found {
            caches
                .best_path
                .set(cache_key, path.to_string_lossy().into_owned());
        }
        found
    }?;

    let mtime = mtime_of(&best_path)?;
    if is_fresh(mtime, config.activity_threshold) {
        return Some(AgentStatus::Active);
    }

    let tail = read_tail(&best_path, config.session_tail_bytes as u64)?;
    last_significant_role_jsonl(&tail, classify).map(SignificantRole::to_status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cwd_matches_exact_and_descendant() {
        assert!(cwd_matches("/repo", "/repo"));
        assert!(cwd_matches("/repo", "/repo/sub"));
        assert!(!cwd_matches("/repo", "/repository"));
    }

    #[test]
    fn cwd_matches_trailing_slash_in_candidate() {
        assert!(cwd_matches("/repo/", "/repo/sub"));
    }
}

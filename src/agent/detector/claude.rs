use std::path::{Path, PathBuf};

use crate::agent::AgentStatus;
use crate::config::RuntimeConfig;

use super::{home_dir, is_fresh, last_significant_role_jsonl, mtime_of, read_tail, SignificantRole};

/// Encode an absolute path the way Claude Code names its project
/// directory under `~/.claude/projects/`: every non-alphanumeric
/// character except `-` becomes `-`, case and dashes preserved
/// (spec §4.6, testable property `ClaudeProjectDir`).
pub fn project_dir_name(absolute_path: &str) -> String {
    absolute_path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

fn session_root(worktree_path: &Path) -> Option<PathBuf> {
    let home = home_dir()?;
    let encoded = project_dir_name(&worktree_path.to_string_lossy());
    Some(home.join(".claude").join("projects").join(encoded))
}

/// Candidate main session files, most recently modified first, with
/// `agent-*.jsonl` sub-agent files excluded (those only ever live
/// under a session's `subagents/` directory).
fn candidates(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("jsonl"))
        .filter(|p| {
            !p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("agent-"))
        })
        .filter_map(|p| mtime_of(&p).map(|m| (p, m)))
        .collect();
    files.sort_by(|a, b| b.1.cmp(&a.1));
    files.into_iter().map(|(p, _)| p).collect()
}

fn any_subagent_fresh(root: &Path, session_uuid: &str, threshold: std::time::Duration) -> bool {
    let dir = root.join(session_uuid).join("subagents");
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return false;
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("agent-") && n.ends_with(".jsonl"))
        })
        .filter_map(|p| mtime_of(&p))
        .any(|mtime| is_fresh(mtime, threshold))
}

fn classify(value: &serde_json::Value) -> Option<SignificantRole> {
    match value["type"].as_str() {
        Some("user") => Some(SignificantRole::User),
        Some("assistant") => Some(SignificantRole::Assistant),
        _ => None,
    }
}

pub fn detect(worktree_path: &Path, config: &RuntimeConfig) -> Option<AgentStatus> {
    let root = session_root(worktree_path)?;
    for file in candidates(&root) {
        let mtime = mtime_of(&file)?;
        if is_fresh(mtime, config.activity_threshold) {
            return Some(AgentStatus::Active);
        }

        let session_uuid = file.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if any_subagent_fresh(&root, session_uuid, config.activity_threshold) {
            return Some(AgentStatus::Active);
        }

        let Some(tail) = read_tail(&file, config.session_tail_bytes as u64) else {
            continue;
        };
        if let Some(role) = last_significant_role_jsonl(&tail, classify) {
            return Some(role.to_status());
        }
        // Abandoned candidate (e.g. only file-history-snapshot records);
        // fall through to the next one.
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_non_alphanumeric_runs_individually() {
        assert_eq!(
            project_dir_name("/Users/foo/zenleap_scratch/sidecar"),
            "-Users-foo-zenleap-scratch-sidecar"
        );
    }

    #[test]
    fn preserves_case_and_existing_dashes() {
        assert_eq!(project_dir_name("/A-b/C"), "-A-b-C");
    }
}

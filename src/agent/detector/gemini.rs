use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::agent::AgentStatus;
use crate::config::RuntimeConfig;

use super::{home_dir, is_fresh, mtime_of};

fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

fn chats_dir(worktree_path: &Path) -> Option<PathBuf> {
    let home = home_dir()?;
    let digest = sha256_hex(&worktree_path.to_string_lossy());
    Some(home.join(".gemini").join("tmp").join(digest).join("chats"))
}

/// Most recently modified `session-*.json` file in the chats directory.
fn latest_session_file(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("session-") && n.ends_with(".json"))
        })
        .filter_map(|p| mtime_of(&p).map(|m| (p, m)))
        .max_by_key(|(_, m)| *m)
        .map(|(p, _)| p)
}

fn status_from_messages(value: &serde_json::Value) -> Option<AgentStatus> {
    let messages = value["messages"].as_array()?;
    messages.iter().rev().find_map(|message| match message["type"].as_str() {
        Some("user") => Some(AgentStatus::Active),
        Some("gemini") => Some(AgentStatus::Waiting),
        _ => None,
    })
}

pub fn detect(worktree_path: &Path, config: &RuntimeConfig) -> Option<AgentStatus> {
    let dir = chats_dir(worktree_path)?;
    let file = latest_session_file(&dir)?;

    let mtime = mtime_of(&file)?;
    if is_fresh(mtime, config.activity_threshold) {
        return Some(AgentStatus::Active);
    }

    let contents = std::fs::read_to_string(&file).ok()?;
    if contents.trim().is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&contents).ok()?;
    status_from_messages(&value)
}

use std::path::{Path, PathBuf};

use crate::agent::AgentStatus;
use crate::config::RuntimeConfig;

use super::{home_dir, is_fresh, mtime_of};

/// Resolve the platform-dependent opencode storage root (spec §4.6),
/// falling back to the Linux XDG default when no platform-specific
/// directory is found.
fn storage_root() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        return home_dir().map(|h| {
            h.join("Library")
                .join("Application Support")
                .join("opencode")
                .join("storage")
        });
    }
    if cfg!(target_os = "windows") {
        if let Some(local_appdata) = std::env::var_os("LOCALAPPDATA") {
            return Some(PathBuf::from(local_appdata).join("opencode").join("Data").join("storage"));
        }
    }
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        return Some(PathBuf::from(xdg).join("opencode").join("storage"));
    }
    home_dir().map(|h| h.join(".local").join("share").join("opencode").join("storage"))
}

fn most_recent_json(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .filter_map(|p| mtime_of(&p).map(|m| (p, m)))
        .max_by_key(|(_, m)| *m)
        .map(|(p, _)| p)
}

fn project_id_for_worktree(root: &Path, worktree_path: &str) -> Option<String> {
    let project_dir = root.join("project");
    let entries = std::fs::read_dir(&project_dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .find(|p| {
            std::fs::read_to_string(p)
                .ok()
                .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
                .is_some_and(|value| value["worktree"].as_str() == Some(worktree_path))
        })
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
}

fn role_of(path: &Path) -> Option<AgentStatus> {
    let text = std::fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&text).ok()?;
    match value["role"].as_str() {
        Some("user") => Some(AgentStatus::Active),
        Some("assistant") => Some(AgentStatus::Waiting),
        _ => None,
    }
}

pub fn detect(worktree_path: &Path, config: &RuntimeConfig) -> Option<AgentStatus> {
    let root = storage_root()?;
    let worktree_str = worktree_path.to_string_lossy();
    let project_id = project_id_for_worktree(&root, &worktree_str)?;

    let session_dir = root.join("session").join(&project_id);
    let session_file = most_recent_json(&session_dir)?;
    let session_id = session_file.file_stem()?.to_string_lossy().into_owned();

    let message_dir = root.join("message").join(&session_id);
    let message_file = most_recent_json(&message_dir)?;

    let mtime = mtime_of(&message_file)?;
    if is_fresh(mtime, config.activity_threshold) {
        return Some(AgentStatus::Active);
    }

    role_of(&message_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_root_resolves_to_something_on_this_platform() {
        // Only asserts the resolver does not panic and yields a path;
        // actual location is platform-dependent.
        let _ = storage_root();
    }
}

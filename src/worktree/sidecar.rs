//! Per-worktree sidecar files (spec §6): single-line markers the core
//! writes alongside a worktree and reads back on `Refresh` so the
//! worktree's task link, chosen agent, and PR URL survive a restart.

use std::path::{Path, PathBuf};

use crate::agent::AgentType;

pub const TD_ROOT: &str = ".td-root";
pub const TASK: &str = ".sidecar-task";
pub const AGENT: &str = ".sidecar-agent";
pub const PR: &str = ".sidecar-pr";
pub const BASE_BRANCH: &str = ".sidecar-base-branch";

/// The sidecar fields recoverable from disk for a given worktree path.
#[derive(Debug, Clone, Default)]
pub struct SidecarData {
    pub main_repo_root: Option<PathBuf>,
    pub task_id: Option<String>,
    pub agent_type: Option<AgentType>,
    pub pr_url: Option<String>,
    pub base_branch: Option<String>,
}

fn read_line(worktree_path: &Path, file_name: &str) -> Option<String> {
    let contents = std::fs::read_to_string(worktree_path.join(file_name)).ok()?;
    let line = contents.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Read whatever sidecar files are present. Missing files are not an
/// error — a worktree created outside the core simply has none.
pub fn read(worktree_path: &Path) -> SidecarData {
    SidecarData {
        main_repo_root: read_line(worktree_path, TD_ROOT).map(PathBuf::from),
        task_id: read_line(worktree_path, TASK),
        agent_type: read_line(worktree_path, AGENT).and_then(|v| AgentType::from_sidecar_value(&v)),
        pr_url: read_line(worktree_path, PR),
        base_branch: read_line(worktree_path, BASE_BRANCH),
    }
}

fn write_line(worktree_path: &Path, file_name: &str, value: &str) -> std::io::Result<()> {
    std::fs::write(worktree_path.join(file_name), format!("{value}\n"))
}

pub fn write_td_root(worktree_path: &Path, main_repo_root: &Path) -> std::io::Result<()> {
    write_line(worktree_path, TD_ROOT, &main_repo_root.to_string_lossy())
}

pub fn write_task(worktree_path: &Path, task_id: &str) -> std::io::Result<()> {
    write_line(worktree_path, TASK, task_id)
}

pub fn write_agent(worktree_path: &Path, agent_type: AgentType) -> std::io::Result<()> {
    match agent_type.sidecar_value() {
        Some(value) => write_line(worktree_path, AGENT, value),
        None => Ok(()),
    }
}

pub fn write_pr(worktree_path: &Path, pr_url: &str) -> std::io::Result<()> {
    write_line(worktree_path, PR, pr_url)
}

/// Records `BaseBranch` at creation time so a later `Refresh` can
/// recompute `Stats` against it without re-discovering it (spec §3;
/// SPEC_FULL.md §4.1 supplement).
pub fn write_base_branch(worktree_path: &Path, base_branch: &str) -> std::io::Result<()> {
    write_line(worktree_path, BASE_BRANCH, base_branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_all_five_files() {
        let dir = tempdir().unwrap();
        write_td_root(dir.path(), Path::new("/repo")).unwrap();
        write_task(dir.path(), "TASK-1").unwrap();
        write_agent(dir.path(), AgentType::Claude).unwrap();
        write_pr(dir.path(), "https://example.com/pr/1").unwrap();
        write_base_branch(dir.path(), "main").unwrap();

        let data = read(dir.path());
        assert_eq!(data.main_repo_root, Some(PathBuf::from("/repo")));
        assert_eq!(data.task_id, Some("TASK-1".to_string()));
        assert_eq!(data.agent_type, Some(AgentType::Claude));
        assert_eq!(data.pr_url, Some("https://example.com/pr/1".to_string()));
        assert_eq!(data.base_branch, Some("main".to_string()));
    }

    #[test]
    fn missing_files_read_as_none() {
        let dir = tempdir().unwrap();
        let data = read(dir.path());
        assert!(data.main_repo_root.is_none());
        assert!(data.task_id.is_none());
        assert!(data.agent_type.is_none());
        assert!(data.pr_url.is_none());
        assert!(data.base_branch.is_none());
    }

    #[test]
    fn write_agent_none_writes_nothing() {
        let dir = tempdir().unwrap();
        write_agent(dir.path(), AgentType::None).unwrap();
        assert!(!dir.path().join(AGENT).exists());
    }
}

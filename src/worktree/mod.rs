pub mod branch;
pub mod registry;
pub mod sidecar;

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::agent::{Agent, AgentStatus, AgentType};

pub use registry::{parse_porcelain, PorcelainEntry, PostCreateSetup, WorktreeRegistry};

/// Line/ahead/behind summary for a worktree relative to its base
/// branch (spec §3 Worktree `Stats`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorktreeStats {
    pub additions: u32,
    pub deletions: u32,
    pub files: u32,
    pub ahead: u32,
    pub behind: u32,
}

/// A secondary git checkout the core manages (spec §3 Worktree). Unique
/// by `name`.
#[derive(Debug)]
pub struct Worktree {
    pub name: String,
    pub path: PathBuf,
    pub branch: String,
    pub base_branch: String,
    pub task_id: Option<String>,
    pub task_title: Option<String>,
    pub pr_url: Option<String>,
    pub chosen_agent_type: AgentType,
    pub agent: Option<Agent>,
    pub status: AgentStatus,
    pub stats: Option<WorktreeStats>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Session file present, multiplexer session absent (spec §3).
    pub is_orphaned: bool,
    /// `true` for the primary checkout. `Refresh` never returns one of
    /// these (spec §4.1); set by the caller for the synthetic entry
    /// representing the main checkout in the sidebar, if it needs one.
    pub is_main: bool,
}

impl Worktree {
    /// The tmux session name the registry assigns this worktree (spec
    /// §3 invariant: `sidecar-wt-<sanitized-name>`).
    pub fn tmux_name(&self) -> String {
        crate::naming::worktree_tmux_name(&self.name)
    }
}

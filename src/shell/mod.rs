pub mod manifest;
pub mod registry;
pub mod watcher;

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::agent::{Agent, AgentType};

pub use manifest::{ManifestEntry, ShellManifest};
pub use registry::ShellRegistry;
pub use watcher::ManifestWatcher;

static DEFAULT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Shell \d+$").expect("valid regex"));

/// `true` when `name` matches the auto-generated `Shell <n>` pattern
/// (spec §4.2 "Default-name detection"). Such names may be replaced
/// freely by a later explicit rename; any other name is preserved
/// across restarts.
pub fn is_default_name(name: &str) -> bool {
    DEFAULT_NAME.is_match(name)
}

/// A tmux session not tied to any git worktree (spec §3 ShellSession).
/// Unique by `tmux_name`.
#[derive(Debug)]
pub struct ShellSession {
    pub name: String,
    pub tmux_name: String,
    pub agent: Option<Agent>,
    pub created_at: DateTime<Utc>,
    /// May be `None` for a plain shell (spec §3).
    pub chosen_agent: Option<AgentType>,
    pub skip_perms: bool,
    /// Manifest entry present, multiplexer session absent (spec §3
    /// lifecycle: "destroyed explicitly or when the multiplexer
    /// session disappears, converting them to orphans").
    pub is_orphaned: bool,
}

impl ShellSession {
    fn from_entry(entry: &ManifestEntry, is_orphaned: bool) -> Self {
        Self {
            name: entry.name.clone(),
            tmux_name: entry.tmux_name.clone(),
            agent: None,
            created_at: entry.created_at,
            chosen_agent: entry.chosen_agent_type(),
            skip_perms: entry.skip_perms,
            is_orphaned,
        }
    }

    fn to_entry(&self) -> ManifestEntry {
        ManifestEntry {
            tmux_name: self.tmux_name.clone(),
            name: self.name.clone(),
            chosen_agent: self.chosen_agent.and_then(AgentType::sidecar_value).map(String::from),
            skip_perms: self.skip_perms,
            created_at: self.created_at,
        }
    }
}

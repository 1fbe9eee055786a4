//! Shell manifest persistence (spec §4.2, §6): `.sidecar/shells.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentType;
use crate::error::CoreError;

const MANIFEST_VERSION: u32 = 1;

/// One persisted shell identity. `chosen_agent` round-trips through the
/// same sidecar-value strings the worktree agent-type files use (spec
/// §3 `AgentType.sidecar_value`), so the manifest and `.sidecar-agent`
/// stay textually consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub tmux_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_agent: Option<String>,
    #[serde(default)]
    pub skip_perms: bool,
    #[serde(rename = "created_at_rfc3339")]
    pub created_at: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn chosen_agent_type(&self) -> Option<AgentType> {
        self.chosen_agent.as_deref().and_then(AgentType::from_sidecar_value)
    }
}

/// `{ "version": 1, "shells": [...] }` (spec §4.2). A missing or
/// unparseable manifest is equivalent to empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellManifest {
    pub version: u32,
    pub shells: Vec<ManifestEntry>,
}

impl Default for ShellManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            shells: Vec::new(),
        }
    }
}

impl ShellManifest {
    pub fn manifest_path(project_root: &Path) -> PathBuf {
        project_root.join(".sidecar").join("shells.json")
    }

    /// Missing or unparseable manifest is equivalent to empty (spec
    /// §4.2, §7 `ManifestCorrupt`). Readers retry once on parse error
    /// per §5, but a second failure still falls back to empty rather
    /// than propagating — the caller always gets a usable manifest.
    pub fn load(path: &Path) -> ShellManifest {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return ShellManifest::default(),
        };
        Self::parse(&text).unwrap_or_else(|| {
            // Retry once: a watcher can observe a half-written file.
            std::thread::sleep(std::time::Duration::from_millis(20));
            std::fs::read_to_string(path)
                .ok()
                .and_then(|text| Self::parse(&text))
                .unwrap_or_else(|| {
                    tracing::warn!(path = %path.display(), "shell manifest corrupt, falling back to empty");
                    ShellManifest::default()
                })
        })
    }

    fn parse(text: &str) -> Option<ShellManifest> {
        serde_json::from_str(text).ok()
    }

    /// Atomic write: write to a temp file in the same directory, then
    /// rename over the destination (spec §4.2, §5).
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| CoreError::ManifestCorrupt(e.to_string()))?;

        let body =
            serde_json::to_string_pretty(self).map_err(|e| CoreError::ManifestCorrupt(e.to_string()))?;

        let tmp_path = dir.join(format!(
            ".shells.json.{}.tmp",
            std::process::id()
        ));
        std::fs::write(&tmp_path, body).map_err(|e| CoreError::ManifestCorrupt(e.to_string()))?;
        std::fs::rename(&tmp_path, path).map_err(|e| CoreError::ManifestCorrupt(e.to_string()))?;
        Ok(())
    }

    pub fn find(&self, tmux_name: &str) -> Option<&ManifestEntry> {
        self.shells.iter().find(|e| e.tmux_name == tmux_name)
    }

    pub fn upsert(&mut self, entry: ManifestEntry) {
        match self.shells.iter_mut().find(|e| e.tmux_name == entry.tmux_name) {
            Some(existing) => *existing = entry,
            None => self.shells.push(entry),
        }
    }

    pub fn remove(&mut self, tmux_name: &str) {
        self.shells.retain(|e| e.tmux_name != tmux_name);
    }

    /// Lowest free positive integer suffix among `sidecar-sh-<project>-<N>`
    /// entries (spec §4.2 `CreateShell`).
    pub fn lowest_free_index(&self, project_prefix: &str) -> u32 {
        let used: std::collections::HashSet<u32> = self
            .shells
            .iter()
            .filter_map(|e| e.tmux_name.strip_prefix(project_prefix))
            .filter_map(|suffix| suffix.parse::<u32>().ok())
            .collect();
        let mut n = 1;
        while used.contains(&n) {
            n += 1;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(tmux_name: &str) -> ManifestEntry {
        ManifestEntry {
            tmux_name: tmux_name.to_string(),
            name: "Shell 1".to_string(),
            chosen_agent: None,
            skip_perms: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_manifest_is_empty() {
        let dir = tempdir().unwrap();
        let manifest = ShellManifest::load(&dir.path().join("absent.json"));
        assert!(manifest.shells.is_empty());
        assert_eq!(manifest.version, MANIFEST_VERSION);
    }

    #[test]
    fn unparseable_manifest_falls_back_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shells.json");
        std::fs::write(&path, "not json").unwrap();
        let manifest = ShellManifest::load(&path);
        assert!(manifest.shells.is_empty());
    }

    #[test]
    fn save_then_load_round_trips_insertion_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".sidecar").join("shells.json");
        let mut manifest = ShellManifest::default();
        manifest.upsert(entry("sidecar-sh-proj-1"));
        manifest.upsert(entry("sidecar-sh-proj-2"));
        manifest.save(&path).unwrap();

        let loaded = ShellManifest::load(&path);
        assert_eq!(loaded.shells.len(), 2);
        assert_eq!(loaded.shells[0].tmux_name, "sidecar-sh-proj-1");
        assert_eq!(loaded.shells[1].tmux_name, "sidecar-sh-proj-2");
    }

    #[test]
    fn upsert_replaces_existing_entry_by_tmux_name() {
        let mut manifest = ShellManifest::default();
        manifest.upsert(entry("sidecar-sh-proj-1"));
        let mut renamed = entry("sidecar-sh-proj-1");
        renamed.name = "Renamed".to_string();
        manifest.upsert(renamed);
        assert_eq!(manifest.shells.len(), 1);
        assert_eq!(manifest.shells[0].name, "Renamed");
    }

    #[test]
    fn lowest_free_index_fills_gaps() {
        let mut manifest = ShellManifest::default();
        manifest.upsert(entry("sidecar-sh-proj-1"));
        manifest.upsert(entry("sidecar-sh-proj-3"));
        assert_eq!(manifest.lowest_free_index("sidecar-sh-proj-"), 2);
    }

    #[test]
    fn lowest_free_index_on_empty_manifest_is_one() {
        let manifest = ShellManifest::default();
        assert_eq!(manifest.lowest_free_index("sidecar-sh-proj-"), 1);
    }

    #[test]
    fn chosen_agent_type_round_trips() {
        let mut e = entry("sidecar-sh-proj-1");
        e.chosen_agent = Some("claude".to_string());
        assert_eq!(e.chosen_agent_type(), Some(AgentType::Claude));
    }

    #[test]
    fn remove_drops_entry() {
        let mut manifest = ShellManifest::default();
        manifest.upsert(entry("sidecar-sh-proj-1"));
        manifest.remove("sidecar-sh-proj-1");
        assert!(manifest.shells.is_empty());
    }
}

//! Shell discovery, creation, rename and destruction (spec §4.2, C2).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::agent::AgentType;
use crate::error::{CoreError, CoreResult};
use crate::naming;
use crate::tmux::{KillOutcome, TmuxAdapter};

use super::manifest::{ManifestEntry, ShellManifest};
use super::{is_default_name, ShellSession};

/// Holds the authoritative in-memory shell list plus the manifest that
/// backs it across restarts and instances (spec §4.2 C2).
pub struct ShellRegistry {
    project_root: PathBuf,
    project_prefix: String,
    manifest_path: PathBuf,
    tmux: Arc<TmuxAdapter>,
    sessions: Vec<ShellSession>,
}

impl ShellRegistry {
    pub fn new(project_root: impl Into<PathBuf>, tmux: Arc<TmuxAdapter>) -> Self {
        let project_root = project_root.into();
        let project_name = project_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project");
        let project_prefix = format!("sidecar-sh-{}-", naming::tmux_safe(project_name));
        let manifest_path = ShellManifest::manifest_path(&project_root);
        Self {
            project_root,
            project_prefix,
            manifest_path,
            tmux,
            sessions: Vec::new(),
        }
    }

    pub fn sessions(&self) -> &[ShellSession] {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut [ShellSession] {
        &mut self.sessions
    }

    /// `InitShellSessions()` (spec §4.2): read the manifest, reconcile
    /// each entry against live tmux sessions, and rebuild the
    /// in-memory list. An entry whose session is gone is kept but
    /// marked orphaned rather than dropped, matching the lifecycle
    /// note in spec §3 ("destroyed explicitly or when the multiplexer
    /// session disappears, converting them to orphans") — see
    /// DESIGN.md for why this core never silently drops a manifest
    /// entry.
    pub fn init_shell_sessions(&mut self) {
        let manifest = ShellManifest::load(&self.manifest_path);
        self.sessions = manifest
            .shells
            .iter()
            .map(|entry| {
                let alive = self.tmux.session_exists(&entry.tmux_name);
                ShellSession::from_entry(entry, !alive)
            })
            .collect();
    }

    fn save_manifest(&self) -> CoreResult<()> {
        let manifest = ShellManifest {
            version: 1,
            shells: self.sessions.iter().map(ShellSession::to_entry).collect(),
        };
        manifest.save(&self.manifest_path)
    }

    /// `CreateShell(name, chosenAgent, skipPerms)` (spec §4.2).
    /// `name` defaults to `Shell <n>` (the same index used for the
    /// tmux name) when not given.
    pub fn create_shell(
        &mut self,
        name: Option<&str>,
        chosen_agent: Option<AgentType>,
        skip_perms: bool,
    ) -> CoreResult<&ShellSession> {
        let manifest = ShellManifest::load(&self.manifest_path);
        let n = manifest.lowest_free_index(&self.project_prefix);
        let tmux_name = format!("{}{}", self.project_prefix, n);
        let display_name = name.map(str::to_string).unwrap_or_else(|| format!("Shell {n}"));

        self.tmux
            .new_session(&tmux_name, &self.project_root.to_string_lossy())
            .map_err(|e| CoreError::GitFailed(e.to_string()))?;

        let session = ShellSession {
            name: display_name,
            tmux_name: tmux_name.clone(),
            agent: None,
            created_at: Utc::now(),
            chosen_agent,
            skip_perms,
            is_orphaned: false,
        };
        self.sessions.push(session);
        self.save_manifest()?;
        Ok(self.sessions.last().expect("just pushed"))
    }

    /// `RenameShell(tmuxName, newName)` (spec §4.2): validates
    /// non-empty, non-whitespace-only, and unique case-insensitively
    /// across current shells.
    pub fn rename_shell(&mut self, tmux_name: &str, new_name: &str) -> CoreResult<()> {
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return Err(CoreError::NameInvalid { suggestion: None });
        }
        let collides = self
            .sessions
            .iter()
            .any(|s| s.tmux_name != tmux_name && s.name.eq_ignore_ascii_case(trimmed));
        if collides {
            return Err(CoreError::NameInvalid { suggestion: None });
        }

        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.tmux_name == tmux_name)
            .ok_or_else(|| CoreError::SessionNotFound(tmux_name.to_string()))?;
        session.name = trimmed.to_string();
        self.save_manifest()
    }

    /// `DeleteShell(tmuxName)` (spec §4.2): kills the tmux session
    /// (ignoring not-found), removes the manifest entry, and removes
    /// the in-memory entry. Poller cancellation is the caller's
    /// responsibility via the poll scheduler's generation token (spec
    /// §4.5), since this registry has no scheduler handle.
    pub fn delete_shell(&mut self, tmux_name: &str) -> CoreResult<()> {
        match self.tmux.kill_session(tmux_name) {
            Ok(KillOutcome::Killed) | Ok(KillOutcome::NotFound) => {}
            Err(e) => return Err(CoreError::GitFailed(e.to_string())),
        }
        self.sessions.retain(|s| s.tmux_name != tmux_name);
        self.save_manifest()
    }

    /// Merge the on-disk manifest into the in-memory list by
    /// `TmuxName` (spec §4.2 Watcher consumer contract). Entries added
    /// by another instance appear; entries removed elsewhere drop
    /// here too, unless this instance still sees a live session for
    /// them (rare race between the watcher firing and a concurrent
    /// delete).
    ///
    /// Name conflicts are resolved with `is_default_name` (spec §4.2
    /// "Default-name detection"): an explicit local name survives a
    /// stale `Shell <n>` default still sitting on disk, but otherwise
    /// the manifest's name wins, since it's the more recent write for
    /// every other case (a rename by another instance, or this
    /// instance's own already-flushed rename).
    pub fn reload_from_manifest(&mut self) {
        let manifest = ShellManifest::load(&self.manifest_path);
        let mut merged = Vec::with_capacity(manifest.shells.len());
        for entry in &manifest.shells {
            if let Some(existing) = self.sessions.iter().find(|s| s.tmux_name == entry.tmux_name) {
                let name = if !is_default_name(&existing.name) && is_default_name(&entry.name) {
                    existing.name.clone()
                } else {
                    entry.name.clone()
                };
                merged.push(ShellSession {
                    name,
                    tmux_name: entry.tmux_name.clone(),
                    agent: None,
                    created_at: entry.created_at,
                    chosen_agent: entry.chosen_agent_type(),
                    skip_perms: entry.skip_perms,
                    is_orphaned: existing.is_orphaned,
                });
            } else {
                let alive = self.tmux.session_exists(&entry.tmux_name);
                merged.push(ShellSession::from_entry(entry, !alive));
            }
        }
        self.sessions = merged;
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use tempfile::tempdir;

    fn registry(project: &Path) -> ShellRegistry {
        let config = RuntimeConfig::default();
        ShellRegistry::new(project, Arc::new(TmuxAdapter::new(&config)))
    }

    #[test]
    fn init_on_missing_manifest_is_empty() {
        let project = tempdir().unwrap();
        let mut registry = registry(project.path());
        registry.init_shell_sessions();
        assert!(registry.sessions().is_empty());
    }

    #[test]
    fn init_marks_entries_with_dead_sessions_as_orphaned() {
        let project = tempdir().unwrap();
        let manifest_path = ShellManifest::manifest_path(project.path());
        let mut manifest = ShellManifest::default();
        manifest.upsert(ManifestEntry {
            tmux_name: "sidecar-sh-proj-1".into(),
            name: "Shell 1".into(),
            chosen_agent: None,
            skip_perms: false,
            created_at: Utc::now(),
        });
        manifest.save(&manifest_path).unwrap();

        let mut registry = registry(project.path());
        registry.init_shell_sessions();
        assert_eq!(registry.sessions().len(), 1);
        assert!(registry.sessions()[0].is_orphaned);
    }

    #[test]
    fn rename_rejects_empty_and_whitespace() {
        let project = tempdir().unwrap();
        let mut registry = registry(project.path());
        registry.sessions.push(ShellSession {
            name: "Shell 1".into(),
            tmux_name: "sidecar-sh-proj-1".into(),
            agent: None,
            created_at: Utc::now(),
            chosen_agent: None,
            skip_perms: false,
            is_orphaned: false,
        });
        assert!(registry.rename_shell("sidecar-sh-proj-1", "").is_err());
        assert!(registry.rename_shell("sidecar-sh-proj-1", "   ").is_err());
    }

    #[test]
    fn rename_rejects_case_insensitive_collision() {
        let project = tempdir().unwrap();
        let mut registry = registry(project.path());
        registry.sessions.push(ShellSession {
            name: "Work".into(),
            tmux_name: "sidecar-sh-proj-1".into(),
            agent: None,
            created_at: Utc::now(),
            chosen_agent: None,
            skip_perms: false,
            is_orphaned: false,
        });
        registry.sessions.push(ShellSession {
            name: "Scratch".into(),
            tmux_name: "sidecar-sh-proj-2".into(),
            agent: None,
            created_at: Utc::now(),
            chosen_agent: None,
            skip_perms: false,
            is_orphaned: false,
        });
        assert!(registry.rename_shell("sidecar-sh-proj-2", "work").is_err());
    }

    #[test]
    fn rename_missing_session_errors() {
        let project = tempdir().unwrap();
        let mut registry = registry(project.path());
        assert!(registry.rename_shell("sidecar-sh-proj-9", "new").is_err());
    }

    #[test]
    fn reload_preserves_explicit_local_name_over_stale_default_on_disk() {
        let project = tempdir().unwrap();
        let mut registry = registry(project.path());
        registry.sessions.push(ShellSession {
            name: "Scratchpad".into(),
            tmux_name: "sidecar-sh-proj-1".into(),
            agent: None,
            created_at: Utc::now(),
            chosen_agent: None,
            skip_perms: false,
            is_orphaned: false,
        });

        let mut manifest = ShellManifest::default();
        manifest.upsert(ManifestEntry {
            tmux_name: "sidecar-sh-proj-1".into(),
            name: "Shell 1".into(),
            chosen_agent: None,
            skip_perms: false,
            created_at: Utc::now(),
        });
        manifest.save(&registry.manifest_path).unwrap();

        registry.reload_from_manifest();
        assert_eq!(registry.sessions()[0].name, "Scratchpad");
    }

    #[test]
    fn reload_adopts_manifest_rename_over_local_default() {
        let project = tempdir().unwrap();
        let mut registry = registry(project.path());
        registry.sessions.push(ShellSession {
            name: "Shell 1".into(),
            tmux_name: "sidecar-sh-proj-1".into(),
            agent: None,
            created_at: Utc::now(),
            chosen_agent: None,
            skip_perms: false,
            is_orphaned: false,
        });

        let mut manifest = ShellManifest::default();
        manifest.upsert(ManifestEntry {
            tmux_name: "sidecar-sh-proj-1".into(),
            name: "Renamed Elsewhere".into(),
            chosen_agent: None,
            skip_perms: false,
            created_at: Utc::now(),
        });
        manifest.save(&registry.manifest_path).unwrap();

        registry.reload_from_manifest();
        assert_eq!(registry.sessions()[0].name, "Renamed Elsewhere");
    }
}

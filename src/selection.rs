//! Sidebar selection and its cross-restart persistence (spec §4.8, C8).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Which kind of entry is selected, identified by the same key the
/// registries use (`TmuxName` for shells, `Name` for worktrees).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectedEntity {
    Shell(String),
    Worktree(String),
}

/// `{WorkspaceName, ShellTmuxName}` (spec §6): the per-project
/// key/value an external state store persists. At most one of the two
/// fields is set, matching `SelectedEntity`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSelection {
    pub workspace_name: Option<String>,
    pub shell_tmux_name: Option<String>,
}

impl PersistedSelection {
    fn from_entity(entity: &SelectedEntity) -> Self {
        match entity {
            SelectedEntity::Shell(tmux_name) => PersistedSelection {
                workspace_name: None,
                shell_tmux_name: Some(tmux_name.clone()),
            },
            SelectedEntity::Worktree(name) => PersistedSelection {
                workspace_name: Some(name.clone()),
                shell_tmux_name: None,
            },
        }
    }
}

/// Per-project state store (spec §6): `Get(projectRoot) ->
/// {WorkspaceName, ShellTmuxName}`, `Set(projectRoot, state)`. The
/// core depends on this abstractly — an embedding application may
/// supply its own implementation backed by whatever state store it
/// already owns.
pub trait SelectionStore: Send + Sync {
    fn get(&self, project_root: &Path) -> Option<PersistedSelection>;
    fn set(&self, project_root: &Path, state: &PersistedSelection);
}

/// Default JSON-file-backed implementation, since spec §4.8 describes
/// the store abstractly but the crate must still be usable standalone
/// (see SPEC_FULL.md C8 supplement).
pub struct JsonSelectionStore;

impl JsonSelectionStore {
    fn path(project_root: &Path) -> PathBuf {
        project_root.join(".sidecar").join("selection.json")
    }
}

impl SelectionStore for JsonSelectionStore {
    fn get(&self, project_root: &Path) -> Option<PersistedSelection> {
        let text = std::fs::read_to_string(Self::path(project_root)).ok()?;
        serde_json::from_str(&text).ok()
    }

    fn set(&self, project_root: &Path, state: &PersistedSelection) {
        let path = Self::path(project_root);
        let Some(dir) = path.parent() else { return };
        if std::fs::create_dir_all(dir).is_err() {
            return;
        }
        if let Ok(body) = serde_json::to_string_pretty(state) {
            let _ = std::fs::write(&path, body);
        }
    }
}

/// Side effects the embedding UI must perform whenever the selection
/// changes (spec §4.8): these are all out-of-scope UI concerns, so
/// the core only signals that they are due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionChangeEffects {
    pub clear_scroll_offset: bool,
    pub reenable_auto_scroll: bool,
    pub clear_scroll_base_line_count: bool,
    pub exit_interactive_mode: bool,
}

const SELECTION_CHANGED: SelectionChangeEffects = SelectionChangeEffects {
    clear_scroll_offset: true,
    reenable_auto_scroll: true,
    clear_scroll_base_line_count: true,
    exit_interactive_mode: true,
};

/// Drives the combined shells-then-worktrees list the sidebar presents
/// (spec §4.8). Holds only ordered identity lists; the caller supplies
/// fresh ones on every registry change via [`Selection::sync`].
pub struct Selection {
    shells: Vec<String>,
    worktrees: Vec<String>,
    selected: Option<SelectedEntity>,
}

impl Selection {
    pub fn new() -> Self {
        Self {
            shells: Vec::new(),
            worktrees: Vec::new(),
            selected: None,
        }
    }

    pub fn selected(&self) -> Option<&SelectedEntity> {
        self.selected.as_ref()
    }

    fn combined(&self) -> Vec<SelectedEntity> {
        self.shells
            .iter()
            .cloned()
            .map(SelectedEntity::Shell)
            .chain(self.worktrees.iter().cloned().map(SelectedEntity::Worktree))
            .collect()
    }

    fn index_of(&self, entity: &SelectedEntity) -> Option<usize> {
        self.combined().iter().position(|e| e == entity)
    }

    /// Refresh the ordered identity lists from the live registries.
    /// If the previously selected entity no longer exists, falls back
    /// to the first item in the combined list (or `None` if empty),
    /// without emitting selection-change effects (this is a
    /// reconciliation, not a user-driven move).
    pub fn sync(&mut self, shells: Vec<String>, worktrees: Vec<String>) {
        self.shells = shells;
        self.worktrees = worktrees;

        let still_valid = self
            .selected
            .as_ref()
            .map(|entity| self.index_of(entity).is_some())
            .unwrap_or(false);
        if !still_valid {
            self.selected = self.combined().into_iter().next();
        }
    }

    /// Restore a previously persisted selection on startup (spec
    /// §4.8): "the previous selection is restored if the target still
    /// exists; otherwise the first item is selected."
    pub fn restore(&mut self, persisted: Option<PersistedSelection>) {
        let wanted = persisted.and_then(|p| {
            if let Some(tmux_name) = p.shell_tmux_name {
                Some(SelectedEntity::Shell(tmux_name))
            } else {
                p.workspace_name.map(SelectedEntity::Worktree)
            }
        });

        self.selected = match wanted {
            Some(entity) if self.index_of(&entity).is_some() => Some(entity),
            _ => self.combined().into_iter().next(),
        };
    }

    /// Move the cursor by `delta` (`+1`/`-1`) through the combined
    /// list. Movement at the extremes clamps (spec §4.8); since shells
    /// precede worktrees in the combined list, clamped sequential
    /// movement naturally produces the spec's "moving up from the
    /// first worktree jumps to the last shell" / "moving down from the
    /// last shell jumps to the first worktree" behavior.
    pub fn move_by(&mut self, delta: isize) -> SelectionChangeEffects {
        let combined = self.combined();
        if combined.is_empty() {
            self.selected = None;
            return SELECTION_CHANGED;
        }

        let current = self
            .selected
            .as_ref()
            .and_then(|entity| self.index_of(entity))
            .unwrap_or(0);
        let next = (current as isize + delta).clamp(0, combined.len() as isize - 1) as usize;
        self.selected = Some(combined[next].clone());
        SELECTION_CHANGED
    }

    pub fn select(&mut self, entity: SelectedEntity) -> SelectionChangeEffects {
        self.selected = Some(entity);
        SELECTION_CHANGED
    }

    pub fn to_persisted(&self) -> PersistedSelection {
        self.selected
            .as_ref()
            .map(PersistedSelection::from_entity)
            .unwrap_or_default()
    }

    pub fn persist(&self, store: &dyn SelectionStore, project_root: &Path) {
        store.set(project_root, &self.to_persisted());
    }

    pub fn load(store: &dyn SelectionStore, project_root: &Path) -> Option<PersistedSelection> {
        store.get(project_root)
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::new()
    }
}

/// Surfaced for callers that need to map a `CoreError` onto a
/// persistence failure message without the store itself returning one
/// (the default JSON store treats write failures as best-effort, per
/// spec §7's "never panics, never retries blindly").
pub fn describe_persist_failure(project_root: &Path) -> CoreError {
    CoreError::ManifestCorrupt(format!(
        "could not persist selection under {}",
        project_root.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn selection_with(shells: &[&str], worktrees: &[&str]) -> Selection {
        let mut selection = Selection::new();
        selection.sync(
            shells.iter().map(|s| s.to_string()).collect(),
            worktrees.iter().map(|s| s.to_string()).collect(),
        );
        selection
    }

    #[test]
    fn sync_selects_first_item_when_nothing_selected() {
        let selection = selection_with(&["sh-1"], &["wt-1"]);
        assert_eq!(selection.selected(), Some(&SelectedEntity::Shell("sh-1".into())));
    }

    #[test]
    fn move_up_from_first_worktree_lands_on_last_shell() {
        let mut selection = selection_with(&["sh-1", "sh-2"], &["wt-1", "wt-2"]);
        selection.select(SelectedEntity::Worktree("wt-1".into()));
        selection.move_by(-1);
        assert_eq!(selection.selected(), Some(&SelectedEntity::Shell("sh-2".into())));
    }

    #[test]
    fn move_down_from_last_shell_lands_on_first_worktree() {
        let mut selection = selection_with(&["sh-1", "sh-2"], &["wt-1", "wt-2"]);
        selection.select(SelectedEntity::Shell("sh-2".into()));
        selection.move_by(1);
        assert_eq!(selection.selected(), Some(&SelectedEntity::Worktree("wt-1".into())));
    }

    #[test]
    fn movement_clamps_at_extremes() {
        let mut selection = selection_with(&["sh-1"], &["wt-1"]);
        selection.select(SelectedEntity::Shell("sh-1".into()));
        selection.move_by(-5);
        assert_eq!(selection.selected(), Some(&SelectedEntity::Shell("sh-1".into())));

        selection.select(SelectedEntity::Worktree("wt-1".into()));
        selection.move_by(5);
        assert_eq!(selection.selected(), Some(&SelectedEntity::Worktree("wt-1".into())));
    }

    #[test]
    fn sync_falls_back_to_first_item_when_selected_entity_vanishes() {
        let mut selection = selection_with(&["sh-1"], &["wt-1"]);
        selection.select(SelectedEntity::Worktree("wt-1".into()));
        selection.sync(vec!["sh-1".to_string()], vec![]);
        assert_eq!(selection.selected(), Some(&SelectedEntity::Shell("sh-1".into())));
    }

    #[test]
    fn restore_prefers_persisted_entity_when_it_still_exists() {
        let mut selection = selection_with(&["sh-1"], &["wt-1", "wt-2"]);
        selection.restore(Some(PersistedSelection {
            workspace_name: Some("wt-2".into()),
            shell_tmux_name: None,
        }));
        assert_eq!(selection.selected(), Some(&SelectedEntity::Worktree("wt-2".into())));
    }

    #[test]
    fn restore_falls_back_to_first_item_when_persisted_entity_is_gone() {
        let mut selection = selection_with(&["sh-1"], &["wt-1"]);
        selection.restore(Some(PersistedSelection {
            workspace_name: Some("gone".into()),
            shell_tmux_name: None,
        }));
        assert_eq!(selection.selected(), Some(&SelectedEntity::Shell("sh-1".into())));
    }

    #[test]
    fn json_store_round_trips() {
        let dir = tempdir().unwrap();
        let store = JsonSelectionStore;
        assert!(store.get(dir.path()).is_none());

        let state = PersistedSelection {
            workspace_name: Some("wt-1".into()),
            shell_tmux_name: None,
        };
        store.set(dir.path(), &state);
        assert_eq!(store.get(dir.path()), Some(state));
    }
}

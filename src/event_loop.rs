//! Single-threaded event loop and message router (spec §4.7, C7).
//!
//! Every state mutation funnels through [`EventLoop::handle_message`].
//! Workers (git, tmux subprocess, the manifest watcher, the poll
//! scheduler) run off-thread and hand back [`Message`]s; this is the
//! only place that mutates the worktree list, the shell registry, or
//! the selection. The dispatch shape follows the teacher's `Action`
//! enum routed through a single `match` in its update loop, generalized
//! from UI actions to the message kinds named in spec §4.7.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::error::CoreError;
use crate::message::{Message, TaskDetails};
use crate::scheduler::PollScheduler;
use crate::selection::{PersistedSelection, SelectedEntity, Selection, SelectionStore};
use crate::shell::ShellRegistry;
use crate::tmux::TmuxAdapter;
use crate::worktree::{Worktree, WorktreeRegistry};

/// Byte cap applied to a manually-triggered `PollTick` capture (spec
/// §4.3 `CapturePane(session, maxBytes)`); the adaptive loop in
/// `scheduler::spawn_poll_loop` is given its own cap by the caller, so
/// this only bounds the message-driven path handled here.
const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Everything the single logical thread owns (spec §5). Constructed
/// once per project and driven by repeatedly calling
/// [`handle_message`](Self::handle_message) as workers report in.
pub struct EventLoop {
    project_root: PathBuf,
    worktrees: Vec<Worktree>,
    worktree_registry: WorktreeRegistry,
    shell_registry: ShellRegistry,
    scheduler: Arc<PollScheduler>,
    tmux: Arc<TmuxAdapter>,
    selection: Selection,
    selection_store: Box<dyn SelectionStore>,
    config: RuntimeConfig,

    /// Errors recorded against a specific entity rather than
    /// terminating the loop (spec §7). Keyed by worktree/shell name.
    create_errors: HashMap<String, CoreError>,
    delete_warnings: HashMap<String, Vec<String>>,
    push_errors: HashMap<String, CoreError>,
    last_create_error: Option<CoreError>,
}

impl EventLoop {
    pub fn new(
        project_root: impl Into<PathBuf>,
        tmux: Arc<TmuxAdapter>,
        selection_store: Box<dyn SelectionStore>,
        config: RuntimeConfig,
    ) -> Self {
        let project_root = project_root.into();
        let worktree_registry = WorktreeRegistry::new(&project_root);
        let shell_registry = ShellRegistry::new(&project_root, Arc::clone(&tmux));
        Self {
            project_root,
            worktrees: Vec::new(),
            worktree_registry,
            shell_registry,
            scheduler: Arc::new(PollScheduler::new()),
            tmux,
            selection: Selection::new(),
            selection_store,
            config,
            create_errors: HashMap::new(),
            delete_warnings: HashMap::new(),
            push_errors: HashMap::new(),
            last_create_error: None,
        }
    }

    pub fn worktrees(&self) -> &[Worktree] {
        &self.worktrees
    }

    pub fn shell_registry(&self) -> &ShellRegistry {
        &self.shell_registry
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn scheduler(&self) -> &Arc<PollScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Run `WorktreeRegistry::refresh` synchronously. Callers that
    /// want the git enumeration off the event-loop thread should spawn
    /// this themselves and feed the result back as
    /// `Message::RefreshDone`; exposed directly for simple embedders
    /// (like this crate's own diagnostic binary) that don't need that.
    pub fn refresh_worktrees(&self) -> crate::error::CoreResult<Vec<Worktree>> {
        self.worktree_registry.refresh()
    }

    /// Load the shell manifest and restore the persisted selection.
    /// Call once at startup, before any messages are dispatched.
    pub fn init(&mut self) {
        self.shell_registry.init_shell_sessions();
        let persisted = self.selection_store.get(&self.project_root);
        self.resync_selection_keep_wanted(persisted);
    }

    fn live_session_set(&self, worktrees: &[Worktree]) -> HashSet<String> {
        let mut live = HashSet::new();
        for wt in worktrees {
            if wt.agent.is_some() {
                live.insert(wt.tmux_name());
            }
        }
        for shell in self.shell_registry.sessions() {
            if shell.agent.is_some() {
                live.insert(shell.tmux_name.clone());
            }
        }
        live
    }

    fn resync_selection(&mut self) {
        let shells = self.shell_registry.sessions().iter().map(|s| s.tmux_name.clone()).collect();
        let worktrees = self.worktrees.iter().map(|w| w.name.clone()).collect();
        self.selection.sync(shells, worktrees);
        self.selection.persist(self.selection_store.as_ref(), &self.project_root);
    }

    fn resync_selection_keep_wanted(&mut self, persisted: Option<PersistedSelection>) {
        let shells = self.shell_registry.sessions().iter().map(|s| s.tmux_name.clone()).collect();
        let worktrees = self.worktrees.iter().map(|w| w.name.clone()).collect();
        self.selection.sync(shells, worktrees);
        self.selection.restore(persisted);
    }

    /// Move the sidebar cursor by `delta` (spec §4.8) and persist the
    /// new selection.
    pub fn move_selection(&mut self, delta: isize) {
        self.selection.move_by(delta);
        self.selection.persist(self.selection_store.as_ref(), &self.project_root);
    }

    pub fn select(&mut self, entity: SelectedEntity) {
        self.selection.select(entity);
        self.selection.persist(self.selection_store.as_ref(), &self.project_root);
    }

    /// Dispatch one message, mutating state as §4.7's routing rules
    /// describe. Returns any follow-up messages the caller should feed
    /// back into the loop (e.g. a `ValidateManagedSessionsResult`
    /// produced synchronously in response to a `ValidateManagedSessions`
    /// request).
    pub fn handle_message(&mut self, msg: Message) -> Vec<Message> {
        match msg {
            Message::RefreshDone(result) => {
                self.apply_refresh(result);
                Vec::new()
            }
            Message::CreateDone(result) => {
                self.apply_create(result);
                Vec::new()
            }
            Message::DeleteDone { name, warnings, result } => {
                self.apply_delete(name, warnings, result);
                Vec::new()
            }
            Message::PushDone { name, result } => {
                self.apply_push(name, result);
                Vec::new()
            }
            Message::TaskLinked { name, task_id } => {
                self.apply_task_linked(name, task_id);
                Vec::new()
            }
            Message::TaskDetailsLoaded { name, result } => {
                self.apply_task_details(name, result);
                Vec::new()
            }
            Message::AsyncCaptureResult { session_key, changed } => {
                self.apply_capture_result(&session_key, changed);
                Vec::new()
            }
            Message::AsyncShellCaptureResult { session_key, changed } => {
                self.apply_shell_capture_result(&session_key, changed);
                Vec::new()
            }
            Message::PollTick { session_key, generation } => self.handle_poll_tick(session_key, generation),
            Message::ShellManifestChanged => {
                self.shell_registry.reload_from_manifest();
                self.resync_selection();
                Vec::new()
            }
            Message::ValidateManagedSessions => {
                vec![Message::ValidateManagedSessionsResult(self.validate_managed_sessions())]
            }
            Message::ValidateManagedSessionsResult(stale) => {
                self.apply_stale_sessions(&stale);
                Vec::new()
            }
        }
    }

    fn apply_refresh(&mut self, result: Result<Vec<Worktree>, CoreError>) {
        match result {
            Ok(mut fresh) => {
                for wt in fresh.iter_mut() {
                    if let Some(old) = self.worktrees.iter_mut().find(|w| w.name == wt.name) {
                        wt.agent = old.agent.take();
                        if wt.task_title.is_none() {
                            wt.task_title = old.task_title.take();
                        }
                    }
                }
                let live = self.live_session_set(&fresh);
                self.worktree_registry.reconcile(&mut fresh, &live);
                self.worktrees = fresh;
                self.resync_selection();
            }
            Err(err) => {
                tracing::warn!(%err, "worktree refresh failed");
            }
        }
    }

    fn apply_create(&mut self, result: Result<Worktree, CoreError>) {
        match result {
            Ok(worktree) => {
                self.create_errors.remove(&worktree.name);
                let name = worktree.name.clone();
                self.worktrees.push(worktree);
                self.resync_selection();
                self.select(SelectedEntity::Worktree(name));
            }
            Err(err) => {
                tracing::warn!(%err, "worktree create failed");
                self.last_create_error = Some(err);
            }
        }
    }

    fn apply_delete(&mut self, name: String, warnings: Vec<String>, result: Result<(), CoreError>) {
        if !warnings.is_empty() {
            self.delete_warnings.insert(name.clone(), warnings);
        }
        match result {
            Ok(()) => {
                if let Some(wt) = self.worktrees.iter().find(|w| w.name == name) {
                    let tmux_name = wt.tmux_name();
                    self.scheduler.bump_generation(&tmux_name);
                    if let Err(err) = self.tmux.kill_session(&tmux_name) {
                        tracing::debug!(%err, tmux_name, "kill-session after delete failed, ignoring");
                    }
                }
                self.worktrees.retain(|w| w.name != name);
                self.resync_selection();
            }
            Err(err) => {
                tracing::warn!(%err, name, "worktree delete failed");
            }
        }
    }

    fn apply_push(&mut self, name: String, result: Result<(), CoreError>) {
        match result {
            Ok(()) => {
                self.push_errors.remove(&name);
            }
            Err(err) => {
                tracing::warn!(%err, name, "push failed");
                self.push_errors.insert(name, err);
            }
        }
    }

    fn apply_task_linked(&mut self, name: String, task_id: String) {
        if let Some(wt) = self.worktrees.iter_mut().find(|w| w.name == name) {
            if let Err(err) = crate::worktree::sidecar::write_task(&wt.path, &task_id) {
                tracing::warn!(%err, name, "failed to persist linked task id");
            }
            wt.task_id = Some(task_id);
        }
    }

    fn apply_task_details(&mut self, name: String, result: Result<TaskDetails, CoreError>) {
        match result {
            Ok(details) => {
                if let Some(wt) = self.worktrees.iter_mut().find(|w| w.name == name) {
                    wt.task_title = Some(details.title);
                }
            }
            Err(err) => {
                tracing::debug!(%err, name, "task details load failed");
            }
        }
    }

    fn apply_capture_result(&mut self, session_key: &str, changed: Result<bool, CoreError>) {
        match changed {
            Ok(true) => {
                if let Some(wt) = self.worktrees.iter_mut().find(|w| w.tmux_name() == session_key) {
                    wt.updated_at = chrono::Utc::now();
                }
            }
            Ok(false) => {}
            Err(err) => {
                tracing::debug!(%err, session_key, "capture result reported failure");
            }
        }
    }

    fn apply_shell_capture_result(&mut self, session_key: &str, changed: Result<bool, CoreError>) {
        if let Err(err) = changed {
            tracing::debug!(%err, session_key, "shell capture result reported failure");
        }
    }

    /// `PollTick(sessionKey, generation)` routing (spec §4.7): dropped
    /// if the captured generation is stale; otherwise performs one
    /// synchronous capture-and-update cycle and returns the result as
    /// a follow-up `AsyncCaptureResult`/`AsyncShellCaptureResult`
    /// message, mirroring what the async poll loop in `scheduler`
    /// would have sent.
    fn handle_poll_tick(&mut self, session_key: String, generation: u64) -> Vec<Message> {
        if !self.scheduler.is_current(&session_key, generation) {
            tracing::debug!(session_key, generation, "dropping stale poll tick");
            return Vec::new();
        }

        if let Some(wt) = self.worktrees.iter_mut().find(|w| w.tmux_name() == session_key) {
            if let Some(agent) = wt.agent.as_mut() {
                let outcome = crate::scheduler::poll_tick(
                    &self.tmux,
                    agent,
                    &session_key,
                    MAX_CAPTURE_BYTES,
                    crate::scheduler::Visibility::UnfocusedVisible,
                    &self.config,
                );
                return vec![Message::AsyncCaptureResult {
                    session_key,
                    changed: outcome.changed,
                }];
            }
        }

        if let Some(shell) = self
            .shell_registry
            .sessions_mut()
            .iter_mut()
            .find(|s| s.tmux_name == session_key)
        {
            if let Some(agent) = shell.agent.as_mut() {
                let outcome = crate::scheduler::poll_tick(
                    &self.tmux,
                    agent,
                    &session_key,
                    MAX_CAPTURE_BYTES,
                    crate::scheduler::Visibility::UnfocusedVisible,
                    &self.config,
                );
                return vec![Message::AsyncShellCaptureResult {
                    session_key,
                    changed: outcome.changed,
                }];
            }
        }

        Vec::new()
    }

    /// `ValidateManagedSessions` (spec §4.7): returns the tmux names
    /// the registries expect to be live (any worktree/shell whose
    /// chosen agent type isn't `None`) but which the multiplexer does
    /// not currently have a session for.
    fn validate_managed_sessions(&self) -> Vec<String> {
        let mut stale = Vec::new();
        for wt in &self.worktrees {
            if wt.chosen_agent_type != crate::agent::AgentType::None
                && !self.tmux.session_exists(&wt.tmux_name())
            {
                stale.push(wt.tmux_name());
            }
        }
        for shell in self.shell_registry.sessions() {
            if shell.chosen_agent.is_some() && !self.tmux.session_exists(&shell.tmux_name) {
                stale.push(shell.tmux_name.clone());
            }
        }
        stale
    }

    fn apply_stale_sessions(&mut self, stale: &[String]) {
        for tmux_name in stale {
            if let Some(wt) = self.worktrees.iter_mut().find(|w| w.tmux_name() == *tmux_name) {
                wt.is_orphaned = true;
            }
        }
    }

    pub fn create_error(&self) -> Option<&CoreError> {
        self.last_create_error.as_ref()
    }

    pub fn delete_warnings(&self, name: &str) -> Option<&[String]> {
        self.delete_warnings.get(name).map(Vec::as_slice)
    }

    pub fn push_error(&self, name: &str) -> Option<&CoreError> {
        self.push_errors.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentType};
    use crate::selection::JsonSelectionStore;
    use chrono::Utc;
    use tempfile::tempdir;

    fn event_loop(project: &std::path::Path) -> EventLoop {
        let config = RuntimeConfig::default();
        let tmux = Arc::new(TmuxAdapter::new(&config));
        EventLoop::new(project, tmux, Box::new(JsonSelectionStore), config)
    }

    fn worktree(name: &str) -> Worktree {
        Worktree {
            name: name.to_string(),
            path: PathBuf::from(format!("/tmp/{name}")),
            branch: name.to_string(),
            base_branch: "main".to_string(),
            task_id: None,
            task_title: None,
            pr_url: None,
            chosen_agent_type: AgentType::Claude,
            agent: None,
            status: crate::agent::AgentStatus::Active,
            stats: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_orphaned: false,
            is_main: false,
        }
    }

    #[test]
    fn refresh_done_applies_and_reconciles() {
        let project = tempdir().unwrap();
        let mut ev = event_loop(project.path());
        ev.handle_message(Message::RefreshDone(Ok(vec![worktree("feature")])));
        assert_eq!(ev.worktrees().len(), 1);
        assert!(ev.worktrees()[0].is_orphaned);
    }

    #[test]
    fn refresh_done_preserves_live_agent_across_refresh() {
        let project = tempdir().unwrap();
        let mut ev = event_loop(project.path());
        let mut wt = worktree("feature");
        wt.agent = Some(Agent::new(AgentType::Claude, wt.tmux_name(), 500));
        ev.handle_message(Message::RefreshDone(Ok(vec![wt])));
        assert!(ev.worktrees()[0].agent.is_some());

        ev.handle_message(Message::RefreshDone(Ok(vec![worktree("feature")])));
        assert!(ev.worktrees()[0].agent.is_some(), "agent handle should survive a refresh by name");
    }

    #[test]
    fn delete_done_removes_worktree_and_bumps_generation() {
        let project = tempdir().unwrap();
        let mut ev = event_loop(project.path());
        ev.handle_message(Message::RefreshDone(Ok(vec![worktree("feature")])));
        let tmux_name = ev.worktrees()[0].tmux_name();
        let gen_before = ev.scheduler().register(&tmux_name);

        ev.handle_message(Message::DeleteDone {
            name: "feature".to_string(),
            warnings: vec!["branch busy".to_string()],
            result: Ok(()),
        });

        assert!(ev.worktrees().is_empty());
        assert_ne!(ev.scheduler().current_generation(&tmux_name), gen_before);
        assert_eq!(ev.delete_warnings("feature"), Some(&["branch busy".to_string()][..]));
    }

    #[test]
    fn poll_tick_drops_when_generation_is_stale() {
        let project = tempdir().unwrap();
        let mut ev = event_loop(project.path());
        let mut wt = worktree("feature");
        wt.agent = Some(Agent::new(AgentType::Claude, wt.tmux_name(), 500));
        let tmux_name = wt.tmux_name();
        ev.handle_message(Message::RefreshDone(Ok(vec![wt])));

        let generation = ev.scheduler().register(&tmux_name);
        ev.scheduler().bump_generation(&tmux_name);

        let follow_up = ev.handle_message(Message::PollTick {
            session_key: tmux_name,
            generation,
        });
        assert!(follow_up.is_empty());
    }

    #[test]
    fn create_done_selects_the_new_worktree() {
        let project = tempdir().unwrap();
        let mut ev = event_loop(project.path());
        ev.handle_message(Message::CreateDone(Ok(worktree("feature"))));
        assert_eq!(
            ev.selection().selected(),
            Some(&SelectedEntity::Worktree("feature".to_string()))
        );
    }

    #[test]
    fn create_done_error_is_recorded_without_panicking() {
        let project = tempdir().unwrap();
        let mut ev = event_loop(project.path());
        ev.handle_message(Message::CreateDone(Err(CoreError::PathExists("/tmp/x".into()))));
        assert!(ev.create_error().is_some());
    }

    #[test]
    fn validate_managed_sessions_flags_missing_tmux_session() {
        let project = tempdir().unwrap();
        let mut ev = event_loop(project.path());
        ev.handle_message(Message::RefreshDone(Ok(vec![worktree("feature")])));

        let follow_up = ev.handle_message(Message::ValidateManagedSessions);
        assert_eq!(follow_up.len(), 1);
        let Message::ValidateManagedSessionsResult(stale) = &follow_up[0] else {
            panic!("expected ValidateManagedSessionsResult");
        };
        assert!(stale.contains(&ev.worktrees()[0].tmux_name()));
    }
}

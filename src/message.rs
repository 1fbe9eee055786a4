use crate::error::CoreError;
use crate::worktree::Worktree;

/// Task-tracker details, opaque beyond title/url — the core treats the
/// task tracker as an external collaborator (spec §1 Deliberately out
/// of scope).
#[derive(Debug, Clone)]
pub struct TaskDetails {
    pub title: String,
    pub url: Option<String>,
}

/// Everything a background worker (git, multiplexer subprocess, file
/// watcher, poll scheduler) can hand back to the single-threaded event
/// loop (spec §4.7). Abbreviated to the kinds the core itself emits;
/// UI-only actions stay with the embedding application.
#[derive(Debug)]
pub enum Message {
    RefreshDone(Result<Vec<Worktree>, CoreError>),
    CreateDone(Result<Worktree, CoreError>),
    DeleteDone {
        name: String,
        warnings: Vec<String>,
        result: Result<(), CoreError>,
    },
    PushDone {
        name: String,
        result: Result<(), CoreError>,
    },
    TaskLinked {
        name: String,
        task_id: String,
    },
    TaskDetailsLoaded {
        name: String,
        result: Result<TaskDetails, CoreError>,
    },
    AsyncCaptureResult {
        session_key: String,
        changed: Result<bool, CoreError>,
    },
    AsyncShellCaptureResult {
        session_key: String,
        changed: Result<bool, CoreError>,
    },
    PollTick {
        session_key: String,
        generation: u64,
    },
    ShellManifestChanged,
    ValidateManagedSessions,
    ValidateManagedSessionsResult(Vec<String>),
}

//! Worktree-and-shell manager core: discovers and destroys git
//! worktrees and their tmux sessions, polls live panes into bounded
//! output buffers, classifies agent liveness from on-disk session
//! logs, persists a shell manifest, and threads all of it through a
//! single-threaded event loop (see the module-level docs on
//! [`event_loop::EventLoop`] for the architecture).
//!
//! UI rendering, the merge workflow, and the task-tracker CLI beyond
//! the sidecar file contract are deliberately out of scope — this
//! crate is the core an embedding TUI drives, not the TUI itself.

pub mod agent;
pub mod cache;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod git;
pub mod message;
pub mod naming;
pub mod output;
pub mod scheduler;
pub mod selection;
pub mod shell;
pub mod tmux;
pub mod worktree;

pub use config::RuntimeConfig;
pub use error::{CoreError, CoreResult};
pub use event_loop::EventLoop;

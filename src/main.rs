use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};

use sidecar_core::config::RuntimeConfig;
use sidecar_core::event_loop::EventLoop;
use sidecar_core::message::Message;
use sidecar_core::selection::JsonSelectionStore;
use sidecar_core::tmux::{is_tmux_available, TmuxAdapter};

/// Minimal diagnostic entry point for the core. The TUI that renders
/// the sidebar, preview pane, and modals is an external collaborator
/// (spec §1 Non-goals) and is not implemented here; this binary just
/// drives one `Refresh` through the event loop and prints what the
/// core discovered, useful for smoke-testing a project tree by hand.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sidecar_core=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    if !is_tmux_available() {
        bail!("tmux is not installed or not in PATH");
    }

    let project_root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or(std::env::current_dir()?);

    if !project_root.join(".git").exists() {
        bail!("not a git repository: {}", project_root.display());
    }

    let config = RuntimeConfig::default();
    let tmux = Arc::new(TmuxAdapter::new(&config));
    let mut event_loop = EventLoop::new(&project_root, tmux, Box::new(JsonSelectionStore), config);
    event_loop.init();

    let refresh = event_loop.refresh_worktrees();
    event_loop.handle_message(Message::RefreshDone(refresh));

    println!("project: {}", project_root.display());
    println!("worktrees:");
    for wt in event_loop.worktrees() {
        println!(
            "  {:<20} {:<30} orphaned={} status={:?}",
            wt.name, wt.branch, wt.is_orphaned, wt.status
        );
    }
    println!("shells:");
    for shell in event_loop.shell_registry().sessions() {
        println!("  {:<20} orphaned={}", shell.name, shell.is_orphaned);
    }

    Ok(())
}

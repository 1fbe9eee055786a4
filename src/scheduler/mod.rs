use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::agent::Agent;
use crate::config::RuntimeConfig;
use crate::error::CoreError;
use crate::message::Message;
use crate::tmux::TmuxAdapter;

/// How visible a session's output currently is to the user, which
/// governs the base poll interval before the runaway clamp applies
/// (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    FocusedVisible,
    UnfocusedVisible,
    Hidden,
    /// The user is driving the pane directly; polling is paused.
    Attached,
}

fn base_interval(visibility: Visibility, config: &RuntimeConfig) -> Option<Duration> {
    match visibility {
        Visibility::FocusedVisible => Some(config.poll_interval_focused),
        Visibility::UnfocusedVisible => Some(config.poll_interval_unfocused),
        Visibility::Hidden => Some(config.poll_interval_hidden),
        Visibility::Attached => None,
    }
}

/// Tracks per-session generation counters so a deferred poll message
/// scheduled before a session was removed is dropped on arrival
/// instead of firing against a reaped session (spec §4.5).
#[derive(Default)]
pub struct PollScheduler {
    generations: Mutex<HashMap<String, u64>>,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a session has a generation entry, returning its current
    /// value without changing it.
    pub fn register(&self, session_key: &str) -> u64 {
        *self
            .generations
            .lock()
            .unwrap()
            .entry(session_key.to_string())
            .or_insert(0)
    }

    pub fn current_generation(&self, session_key: &str) -> u64 {
        *self.generations.lock().unwrap().get(session_key).unwrap_or(&0)
    }

    /// Invalidate any poll in flight for this session; called when a
    /// worktree or shell is removed.
    pub fn bump_generation(&self, session_key: &str) -> u64 {
        let mut guard = self.generations.lock().unwrap();
        let entry = guard.entry(session_key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn is_current(&self, session_key: &str, generation: u64) -> bool {
        self.current_generation(session_key) == generation
    }
}

/// Outcome of a single poll, kept separate from the async plumbing so
/// the decision logic is unit-testable without spawning tasks or
/// shelling out to tmux.
pub struct PollOutcome {
    pub changed: Result<bool, CoreError>,
    pub next_interval: Option<Duration>,
}

/// Perform one capture-and-update cycle for `agent`, returning the
/// outcome and the interval to wait before the next poll.
pub fn poll_tick(
    adapter: &TmuxAdapter,
    agent: &mut Agent,
    session_key: &str,
    max_bytes: usize,
    visibility: Visibility,
    config: &RuntimeConfig,
) -> PollOutcome {
    agent.record_poll(std::time::Instant::now());

    let changed = match adapter.capture_pane(&agent.tmux_session, config.capture_scrollback_lines, max_bytes) {
        Ok(raw) => {
            agent.consecutive_capture_failures = 0;
            let changed = agent.output_buf.update(&raw);
            agent.on_capture_result(changed);
            Ok(changed)
        }
        Err(err) => {
            agent.consecutive_capture_failures += 1;
            if agent.consecutive_capture_failures >= 3 {
                agent.status = crate::agent::AgentStatus::Error(err.to_string());
            }
            tracing::debug!(session_key, %err, "capture-pane failed");
            Err(CoreError::CaptureFailed)
        }
    };

    agent.update_governor(config);

    let next_interval = base_interval(visibility, config).map(|base| {
        if agent.polls_throttled {
            base.max(config.poll_interval_throttled)
        } else {
            base
        }
    });

    PollOutcome { changed, next_interval }
}

/// Spawn the adaptive poll loop for one session. Ends when the
/// session's generation is bumped (removal) or visibility resolves to
/// `Attached` and stays there, in which case the loop parks on a coarse
/// recheck interval rather than exiting outright so re-detaching later
/// resumes polling.
pub fn spawn_poll_loop(
    adapter: Arc<TmuxAdapter>,
    agent: Arc<std::sync::Mutex<Agent>>,
    scheduler: Arc<PollScheduler>,
    session_key: String,
    visibility: Arc<dyn Fn() -> Visibility + Send + Sync>,
    config: RuntimeConfig,
    max_bytes: usize,
    tx: mpsc::Sender<Message>,
) {
    let generation = scheduler.register(&session_key);
    tokio::spawn(async move {
        loop {
            if !scheduler.is_current(&session_key, generation) {
                break;
            }

            let vis = visibility();
            let Some(interval) = base_interval(vis, &config) else {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            };
            tokio::time::sleep(interval).await;

            if !scheduler.is_current(&session_key, generation) {
                break;
            }

            let outcome = {
                let adapter = Arc::clone(&adapter);
                let agent = Arc::clone(&agent);
                let session_key = session_key.clone();
                let config = config.clone();
                tokio::task::spawn_blocking(move || {
                    let mut agent = agent.lock().unwrap();
                    poll_tick(&adapter, &mut agent, &session_key, max_bytes, vis, &config)
                })
                .await
            };

            let Ok(outcome) = outcome else { break };
            if tx
                .send(Message::AsyncCaptureResult {
                    session_key: session_key.clone(),
                    changed: outcome.changed,
                })
                .await
                .is_err()
            {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_bump_invalidates_prior_ticks() {
        let scheduler = PollScheduler::new();
        let gen = scheduler.register("wt-1");
        assert!(scheduler.is_current("wt-1", gen));
        scheduler.bump_generation("wt-1");
        assert!(!scheduler.is_current("wt-1", gen));
    }

    #[test]
    fn unregistered_session_defaults_to_generation_zero() {
        let scheduler = PollScheduler::new();
        assert_eq!(scheduler.current_generation("missing"), 0);
    }

    #[test]
    fn attached_visibility_pauses_polling() {
        let config = RuntimeConfig::default();
        assert_eq!(base_interval(Visibility::Attached, &config), None);
        assert!(base_interval(Visibility::Hidden, &config).is_some());
    }

    #[test]
    fn poll_tick_marks_error_after_three_failures() {
        let config = RuntimeConfig::default();
        let adapter = TmuxAdapter::new(&config);
        let mut agent = Agent::new(crate::agent::AgentType::Shell, "definitely-not-a-real-session".into(), 500);
        for _ in 0..3 {
            poll_tick(&adapter, &mut agent, "wt-1", 4096, Visibility::FocusedVisible, &config);
        }
        assert!(matches!(agent.status, crate::agent::AgentStatus::Error(_)));
    }
}

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::output::OutputBuffer;

/// The closed sum of agent kinds the detector knows about, plus `Shell`
/// for a plain (non-agent) tmux session and `Custom` for a user-defined
/// command. Unsupported kinds return `ok = false` from the detector
/// rather than failing (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    None,
    Claude,
    Codex,
    Gemini,
    Cursor,
    OpenCode,
    Custom,
    Shell,
}

impl AgentType {
    pub fn display_name(self) -> &'static str {
        match self {
            AgentType::None => "None",
            AgentType::Claude => "Claude Code",
            AgentType::Codex => "Codex",
            AgentType::Gemini => "Gemini",
            AgentType::Cursor => "Cursor",
            AgentType::OpenCode => "OpenCode",
            AgentType::Custom => "Custom",
            AgentType::Shell => "Shell",
        }
    }

    pub fn command_name(self) -> Option<&'static str> {
        match self {
            AgentType::Claude => Some("claude"),
            AgentType::Codex => Some("codex"),
            AgentType::Gemini => Some("gemini"),
            AgentType::Cursor => Some("cursor"),
            AgentType::OpenCode => Some("opencode"),
            AgentType::None | AgentType::Custom | AgentType::Shell => None,
        }
    }

    /// The flag passed to skip the agent's permission-confirmation
    /// prompts, where one exists.
    pub fn skip_permissions_flag(self) -> Option<&'static str> {
        match self {
            AgentType::Claude => Some("--dangerously-skip-permissions"),
            AgentType::Codex => Some("--dangerously-bypass-approvals-and-sandbox"),
            AgentType::Gemini => Some("--yolo"),
            AgentType::OpenCode => None,
            AgentType::Cursor | AgentType::Custom | AgentType::None | AgentType::Shell => None,
        }
    }

    /// Sidecar-agent value written to `.sidecar-agent` (spec §6), or
    /// `None` when no sidecar file should be written.
    pub fn sidecar_value(self) -> Option<&'static str> {
        match self {
            AgentType::Claude => Some("claude"),
            AgentType::Codex => Some("codex"),
            AgentType::Gemini => Some("gemini"),
            AgentType::Cursor => Some("cursor"),
            AgentType::OpenCode => Some("opencode"),
            AgentType::Custom => Some("custom"),
            AgentType::None | AgentType::Shell => None,
        }
    }

    /// Inverse of [`sidecar_value`](Self::sidecar_value), used when
    /// reconstructing a worktree's `ChosenAgentType` from its on-disk
    /// `.sidecar-agent` file. Unknown values map to `None` per spec §9
    /// ("unsupported kinds return `ok=false` rather than failing").
    pub fn from_sidecar_value(value: &str) -> Option<AgentType> {
        match value.trim() {
            "claude" => Some(AgentType::Claude),
            "codex" => Some(AgentType::Codex),
            "gemini" => Some(AgentType::Gemini),
            "cursor" => Some(AgentType::Cursor),
            "opencode" => Some(AgentType::OpenCode),
            "custom" => Some(AgentType::Custom),
            _ => None,
        }
    }
}

/// Liveness verdict for an agent, derived from its on-disk session
/// log (spec §1, §4.6) or explicitly set (e.g. `Paused` while the
/// user has the worktree checked out directly).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    Active,
    Waiting,
    Thinking,
    Done,
    Paused,
    Error(String),
}

/// Runtime handle for a live multiplexer session (spec §3 Agent).
#[derive(Debug)]
pub struct Agent {
    pub agent_type: AgentType,
    pub tmux_session: String,
    pub tmux_pane: Option<String>,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub last_output: DateTime<Utc>,
    pub output_buf: OutputBuffer,
    pub status: AgentStatus,
    pub waiting_for: Option<String>,

    /// Ring of recent poll times, used by the runaway governor (§4.5).
    poll_times: VecDeque<Instant>,
    pub polls_throttled: bool,
    pub unchanged_poll_count: usize,
    /// Consecutive polls whose median inter-arrival fell below the
    /// runaway threshold; three in a row trips `polls_throttled`.
    consecutive_runaway_observations: usize,
    /// Consecutive capture failures; three in a row marks the agent
    /// `Error` (spec §7 `CaptureFailed`).
    pub consecutive_capture_failures: u32,
}

const POLL_HISTORY_SIZE: usize = 10;

impl Agent {
    pub fn new(agent_type: AgentType, tmux_session: String, output_capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            agent_type,
            tmux_session,
            tmux_pane: None,
            pid: None,
            started_at: now,
            last_output: now,
            output_buf: OutputBuffer::new(output_capacity),
            status: AgentStatus::Active,
            waiting_for: None,
            poll_times: VecDeque::with_capacity(POLL_HISTORY_SIZE),
            polls_throttled: false,
            unchanged_poll_count: 0,
            consecutive_runaway_observations: 0,
            consecutive_capture_failures: 0,
        }
    }

    /// Record that a poll happened right now, trimming the ring to
    /// `POLL_HISTORY_SIZE`.
    pub fn record_poll(&mut self, at: Instant) {
        if self.poll_times.len() >= POLL_HISTORY_SIZE {
            self.poll_times.pop_front();
        }
        self.poll_times.push_back(at);
    }

    /// Median inter-arrival time across the recorded poll history, or
    /// `None` if there isn't enough history to compute one.
    pub fn median_inter_arrival(&self) -> Option<std::time::Duration> {
        if self.poll_times.len() < 2 {
            return None;
        }
        let mut deltas: Vec<std::time::Duration> = self
            .poll_times
            .iter()
            .zip(self.poll_times.iter().skip(1))
            .map(|(a, b)| b.saturating_duration_since(*a))
            .collect();
        deltas.sort();
        Some(deltas[deltas.len() / 2])
    }

    pub fn on_capture_result(&mut self, changed: bool) {
        if changed {
            self.unchanged_poll_count = 0;
            self.last_output = Utc::now();
        } else {
            self.unchanged_poll_count += 1;
        }
    }

    /// Re-evaluate the runaway governor after a poll: trips
    /// `polls_throttled` once the median inter-arrival stays below
    /// `runaway_median_threshold` for `runaway_trigger_count` polls in a
    /// row, and releases it once `runaway_release_count` consecutive
    /// polls come back unchanged (spec §4.5).
    pub fn update_governor(&mut self, config: &crate::config::RuntimeConfig) {
        if let Some(median) = self.median_inter_arrival() {
            if median < config.runaway_median_threshold {
                self.consecutive_runaway_observations += 1;
            } else {
                self.consecutive_runaway_observations = 0;
            }
        }

        if self.consecutive_runaway_observations >= config.runaway_trigger_count {
            self.polls_throttled = true;
        }

        if self.polls_throttled && self.unchanged_poll_count >= config.runaway_release_count {
            self.polls_throttled = false;
            self.consecutive_runaway_observations = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn median_inter_arrival_needs_two_samples() {
        let mut agent = Agent::new(AgentType::Shell, "s".into(), 500);
        assert!(agent.median_inter_arrival().is_none());
        agent.record_poll(Instant::now());
        assert!(agent.median_inter_arrival().is_none());
    }

    #[test]
    fn median_inter_arrival_computed() {
        let mut agent = Agent::new(AgentType::Shell, "s".into(), 500);
        let t0 = Instant::now();
        agent.record_poll(t0);
        agent.record_poll(t0 + Duration::from_millis(100));
        agent.record_poll(t0 + Duration::from_millis(250));
        let median = agent.median_inter_arrival().unwrap();
        assert!(median >= Duration::from_millis(100) && median <= Duration::from_millis(150));
    }

    #[test]
    fn governor_throttles_on_sustained_fast_polling() {
        let config = crate::config::RuntimeConfig::default();
        let mut agent = Agent::new(AgentType::Shell, "s".into(), 500);
        let t0 = Instant::now();
        for i in 0..6 {
            agent.record_poll(t0 + Duration::from_millis(i * 50));
            agent.update_governor(&config);
        }
        assert!(agent.polls_throttled);
    }

    #[test]
    fn governor_releases_after_unchanged_run() {
        let config = crate::config::RuntimeConfig::default();
        let mut agent = Agent::new(AgentType::Shell, "s".into(), 500);
        agent.polls_throttled = true;
        for _ in 0..config.runaway_release_count {
            agent.on_capture_result(false);
        }
        agent.update_governor(&config);
        assert!(!agent.polls_throttled);
    }

    #[test]
    fn sidecar_value_round_trips_for_known_kinds() {
        for kind in [
            AgentType::Claude,
            AgentType::Codex,
            AgentType::Gemini,
            AgentType::Cursor,
            AgentType::OpenCode,
            AgentType::Custom,
        ] {
            let value = kind.sidecar_value().unwrap();
            assert_eq!(AgentType::from_sidecar_value(value), Some(kind));
        }
    }

    #[test]
    fn from_sidecar_value_rejects_unknown() {
        assert_eq!(AgentType::from_sidecar_value("not-a-real-agent"), None);
    }

    #[test]
    fn capture_result_tracks_unchanged_count() {
        let mut agent = Agent::new(AgentType::Shell, "s".into(), 500);
        agent.on_capture_result(false);
        agent.on_capture_result(false);
        assert_eq!(agent.unchanged_poll_count, 2);
        agent.on_capture_result(true);
        assert_eq!(agent.unchanged_poll_count, 0);
    }
}

use std::time::Duration;

/// Tunables shared across the scheduler, the output buffer, and the
/// status detector. The embedding application constructs one of these
/// (typically from its own on-disk config) and passes it in explicitly;
/// the core does not own a config file format (see Non-goals, spec §1).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Poll interval when the output tab is visible and focused.
    pub poll_interval_focused: Duration,
    /// Poll interval when visible but unfocused.
    pub poll_interval_unfocused: Duration,
    /// Poll interval when not visible at all.
    pub poll_interval_hidden: Duration,
    /// Clamp applied once a session is judged to be a runaway.
    pub poll_interval_throttled: Duration,
    /// Output buffer line capacity (§3 OutputBuffer).
    pub output_buffer_capacity: usize,
    /// Scrollback lines requested from `tmux capture-pane -S` per poll.
    pub capture_scrollback_lines: usize,
    /// mtime age below which a session-log file counts as "hot" (§4.6).
    pub activity_threshold: Duration,
    /// How many of the most recent poll times the governor remembers.
    pub runaway_history_size: usize,
    /// Median inter-arrival below which a session counts as a runaway.
    pub runaway_median_threshold: Duration,
    /// Consecutive runaway observations required before throttling.
    pub runaway_trigger_count: usize,
    /// Consecutive unchanged polls required before releasing a throttle.
    pub runaway_release_count: usize,
    /// Minimum spacing between successive `ResizePane` calls per session.
    pub resize_throttle: Duration,
    /// TTL for the resolved-pane-id cache.
    pub pane_id_cache_ttl: Duration,
    /// Capacity of the codex (size, mtime) -> cwd LRU cache.
    pub codex_cwd_cache_capacity: usize,
    /// TTL for the codex (sessions_dir, worktree_path) -> best path cache.
    pub codex_best_path_cache_ttl: Duration,
    /// Max bytes read from the tail of a session-log file.
    pub session_tail_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_focused: Duration::from_millis(250),
            poll_interval_unfocused: Duration::from_millis(750),
            poll_interval_hidden: Duration::from_secs(2),
            poll_interval_throttled: Duration::from_secs(1),
            output_buffer_capacity: 500,
            capture_scrollback_lines: 500,
            activity_threshold: Duration::from_secs(30),
            runaway_history_size: 10,
            runaway_median_threshold: Duration::from_millis(150),
            runaway_trigger_count: 3,
            runaway_release_count: 5,
            resize_throttle: Duration::from_millis(250),
            pane_id_cache_ttl: Duration::from_secs(5 * 60),
            codex_cwd_cache_capacity: 2048,
            codex_best_path_cache_ttl: Duration::from_secs(5),
            session_tail_bytes: 2 * 1024 * 1024,
        }
    }
}

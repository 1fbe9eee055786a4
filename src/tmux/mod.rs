use std::process::Command;

use anyhow::{Context, Result};

use crate::cache::KeyedTtlCache;
use crate::config::RuntimeConfig;

/// Outcome of a `KillSession` call, distinguishing "already gone" from
/// a hard failure the caller should surface (spec §4.3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    Killed,
    NotFound,
}

/// The only component in the core that spawns subprocesses against the
/// terminal multiplexer binary. Subprocess wrapping style (Command +
/// `.context` + stderr surfaced on failure) follows the teacher's
/// `TmuxSession`.
pub struct TmuxAdapter {
    pane_id_cache: KeyedTtlCache<String, String>,
    last_resize: KeyedTtlCache<String, ()>,
}

impl TmuxAdapter {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            pane_id_cache: KeyedTtlCache::new(config.pane_id_cache_ttl),
            last_resize: KeyedTtlCache::new(config.resize_throttle),
        }
    }

    pub fn session_exists(&self, session: &str) -> bool {
        Command::new("tmux")
            .args(["has-session", "-t", session])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn new_session(&self, session: &str, cwd: &str) -> Result<()> {
        let output = Command::new("tmux")
            .args(["new-session", "-d", "-s", session, "-c", cwd])
            .output()
            .context("failed to execute tmux new-session")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux new-session failed: {stderr}");
        }
        Ok(())
    }

    pub fn kill_session(&self, session: &str) -> Result<KillOutcome> {
        let output = Command::new("tmux")
            .args(["kill-session", "-t", session])
            .output()
            .context("failed to execute tmux kill-session")?;

        if output.status.success() {
            return Ok(KillOutcome::Killed);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no server running") || stderr.contains("session not found") {
            return Ok(KillOutcome::NotFound);
        }
        anyhow::bail!("tmux kill-session failed: {stderr}");
    }

    /// Resolve the globally-unique pane id (e.g. `%12`) for a session's
    /// sole pane, cached for 5 minutes. A failed lookup evicts any
    /// stale cache entry instead of caching the failure.
    pub fn resolve_pane_id(&self, session: &str) -> Result<String> {
        if let Some(cached) = self.pane_id_cache.get(&session.to_string()) {
            return Ok(cached);
        }

        let output = Command::new("tmux")
            .args(["list-panes", "-t", session, "-F", "#{pane_id}"])
            .output()
            .context("failed to execute tmux list-panes")?;

        if !output.status.success() {
            self.pane_id_cache.evict(&session.to_string());
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux list-panes failed: {stderr}");
        }

        let pane_id = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        if pane_id.is_empty() {
            self.pane_id_cache.evict(&session.to_string());
            anyhow::bail!("tmux list-panes returned no pane for {session}");
        }

        self.pane_id_cache.set(session.to_string(), pane_id.clone());
        Ok(pane_id)
    }

    /// Capture the pane's visible contents plus `lines` of scrollback,
    /// truncated to `max_bytes` (on a UTF-8 char boundary). Every call
    /// returns a full replacement snapshot, never a diff (spec §4.3
    /// invariant).
    pub fn capture_pane(&self, session: &str, lines: usize, max_bytes: usize) -> Result<String> {
        let scrollback = format!("-{lines}");
        let output = Command::new("tmux")
            .args(["capture-pane", "-t", session, "-p", "-e", "-J", "-S", &scrollback])
            .output()
            .context("failed to execute tmux capture-pane")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux capture-pane failed: {stderr}");
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(truncate_to_char_boundary(&text, max_bytes))
    }

    /// Advisory pane resize, throttled to at most once per
    /// `resize_throttle` per session.
    pub fn resize_pane(&self, session: &str, w: u16, h: u16) -> Result<()> {
        let key = session.to_string();
        if self.last_resize.get(&key).is_some() {
            return Ok(());
        }
        self.last_resize.set(key, ());

        let output = Command::new("tmux")
            .args([
                "resize-window",
                "-t",
                session,
                "-x",
                &w.to_string(),
                "-y",
                &h.to_string(),
            ])
            .output()
            .context("failed to execute tmux resize-window")?;

        if !output.status.success() {
            // Advisory only; never surfaced as a hard error.
            tracing::debug!(session, "tmux resize-window failed, ignoring");
        }
        Ok(())
    }

    /// Send raw bytes without pressing Enter (interactive mode only).
    pub fn send_keys(&self, session: &str, bytes: &str) -> Result<()> {
        let output = Command::new("tmux")
            .args(["send-keys", "-t", session, "-l", bytes])
            .output()
            .context("failed to execute tmux send-keys")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux send-keys failed: {stderr}");
        }
        Ok(())
    }

    /// Send literal text followed by Enter (interactive mode only).
    pub fn send_literal(&self, session: &str, text: &str) -> Result<()> {
        self.send_keys(session, text)?;
        let output = Command::new("tmux")
            .args(["send-keys", "-t", session, "C-m"])
            .output()
            .context("failed to send Enter to tmux")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux send Enter failed: {stderr}");
        }
        Ok(())
    }

    /// Paste via tmux's buffer mechanism rather than `send-keys`, so
    /// large blocks of text are not typed character-by-character
    /// (interactive mode only).
    pub fn paste(&self, session: &str, text: &str) -> Result<()> {
        // `load-buffer -` reads the buffer contents from stdin.
        let mut child = Command::new("tmux")
            .args(["load-buffer", "-"])
            .stdin(std::process::Stdio::piped())
            .spawn()
            .context("failed to spawn tmux load-buffer")?;
        {
            use std::io::Write;
            let stdin = child.stdin.as_mut().context("tmux load-buffer stdin")?;
            stdin.write_all(text.as_bytes())?;
        }
        let status = child.wait().context("tmux load-buffer wait")?;
        if !status.success() {
            anyhow::bail!("tmux load-buffer failed");
        }

        let output = Command::new("tmux")
            .args(["paste-buffer", "-t", session])
            .output()
            .context("failed to execute tmux paste-buffer")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux paste-buffer failed: {stderr}");
        }
        Ok(())
    }
}

fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Check if tmux is available on the system.
pub fn is_tmux_available() -> bool {
    Command::new("tmux")
        .arg("-V")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "a€b"; // € is 3 bytes
        let truncated = truncate_to_char_boundary(s, 2);
        assert!(truncated.len() <= 2);
        assert_eq!(truncated, "a");
    }

    #[test]
    fn truncate_noop_when_under_limit() {
        assert_eq!(truncate_to_char_boundary("short", 100), "short");
    }
}

//! tmux session-name derivation (spec §3 invariants).
//!
//! Session names are shell-safe identifiers tmux is happy with: we
//! fold anything outside `[A-Za-z0-9-_]` to `-` rather than validate
//! and reject, since these names are derived, not user-typed.

/// Replace every byte outside `[A-Za-z0-9-_]` with `-`.
pub fn tmux_safe(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

/// `sidecar-wt-<sanitized-name>` (spec §3 invariant).
pub fn worktree_tmux_name(worktree_name: &str) -> String {
    format!("sidecar-wt-{}", tmux_safe(worktree_name))
}

/// `sidecar-sh-<sanitized-project>-<n>` (spec §3 invariant, §4.2 CreateShell).
pub fn shell_tmux_name(project_name: &str, n: u32) -> String {
    format!("sidecar-sh-{}-{}", tmux_safe(project_name), n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmux_safe_folds_unsafe_chars() {
        assert_eq!(tmux_safe("my project/v1"), "my-project-v1");
    }

    #[test]
    fn worktree_tmux_name_has_prefix() {
        assert_eq!(worktree_tmux_name("feature"), "sidecar-wt-feature");
    }

    #[test]
    fn shell_tmux_name_has_prefix_and_index() {
        assert_eq!(shell_tmux_name("my-proj", 3), "sidecar-sh-my-proj-3");
    }
}

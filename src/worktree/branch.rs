/// `true` when `name` is a valid git branch name under the rules the
/// registry enforces before calling `git worktree add` (spec §4.1).
pub fn validate(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if name.starts_with('.') || name.starts_with('-') {
        return false;
    }
    if name.ends_with('/') || name.ends_with(".lock") {
        return false;
    }
    if name == "@" || name.contains("@{") {
        return false;
    }
    if name.contains("..") || name.contains("//") || name.contains("/.") {
        return false;
    }
    if name.chars().any(|c| {
        matches!(c, '\u{0}'..='\u{1f}' | '\u{7f}')
            || matches!(c, ' ' | '~' | ':' | '?' | '*' | '[' | '\\' | '^')
    }) {
        return false;
    }
    true
}

/// Transform an arbitrary string into a valid branch name, best-effort.
/// The result is not guaranteed non-empty (a fully degenerate input
/// sanitises to empty, per the testable property in spec §8).
///
/// `@` is a special case preserved from the source behavior (spec §9
/// Open Questions): a name that sanitizes to exactly `@` becomes `at`,
/// but a leading `@` on an otherwise-ordinary name (`@foo`) is just
/// trimmed as leading noise, same as a leading `.` or `-`. Any `@{`
/// reflog-syntax substring is deleted outright (not just folded to a
/// dash) so sanitized output can never resurrect the one substring
/// `Validate` rejects on sight.
pub fn sanitize(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            ' ' | '_' => '-',
            c if c.is_control() => '\u{0}',
            '~' | ':' | '?' | '*' | '[' | '\\' | '^' => '-',
            c => c,
        })
        .filter(|&c| c != '\u{0}')
        .collect();

    let mut s = replaced;
    if let Some(stripped) = s.strip_suffix(".lock") {
        s = stripped.to_string();
    }

    loop {
        let collapsed = collapse_once(&s);
        if collapsed == s {
            break;
        }
        s = collapsed;
    }

    if s == "@" {
        return "at".to_string();
    }

    let trimmed_start = s.trim_start_matches(['.', '-', '@']);
    let trimmed = trimmed_start.trim_end_matches(['/', '-']);
    trimmed.to_string()
}

fn collapse_once(s: &str) -> String {
    let mut out = s.to_string();
    for (pat, repl) in [
        ("@{", ""),
        ("..", "."),
        ("//", "/"),
        ("/.", "/"),
        ("--", "-"),
        ("-/", "-"),
        ("/-", "-"),
    ] {
        while out.contains(pat) {
            out = out.replace(pat, repl);
        }
    }
    out
}

/// Derive a branch name from a task id and title: `<taskID>-<sanitized
/// title>`, truncated to 40 characters without splitting a codepoint,
/// trailing `-` removed. Falls back to the bare task id when the
/// sanitized title is empty (spec §4.1).
pub fn derive_from_task(task_id: &str, title: &str) -> String {
    let sanitized_title = sanitize(title);
    if sanitized_title.is_empty() {
        return task_id.to_string();
    }

    let full = format!("{task_id}-{sanitized_title}");
    let truncated: String = full.chars().take(40).collect();
    truncated.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_leading_dot_or_dash() {
        assert!(!validate(".feature"));
        assert!(!validate("-feature"));
    }

    #[test]
    fn rejects_trailing_slash_or_lock() {
        assert!(!validate("feature/"));
        assert!(!validate("feature.lock"));
    }

    #[test]
    fn rejects_double_dot_and_at_brace() {
        assert!(!validate("a..b"));
        assert!(!validate("a@{b"));
        assert!(!validate("@"));
    }

    #[test]
    fn accepts_ordinary_name() {
        assert!(validate("feature/add-widgets"));
        assert!(validate("fix-123"));
    }

    #[test]
    fn sanitize_replaces_spaces_and_underscores() {
        assert_eq!(sanitize("my cool_feature"), "my-cool-feature");
    }

    #[test]
    fn sanitize_collapses_repeated_separators() {
        assert_eq!(sanitize("a//b..c"), "a/b.c");
        assert_eq!(sanitize("a---b"), "a-b");
    }

    #[test]
    fn sanitize_trims_leading_and_trailing_noise() {
        assert_eq!(sanitize(".-weird-/"), "weird");
    }

    #[test]
    fn sanitize_output_is_always_valid_or_empty() {
        for input in ["", "   ", "...", "@{@{", "normal-name", "Mixed_Case Thing"] {
            let cleaned = sanitize(input);
            assert!(cleaned.is_empty() || validate(&cleaned), "sanitize({input:?}) -> {cleaned:?}");
        }
    }

    #[test]
    fn sanitize_strips_reflog_syntax_rather_than_folding_it_to_a_dash() {
        assert_eq!(sanitize("@{@{"), "");
        assert_eq!(sanitize("feature@{upstream}"), "featureupstream}");
    }

    #[test]
    fn derive_from_task_truncates_without_splitting_codepoints() {
        let long_title = "a".repeat(60);
        let branch = derive_from_task("TASK-1", &long_title);
        assert!(branch.chars().count() <= 40);
        assert!(branch.starts_with("TASK-1-"));
    }

    #[test]
    fn derive_from_task_falls_back_to_id_when_title_empty() {
        assert_eq!(derive_from_task("TASK-2", "   "), "TASK-2");
    }

    #[test]
    fn sanitize_collapses_spaced_slash_into_single_dash() {
        assert_eq!(sanitize("My Projects / v1.2"), "My-Projects-v1.2");
    }

    #[test]
    fn sanitize_double_dot_prefix() {
        assert_eq!(sanitize("..feat"), "feat");
    }

    #[test]
    fn sanitize_bare_at_becomes_at() {
        assert_eq!(sanitize("@"), "at");
    }

    #[test]
    fn sanitize_leading_at_is_trimmed_not_spelled_out() {
        assert_eq!(sanitize("@foo"), "foo");
    }

    #[test]
    fn sanitize_lock_suffix() {
        assert_eq!(sanitize("feat.lock"), "feat");
    }
}

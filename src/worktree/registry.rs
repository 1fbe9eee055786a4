//! Worktree discovery, creation and destruction (spec §4.1, C1).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;

use crate::agent::{AgentStatus, AgentType};
use crate::error::{CoreError, CoreResult};
use crate::git::GitSync;

use super::sidecar;
use super::{branch, Worktree};

/// One record out of `git worktree list --porcelain` (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PorcelainEntry {
    pub path: PathBuf,
    pub head: Option<String>,
    pub branch: Option<String>,
    pub detached: bool,
    pub bare: bool,
}

/// Parse `git worktree list --porcelain` output. Records are delimited
/// by blank lines; each starts with a `worktree <path>` line, followed
/// by `HEAD <sha>` and exactly one of `branch refs/heads/<name>`,
/// `detached`, or `bare`.
pub fn parse_porcelain(text: &str) -> Vec<PorcelainEntry> {
    let mut entries = Vec::new();
    let mut current: Option<PorcelainEntry> = None;

    for line in text.lines() {
        if line.is_empty() {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            continue;
        }
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(PorcelainEntry {
                path: PathBuf::from(path),
                head: None,
                branch: None,
                detached: false,
                bare: false,
            });
        } else if let Some(sha) = line.strip_prefix("HEAD ") {
            if let Some(entry) = current.as_mut() {
                entry.head = Some(sha.to_string());
            }
        } else if let Some(reference) = line.strip_prefix("branch ") {
            if let Some(entry) = current.as_mut() {
                entry.branch = Some(
                    reference
                        .strip_prefix("refs/heads/")
                        .unwrap_or(reference)
                        .to_string(),
                );
            }
        } else if line == "detached" {
            if let Some(entry) = current.as_mut() {
                entry.detached = true;
            }
        } else if line == "bare" {
            if let Some(entry) = current.as_mut() {
                entry.bare = true;
            }
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }
    entries
}

/// Files symlinked from the main checkout into every new worktree,
/// after `git worktree add` succeeds (spec §4.1 "post-creation
/// setup"). The setup script itself is not configurable: it is always
/// `.sidecar/post-create.sh` under the project root, run with the new
/// worktree's path as `$1`, if present.
#[derive(Debug, Clone, Default)]
pub struct PostCreateSetup {
    pub symlinks: Vec<String>,
}

const POST_CREATE_SCRIPT: &str = ".sidecar/post-create.sh";

fn run_git(project_root: &Path, args: &[&str]) -> CoreResult<std::process::Output> {
    Command::new("git")
        .args(args)
        .current_dir(project_root)
        .output()
        .map_err(|e| CoreError::GitFailed(e.to_string()))
}

fn stderr_trimmed(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Discovers, creates, and destroys git worktrees (spec §4.1 C1).
/// Holds only the main checkout's path; every operation shells out to
/// `git` fresh, matching how the teacher's git helpers wrap `Command`.
pub struct WorktreeRegistry {
    project_root: PathBuf,
}

impl WorktreeRegistry {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn canonical_root(&self) -> PathBuf {
        self.project_root
            .canonicalize()
            .unwrap_or_else(|_| self.project_root.clone())
    }

    pub fn current_branch(&self) -> CoreResult<String> {
        let output = run_git(&self.project_root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        if !output.status.success() {
            return Err(CoreError::GitFailed(stderr_trimmed(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `Refresh() -> list<Worktree>` (spec §4.1). Returns every
    /// worktree but the main checkout, each with `Status = Paused`
    /// pending the caller's reconciliation pass.
    pub fn refresh(&self) -> CoreResult<Vec<Worktree>> {
        let output = run_git(&self.project_root, &["worktree", "list", "--porcelain"])?;
        if !output.status.success() {
            return Err(CoreError::GitFailed(stderr_trimmed(&output)));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let main = self.canonical_root();
        let now = Utc::now();

        let worktrees = parse_porcelain(&text)
            .into_iter()
            .filter(|entry| !entry.bare)
            .filter(|entry| {
                entry
                    .path
                    .canonicalize()
                    .map(|p| p != main)
                    .unwrap_or(true)
            })
            .map(|entry| {
                let name = entry
                    .path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                let data = sidecar::read(&entry.path);
                let base_branch = data.base_branch.unwrap_or_default();
                let stats = entry
                    .path
                    .to_str()
                    .and_then(|p| GitSync::new(p).stats(&base_branch).ok());
                Worktree {
                    name,
                    path: entry.path,
                    branch: entry.branch.unwrap_or_default(),
                    base_branch,
                    task_id: data.task_id,
                    task_title: None,
                    pr_url: data.pr_url,
                    chosen_agent_type: data.agent_type.unwrap_or(AgentType::None),
                    agent: None,
                    status: AgentStatus::Paused,
                    stats,
                    created_at: now,
                    updated_at: now,
                    is_orphaned: false,
                    is_main: false,
                }
            })
            .collect();

        Ok(worktrees)
    }

    /// `Create(name, baseBranch, taskID, agentType, skipPerms, prompt)`
    /// (spec §4.1). `prompt` is consumed by the embedding UI, not the
    /// core, and is not represented here.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        name: &str,
        base_branch: Option<&str>,
        task_id: Option<&str>,
        task_title: Option<&str>,
        agent_type: AgentType,
        setup: &PostCreateSetup,
    ) -> CoreResult<Worktree> {
        if !branch::validate(name) {
            let suggestion = branch::sanitize(name);
            let suggestion = if suggestion.is_empty() { None } else { Some(suggestion) };
            return Err(CoreError::NameInvalid { suggestion });
        }

        let base = match base_branch {
            Some(b) => b.to_string(),
            None => self.current_branch()?,
        };

        let parent = self.project_root.parent().unwrap_or(&self.project_root);
        let path = parent.join(name);
        if path.exists() {
            return Err(CoreError::PathExists(path.to_string_lossy().into_owned()));
        }

        let output = run_git(
            &self.project_root,
            &[
                "worktree",
                "add",
                "-b",
                name,
                path.to_str().ok_or_else(|| CoreError::GitFailed("non-utf8 path".into()))?,
                &base,
            ],
        )?;
        if !output.status.success() {
            return Err(CoreError::GitFailed(stderr_trimmed(&output)));
        }

        sidecar::write_td_root(&path, &self.canonical_root())
            .map_err(|e| CoreError::SetupFailed(e.to_string()))?;
        if let Some(id) = task_id {
            sidecar::write_task(&path, id).map_err(|e| CoreError::SetupFailed(e.to_string()))?;
        }
        sidecar::write_agent(&path, agent_type).map_err(|e| CoreError::SetupFailed(e.to_string()))?;
        sidecar::write_base_branch(&path, &base).map_err(|e| CoreError::SetupFailed(e.to_string()))?;

        self.run_post_create_setup(&path, setup)?;

        let stats = path.to_str().and_then(|p| GitSync::new(p).stats(&base).ok());

        let now = Utc::now();
        Ok(Worktree {
            name: name.to_string(),
            path,
            branch: name.to_string(),
            base_branch: base,
            task_id: task_id.map(String::from),
            task_title: task_title.map(String::from),
            pr_url: None,
            chosen_agent_type: agent_type,
            agent: None,
            status: AgentStatus::Active,
            stats,
            created_at: now,
            updated_at: now,
            is_orphaned: false,
            is_main: false,
        })
    }

    fn run_post_create_setup(&self, worktree_path: &Path, setup: &PostCreateSetup) -> CoreResult<()> {
        for file in &setup.symlinks {
            self.symlink_one(worktree_path, file)
                .map_err(|e| CoreError::SetupFailed(e.to_string()))?;
        }

        let script = self.project_root.join(POST_CREATE_SCRIPT);
        if script.exists() {
            let output = Command::new(&script)
                .arg(worktree_path)
                .current_dir(&self.project_root)
                .output()
                .map_err(|e| CoreError::SetupFailed(e.to_string()))?;
            if !output.status.success() {
                return Err(CoreError::SetupFailed(stderr_trimmed(&output)));
            }
        }
        Ok(())
    }

    /// Symlink `file` from the main checkout into `worktree_path`, as a
    /// relative path so the worktree stays portable if the repo moves.
    fn symlink_one(&self, worktree_path: &Path, file: &str) -> std::io::Result<()> {
        let source = self.project_root.join(file);
        let target = worktree_path.join(file);
        if !source.exists() || target.exists() || target.symlink_metadata().is_ok() {
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let depth = Path::new(file).components().count().max(1);
        let mut relative = PathBuf::new();
        for _ in 0..depth {
            relative.push("..");
        }
        relative.push(&self.project_root.file_name().unwrap_or_default());
        relative.push(file);

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&relative, &target)
        }
        #[cfg(windows)]
        {
            if source.is_dir() {
                std::os::windows::fs::symlink_dir(&relative, &target)
            } else {
                std::os::windows::fs::symlink_file(&relative, &target)
            }
        }
    }

    /// `Delete(name, deleteLocalBranch, deleteRemoteBranch)` (spec
    /// §4.1). Retries with `--force` on the first failure; accumulates
    /// non-fatal warnings rather than failing outright on branch
    /// deletion errors.
    pub fn delete(
        &self,
        worktree_path: &Path,
        branch_name: &str,
        delete_local_branch: bool,
        delete_remote_branch: bool,
    ) -> (CoreResult<()>, Vec<String>) {
        let mut warnings = Vec::new();
        let path_str = worktree_path.to_string_lossy().into_owned();

        let first = run_git(&self.project_root, &["worktree", "remove", &path_str]);
        let removed = match first {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => {
                let retry = run_git(&self.project_root, &["worktree", "remove", "--force", &path_str]);
                match retry {
                    Ok(o) if o.status.success() => Ok(()),
                    Ok(o) => Err(CoreError::GitFailed(stderr_trimmed(&o))),
                    Err(e) => Err(CoreError::GitFailed(format!(
                        "{}; retry failed: {e}",
                        stderr_trimmed(&output)
                    ))),
                }
            }
            Err(e) => Err(e),
        };

        if let Err(err) = removed {
            return (Err(err), warnings);
        }

        if delete_local_branch {
            match run_git(&self.project_root, &["branch", "-D", branch_name]) {
                Ok(output) if !output.status.success() => {
                    warnings.push(format!("local branch not deleted: {}", stderr_trimmed(&output)));
                }
                Err(e) => warnings.push(format!("local branch not deleted: {e}")),
                _ => {}
            }
        }
        if delete_remote_branch {
            match run_git(
                &self.project_root,
                &["push", "origin", "--delete", branch_name],
            ) {
                Ok(output) if !output.status.success() => {
                    warnings.push(format!("remote branch not deleted: {}", stderr_trimmed(&output)));
                }
                Err(e) => warnings.push(format!("remote branch not deleted: {e}")),
                _ => {}
            }
        }

        (Ok(()), warnings)
    }

    /// `Reconcile(liveSessions)` (spec §4.1): mark `IsOrphaned` on any
    /// worktree whose sidecar names an agent but whose tmux session is
    /// absent from `live_sessions`.
    pub fn reconcile(&self, worktrees: &mut [Worktree], live_sessions: &HashSet<String>) {
        for worktree in worktrees.iter_mut() {
            if worktree.chosen_agent_type == AgentType::None {
                worktree.is_orphaned = false;
                continue;
            }
            let session = crate::naming::worktree_tmux_name(&worktree.name);
            worktree.is_orphaned = !live_sessions.contains(&session);
        }
    }
}

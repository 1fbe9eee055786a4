use anyhow::{Context, Result};
use git2::{BranchType, Repository};

use crate::worktree::WorktreeStats;

/// Line/ahead/behind stats for a worktree (spec §3 Worktree `Stats`).
/// The merge workflow and diff viewer themselves are external
/// collaborators (spec §1 Non-goals) — this is the one git computation
/// the core performs on its own behalf.
pub struct GitSync {
    worktree_path: String,
}

impl GitSync {
    pub fn new(worktree_path: &str) -> Self {
        Self {
            worktree_path: worktree_path.to_string(),
        }
    }

    fn get_ahead_behind(&self, repo: &Repository) -> Result<(u32, u32)> {
        let head = repo.head()?;

        if !head.is_branch() {
            return Ok((0, 0));
        }

        let branch_name = head.shorthand().context("Failed to get branch name")?;

        // Try to find upstream
        let branch = repo.find_branch(branch_name, BranchType::Local)?;

        let upstream = match branch.upstream() {
            Ok(u) => u,
            Err(_) => return Ok((0, 0)), // No upstream set
        };

        let local_oid = head.target().context("Failed to get local OID")?;
        let upstream_oid = upstream
            .get()
            .target()
            .context("Failed to get upstream OID")?;

        let (ahead, behind) = repo.graph_ahead_behind(local_oid, upstream_oid)?;

        Ok((ahead as u32, behind as u32))
    }

    /// Line/ahead/behind summary relative to `base_branch` (spec §3
    /// Worktree `Stats`). Ahead/behind come from the upstream tracking
    /// branch; additions, deletions, and file count come from a diff
    /// against the merge base of `base_branch`, not the working tree,
    /// so uncommitted changes don't inflate the count.
    pub fn stats(&self, base_branch: &str) -> Result<WorktreeStats> {
        let repo =
            Repository::open(&self.worktree_path).context("Failed to open worktree repository")?;
        let head = repo.head().context("Failed to get HEAD")?;
        let head_commit = head.peel_to_commit().context("Failed to get HEAD commit")?;

        let (ahead, behind) = self.get_ahead_behind(&repo)?;
        let (additions, deletions, files) =
            self.diff_stat_against_base(&repo, base_branch, &head_commit)?;

        Ok(WorktreeStats {
            additions,
            deletions,
            files,
            ahead,
            behind,
        })
    }

    fn diff_stat_against_base(
        &self,
        repo: &Repository,
        base_branch: &str,
        head_commit: &git2::Commit,
    ) -> Result<(u32, u32, u32)> {
        let local_ref = format!("refs/heads/{}", base_branch);
        let base_reference = repo.find_reference(&local_ref).or_else(|_| {
            let remote_ref = format!("refs/remotes/origin/{}", base_branch);
            repo.find_reference(&remote_ref)
        });

        let base_oid = match base_reference {
            Ok(reference) => match reference.target() {
                Some(oid) => oid,
                None => return Ok((0, 0, 0)),
            },
            Err(_) => return Ok((0, 0, 0)),
        };

        let merge_base = match repo.merge_base(base_oid, head_commit.id()) {
            Ok(mb) => mb,
            Err(_) => return Ok((0, 0, 0)),
        };

        let base_tree = repo.find_commit(merge_base)?.tree()?;
        let head_tree = head_commit.tree()?;
        let diff = repo.diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)?;
        let stats = diff.stats()?;

        Ok((
            stats.insertions() as u32,
            stats.deletions() as u32,
            stats.files_changed() as u32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn commit_all(repo: &Repository, message: &str, parents: &[&git2::Commit]) -> git2::Oid {
        let mut index = repo.index().unwrap();
        index.add_all(["*"], git2::IndexAddOption::DEFAULT, None).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = git2::Signature::now("Test User", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &signature, &signature, message, &tree, parents)
            .unwrap()
    }

    #[test]
    fn stats_counts_lines_since_merge_base() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        fs::write(dir.path().join("a.txt"), "one\n").unwrap();
        let base_commit_id = commit_all(&repo, "base", &[]);
        let base_commit = repo.find_commit(base_commit_id).unwrap();
        let base_branch_name = repo.head().unwrap().shorthand().unwrap().to_string();

        repo.branch("feature", &base_commit, false).unwrap();
        repo.set_head("refs/heads/feature").unwrap();
        repo.checkout_head(None).unwrap();

        fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
        fs::write(dir.path().join("b.txt"), "new file\n").unwrap();
        commit_all(&repo, "feature work", &[&base_commit]);

        let sync = GitSync::new(dir.path().to_str().unwrap());
        let stats = sync.stats(&base_branch_name).unwrap();
        assert_eq!(stats.files, 2);
        assert!(stats.additions >= 3);
    }
}

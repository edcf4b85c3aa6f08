use anyhow::{anyhow, Result};
use git2::{
    build::CheckoutBuilder, AnnotatedCommit, Index, MergeOptions, Oid, Reference,
    Repository as Git2Repository, RepositoryState,
};

use crate::commit::signature;
use crate::error::ForkError;

/// Outcome of merging a commit into HEAD
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    UpToDate,
    FastForward(Oid),
    Merged(Oid),
    /// Merge stopped; conflicted paths are left in the index
    Conflicts(Vec<String>),
}

/// Merge operations for a repository
pub struct MergeOps<'a> {
    repo: &'a Git2Repository,
}

impl<'a> MergeOps<'a> {
    pub fn new(repo: &'a Git2Repository) -> Self {
        MergeOps { repo }
    }

    /// Merge a commit into the checked-out branch (`git merge <oid> -m <message>`)
    pub fn merge_commit(&self, oid: Oid, message: &str) -> Result<MergeResult> {
        let their_commit = self.repo.find_commit(oid)?;
        let annotated_commit = self.repo.find_annotated_commit(oid)?;
        let head = self.repo.head()?;

        let (merge_analysis, _) = self.repo.merge_analysis(&[&annotated_commit])?;

        if merge_analysis.is_up_to_date() {
            Ok(MergeResult::UpToDate)
        } else if merge_analysis.is_fast_forward() {
            self.fast_forward(&head, oid)?;
            Ok(MergeResult::FastForward(oid))
        } else if merge_analysis.is_normal() {
            let head_commit = head.peel_to_commit()?;
            self.normal_merge(&annotated_commit, &head_commit, &their_commit, message)
        } else {
            Err(anyhow!("Cannot merge {} - unhandled merge scenario", oid))
        }
    }

    fn fast_forward(&self, head: &Reference, target: Oid) -> Result<()> {
        let refname = head
            .name()
            .ok_or_else(|| anyhow!("Invalid reference name"))?;

        let mut reference = self.repo.find_reference(refname)?;
        reference.set_target(target, "Fast-forward merge")?;

        self.repo.set_head(refname)?;
        self.repo.checkout_head(Some(CheckoutBuilder::new().force()))?;

        Ok(())
    }

    fn normal_merge(
        &self,
        annotated_commit: &AnnotatedCommit,
        head_commit: &git2::Commit,
        their_commit: &git2::Commit,
        message: &str,
    ) -> Result<MergeResult> {
        let mut merge_options = MergeOptions::new();
        let mut checkout_builder = CheckoutBuilder::new();
        checkout_builder.allow_conflicts(true).conflict_style_merge(true);

        self.repo.merge(
            &[annotated_commit],
            Some(&mut merge_options),
            Some(&mut checkout_builder),
        )?;

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            return Ok(MergeResult::Conflicts(conflicted_paths(&index)?));
        }

        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let sig = signature(self.repo)?;

        let commit_oid = self.repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            message,
            &tree,
            &[head_commit, their_commit],
        )?;

        self.repo.cleanup_state()?;

        Ok(MergeResult::Merged(commit_oid))
    }

    /// Commit the staged resolution of an in-progress merge
    ///
    /// Parents are HEAD plus every MERGE_HEAD entry, so outside of a merge
    /// this is a plain commit of the index.
    pub fn commit_in_progress(&self, message: &str) -> Result<Oid> {
        let index = self.repo.index()?;
        if index.has_conflicts() {
            return Err(ForkError::MergeConflicts(conflicted_paths(&index)?).into());
        }

        let merge_heads = if self.repo.state() == RepositoryState::Merge {
            self.merge_heads()?
        } else {
            Vec::new()
        };

        let head = self.repo.head()?.peel_to_commit()?;
        let merge_commits = merge_heads
            .iter()
            .map(|oid| self.repo.find_commit(*oid))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut parents = vec![&head];
        parents.extend(merge_commits.iter());

        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let sig = signature(self.repo)?;

        let commit_oid = self.repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        self.repo.cleanup_state()?;

        Ok(commit_oid)
    }

    fn merge_heads(&self) -> Result<Vec<Oid>> {
        let merge_head_path = self.repo.path().join("MERGE_HEAD");
        if !merge_head_path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(merge_head_path)?;
        let merge_heads = content
            .lines()
            .filter_map(|line| Oid::from_str(line.trim()).ok())
            .collect();

        Ok(merge_heads)
    }
}

/// Paths with unresolved conflicts in the index
fn conflicted_paths(index: &Index) -> Result<Vec<String>> {
    let mut conflicts = Vec::new();

    for conflict in index.conflicts()? {
        let conflict = conflict?;
        let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
        if let Some(entry) = entry {
            let path = String::from_utf8_lossy(&entry.path).into_owned();
            if !conflicts.contains(&path) {
                conflicts.push(path);
            }
        }
    }

    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn commit_file(repo: &Git2Repository, workdir: &Path, name: &str, content: &str, msg: &str) -> Oid {
        fs::write(workdir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("Tester", "tester@example.com").unwrap();
        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => vec![],
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parent_refs).unwrap()
    }

    fn checkout_new_branch(repo: &Git2Repository, name: &str, at: Oid) {
        let commit = repo.find_commit(at).unwrap();
        repo.branch(name, &commit, true).unwrap();
        repo.set_head(&format!("refs/heads/{}", name)).unwrap();
        repo.checkout_head(Some(CheckoutBuilder::new().force())).unwrap();
    }

    #[test]
    fn test_fast_forward_and_up_to_date() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Git2Repository::init(temp_dir.path()).unwrap();
        let base = commit_file(&repo, temp_dir.path(), "a.txt", "1", "base");
        let ahead = commit_file(&repo, temp_dir.path(), "a.txt", "2", "ahead");

        checkout_new_branch(&repo, "behind", base);
        let ops = MergeOps::new(&repo);

        assert_eq!(ops.merge_commit(ahead, "msg").unwrap(), MergeResult::FastForward(ahead));
        assert_eq!(repo.head().unwrap().target(), Some(ahead));
        assert_eq!(ops.merge_commit(base, "msg").unwrap(), MergeResult::UpToDate);
    }

    #[test]
    fn test_normal_merge_uses_message() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Git2Repository::init(temp_dir.path()).unwrap();
        let base = commit_file(&repo, temp_dir.path(), "a.txt", "1", "base");
        let upstream = commit_file(&repo, temp_dir.path(), "up.txt", "u", "upstream");

        checkout_new_branch(&repo, "downstream", base);
        commit_file(&repo, temp_dir.path(), "down.txt", "d", "downstream");

        let result = MergeOps::new(&repo)
            .merge_commit(upstream, "Merge upstream stable/yoga")
            .unwrap();

        let merged = match result {
            MergeResult::Merged(oid) => repo.find_commit(oid).unwrap(),
            other => panic!("unexpected result {:?}", other),
        };
        assert_eq!(merged.message(), Some("Merge upstream stable/yoga"));
        assert_eq!(merged.parent_count(), 2);
        assert_eq!(repo.state(), RepositoryState::Clean);
        assert!(temp_dir.path().join("up.txt").exists());
    }

    #[test]
    fn test_conflict_then_continue() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Git2Repository::init(temp_dir.path()).unwrap();
        let base = commit_file(&repo, temp_dir.path(), "a.txt", "base\n", "base");
        let upstream = commit_file(&repo, temp_dir.path(), "a.txt", "upstream\n", "upstream");

        checkout_new_branch(&repo, "downstream", base);
        commit_file(&repo, temp_dir.path(), "a.txt", "downstream\n", "downstream");

        let ops = MergeOps::new(&repo);
        let result = ops.merge_commit(upstream, "Merge upstream").unwrap();
        assert_eq!(result, MergeResult::Conflicts(vec!["a.txt".to_string()]));
        assert_eq!(repo.state(), RepositoryState::Merge);

        let err = ops.commit_in_progress("Merge upstream").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ForkError>(),
            Some(&ForkError::MergeConflicts(vec!["a.txt".to_string()]))
        );

        // Resolve by hand and stage
        fs::write(temp_dir.path().join("a.txt"), "resolved\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("a.txt")).unwrap();
        index.write().unwrap();

        let oid = ops.commit_in_progress("Merge upstream").unwrap();
        let merged = repo.find_commit(oid).unwrap();
        assert_eq!(merged.parent_count(), 2);
        assert_eq!(merged.parent_id(1).unwrap(), upstream);
        assert_eq!(repo.state(), RepositoryState::Clean);
    }
}

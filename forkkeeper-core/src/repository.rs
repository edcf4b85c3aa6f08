use anyhow::{anyhow, Context, Result};
use git2::{BranchType, ErrorCode, Oid, Repository as Git2Repository, Status, StatusOptions};
use std::path::{Path, PathBuf};

use crate::commit::{CommitLog, CommitRecord};
use crate::error::ForkError;
use crate::merge::{MergeOps, MergeResult};
use crate::remote::RemoteOps;
use crate::tag::TagOps;

pub struct Repository {
    path: PathBuf,
    git_repo: Git2Repository,
}

impl Repository {
    /// Open the repository containing `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let git_repo = Git2Repository::discover(path.as_ref())
            .with_context(|| format!("No git repository at {}", path.as_ref().display()))?;
        let path = git_repo
            .workdir()
            .unwrap_or_else(|| git_repo.path())
            .to_path_buf();

        Ok(Repository { path, git_repo })
    }

    /// Working directory root (the git dir for bare repositories)
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a revision to the commit it names (`git rev-parse <ref>^{commit}`)
    pub fn rev_parse(&self, spec: &str) -> Result<Oid> {
        let oid = match self
            .git_repo
            .revparse_single(spec)
            .and_then(|obj| obj.peel_to_commit())
        {
            Ok(commit) => commit.id(),
            Err(e) if is_unresolved(&e) => {
                return Err(ForkError::UnresolvedReference(spec.to_string()).into())
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(spec, %oid, "resolved reference");
        Ok(oid)
    }

    /// Best common ancestor of two commits
    pub fn merge_base(&self, one: Oid, two: Oid) -> Result<Oid> {
        let base = self
            .git_repo
            .merge_base(one, two)
            .with_context(|| format!("No merge base of {} and {}", one, two))?;
        Ok(base)
    }

    /// Whether tracked files differ from HEAD in the index or working tree
    /// (`git diff-index --quiet HEAD` failing); untracked files don't count
    pub fn has_uncommitted_changes(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);

        let statuses = self.git_repo.statuses(Some(&mut opts))?;
        Ok(statuses.iter().any(|entry| entry.status() != Status::CURRENT))
    }

    /// Commits on `include` that are not on `exclude`, newest first
    pub fn list_commits(&self, include: Oid, exclude: Oid, bot_author: &str) -> Result<Vec<CommitRecord>> {
        CommitLog::new(&self.git_repo, bot_author).difference(include, exclude)
    }

    /// Create (or with `force`, move) a local branch
    pub fn create_branch(&self, name: &str, target: Oid, force: bool) -> Result<()> {
        let commit = self.git_repo.find_commit(target)?;
        self.git_repo
            .branch(name, &commit, force)
            .with_context(|| format!("Failed to create branch {}", name))?;
        Ok(())
    }

    /// Checkout a local branch
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        let branch = self.git_repo.find_branch(name, BranchType::Local)?;
        let reference = branch.get();
        let refname = reference
            .name()
            .ok_or_else(|| anyhow!("Branch {} has a non UTF-8 name", name))?;
        let object = reference.peel(git2::ObjectType::Commit)?;

        self.git_repo.checkout_tree(&object, None)?;
        self.git_repo.set_head(refname)?;

        Ok(())
    }

    /// Name of the checked-out branch, if HEAD is on one
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.git_repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !head.is_branch() {
            return Ok(None);
        }
        Ok(head.shorthand().map(str::to_string))
    }

    // Remote operations

    pub fn remote_ops(&self) -> RemoteOps {
        RemoteOps::new(&self.git_repo)
    }

    pub fn fetch(&self, remote_name: &str) -> Result<String> {
        self.remote_ops().fetch(remote_name)
    }

    /// Fetch several remotes in turn
    pub fn fetch_all<S: AsRef<str>>(&self, remote_names: &[S]) -> Result<()> {
        for remote_name in remote_names {
            let remote_name = remote_name.as_ref();
            tracing::info!("Fetching from {}", remote_name);
            self.fetch(remote_name)?;
        }
        Ok(())
    }

    pub fn push_branch(&self, remote_name: &str, branch: &str) -> Result<String> {
        self.remote_ops().push_branch(remote_name, branch)
    }

    pub fn list_branches_on_remote(&self, remote_name: &str) -> Result<Vec<String>> {
        self.remote_ops().list_branches(remote_name)
    }

    // Tag operations

    pub fn tag_ops(&self) -> TagOps {
        TagOps::new(&self.git_repo)
    }

    pub fn most_recent_tag(&self, commit: Oid) -> Result<String> {
        self.tag_ops().most_recent(commit)
    }

    pub fn tag_target(&self, name: &str) -> Result<Oid> {
        self.tag_ops().target(name)
    }

    pub fn tag_create(&self, name: &str, target: Oid) -> Result<String> {
        self.tag_ops().create(name, target)
    }

    pub fn tag_push(&self, remote_name: &str, name: &str) -> Result<String> {
        self.remote_ops().push_tag(remote_name, name)
    }

    // Merge operations

    pub fn merge(&self, oid: Oid, message: &str) -> Result<MergeResult> {
        MergeOps::new(&self.git_repo).merge_commit(oid, message)
    }

    pub fn merge_continue(&self, message: &str) -> Result<Oid> {
        MergeOps::new(&self.git_repo).commit_in_progress(message)
    }
}

/// Errors meaning the revision names no commit, as opposed to a broken repository
fn is_unresolved(e: &git2::Error) -> bool {
    matches!(
        e.code(),
        ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous | ErrorCode::Peel
    )
}

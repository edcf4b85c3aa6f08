//! Merges an upstream stable branch into the downstream release branch.
//!
//! The merge happens on a fresh local branch cut from the downstream
//! branch, which is then pushed for review. A conflicted merge is finished
//! by hand and completed with a second `--continue` run.

use anyhow::Result;
use git2::Oid;

use crate::config::ForkConfig;
use crate::error::ForkError;
use crate::merge::MergeResult;
use crate::repository::Repository;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Branch to create; defaults to `merge-upstream-<release>`
    pub branch: Option<String>,
    /// Merge commit message; defaults to `Merge upstream stable/<release>`
    pub message: Option<String>,
    /// Move the branch if it already exists
    pub force: bool,
    /// Commit a merge whose conflicts were resolved by hand
    pub cont: bool,
    /// Stop after working out whether a merge is needed, or with `cont`,
    /// whether the resolved merge could be committed
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The downstream branch already contains the upstream head
    AlreadySynced,
    /// Dry run: a merge of `upstream` into `downstream` is needed
    WouldMerge { upstream: Oid, downstream: Oid },
    /// Dry run of `cont`: the resolved merge on `branch` is ready to commit
    WouldCommit { branch: String },
    /// Merge committed on `branch` and pushed
    Pushed { branch: String, head: Oid },
}

pub fn default_branch(release: &str) -> String {
    format!("merge-upstream-{}", release)
}

pub fn default_message(config: &ForkConfig, release: &str) -> String {
    format!("Merge upstream {}", config.stable_branch(release))
}

/// Sync the downstream branch of `release` with upstream
pub fn sync_release(
    repo: &Repository,
    config: &ForkConfig,
    release: &str,
    options: &SyncOptions,
) -> Result<SyncOutcome> {
    let branch = options
        .branch
        .clone()
        .unwrap_or_else(|| default_branch(release));
    let message = options
        .message
        .clone()
        .unwrap_or_else(|| default_message(config, release));

    let head = if options.cont {
        check_continue(repo, &branch)?;
        if options.dry_run {
            return Ok(SyncOutcome::WouldCommit { branch });
        }
        tracing::info!("Committing changes");
        repo.merge_continue(&message)?
    } else {
        match start_merge(repo, config, release, &branch, &message, options)? {
            SyncOutcome::Pushed { head, .. } => head,
            outcome => return Ok(outcome),
        }
    };

    tracing::info!("Pushing branch {} to remote {}", branch, config.downstream_remote);
    repo.push_branch(&config.downstream_remote, &branch)?;

    Ok(SyncOutcome::Pushed { branch, head })
}

/// Fetch, create the merge branch and merge upstream into it
///
/// A `Pushed` outcome here only means the merge is ready to push.
fn start_merge(
    repo: &Repository,
    config: &ForkConfig,
    release: &str,
    branch: &str,
    message: &str,
    options: &SyncOptions,
) -> Result<SyncOutcome> {
    if repo.has_uncommitted_changes()? {
        return Err(ForkError::UncommittedChanges.into());
    }

    repo.fetch_all(&[&config.upstream_remote, &config.downstream_remote])?;

    let upstream = repo.rev_parse(&config.upstream_ref(&config.stable_branch(release)))?;
    let downstream = repo.rev_parse(&config.downstream_ref(release))?;

    let merge_base = repo.merge_base(upstream, downstream)?;
    tracing::info!("Merge base of {} and {} is {}", upstream, downstream, merge_base);
    if merge_base == upstream {
        return Ok(SyncOutcome::AlreadySynced);
    }
    if options.dry_run {
        return Ok(SyncOutcome::WouldMerge { upstream, downstream });
    }

    tracing::info!("Creating branch {} at {}", branch, downstream);
    repo.create_branch(branch, downstream, options.force)?;
    tracing::info!("Checking out {}", branch);
    repo.checkout_branch(branch)?;

    tracing::info!("Merging with {}", upstream);
    let head = match repo.merge(upstream, message)? {
        MergeResult::Conflicts(paths) => return Err(ForkError::MergeConflicts(paths).into()),
        MergeResult::Merged(oid) | MergeResult::FastForward(oid) => oid,
        MergeResult::UpToDate => downstream,
    };

    Ok(SyncOutcome::Pushed {
        branch: branch.to_string(),
        head,
    })
}

/// A hand-resolved merge must be staged on the merge branch
fn check_continue(repo: &Repository, branch: &str) -> Result<()> {
    if !repo.has_uncommitted_changes()? {
        return Err(ForkError::NothingToContinue.into());
    }

    match repo.current_branch()? {
        Some(current) if current == branch => Ok(()),
        current => Err(ForkError::NotOnBranch {
            expected: branch.to_string(),
            found: current.unwrap_or_else(|| "detached HEAD".to_string()),
        }
        .into()),
    }
}

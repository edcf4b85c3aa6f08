//! Error types for forkkeeper-core

use thiserror::Error;

/// Errors raised by the fork maintenance workflows
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ForkError {
    /// The release branch is not present on the upstream remote
    #[error("Branch {branch} not found on remote {remote}")]
    ReleaseNotFound { remote: String, branch: String },

    /// Neither the command line nor the configuration names a release
    #[error("No release given; pass --release or set `release` in the configuration")]
    NoRelease,

    /// No stable branch sorts before the requested release
    #[error("No previous release found before {0}")]
    NoPreviousRelease(String),

    /// A reference could not be resolved to a commit
    #[error("Could not resolve reference {0}")]
    UnresolvedReference(String),

    /// No tag is reachable from the given commit
    #[error("No tag reachable from {0}")]
    NoTagReachable(String),

    /// A downstream tag does not follow the `<prefix><base>-<patch>` layout
    #[error("Malformed downstream tag {0}")]
    MalformedTag(String),

    /// Tracked files differ from HEAD
    #[error("Found uncommitted changes - aborting")]
    UncommittedChanges,

    /// `--continue` was requested but nothing is staged
    #[error("Found no uncommitted changes - is a merge in progress?")]
    NothingToContinue,

    /// `--continue` was run on another branch than the one being merged
    #[error("Expected to be on branch {expected}, found {found}")]
    NotOnBranch { expected: String, found: String },

    /// The merge stopped on conflicts
    #[error("Merge conflict in {}: resolve and re-run with --continue", .0.join(", "))]
    MergeConflicts(Vec<String>),
}

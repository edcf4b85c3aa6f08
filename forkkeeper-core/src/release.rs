//! Release branch bookkeeping
//!
//! Upstream release branches follow `stable/<release>` naming and sort in
//! release order, which is what makes "previous" and "later" releases
//! computable from a plain branch listing.

use anyhow::Result;

use crate::config::ForkConfig;
use crate::error::ForkError;

/// Position of a release among the upstream branches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePlan {
    pub release: String,
    pub previous_release: String,
    /// Branches whose history may hold a newer version of a patch, oldest
    /// first, ending with the main branch
    pub later_branches: Vec<String>,
}

impl ReleasePlan {
    /// Work out the previous and later branches of `release`
    ///
    /// `upstream_branches` are upstream branch names without the remote
    /// prefix, in any order.
    pub fn resolve(
        config: &ForkConfig,
        upstream_branches: &[String],
        release: &str,
        previous_release: Option<&str>,
    ) -> Result<Self> {
        let mut branches = upstream_branches.to_vec();
        branches.sort();

        let release_branch = config.stable_branch(release);
        let release_index = branches
            .iter()
            .position(|b| *b == release_branch)
            .ok_or_else(|| ForkError::ReleaseNotFound {
                remote: config.upstream_remote.clone(),
                branch: release_branch.clone(),
            })?;

        let previous_release = match previous_release {
            Some(previous) => previous.to_string(),
            None => release_index
                .checked_sub(1)
                .and_then(|i| branches[i].strip_prefix(&config.stable_prefix))
                .map(str::to_string)
                .ok_or_else(|| ForkError::NoPreviousRelease(release.to_string()))?,
        };

        let mut later_branches: Vec<String> = branches[release_index + 1..]
            .iter()
            .filter(|b| b.starts_with(&config.stable_prefix))
            .cloned()
            .collect();
        later_branches.push(config.main_branch.clone());

        tracing::debug!(
            release,
            previous = %previous_release,
            later = ?later_branches,
            "resolved release branches"
        );

        Ok(ReleasePlan {
            release: release.to_string(),
            previous_release,
            later_branches,
        })
    }
}

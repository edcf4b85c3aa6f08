//! Downstream version tags
//!
//! A downstream release is tagged `<prefix><upstream tag>-<n>`, where the
//! upstream tag is the latest one included via the last upstream merge and
//! `n` counts downstream releases made on top of it.

use anyhow::Result;
use git2::Oid;

use crate::config::ForkConfig;
use crate::error::ForkError;
use crate::repository::Repository;

/// Base version and downstream patch number of a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamVersion {
    pub base: String,
    pub patch: u32,
}

impl DownstreamVersion {
    /// Split a tag into base version and patch number
    ///
    /// Tags without the downstream prefix come from upstream and count as
    /// patch 0 of themselves.
    pub fn parse(tag: &str, prefix: &str) -> Result<Self, ForkError> {
        let Some(rest) = tag.strip_prefix(prefix) else {
            return Ok(DownstreamVersion {
                base: tag.to_string(),
                patch: 0,
            });
        };

        let (base, patch) = rest
            .rsplit_once('-')
            .ok_or_else(|| ForkError::MalformedTag(tag.to_string()))?;
        let patch = patch
            .parse::<u32>()
            .map_err(|_| ForkError::MalformedTag(tag.to_string()))?;
        if base.is_empty() {
            return Err(ForkError::MalformedTag(tag.to_string()));
        }

        Ok(DownstreamVersion {
            base: base.to_string(),
            patch,
        })
    }

    /// Version following this one once `upstream_tag` has been merged
    pub fn next(&self, upstream_tag: &str) -> Result<DownstreamVersion, ForkError> {
        let patch = if self.base == upstream_tag {
            self.patch
                .checked_add(1)
                .ok_or_else(|| ForkError::MalformedTag(format!("{}-{}", self.base, self.patch)))?
        } else {
            1
        };
        Ok(DownstreamVersion {
            base: upstream_tag.to_string(),
            patch,
        })
    }

    pub fn to_tag(&self, prefix: &str) -> String {
        format!("{}{}-{}", prefix, self.base, self.patch)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TagOptions {
    /// Fetch both remotes first
    pub fetch: bool,
    /// Compute the tag without creating or pushing it
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// The downstream branch head already carries a tag
    AlreadyTagged { tag: String },
    /// New tag computed; created and pushed unless it was a dry run
    Tagged { tag: String, target: Oid, pushed: bool },
}

/// Compute the next downstream tag of `release` and push it
pub fn tag_release(
    repo: &Repository,
    config: &ForkConfig,
    release: &str,
    options: TagOptions,
) -> Result<TagOutcome> {
    if options.fetch {
        repo.fetch_all(&[&config.upstream_remote, &config.downstream_remote])?;
    }

    let upstream_ref = repo.rev_parse(&config.upstream_ref(&config.stable_branch(release)))?;
    let downstream_ref = repo.rev_parse(&config.downstream_ref(release))?;

    let downstream_tag = repo.most_recent_tag(downstream_ref)?;
    if repo.tag_target(&downstream_tag)? == downstream_ref {
        return Ok(TagOutcome::AlreadyTagged {
            tag: downstream_tag,
        });
    }

    let current = DownstreamVersion::parse(&downstream_tag, &config.tag_prefix)?;
    if downstream_tag.starts_with(&config.tag_prefix) {
        tracing::info!("Found downstream tag {}", downstream_tag);
    } else {
        tracing::info!("Found no downstream tag - basing off of upstream tag {}", current.base);
    }

    let merge_base = repo.merge_base(upstream_ref, downstream_ref)?;
    tracing::info!("Merge base of {} and {} is {}", upstream_ref, downstream_ref, merge_base);
    let upstream_tag = repo.most_recent_tag(merge_base)?;

    let tag = current.next(&upstream_tag)?.to_tag(&config.tag_prefix);
    if options.dry_run {
        return Ok(TagOutcome::Tagged {
            tag,
            target: downstream_ref,
            pushed: false,
        });
    }

    tracing::info!("Adding tag {} to {}", tag, downstream_ref);
    repo.tag_create(&tag, downstream_ref)?;
    tracing::info!("Pushing tag {} to remote {}", tag, config.downstream_remote);
    repo.tag_push(&config.downstream_remote, &tag)?;

    Ok(TagOutcome::Tagged {
        tag,
        target: downstream_ref,
        pushed: true,
    })
}

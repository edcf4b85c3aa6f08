use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::error::ForkError;

/// File looked up at the repository root when no explicit path is given
pub const CONFIG_FILE_NAME: &str = ".forkkeeper.toml";

/// Naming conventions shared by the fork maintenance tools
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForkConfig {
    pub upstream_remote: String,
    pub downstream_remote: String,
    /// Prefix of downstream release branches, e.g. `stackhpc/yoga`
    pub branch_prefix: String,
    /// Prefix of downstream version tags, e.g. `stackhpc/15.0.0-1`
    pub tag_prefix: String,
    /// Prefix of upstream release branches, e.g. `stable/yoga`
    pub stable_prefix: String,
    pub main_branch: String,
    /// Author name of the CI account whose commits are never ported
    pub bot_author: String,
    pub release: Option<String>,
}

impl Default for ForkConfig {
    fn default() -> Self {
        ForkConfig {
            upstream_remote: "origin".to_string(),
            downstream_remote: "stackhpc".to_string(),
            branch_prefix: "stackhpc".to_string(),
            tag_prefix: "stackhpc/".to_string(),
            stable_prefix: "stable/".to_string(),
            main_branch: "master".to_string(),
            bot_author: "stackhpc-ci".to_string(),
            release: None,
        }
    }
}

/// Values given on the command line; each one set replaces the file value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub release: Option<String>,
    pub upstream_remote: Option<String>,
    pub downstream_remote: Option<String>,
    pub branch_prefix: Option<String>,
    pub tag_prefix: Option<String>,
}

impl ForkConfig {
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        let ConfigOverrides {
            release,
            upstream_remote,
            downstream_remote,
            branch_prefix,
            tag_prefix,
        } = overrides;

        if release.is_some() {
            self.release = release;
        }
        if let Some(remote) = upstream_remote {
            self.upstream_remote = remote;
        }
        if let Some(remote) = downstream_remote {
            self.downstream_remote = remote;
        }
        if let Some(prefix) = branch_prefix {
            self.branch_prefix = prefix;
        }
        if let Some(prefix) = tag_prefix {
            self.tag_prefix = prefix;
        }
        self
    }

    /// Release to work on
    pub fn require_release(&self) -> Result<String, ForkError> {
        self.release.clone().ok_or(ForkError::NoRelease)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Load `.forkkeeper.toml` from a repository root, falling back to defaults
    pub fn discover(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join(CONFIG_FILE_NAME);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "loading configuration");
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Upstream release branch name, e.g. `stable/yoga`
    pub fn stable_branch(&self, release: &str) -> String {
        format!("{}{}", self.stable_prefix, release)
    }

    /// Downstream release branch name, e.g. `stackhpc/yoga`
    pub fn downstream_branch(&self, release: &str) -> String {
        format!("{}/{}", self.branch_prefix, release)
    }

    /// Remote-tracking ref of an upstream branch, e.g. `origin/stable/yoga`
    pub fn upstream_ref(&self, branch: &str) -> String {
        format!("{}/{}", self.upstream_remote, branch)
    }

    /// Remote-tracking ref of a downstream release branch
    pub fn downstream_ref(&self, release: &str) -> String {
        format!("{}/{}", self.downstream_remote, self.downstream_branch(release))
    }
}

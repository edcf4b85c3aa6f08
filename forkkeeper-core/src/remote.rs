use anyhow::{Context, Result};
use git2::{
    AutotagOption, BranchType, Config, Cred, CredentialType, FetchOptions, PushOptions,
    RemoteCallbacks, Repository as Git2Repository,
};
use std::path::Path;

/// Remote operations for a repository
pub struct RemoteOps<'a> {
    repo: &'a Git2Repository,
}

impl<'a> RemoteOps<'a> {
    pub fn new(repo: &'a Git2Repository) -> Self {
        RemoteOps { repo }
    }

    /// Fetch all configured refspecs of a remote
    pub fn fetch(&self, remote_name: &str) -> Result<String> {
        let mut remote = self
            .repo
            .find_remote(remote_name)
            .with_context(|| format!("Unknown remote {}", remote_name))?;

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(self.callbacks()?);
        // Version tags are computed from upstream tags
        fetch_options.download_tags(AutotagOption::All);

        // Empty refspec list means the remote's configured fetch refspecs
        remote.fetch(&[] as &[&str], Some(&mut fetch_options), None)?;

        let stats = remote.stats();
        let msg = format!(
            "Fetched {} objects, {} bytes",
            stats.received_objects(),
            stats.received_bytes()
        );
        tracing::debug!(remote = remote_name, "{}", msg);

        Ok(msg)
    }

    /// Push refspecs to a remote, failing if the remote rejects any of them
    pub fn push(&self, remote_name: &str, refspecs: &[&str]) -> Result<String> {
        let mut remote = self
            .repo
            .find_remote(remote_name)
            .with_context(|| format!("Unknown remote {}", remote_name))?;

        let mut callbacks = self.callbacks()?;
        callbacks.push_update_reference(|refname, status| match status {
            Some(msg) => Err(git2::Error::from_str(&format!(
                "Push rejected for {}: {}",
                refname, msg
            ))),
            None => Ok(()),
        });

        let mut push_options = PushOptions::new();
        push_options.remote_callbacks(callbacks);

        remote.push(refspecs, Some(&mut push_options))?;

        Ok(format!("Pushed {} to {}", refspecs.join(", "), remote_name))
    }

    /// Push a local branch to the branch of the same name on the remote
    pub fn push_branch(&self, remote_name: &str, branch: &str) -> Result<String> {
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
        self.push(remote_name, &[refspec.as_str()])
    }

    /// Push a tag to the remote
    pub fn push_tag(&self, remote_name: &str, tag: &str) -> Result<String> {
        let refspec = format!("refs/tags/{0}:refs/tags/{0}", tag);
        self.push(remote_name, &[refspec.as_str()])
    }

    /// Names of the remote-tracking branches of a remote, without the
    /// `<remote>/` prefix
    pub fn list_branches(&self, remote_name: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", remote_name);
        let mut branches = Vec::new();

        for branch in self.repo.branches(Some(BranchType::Remote))? {
            let (branch, _) = branch?;
            // Symbolic refs such as origin/HEAD are not branches of their own
            if branch.get().symbolic_target().is_some() {
                continue;
            }
            if let Some(name) = branch.name()? {
                if let Some(short) = name.strip_prefix(&prefix) {
                    if short != "HEAD" {
                        branches.push(short.to_string());
                    }
                }
            }
        }

        Ok(branches)
    }

    fn callbacks(&self) -> Result<RemoteCallbacks<'a>> {
        let config = self.repo.config()?;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username_from_url, allowed_types| {
            credentials(&config, url, username_from_url, allowed_types)
        });
        Ok(callbacks)
    }
}

/// SSH keys from ~/.ssh, the SSH agent, or the configured credential helper
fn credentials(
    config: &Config,
    url: &str,
    username_from_url: Option<&str>,
    allowed_types: CredentialType,
) -> std::result::Result<Cred, git2::Error> {
    let username = username_from_url.unwrap_or("git");

    if allowed_types.contains(CredentialType::SSH_KEY) {
        if let Ok(home) = std::env::var("HOME") {
            let ssh_dir = Path::new(&home).join(".ssh");
            for key in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                let key_path = ssh_dir.join(key);
                if key_path.exists() {
                    return Cred::ssh_key(username, None, &key_path, None);
                }
            }
        }
        return Cred::ssh_key_from_agent(username);
    }

    if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
        return Cred::credential_helper(config, url, username_from_url);
    }

    Cred::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn commit_empty(repo: &Git2Repository) -> git2::Oid {
        let sig = git2::Signature::now("Tester", "tester@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap()
    }

    #[test]
    fn test_list_branches_strips_remote_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Git2Repository::init(temp_dir.path()).unwrap();
        let oid = commit_empty(&repo);

        for name in ["origin/stable/yoga", "origin/master", "fork/stable/yoga"] {
            repo.reference(&format!("refs/remotes/{}", name), oid, false, "test")
                .unwrap();
        }
        repo.reference_symbolic("refs/remotes/origin/HEAD", "refs/remotes/origin/master", false, "test")
            .unwrap();

        let mut branches = RemoteOps::new(&repo).list_branches("origin").unwrap();
        branches.sort();
        assert_eq!(branches, vec!["master".to_string(), "stable/yoga".to_string()]);
    }

    #[test]
    fn test_fetch_and_push_local_remote() {
        let upstream_dir = TempDir::new().unwrap();
        let upstream = Git2Repository::init(upstream_dir.path()).unwrap();
        let oid = commit_empty(&upstream);
        upstream.branch("stable/yoga", &upstream.find_commit(oid).unwrap(), false).unwrap();

        let remote_dir = TempDir::new().unwrap();
        Git2Repository::init_bare(remote_dir.path()).unwrap();

        let local_dir = TempDir::new().unwrap();
        let local = Git2Repository::init(local_dir.path()).unwrap();
        local.remote("origin", upstream_dir.path().to_str().unwrap()).unwrap();
        local.remote("fork", remote_dir.path().to_str().unwrap()).unwrap();

        let ops = RemoteOps::new(&local);
        ops.fetch("origin").unwrap();
        assert!(ops.list_branches("origin").unwrap().contains(&"stable/yoga".to_string()));

        local.tag_lightweight("v1", &local.find_object(oid, None).unwrap(), false).unwrap();
        ops.push_tag("fork", "v1").unwrap();

        let pushed = Git2Repository::open_bare(remote_dir.path()).unwrap();
        assert_eq!(pushed.refname_to_id("refs/tags/v1").unwrap(), oid);
    }
}

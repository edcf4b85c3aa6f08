use anyhow::{Context, Result};
use git2::{Oid, Repository as Git2Repository, Sort};

/// Trailer carrying the Gerrit tracking identifier
const CHANGE_ID_TRAILER: &str = "Change-Id: I";

/// One commit as seen by the cherry-pick analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub sha1: String,
    pub title: String,
    /// Gerrit Change-Id including its leading `I`
    pub change_id: Option<String>,
    /// Authored by the CI bot account
    pub bot: bool,
}

impl CommitRecord {
    /// Build a record from a commit message and author name
    pub fn from_parts(sha1: &str, message: &str, author: &str, bot_author: &str) -> Self {
        CommitRecord {
            sha1: sha1.to_string(),
            title: parse_title(message),
            change_id: parse_change_id(message),
            bot: author.split_whitespace().next() == Some(bot_author),
        }
    }

    pub fn from_commit(commit: &git2::Commit, bot_author: &str) -> Self {
        let message = String::from_utf8_lossy(commit.message_bytes());
        let author = commit.author();
        let author_name = String::from_utf8_lossy(author.name_bytes());
        Self::from_parts(&commit.id().to_string(), &message, &author_name, bot_author)
    }

    /// Abbreviated hash for display
    pub fn short_sha(&self) -> &str {
        &self.sha1[..self.sha1.len().min(10)]
    }
}

/// First non-blank line of the message
fn parse_title(message: &str) -> String {
    message
        .lines()
        .map(str::trim_end)
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim_start()
        .to_string()
}

/// Value of the last `Change-Id: I...` line, if any
pub fn parse_change_id(message: &str) -> Option<String> {
    message
        .lines()
        .filter_map(|line| line.trim().strip_prefix(CHANGE_ID_TRAILER))
        .map(|rest| format!("I{}", rest.trim()))
        .last()
}

/// First commit in `commits` tracking the same change as `candidate`
pub fn find_by_change_id<'a>(
    commits: &'a [CommitRecord],
    candidate: &CommitRecord,
) -> Option<&'a CommitRecord> {
    let change_id = candidate.change_id.as_ref()?;
    commits
        .iter()
        .find(|commit| commit.change_id.as_ref() == Some(change_id))
}

/// Signature from the repository's git config
pub(crate) fn signature(repo: &Git2Repository) -> Result<git2::Signature<'static>> {
    let config = repo.config()?;

    let name = config
        .get_string("user.name")
        .unwrap_or_else(|_| "forkkeeper".to_string());
    let email = config
        .get_string("user.email")
        .unwrap_or_else(|_| "forkkeeper@localhost".to_string());

    Ok(git2::Signature::now(&name, &email)?)
}

/// Walks commit ranges of a repository
pub struct CommitLog<'repo> {
    repo: &'repo Git2Repository,
    bot_author: &'repo str,
}

impl<'repo> CommitLog<'repo> {
    pub fn new(repo: &'repo Git2Repository, bot_author: &'repo str) -> Self {
        CommitLog { repo, bot_author }
    }

    /// Commits reachable from `include` but not from `exclude`, merges
    /// skipped, newest first
    pub fn difference(&self, include: Oid, exclude: Oid) -> Result<Vec<CommitRecord>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push(include)?;
        revwalk.hide(exclude)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self
                .repo
                .find_commit(oid)
                .with_context(|| format!("Failed to load commit {}", oid))?;
            if commit.parent_count() > 1 {
                continue;
            }
            commits.push(CommitRecord::from_commit(&commit, self.bot_author));
        }

        tracing::debug!(%include, %exclude, count = commits.len(), "listed commit difference");
        Ok(commits)
    }
}

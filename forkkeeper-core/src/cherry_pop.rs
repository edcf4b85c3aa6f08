//! Proposes downstream patches to carry forward into a new release branch.
//!
//! The candidates are the downstream-only commits of the previous release.
//! Each one is matched by Change-Id against the new release branch and the
//! later upstream branches to decide whether it still needs a cherry-pick,
//! and from where.

use anyhow::Result;
use std::fmt;

use crate::commit::{find_by_change_id, CommitRecord};
use crate::config::ForkConfig;
use crate::release::ReleasePlan;
use crate::repository::Repository;

/// Commits of one later upstream branch that are not on the previous release
#[derive(Debug, Clone)]
pub struct BranchCommits {
    pub branch: String,
    pub commits: Vec<CommitRecord>,
}

/// A later-branch version of a candidate patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickOption {
    pub branch: String,
    pub commit: CommitRecord,
}

/// Outcome for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Authored by the CI bot, never carried forward
    SkipBot { bot_author: String },
    /// No Change-Id so it cannot be tracked; keep it
    KeepNoChangeId,
    /// Already on the new release branch
    SkipPresent { release: String },
    /// Newer versions exist on later branches; the first is proposed
    Choice { options: Vec<PickOption> },
    /// Not found anywhere else; keep the original commit
    KeepOriginal,
}

impl Verdict {
    /// Commit proposed for cherry-picking, if any
    pub fn proposal<'a>(&'a self, candidate: &'a CommitRecord) -> Option<&'a CommitRecord> {
        match self {
            Verdict::SkipBot { .. } | Verdict::SkipPresent { .. } => None,
            Verdict::KeepNoChangeId | Verdict::KeepOriginal => Some(candidate),
            Verdict::Choice { options } => options.first().map(|o| &o.commit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReport {
    pub candidate: CommitRecord,
    pub verdict: Verdict,
}

/// Result of the analysis for one release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CherryPopReport {
    pub previous_release: String,
    pub entries: Vec<CandidateReport>,
}

impl CherryPopReport {
    /// Proposed cherry-picks in application order (oldest first)
    pub fn cherries(&self) -> Vec<&CommitRecord> {
        let mut cherries: Vec<&CommitRecord> = self
            .entries
            .iter()
            .filter_map(|e| e.verdict.proposal(&e.candidate))
            .collect();
        cherries.reverse();
        cherries
    }
}

/// Inputs of the matching pass
pub struct CherryPop<'a> {
    pub release: &'a str,
    pub previous_release: &'a str,
    pub bot_author: &'a str,
    /// Commits on the new release branch that are not on the previous one
    pub new_branch_commits: &'a [CommitRecord],
    /// Later upstream branches, oldest first
    pub later_branches: &'a [BranchCommits],
}

impl<'a> CherryPop<'a> {
    /// Decide a verdict for every candidate, keeping candidate order
    pub fn analyse(&self, candidates: &[CommitRecord]) -> CherryPopReport {
        let entries = candidates
            .iter()
            .map(|candidate| CandidateReport {
                candidate: candidate.clone(),
                verdict: self.judge(candidate),
            })
            .collect();

        CherryPopReport {
            previous_release: self.previous_release.to_string(),
            entries,
        }
    }

    fn judge(&self, candidate: &CommitRecord) -> Verdict {
        if candidate.bot {
            return Verdict::SkipBot {
                bot_author: self.bot_author.to_string(),
            };
        }
        if candidate.change_id.is_none() {
            return Verdict::KeepNoChangeId;
        }
        if find_by_change_id(self.new_branch_commits, candidate).is_some() {
            return Verdict::SkipPresent {
                release: self.release.to_string(),
            };
        }

        // Stop once a branch carries the same commit as the previous match:
        // the rest of the chain inherited it rather than rewrote it.
        let mut options: Vec<PickOption> = Vec::new();
        for later in self.later_branches {
            if let Some(commit) = find_by_change_id(&later.commits, candidate) {
                if options.last().map(|o| o.commit.sha1 == commit.sha1).unwrap_or(false) {
                    break;
                }
                options.push(PickOption {
                    branch: later.branch.clone(),
                    commit: commit.clone(),
                });
            }
        }

        if options.is_empty() {
            Verdict::KeepOriginal
        } else {
            Verdict::Choice { options }
        }
    }
}

/// Gather the commit lists for `release` from the repository and analyse them
///
/// With `fetch` unset the remote-tracking refs are used as they are.
pub fn propose(
    repo: &Repository,
    config: &ForkConfig,
    release: &str,
    previous_release: Option<&str>,
    fetch: bool,
) -> Result<CherryPopReport> {
    if fetch {
        repo.fetch_all(&[&config.upstream_remote, &config.downstream_remote])?;
    }

    let upstream_branches = repo.list_branches_on_remote(&config.upstream_remote)?;
    let plan = ReleasePlan::resolve(config, &upstream_branches, release, previous_release)?;
    let bot = config.bot_author.as_str();

    let upstream_name = config.upstream_ref(&config.stable_branch(&plan.previous_release));
    let previous_name = config.downstream_ref(&plan.previous_release);
    let new_name = config.downstream_ref(release);

    let upstream_ref = repo.rev_parse(&upstream_name)?;
    let previous_ref = repo.rev_parse(&previous_name)?;
    let new_ref = repo.rev_parse(&new_name)?;

    // Downstream patches on the previous branch
    tracing::info!("Comparing {} and {}", previous_name, upstream_name);
    let candidates = repo.list_commits(previous_ref, upstream_ref, bot)?;

    tracing::info!("Comparing {} and {}", new_name, previous_name);
    let new_branch_commits = repo.list_commits(new_ref, previous_ref, bot)?;

    let mut later_branches = Vec::with_capacity(plan.later_branches.len());
    for branch in &plan.later_branches {
        let later_name = config.upstream_ref(branch);
        tracing::info!("Comparing {} and {}", later_name, previous_name);
        let later_ref = repo.rev_parse(&later_name)?;
        later_branches.push(BranchCommits {
            branch: branch.clone(),
            commits: repo.list_commits(later_ref, previous_ref, bot)?,
        });
    }

    let pop = CherryPop {
        release,
        previous_release: &plan.previous_release,
        bot_author: bot,
        new_branch_commits: &new_branch_commits,
        later_branches: &later_branches,
    };
    Ok(pop.analyse(&candidates))
}

impl fmt::Display for CherryPopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let candidate = &entry.candidate;
            writeln!(
                f,
                "[{}] {} {} {}",
                self.previous_release,
                candidate.short_sha(),
                candidate.change_id.as_deref().unwrap_or("None"),
                candidate.title
            )?;
            writeln!(f)?;

            match &entry.verdict {
                Verdict::SkipBot { bot_author } => {
                    writeln!(f, "  SKIP: created by {} bot", bot_author)?
                }
                Verdict::KeepNoChangeId => writeln!(f, "  KEEP: No change ID")?,
                Verdict::SkipPresent { release } => writeln!(f, "  SKIP: present on {}", release)?,
                Verdict::Choice { options } => {
                    writeln!(f, "  CHOICE: present on multiple branches")?;
                    writeln!(f)?;
                    for option in options {
                        writeln!(f, "    [{}] {}", option.branch, option.commit.short_sha())?;
                    }
                }
                Verdict::KeepOriginal => writeln!(f, "  KEEP: Use original commit")?,
            }
            writeln!(f)?;
        }

        writeln!(f, "Proposed cherries:")?;
        for cherry in self.cherries() {
            writeln!(f, "git cherry-pick -x {}  # {}", cherry.short_sha(), cherry.title)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn commit(sha1: &str, title: &str, change_id: Option<&str>) -> CommitRecord {
        CommitRecord {
            sha1: sha1.to_string(),
            title: title.to_string(),
            change_id: change_id.map(str::to_string),
            bot: false,
        }
    }

    fn bot_commit(sha1: &str) -> CommitRecord {
        CommitRecord {
            bot: true,
            ..commit(sha1, "Synchronise repo files", None)
        }
    }

    fn later(branch: &str, commits: Vec<CommitRecord>) -> BranchCommits {
        BranchCommits {
            branch: branch.to_string(),
            commits,
        }
    }

    fn pop<'a>(
        new_branch_commits: &'a [CommitRecord],
        later_branches: &'a [BranchCommits],
    ) -> CherryPop<'a> {
        CherryPop {
            release: "xena",
            previous_release: "wallaby",
            bot_author: "stackhpc-ci",
            new_branch_commits,
            later_branches,
        }
    }

    #[test]
    fn test_bot_commit_skipped() {
        let report = pop(&[], &[]).analyse(&[bot_commit("b0b0b0b0b0b0")]);

        assert_eq!(
            report.entries[0].verdict,
            Verdict::SkipBot {
                bot_author: "stackhpc-ci".to_string()
            }
        );
        assert!(report.cherries().is_empty());
    }

    #[test]
    fn test_bot_check_precedes_change_id() {
        let mut candidate = commit("1111111111aa", "Bump", Some("I1"));
        candidate.bot = true;
        let new_branch = vec![commit("2222222222bb", "Bump", Some("I1"))];

        let report = pop(&new_branch, &[]).analyse(&[candidate]);
        assert!(matches!(report.entries[0].verdict, Verdict::SkipBot { .. }));
    }

    #[test]
    fn test_no_change_id_kept() {
        let candidate = commit("aaaaaaaaaaaa", "Local hack", None);
        let report = pop(&[], &[]).analyse(&[candidate.clone()]);

        assert_eq!(report.entries[0].verdict, Verdict::KeepNoChangeId);
        assert_eq!(report.cherries(), vec![&candidate]);
    }

    #[test]
    fn test_present_on_new_branch_skipped() {
        let candidate = commit("aaaaaaaaaaaa", "Fix bug", Some("I1"));
        let new_branch = vec![commit("bbbbbbbbbbbb", "Fix bug", Some("I1"))];
        let later_branches = vec![later("master", vec![commit("cccccccccccc", "Fix bug", Some("I1"))])];

        let report = pop(&new_branch, &later_branches).analyse(&[candidate]);

        assert_eq!(
            report.entries[0].verdict,
            Verdict::SkipPresent {
                release: "xena".to_string()
            }
        );
    }

    #[test]
    fn test_choice_prefers_first_later_branch() {
        let candidate = commit("aaaaaaaaaaaa", "Fix bug", Some("I1"));
        let yoga = commit("yyyyyyyyyyyy", "Fix bug", Some("I1"));
        let master = commit("mmmmmmmmmmmm", "Fix bug (master)", Some("I1"));
        let later_branches = vec![
            later("stable/yoga", vec![yoga.clone()]),
            later("stable/zed", vec![commit("zzzzzzzzzzzz", "Other", Some("I9"))]),
            later("master", vec![master.clone()]),
        ];

        let report = pop(&[], &later_branches).analyse(&[candidate]);

        assert_eq!(
            report.entries[0].verdict,
            Verdict::Choice {
                options: vec![
                    PickOption {
                        branch: "stable/yoga".to_string(),
                        commit: yoga.clone()
                    },
                    PickOption {
                        branch: "master".to_string(),
                        commit: master
                    },
                ]
            }
        );
        assert_eq!(report.cherries(), vec![&yoga]);
    }

    #[test]
    fn test_choice_stops_at_repeated_commit() {
        let candidate = commit("aaaaaaaaaaaa", "Fix bug", Some("I1"));
        let yoga = commit("yyyyyyyyyyyy", "Fix bug", Some("I1"));
        let later_branches = vec![
            later("stable/yoga", vec![yoga.clone()]),
            later("stable/zed", vec![yoga.clone()]),
            later("master", vec![commit("mmmmmmmmmmmm", "Fix bug", Some("I1"))]),
        ];

        let report = pop(&[], &later_branches).analyse(&[candidate]);

        match &report.entries[0].verdict {
            Verdict::Choice { options } => {
                assert_eq!(options.len(), 1);
                assert_eq!(options[0].branch, "stable/yoga");
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn test_untracked_elsewhere_keeps_original() {
        let candidate = commit("aaaaaaaaaaaa", "Downstream feature", Some("I7"));
        let later_branches = vec![later("master", vec![commit("mmmmmmmmmmmm", "Other", Some("I8"))])];

        let report = pop(&[], &later_branches).analyse(&[candidate.clone()]);

        assert_eq!(report.entries[0].verdict, Verdict::KeepOriginal);
        assert_eq!(report.cherries(), vec![&candidate]);
    }

    #[test]
    fn test_report_rendering() {
        let candidates = vec![
            commit("3333333333333333", "Newest patch", None),
            bot_commit("2222222222222222"),
            commit("1111111111111111", "Oldest patch", Some("Iabc")),
        ];
        let later_branches = vec![later(
            "master",
            vec![commit("9999999999999999", "Oldest patch", Some("Iabc"))],
        )];

        let report = pop(&[], &later_branches).analyse(&candidates);

        let expected = "\
[wallaby] 3333333333 None Newest patch

  KEEP: No change ID

[wallaby] 2222222222 None Synchronise repo files

  SKIP: created by stackhpc-ci bot

[wallaby] 1111111111 Iabc Oldest patch

  CHOICE: present on multiple branches

    [master] 9999999999

Proposed cherries:
git cherry-pick -x 9999999999  # Oldest patch
git cherry-pick -x 3333333333  # Newest patch
";
        assert_eq!(report.to_string(), expected);
    }
}

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use forkkeeper_core::{
    propose, sync_release, tag_release, ConfigOverrides, ForkConfig, Repository, SyncOptions,
    SyncOutcome, TagOptions, TagOutcome,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forkkeeper")]
#[command(version, about = "Bookkeeping for downstream forks of upstream projects", long_about = None)]
struct Cli {
    /// Path to the repository
    #[arg(short = 'C', long, global = true, default_value = ".")]
    path: PathBuf,

    /// Configuration file (default: .forkkeeper.toml in the repository)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log every git step
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RemoteArgs {
    /// Name of the release, e.g. yoga
    #[arg(short, long)]
    release: Option<String>,

    /// Name of the upstream git remote
    #[arg(short, long)]
    upstream_remote: Option<String>,

    /// Name of the downstream git remote
    #[arg(short, long)]
    downstream_remote: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Propose downstream patches to cherry-pick onto a new release branch
    CherryPop {
        #[command(flatten)]
        remotes: RemoteArgs,
        /// Previous release (default: the release before --release)
        #[arg(short, long)]
        previous_release: Option<String>,
        /// Prefix of downstream branches
        #[arg(short, long)]
        branch_prefix: Option<String>,
        /// Use remote-tracking refs as they are
        #[arg(long)]
        no_fetch: bool,
    },
    /// Compute the next downstream version tag and push it
    DownstreamTag {
        #[command(flatten)]
        remotes: RemoteArgs,
        /// Prefix of downstream tags
        #[arg(short = 'p', long)]
        prefix: Option<String>,
        /// Use remote-tracking refs as they are
        #[arg(long)]
        no_fetch: bool,
        /// Print the tag without creating or pushing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Merge the upstream stable branch into the downstream branch
    UpstreamSync {
        #[command(flatten)]
        remotes: RemoteArgs,
        /// Name of the branch to create (default: merge-upstream-<release>)
        #[arg(short, long)]
        branch: Option<String>,
        /// Continue from a previous failed merge once conflicts are resolved
        #[arg(long = "continue")]
        cont: bool,
        /// Force creation of the branch
        #[arg(short, long)]
        force: bool,
        /// Merge commit message (default: Merge upstream stable/<release>)
        #[arg(short, long)]
        message: Option<String>,
        /// Report whether a merge (or with --continue, a commit) is needed
        /// without creating anything
        #[arg(long)]
        dry_run: bool,
    },
}

impl RemoteArgs {
    fn overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            release: self.release,
            upstream_remote: self.upstream_remote,
            downstream_remote: self.downstream_remote,
            ..ConfigOverrides::default()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let repo = Repository::open(&cli.path)?;
    let config = match &cli.config {
        Some(path) => ForkConfig::load_from_file(path)?,
        None => ForkConfig::discover(repo.path())?,
    };

    match cli.command {
        Commands::CherryPop { remotes, previous_release, branch_prefix, no_fetch } => {
            let config = config.with_overrides(ConfigOverrides {
                branch_prefix,
                ..remotes.overrides()
            });
            let release = config.require_release()?;

            let report = propose(&repo, &config, &release, previous_release.as_deref(), !no_fetch)?;
            print!("{}", report);
        }
        Commands::DownstreamTag { remotes, prefix, no_fetch, dry_run } => {
            let config = config.with_overrides(ConfigOverrides {
                tag_prefix: prefix,
                ..remotes.overrides()
            });
            let release = config.require_release()?;

            let options = TagOptions { fetch: !no_fetch, dry_run };
            match tag_release(&repo, &config, &release, options)? {
                TagOutcome::AlreadyTagged { tag } => {
                    println!("Latest downstream commit is already tagged as {}", tag);
                }
                TagOutcome::Tagged { tag, target, pushed } => {
                    if pushed {
                        println!("Tagged {} as {} and pushed to {}", target, tag, config.downstream_remote);
                    } else {
                        println!("Would tag {} as {}", target, tag);
                    }
                }
            }
        }
        Commands::UpstreamSync { remotes, branch, cont, force, message, dry_run } => {
            let config = config.with_overrides(remotes.overrides());
            let release = config.require_release()?;

            let options = SyncOptions { branch, message, force, cont, dry_run };
            match sync_release(&repo, &config, &release, &options)? {
                SyncOutcome::AlreadySynced => println!("Latest upstream already synced"),
                SyncOutcome::WouldMerge { upstream, downstream } => {
                    println!("Upstream {} is not merged into downstream {}", upstream, downstream);
                }
                SyncOutcome::WouldCommit { branch } => {
                    println!("Resolved merge on {} is ready to commit and push", branch);
                }
                SyncOutcome::Pushed { branch, head } => {
                    println!("Pushed branch {} at {} to {}", branch, head, config.downstream_remote);
                }
            }
        }
    }

    Ok(())
}

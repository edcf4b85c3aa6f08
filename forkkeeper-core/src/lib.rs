pub mod repository;
pub mod commit;
pub mod remote;
pub mod tag;
pub mod merge;
pub mod config;
pub mod error;
pub mod release;
pub mod cherry_pop;
pub mod downstream_tag;
pub mod upstream_sync;

pub use repository::Repository;
pub use commit::{CommitLog, CommitRecord};
pub use remote::RemoteOps;
pub use tag::TagOps;
pub use merge::{MergeOps, MergeResult};
pub use config::{ConfigOverrides, ForkConfig};
pub use error::ForkError;
pub use release::ReleasePlan;
pub use cherry_pop::{propose, BranchCommits, CherryPop, CherryPopReport, PickOption, Verdict};
pub use downstream_tag::{tag_release, DownstreamVersion, TagOptions, TagOutcome};
pub use upstream_sync::{sync_release, SyncOptions, SyncOutcome};

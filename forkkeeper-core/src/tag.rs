use anyhow::Result;
use git2::{
    DescribeFormatOptions, DescribeOptions, ErrorClass, ObjectType, Oid,
    Repository as Git2Repository,
};

use crate::error::ForkError;

/// Tag operations for a repository
pub struct TagOps<'a> {
    repo: &'a Git2Repository,
}

impl<'a> TagOps<'a> {
    pub fn new(repo: &'a Git2Repository) -> Self {
        TagOps { repo }
    }

    /// Create a lightweight tag pointing at a commit
    pub fn create(&self, name: &str, target: Oid) -> Result<String> {
        let target_obj = self.repo.find_object(target, Some(ObjectType::Commit))?;
        self.repo.tag_lightweight(name, &target_obj, false)?;

        Ok(format!(
            "Created lightweight tag '{}' at {}",
            name,
            &target.to_string()[..8]
        ))
    }

    /// Most recent tag reachable from a commit (`git describe --tags --abbrev=0`)
    pub fn most_recent(&self, commit: Oid) -> Result<String> {
        let object = self.repo.find_object(commit, Some(ObjectType::Commit))?;

        let mut opts = DescribeOptions::new();
        opts.describe_tags();
        let describe = match object.describe(&opts) {
            Ok(describe) => describe,
            // Raised both when no tags exist and when none is reachable
            Err(e) if e.class() == ErrorClass::Describe => {
                return Err(ForkError::NoTagReachable(commit.to_string()).into())
            }
            Err(e) => return Err(e.into()),
        };

        let mut format = DescribeFormatOptions::new();
        format.abbreviated_size(0);
        Ok(describe.format(Some(&format))?)
    }

    /// Commit a tag points at, peeling annotated tags
    pub fn target(&self, name: &str) -> Result<Oid> {
        let reference = self.repo.find_reference(&format!("refs/tags/{}", name))?;
        Ok(reference.peel_to_commit()?.id())
    }
}

//! Experiment metadata.
//!
//! Operator-supplied description of the subjects in an experiment, written as
//! `metadata.txt` into the experiment's output directory. The file is a pretty
//! JSON object with the keys `user`, `age`, `timezone` and `genotype`, in that
//! order. Saving again overwrites it.

use crate::error::RigResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Name of the metadata file inside an experiment directory.
pub const METADATA_FILE: &str = "metadata.txt";

/// Operator-entered experiment metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    /// Who ran the experiment.
    pub user: String,
    /// Subject age.
    pub age: String,
    /// Time zone of the subjects' light cycle.
    pub timezone: String,
    /// Subject genotype.
    pub genotype: String,
}

/// A builder for constructing `ExperimentMetadata` instances.
#[derive(Default)]
pub struct MetadataBuilder {
    inner: ExperimentMetadata,
}

impl MetadataBuilder {
    /// Builder with every field empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Experimenter name.
    pub fn user(mut self, user: &str) -> Self {
        self.inner.user = user.to_string();
        self
    }

    /// Subject age.
    pub fn age(mut self, age: &str) -> Self {
        self.inner.age = age.to_string();
        self
    }

    /// Timezone of the recording.
    pub fn timezone(mut self, timezone: &str) -> Self {
        self.inner.timezone = timezone.to_string();
        self
    }

    /// Subject genotype.
    pub fn genotype(mut self, genotype: &str) -> Self {
        self.inner.genotype = genotype.to_string();
        self
    }

    /// Finish the metadata record.
    pub fn build(self) -> ExperimentMetadata {
        self.inner
    }
}

impl ExperimentMetadata {
    /// Pretty-printed JSON in field order.
    pub fn to_pretty_json(&self) -> RigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write `metadata.txt` into `dir`, creating the directory if needed.
    pub fn save(&self, dir: &Path) -> RigResult<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(METADATA_FILE);
        fs::write(&path, self.to_pretty_json()?)?;
        info!("Saved experiment metadata to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExperimentMetadata {
        MetadataBuilder::new()
            .user("ana")
            .age("3d")
            .timezone("ZT4")
            .genotype("CS")
            .build()
    }

    #[test]
    fn test_key_order() {
        let json = sample().to_pretty_json().unwrap();
        let positions: Vec<usize> = ["\"user\"", "\"age\"", "\"timezone\"", "\"genotype\""]
            .iter()
            .map(|key| json.find(key).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(json.contains('\n'));
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let exp_dir = dir.path().join("20240101-120000");

        let path = sample().save(&exp_dir).unwrap();
        assert_eq!(path, exp_dir.join(METADATA_FILE));

        let updated = MetadataBuilder::new().user("bo").build();
        updated.save(&exp_dir).unwrap();
        let read: ExperimentMetadata =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, updated);
    }
}

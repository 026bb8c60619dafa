//! Partition-level bookkeeping created the first time a partition is written.

use std::{
    io,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{fs::FileSystem, logging::merge_log};

/// File holding the partition metadata, relative to the partition directory.
pub const PARTITION_METADATA_FILE: &str = ".partition_metadata";

/// Failure to persist partition metadata.
#[derive(Debug, Error)]
pub enum PartitionMetadataError {
    /// Filesystem failure.
    #[error("partition metadata io error: {0}")]
    Io(#[from] io::Error),
    /// Metadata could not be encoded or decoded.
    #[error("partition metadata json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted contents of [`PARTITION_METADATA_FILE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMetadataRecord {
    /// Commit that first wrote into the partition.
    pub commit_time: String,
    /// Number of path segments between the table base path and the partition.
    pub partition_depth: usize,
}

/// Ensures a partition directory carries its metadata file.
#[derive(Debug)]
pub struct PartitionMetadata {
    fs: Arc<dyn FileSystem>,
    commit_time: String,
    partition_dir: PathBuf,
    partition_depth: usize,
}

impl PartitionMetadata {
    /// Metadata of `partition_path` under `base_path`, stamped with `commit_time`.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        commit_time: impl Into<String>,
        base_path: &Path,
        partition_path: &str,
    ) -> Self {
        let partition_depth = Path::new(partition_path)
            .components()
            .filter(|component| matches!(component, Component::Normal(_)))
            .count();
        Self {
            fs,
            commit_time: commit_time.into(),
            partition_dir: base_path.join(partition_path),
            partition_depth,
        }
    }

    /// Path of the metadata file.
    pub fn metadata_path(&self) -> PathBuf {
        self.partition_dir.join(PARTITION_METADATA_FILE)
    }

    /// Write the metadata file unless some task already did.
    ///
    /// Each task writes its own temporary file and renames it into place, so
    /// concurrent tasks of one commit never observe a half-written file. The
    /// temporary file is removed whatever the outcome.
    pub fn try_save(&self, task_partition_id: u32) -> Result<(), PartitionMetadataError> {
        let metadata_path = self.metadata_path();
        if self.fs.exists(&metadata_path)? {
            return Ok(());
        }
        let tmp_path = self
            .partition_dir
            .join(format!("{PARTITION_METADATA_FILE}_{task_partition_id}"));
        let result = self.write_through(&tmp_path, &metadata_path);
        if self.fs.exists(&tmp_path)? {
            self.fs.delete(&tmp_path)?;
        }
        result
    }

    fn write_through(
        &self,
        tmp_path: &Path,
        metadata_path: &Path,
    ) -> Result<(), PartitionMetadataError> {
        let record = PartitionMetadataRecord {
            commit_time: self.commit_time.clone(),
            partition_depth: self.partition_depth,
        };
        self.fs.create_dir_all(&self.partition_dir)?;
        self.fs.write(tmp_path, &serde_json::to_vec(&record)?)?;
        if !self.fs.exists(metadata_path)? {
            self.fs.rename(tmp_path, metadata_path)?;
            merge_log!(
                log::Level::Info,
                "partition_metadata_saved",
                "path={} commit_time={} depth={}",
                metadata_path.display(),
                record.commit_time,
                record.partition_depth
            );
        }
        Ok(())
    }

    /// Read the persisted metadata, if present.
    pub fn read(&self) -> Result<Option<PartitionMetadataRecord>, PartitionMetadataError> {
        let metadata_path = self.metadata_path();
        if !self.fs.exists(&metadata_path)? {
            return Ok(None);
        }
        let bytes = self.fs.read(&metadata_path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

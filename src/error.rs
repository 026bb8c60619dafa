//! Errors that abort a file-group merge.
//!
//! Per-record write failures never surface here; they are accumulated in the
//! handle's [`WriteStatus`](crate::write_status::WriteStatus).

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{partition::PartitionMetadataError, record::PayloadError, storage::StorageError};

/// No base file could be resolved for a file group that must be merged.
#[derive(Debug, Error)]
#[error("no base file for file group {file_group_id} in partition {partition_path}")]
pub struct ResolutionError {
    /// Partition that was searched.
    pub partition_path: String,
    /// File group without a base file.
    pub file_group_id: String,
}

/// Underlying cause of a failed handle construction.
#[derive(Debug, Error)]
pub enum InitError {
    /// Listing or reading the partition failed.
    #[error("init io error: {0}")]
    Io(#[from] io::Error),
    /// The new base file could not be opened.
    #[error("init storage error: {0}")]
    Storage(#[from] StorageError),
    /// Partition metadata could not be written.
    #[error("init partition metadata error: {0}")]
    PartitionMetadata(#[from] PartitionMetadataError),
}

/// Fatal, task-aborting merge failure. The caller retries the whole file group.
#[derive(Debug, Error)]
pub enum UpsertError {
    /// No base file exists for the file group.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// The handle could not be set up.
    #[error(
        "failed to initialize handle for file group {file_group_id} on commit {commit_time} at \
         {base_path}: {source}"
    )]
    Init {
        /// File group the handle was opened for.
        file_group_id: String,
        /// Commit the handle writes.
        commit_time: String,
        /// Table base path.
        base_path: PathBuf,
        /// Underlying failure.
        #[source]
        source: InitError,
    },
    /// The handle was given no pending records.
    #[error("no pending records supplied for file group {file_group_id}")]
    NoPendingRecords {
        /// File group the handle was opened for.
        file_group_id: String,
    },
    /// A payload failed to combine with the stored value.
    #[error(
        "failed to combine new record {new_record} with old value {old_record} in file group \
         {file_group_id}: {source}"
    )]
    Combine {
        /// File group being merged.
        file_group_id: String,
        /// Pending record that failed.
        new_record: String,
        /// Stored value it was combined with.
        old_record: String,
        /// Payload failure.
        #[source]
        source: PayloadError,
    },
    /// A payload failed to produce its insert value.
    #[error("failed to compute insert value for {record_key} in file group {file_group_id}: {source}")]
    InsertValue {
        /// File group being written.
        file_group_id: String,
        /// Key of the pending record.
        record_key: String,
        /// Payload failure.
        #[source]
        source: PayloadError,
    },
    /// A pending record reached the merge without its payload.
    #[error("payload of {record_key} was released before it was merged")]
    PayloadReleased {
        /// Key of the pending record.
        record_key: String,
    },
    /// A stored record has no record key column value.
    #[error("old record in {old_path} carries no record key: {record}")]
    MissingRecordKey {
        /// Base file being read.
        old_path: PathBuf,
        /// The offending record.
        record: String,
    },
    /// A stored record does not fit the table schema.
    #[error(
        "schema mismatch copying key {record_key} from {old_path} to {new_path} with schema \
         {schema}: {source}"
    )]
    SchemaMismatch {
        /// Key of the stored record.
        record_key: String,
        /// Base file being read.
        old_path: PathBuf,
        /// Base file being written.
        new_path: PathBuf,
        /// Table schema.
        schema: String,
        /// Schema validation failure.
        #[source]
        source: StorageError,
    },
    /// A stored record could not be copied forward.
    #[error("failed to copy key {record_key} from {old_path} to {new_path}: {source}")]
    CopyRecord {
        /// Key of the stored record.
        record_key: String,
        /// Base file being read.
        old_path: PathBuf,
        /// Base file being written.
        new_path: PathBuf,
        /// Storage failure.
        #[source]
        source: StorageError,
    },
    /// The old base file could not be read.
    #[error("failed to read old record from {old_path}: {source}")]
    ReadOldRecord {
        /// Base file being read.
        old_path: PathBuf,
        /// Storage failure.
        #[source]
        source: StorageError,
    },
    /// The new base file could not be sealed.
    #[error("failed to close handle for file group {file_group_id} writing {new_path}: {source}")]
    Close {
        /// File group being written.
        file_group_id: String,
        /// Base file being written.
        new_path: PathBuf,
        /// Storage failure.
        #[source]
        source: StorageError,
    },
}

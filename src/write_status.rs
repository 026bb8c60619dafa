//! Per-task accounting of merge outcomes.

use std::{collections::HashMap, fmt};

use crate::{
    location::RecordLocation,
    record::{PayloadMetadata, PendingRecord, RecordKey},
    storage::StorageError,
};

/// Aggregate statistics of one written file-group version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteStat {
    /// File group written.
    pub file_group_id: String,
    /// Partition holding the file group.
    pub partition_path: String,
    /// Commit of the base file that was merged, `None` for new file groups.
    pub previous_commit: Option<String>,
    /// Output file path relative to the table base path.
    pub path: String,
    /// Size of the persisted output as reported by the filesystem.
    pub total_bytes_written: u64,
    /// Records written to the output.
    pub num_writes: u64,
    /// Keys deleted.
    pub num_deletes: u64,
    /// Stored records replaced by a merged value.
    pub num_update_writes: u64,
    /// Records whose write failed.
    pub total_write_errors: u64,
}

/// Key and target location of a record whose outcome was tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRecord {
    /// Key of the record.
    pub key: RecordKey,
    /// Where the record was written.
    pub new_location: Option<RecordLocation>,
    /// Metadata the payload attached.
    pub metadata: Option<PayloadMetadata>,
}

impl TrackedRecord {
    fn from_pending<P>(record: &PendingRecord<P>, metadata: Option<PayloadMetadata>) -> Self {
        Self {
            key: record.key().clone(),
            new_location: record.new_location().cloned(),
            metadata,
        }
    }
}

/// Outcome accumulator owned by a single handle until it is closed.
#[derive(Default)]
pub struct WriteStatus {
    file_group_id: String,
    partition_path: String,
    track_success_records: bool,
    written_records: Vec<TrackedRecord>,
    failed_records: Vec<TrackedRecord>,
    errors: HashMap<RecordKey, StorageError>,
    total_records: u64,
    total_error_records: u64,
    stat: WriteStat,
}

impl WriteStatus {
    /// `track_success_records` keeps every successful record; otherwise only counts.
    pub fn new(track_success_records: bool) -> Self {
        Self {
            track_success_records,
            ..Default::default()
        }
    }

    pub(crate) fn set_file_group(&mut self, file_group_id: &str, partition_path: &str) {
        self.file_group_id = file_group_id.to_string();
        self.partition_path = partition_path.to_string();
        self.stat.file_group_id = file_group_id.to_string();
        self.stat.partition_path = partition_path.to_string();
    }

    /// Count `record` as written.
    pub fn mark_success<P>(
        &mut self,
        record: &PendingRecord<P>,
        metadata: Option<PayloadMetadata>,
    ) {
        if self.track_success_records {
            self.written_records
                .push(TrackedRecord::from_pending(record, metadata));
        }
        self.total_records += 1;
    }

    /// Count `record` as failed with `cause`.
    pub fn mark_failure<P>(
        &mut self,
        record: &PendingRecord<P>,
        cause: StorageError,
        metadata: Option<PayloadMetadata>,
    ) {
        self.failed_records
            .push(TrackedRecord::from_pending(record, metadata));
        self.errors.insert(record.key().clone(), cause);
        self.total_records += 1;
        self.total_error_records += 1;
    }

    /// File group this status belongs to.
    pub fn file_group_id(&self) -> &str {
        &self.file_group_id
    }

    /// Partition holding the file group.
    pub fn partition_path(&self) -> &str {
        &self.partition_path
    }

    /// Whether any record failed.
    pub fn has_errors(&self) -> bool {
        self.total_error_records > 0
    }

    /// Successful records, when tracking is enabled.
    pub fn written_records(&self) -> &[TrackedRecord] {
        &self.written_records
    }

    /// Records whose write failed.
    pub fn failed_records(&self) -> &[TrackedRecord] {
        &self.failed_records
    }

    /// Failure cause recorded for `key`.
    pub fn error(&self, key: &RecordKey) -> Option<&StorageError> {
        self.errors.get(key)
    }

    /// Failure causes by key.
    pub fn errors(&self) -> &HashMap<RecordKey, StorageError> {
        &self.errors
    }

    /// Records processed, failed ones included.
    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    /// Records whose write failed.
    pub fn total_error_records(&self) -> u64 {
        self.total_error_records
    }

    /// Aggregate statistics.
    pub fn stat(&self) -> &WriteStat {
        &self.stat
    }

    pub(crate) fn stat_mut(&mut self) -> &mut WriteStat {
        &mut self.stat
    }
}

impl fmt::Debug for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteStatus")
            .field("file_group_id", &self.file_group_id)
            .field("partition_path", &self.partition_path)
            .field("total_records", &self.total_records)
            .field("total_error_records", &self.total_error_records)
            .field("stat", &self.stat)
            .finish()
    }
}

use std::{
    collections::BTreeMap,
    fmt, mem,
    path::{Path, PathBuf},
};

use super::{init_error, prepare_output};
use crate::{
    error::{InitError, ResolutionError, UpsertError},
    location::RecordLocation,
    logging::merge_log,
    record::{DynRecord, PendingRecord, RecordPayload},
    storage::{ParquetRecordReader, StorageError, StorageWriter},
    table::TableContext,
    write_status::WriteStatus,
};

/// Rewrites one file group: streams the records of its latest base file,
/// folds in the pending changes and writes the next base file version.
///
/// Old records are visited in file order through [`MergeHandle::write`].
/// Pending keys never seen in the old file are inserted by
/// [`MergeHandle::close`], which also seals the output and returns the
/// [`WriteStatus`].
pub struct MergeHandle<P> {
    table: TableContext,
    commit_time: String,
    file_group_id: String,
    partition_path: String,
    write_status: WriteStatus,
    pending_by_key: BTreeMap<String, PendingRecord<P>>,
    writer: Box<dyn StorageWriter>,
    old_file_path: PathBuf,
    new_file_path: PathBuf,
    records_written: u64,
    records_deleted: u64,
    updated_records_written: u64,
}

impl<P> MergeHandle<P>
where
    P: RecordPayload,
{
    /// Open a handle for `file_group_id` from a sequence of pending records.
    ///
    /// When a key repeats, the later record replaces the earlier one.
    pub fn new(
        table: TableContext,
        commit_time: impl Into<String>,
        task_partition_id: u32,
        file_group_id: impl Into<String>,
        records: impl IntoIterator<Item = PendingRecord<P>>,
    ) -> Result<Self, UpsertError> {
        let mut pending_by_key = BTreeMap::new();
        let mut partition_path = None;
        for record in records {
            partition_path = Some(record.partition_path().to_string());
            pending_by_key.insert(record.record_key().to_string(), record);
        }
        Self::init(
            table,
            commit_time.into(),
            task_partition_id,
            file_group_id.into(),
            partition_path,
            pending_by_key,
        )
    }

    /// Open a handle from records already keyed by record key. The partition is
    /// taken from the first record.
    pub fn with_keyed_records(
        table: TableContext,
        commit_time: impl Into<String>,
        task_partition_id: u32,
        file_group_id: impl Into<String>,
        keyed_records: impl IntoIterator<Item = (String, PendingRecord<P>)>,
    ) -> Result<Self, UpsertError> {
        let pending_by_key: BTreeMap<_, _> = keyed_records.into_iter().collect();
        let partition_path = pending_by_key
            .values()
            .next()
            .map(|record| record.partition_path().to_string());
        Self::init(
            table,
            commit_time.into(),
            task_partition_id,
            file_group_id.into(),
            partition_path,
            pending_by_key,
        )
    }

    fn init(
        table: TableContext,
        commit_time: String,
        task_partition_id: u32,
        file_group_id: String,
        partition_path: Option<String>,
        mut pending_by_key: BTreeMap<String, PendingRecord<P>>,
    ) -> Result<Self, UpsertError> {
        let Some(partition_path) = partition_path else {
            return Err(UpsertError::NoPendingRecords { file_group_id });
        };
        let to_upsert_error = init_error(&table, &file_group_id, &commit_time);

        let base_file = match table
            .view()
            .latest_base_file(&partition_path, &file_group_id, &commit_time)
        {
            Ok(Some(base_file)) => base_file,
            Ok(None) => {
                return Err(ResolutionError {
                    partition_path,
                    file_group_id,
                }
                .into())
            }
            Err(err) => return Err(to_upsert_error(InitError::Io(err))),
        };

        let mut write_status = WriteStatus::new(table.config().is_tracking_success_records());
        write_status.set_file_group(&file_group_id, &partition_path);
        write_status.stat_mut().previous_commit = Some(base_file.commit_time().to_string());

        let opened = prepare_output(
            &table,
            &commit_time,
            task_partition_id,
            &partition_path,
            &file_group_id,
        )
        .and_then(|output| {
            let writer = table
                .writer_factory()
                .open_writer(&commit_time, &output.absolute, table.schema())?;
            Ok((output, writer))
        });
        let (output, writer) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                merge_log!(
                    log::Level::Error,
                    "merge_handle_init_failed",
                    "file_group_id={} commit_time={} error={}",
                    file_group_id,
                    commit_time,
                    err
                );
                return Err(to_upsert_error(err));
            }
        };

        let old_file_path = table
            .config()
            .partition_dir(&partition_path)
            .join(base_file.file_name());
        write_status.stat_mut().path = output.relative;

        for record in pending_by_key.values_mut() {
            record.set_new_location(RecordLocation::new(&commit_time, &file_group_id));
        }

        merge_log!(
            log::Level::Info,
            "merge_handle_init",
            "file_group_id={} commit_time={} old_path={} new_path={} pending={}",
            file_group_id,
            commit_time,
            old_file_path.display(),
            output.absolute.display(),
            pending_by_key.len()
        );

        Ok(Self {
            table,
            commit_time,
            file_group_id,
            partition_path,
            write_status,
            pending_by_key,
            writer,
            old_file_path,
            new_file_path: output.absolute,
            records_written: 0,
            records_deleted: 0,
            updated_records_written: 0,
        })
    }

    /// Merge one record of the old base file into the output.
    ///
    /// A matching pending change replaces the old record, even when writing
    /// the replacement fails; the failure is recorded in the write status.
    /// Unmatched old records are copied forward unchanged.
    pub fn write(&mut self, old_record: &DynRecord) -> Result<(), UpsertError> {
        let Some(key) = old_record.record_key().map(str::to_string) else {
            return Err(UpsertError::MissingRecordKey {
                old_path: self.old_file_path.clone(),
                record: old_record.to_string(),
            });
        };

        if let Some(mut pending) = self.pending_by_key.remove(&key) {
            let payload = pending
                .payload()
                .ok_or_else(|| UpsertError::PayloadReleased {
                    record_key: key.clone(),
                })?;
            let combined = payload
                .combine_and_get_update_value(old_record, self.table.schema())
                .map_err(|source| UpsertError::Combine {
                    file_group_id: self.file_group_id.clone(),
                    new_record: format!("{pending:?}"),
                    old_record: old_record.to_string(),
                    source,
                })?;
            self.write_update_record(&mut pending, combined);
            return Ok(());
        }

        if let Err(err) = self.writer.write(&key, old_record) {
            return Err(self.copy_error(key, err));
        }
        self.records_written += 1;
        Ok(())
    }

    fn copy_error(&self, record_key: String, source: StorageError) -> UpsertError {
        if source.is_schema_mismatch() {
            merge_log!(
                log::Level::Error,
                "merge_copy_failed",
                "reason=schema_mismatch key={} old_path={} new_path={} schema={}",
                record_key,
                self.old_file_path.display(),
                self.new_file_path.display(),
                self.table.schema()
            );
            UpsertError::SchemaMismatch {
                record_key,
                old_path: self.old_file_path.clone(),
                new_path: self.new_file_path.clone(),
                schema: self.table.schema().to_string(),
                source,
            }
        } else {
            merge_log!(
                log::Level::Error,
                "merge_copy_failed",
                "reason=io key={} old_path={} new_path={} error={}",
                record_key,
                self.old_file_path.display(),
                self.new_file_path.display(),
                source
            );
            UpsertError::CopyRecord {
                record_key,
                old_path: self.old_file_path.clone(),
                new_path: self.new_file_path.clone(),
                source,
            }
        }
    }

    /// Write the merged value of `record`, or count a delete when there is none.
    ///
    /// Write failures are recorded in the write status instead of returned.
    /// Returns whether the write succeeded.
    pub fn write_update_record(
        &mut self,
        record: &mut PendingRecord<P>,
        merged: Option<DynRecord>,
    ) -> bool {
        let metadata = record.payload().and_then(P::metadata);
        let result = match merged {
            Some(value) => self
                .writer
                .write_with_metadata(value, record.key())
                .map(|()| {
                    self.records_written += 1;
                    self.updated_records_written += 1;
                }),
            None => {
                self.records_deleted += 1;
                Ok(())
            }
        };
        match result {
            Ok(()) => {
                record.deflate();
                self.write_status.mark_success(record, metadata);
                true
            }
            Err(err) => {
                merge_log!(
                    log::Level::Error,
                    "record_write_failed",
                    "file_group_id={} key={} error={}",
                    self.file_group_id,
                    record.key(),
                    err
                );
                self.write_status.mark_failure(record, err, metadata);
                false
            }
        }
    }

    /// Stream every record of the old base file through [`MergeHandle::write`].
    pub fn merge_base_file(&mut self) -> Result<(), UpsertError> {
        let read_error = |old_path: &Path, source| UpsertError::ReadOldRecord {
            old_path: old_path.to_path_buf(),
            source,
        };
        let reader = ParquetRecordReader::open(
            self.table.fs().as_ref(),
            &self.old_file_path,
            self.table.schema().clone(),
        )
        .map_err(|source| read_error(&self.old_file_path, source))?;
        for old_record in reader {
            let old_record = old_record.map_err(|source| read_error(&self.old_file_path, source))?;
            self.write(&old_record)?;
        }
        Ok(())
    }

    /// Insert the pending records never matched in the old file, seal the
    /// output and return the write status.
    pub fn close(mut self) -> Result<WriteStatus, UpsertError> {
        let pending = mem::take(&mut self.pending_by_key);
        for (record_key, mut record) in pending {
            let payload = record
                .payload()
                .ok_or(UpsertError::PayloadReleased { record_key })?;
            let inserted = payload
                .get_insert_value(self.table.schema())
                .map_err(|source| UpsertError::InsertValue {
                    file_group_id: self.file_group_id.clone(),
                    record_key: record.record_key().to_string(),
                    source,
                })?;
            self.write_update_record(&mut record, inserted);
        }

        let close_error = |source| UpsertError::Close {
            file_group_id: self.file_group_id.clone(),
            new_path: self.new_file_path.clone(),
            source,
        };
        self.writer.close().map_err(close_error)?;
        let total_bytes_written = self
            .table
            .fs()
            .file_len(&self.new_file_path)
            .map_err(|err| close_error(StorageError::Io(err)))?;

        let total_write_errors = self.write_status.failed_records().len() as u64;
        let stat = self.write_status.stat_mut();
        stat.total_bytes_written = total_bytes_written;
        stat.num_writes = self.records_written;
        stat.num_deletes = self.records_deleted;
        stat.num_update_writes = self.updated_records_written;
        stat.total_write_errors = total_write_errors;

        merge_log!(
            log::Level::Info,
            "merge_handle_closed",
            "file_group_id={} commit_time={} path={} bytes={} writes={} deletes={} update_writes={} errors={}",
            self.file_group_id,
            self.commit_time,
            self.new_file_path.display(),
            total_bytes_written,
            self.records_written,
            self.records_deleted,
            self.updated_records_written,
            total_write_errors
        );
        Ok(self.write_status)
    }
}

impl<P> MergeHandle<P> {
    /// File group being merged.
    pub fn file_group_id(&self) -> &str {
        &self.file_group_id
    }

    /// Partition the file group belongs to.
    pub fn partition_path(&self) -> &str {
        &self.partition_path
    }

    /// Commit this handle writes.
    pub fn commit_time(&self) -> &str {
        &self.commit_time
    }

    /// Base file being merged.
    pub fn old_file_path(&self) -> &Path {
        &self.old_file_path
    }

    /// Base file being written.
    pub fn new_file_path(&self) -> &Path {
        &self.new_file_path
    }

    /// Outcomes accumulated so far.
    pub fn write_status(&self) -> &WriteStatus {
        &self.write_status
    }

    /// Pending changes not yet matched against the old file.
    pub fn pending_len(&self) -> usize {
        self.pending_by_key.len()
    }

    /// Records written to the new base file so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Keys deleted so far.
    pub fn records_deleted(&self) -> u64 {
        self.records_deleted
    }

    /// Stored records replaced by a merged value so far.
    pub fn updated_records_written(&self) -> u64 {
        self.updated_records_written
    }
}

impl<P> fmt::Debug for MergeHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeHandle")
            .field("file_group_id", &self.file_group_id)
            .field("partition_path", &self.partition_path)
            .field("commit_time", &self.commit_time)
            .field("old_file_path", &self.old_file_path)
            .field("new_file_path", &self.new_file_path)
            .field("pending", &self.pending_by_key.len())
            .finish()
    }
}

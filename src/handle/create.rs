use std::{
    fmt,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use super::{init_error, prepare_output};
use crate::{
    error::UpsertError,
    location::RecordLocation,
    logging::merge_log,
    record::{PendingRecord, RecordPayload},
    storage::{StorageError, StorageWriter},
    table::TableContext,
    write_status::WriteStatus,
};

/// Writes the first base file of a new file group from insert-only records.
pub struct CreateHandle<P> {
    table: TableContext,
    commit_time: String,
    file_group_id: String,
    partition_path: String,
    write_status: WriteStatus,
    writer: Box<dyn StorageWriter>,
    new_file_path: PathBuf,
    records_written: u64,
    records_deleted: u64,
    _payload: PhantomData<fn(P)>,
}

impl<P> CreateHandle<P>
where
    P: RecordPayload,
{
    /// Open a handle for a new file group in `partition_path`. A fresh id is
    /// generated when `file_group_id` is `None`.
    pub fn new(
        table: TableContext,
        commit_time: impl Into<String>,
        task_partition_id: u32,
        partition_path: impl Into<String>,
        file_group_id: Option<String>,
    ) -> Result<Self, UpsertError> {
        let commit_time = commit_time.into();
        let partition_path = partition_path.into();
        let file_group_id = file_group_id.unwrap_or_else(|| table.next_file_group_id());
        let to_upsert_error = init_error(&table, &file_group_id, &commit_time);

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
        let (output, writer) = opened.map_err(to_upsert_error)?;

        let mut write_status = WriteStatus::new(table.config().is_tracking_success_records());
        write_status.set_file_group(&file_group_id, &partition_path);
        write_status.stat_mut().path = output.relative;

        merge_log!(
            log::Level::Info,
            "create_handle_init",
            "file_group_id={} commit_time={} partition={} new_path={}",
            file_group_id,
            commit_time,
            partition_path,
            output.absolute.display()
        );

        Ok(Self {
            table,
            commit_time,
            file_group_id,
            partition_path,
            write_status,
            writer,
            new_file_path: output.absolute,
            records_written: 0,
            records_deleted: 0,
            _payload: PhantomData,
        })
    }

    /// Write the insert value of `record`. A payload without an insert value
    /// counts as a delete.
    pub fn write(&mut self, mut record: PendingRecord<P>) -> Result<(), UpsertError> {
        record.set_new_location(RecordLocation::new(&self.commit_time, &self.file_group_id));
        let payload = record
            .payload()
            .ok_or_else(|| UpsertError::PayloadReleased {
                record_key: record.record_key().to_string(),
            })?;
        let metadata = payload.metadata();
        let inserted = payload
            .get_insert_value(self.table.schema())
            .map_err(|source| UpsertError::InsertValue {
                file_group_id: self.file_group_id.clone(),
                record_key: record.record_key().to_string(),
                source,
            })?;

        let result = match inserted {
            Some(value) => self
                .writer
                .write_with_metadata(value, record.key())
                .map(|()| self.records_written += 1),
            None => {
                self.records_deleted += 1;
                Ok(())
            }
        };
        match result {
            Ok(()) => {
                record.deflate();
                self.write_status.mark_success(&record, metadata);
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
                self.write_status.mark_failure(&record, err, metadata);
            }
        }
        Ok(())
    }

    /// Seal the new base file and return the write status.
    pub fn close(mut self) -> Result<WriteStatus, UpsertError> {
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
        stat.previous_commit = None;
        stat.total_bytes_written = total_bytes_written;
        stat.num_writes = self.records_written;
        stat.num_deletes = self.records_deleted;
        stat.num_update_writes = 0;
        stat.total_write_errors = total_write_errors;

        merge_log!(
            log::Level::Info,
            "create_handle_closed",
            "file_group_id={} commit_time={} path={} bytes={} writes={} errors={}",
            self.file_group_id,
            self.commit_time,
            self.new_file_path.display(),
            total_bytes_written,
            self.records_written,
            total_write_errors
        );
        Ok(self.write_status)
    }
}

impl<P> CreateHandle<P> {
    /// Identifier of the new file group.
    pub fn file_group_id(&self) -> &str {
        &self.file_group_id
    }

    /// Partition the file group belongs to.
    pub fn partition_path(&self) -> &str {
        &self.partition_path
    }

    /// Base file being written.
    pub fn new_file_path(&self) -> &Path {
        &self.new_file_path
    }

    /// Records written so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}

impl<P> fmt::Debug for CreateHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateHandle")
            .field("file_group_id", &self.file_group_id)
            .field("partition_path", &self.partition_path)
            .field("commit_time", &self.commit_time)
            .field("new_file_path", &self.new_file_path)
            .finish()
    }
}

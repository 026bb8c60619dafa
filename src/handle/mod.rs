//! Per-file-group write handles.
//!
//! A [`MergeHandle`] rewrites an existing file group with a batch of pending
//! changes; a [`CreateHandle`] writes the first version of a new file group.
//! Each handle runs on one worker and owns its writer and write status; file
//! groups are disjoint so handles never coordinate.

mod create;
mod merge;

use std::{path::PathBuf, sync::Arc};

pub use create::CreateHandle;
pub use merge::MergeHandle;

use crate::{
    error::{InitError, UpsertError},
    fs::make_data_file_name,
    logging::merge_log,
    partition::PartitionMetadata,
    table::TableContext,
};

/// Output location of one write attempt.
struct OutputPaths {
    /// Relative to the table base path.
    relative: String,
    absolute: PathBuf,
}

/// Work shared by both handles before the writer opens: bootstrap partition
/// metadata, derive the output path and drop what a failed attempt left there.
///
/// Removing stale output makes retries idempotent but is not atomic against
/// concurrent readers of the same path.
fn prepare_output(
    table: &TableContext,
    commit_time: &str,
    task_partition_id: u32,
    partition_path: &str,
    file_group_id: &str,
) -> Result<OutputPaths, InitError> {
    let base_path = table.config().get_base_path();
    PartitionMetadata::new(Arc::clone(table.fs()), commit_time, base_path, partition_path)
        .try_save(task_partition_id)?;

    let file_name = make_data_file_name(commit_time, task_partition_id, file_group_id);
    let relative = if partition_path.is_empty() {
        file_name
    } else {
        format!("{}/{}", partition_path.trim_end_matches('/'), file_name)
    };
    let absolute = base_path.join(&relative);

    if table.fs().exists(&absolute)? {
        table.fs().delete(&absolute)?;
        merge_log!(
            log::Level::Warn,
            "merge_output_cleanup",
            "file_group_id={} path={} reason=partial_output_from_previous_attempt",
            file_group_id,
            absolute.display()
        );
    }
    Ok(OutputPaths { relative, absolute })
}

fn init_error(
    table: &TableContext,
    file_group_id: &str,
    commit_time: &str,
) -> impl FnOnce(InitError) -> UpsertError {
    let file_group_id = file_group_id.to_string();
    let commit_time = commit_time.to_string();
    let base_path = table.config().get_base_path().to_path_buf();
    move |source| UpsertError::Init {
        file_group_id,
        commit_time,
        base_path,
        source,
    }
}

//! Location of a record inside its partition.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Points at the version of a file group, as of a commit, that owns a record.
///
/// Ultimately this resolves to one concrete base file on disk.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordLocation {
    commit_time: String,
    file_group_id: String,
}

impl RecordLocation {
    /// Build a location for `file_group_id` as of `commit_time`.
    pub fn new(commit_time: impl Into<String>, file_group_id: impl Into<String>) -> Self {
        Self {
            commit_time: commit_time.into(),
            file_group_id: file_group_id.into(),
        }
    }

    /// Commit that produced the file-group version.
    pub fn commit_time(&self) -> &str {
        &self.commit_time
    }

    /// Stable identity of the file group.
    pub fn file_group_id(&self) -> &str {
        &self.file_group_id
    }
}

impl fmt::Display for RecordLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecordLocation {{commit_time={}, file_group_id={}}}",
            self.commit_time, self.file_group_id
        )
    }
}

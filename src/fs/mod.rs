//! Filesystem capability and file naming for base files.

mod local;

use std::{
    fmt::{self, Display, Formatter},
    io,
    path::{Path, PathBuf},
};

pub use local::LocalFs;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Kinds of files living in a partition directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Compacted base file.
    Parquet,
    /// Delta log appended to a file group.
    Log,
}

impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FileType::Parquet => write!(f, "parquet"),
            FileType::Log => write!(f, "log"),
        }
    }
}

/// An entry returned by [`FileSystem::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Path of the file.
    pub path: PathBuf,
    /// Size in bytes.
    pub len: u64,
}

impl FileStatus {
    /// Final path component, if it is valid UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// Blocking filesystem operations the merge engine relies on.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Whether anything exists at `path`.
    fn exists(&self, path: &Path) -> io::Result<bool>;

    /// Remove the file at `path`.
    fn delete(&self, path: &Path) -> io::Result<()>;

    /// Size in bytes of the persisted file.
    fn file_len(&self, path: &Path) -> io::Result<u64>;

    /// Create (or truncate) a file for writing, creating parent directories.
    fn create(&self, path: &Path) -> io::Result<Box<dyn io::Write + Send>>;

    /// Whole contents of the file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the file contents, creating it if missing.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Move `from` to `to`, replacing any file at `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Create `path` and all of its missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Regular files directly under `dir`; a missing directory lists as empty.
    fn list(&self, dir: &Path) -> io::Result<Vec<FileStatus>>;
}

/// Canonical base file name for one write attempt of a file group.
///
/// Two attempts of the same task for the same commit map to the same name,
/// which lets a retry find and replace partial output.
pub fn make_data_file_name(
    commit_time: &str,
    task_partition_id: u32,
    file_group_id: &str,
) -> String {
    format!(
        "{file_group_id}_{task_partition_id}_{commit_time}.{}",
        FileType::Parquet
    )
}

fn split_data_file_name(file_name: &str) -> Option<(&str, &str, &str)> {
    let stem = file_name.strip_suffix(&format!(".{}", FileType::Parquet))?;
    let mut parts = stem.rsplitn(3, '_');
    let commit_time = parts.next()?;
    let task = parts.next()?;
    let file_group_id = parts.next()?;
    if commit_time.is_empty() || file_group_id.is_empty() {
        return None;
    }
    Some((file_group_id, task, commit_time))
}

/// Commit time encoded in a base file name.
pub fn commit_time_from_name(file_name: &str) -> Option<&str> {
    split_data_file_name(file_name).map(|(_, _, commit_time)| commit_time)
}

/// File-group id encoded in a base file name.
pub fn file_group_id_from_name(file_name: &str) -> Option<&str> {
    split_data_file_name(file_name).map(|(file_group_id, _, _)| file_group_id)
}

/// Name of the `version`-th delta log of a file group on top of `base_commit_time`.
pub fn make_log_file_name(file_group_id: &str, base_commit_time: &str, version: u32) -> String {
    format!(".{file_group_id}_{base_commit_time}.{}.{version}", FileType::Log)
}

/// File-group id and base commit encoded in a delta log name.
pub fn parse_log_file_name(file_name: &str) -> Option<(&str, &str)> {
    let stem = file_name.strip_prefix('.')?;
    let (stem, version) = stem.rsplit_once('.')?;
    version.parse::<u32>().ok()?;
    let stem = stem.strip_suffix(&format!(".{}", FileType::Log))?;
    let (file_group_id, base_commit_time) = stem.rsplit_once('_')?;
    if file_group_id.is_empty() || base_commit_time.is_empty() {
        return None;
    }
    Some((file_group_id, base_commit_time))
}

/// Whole megabytes in `bytes`, rounded down.
pub fn size_in_mb(bytes: u64) -> u64 {
    bytes / BYTES_PER_MB
}

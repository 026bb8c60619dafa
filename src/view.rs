//! Read-optimized view of the latest base files in a partition.

use std::{
    collections::BTreeMap,
    fmt, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    compaction::LogFile,
    fs::{
        commit_time_from_name, file_group_id_from_name, parse_log_file_name, FileStatus,
        FileSystem,
    },
};

/// A base file as found on storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseFile {
    path: PathBuf,
    file_name: String,
    file_group_id: String,
    commit_time: String,
    size: u64,
}

impl BaseFile {
    /// Describe the file at `path`; `None` when the name is not a base file name.
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Option<Self> {
        let path = path.into();
        let file_name = path.file_name()?.to_str()?.to_string();
        let file_group_id = file_group_id_from_name(&file_name)?.to_string();
        let commit_time = commit_time_from_name(&file_name)?.to_string();
        Some(Self {
            path,
            file_name,
            file_group_id,
            commit_time,
            size,
        })
    }

    fn from_status(status: &FileStatus) -> Option<Self> {
        Self::new(status.path.clone(), status.len)
    }

    /// Location of the base file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// File group the base file belongs to.
    pub fn file_group_id(&self) -> &str {
        &self.file_group_id
    }

    /// Commit that wrote the base file.
    pub fn commit_time(&self) -> &str {
        &self.commit_time
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Resolves the newest base file of each file group.
///
/// Lookups are bounded by a commit: only base files written by strictly
/// earlier commits are visible, so the output of an in-flight or aborted
/// attempt of `before_commit` is never taken for committed data.
pub trait BaseFileView: Send + Sync + fmt::Debug {
    /// Newest base file of `file_group_id` committed before `before_commit`.
    fn latest_base_file(
        &self,
        partition_path: &str,
        file_group_id: &str,
        before_commit: &str,
    ) -> io::Result<Option<BaseFile>>;

    /// Newest base file of every file group in the partition committed before
    /// `before_commit`, ordered by file-group id.
    fn latest_base_files(
        &self,
        partition_path: &str,
        before_commit: &str,
    ) -> io::Result<Vec<BaseFile>>;

    /// Delta logs appended on top of `base_file`, in version order.
    fn log_files(&self, partition_path: &str, base_file: &BaseFile) -> io::Result<Vec<LogFile>>;
}

/// [`BaseFileView`] computed by listing partition directories.
#[derive(Debug, Clone)]
pub struct FsBaseFileView {
    fs: Arc<dyn FileSystem>,
    base_path: PathBuf,
}

impl FsBaseFileView {
    /// View over the table rooted at `base_path`.
    pub fn new(fs: Arc<dyn FileSystem>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            base_path: base_path.into(),
        }
    }

    fn list_partition(&self, partition_path: &str) -> io::Result<Vec<FileStatus>> {
        self.fs.list(&self.base_path.join(partition_path))
    }

    fn visible_base_files(
        &self,
        partition_path: &str,
        before_commit: &str,
    ) -> io::Result<impl Iterator<Item = BaseFile> + '_> {
        let before_commit = before_commit.to_string();
        Ok(self
            .list_partition(partition_path)?
            .into_iter()
            .filter_map(|status| BaseFile::from_status(&status))
            .filter(move |file| file.commit_time.as_str() < before_commit.as_str()))
    }
}

fn is_newer(lhs: &BaseFile, rhs: &BaseFile) -> bool {
    (lhs.commit_time.as_str(), lhs.file_name.as_str())
        > (rhs.commit_time.as_str(), rhs.file_name.as_str())
}

impl BaseFileView for FsBaseFileView {
    fn latest_base_file(
        &self,
        partition_path: &str,
        file_group_id: &str,
        before_commit: &str,
    ) -> io::Result<Option<BaseFile>> {
        let mut latest: Option<BaseFile> = None;
        for file in self.visible_base_files(partition_path, before_commit)? {
            if file.file_group_id != file_group_id {
                continue;
            }
            let replace = latest
                .as_ref()
                .map_or(true, |current| is_newer(&file, current));
            if replace {
                latest = Some(file);
            }
        }
        Ok(latest)
    }

    fn latest_base_files(
        &self,
        partition_path: &str,
        before_commit: &str,
    ) -> io::Result<Vec<BaseFile>> {
        let mut latest: BTreeMap<String, BaseFile> = BTreeMap::new();
        for file in self.visible_base_files(partition_path, before_commit)? {
            match latest.get(&file.file_group_id) {
                Some(current) if !is_newer(&file, current) => {}
                _ => {
                    latest.insert(file.file_group_id.clone(), file);
                }
            }
        }
        Ok(latest.into_values().collect())
    }

    fn log_files(&self, partition_path: &str, base_file: &BaseFile) -> io::Result<Vec<LogFile>> {
        let mut logs: Vec<(u32, LogFile)> = self
            .list_partition(partition_path)?
            .into_iter()
            .filter_map(|status| {
                let name = status.file_name()?;
                let (file_group_id, base_commit) = parse_log_file_name(name)?;
                if file_group_id != base_file.file_group_id
                    || base_commit != base_file.commit_time
                {
                    return None;
                }
                let version = name.rsplit_once('.')?.1.parse::<u32>().ok()?;
                Some((version, LogFile::new(status.path.clone(), Some(status.len))))
            })
            .collect();
        logs.sort_by_key(|(version, _)| *version);
        Ok(logs.into_iter().map(|(_, log)| log).collect())
    }
}

//! Cost-based selection of file groups to compact.
//!
//! Planning captures I/O metrics for every file group that has delta logs on
//! top of its base file, then asks the configured [`CompactionStrategy`] to
//! order the candidates and cut them down to the round's I/O budget.
//! Strategies are stateless and may run concurrently across partitions.

mod bounded;
mod log_size;
mod unbounded;

use std::{
    collections::BTreeMap,
    fmt, io,
    path::{Path, PathBuf},
};

pub use bounded::BoundedIoCompactionStrategy;
pub use log_size::LogFileSizeBasedCompactionStrategy;
pub use unbounded::UnboundedCompactionStrategy;

use crate::{
    logging::merge_log,
    option::WriteConfig,
    view::{BaseFile, BaseFileView},
};

/// Megabytes read by a compaction: base file plus all delta logs.
pub const TOTAL_IO_READ_MB: &str = "TOTAL_IO_READ_MB";
/// Megabytes written by a compaction, approximated by the base file size.
pub const TOTAL_IO_WRITE_MB: &str = "TOTAL_IO_WRITE_MB";
/// Read plus write megabytes.
pub const TOTAL_IO_MB: &str = "TOTAL_IO_MB";
/// Bytes of delta logs pending on the base file.
pub const TOTAL_LOG_FILE_SIZE: &str = "TOTAL_LOG_FILE_SIZE";

/// A delta log of a file group. Its size may be unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    path: PathBuf,
    size: Option<u64>,
}

impl LogFile {
    /// Log file at `path`; `size` is `None` when it could not be determined.
    pub fn new(path: impl Into<PathBuf>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes, if known.
    pub fn size(&self) -> Option<u64> {
        self.size
    }
}

/// Sum of known log sizes; unknown sizes count as zero.
pub(crate) fn total_log_file_size(log_files: &[LogFile]) -> u64 {
    log_files.iter().filter_map(LogFile::size).sum()
}

/// Named numeric metrics captured for one file group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileGroupMetrics {
    values: BTreeMap<String, u64>,
}

impl FileGroupMetrics {
    /// Empty metric set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` under `name`, replacing any earlier value.
    pub fn insert(&mut self, name: impl Into<String>, value: u64) {
        self.values.insert(name.into(), value);
    }

    /// Value captured under `name`.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.get(name).copied()
    }

    /// Metrics in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Metric a strategy relies on.
    ///
    /// # Panics
    ///
    /// Panics if the metric was never captured, which means the operation was
    /// built by a strategy other than the one ordering it.
    pub(crate) fn required(&self, name: &str) -> u64 {
        match self.get(name) {
            Some(value) => value,
            None => panic!("compaction metric {name} was not captured for this operation"),
        }
    }
}

/// One candidate unit of compaction work: a base file and its delta logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionOperation {
    file_group_id: String,
    partition_path: String,
    base_file: BaseFile,
    log_files: Vec<LogFile>,
    metrics: FileGroupMetrics,
}

impl CompactionOperation {
    /// Build an operation, capturing its metrics with `strategy`.
    pub fn new(
        base_file: BaseFile,
        partition_path: impl Into<String>,
        log_files: Vec<LogFile>,
        strategy: &dyn CompactionStrategy,
    ) -> Self {
        let partition_path = partition_path.into();
        let metrics = strategy.capture_metrics(&base_file, &partition_path, &log_files);
        Self {
            file_group_id: base_file.file_group_id().to_string(),
            partition_path,
            base_file,
            log_files,
            metrics,
        }
    }

    /// File group being compacted.
    pub fn file_group_id(&self) -> &str {
        &self.file_group_id
    }

    /// Partition holding the file group.
    pub fn partition_path(&self) -> &str {
        &self.partition_path
    }

    /// Base file the delta logs apply to.
    pub fn base_file(&self) -> &BaseFile {
        &self.base_file
    }

    /// Delta logs to fold into the base file.
    pub fn log_files(&self) -> &[LogFile] {
        &self.log_files
    }

    /// Metrics captured when the operation was built.
    pub fn metrics(&self) -> &FileGroupMetrics {
        &self.metrics
    }
}

/// Decides which file groups to compact in a round, and in what order.
pub trait CompactionStrategy: Send + Sync + fmt::Debug {
    /// Metrics for one file group, from already known file sizes only.
    fn capture_metrics(
        &self,
        base_file: &BaseFile,
        partition_path: &str,
        log_files: &[LogFile],
    ) -> FileGroupMetrics;

    /// Order the candidates and keep the ones admitted under the budget.
    fn order_and_filter(
        &self,
        config: &WriteConfig,
        operations: Vec<CompactionOperation>,
    ) -> Vec<CompactionOperation>;
}

/// Strategies selectable through [`WriteConfig`].
#[derive(Clone, Debug)]
pub enum CompactionStrategyKind {
    /// Input order, bounded by total I/O.
    BoundedIo(BoundedIoCompactionStrategy),
    /// Largest delta backlog first, bounded by total I/O.
    LogFileSizeBased(LogFileSizeBasedCompactionStrategy),
    /// Every candidate, input order.
    Unbounded(UnboundedCompactionStrategy),
}

impl Default for CompactionStrategyKind {
    fn default() -> Self {
        Self::LogFileSizeBased(LogFileSizeBasedCompactionStrategy)
    }
}

impl CompactionStrategy for CompactionStrategyKind {
    fn capture_metrics(
        &self,
        base_file: &BaseFile,
        partition_path: &str,
        log_files: &[LogFile],
    ) -> FileGroupMetrics {
        match self {
            Self::BoundedIo(strategy) => {
                strategy.capture_metrics(base_file, partition_path, log_files)
            }
            Self::LogFileSizeBased(strategy) => {
                strategy.capture_metrics(base_file, partition_path, log_files)
            }
            Self::Unbounded(strategy) => {
                strategy.capture_metrics(base_file, partition_path, log_files)
            }
        }
    }

    fn order_and_filter(
        &self,
        config: &WriteConfig,
        operations: Vec<CompactionOperation>,
    ) -> Vec<CompactionOperation> {
        match self {
            Self::BoundedIo(strategy) => strategy.order_and_filter(config, operations),
            Self::LogFileSizeBased(strategy) => strategy.order_and_filter(config, operations),
            Self::Unbounded(strategy) => strategy.order_and_filter(config, operations),
        }
    }
}

/// Collect candidates across `partition_paths` and select the work of the
/// compaction commit `compaction_commit` with the configured strategy.
///
/// Only base files committed before `compaction_commit` are candidates. File
/// groups without delta logs have nothing to compact and are skipped.
pub fn plan_compaction(
    view: &dyn BaseFileView,
    config: &WriteConfig,
    partition_paths: &[&str],
    compaction_commit: &str,
) -> io::Result<Vec<CompactionOperation>> {
    let strategy = config.get_compaction_strategy();
    let mut candidates = Vec::new();
    for partition_path in partition_paths {
        for base_file in view.latest_base_files(partition_path, compaction_commit)? {
            let log_files = view.log_files(partition_path, &base_file)?;
            if log_files.is_empty() {
                continue;
            }
            candidates.push(CompactionOperation::new(
                base_file,
                *partition_path,
                log_files,
                strategy,
            ));
        }
    }
    let candidate_count = candidates.len();
    let selected = strategy.order_and_filter(config, candidates);
    merge_log!(
        log::Level::Info,
        "compaction_ops_selected",
        "compaction_commit={} candidates={} selected={} target_io_mb={}",
        compaction_commit,
        candidate_count,
        selected.len(),
        config.get_target_io_per_compaction_mb()
    );
    Ok(selected)
}

//! Write and compaction options.

use std::path::{Path, PathBuf};

use crate::{compaction::CompactionStrategyKind, storage::FileCompression};

/// Default I/O budget of one compaction round: 500 GB.
pub const DEFAULT_TARGET_IO_PER_COMPACTION_MB: u64 = 500 * 1024;

/// Write and compaction settings of a table.
#[derive(Debug, Clone)]
pub struct WriteConfig {
    pub(crate) base_path: PathBuf,
    pub(crate) target_io_per_compaction_mb: u64,
    pub(crate) compaction_strategy: CompactionStrategyKind,
    pub(crate) track_success_records: bool,
    pub(crate) max_rows_per_batch: usize,
    pub(crate) compression: FileCompression,
}

impl<P> From<P> for WriteConfig
where
    P: Into<PathBuf>,
{
    fn from(base_path: P) -> Self {
        WriteConfig {
            base_path: base_path.into(),
            target_io_per_compaction_mb: DEFAULT_TARGET_IO_PER_COMPACTION_MB,
            compaction_strategy: CompactionStrategyKind::default(),
            track_success_records: true,
            max_rows_per_batch: 1024,
            compression: FileCompression::default(),
        }
    }
}

impl WriteConfig {
    /// Root directory of the table.
    pub fn base_path(self, base_path: impl Into<PathBuf>) -> Self {
        WriteConfig {
            base_path: base_path.into(),
            ..self
        }
    }

    /// Total read plus write megabytes one compaction round may schedule.
    pub fn target_io_per_compaction_mb(self, target_io_per_compaction_mb: u64) -> Self {
        WriteConfig {
            target_io_per_compaction_mb,
            ..self
        }
    }

    /// Strategy used to plan compaction rounds.
    pub fn compaction_strategy(self, compaction_strategy: CompactionStrategyKind) -> Self {
        WriteConfig {
            compaction_strategy,
            ..self
        }
    }

    /// Keep every successfully written record in the returned write status.
    pub fn track_success_records(self, track_success_records: bool) -> Self {
        WriteConfig {
            track_success_records,
            ..self
        }
    }

    /// Rows buffered before they are written out as one batch.
    pub fn max_rows_per_batch(self, max_rows_per_batch: usize) -> Self {
        WriteConfig {
            max_rows_per_batch,
            ..self
        }
    }

    /// Compression codec of new base files.
    pub fn compression(self, compression: FileCompression) -> Self {
        WriteConfig {
            compression,
            ..self
        }
    }
}

impl WriteConfig {
    /// Root directory of the table.
    pub fn get_base_path(&self) -> &Path {
        &self.base_path
    }

    /// I/O budget of one compaction round in megabytes.
    pub fn get_target_io_per_compaction_mb(&self) -> u64 {
        self.target_io_per_compaction_mb
    }

    /// Strategy used to plan compaction rounds.
    pub fn get_compaction_strategy(&self) -> &CompactionStrategyKind {
        &self.compaction_strategy
    }

    /// Whether successful records are kept in write statuses.
    pub fn is_tracking_success_records(&self) -> bool {
        self.track_success_records
    }

    pub(crate) fn partition_dir(&self, partition_path: &str) -> PathBuf {
        self.base_path.join(partition_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = WriteConfig::from("/tmp/table");
        assert_eq!(
            config.get_target_io_per_compaction_mb(),
            DEFAULT_TARGET_IO_PER_COMPACTION_MB
        );
        assert!(config.is_tracking_success_records());
        assert!(matches!(
            config.get_compaction_strategy(),
            CompactionStrategyKind::LogFileSizeBased(_)
        ));

        let config = config
            .target_io_per_compaction_mb(50)
            .track_success_records(false)
            .compaction_strategy(CompactionStrategyKind::BoundedIo(Default::default()));
        assert_eq!(config.get_target_io_per_compaction_mb(), 50);
        assert!(!config.is_tracking_success_records());
        assert_eq!(config.partition_dir("a/b"), PathBuf::from("/tmp/table/a/b"));
    }
}

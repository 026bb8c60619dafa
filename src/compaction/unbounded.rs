use super::{
    BoundedIoCompactionStrategy, CompactionOperation, CompactionStrategy, FileGroupMetrics,
    LogFile,
};
use crate::{option::WriteConfig, view::BaseFile};

/// Admits every candidate in input order, ignoring the I/O budget.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnboundedCompactionStrategy;

impl CompactionStrategy for UnboundedCompactionStrategy {
    fn capture_metrics(
        &self,
        base_file: &BaseFile,
        _partition_path: &str,
        log_files: &[LogFile],
    ) -> FileGroupMetrics {
        BoundedIoCompactionStrategy::bounded_io_metrics(base_file, log_files)
    }

    fn order_and_filter(
        &self,
        _config: &WriteConfig,
        operations: Vec<CompactionOperation>,
    ) -> Vec<CompactionOperation> {
        operations
    }
}

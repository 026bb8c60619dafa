use super::{
    total_log_file_size, CompactionOperation, CompactionStrategy, FileGroupMetrics, LogFile,
    TOTAL_IO_MB, TOTAL_IO_READ_MB, TOTAL_IO_WRITE_MB,
};
use crate::{fs::size_in_mb, option::WriteConfig, view::BaseFile};

/// Admits operations in input order until the round's total I/O budget is spent.
///
/// The operation that exhausts the budget is still admitted, so a single
/// operation larger than the whole budget makes progress instead of starving.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoundedIoCompactionStrategy;

impl BoundedIoCompactionStrategy {
    pub(crate) fn bounded_io_metrics(
        base_file: &BaseFile,
        log_files: &[LogFile],
    ) -> FileGroupMetrics {
        let total_io_read = size_in_mb(base_file.size() + total_log_file_size(log_files));
        // the rewritten base file is assumed to be about as large as the old one
        let total_io_write = size_in_mb(base_file.size());
        let mut metrics = FileGroupMetrics::new();
        metrics.insert(TOTAL_IO_READ_MB, total_io_read);
        metrics.insert(TOTAL_IO_WRITE_MB, total_io_write);
        metrics.insert(TOTAL_IO_MB, total_io_read + total_io_write);
        metrics
    }

    pub(crate) fn select_within_budget(
        target_io_mb: u64,
        operations: Vec<CompactionOperation>,
    ) -> Vec<CompactionOperation> {
        let mut remaining = i128::from(target_io_mb);
        let mut selected = Vec::new();
        for op in operations {
            remaining -= i128::from(op.metrics().required(TOTAL_IO_MB));
            selected.push(op);
            if remaining <= 0 {
                break;
            }
        }
        selected
    }
}

impl CompactionStrategy for BoundedIoCompactionStrategy {
    fn capture_metrics(
        &self,
        base_file: &BaseFile,
        _partition_path: &str,
        log_files: &[LogFile],
    ) -> FileGroupMetrics {
        Self::bounded_io_metrics(base_file, log_files)
    }

    fn order_and_filter(
        &self,
        config: &WriteConfig,
        operations: Vec<CompactionOperation>,
    ) -> Vec<CompactionOperation> {
        Self::select_within_budget(config.get_target_io_per_compaction_mb(), operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compaction::test_support::*;

    fn config(budget: u64) -> WriteConfig {
        WriteConfig::from("/table").target_io_per_compaction_mb(budget)
    }

    #[test]
    fn stops_after_the_operation_that_exhausts_budget() {
        let ops = vec![
            operation_with("a", 40, None),
            operation_with("b", 35, None),
            operation_with("c", 30, None),
        ];
        let selected = BoundedIoCompactionStrategy.order_and_filter(&config(50), ops);
        assert_eq!(ids(&selected), vec!["a", "b"]);
    }

    #[test]
    fn cheap_operations_are_all_admitted_in_order() {
        let ops = vec![
            operation_with("c", 1, None),
            operation_with("a", 2, None),
            operation_with("b", 3, None),
        ];
        let selected = BoundedIoCompactionStrategy.order_and_filter(&config(100), ops);
        assert_eq!(ids(&selected), vec!["c", "a", "b"]);
        assert!(BoundedIoCompactionStrategy
            .order_and_filter(&config(100), Vec::new())
            .is_empty());
    }

    #[test]
    fn oversized_first_operation_still_makes_progress() {
        let ops = vec![operation_with("huge", 500, None), operation_with("b", 1, None)];
        let selected = BoundedIoCompactionStrategy.order_and_filter(&config(50), ops);
        assert_eq!(ids(&selected), vec!["huge"]);
    }

    #[test]
    fn exact_budget_hit_stops_selection() {
        let ops = vec![
            operation_with("a", 25, None),
            operation_with("b", 25, None),
            operation_with("c", 1, None),
        ];
        let selected = BoundedIoCompactionStrategy.order_and_filter(&config(50), ops);
        assert_eq!(ids(&selected), vec!["a", "b"]);
    }

    #[test]
    fn unknown_log_sizes_count_as_zero() {
        let metrics = BoundedIoCompactionStrategy.capture_metrics(
            &base_file("fg", 3 * MB),
            "p",
            &[
                LogFile::new("/table/p/.fg_001.log.1", Some(2 * MB)),
                LogFile::new("/table/p/.fg_001.log.2", None),
            ],
        );
        assert_eq!(metrics.get(TOTAL_IO_READ_MB), Some(5));
        assert_eq!(metrics.get(TOTAL_IO_WRITE_MB), Some(3));
        assert_eq!(metrics.get(TOTAL_IO_MB), Some(8));
    }
}

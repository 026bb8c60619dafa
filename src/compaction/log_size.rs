use super::{
    total_log_file_size, BoundedIoCompactionStrategy, CompactionOperation, CompactionStrategy,
    FileGroupMetrics, LogFile, TOTAL_LOG_FILE_SIZE,
};
use crate::{option::WriteConfig, view::BaseFile};

/// Compacts the file groups with the largest delta backlog first, within the
/// same I/O budget as [`BoundedIoCompactionStrategy`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFileSizeBasedCompactionStrategy;

impl CompactionStrategy for LogFileSizeBasedCompactionStrategy {
    fn capture_metrics(
        &self,
        base_file: &BaseFile,
        _partition_path: &str,
        log_files: &[LogFile],
    ) -> FileGroupMetrics {
        let mut metrics = BoundedIoCompactionStrategy::bounded_io_metrics(base_file, log_files);
        metrics.insert(TOTAL_LOG_FILE_SIZE, total_log_file_size(log_files));
        metrics
    }

    fn order_and_filter(
        &self,
        config: &WriteConfig,
        mut operations: Vec<CompactionOperation>,
    ) -> Vec<CompactionOperation> {
        // stable: equal backlogs keep their input order
        operations.sort_by(|lhs, rhs| {
            rhs.metrics()
                .required(TOTAL_LOG_FILE_SIZE)
                .cmp(&lhs.metrics().required(TOTAL_LOG_FILE_SIZE))
        });
        BoundedIoCompactionStrategy::select_within_budget(
            config.get_target_io_per_compaction_mb(),
            operations,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compaction::{test_support::*, TOTAL_IO_MB};

    fn config(budget: u64) -> WriteConfig {
        WriteConfig::from("/table").target_io_per_compaction_mb(budget)
    }

    fn candidates() -> Vec<CompactionOperation> {
        vec![
            operation_with("A", 20, Some(10)),
            operation_with("B", 20, Some(50)),
            operation_with("C", 20, Some(30)),
        ]
    }

    #[test]
    fn largest_backlog_first_then_bounded() {
        let selected =
            LogFileSizeBasedCompactionStrategy.order_and_filter(&config(35), candidates());
        // B leaves 15, C leaves -5 and stops the round.
        assert_eq!(ids(&selected), vec!["B", "C"]);
    }

    #[test]
    fn generous_budget_keeps_sorted_order() {
        let selected =
            LogFileSizeBasedCompactionStrategy.order_and_filter(&config(100), candidates());
        assert_eq!(ids(&selected), vec!["B", "C", "A"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let ops = vec![
            operation_with("x", 1, Some(5)),
            operation_with("y", 1, Some(5)),
            operation_with("z", 1, Some(9)),
        ];
        let selected = LogFileSizeBasedCompactionStrategy.order_and_filter(&config(100), ops);
        assert_eq!(ids(&selected), vec!["z", "x", "y"]);
    }

    #[test]
    fn ordering_does_not_touch_metrics() {
        let before = candidates();
        let selected =
            LogFileSizeBasedCompactionStrategy.order_and_filter(&config(100), before.clone());
        for op in &selected {
            let original = before
                .iter()
                .find(|candidate| candidate.file_group_id() == op.file_group_id())
                .unwrap();
            assert_eq!(op.metrics(), original.metrics());
        }
    }

    #[test]
    fn captures_log_size_with_unknown_as_zero() {
        let metrics = LogFileSizeBasedCompactionStrategy.capture_metrics(
            &base_file("fg", 0),
            "p",
            &[
                LogFile::new("/table/p/.fg_001.log.1", Some(700)),
                LogFile::new("/table/p/.fg_001.log.2", None),
                LogFile::new("/table/p/.fg_001.log.3", Some(300)),
            ],
        );
        assert_eq!(metrics.get(TOTAL_LOG_FILE_SIZE), Some(1000));
        assert_eq!(metrics.get(TOTAL_IO_MB), Some(0));
    }

    #[test]
    #[should_panic(expected = "TOTAL_LOG_FILE_SIZE")]
    fn operations_without_log_size_metric_are_rejected() {
        let ops = vec![operation_with("a", 1, None), operation_with("b", 1, None)];
        LogFileSizeBasedCompactionStrategy.order_and_filter(&config(10), ops);
    }
}

use std::{fs::File, path::Path, sync::Arc};

use arrow::datatypes::{DataType, Field};
use lakemerge::{
    compaction::{
        BoundedIoCompactionStrategy, LogFileSizeBasedCompactionStrategy,
        UnboundedCompactionStrategy,
    },
    fs::{make_log_file_name, FileSystem, LocalFs},
    partition::{PartitionMetadata, PARTITION_METADATA_FILE},
    record::OverwriteWithLatestPayload,
    storage::ParquetRecordReader,
    CompactionOperation, CompactionStrategyKind, CreateHandle, DynRecord, MergeHandle,
    PendingRecord, RecordKey, RecordSchema, TableContext, Value, WriteConfig,
};
use tempfile::TempDir;

const PARTITION: &str = "region=eu";
const MB: u64 = 1024 * 1024;

fn schema() -> Arc<RecordSchema> {
    Arc::new(RecordSchema::new(vec![Field::new("score", DataType::Int64, false)]).unwrap())
}

fn table(dir: &TempDir, strategy: CompactionStrategyKind) -> TableContext {
    let config = WriteConfig::from(dir.path())
        .compaction_strategy(strategy)
        .target_io_per_compaction_mb(50);
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFs);
    TableContext::new(config, schema(), fs)
}

fn upsert(key: &str, score: i64) -> PendingRecord<OverwriteWithLatestPayload> {
    let record = schema().record(vec![Value::Int64(score)]);
    PendingRecord::new(
        RecordKey::new(key, PARTITION),
        OverwriteWithLatestPayload::new(record),
    )
}

fn delete(key: &str) -> PendingRecord<OverwriteWithLatestPayload> {
    PendingRecord::new(
        RecordKey::new(key, PARTITION),
        OverwriteWithLatestPayload::delete(),
    )
}

/// File groups written at commit `001`, each with one delta log of the given
/// size in megabytes.
fn seed(dir: &TempDir, table: &TableContext, log_sizes_mb: &[(&str, u64)]) {
    for (idx, (file_group_id, log_size_mb)) in log_sizes_mb.iter().enumerate() {
        let mut handle = CreateHandle::new(
            table.clone(),
            "001",
            idx as u32,
            PARTITION,
            Some(file_group_id.to_string()),
        )
        .unwrap();
        for key in ["k1", "k2", "k3"] {
            handle
                .write(upsert(&format!("{file_group_id}-{key}"), 1))
                .unwrap();
        }
        handle.close().unwrap();

        let log_path = dir
            .path()
            .join(PARTITION)
            .join(make_log_file_name(file_group_id, "001", 1));
        File::create(log_path)
            .unwrap()
            .set_len(log_size_mb * MB)
            .unwrap();
    }
}

fn ids(operations: &[CompactionOperation]) -> Vec<&str> {
    operations
        .iter()
        .map(CompactionOperation::file_group_id)
        .collect()
}

fn read(table: &TableContext, path: &Path) -> Vec<DynRecord> {
    ParquetRecordReader::open(table.fs().as_ref(), path, Arc::clone(table.schema()))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn strategies_select_within_the_io_budget() {
    let sizes = [("fga", 10), ("fgb", 40), ("fgc", 35)];
    let cases = [
        (
            CompactionStrategyKind::LogFileSizeBased(LogFileSizeBasedCompactionStrategy),
            vec!["fgb", "fgc"],
        ),
        (
            CompactionStrategyKind::BoundedIo(BoundedIoCompactionStrategy),
            vec!["fga", "fgb"],
        ),
        (
            CompactionStrategyKind::Unbounded(UnboundedCompactionStrategy),
            vec!["fga", "fgb", "fgc"],
        ),
    ];
    for (strategy, expected) in cases {
        let dir = TempDir::new().unwrap();
        let table = table(&dir, strategy);
        seed(&dir, &table, &sizes);

        let operations = table.plan_compaction(&[PARTITION], "002").unwrap();
        assert_eq!(ids(&operations), expected);
        for operation in &operations {
            assert_eq!(operation.partition_path(), PARTITION);
            assert_eq!(operation.log_files().len(), 1);
        }
    }
}

#[test]
fn merged_file_group_supersedes_its_base_file() {
    let dir = TempDir::new().unwrap();
    let table = table(&dir, CompactionStrategyKind::default());
    seed(&dir, &table, &[("fga", 10), ("fgb", 40)]);

    let operations = table.plan_compaction(&[PARTITION], "002").unwrap();
    assert_eq!(ids(&operations), vec!["fgb", "fga"]);

    let mut handle = MergeHandle::new(
        table.clone(),
        "002",
        7,
        "fgb",
        vec![upsert("fgb-k2", 20), delete("fgb-k3"), upsert("fgb-k9", 90)],
    )
    .unwrap();
    assert_eq!(handle.old_file_path(), operations[0].base_file().path());
    handle.merge_base_file().unwrap();
    let new_path = handle.new_file_path().to_path_buf();
    let status = handle.close().unwrap();

    assert!(!status.has_errors());
    assert_eq!(status.stat().previous_commit.as_deref(), Some("001"));
    assert_eq!(status.stat().num_writes, 3);
    assert_eq!(status.stat().num_deletes, 1);
    assert_eq!(status.stat().num_update_writes, 2);

    let rows = read(&table, &new_path);
    let keys: Vec<_> = rows.iter().map(|row| row.record_key().unwrap()).collect();
    assert_eq!(keys, vec!["fgb-k1", "fgb-k2", "fgb-k9"]);
    assert_eq!(rows[0].commit_time(), Some("001"));
    assert_eq!(rows[1].commit_time(), Some("002"));
    assert_eq!(rows[1].user_values(), &[Value::Int64(20)]);
    assert_eq!(rows[2].file_name(), Some("fgb_7_002.parquet"));

    let latest = table
        .view()
        .latest_base_file(PARTITION, "fgb", "003")
        .unwrap()
        .unwrap();
    assert_eq!(latest.commit_time(), "002");

    // the delta log belongs to the superseded base file
    let operations = table.plan_compaction(&[PARTITION], "003").unwrap();
    assert_eq!(ids(&operations), vec!["fga"]);
}

#[test]
fn partition_metadata_keeps_the_first_commit() {
    let dir = TempDir::new().unwrap();
    let table = table(&dir, CompactionStrategyKind::default());
    seed(&dir, &table, &[("fga", 1)]);

    let mut handle =
        MergeHandle::new(table.clone(), "002", 0, "fga", vec![upsert("fga-k1", 5)]).unwrap();
    handle.merge_base_file().unwrap();
    handle.close().unwrap();

    assert!(dir
        .path()
        .join(PARTITION)
        .join(PARTITION_METADATA_FILE)
        .exists());
    let metadata = PartitionMetadata::new(Arc::clone(table.fs()), "003", dir.path(), PARTITION)
        .read()
        .unwrap()
        .unwrap();
    assert_eq!(metadata.commit_time, "001");
    assert_eq!(metadata.partition_depth, 1);
}

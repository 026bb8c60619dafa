//! Per-table context shared by write handles.

use std::{fmt, io, sync::Arc};

use crate::{
    compaction::{plan_compaction, CompactionOperation},
    fs::FileSystem,
    id::FileGroupIdGenerator,
    option::WriteConfig,
    record::RecordSchemaRef,
    storage::{ParquetWriterFactory, StorageWriterFactory},
    view::{BaseFileView, FsBaseFileView},
};

/// Configuration, schema and storage collaborators shared by the handles of
/// one table.
#[derive(Clone)]
pub struct TableContext {
    config: Arc<WriteConfig>,
    schema: RecordSchemaRef,
    fs: Arc<dyn FileSystem>,
    view: Arc<dyn BaseFileView>,
    writer_factory: Arc<dyn StorageWriterFactory>,
    id_generator: Arc<FileGroupIdGenerator>,
}

impl TableContext {
    /// Context backed by `fs`, listing base files from disk and writing parquet.
    pub fn new(config: WriteConfig, schema: RecordSchemaRef, fs: Arc<dyn FileSystem>) -> Self {
        let view = Arc::new(FsBaseFileView::new(
            Arc::clone(&fs),
            config.get_base_path().to_path_buf(),
        ));
        let writer_factory = Arc::new(
            ParquetWriterFactory::new(Arc::clone(&fs))
                .with_max_rows_per_batch(config.max_rows_per_batch)
                .with_compression(config.compression),
        );
        Self {
            config: Arc::new(config),
            schema,
            fs,
            view,
            writer_factory,
            id_generator: Arc::new(FileGroupIdGenerator::new()),
        }
    }

    /// Replace the base file view.
    pub fn with_view(mut self, view: Arc<dyn BaseFileView>) -> Self {
        self.view = view;
        self
    }

    /// Replace the factory opening base file writers.
    pub fn with_writer_factory(mut self, writer_factory: Arc<dyn StorageWriterFactory>) -> Self {
        self.writer_factory = writer_factory;
        self
    }

    /// Write settings of the table.
    pub fn config(&self) -> &WriteConfig {
        &self.config
    }

    /// Schema of records, metadata columns included.
    pub fn schema(&self) -> &RecordSchemaRef {
        &self.schema
    }

    /// Filesystem holding the table.
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// View resolving latest base files.
    pub fn view(&self) -> &Arc<dyn BaseFileView> {
        &self.view
    }

    /// Factory opening base file writers.
    pub fn writer_factory(&self) -> &Arc<dyn StorageWriterFactory> {
        &self.writer_factory
    }

    pub(crate) fn next_file_group_id(&self) -> String {
        self.id_generator.generate()
    }

    /// Select the work of compaction commit `compaction_commit` across
    /// `partition_paths`.
    pub fn plan_compaction(
        &self,
        partition_paths: &[&str],
        compaction_commit: &str,
    ) -> io::Result<Vec<CompactionOperation>> {
        plan_compaction(
            self.view.as_ref(),
            &self.config,
            partition_paths,
            compaction_commit,
        )
    }
}

impl fmt::Debug for TableContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableContext")
            .field("base_path", &self.config.get_base_path())
            .field("schema", &self.schema.to_string())
            .field("view", &self.view)
            .field("writer_factory", &self.writer_factory)
            .finish()
    }
}

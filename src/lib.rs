#![deny(missing_docs)]

//! Copy-on-write merge engine for file-group organised lake tables.
//!
//! A table partition is split into file groups. Each file group has a
//! columnar base file and, optionally, delta log files appended on top of it.
//! This crate provides:
//!
//! - [`MergeHandle`], which rewrites one file group by streaming its latest
//!   base file and folding in a batch of pending changes;
//! - [`CreateHandle`], which writes the first base file of a new file group;
//! - compaction planning ([`compaction`]), which ranks file groups with
//!   delta logs and keeps a round within an I/O budget.
//!
//! Handles are single-threaded. Callers run one handle per file group and
//! may run handles for different file groups in parallel.

mod logging;

pub mod compaction;
pub mod error;
pub mod fs;
pub mod handle;
pub mod id;
pub mod location;
pub mod option;
pub mod partition;
pub mod record;
pub mod storage;
pub mod table;
pub mod view;
pub mod write_status;

#[cfg(test)]
mod test_util;

pub use crate::{
    compaction::{CompactionOperation, CompactionStrategy, CompactionStrategyKind},
    error::{ResolutionError, UpsertError},
    handle::{CreateHandle, MergeHandle},
    location::RecordLocation,
    option::WriteConfig,
    record::{DynRecord, PendingRecord, RecordKey, RecordPayload, RecordSchema, Value},
    table::TableContext,
    write_status::{WriteStat, WriteStatus},
};

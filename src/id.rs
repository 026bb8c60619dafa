//! Identifiers of new file groups.

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use ulid::{Generator, Ulid};

/// Hands out identifiers for new file groups.
pub struct FileGroupIdGenerator {
    inner: Mutex<Generator>,
}

impl FileGroupIdGenerator {
    /// Create a new generator seeded with the current time.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }

    /// Produce the next id in a monotonic, time-ordered sequence.
    pub fn generate(&self) -> String {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // the monotonic sequence only overflows within a single millisecond
        guard
            .generate()
            .unwrap_or_else(|_| Ulid::new())
            .to_string()
    }
}

impl fmt::Debug for FileGroupIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileGroupIdGenerator").finish_non_exhaustive()
    }
}

impl Default for FileGroupIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

use serde::{Deserialize, Serialize};

use crate::entry::{ArchiveEntry, EntryKind};

/// Totals for one create or extract run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub files: u64,
    pub dirs: u64,
    pub symlinks: u64,
    pub logical_bytes: u64,
}

impl Stats {
    pub(crate) fn record(&mut self, entry: &ArchiveEntry, bytes: u64) {
        match entry.kind {
            EntryKind::File => self.files += 1,
            EntryKind::Directory => self.dirs += 1,
            EntryKind::Symlink => self.symlinks += 1,
        }
        self.logical_bytes += bytes;
    }

    pub fn entries(&self) -> u64 {
        self.files + self.dirs + self.symlinks
    }
}

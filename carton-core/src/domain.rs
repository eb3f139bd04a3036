use serde::Serialize;

use crate::entry::{ArchiveEntry, EntryKind};

/// Listing row for one archive entry.
#[derive(Clone, Debug, Serialize)]
pub struct EntryRow {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mode: u32,
    pub mtime: i64,
    pub codec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
}

impl From<&ArchiveEntry> for EntryRow {
    fn from(e: &ArchiveEntry) -> Self {
        EntryRow {
            path: e.name.clone(),
            kind: e.kind,
            size: e.size,
            mode: e.mode,
            mtime: e.mtime,
            codec: e.codec.to_string(),
            link_target: e.link_target.clone(),
        }
    }
}

use crate::codec::CodecId;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryKind::File => "file",
            EntryKind::Directory => "dir",
            EntryKind::Symlink => "symlink",
        })
    }
}

/// One record of an archive: header metadata, payload read separately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// `/`-separated, without leading `./` or trailing `/`.
    pub name: String,
    pub kind: EntryKind,
    /// Uncompressed payload length; zero for directories and symlinks.
    pub size: u64,
    /// Permission bits only (`0o7777`).
    pub mode: u32,
    /// Seconds since the Unix epoch.
    pub mtime: i64,
    /// Codec of the payload inside the container.
    pub codec: CodecId,
    pub crc32: Option<u32>,
    pub link_target: Option<String>,
    /// Position within the archive, assigned while streaming.
    pub index: u64,
}

pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_DIR_MODE: u32 = 0o755;

impl ArchiveEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: normalize_name(&name.into()),
            kind: EntryKind::File,
            size,
            mode: DEFAULT_FILE_MODE,
            mtime: 0,
            codec: CodecId::Store,
            crc32: None,
            link_target: None,
            index: 0,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Directory,
            mode: DEFAULT_DIR_MODE,
            ..Self::file(name, 0)
        }
    }

    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Symlink,
            mode: 0o777,
            link_target: Some(target.into()),
            ..Self::file(name, 0)
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode & 0o7777;
        self
    }

    pub fn with_mtime(mut self, mtime: i64) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }

    pub fn modified(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.mtime).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    /// Name as written into containers that mark directories with a trailing slash.
    pub fn stored_name(&self) -> String {
        if self.is_dir() {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Strips `./` prefixes, duplicate and trailing slashes, and converts `\` to `/`.
pub fn normalize_name(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            p => parts.push(p),
        }
    }
    let joined = parts.join("/");
    if unified.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_names() {
        assert_eq!(normalize_name("./folder/"), "folder");
        assert_eq!(normalize_name("a//b/./c"), "a/b/c");
        assert_eq!(normalize_name("win\\path\\f.txt"), "win/path/f.txt");
        // absolute paths survive so extraction can reject them
        assert_eq!(normalize_name("/etc/passwd"), "/etc/passwd");
        assert_eq!(normalize_name("../up"), "../up");
    }

    #[test]
    fn directories_get_trailing_slash_when_stored() {
        assert_eq!(ArchiveEntry::directory("folder/").stored_name(), "folder/");
        assert_eq!(ArchiveEntry::file("f.txt", 1).stored_name(), "f.txt");
    }

    #[test]
    fn with_mode_masks_type_bits() {
        let e = ArchiveEntry::file("x", 0).with_mode(0o100755);
        assert_eq!(e.mode, 0o755);
    }
}

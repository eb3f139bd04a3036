//! 7z archives through `sevenz-rust`.
//!
//! 7z keeps its headers after the packed streams and decodes solid blocks in
//! one pass, so the reader unpacks every entry into an anonymous spool up
//! front and serves payloads from there. The writer collects entries in a
//! spool of its own and builds the archive on `finish`.

use super::{ContainerReader, ContainerWriter};
use crate::codec::{CodecId, EncodeWrite};
use crate::entry::{ArchiveEntry, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, EntryKind, normalize_name};
use crate::error::{CartonError, Result, format_err};
use crate::util::SectionReader;
use sevenz_rust::{Password, SevenZArchiveEntry};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

pub const MAGIC: &[u8; 6] = b"7z\xBC\xAF\x27\x1C";

const ATTR_DIRECTORY: u32 = 0x10;
/// Set by p7zip when the high 16 bits carry a Unix `st_mode`.
const ATTR_UNIX_EXTENSION: u32 = 0x8000;
const S_IFMT: u32 = 0o170_000;
const S_IFREG: u32 = 0o100_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFLNK: u32 = 0o120_000;
const MAX_LINK_TARGET: u64 = 4096;

fn archive_err(e: impl std::fmt::Display) -> CartonError {
    format_err(format!("7z: {e}"))
}

fn unix_mode(e: &SevenZArchiveEntry) -> Option<u32> {
    (e.has_windows_attributes && e.windows_attributes & ATTR_UNIX_EXTENSION != 0)
        .then(|| e.windows_attributes >> 16)
}

fn unix_seconds(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}

fn system_time(mtime: i64) -> SystemTime {
    if mtime >= 0 {
        UNIX_EPOCH + Duration::from_secs(mtime as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(mtime.unsigned_abs())
    }
}

pub struct SevenZipReader {
    spool: Arc<Mutex<File>>,
    entries: std::vec::IntoIter<(ArchiveEntry, u64)>,
    payload: Option<SectionReader<File>>,
}

impl SevenZipReader {
    pub fn new(mut src: File) -> Result<Self> {
        let len = src.seek(SeekFrom::End(0))?;
        src.seek(SeekFrom::Start(0))?;
        let mut archive =
            sevenz_rust::SevenZReader::new(src, len, Password::empty()).map_err(archive_err)?;

        let mut spool = tempfile::tempfile()?;
        let mut entries = Vec::new();
        let mut offset = 0u64;
        let mut failure: Option<CartonError> = None;

        archive
            .for_each_entries(|e, data| {
                let name = normalize_name(&e.name);
                let name = name.trim_start_matches('/');
                if name.is_empty() {
                    debug!(raw = %e.name, "skipping nameless 7z entry");
                    return Ok(true);
                }
                let st_mode = unix_mode(e);
                let perm = st_mode.map(|m| m & 0o7777).filter(|m| *m != 0);
                let mtime = if e.has_last_modified_date {
                    unix_seconds(e.last_modified_date.into())
                } else {
                    0
                };

                let entry = if e.is_directory || st_mode.is_some_and(|m| m & S_IFMT == S_IFDIR) {
                    ArchiveEntry::directory(name).with_mode(perm.unwrap_or(DEFAULT_DIR_MODE))
                } else if st_mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
                    let mut target = String::new();
                    if let Err(err) = Read::take(data, MAX_LINK_TARGET).read_to_string(&mut target)
                    {
                        failure = Some(err.into());
                        return Ok(false);
                    }
                    ArchiveEntry::symlink(name, target)
                } else {
                    let n = match io::copy(data, &mut spool) {
                        Ok(n) => n,
                        Err(err) => {
                            failure = Some(err.into());
                            return Ok(false);
                        }
                    };
                    let mut f =
                        ArchiveEntry::file(name, n).with_mode(perm.unwrap_or(DEFAULT_FILE_MODE));
                    f.codec = CodecId::Xz;
                    f
                };
                let size = entry.size;
                entries.push((entry.with_mtime(mtime), offset));
                offset += size;
                Ok(true)
            })
            .map_err(archive_err)?;
        if let Some(err) = failure {
            return Err(err);
        }
        // Entries without data come last from the decoder; parents go first.
        entries.sort_by_key(|(e, _)| !e.is_dir());
        debug!(entries = entries.len(), bytes = offset, "unpacked 7z archive");

        Ok(Self {
            spool: Arc::new(Mutex::new(spool)),
            entries: entries.into_iter(),
            payload: None,
        })
    }
}

impl ContainerReader for SevenZipReader {
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        self.payload = None;
        let Some((entry, offset)) = self.entries.next() else {
            return Ok(None);
        };
        if entry.is_file() {
            self.payload = Some(SectionReader::new(self.spool.clone(), offset, entry.size));
        }
        Ok(Some(entry))
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.payload.as_mut() {
            Some(p) => p.read(buf),
            None => Ok(0),
        }
    }
}

pub struct SevenZipWriter {
    out: Box<dyn EncodeWrite>,
    spool: File,
    entries: Vec<(ArchiveEntry, u64, u64)>,
    spooled: u64,
}

impl SevenZipWriter {
    pub fn new(out: Box<dyn EncodeWrite>) -> Result<Self> {
        Ok(Self {
            out,
            spool: tempfile::tempfile()?,
            entries: Vec::new(),
            spooled: 0,
        })
    }

    fn record(entry: &ArchiveEntry) -> SevenZArchiveEntry {
        let mut rec = SevenZArchiveEntry::new();
        rec.name = entry.name.clone();
        rec.is_directory = entry.is_dir();
        rec.has_last_modified_date = true;
        rec.last_modified_date = system_time(entry.mtime).into();
        let (kind, dos) = match entry.kind {
            EntryKind::Directory => (S_IFDIR, ATTR_DIRECTORY),
            EntryKind::Symlink => (S_IFLNK, 0),
            EntryKind::File => (S_IFREG, 0),
        };
        rec.has_windows_attributes = true;
        rec.windows_attributes = ((kind | (entry.mode & 0o7777)) << 16) | ATTR_UNIX_EXTENSION | dos;
        rec
    }
}

impl ContainerWriter for SevenZipWriter {
    fn put_entry(&mut self, entry: &ArchiveEntry, data: &mut dyn Read) -> Result<()> {
        let start = self.spooled;
        let len = match entry.kind {
            EntryKind::Directory => 0,
            EntryKind::Symlink => {
                let target = entry.link_target.as_deref().unwrap_or_default();
                self.spool.write_all(target.as_bytes())?;
                target.len() as u64
            }
            EntryKind::File => {
                let copied = io::copy(&mut Read::take(data, entry.size), &mut self.spool)?;
                if copied != entry.size {
                    return Err(format_err(format!(
                        "{} changed size while archiving ({copied} of {} bytes)",
                        entry.name, entry.size
                    )));
                }
                copied
            }
        };
        self.spooled += len;
        self.entries.push((entry.clone(), start, len));
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let Self {
            mut out,
            spool,
            entries,
            ..
        } = *self;
        let spool = Arc::new(Mutex::new(spool));
        let mut archive = sevenz_rust::SevenZWriter::new(tempfile::tempfile()?)
            .map_err(archive_err)?;
        for (entry, offset, len) in &entries {
            let rec = Self::record(entry);
            if entry.is_dir() {
                archive
                    .push_archive_entry(rec, None::<io::Empty>)
                    .map_err(archive_err)?;
            } else {
                let data = SectionReader::new(spool.clone(), *offset, *len);
                archive
                    .push_archive_entry(rec, Some(data))
                    .map_err(archive_err)?;
            }
        }
        let mut packed = archive.finish().map_err(archive_err)?;
        packed.seek(SeekFrom::Start(0))?;
        let n = io::copy(&mut packed, &mut out)?;
        debug!(entries = entries.len(), bytes = n, "wrote 7z archive");
        out.finish()?.flush()?;
        Ok(())
    }
}

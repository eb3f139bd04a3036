//! POSIX/GNU tar. Reading walks 512-byte blocks directly so the payload of the
//! current entry can be handed out without borrowing the archive; headers are
//! decoded with the `tar` crate. Writing goes through `tar::Builder`.

use super::{ContainerReader, ContainerWriter};
use crate::codec::{CodecId, EncodeWrite};
use crate::entry::{ArchiveEntry, EntryKind, normalize_name};
use crate::error::{Result, format_err};
use crate::util::{CrcReader, read_full_or_eof, skip};
use std::io::{self, Read, Write};
use tracing::debug;

const BLOCK: u64 = 512;
const MAX_META_LEN: u64 = 1 << 20;

fn padding(size: u64) -> u64 {
    (BLOCK - size % BLOCK) % BLOCK
}

fn header_sum(block: &[u8; 512]) -> u32 {
    block
        .iter()
        .enumerate()
        .map(|(i, b)| if (148..156).contains(&i) { 32 } else { u32::from(*b) })
        .sum()
}

fn trim_nul(mut v: Vec<u8>) -> Vec<u8> {
    while v.last() == Some(&0) {
        v.pop();
    }
    v
}

/// Splits a pax extended header into `key=value` records of the form
/// `"<len> <key>=<value>\n"`.
fn pax_records(data: &[u8]) -> Result<Vec<(&str, &[u8])>> {
    let mut out = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let sp = rest
            .iter()
            .position(|b| *b == b' ')
            .ok_or_else(|| format_err("malformed pax record"))?;
        let len: usize = std::str::from_utf8(&rest[..sp])
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|l| *l > sp + 1 && *l <= rest.len())
            .ok_or_else(|| format_err("malformed pax record length"))?;
        let record = &rest[sp + 1..len];
        let record = record.strip_suffix(b"\n").unwrap_or(record);
        let eq = record
            .iter()
            .position(|b| *b == b'=')
            .ok_or_else(|| format_err("pax record without '='"))?;
        let key = std::str::from_utf8(&record[..eq]).map_err(|_| format_err("non-utf8 pax key"))?;
        out.push((key, &record[eq + 1..]));
        rest = &rest[len..];
    }
    Ok(out)
}

#[derive(Default)]
struct Pending {
    name: Option<Vec<u8>>,
    link: Option<Vec<u8>>,
    size: Option<u64>,
    mtime: Option<i64>,
}

pub struct TarReader {
    src: Box<dyn Read + Send>,
    remaining: u64,
    tail: u64,
    done: bool,
}

impl TarReader {
    pub fn new(src: Box<dyn Read + Send>) -> Self {
        Self {
            src,
            remaining: 0,
            tail: 0,
            done: false,
        }
    }

    fn read_meta(&mut self, size: u64) -> Result<Vec<u8>> {
        if size > MAX_META_LEN {
            return Err(format_err(format!("tar extension header of {size} bytes")));
        }
        let mut buf = vec![0u8; size as usize];
        self.src.read_exact(&mut buf)?;
        skip(&mut *self.src, padding(size))?;
        Ok(buf)
    }
}

impl ContainerReader for TarReader {
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        if self.done {
            return Ok(None);
        }
        skip(&mut *self.src, self.remaining + self.tail)?;
        self.remaining = 0;
        self.tail = 0;

        let mut pending = Pending::default();
        let mut block = [0u8; 512];
        loop {
            if !read_full_or_eof(&mut *self.src, &mut block)? || block.iter().all(|b| *b == 0) {
                self.done = true;
                return Ok(None);
            }
            let header = tar::Header::from_byte_slice(&block);
            let stored = header.cksum()?;
            if stored != header_sum(&block) {
                return Err(format_err("tar header checksum mismatch"));
            }
            let kind = header.entry_type();
            let size = header.entry_size()?;

            if kind.is_gnu_longname() {
                pending.name = Some(trim_nul(self.read_meta(size)?));
                continue;
            }
            if kind.is_gnu_longlink() {
                pending.link = Some(trim_nul(self.read_meta(size)?));
                continue;
            }
            if kind.is_pax_local_extensions() {
                let data = self.read_meta(size)?;
                for (key, value) in pax_records(&data)? {
                    match key {
                        "path" => pending.name = Some(value.to_vec()),
                        "linkpath" => pending.link = Some(value.to_vec()),
                        "size" => {
                            pending.size = std::str::from_utf8(value).ok().and_then(|v| v.parse().ok())
                        }
                        "mtime" => {
                            pending.mtime = std::str::from_utf8(value)
                                .ok()
                                .and_then(|v| v.split('.').next())
                                .and_then(|v| v.parse().ok())
                        }
                        _ => {}
                    }
                }
                continue;
            }
            if kind.is_pax_global_extensions() {
                skip(&mut *self.src, size + padding(size))?;
                continue;
            }

            let size = pending.size.unwrap_or(size);
            let raw_name = pending.name.take().unwrap_or_else(|| header.path_bytes().into_owned());
            let raw_name = String::from_utf8_lossy(&raw_name).into_owned();
            let name = normalize_name(&raw_name);
            let mode = header.mode()? & 0o7777;
            let mtime = match pending.mtime {
                Some(t) => t,
                None => header.mtime()? as i64,
            };

            let entry_kind = if kind.is_dir() || (kind.is_file() && raw_name.ends_with('/')) {
                EntryKind::Directory
            } else if kind.is_file() || kind.is_contiguous() {
                EntryKind::File
            } else if kind.is_symlink() {
                EntryKind::Symlink
            } else {
                debug!(name = %name, kind = ?kind, "skipping unsupported tar entry");
                skip(&mut *self.src, size + padding(size))?;
                pending = Pending::default();
                continue;
            };
            if name.is_empty() {
                skip(&mut *self.src, size + padding(size))?;
                pending = Pending::default();
                continue;
            }

            let mut entry = ArchiveEntry {
                name,
                kind: entry_kind,
                size: 0,
                mode,
                mtime,
                codec: CodecId::Store,
                crc32: None,
                link_target: None,
                index: 0,
            };
            match entry_kind {
                EntryKind::File => {
                    entry.size = size;
                    self.remaining = size;
                    self.tail = padding(size);
                }
                EntryKind::Directory => self.tail = size + padding(size),
                EntryKind::Symlink => {
                    let target = pending
                        .link
                        .take()
                        .or_else(|| header.link_name_bytes().map(|c| c.into_owned()))
                        .ok_or_else(|| format_err(format!("symlink {} has no target", entry.name)))?;
                    entry.link_target = Some(String::from_utf8_lossy(&target).into_owned());
                    self.tail = size + padding(size);
                }
            }
            return Ok(Some(entry));
        }
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let cap = std::cmp::min(self.remaining, buf.len() as u64) as usize;
        let n = self.src.read(&mut buf[..cap])?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

pub struct TarWriter {
    builder: tar::Builder<Box<dyn EncodeWrite>>,
}

impl TarWriter {
    pub fn new(out: Box<dyn EncodeWrite>) -> Self {
        Self {
            builder: tar::Builder::new(out),
        }
    }
}

impl ContainerWriter for TarWriter {
    fn put_entry(&mut self, entry: &ArchiveEntry, data: &mut dyn Read) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_mode(entry.mode);
        header.set_mtime(entry.mtime.max(0) as u64);
        header.set_uid(0);
        header.set_gid(0);
        match entry.kind {
            EntryKind::File => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(entry.size);
                let mut body = CrcReader::new(Read::take(data, entry.size));
                self.builder.append_data(&mut header, &entry.name, &mut body)?;
                if body.counted() != entry.size {
                    return Err(format_err(format!(
                        "{} changed size while archiving ({} of {} bytes)",
                        entry.name,
                        body.counted(),
                        entry.size
                    )));
                }
            }
            EntryKind::Directory => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                self.builder
                    .append_data(&mut header, entry.stored_name(), io::empty())?;
            }
            EntryKind::Symlink => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                let target = entry.link_target.as_deref().unwrap_or_default();
                self.builder.append_link(&mut header, &entry.name, target)?;
            }
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let outer = self.builder.into_inner()?;
        outer.finish()?.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::testing::SharedBuf;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> TarReader {
        TarReader::new(Box::new(Cursor::new(bytes)))
    }

    fn drain(r: &mut TarReader) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = r.read_payload(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn writes_and_reads_all_kinds() {
        let buf = SharedBuf::default();
        let mut w: Box<dyn ContainerWriter> = Box::new(TarWriter::new(buf.sink()));
        let long = format!("deep/{}.txt", "n".repeat(140));
        w.put_entry(&ArchiveEntry::directory("deep").with_mtime(1_600_000_000), &mut io::empty())
            .unwrap();
        w.put_entry(&ArchiveEntry::file(&long, 5).with_mode(0o600), &mut &b"hello"[..])
            .unwrap();
        w.put_entry(&ArchiveEntry::symlink("link", "deep"), &mut io::empty())
            .unwrap();
        w.finish().unwrap();

        let mut r = reader(buf.bytes());
        let d = r.next_entry().unwrap().unwrap();
        assert!(d.is_dir());
        assert_eq!(d.name, "deep");
        assert_eq!(d.mtime, 1_600_000_000);

        let f = r.next_entry().unwrap().unwrap();
        assert_eq!(f.name, long);
        assert_eq!(f.mode, 0o600);
        assert_eq!(f.size, 5);
        assert_eq!(drain(&mut r), b"hello");

        let l = r.next_entry().unwrap().unwrap();
        assert!(l.is_symlink());
        assert_eq!(l.link_target.as_deref(), Some("deep"));
        assert!(r.next_entry().unwrap().is_none());
        assert!(r.next_entry().unwrap().is_none());
    }

    #[test]
    fn unread_payload_is_skipped() {
        let buf = SharedBuf::default();
        let mut w = Box::new(TarWriter::new(buf.sink()));
        let big = vec![b'x'; 3000];
        w.put_entry(&ArchiveEntry::file("a", 3000), &mut &big[..]).unwrap();
        w.put_entry(&ArchiveEntry::file("b", 2), &mut &b"ok"[..]).unwrap();
        w.finish().unwrap();

        let mut r = reader(buf.bytes());
        r.next_entry().unwrap().unwrap();
        let mut part = [0u8; 10];
        r.read_payload(&mut part).unwrap();
        let b = r.next_entry().unwrap().unwrap();
        assert_eq!(b.name, "b");
        assert_eq!(drain(&mut r), b"ok");
    }

    #[test]
    fn corrupted_header_checksum_is_rejected() {
        let buf = SharedBuf::default();
        let mut w = Box::new(TarWriter::new(buf.sink()));
        w.put_entry(&ArchiveEntry::file("a", 1), &mut &b"z"[..]).unwrap();
        w.finish().unwrap();
        let mut bytes = buf.bytes();
        bytes[0] ^= 0x20;
        assert!(reader(bytes).next_entry().is_err());
    }

    #[test]
    fn short_source_is_rejected() {
        let buf = SharedBuf::default();
        let mut w = Box::new(TarWriter::new(buf.sink()));
        let err = w
            .put_entry(&ArchiveEntry::file("a", 10), &mut &b"abc"[..])
            .unwrap_err();
        assert!(err.to_string().contains("changed size"));
    }

    #[test]
    fn parses_pax_records() {
        let recs = pax_records(b"16 path=a/b.txt\n11 size=42\n").unwrap();
        assert_eq!(recs, vec![("path", &b"a/b.txt"[..]), ("size", &b"42"[..])]);
        assert!(pax_records(b"99 path=x\n").is_err());
    }

    #[test]
    fn empty_stream_has_no_entries() {
        assert!(reader(Vec::new()).next_entry().unwrap().is_none());
    }

    #[test]
    fn reads_archives_built_by_tar_crate() {
        let mut b = tar::Builder::new(Vec::new());
        let mut h = tar::Header::new_ustar();
        h.set_size(3);
        h.set_mode(0o755);
        h.set_entry_type(tar::EntryType::Regular);
        b.append_data(&mut h, "./bin/run.sh", &b"#!\n"[..]).unwrap();
        let bytes = b.into_inner().unwrap();

        let mut r = reader(bytes);
        let e = r.next_entry().unwrap().unwrap();
        assert_eq!(e.name, "bin/run.sh");
        assert_eq!(e.mode, 0o755);
        assert_eq!(drain(&mut r), b"#!\n");
    }
}

//! cpio: SVR4 "newc" for writing; newc, its checksummed variant and the
//! portable ASCII ("odc") layout for reading.

use super::{ContainerReader, ContainerWriter};
use crate::codec::{CodecId, EncodeWrite};
use crate::entry::{ArchiveEntry, EntryKind, normalize_name};
use crate::error::{CartonError, Result, format_err};
use crate::util::{CountingWriter, read_full_or_eof, skip};
use std::io::{self, Read, Write};
use tracing::debug;

const NEWC: &[u8; 6] = b"070701";
const NEWC_CRC: &[u8; 6] = b"070702";
const ODC: &[u8; 6] = b"070707";
const NEWC_HEADER: u64 = 110;
const ODC_HEADER: u64 = 76;
const TRAILER: &str = "TRAILER!!!";
const MAX_NAME: u64 = 4096;

const S_IFMT: u32 = 0o170_000;
const S_IFREG: u32 = 0o100_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFLNK: u32 = 0o120_000;

fn pad4(n: u64) -> u64 {
    (4 - n % 4) % 4
}

fn field(raw: &[u8], radix: u32) -> Result<u64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| u64::from_str_radix(s.trim_end_matches('\0').trim(), radix).ok())
        .ok_or_else(|| {
            format_err(format!(
                "bad cpio header field {:?}",
                String::from_utf8_lossy(raw)
            ))
        })
}

struct Header {
    mode: u32,
    mtime: i64,
    size: u64,
    name: String,
    checksum: Option<u32>,
    /// Padding after the payload.
    data_pad: u64,
}

pub struct CpioReader {
    src: Box<dyn Read + Send>,
    remaining: u64,
    tail: u64,
    done: bool,
    sum: Option<(u32, u32)>,
}

impl CpioReader {
    pub fn new(src: Box<dyn Read + Send>) -> Self {
        Self {
            src,
            remaining: 0,
            tail: 0,
            done: false,
            sum: None,
        }
    }

    fn read_name(&mut self, len: u64) -> Result<String> {
        if len == 0 || len > MAX_NAME {
            return Err(format_err(format!("cpio name length {len}")));
        }
        let mut raw = vec![0u8; len as usize];
        self.src.read_exact(&mut raw)?;
        if raw.pop() != Some(0) {
            return Err(format_err("cpio name is not NUL-terminated"));
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    fn read_newc(&mut self, with_crc: bool) -> Result<Header> {
        let mut h = [0u8; (NEWC_HEADER - 6) as usize];
        self.src.read_exact(&mut h)?;
        let f = |i: usize| field(&h[i * 8..i * 8 + 8], 16);
        let mode = f(1)? as u32;
        let mtime = f(5)? as i64;
        let size = f(6)?;
        let namesize = f(11)?;
        let check = f(12)? as u32;
        let name = self.read_name(namesize)?;
        skip(&mut *self.src, pad4(NEWC_HEADER + namesize))?;
        Ok(Header {
            mode,
            mtime,
            size,
            name,
            checksum: with_crc.then_some(check),
            data_pad: pad4(size),
        })
    }

    fn read_odc(&mut self) -> Result<Header> {
        let mut h = [0u8; (ODC_HEADER - 6) as usize];
        self.src.read_exact(&mut h)?;
        // offsets relative to the end of the magic
        let mode = field(&h[12..18], 8)? as u32;
        let mtime = field(&h[42..53], 8)? as i64;
        let namesize = field(&h[53..59], 8)?;
        let size = field(&h[59..70], 8)?;
        let name = self.read_name(namesize)?;
        Ok(Header {
            mode,
            mtime,
            size,
            name,
            checksum: None,
            data_pad: 0,
        })
    }
}

impl ContainerReader for CpioReader {
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        if self.done {
            return Ok(None);
        }
        skip(&mut *self.src, self.remaining + self.tail)?;
        self.remaining = 0;
        self.tail = 0;
        self.sum = None;

        loop {
            let mut magic = [0u8; 6];
            if !read_full_or_eof(&mut *self.src, &mut magic)? {
                self.done = true;
                return Ok(None);
            }
            let h = match &magic {
                NEWC => self.read_newc(false)?,
                NEWC_CRC => self.read_newc(true)?,
                ODC => self.read_odc()?,
                _ => return Err(format_err("bad cpio magic")),
            };
            if h.name == TRAILER {
                self.done = true;
                return Ok(None);
            }
            let name = normalize_name(&h.name);
            let kind = match h.mode & S_IFMT {
                S_IFREG => Some(EntryKind::File),
                S_IFDIR => Some(EntryKind::Directory),
                S_IFLNK => Some(EntryKind::Symlink),
                _ => None,
            };
            let Some(kind) = kind.filter(|_| !name.is_empty()) else {
                debug!(name = %h.name, mode = h.mode, "skipping cpio entry");
                skip(&mut *self.src, h.size + h.data_pad)?;
                continue;
            };

            let mut entry = ArchiveEntry {
                name,
                kind,
                size: 0,
                mode: h.mode & 0o7777,
                mtime: h.mtime,
                codec: CodecId::Store,
                crc32: None,
                link_target: None,
                index: 0,
            };
            match kind {
                EntryKind::File => {
                    entry.size = h.size;
                    self.remaining = h.size;
                    self.tail = h.data_pad;
                    self.sum = h.checksum.map(|c| (c, 0));
                }
                EntryKind::Symlink => {
                    if h.size > MAX_NAME {
                        return Err(format_err(format!(
                            "symlink target of {} too long",
                            entry.name
                        )));
                    }
                    let mut target = vec![0u8; h.size as usize];
                    self.src.read_exact(&mut target)?;
                    entry.link_target = Some(String::from_utf8_lossy(&target).into_owned());
                    self.tail = h.data_pad;
                }
                EntryKind::Directory => self.tail = h.size + h.data_pad,
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
        if let Some((want, got)) = self.sum.as_mut() {
            *got = buf[..n]
                .iter()
                .fold(*got, |acc, b| acc.wrapping_add(u32::from(*b)));
            if self.remaining == 0 && *got != *want {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("cpio checksum mismatch: expected {want:08x}, got {got:08x}"),
                ));
            }
        }
        Ok(n)
    }
}

pub struct CpioWriter {
    out: CountingWriter<Box<dyn EncodeWrite>>,
    ino: u32,
}

impl CpioWriter {
    pub fn new(out: Box<dyn EncodeWrite>) -> Self {
        Self {
            out: CountingWriter::new(out),
            ino: 0,
        }
    }

    fn header(&mut self, name: &str, mode: u32, mtime: i64, size: u64) -> Result<()> {
        if size > u64::from(u32::MAX) {
            return Err(CartonError::Unsupported(format!(
                "cpio entries over 4 GiB ({name})"
            )));
        }
        self.ino += 1;
        let namesize = name.len() as u64 + 1;
        let fields = [
            u64::from(self.ino),
            u64::from(mode),
            0,
            0,
            if mode & S_IFMT == S_IFDIR { 2 } else { 1 },
            mtime.clamp(0, i64::from(u32::MAX)) as u64,
            size,
            0,
            0,
            0,
            0,
            namesize,
            0,
        ];
        self.out.write_all(NEWC)?;
        for v in fields {
            write!(self.out, "{v:08X}")?;
        }
        self.out.write_all(name.as_bytes())?;
        self.out.write_all(&[0])?;
        self.pad()?;
        Ok(())
    }

    fn pad(&mut self) -> Result<()> {
        let n = pad4(self.out.count()) as usize;
        self.out.write_all(&[0u8; 3][..n])?;
        Ok(())
    }
}

impl ContainerWriter for CpioWriter {
    fn put_entry(&mut self, entry: &ArchiveEntry, data: &mut dyn Read) -> Result<()> {
        match entry.kind {
            EntryKind::File => {
                self.header(&entry.name, S_IFREG | entry.mode, entry.mtime, entry.size)?;
                let copied = io::copy(&mut Read::take(data, entry.size), &mut self.out)?;
                if copied != entry.size {
                    return Err(format_err(format!(
                        "{} changed size while archiving ({copied} of {} bytes)",
                        entry.name, entry.size
                    )));
                }
            }
            EntryKind::Directory => {
                self.header(&entry.name, S_IFDIR | entry.mode, entry.mtime, 0)?;
            }
            EntryKind::Symlink => {
                let target = entry.link_target.as_deref().unwrap_or_default();
                self.header(&entry.name, S_IFLNK | entry.mode, entry.mtime, target.len() as u64)?;
                self.out.write_all(target.as_bytes())?;
            }
        }
        self.pad()
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.header(TRAILER, 0, 0, 0)?;
        self.out.into_inner().finish()?.flush()?;
        Ok(())
    }
}

//! Unix `ar`. Reads the common, GNU and BSD name conventions; writes BSD
//! style names when a name does not fit the 16-byte field. Only regular
//! files can be stored.

use super::{ContainerReader, ContainerWriter};
use crate::codec::{CodecId, EncodeWrite};
use crate::entry::{ArchiveEntry, DEFAULT_FILE_MODE, normalize_name};
use crate::error::{CartonError, Result, format_err};
use crate::util::{read_full_or_eof, skip};
use std::io::{self, Read, Write};
use tracing::debug;

pub const MAGIC: &[u8; 8] = b"!<arch>\n";
const HEADER: usize = 60;
const BSD_PREFIX: &str = "#1/";
const MAX_NAME: u64 = 4096;
const MAX_NAME_TABLE: u64 = 1 << 20;

fn number(raw: &[u8], radix: u32) -> Result<u64> {
    let s = std::str::from_utf8(raw).map_err(|_| format_err("non-ascii ar header"))?;
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, radix).map_err(|_| format_err(format!("bad ar header field {s:?}")))
}

pub struct ArReader {
    src: Box<dyn Read + Send>,
    gnu_names: Vec<u8>,
    remaining: u64,
    tail: u64,
    done: bool,
}

impl ArReader {
    pub fn new(mut src: Box<dyn Read + Send>) -> Result<Self> {
        let mut magic = [0u8; 8];
        if !read_full_or_eof(&mut *src, &mut magic)? || &magic != MAGIC {
            return Err(format_err("not an ar archive"));
        }
        Ok(Self {
            src,
            gnu_names: Vec::new(),
            remaining: 0,
            tail: 0,
            done: false,
        })
    }

    fn gnu_name(&self, offset: usize) -> Result<String> {
        let table = self
            .gnu_names
            .get(offset..)
            .ok_or_else(|| format_err(format!("ar name offset {offset} out of range")))?;
        let end = table
            .iter()
            .position(|b| *b == b'\n')
            .unwrap_or(table.len());
        let name = &table[..end];
        let name = name.strip_suffix(b"/").unwrap_or(name);
        Ok(String::from_utf8_lossy(name).into_owned())
    }
}

impl ContainerReader for ArReader {
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        if self.done {
            return Ok(None);
        }
        skip(&mut *self.src, self.remaining + self.tail)?;
        self.remaining = 0;
        self.tail = 0;

        loop {
            let mut h = [0u8; HEADER];
            if !read_full_or_eof(&mut *self.src, &mut h)? {
                self.done = true;
                return Ok(None);
            }
            if &h[58..60] != b"`\n" {
                return Err(format_err("bad ar header terminator"));
            }
            let raw_name = String::from_utf8_lossy(&h[..16]).trim_end().to_string();
            let mtime = number(&h[16..28], 10)? as i64;
            let mode = number(&h[40..48], 8)? as u32;
            let mut size = number(&h[48..58], 10)?;
            let pad = size % 2;

            let name = if raw_name == "//" {
                if size > MAX_NAME_TABLE {
                    return Err(format_err("ar name table too large"));
                }
                let mut table = vec![0u8; size as usize];
                self.src.read_exact(&mut table)?;
                skip(&mut *self.src, pad)?;
                self.gnu_names = table;
                continue;
            } else if raw_name == "/" || raw_name == "/SYM64/" || raw_name.starts_with("__.SYMDEF") {
                debug!(name = %raw_name, "skipping ar symbol table");
                skip(&mut *self.src, size + pad)?;
                continue;
            } else if let Some(len) = raw_name.strip_prefix(BSD_PREFIX) {
                let len: u64 = len
                    .parse()
                    .map_err(|_| format_err(format!("bad BSD ar name {raw_name:?}")))?;
                if len > size || len > MAX_NAME {
                    return Err(format_err(format!("bad BSD ar name length {len}")));
                }
                let mut raw = vec![0u8; len as usize];
                self.src.read_exact(&mut raw)?;
                size -= len;
                while raw.last() == Some(&0) {
                    raw.pop();
                }
                String::from_utf8_lossy(&raw).into_owned()
            } else if let Some(off) = raw_name
                .strip_prefix('/')
                .and_then(|d| d.parse::<usize>().ok())
            {
                self.gnu_name(off)?
            } else {
                raw_name.strip_suffix('/').unwrap_or(&raw_name).to_string()
            };

            let name = normalize_name(&name);
            if name.is_empty() {
                skip(&mut *self.src, size + pad)?;
                continue;
            }
            let mode = match mode & 0o7777 {
                0 => DEFAULT_FILE_MODE,
                m => m,
            };
            self.remaining = size;
            self.tail = pad;
            let mut entry = ArchiveEntry::file(name, size).with_mode(mode).with_mtime(mtime);
            entry.codec = CodecId::Store;
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

pub struct ArWriter {
    out: Box<dyn EncodeWrite>,
}

impl ArWriter {
    pub fn new(mut out: Box<dyn EncodeWrite>) -> Result<Self> {
        out.write_all(MAGIC)?;
        Ok(Self { out })
    }
}

impl ContainerWriter for ArWriter {
    fn put_entry(&mut self, entry: &ArchiveEntry, data: &mut dyn Read) -> Result<()> {
        if !entry.is_file() {
            debug!(name = %entry.name, kind = %entry.kind, "ar stores regular files only");
            return Ok(());
        }
        let bsd = entry.name.len() > 16 || entry.name.contains(' ') || entry.name.starts_with('#');
        let (field, extra) = if bsd {
            (format!("{BSD_PREFIX}{}", entry.name.len()), entry.name.len() as u64)
        } else {
            (entry.name.clone(), 0)
        };
        let size = entry.size + extra;
        if size > 9_999_999_999 {
            return Err(CartonError::Unsupported(format!(
                "ar entries this large ({})",
                entry.name
            )));
        }
        write!(
            self.out,
            "{:<16}{:<12}{:<6}{:<6}{:<8o}{:<10}`\n",
            field,
            entry.mtime.clamp(0, 999_999_999_999),
            0,
            0,
            0o100_000 | entry.mode,
            size
        )?;
        if bsd {
            self.out.write_all(entry.name.as_bytes())?;
        }
        let copied = io::copy(&mut Read::take(data, entry.size), &mut self.out)?;
        if copied != entry.size {
            return Err(format_err(format!(
                "{} changed size while archiving ({copied} of {} bytes)",
                entry.name, entry.size
            )));
        }
        if size % 2 == 1 {
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.out.finish()?.flush()?;
        Ok(())
    }
}

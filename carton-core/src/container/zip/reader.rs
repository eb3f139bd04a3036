use super::structures::*;
use crate::codec::{CodecId, CodecRegistry};
use crate::container::ContainerReader;
use crate::entry::{ArchiveEntry, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, EntryKind, normalize_name};
use crate::error::{CartonError, Result, format_err};
use crate::util::{CrcReader, SectionReader};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};
use tracing::debug;

const MAX_LINK_TARGET: u64 = 4096;

/// Reads a ZIP archive through its central directory.
pub struct ZipReader<R: Read + Seek + Send + 'static> {
    src: Arc<Mutex<R>>,
    records: Vec<CentralRecord>,
    next: usize,
    registry: Arc<CodecRegistry>,
    payload: Option<Box<dyn Read + Send>>,
}

fn read_at<R: Read + Seek>(src: &Mutex<R>, offset: u64, buf: &mut [u8]) -> Result<()> {
    let mut f = src
        .lock()
        .map_err(|_| CartonError::IllegalState("archive source lock poisoned"))?;
    f.seek(SeekFrom::Start(offset))?;
    f.read_exact(buf)?;
    Ok(())
}

impl<R: Read + Seek + Send + 'static> ZipReader<R> {
    pub fn new(mut src: R, registry: Arc<CodecRegistry>) -> Result<Self> {
        let size = src.seek(SeekFrom::End(0))?;
        let src = Arc::new(Mutex::new(src));

        let tail_len =
            size.min((EndOfCentralDirectory::SIZE + EndOfCentralDirectory::MAX_COMMENT) as u64);
        let tail_start = size - tail_len;
        let mut tail = vec![0u8; tail_len as usize];
        read_at(&src, tail_start, &mut tail)?;
        let at = EndOfCentralDirectory::locate(&tail)
            .ok_or_else(|| format_err("not a zip archive: no end of central directory"))?;
        let (mut eocd, zip64) = EndOfCentralDirectory::from_bytes(&tail[at..])?;
        let eocd_offset = tail_start + at as u64;

        if zip64 && eocd_offset >= Zip64Locator::SIZE as u64 {
            let mut loc = [0u8; Zip64Locator::SIZE];
            read_at(&src, eocd_offset - Zip64Locator::SIZE as u64, &mut loc)?;
            let off = Zip64Locator::eocd64_offset(&loc)?;
            let mut rec = [0u8; Zip64Eocd::MIN_SIZE];
            read_at(&src, off, &mut rec)?;
            eocd = Zip64Eocd::from_bytes(&rec)?;
        }

        if eocd.cd_offset.saturating_add(eocd.cd_size) > eocd_offset
            || eocd.total_entries > eocd.cd_size / CDFH_MIN_SIZE
        {
            return Err(format_err("central directory out of bounds"));
        }
        let mut cd = vec![0u8; eocd.cd_size as usize];
        read_at(&src, eocd.cd_offset, &mut cd)?;
        let mut cursor = Cursor::new(&cd[..]);
        let mut records = Vec::with_capacity(eocd.total_entries as usize);
        for _ in 0..eocd.total_entries {
            records.push(CentralRecord::parse(&mut cursor)?);
        }
        tracing::debug!(entries = records.len(), "read zip central directory");

        Ok(Self {
            src,
            records,
            next: 0,
            registry,
            payload: None,
        })
    }

    fn data_offset(&self, rec: &CentralRecord) -> Result<u64> {
        let mut lfh = [0u8; LFH_SIZE as usize];
        read_at(&self.src, rec.lfh_offset, &mut lfh)?;
        let mut c = Cursor::new(&lfh[..]);
        if c.read_u32::<LittleEndian>()? != LFH_SIGNATURE {
            return Err(format_err(format!("bad local header for {}", rec.name)));
        }
        c.set_position(26);
        let name_len = u64::from(c.read_u16::<LittleEndian>()?);
        let extra_len = u64::from(c.read_u16::<LittleEndian>()?);
        Ok(rec.lfh_offset + LFH_SIZE + name_len + extra_len)
    }

    fn open_payload(&self, rec: &CentralRecord, codec: CodecId) -> Result<Box<dyn Read + Send>> {
        let offset = self.data_offset(rec)?;
        let section = SectionReader::new(self.src.clone(), offset, rec.compressed_size);
        let decoded = self.registry.get(codec)?.decoder(Box::new(section))?;
        Ok(Box::new(CrcReader::verifying(
            decoded,
            rec.crc32,
            rec.uncompressed_size,
        )))
    }
}

impl<R: Read + Seek + Send + 'static> ContainerReader for ZipReader<R> {
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        self.payload = None;
        let (rec, name) = loop {
            let Some(rec) = self.records.get(self.next).cloned() else {
                return Ok(None);
            };
            self.next += 1;
            let name = normalize_name(&rec.name);
            if name.trim_start_matches('/').is_empty() {
                debug!(raw = %rec.name, "skipping zip entry without a name");
                continue;
            }
            break (rec, name);
        };
        let unix = rec.unix_mode();
        let kind = match unix.map(|m| m & S_IFMT) {
            Some(S_IFDIR) => EntryKind::Directory,
            Some(S_IFLNK) => EntryKind::Symlink,
            _ if rec.name.ends_with('/') => EntryKind::Directory,
            _ if !rec.is_unix() && rec.external_attrs & DOS_DIR != 0 => EntryKind::Directory,
            _ => EntryKind::File,
        };
        let mode = match (unix, kind) {
            (Some(m), _) => m & 0o7777,
            (None, EntryKind::Directory) => DEFAULT_DIR_MODE,
            (None, _) => DEFAULT_FILE_MODE,
        };
        if rec.flags & FLAG_ENCRYPTED != 0 {
            return Err(CartonError::Unsupported(format!("encrypted zip entry {name}")));
        }
        let codec = CodecId::from_zip_method(rec.method).ok_or_else(|| {
            CartonError::UnsupportedCodec(format!("zip method {} ({name})", rec.method))
        })?;

        let mut entry = ArchiveEntry {
            name,
            kind,
            size: 0,
            mode,
            mtime: rec.mtime.unwrap_or_else(|| dos_to_unix(rec.dos_date, rec.dos_time)),
            codec,
            crc32: Some(rec.crc32),
            link_target: None,
            index: 0,
        };
        match kind {
            EntryKind::File => {
                entry.size = rec.uncompressed_size;
                self.payload = Some(self.open_payload(&rec, codec)?);
            }
            EntryKind::Symlink => {
                if rec.uncompressed_size > MAX_LINK_TARGET {
                    return Err(format_err(format!("symlink target of {} too long", entry.name)));
                }
                let mut target = String::new();
                self.open_payload(&rec, codec)?.read_to_string(&mut target)?;
                entry.link_target = Some(target);
            }
            EntryKind::Directory => {}
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

use super::structures::*;
use crate::codec::{CodecId, CodecRegistry, EncodeWrite};
use crate::container::ContainerWriter;
use crate::entry::{ArchiveEntry, EntryKind};
use crate::error::{CartonError, Result, format_err};
use crate::util::{CountingWriter, CrcReader};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Read, Write};
use std::sync::Arc;

const MAX_U32: u64 = u32::MAX as u64;

/// Streams entries with data descriptors, so sizes need not be known before
/// the payload is compressed.
pub struct ZipWriter {
    out: CountingWriter<Box<dyn EncodeWrite>>,
    registry: Arc<CodecRegistry>,
    codec: CodecId,
    level: Option<i32>,
    central: Vec<CentralRecord>,
}

impl ZipWriter {
    pub fn new(
        out: Box<dyn EncodeWrite>,
        registry: Arc<CodecRegistry>,
        codec: CodecId,
        level: Option<i32>,
    ) -> Result<Self> {
        if codec.zip_method().is_none() {
            return Err(CartonError::Unsupported(format!(
                "{codec} cannot be used for zip entries"
            )));
        }
        registry.get(codec)?;
        Ok(Self {
            out: CountingWriter::new(out),
            registry,
            codec,
            level,
            central: Vec::new(),
        })
    }

    fn write_local_header(
        &mut self,
        name: &str,
        method: u16,
        dos: (u16, u16),
        mtime: i64,
    ) -> Result<()> {
        let extra = timestamp_extra(mtime);
        let w = &mut self.out;
        w.write_u32::<LittleEndian>(LFH_SIGNATURE)?;
        w.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        w.write_u16::<LittleEndian>(FLAG_DESCRIPTOR | FLAG_UTF8)?;
        w.write_u16::<LittleEndian>(method)?;
        w.write_u16::<LittleEndian>(dos.0)?;
        w.write_u16::<LittleEndian>(dos.1)?;
        // crc and sizes follow in the data descriptor
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u16::<LittleEndian>(name.len() as u16)?;
        w.write_u16::<LittleEndian>(extra.len() as u16)?;
        w.write_all(name.as_bytes())?;
        w.write_all(&extra)?;
        Ok(())
    }
}

impl ContainerWriter for ZipWriter {
    fn put_entry(&mut self, entry: &ArchiveEntry, data: &mut dyn Read) -> Result<()> {
        let name = entry.stored_name();
        if name.len() > u16::MAX as usize {
            return Err(CartonError::InvalidArgument(format!("entry name too long: {name}")));
        }
        let lfh_offset = self.out.count();
        if lfh_offset > MAX_U32 {
            return Err(CartonError::Unsupported("zip archives over 4 GiB".into()));
        }
        let codec = match entry.kind {
            EntryKind::File => self.codec,
            _ => CodecId::Store,
        };
        let method = codec.zip_method().unwrap_or(0);
        let dos = unix_to_dos(entry.mtime);
        self.write_local_header(&name, method, dos, entry.mtime)?;

        let target = entry.link_target.clone().unwrap_or_default();
        let mut src: CrcReader<Box<dyn Read + '_>> = match entry.kind {
            EntryKind::File => CrcReader::new(Box::new(Read::take(data, entry.size))),
            EntryKind::Symlink => CrcReader::new(Box::new(target.as_bytes())),
            EntryKind::Directory => CrcReader::new(Box::new(std::io::empty())),
        };
        let mut counted = CountingWriter::new(&mut self.out);
        self.registry
            .get(codec)?
            .compress(&mut src, &mut counted, self.level)?;
        let compressed = counted.count();
        let uncompressed = src.counted();
        let crc = src.crc();
        drop(src);

        if entry.is_file() && uncompressed != entry.size {
            return Err(format_err(format!(
                "{} changed size while archiving ({uncompressed} of {} bytes)",
                entry.name, entry.size
            )));
        }
        if compressed > MAX_U32 || uncompressed > MAX_U32 {
            return Err(CartonError::Unsupported(format!(
                "zip entries over 4 GiB ({})",
                entry.name
            )));
        }

        self.out.write_u32::<LittleEndian>(DESCRIPTOR_SIGNATURE)?;
        self.out.write_u32::<LittleEndian>(crc)?;
        self.out.write_u32::<LittleEndian>(compressed as u32)?;
        self.out.write_u32::<LittleEndian>(uncompressed as u32)?;

        let type_bits = match entry.kind {
            EntryKind::File => S_IFREG,
            EntryKind::Directory => S_IFDIR,
            EntryKind::Symlink => S_IFLNK,
        };
        let dos_attr = if entry.is_dir() { DOS_DIR } else { 0 };
        self.central.push(CentralRecord {
            name,
            version_made_by: (HOST_UNIX << 8) | VERSION_NEEDED,
            flags: FLAG_DESCRIPTOR | FLAG_UTF8,
            method,
            dos_time: dos.0,
            dos_date: dos.1,
            crc32: crc,
            compressed_size: compressed,
            uncompressed_size: uncompressed,
            external_attrs: ((type_bits | entry.mode) << 16) | dos_attr,
            lfh_offset,
            mtime: Some(entry.mtime),
        });
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        if self.central.len() >= 0xFFFF {
            return Err(CartonError::Unsupported(
                "zip archives with 65535 or more entries".into(),
            ));
        }
        let cd_offset = self.out.count();
        for rec in &self.central {
            rec.write(&mut self.out)?;
        }
        let cd_size = self.out.count() - cd_offset;
        if cd_offset > MAX_U32 || cd_size > MAX_U32 {
            return Err(CartonError::Unsupported("zip archives over 4 GiB".into()));
        }
        EndOfCentralDirectory::write(
            &mut self.out,
            self.central.len() as u16,
            cd_size as u32,
            cd_offset as u32,
        )?;
        tracing::debug!(entries = self.central.len(), bytes = self.out.count(), "finished zip");
        self.out.into_inner().finish()?.flush()?;
        Ok(())
    }
}

//! Container readers and writers.
//!
//! A reader yields entries lazily; the payload of the current entry is pulled
//! through [`ContainerReader::read_payload`] and anything left unread is
//! skipped by the next call to [`ContainerReader::next_entry`].

use crate::codec::{CodecId, CodecRegistry};
use crate::config::ArchiverOptions;
use crate::entry::ArchiveEntry;
use crate::error::{CartonError, Result};
use crate::filetype::{ArchiveFormat, CompressionType};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::sync::Arc;

pub mod ar;
pub mod cpio;
pub mod sevenz;
pub mod tar;
pub mod zip;

pub trait ContainerReader: Send {
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>>;

    /// Reads decoded payload bytes of the current entry; `Ok(0)` at its end.
    fn read_payload(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

pub trait ContainerWriter: Send {
    /// Appends one entry; `data` is read to its end for files and ignored
    /// otherwise.
    fn put_entry(&mut self, entry: &ArchiveEntry, data: &mut dyn Read) -> Result<()>;

    /// Writes trailers and finishes any outer compression.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Where archive bytes come from.
pub enum Source {
    File(File),
    Stream(Box<dyn Read + Send>),
}

pub fn open_reader(
    format: ArchiveFormat,
    source: Source,
    registry: Arc<CodecRegistry>,
    compression: Option<CompressionType>,
) -> Result<Box<dyn ContainerReader>> {
    if format.has_entry_codecs() {
        if let Some(c) = compression {
            return Err(CartonError::Unsupported(format!(
                "{format} archives cannot be wrapped in {c}"
            )));
        }
        let file = match source {
            Source::File(f) => f,
            Source::Stream(r) => crate::util::spool(r)?,
        };
        if format == ArchiveFormat::SevenZ {
            return Ok(Box::new(sevenz::SevenZipReader::new(file)?));
        }
        return Ok(Box::new(zip::ZipReader::new(file, registry)?));
    }

    let raw: Box<dyn Read + Send> = match source {
        Source::File(f) => Box::new(BufReader::new(f)),
        Source::Stream(r) => r,
    };
    let stream = match compression {
        Some(c) => registry.get(c.codec())?.decoder(raw)?,
        None => raw,
    };
    Ok(match format {
        ArchiveFormat::Tar => Box::new(tar::TarReader::new(stream)),
        ArchiveFormat::Cpio => Box::new(cpio::CpioReader::new(stream)),
        ArchiveFormat::Ar => Box::new(ar::ArReader::new(stream)?),
        ArchiveFormat::Zip | ArchiveFormat::Jar | ArchiveFormat::SevenZ => {
            unreachable!("handled above")
        }
    })
}

pub fn open_writer(
    format: ArchiveFormat,
    sink: Box<dyn Write + Send>,
    registry: Arc<CodecRegistry>,
    compression: Option<CompressionType>,
    opts: &ArchiverOptions,
) -> Result<Box<dyn ContainerWriter>> {
    if format.has_entry_codecs() && compression.is_some() {
        return Err(CartonError::Unsupported(format!(
            "{format} archives cannot take outer compression"
        )));
    }
    let outer = match compression {
        Some(c) => registry.get(c.codec())?.encoder(sink, opts.level)?,
        None => registry.get(CodecId::Store)?.encoder(sink, None)?,
    };
    Ok(match format {
        ArchiveFormat::Tar => Box::new(tar::TarWriter::new(outer)),
        ArchiveFormat::Cpio => Box::new(cpio::CpioWriter::new(outer)),
        ArchiveFormat::Ar => Box::new(ar::ArWriter::new(outer)?),
        ArchiveFormat::Zip | ArchiveFormat::Jar => Box::new(zip::ZipWriter::new(
            outer,
            registry,
            opts.entry_codec,
            opts.level,
        )?),
        ArchiveFormat::SevenZ => Box::new(sevenz::SevenZipWriter::new(outer)?),
    })
}

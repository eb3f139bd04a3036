//! Archive format and compression type detection from file names and
//! magic bytes.

use crate::codec::{CodecId, CodecRegistry};
use crate::error::{CartonError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Tar,
    Zip,
    Jar,
    Cpio,
    Ar,
    SevenZ,
}

impl ArchiveFormat {
    pub fn name(self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Jar => "jar",
            ArchiveFormat::Cpio => "cpio",
            ArchiveFormat::Ar => "ar",
            ArchiveFormat::SevenZ => "7z",
        }
    }

    pub fn default_suffix(self) -> &'static str {
        match self {
            ArchiveFormat::Tar => ".tar",
            ArchiveFormat::Zip => ".zip",
            ArchiveFormat::Jar => ".jar",
            ArchiveFormat::Cpio => ".cpio",
            ArchiveFormat::Ar => ".ar",
            ArchiveFormat::SevenZ => ".7z",
        }
    }

    /// Formats that compress each entry individually rather than as one stream.
    pub fn has_entry_codecs(self) -> bool {
        matches!(
            self,
            ArchiveFormat::Zip | ArchiveFormat::Jar | ArchiveFormat::SevenZ
        )
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArchiveFormat {
    type Err = CartonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tar" => Ok(ArchiveFormat::Tar),
            "zip" => Ok(ArchiveFormat::Zip),
            "jar" => Ok(ArchiveFormat::Jar),
            "cpio" => Ok(ArchiveFormat::Cpio),
            "ar" => Ok(ArchiveFormat::Ar),
            "7z" | "sevenz" => Ok(ArchiveFormat::SevenZ),
            other => Err(CartonError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl CompressionType {
    pub fn name(self) -> &'static str {
        self.codec().name()
    }

    pub fn default_suffix(self) -> &'static str {
        match self {
            CompressionType::Gzip => ".gz",
            CompressionType::Bzip2 => ".bz2",
            CompressionType::Xz => ".xz",
            CompressionType::Zstd => ".zst",
        }
    }

    pub fn codec(self) -> CodecId {
        match self {
            CompressionType::Gzip => CodecId::Gzip,
            CompressionType::Bzip2 => CodecId::Bzip2,
            CompressionType::Xz => CodecId::Xz,
            CompressionType::Zstd => CodecId::Zstd,
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionType {
    type Err = CartonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.parse::<CodecId>() {
            Ok(CodecId::Gzip) => Ok(CompressionType::Gzip),
            Ok(CodecId::Bzip2) => Ok(CompressionType::Bzip2),
            Ok(CodecId::Xz) => Ok(CompressionType::Xz),
            Ok(CodecId::Zstd) => Ok(CompressionType::Zstd),
            _ => Err(CartonError::UnknownFormat(s.to_string())),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileType {
    suffix: &'static str,
    archive: Option<ArchiveFormat>,
    compression: Option<CompressionType>,
}

use ArchiveFormat as A;
use CompressionType as C;

// Longest suffixes first so `.tar.gz` wins over `.gz`.
const KNOWN: &[(&str, Option<ArchiveFormat>, Option<CompressionType>)] = &[
    (".tar.bz2", Some(A::Tar), Some(C::Bzip2)),
    (".cpio.bz2", Some(A::Cpio), Some(C::Bzip2)),
    (".cpio.zst", Some(A::Cpio), Some(C::Zstd)),
    (".tar.zst", Some(A::Tar), Some(C::Zstd)),
    (".cpio.gz", Some(A::Cpio), Some(C::Gzip)),
    (".cpio.xz", Some(A::Cpio), Some(C::Xz)),
    (".tar.gz", Some(A::Tar), Some(C::Gzip)),
    (".tar.xz", Some(A::Tar), Some(C::Xz)),
    (".tbz2", Some(A::Tar), Some(C::Bzip2)),
    (".tzst", Some(A::Tar), Some(C::Zstd)),
    (".cpio", Some(A::Cpio), None),
    (".tbz", Some(A::Tar), Some(C::Bzip2)),
    (".tgz", Some(A::Tar), Some(C::Gzip)),
    (".txz", Some(A::Tar), Some(C::Xz)),
    (".bz2", None, Some(C::Bzip2)),
    (".jar", Some(A::Jar), None),
    (".tar", Some(A::Tar), None),
    (".zip", Some(A::Zip), None),
    (".zst", None, Some(C::Zstd)),
    (".7z", Some(A::SevenZ), None),
    (".ar", Some(A::Ar), None),
    (".gz", None, Some(C::Gzip)),
    (".xz", None, Some(C::Xz)),
    (".a", Some(A::Ar), None),
];

impl FileType {
    pub const UNKNOWN: FileType = FileType {
        suffix: "",
        archive: None,
        compression: None,
    };

    /// Classifies a path by its (case-insensitive) suffix.
    pub fn get(path: impl AsRef<Path>) -> FileType {
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        KNOWN
            .iter()
            .find(|(suffix, _, _)| name.ends_with(suffix) && name.len() > suffix.len())
            .map(|&(suffix, archive, compression)| FileType {
                suffix,
                archive,
                compression,
            })
            .unwrap_or(FileType::UNKNOWN)
    }

    pub fn from_parts(archive: Option<ArchiveFormat>, compression: Option<CompressionType>) -> Self {
        KNOWN
            .iter()
            .find(|(_, a, c)| *a == archive && *c == compression)
            .map(|&(suffix, archive, compression)| FileType {
                suffix,
                archive,
                compression,
            })
            .unwrap_or(FileType {
                suffix: "",
                archive,
                compression,
            })
    }

    pub fn is_archive(&self) -> bool {
        self.archive.is_some()
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    pub fn is_unknown(&self) -> bool {
        *self == FileType::UNKNOWN
    }

    pub fn archive_format(&self) -> Option<ArchiveFormat> {
        self.archive
    }

    pub fn compression_type(&self) -> Option<CompressionType> {
        self.compression
    }

    pub fn suffix(&self) -> &'static str {
        self.suffix
    }
}

fn compression_by_magic(head: &[u8]) -> Option<CompressionType> {
    match head {
        [0x1F, 0x8B, ..] => Some(C::Gzip),
        [b'B', b'Z', b'h', ..] => Some(C::Bzip2),
        [0xFD, b'7', b'z', b'X', b'Z', 0x00, ..] => Some(C::Xz),
        [0x28, 0xB5, 0x2F, 0xFD, ..] => Some(C::Zstd),
        _ => None,
    }
}

fn container_by_magic(head: &[u8]) -> Option<ArchiveFormat> {
    match head {
        [b'P', b'K', 0x03, 0x04, ..] | [b'P', b'K', 0x05, 0x06, ..] => Some(A::Zip),
        [b'!', b'<', b'a', b'r', b'c', b'h', b'>', b'\n', ..] => Some(A::Ar),
        [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C, ..] => Some(A::SevenZ),
        [b'0', b'7', b'0', b'7', b'0', b'1' | b'2' | b'7', ..] => Some(A::Cpio),
        _ if head.len() >= 262 && &head[257..262] == b"ustar" => Some(A::Tar),
        _ => None,
    }
}

const SNIFF_LEN: usize = 512;

/// Detects format from content: outer compression first, then the container
/// inside it.
pub fn sniff(path: &Path) -> Result<FileType> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;

    let compression = compression_by_magic(&head);
    let inner = match compression {
        Some(c) => {
            let reg = CodecRegistry::default();
            let src: Box<dyn Read + Send> = Box::new(File::open(path)?);
            let dec = reg.get(c.codec())?.decoder(src)?;
            let mut inner = Vec::with_capacity(SNIFF_LEN);
            // A short or corrupt stream only means no container was recognised.
            let _ = dec.take(SNIFF_LEN as u64).read_to_end(&mut inner);
            inner
        }
        None => head,
    };
    let archive = container_by_magic(&inner);
    debug!(path = %path.display(), ?archive, ?compression, "sniffed file type");
    if archive.is_none() && compression.is_none() {
        return Ok(FileType::UNKNOWN);
    }
    Ok(FileType::from_parts(archive, compression))
}

use crate::error::{CartonError, Result};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CodecId {
    Store = 0,
    Deflate = 1,
    Gzip = 2,
    Bzip2 = 3,
    Xz = 4,
    Zstd = 5,
}

impl CodecId {
    pub const ALL: [CodecId; 6] = [
        CodecId::Store,
        CodecId::Deflate,
        CodecId::Gzip,
        CodecId::Bzip2,
        CodecId::Xz,
        CodecId::Zstd,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| *c as u8 == v)
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecId::Store => "store",
            CodecId::Deflate => "deflate",
            CodecId::Gzip => "gzip",
            CodecId::Bzip2 => "bzip2",
            CodecId::Xz => "xz",
            CodecId::Zstd => "zstd",
        }
    }

    /// ZIP compression method number, where the ZIP APPNOTE assigns one.
    pub fn zip_method(self) -> Option<u16> {
        match self {
            CodecId::Store => Some(0),
            CodecId::Deflate => Some(8),
            CodecId::Bzip2 => Some(12),
            CodecId::Zstd => Some(93),
            CodecId::Xz => Some(95),
            CodecId::Gzip => None,
        }
    }

    pub fn from_zip_method(method: u16) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.zip_method() == Some(method))
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodecId {
    type Err = CartonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "store" | "stored" | "none" => Ok(CodecId::Store),
            "deflate" => Ok(CodecId::Deflate),
            "gzip" | "gz" => Ok(CodecId::Gzip),
            "bzip2" | "bz2" => Ok(CodecId::Bzip2),
            "xz" | "lzma2" => Ok(CodecId::Xz),
            "zstd" | "zst" => Ok(CodecId::Zstd),
            other => Err(CartonError::UnsupportedCodec(other.to_string())),
        }
    }
}

/// A write side that must be explicitly finished to emit trailers.
pub trait EncodeWrite: Write + Send {
    /// Flushes codec trailers and returns the underlying sink.
    fn finish(self: Box<Self>) -> std::io::Result<Box<dyn Write + Send>>;
}

pub trait Codec: Send + Sync {
    fn id(&self) -> CodecId;

    /// Compresses all of `src` into `dst`, returning uncompressed bytes read.
    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write, level: Option<i32>) -> Result<u64>;

    /// Decompresses all of `src` into `dst`, returning uncompressed bytes written.
    fn decompress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64>;

    fn decoder(&self, src: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>>;

    fn encoder(
        &self,
        dst: Box<dyn Write + Send>,
        level: Option<i32>,
    ) -> Result<Box<dyn EncodeWrite>>;
}

pub(crate) fn clamp_level(level: Option<i32>, default: i32, min: i32, max: i32) -> i32 {
    level.unwrap_or(default).clamp(min, max)
}

pub mod bzip2c;
pub mod deflate;
pub mod gzip;
pub mod registry;
pub mod store;
pub mod xzc;
pub mod zstdc;

pub use registry::CodecRegistry;

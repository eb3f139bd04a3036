use super::{Codec, CodecId, EncodeWrite, clamp_level};
use crate::error::Result;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::io::{Read, Write};

/// Raw deflate (RFC 1951), the payload codec of ZIP method 8.
pub struct DeflateCodec;

fn level_of(level: Option<i32>) -> Compression {
    Compression::new(clamp_level(level, 6, 0, 9) as u32)
}

impl EncodeWrite for DeflateEncoder<Box<dyn Write + Send>> {
    fn finish(self: Box<Self>) -> std::io::Result<Box<dyn Write + Send>> {
        DeflateEncoder::finish(*self)
    }
}

impl Codec for DeflateCodec {
    fn id(&self) -> CodecId {
        CodecId::Deflate
    }

    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write, level: Option<i32>) -> Result<u64> {
        let mut enc = DeflateEncoder::new(dst, level_of(level));
        let n = std::io::copy(src, &mut enc)?;
        enc.finish()?;
        Ok(n)
    }

    fn decompress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64> {
        let mut dec = DeflateDecoder::new(src);
        Ok(std::io::copy(&mut dec, dst)?)
    }

    fn decoder(&self, src: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(DeflateDecoder::new(src)))
    }

    fn encoder(
        &self,
        dst: Box<dyn Write + Send>,
        level: Option<i32>,
    ) -> Result<Box<dyn EncodeWrite>> {
        Ok(Box::new(DeflateEncoder::new(dst, level_of(level))))
    }
}

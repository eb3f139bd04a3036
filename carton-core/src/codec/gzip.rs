use super::{Codec, CodecId, EncodeWrite, clamp_level};
use crate::error::Result;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

pub struct GzipCodec;

fn level_of(level: Option<i32>) -> Compression {
    Compression::new(clamp_level(level, 6, 0, 9) as u32)
}

impl EncodeWrite for GzEncoder<Box<dyn Write + Send>> {
    fn finish(self: Box<Self>) -> std::io::Result<Box<dyn Write + Send>> {
        GzEncoder::finish(*self)
    }
}

impl Codec for GzipCodec {
    fn id(&self) -> CodecId {
        CodecId::Gzip
    }

    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write, level: Option<i32>) -> Result<u64> {
        let mut enc = GzEncoder::new(dst, level_of(level));
        let n = std::io::copy(src, &mut enc)?;
        enc.finish()?;
        Ok(n)
    }

    // Multi-member decoding so concatenated `.gz` files read as one stream.
    fn decompress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64> {
        let mut dec = MultiGzDecoder::new(src);
        Ok(std::io::copy(&mut dec, dst)?)
    }

    fn decoder(&self, src: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(MultiGzDecoder::new(src)))
    }

    fn encoder(
        &self,
        dst: Box<dyn Write + Send>,
        level: Option<i32>,
    ) -> Result<Box<dyn EncodeWrite>> {
        Ok(Box::new(GzEncoder::new(dst, level_of(level))))
    }
}

use super::{Codec, CodecId, EncodeWrite, clamp_level};
use crate::error::Result;
use std::io::{Read, Write};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// XZ container with the LZMA2 filter.
pub struct XzCodec;

fn level_of(level: Option<i32>) -> u32 {
    clamp_level(level, 6, 0, 9) as u32
}

impl EncodeWrite for XzEncoder<Box<dyn Write + Send>> {
    fn finish(self: Box<Self>) -> std::io::Result<Box<dyn Write + Send>> {
        XzEncoder::finish(*self)
    }
}

impl Codec for XzCodec {
    fn id(&self) -> CodecId {
        CodecId::Xz
    }

    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write, level: Option<i32>) -> Result<u64> {
        let mut enc = XzEncoder::new(dst, level_of(level));
        let n = std::io::copy(src, &mut enc)?;
        enc.finish()?;
        Ok(n)
    }

    fn decompress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64> {
        let mut dec = XzDecoder::new_multi_decoder(src);
        Ok(std::io::copy(&mut dec, dst)?)
    }

    fn decoder(&self, src: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(XzDecoder::new_multi_decoder(src)))
    }

    fn encoder(
        &self,
        dst: Box<dyn Write + Send>,
        level: Option<i32>,
    ) -> Result<Box<dyn EncodeWrite>> {
        Ok(Box::new(XzEncoder::new(dst, level_of(level))))
    }
}

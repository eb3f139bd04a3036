use super::{Codec, CodecId, EncodeWrite, clamp_level};
use crate::error::Result;
use bzip2::Compression;
use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use std::io::{Read, Write};

pub struct Bzip2Codec;

fn level_of(level: Option<i32>) -> Compression {
    Compression::new(clamp_level(level, 9, 1, 9) as u32)
}

impl EncodeWrite for BzEncoder<Box<dyn Write + Send>> {
    fn finish(self: Box<Self>) -> std::io::Result<Box<dyn Write + Send>> {
        BzEncoder::finish(*self)
    }
}

impl Codec for Bzip2Codec {
    fn id(&self) -> CodecId {
        CodecId::Bzip2
    }

    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write, level: Option<i32>) -> Result<u64> {
        let mut enc = BzEncoder::new(dst, level_of(level));
        let n = std::io::copy(src, &mut enc)?;
        enc.finish()?;
        Ok(n)
    }

    fn decompress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64> {
        let mut dec = MultiBzDecoder::new(src);
        Ok(std::io::copy(&mut dec, dst)?)
    }

    fn decoder(&self, src: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(MultiBzDecoder::new(src)))
    }

    fn encoder(
        &self,
        dst: Box<dyn Write + Send>,
        level: Option<i32>,
    ) -> Result<Box<dyn EncodeWrite>> {
        Ok(Box::new(BzEncoder::new(dst, level_of(level))))
    }
}

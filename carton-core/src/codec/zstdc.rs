use super::{Codec, CodecId, EncodeWrite, clamp_level};
use crate::error::Result;
use std::io::{Read, Write};

pub struct ZstdCompressor;

fn level_of(level: Option<i32>) -> i32 {
    clamp_level(level, 3, 1, 22)
}

fn workers() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

fn new_encoder<W: Write>(
    dst: W,
    level: Option<i32>,
) -> Result<zstd::stream::write::Encoder<'static, W>> {
    let mut enc = zstd::stream::write::Encoder::new(dst, level_of(level))?;
    let n = workers();
    if n > 1 {
        enc.multithread(n)?;
    }
    Ok(enc)
}

impl EncodeWrite for zstd::stream::write::Encoder<'static, Box<dyn Write + Send>> {
    fn finish(self: Box<Self>) -> std::io::Result<Box<dyn Write + Send>> {
        zstd::stream::write::Encoder::finish(*self)
    }
}

impl Codec for ZstdCompressor {
    fn id(&self) -> CodecId {
        CodecId::Zstd
    }

    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write, level: Option<i32>) -> Result<u64> {
        let mut enc = new_encoder(dst, level)?;
        let written_uncompressed = std::io::copy(src, &mut enc)?;
        enc.finish()?;
        Ok(written_uncompressed)
    }

    fn decompress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64> {
        let mut dec = zstd::stream::Decoder::new(src)?;
        let written_uncompressed = std::io::copy(&mut dec, dst)?;
        Ok(written_uncompressed)
    }

    fn decoder(&self, src: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(zstd::stream::read::Decoder::new(src)?))
    }

    fn encoder(
        &self,
        dst: Box<dyn Write + Send>,
        level: Option<i32>,
    ) -> Result<Box<dyn EncodeWrite>> {
        Ok(Box::new(new_encoder(dst, level)?))
    }
}

use super::{Codec, CodecId, EncodeWrite};
use crate::error::Result;
use std::io::{Read, Write};

pub struct Store;

/// Pass-through sink; finishing only flushes.
pub struct StoreWriter {
    inner: Box<dyn Write + Send>,
}

impl Write for StoreWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl EncodeWrite for StoreWriter {
    fn finish(self: Box<Self>) -> std::io::Result<Box<dyn Write + Send>> {
        let mut inner = self.inner;
        inner.flush()?;
        Ok(inner)
    }
}

impl Codec for Store {
    fn id(&self) -> CodecId {
        CodecId::Store
    }

    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write, _level: Option<i32>) -> Result<u64> {
        Ok(std::io::copy(src, dst)?)
    }

    fn decompress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> Result<u64> {
        Ok(std::io::copy(src, dst)?)
    }

    fn decoder(&self, src: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> {
        Ok(src)
    }

    fn encoder(
        &self,
        dst: Box<dyn Write + Send>,
        _level: Option<i32>,
    ) -> Result<Box<dyn EncodeWrite>> {
        Ok(Box::new(StoreWriter { inner: dst }))
    }
}

use std::io::{Read, Result, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

/// Reads the window `[offset, offset + len)` of a shared seekable source.
///
/// Every read locks the source and seeks first, so several sections over the
/// same source may be alive at once.
pub struct SectionReader<R: Read + Seek> {
    src: Arc<Mutex<R>>,
    pos: u64,
    remain: u64,
}

impl<R: Read + Seek> SectionReader<R> {
    pub fn new(src: Arc<Mutex<R>>, offset: u64, len: u64) -> Self {
        Self {
            src,
            pos: offset,
            remain: len,
        }
    }
}

impl<R: Read + Seek> Read for SectionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.remain == 0 || buf.is_empty() {
            return Ok(0);
        }
        let cap = std::cmp::min(self.remain, buf.len() as u64) as usize;
        let mut f = self
            .src
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        f.seek(SeekFrom::Start(self.pos))?;
        let n = f.read(&mut buf[..cap])?;
        drop(f);
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        self.pos += n as u64;
        self.remain -= n as u64;
        Ok(n)
    }
}

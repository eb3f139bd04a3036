use std::io::{Error, ErrorKind, Read, Result};

/// Computes CRC-32 over everything read through it.
///
/// With an expectation set, reaching EOF checks both the checksum and the
/// byte count and fails with `InvalidData` on mismatch.
pub struct CrcReader<R: Read> {
    inner: R,
    hasher: crc32fast::Hasher,
    counted: u64,
    expect: Option<(u32, u64)>,
}

impl<R: Read> CrcReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            counted: 0,
            expect: None,
        }
    }

    pub fn verifying(inner: R, crc: u32, size: u64) -> Self {
        Self {
            expect: Some((crc, size)),
            ..Self::new(inner)
        }
    }

    pub fn crc(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn counted(&self) -> u64 {
        self.counted
    }
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.counted += n as u64;
        if n == 0 && !buf.is_empty() {
            if let Some((crc, size)) = self.expect.take() {
                if self.counted != size {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        format!("size mismatch: expected {size}, got {}", self.counted),
                    ));
                }
                let got = self.crc();
                if got != crc {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        format!("crc mismatch: expected {crc:08x}, got {got:08x}"),
                    ));
                }
            }
        }
        Ok(n)
    }
}

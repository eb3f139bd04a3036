//! Streaming adapters between byte sources, codecs and containers.

pub mod counting;
pub mod crc_forward;
pub mod sanitize;
pub mod section;
pub mod spool;

pub use counting::CountingWriter;
pub use crc_forward::CrcReader;
pub use section::SectionReader;
pub use spool::spool;

use std::io::{ErrorKind, Read};

/// Fills `buf` completely, or returns `Ok(false)` if the source was already
/// at EOF. A partial fill is `UnexpectedEof`.
pub(crate) fn read_full_or_eof(r: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Discards exactly `n` bytes.
pub(crate) fn skip(r: &mut dyn Read, n: u64) -> std::io::Result<()> {
    let mut limited = Read::take(&mut *r, n);
    let copied = std::io::copy(&mut limited, &mut std::io::sink())?;
    if copied != n {
        return Err(ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

/// Copies a sequential stream into an anonymous temp file so formats that
/// need random access (ZIP) can be read from pipes.
pub fn spool(mut src: impl Read) -> std::io::Result<File> {
    let mut f = tempfile::tempfile()?;
    let n = std::io::copy(&mut src, &mut f)?;
    f.seek(SeekFrom::Start(0))?;
    debug!(bytes = n, "spooled stream to temp file");
    Ok(f)
}

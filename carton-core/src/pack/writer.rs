use super::walker::Planned;
use crate::codec::CodecRegistry;
use crate::config::ArchiverOptions;
use crate::container::open_writer;
use crate::error::Result;
use crate::filetype::{ArchiveFormat, CompressionType};
use crate::stats::Stats;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Writes `plan` into a new archive at `out`.
pub(crate) fn write_archive(
    out: &Path,
    format: ArchiveFormat,
    compression: Option<CompressionType>,
    registry: Arc<CodecRegistry>,
    opts: &ArchiverOptions,
    plan: &[Planned],
) -> Result<Stats> {
    let sink = BufWriter::with_capacity(1 << 16, File::create(out)?);
    let mut writer = open_writer(format, Box::new(sink), registry, compression, opts)?;
    let mut stats = Stats::default();

    for p in plan {
        if p.entry.is_file() {
            let mut src = BufReader::new(File::open(&p.path)?);
            writer.put_entry(&p.entry, &mut src)?;
            stats.record(&p.entry, p.entry.size);
        } else {
            writer.put_entry(&p.entry, &mut io::empty())?;
            stats.record(&p.entry, 0);
        }
        debug!(name = %p.entry.name, kind = %p.entry.kind, "added");
    }
    writer.finish()?;

    info!(
        archive = %out.display(),
        format = %format,
        files = stats.files,
        dirs = stats.dirs,
        bytes = stats.logical_bytes,
        "create complete"
    );
    Ok(stats)
}

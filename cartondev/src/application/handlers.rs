use std::io::{self, Write};
use std::path::{Path, PathBuf};

use carton_core::error::{CartonError, Result};
use carton_core::{
    ArchiverOptions, CodecId, CodecRegistry, Compressor, CompressionType, FileType, archiver_by_name,
    archiver_for_path, archiver_for_type, compressor_for_path, list_with,
};
use tracing::debug;

pub fn load_options(config: Option<&Path>) -> Result<ArchiverOptions> {
    match config {
        Some(p) => {
            let opts = ArchiverOptions::from_json_file(p)?;
            debug!(config = %p.display(), ?opts, "loaded options");
            Ok(opts)
        }
        None => Ok(ArchiverOptions::default()),
    }
}

pub fn handle_create(
    mut opts: ArchiverOptions,
    out: PathBuf,
    inputs: Vec<PathBuf>,
    format: Option<String>,
    compression: Option<String>,
    deterministic: bool,
) -> Result<()> {
    opts.deterministic |= deterministic;
    let archiver = match format {
        Some(f) => archiver_by_name(&f, compression.as_deref())?,
        None => {
            let ft = FileType::get(&out);
            if compression.is_some() || !ft.is_archive() {
                return Err(CartonError::UnknownFormat(format!(
                    "cannot tell the archive type of {}; pass --format",
                    out.display()
                )));
            }
            archiver_for_type(ft)?
        }
    }
    .with_options(opts);

    let name = out
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CartonError::InvalidArgument(format!("bad output path {}", out.display())))?;
    let dir = match out.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let path = archiver.create(name, &dir, &inputs)?;
    eprintln!("create: {}", path.display());
    Ok(())
}

pub fn handle_extract(opts: ArchiverOptions, archive: PathBuf, dest: PathBuf) -> Result<()> {
    let stats = archiver_for_path(&archive)?
        .with_options(opts)
        .extract(&archive, &dest)?;
    eprintln!(
        "extract: {} files, {} dirs, {} symlinks, {} bytes -> {}",
        stats.files,
        stats.dirs,
        stats.symlinks,
        stats.logical_bytes,
        dest.display()
    );
    Ok(())
}

pub fn handle_list(opts: ArchiverOptions, archive: PathBuf, long: bool, json: bool) -> Result<()> {
    let rows = list_with(&archive, opts)?;
    let mut out = io::stdout().lock();
    if json {
        let s = serde_json::to_string_pretty(&rows).map_err(io::Error::other)?;
        writeln!(out, "{s}")?;
        return Ok(());
    }
    for r in rows {
        if long {
            writeln!(
                out,
                "{:<7} {:04o} {:>12}  {:>10}  {}",
                r.kind.to_string(),
                r.mode,
                r.size,
                r.mtime,
                match &r.link_target {
                    Some(t) => format!("{} -> {t}", r.path),
                    None => r.path,
                }
            )?;
        } else {
            writeln!(out, "{}", r.path)?;
        }
    }
    Ok(())
}

pub fn handle_cat(opts: ArchiverOptions, archive: PathBuf, entry: String) -> Result<()> {
    let mut stream = archiver_for_path(&archive)?
        .with_options(opts)
        .stream(&archive)?;
    while let Some(e) = stream.next_entry()? {
        if e.name != entry {
            continue;
        }
        if !e.is_file() {
            return Err(CartonError::InvalidArgument(format!("{entry} is a {}", e.kind)));
        }
        let mut out = io::stdout().lock();
        io::copy(&mut stream, &mut out)?;
        out.flush()?;
        return Ok(());
    }
    Err(CartonError::InvalidArgument(format!(
        "no entry {entry} in {}",
        archive.display()
    )))
}

pub fn handle_compress(
    opts: ArchiverOptions,
    source: PathBuf,
    dest: PathBuf,
    compression: String,
    level: Option<i32>,
) -> Result<()> {
    let c: CompressionType = compression.parse()?;
    let target = Compressor::new(c)
        .with_level(level.or(opts.level))
        .compress(&source, &dest)?;
    eprintln!("compress: {} -> {}", source.display(), target.display());
    Ok(())
}

pub fn handle_decompress(source: PathBuf, dest: PathBuf) -> Result<()> {
    let target = compressor_for_path(&source)?.decompress(&source, &dest)?;
    eprintln!("decompress: {} -> {}", source.display(), target.display());
    Ok(())
}

pub fn handle_codecs() -> Result<()> {
    let registry = CodecRegistry::default();
    let mut out = io::stdout().lock();
    for id in CodecId::ALL {
        let method = id
            .zip_method()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".into());
        let status = if registry.contains(id) { "yes" } else { "no" };
        writeln!(out, "{:<8} zip-method={:<3} registered={status}", id.name(), method)?;
    }
    Ok(())
}

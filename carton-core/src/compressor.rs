//! Single-file compression with a codec from the registry.

use crate::archiver::{check_source_file, prepare_dest};
use crate::codec::{Codec, CodecRegistry};
use crate::error::{CartonError, Result};
use crate::filetype::{CompressionType, FileType};
use crate::permissions::is_writable;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Debug)]
pub struct Compressor {
    compression: CompressionType,
    registry: Arc<CodecRegistry>,
    level: Option<i32>,
}

impl Compressor {
    pub fn new(compression: CompressionType) -> Self {
        Self {
            compression,
            registry: Arc::new(CodecRegistry::default()),
            level: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<CodecRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_level(mut self, level: Option<i32>) -> Self {
        self.level = level;
        self
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    pub fn filename_extension(&self) -> &'static str {
        self.compression.default_suffix()
    }

    /// Compresses `source` to `dest`, or to `dest/<name><suffix>` when
    /// `dest` is a directory.
    pub fn compress(&self, source: &Path, dest: &Path) -> Result<PathBuf> {
        check_source_file(source)?;
        let target = if dest.is_dir() {
            prepare_dest(dest)?;
            let name = file_name(source)?;
            dest.join(format!("{name}{}", self.filename_extension()))
        } else {
            check_target_file(dest)?;
            dest.to_path_buf()
        };
        let n = self.write_target(source, &target, |codec, src, dst| {
            codec.compress(src, dst, self.level)
        })?;
        info!(source = %source.display(), target = %target.display(), bytes = n, "compressed");
        Ok(target)
    }

    /// Decompresses `source` to `dest`. For a directory `dest` the output is
    /// named after `source` without its compression suffix (`.tgz` becomes
    /// `.tar`), or with `.out` appended when there is none.
    pub fn decompress(&self, source: &Path, dest: &Path) -> Result<PathBuf> {
        check_source_file(source)?;
        let target = if dest.is_dir() {
            prepare_dest(dest)?;
            dest.join(self.decompressed_name(&file_name(source)?))
        } else {
            check_target_file(dest)?;
            dest.to_path_buf()
        };
        let n = self.write_target(source, &target, |codec, src, dst| codec.decompress(src, dst))?;
        info!(source = %source.display(), target = %target.display(), bytes = n, "decompressed");
        Ok(target)
    }

    /// Runs `op` from `source` into a new `target`, removing the target again
    /// when it fails.
    fn write_target<F>(&self, source: &Path, target: &Path, op: F) -> Result<u64>
    where
        F: FnOnce(&dyn Codec, &mut dyn Read, &mut dyn Write) -> Result<u64>,
    {
        if same_file(source, target) {
            return Err(CartonError::InvalidArgument(format!(
                "{} would overwrite its own source",
                target.display()
            )));
        }
        let codec = self.registry.get(self.compression.codec())?;
        let mut src = BufReader::new(File::open(source)?);
        let res = File::create(target).map_err(CartonError::from).and_then(|f| {
            let mut dst = BufWriter::new(f);
            let n = op(codec, &mut src, &mut dst)?;
            dst.flush()?;
            Ok(n)
        });
        if res.is_err() {
            let _ = fs::remove_file(target);
        }
        res
    }

    fn decompressed_name(&self, name: &str) -> String {
        let lower = name.to_ascii_lowercase();
        let suffix = self.filename_extension();
        if lower.ends_with(suffix) && name.len() > suffix.len() {
            return name[..name.len() - suffix.len()].to_string();
        }
        let ft = FileType::get(name);
        if let (Some(archive), Some(c)) = (ft.archive_format(), ft.compression_type()) {
            if c == self.compression {
                let stem = &name[..name.len() - ft.suffix().len()];
                return format!("{stem}{}", archive.default_suffix());
            }
        }
        format!("{name}.out")
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CartonError::InvalidArgument(format!("{} has no file name", path.display())))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// An output file path must sit in an existing, writable directory.
fn check_target_file(target: &Path) -> Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match fs::metadata(parent) {
        Ok(md) if md.is_dir() && is_writable(&md) => Ok(()),
        _ => Err(CartonError::InvalidArgument(format!(
            "cannot write {}",
            target.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_or_appends_suffix() {
        let gz = Compressor::new(CompressionType::Gzip);
        assert_eq!(gz.decompressed_name("notes.txt.gz"), "notes.txt");
        assert_eq!(gz.decompressed_name("NOTES.TXT.GZ"), "NOTES.TXT");
        assert_eq!(gz.decompressed_name("bundle.tgz"), "bundle.tar");
        assert_eq!(gz.decompressed_name("plain"), "plain.out");
        let bz = Compressor::new(CompressionType::Bzip2);
        assert_eq!(bz.decompressed_name("bundle.tbz2"), "bundle.tar");
        assert_eq!(bz.decompressed_name("bundle.tgz"), "bundle.tgz.out");
    }

    #[test]
    fn compress_into_directory_then_back() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("data.txt");
        fs::write(&src, b"compress me ".repeat(50)).unwrap();
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();

        for c in [
            CompressionType::Gzip,
            CompressionType::Bzip2,
            CompressionType::Xz,
            CompressionType::Zstd,
        ] {
            let comp = Compressor::new(c);
            let packed = comp.compress(&src, &out).unwrap();
            assert_eq!(
                packed.file_name().unwrap().to_string_lossy(),
                format!("data.txt{}", c.default_suffix())
            );
            let back_dir = tmp.path().join(format!("back-{c}"));
            fs::create_dir(&back_dir).unwrap();
            let back = comp.decompress(&packed, &back_dir).unwrap();
            assert_eq!(back, back_dir.join("data.txt"));
            assert_eq!(fs::read(back).unwrap(), fs::read(&src).unwrap());
        }
    }

    #[test]
    fn explicit_output_file() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a");
        fs::write(&src, b"abc").unwrap();
        let target = tmp.path().join("custom.bin");
        let comp = Compressor::new(CompressionType::Zstd);
        assert_eq!(comp.compress(&src, &target).unwrap(), target);
        let plain = tmp.path().join("plain");
        comp.decompress(&target, &plain).unwrap();
        assert_eq!(fs::read(plain).unwrap(), b"abc");
    }

    #[test]
    fn failed_decompress_leaves_no_output() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("broken.txt.gz");
        fs::write(&src, b"\x1f\x8bnot really gzip").unwrap();
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        assert!(Compressor::new(CompressionType::Gzip).decompress(&src, &out).is_err());
        assert!(!out.join("broken.txt").exists());
    }

    #[test]
    fn refuses_to_overwrite_source() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("same.bin");
        fs::write(&src, b"keep me").unwrap();
        let err = Compressor::new(CompressionType::Xz)
            .compress(&src, &src)
            .unwrap_err();
        assert!(matches!(err, CartonError::InvalidArgument(_)), "{err}");
        assert_eq!(fs::read(&src).unwrap(), b"keep me");
    }

    #[test]
    fn missing_source() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Compressor::new(CompressionType::Gzip)
            .compress(&tmp.path().join("missing"), tmp.path())
            .unwrap_err();
        assert!(matches!(err, CartonError::SourceNotFound(_)));
    }
}

//! Create, extract and stream archives of one format and optional outer
//! compression.

use crate::codec::CodecRegistry;
use crate::config::ArchiverOptions;
use crate::container::{Source, open_reader};
use crate::error::{CartonError, Result};
use crate::filetype::{ArchiveFormat, CompressionType, FileType};
use crate::pack::{walker, writer};
use crate::permissions::{is_readable, is_writable};
use crate::read::extract::extract_all;
use crate::read::stream::ArchiveStream;
use crate::stats::Stats;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Archiver {
    format: ArchiveFormat,
    compression: Option<CompressionType>,
    registry: Arc<CodecRegistry>,
    options: ArchiverOptions,
}

/// Checks that `dest` can receive output, creating it when missing.
pub(crate) fn prepare_dest(dest: &Path) -> Result<()> {
    match fs::metadata(dest) {
        Ok(md) if !md.is_dir() => Err(CartonError::InvalidArgument(format!(
            "destination {} is not a directory",
            dest.display()
        ))),
        Ok(md) if !is_writable(&md) => Err(CartonError::InvalidArgument(format!(
            "destination {} is not writable",
            dest.display()
        ))),
        Ok(_) => Ok(()),
        Err(_) => {
            fs::create_dir_all(dest)?;
            Ok(())
        }
    }
}

/// Checks that `source` is an existing, readable regular file.
pub(crate) fn check_source_file(source: &Path) -> Result<()> {
    let md =
        fs::metadata(source).map_err(|_| CartonError::SourceNotFound(source.to_path_buf()))?;
    if !md.is_file() || !is_readable(&md) {
        return Err(CartonError::InvalidArgument(format!(
            "{} is not a readable file",
            source.display()
        )));
    }
    Ok(())
}

impl Archiver {
    pub fn new(format: ArchiveFormat, compression: Option<CompressionType>) -> Result<Self> {
        if format.has_entry_codecs() {
            if let Some(c) = compression {
                return Err(CartonError::Unsupported(format!(
                    "{format} archives cannot be wrapped in {c}"
                )));
            }
        }
        Ok(Self {
            compression,
            ..Self::uncompressed(format)
        })
    }

    pub fn uncompressed(format: ArchiveFormat) -> Self {
        Self {
            format,
            compression: None,
            registry: Arc::new(CodecRegistry::default()),
            options: ArchiverOptions::default(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<CodecRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: ArchiverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    pub fn compression(&self) -> Option<CompressionType> {
        self.compression
    }

    pub fn options(&self) -> &ArchiverOptions {
        &self.options
    }

    pub fn file_type(&self) -> FileType {
        FileType::from_parts(Some(self.format), self.compression)
    }

    /// Suffix of archives produced by this archiver, e.g. `.tar.gz`.
    pub fn filename_extension(&self) -> String {
        match self.file_type().suffix() {
            "" => format!(
                "{}{}",
                self.format.default_suffix(),
                self.compression.map(|c| c.default_suffix()).unwrap_or("")
            ),
            s => s.to_string(),
        }
    }

    /// Archives `sources` into `dest_dir/name`, appending the extension when
    /// `name` lacks it. Returns the path of the new archive.
    pub fn create<P: AsRef<Path>>(
        &self,
        name: &str,
        dest_dir: &Path,
        sources: &[P],
    ) -> Result<PathBuf> {
        if sources.is_empty() {
            return Err(CartonError::InvalidArgument("nothing to archive".into()));
        }
        let plan = walker::plan(sources, &self.options)?;
        prepare_dest(dest_dir)?;

        let ext = self.filename_extension();
        let file_name = if name.to_ascii_lowercase().ends_with(&ext) {
            name.to_string()
        } else {
            format!("{name}{ext}")
        };
        let out = dest_dir.join(file_name);
        let res = writer::write_archive(
            &out,
            self.format,
            self.compression,
            self.registry.clone(),
            &self.options,
            &plan,
        );
        if let Err(e) = res {
            let _ = fs::remove_file(&out);
            return Err(e);
        }
        Ok(out)
    }

    pub fn extract(&self, archive: &Path, dest: &Path) -> Result<Stats> {
        let mut stream = self.stream(archive)?;
        prepare_dest(dest)?;
        extract_all(&mut stream, dest, &self.options.policy)
    }

    pub fn extract_from<R: Read + Send + 'static>(&self, reader: R, dest: &Path) -> Result<Stats> {
        prepare_dest(dest)?;
        let mut stream = self.stream_from(reader)?;
        extract_all(&mut stream, dest, &self.options.policy)
    }

    pub fn stream(&self, archive: &Path) -> Result<ArchiveStream> {
        check_source_file(archive)?;
        self.open(Source::File(File::open(archive)?))
    }

    pub fn stream_from<R: Read + Send + 'static>(&self, reader: R) -> Result<ArchiveStream> {
        self.open(Source::Stream(Box::new(reader)))
    }

    fn open(&self, source: Source) -> Result<ArchiveStream> {
        let reader = open_reader(self.format, source, self.registry.clone(), self.compression)?;
        Ok(ArchiveStream::new(reader, self.options.policy.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions() {
        let ext = |f, c| Archiver::new(f, c).unwrap().filename_extension();
        assert_eq!(ext(ArchiveFormat::Tar, None), ".tar");
        assert_eq!(ext(ArchiveFormat::Tar, Some(CompressionType::Gzip)), ".tar.gz");
        assert_eq!(ext(ArchiveFormat::Tar, Some(CompressionType::Bzip2)), ".tar.bz2");
        assert_eq!(ext(ArchiveFormat::Cpio, Some(CompressionType::Xz)), ".cpio.xz");
        assert_eq!(ext(ArchiveFormat::Ar, Some(CompressionType::Zstd)), ".ar.zst");
        assert_eq!(ext(ArchiveFormat::Jar, None), ".jar");
    }

    #[test]
    fn zip_refuses_outer_compression() {
        assert!(matches!(
            Archiver::new(ArchiveFormat::Zip, Some(CompressionType::Gzip)),
            Err(CartonError::Unsupported(_))
        ));
    }

    #[test]
    fn name_keeps_existing_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("f.txt");
        fs::write(&src, b"x").unwrap();
        let a = Archiver::new(ArchiveFormat::Tar, Some(CompressionType::Gzip)).unwrap();
        let out = a.create("bundle.TAR.GZ", &tmp.path().join("out"), &[&src]).unwrap();
        assert_eq!(out.file_name().unwrap(), "bundle.TAR.GZ");
        let out = a.create("bundle", &tmp.path().join("out"), &[&src]).unwrap();
        assert_eq!(out.file_name().unwrap(), "bundle.tar.gz");
    }
}

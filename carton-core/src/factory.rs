use crate::archiver::Archiver;
use crate::compressor::Compressor;
use crate::error::{CartonError, Result};
use crate::filetype::{ArchiveFormat, CompressionType, FileType, sniff};
use std::path::Path;

pub fn archiver(format: ArchiveFormat) -> Archiver {
    Archiver::uncompressed(format)
}

pub fn archiver_with(
    format: ArchiveFormat,
    compression: Option<CompressionType>,
) -> Result<Archiver> {
    Archiver::new(format, compression)
}

/// Parses names such as `"tar"` and `"gz"`.
pub fn archiver_by_name(format: &str, compression: Option<&str>) -> Result<Archiver> {
    let compression: Option<CompressionType> = compression.map(str::parse).transpose()?;
    archiver_with(format.parse()?, compression)
}

pub fn archiver_for_type(ft: FileType) -> Result<Archiver> {
    match ft.archive_format() {
        Some(format) => archiver_with(format, ft.compression_type()),
        None => Err(CartonError::UnknownFormat(format!(
            "not an archive type ({})",
            if ft.is_unknown() { "unknown" } else { ft.suffix() }
        ))),
    }
}

/// Picks an archiver from the file name, falling back to the file's magic
/// bytes when the name is not recognised.
pub fn archiver_for_path(path: &Path) -> Result<Archiver> {
    let ft = FileType::get(path);
    if ft.is_archive() {
        return archiver_for_type(ft);
    }
    if path.is_file() {
        let sniffed = sniff(path)?;
        if sniffed.is_archive() {
            return archiver_for_type(sniffed);
        }
    }
    Err(CartonError::UnknownFormat(path.display().to_string()))
}

pub fn compressor(compression: CompressionType) -> Compressor {
    Compressor::new(compression)
}

pub fn compressor_for_type(ft: FileType) -> Result<Compressor> {
    ft.compression_type()
        .map(Compressor::new)
        .ok_or_else(|| {
            CartonError::UnknownFormat(format!("not a compressed type ({})", ft.suffix()))
        })
}

pub fn compressor_for_path(path: &Path) -> Result<Compressor> {
    let ft = FileType::get(path);
    if ft.is_compressed() {
        return compressor_for_type(ft);
    }
    if path.is_file() {
        let sniffed = sniff(path)?;
        if sniffed.is_compressed() {
            return compressor_for_type(sniffed);
        }
    }
    Err(CartonError::UnknownFormat(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_name() {
        let a = archiver_by_name("tar", Some("gz")).unwrap();
        assert_eq!(a.format(), ArchiveFormat::Tar);
        assert_eq!(a.compression(), Some(CompressionType::Gzip));
        assert!(matches!(
            archiver_by_name("rar", None),
            Err(CartonError::UnknownFormat(_))
        ));
    }

    #[test]
    fn from_suffix() {
        let a = archiver_for_path(Path::new("x/backup.tar.xz")).unwrap();
        assert_eq!(a.format(), ArchiveFormat::Tar);
        assert_eq!(a.compression(), Some(CompressionType::Xz));
        assert_eq!(
            archiver_for_path(Path::new("lib.jar")).unwrap().format(),
            ArchiveFormat::Jar
        );
        assert_eq!(
            archiver_for_path(Path::new("bundle.7z")).unwrap().format(),
            ArchiveFormat::SevenZ
        );
        assert!(archiver_for_path(Path::new("notes.txt")).is_err());
        assert!(archiver_for_path(Path::new("single.gz")).is_err());
    }

    #[test]
    fn compressors() {
        let c = compressor_for_path(Path::new("a.tgz")).unwrap();
        assert_eq!(c.compression(), CompressionType::Gzip);
        assert_eq!(
            compressor_for_path(Path::new("a.zst")).unwrap().compression(),
            CompressionType::Zstd
        );
        assert!(compressor_for_path(Path::new("a.tar")).is_err());
    }

    #[test]
    fn sniffs_unnamed_files() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("f");
        std::fs::write(&src, b"payload").unwrap();
        let made = archiver(ArchiveFormat::Zip)
            .create("blob", tmp.path(), &[&src])
            .unwrap();
        let renamed = tmp.path().join("blob.bin");
        std::fs::rename(&made, &renamed).unwrap();
        assert_eq!(archiver_for_path(&renamed).unwrap().format(), ArchiveFormat::Zip);
    }
}

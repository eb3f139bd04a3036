use crate::config::ArchiverOptions;
use crate::entry::ArchiveEntry;
use crate::error::{CartonError, Result};
use crate::permissions::{is_readable, mode_from};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// One filesystem object scheduled for archiving.
#[derive(Debug, Clone)]
pub(crate) struct Planned {
    pub(crate) path: PathBuf,
    pub(crate) entry: ArchiveEntry,
}

fn mtime_from(md: &fs::Metadata) -> i64 {
    md.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn base_name(source: &Path) -> Result<String> {
    if let Some(n) = source.file_name() {
        return Ok(n.to_string_lossy().into_owned());
    }
    fs::canonicalize(source)?
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            CartonError::InvalidArgument(format!("{} has no file name", source.display()))
        })
}

/// Expands `sources` into entries named after each source's own file name,
/// descending into directories in file-name order.
pub(crate) fn plan<P: AsRef<Path>>(sources: &[P], opts: &ArchiverOptions) -> Result<Vec<Planned>> {
    let mut out = Vec::new();
    for source in sources {
        let source = source.as_ref();
        let md = match fs::symlink_metadata(source) {
            Ok(md) => md,
            Err(_) => return Err(CartonError::SourceNotFound(source.to_path_buf())),
        };
        if !md.file_type().is_symlink() && !is_readable(&md) {
            return Err(CartonError::SourceNotFound(source.to_path_buf()));
        }
        let base = base_name(source)?;

        let walk = WalkDir::new(source)
            .follow_links(opts.follow_symlinks)
            .sort_by_file_name();
        for e in walk {
            let e = e.map_err(std::io::Error::from)?;
            let rel = e.path().strip_prefix(source).unwrap_or(e.path());
            let mut name = base.clone();
            for part in rel.components() {
                name.push('/');
                name.push_str(&part.as_os_str().to_string_lossy());
            }

            let md = e.metadata().map_err(std::io::Error::from)?;
            let ft = e.file_type();
            let entry = if ft.is_dir() {
                ArchiveEntry::directory(name)
            } else if ft.is_file() {
                ArchiveEntry::file(name, md.len())
            } else if ft.is_symlink() {
                let target = fs::read_link(e.path())?;
                ArchiveEntry::symlink(name, target.to_string_lossy())
            } else {
                debug!(path = %e.path().display(), "skipping special file");
                continue;
            };
            let mtime = if opts.deterministic { 0 } else { mtime_from(&md) };
            let entry = if ft.is_symlink() {
                entry.with_mtime(mtime)
            } else {
                entry.with_mode(mode_from(&md)).with_mtime(mtime)
            };
            out.push(Planned {
                path: e.path().to_path_buf(),
                entry,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;

    #[test]
    fn names_entries_after_the_source() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("tree");
        fs::create_dir_all(root.join("b/inner")).unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::write(root.join("b/inner/c.txt"), b"cc").unwrap();

        let plan = plan(&[&root], &ArchiverOptions::default()).unwrap();
        let names: Vec<_> = plan.iter().map(|p| p.entry.name.as_str()).collect();
        assert_eq!(
            names,
            ["tree", "tree/a.txt", "tree/b", "tree/b/inner", "tree/b/inner/c.txt"]
        );
        assert_eq!(plan[4].entry.size, 2);
        assert_eq!(plan[2].entry.kind, EntryKind::Directory);
    }

    #[test]
    fn deterministic_zeroes_mtimes() {
        let tmp = tempfile::tempdir().unwrap();
        let f = tmp.path().join("f");
        fs::write(&f, b"x").unwrap();
        let opts = ArchiverOptions {
            deterministic: true,
            ..ArchiverOptions::default()
        };
        let plan = plan(&[&f], &opts).unwrap();
        assert_eq!(plan[0].entry.mtime, 0);
        assert_eq!(plan[0].entry.name, "f");
    }

    #[test]
    fn missing_source_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            plan(&[&missing], &ArchiverOptions::default()),
            Err(CartonError::SourceNotFound(p)) if p == missing
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_kept_as_links() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("t");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("real"), b"r").unwrap();
        std::os::unix::fs::symlink("real", root.join("alias")).unwrap();
        let plan = plan(&[&root], &ArchiverOptions::default()).unwrap();
        let alias = plan.iter().find(|p| p.entry.name == "t/alias").unwrap();
        assert!(alias.entry.is_symlink());
        assert_eq!(alias.entry.link_target.as_deref(), Some("real"));
    }
}

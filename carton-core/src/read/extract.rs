use super::stream::ArchiveStream;
use crate::entry::{ArchiveEntry, EntryKind};
use crate::error::{CartonError, Result, format_err};
use crate::permissions::apply_mode;
use crate::policy::{Budget, Policy};
use crate::stats::Stats;
use crate::util::sanitize::{check_no_escape, link_resolves_inside, safe_join};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Writes entries below a root directory. Directory modes are held back
/// until [`Extractor::finish`] so read-only directories can still be filled.
pub(crate) struct Extractor<'p> {
    root: PathBuf,
    policy: &'p Policy,
    budget: Budget,
    stats: Stats,
    dir_modes: Vec<(PathBuf, u32)>,
    buf: Vec<u8>,
}

/// Removes a symlink sitting where a file or link is about to be written,
/// so the write cannot follow it.
fn clear_link(path: &Path) -> Result<()> {
    if let Ok(md) = fs::symlink_metadata(path) {
        if md.file_type().is_symlink() {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

impl<'p> Extractor<'p> {
    pub(crate) fn new(root: &Path, policy: &'p Policy) -> Self {
        Self {
            root: fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()),
            policy,
            budget: Budget::default(),
            stats: Stats::default(),
            dir_modes: Vec::new(),
            buf: vec![0u8; 1 << 16],
        }
    }

    pub(crate) fn entry(&mut self, entry: &ArchiveEntry, payload: &mut dyn Read) -> Result<()> {
        self.budget
            .admit_entry(self.policy, &entry.name, entry.size)?;
        let out = safe_join(&self.root, &entry.name)?;

        match entry.kind {
            EntryKind::Directory => {
                check_no_escape(&self.root, &out)?;
                fs::create_dir_all(&out)?;
                self.dir_modes.push((out, entry.mode));
                self.stats.record(entry, 0);
            }
            EntryKind::File => {
                self.make_parent(&out)?;
                clear_link(&out)?;
                let mut f = File::create(&out)?;
                let written = match self.copy_payload(entry, payload, &mut f) {
                    Ok(n) => n,
                    Err(e) => {
                        drop(f);
                        let _ = fs::remove_file(&out);
                        return Err(e);
                    }
                };
                f.set_modified(SystemTime::from(entry.modified()))?;
                drop(f);
                apply_mode(&out, entry.mode)?;
                self.stats.record(entry, written);
            }
            EntryKind::Symlink => {
                let target = entry.link_target.as_deref().unwrap_or_default();
                if !self.policy.allow_symlinks {
                    warn!(name = %entry.name, target, "skipping symlink, not allowed by policy");
                    return Ok(());
                }
                self.make_parent(&out)?;
                clear_link(&out)?;
                if !link_resolves_inside(&self.root, &out, target) {
                    return Err(CartonError::UnsafePath(format!("{} -> {target}", entry.name)));
                }
                #[cfg(unix)]
                std::os::unix::fs::symlink(target, &out)?;
                #[cfg(not(unix))]
                {
                    warn!(name = %entry.name, "symlinks are not supported on this platform");
                    return Ok(());
                }
                self.stats.record(entry, 0);
            }
        }
        debug!(name = %entry.name, kind = %entry.kind, "extracted");
        Ok(())
    }

    fn make_parent(&self, out: &Path) -> Result<()> {
        if let Some(parent) = out.parent() {
            check_no_escape(&self.root, parent)?;
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Copies the payload, stopping before a write that would pass the
    /// declared size or a quota.
    fn copy_payload(
        &mut self,
        entry: &ArchiveEntry,
        payload: &mut dyn Read,
        f: &mut File,
    ) -> Result<u64> {
        let mut written = 0u64;
        loop {
            let n = payload.read(&mut self.buf)?;
            if n == 0 {
                return Ok(written);
            }
            written += n as u64;
            self.budget.admit_bytes(self.policy, n as u64)?;
            self.budget
                .admit_entry_bytes(self.policy, &entry.name, written)?;
            if written > entry.size {
                return Err(format_err(format!(
                    "{} holds more than its declared {} bytes",
                    entry.name, entry.size
                )));
            }
            f.write_all(&self.buf[..n])?;
        }
    }

    /// Applies held-back directory modes, deepest first.
    pub(crate) fn finish(mut self) -> Result<Stats> {
        self.dir_modes
            .sort_by_key(|(p, _)| std::cmp::Reverse(p.components().count()));
        for (path, mode) in &self.dir_modes {
            apply_mode(path, *mode)?;
        }
        Ok(self.stats)
    }
}

/// Extracts every remaining entry of `stream` below `dest`.
pub fn extract_all(stream: &mut ArchiveStream, dest: &Path, policy: &Policy) -> Result<Stats> {
    let mut ex = Extractor::new(dest, policy);
    while let Some(entry) = stream.next_entry()? {
        ex.entry(&entry, stream)?;
    }
    let stats = ex.finish()?;
    info!(
        dest = %dest.display(),
        files = stats.files,
        dirs = stats.dirs,
        bytes = stats.logical_bytes,
        "extract complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn traversal_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let policy = Policy::default();
        let mut ex = Extractor::new(dir.path(), &policy);
        let err = ex
            .entry(&ArchiveEntry::file("../escape.txt", 1), &mut &b"x"[..])
            .unwrap_err();
        assert!(matches!(err, CartonError::UnsafePath(_)));
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }

    #[test]
    fn quota_counts_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let policy = Policy {
            max_total_size: Some(4),
            ..Policy::default()
        };
        let mut ex = Extractor::new(dir.path(), &policy);
        // header claims less than the payload delivers
        let err = ex
            .entry(&ArchiveEntry::file("lie.bin", 1), &mut &b"0123456789"[..])
            .unwrap_err();
        assert!(matches!(err, CartonError::QuotaExceeded(_)));
    }

    #[test]
    fn symlinks_follow_policy() {
        let dir = tempfile::tempdir().unwrap();
        let deny = Policy::default();
        let mut ex = Extractor::new(dir.path(), &deny);
        ex.entry(&ArchiveEntry::symlink("l", "target"), &mut io::empty())
            .unwrap();
        assert!(fs::symlink_metadata(dir.path().join("l")).is_err());

        let allow = Policy {
            allow_symlinks: true,
            ..Policy::default()
        };
        let mut ex = Extractor::new(dir.path(), &allow);
        let err = ex
            .entry(&ArchiveEntry::symlink("l", "../../etc"), &mut io::empty())
            .unwrap_err();
        assert!(matches!(err, CartonError::UnsafePath(_)));
    }

    #[test]
    fn payload_longer_than_header_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let policy = Policy {
            max_entry_size: Some(100),
            ..Policy::default()
        };
        let big = vec![7u8; 1 << 20];
        let mut ex = Extractor::new(dir.path(), &policy);
        let err = ex
            .entry(&ArchiveEntry::file("small.bin", 5), &mut &big[..])
            .unwrap_err();
        assert!(matches!(err, CartonError::QuotaExceeded(_)), "{err}");
        assert!(!dir.path().join("small.bin").exists());

        let unbounded = Policy::default();
        let mut ex = Extractor::new(dir.path(), &unbounded);
        let err = ex
            .entry(&ArchiveEntry::file("small.bin", 5), &mut &big[..])
            .unwrap_err();
        assert!(matches!(err, CartonError::Format(_)), "{err}");
        assert!(!dir.path().join("small.bin").exists());
    }

    #[cfg(unix)]
    #[test]
    fn link_chains_cannot_climb_out() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("jail");
        fs::create_dir(&root).unwrap();
        let policy = Policy {
            allow_symlinks: true,
            ..Policy::default()
        };
        let mut ex = Extractor::new(&root, &policy);
        ex.entry(&ArchiveEntry::directory("d"), &mut io::empty())
            .unwrap();
        ex.entry(&ArchiveEntry::symlink("d/l1", ".."), &mut io::empty())
            .unwrap();
        let err = ex
            .entry(&ArchiveEntry::symlink("l2", "d/l1/.."), &mut io::empty())
            .unwrap_err();
        assert!(matches!(err, CartonError::UnsafePath(_)), "{err}");
        assert!(fs::symlink_metadata(root.join("l2")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn planted_parent_link_is_not_written_through() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("jail");
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(outer.path(), root.join("up")).unwrap();

        let policy = Policy::default();
        let mut ex = Extractor::new(&root, &policy);
        let err = ex
            .entry(&ArchiveEntry::file("up/escaped.txt", 1), &mut &b"x"[..])
            .unwrap_err();
        assert!(matches!(err, CartonError::UnsafePath(_)), "{err}");
        let err = ex
            .entry(&ArchiveEntry::directory("up/sub"), &mut io::empty())
            .unwrap_err();
        assert!(matches!(err, CartonError::UnsafePath(_)), "{err}");
        assert!(!outer.path().join("escaped.txt").exists());
        assert!(!outer.path().join("sub").exists());
    }

    #[cfg(unix)]
    #[test]
    fn directory_modes_are_applied_last() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let policy = Policy::default();
        let mut ex = Extractor::new(dir.path(), &policy);
        ex.entry(&ArchiveEntry::directory("ro").with_mode(0o555), &mut io::empty())
            .unwrap();
        ex.entry(&ArchiveEntry::file("ro/f", 1).with_mtime(1_000_000), &mut &b"f"[..])
            .unwrap();
        let stats = ex.finish().unwrap();
        assert_eq!((stats.files, stats.dirs), (1, 1));
        let ro = dir.path().join("ro");
        assert_eq!(fs::metadata(&ro).unwrap().permissions().mode() & 0o777, 0o555);
        let mtime = fs::metadata(ro.join("f")).unwrap().modified().unwrap();
        assert_eq!(
            mtime.duration_since(std::time::UNIX_EPOCH).unwrap().as_secs(),
            1_000_000
        );
        fs::set_permissions(&ro, fs::Permissions::from_mode(0o755)).unwrap();
    }
}

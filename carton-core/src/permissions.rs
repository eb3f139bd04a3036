//! Unix permission bits as a set of named permissions, and applying them to
//! extracted files.

use crate::error::Result;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PosixPermission {
    OwnerRead,
    OwnerWrite,
    OwnerExecute,
    GroupRead,
    GroupWrite,
    GroupExecute,
    OthersRead,
    OthersWrite,
    OthersExecute,
}

impl PosixPermission {
    pub const ALL: [PosixPermission; 9] = [
        PosixPermission::OwnerRead,
        PosixPermission::OwnerWrite,
        PosixPermission::OwnerExecute,
        PosixPermission::GroupRead,
        PosixPermission::GroupWrite,
        PosixPermission::GroupExecute,
        PosixPermission::OthersRead,
        PosixPermission::OthersWrite,
        PosixPermission::OthersExecute,
    ];

    pub fn bit(self) -> u32 {
        match self {
            PosixPermission::OwnerRead => 0o400,
            PosixPermission::OwnerWrite => 0o200,
            PosixPermission::OwnerExecute => 0o100,
            PosixPermission::GroupRead => 0o040,
            PosixPermission::GroupWrite => 0o020,
            PosixPermission::GroupExecute => 0o010,
            PosixPermission::OthersRead => 0o004,
            PosixPermission::OthersWrite => 0o002,
            PosixPermission::OthersExecute => 0o001,
        }
    }
}

pub struct FileModeMapper;

impl FileModeMapper {
    pub fn map(mode: u32) -> BTreeSet<PosixPermission> {
        PosixPermission::ALL
            .into_iter()
            .filter(|p| mode & p.bit() != 0)
            .collect()
    }

    pub fn to_mode(perms: &BTreeSet<PosixPermission>) -> u32 {
        perms.iter().fold(0, |m, p| m | p.bit())
    }
}

/// Applies permission bits to `path`, dropping setuid and setgid. Off Unix
/// only the owner-write bit is honoured, as the read-only flag.
pub fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o1777))?;
    }
    #[cfg(not(unix))]
    {
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_readonly(mode & 0o200 == 0);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

pub(crate) fn mode_from(md: &std::fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        md.permissions().mode() & 0o7777
    }
    #[cfg(not(unix))]
    {
        if md.is_dir() {
            0o755
        } else if md.permissions().readonly() {
            0o444
        } else {
            0o644
        }
    }
}

/// Whether any read bit is set. Checks mode bits rather than the calling
/// user's access, so the answer does not depend on running as root.
pub(crate) fn is_readable(md: &std::fs::Metadata) -> bool {
    #[cfg(unix)]
    {
        mode_from(md) & 0o444 != 0
    }
    #[cfg(not(unix))]
    {
        let _ = md;
        true
    }
}

pub(crate) fn is_writable(md: &std::fs::Metadata) -> bool {
    !md.permissions().readonly()
}

#[cfg(test)]
mod tests {
    use super::PosixPermission::*;
    use super::*;

    fn set(p: &[PosixPermission]) -> BTreeSet<PosixPermission> {
        p.iter().copied().collect()
    }

    #[test]
    fn no_permissions() {
        assert!(FileModeMapper::map(0o000).is_empty());
    }

    #[test]
    fn all_permissions() {
        assert_eq!(FileModeMapper::map(0o777), set(&PosixPermission::ALL));
    }

    #[test]
    fn owner_permissions() {
        assert_eq!(FileModeMapper::map(0o400), set(&[OwnerRead]));
        assert_eq!(FileModeMapper::map(0o200), set(&[OwnerWrite]));
        assert_eq!(FileModeMapper::map(0o100), set(&[OwnerExecute]));
        assert_eq!(
            FileModeMapper::map(0o700),
            set(&[OwnerRead, OwnerWrite, OwnerExecute])
        );
        assert_eq!(FileModeMapper::map(0o500), set(&[OwnerRead, OwnerExecute]));
    }

    #[test]
    fn group_and_others_permissions() {
        assert_eq!(FileModeMapper::map(0o060), set(&[GroupRead, GroupWrite]));
        assert_eq!(FileModeMapper::map(0o030), set(&[GroupWrite, GroupExecute]));
        assert_eq!(FileModeMapper::map(0o005), set(&[OthersRead, OthersExecute]));
        assert_eq!(
            FileModeMapper::map(0o007),
            set(&[OthersRead, OthersWrite, OthersExecute])
        );
    }

    #[test]
    fn combinations() {
        assert_eq!(
            FileModeMapper::map(0o753),
            set(&[
                OwnerRead,
                OwnerWrite,
                OwnerExecute,
                GroupRead,
                GroupExecute,
                OthersWrite,
                OthersExecute
            ])
        );
        assert_eq!(
            FileModeMapper::map(0o544),
            set(&[OwnerRead, OwnerExecute, GroupRead, OthersRead])
        );
    }

    #[test]
    fn type_bits_are_ignored() {
        assert_eq!(FileModeMapper::map(0o100644), FileModeMapper::map(0o644));
    }

    #[test]
    fn to_mode_inverts_map() {
        for mode in [0o000, 0o644, 0o755, 0o574, 0o111] {
            assert_eq!(FileModeMapper::to_mode(&FileModeMapper::map(mode)), mode);
        }
    }

    #[cfg(unix)]
    #[test]
    fn apply_mode_sets_bits() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::NamedTempFile::new().unwrap();
        apply_mode(tmp.path(), 0o640).unwrap();
        let mode = std::fs::metadata(tmp.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn apply_mode_drops_setuid_and_setgid() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::NamedTempFile::new().unwrap();
        apply_mode(tmp.path(), 0o6755).unwrap();
        let mode = std::fs::metadata(tmp.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o755);
    }
}

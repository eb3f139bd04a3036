use crate::error::{CartonError, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Joins an archive entry name onto `root`, refusing anything that would
/// land outside it.
pub fn safe_join(root: &Path, rel: &str) -> Result<PathBuf> {
    if rel.is_empty() || rel.contains('\0') {
        return Err(CartonError::UnsafePath(format!("{rel:?}")));
    }
    let p = Path::new(rel);
    let mut out = root.to_path_buf();
    for comp in p.components() {
        match comp {
            Component::Normal(c) => out.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(CartonError::UnsafePath(rel.to_string()));
            }
        }
    }
    Ok(out)
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|md| md.file_type().is_symlink())
        .unwrap_or(false)
}

/// Refuses `path` when any existing component below `root` is a symlink
/// that resolves outside `root`. `root` must be canonical.
pub fn check_no_escape(root: &Path, path: &Path) -> Result<()> {
    let escape = || CartonError::UnsafePath(path.display().to_string());
    let rel = path.strip_prefix(root).map_err(|_| escape())?;
    let mut cur = root.to_path_buf();
    for comp in rel.components() {
        cur.push(comp);
        match fs::symlink_metadata(&cur) {
            Ok(md) if md.file_type().is_symlink() => {
                let real = fs::canonicalize(&cur).map_err(|_| escape())?;
                if !real.starts_with(root) {
                    return Err(escape());
                }
            }
            Ok(_) => {}
            // nothing below a missing component exists either
            Err(_) => break,
        }
    }
    Ok(())
}

/// Whether a symlink at `link` pointing at `target` resolves inside `root`,
/// following links already on disk. `root` must be canonical and the
/// parent of `link` must exist.
pub fn link_resolves_inside(root: &Path, link: &Path, target: &str) -> bool {
    let target = Path::new(target);
    if target.is_absolute() {
        return false;
    }
    let Some(mut cur) = link.parent().and_then(|p| fs::canonicalize(p).ok()) else {
        return false;
    };
    if !cur.starts_with(root) {
        return false;
    }
    for comp in target.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cur.pop() {
                    return false;
                }
            }
            Component::Normal(c) => {
                cur.push(c);
                if is_symlink(&cur) {
                    match fs::canonicalize(&cur) {
                        Ok(real) => cur = real,
                        Err(_) => return false,
                    }
                }
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
        if !cur.starts_with(root) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_plain_names() {
        let p = safe_join(Path::new("/out"), "a/b/c.txt").unwrap();
        assert_eq!(p, Path::new("/out/a/b/c.txt"));
    }

    #[test]
    fn rejects_traversal_and_absolute() {
        for bad in ["../x", "a/../../x", "/etc/passwd", "", "a\0b"] {
            assert!(
                matches!(safe_join(Path::new("/out"), bad), Err(CartonError::UnsafePath(_))),
                "{bad}"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn link_targets_resolve_through_existing_links() {
        use std::os::unix::fs::symlink;
        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        fs::create_dir_all(root.join("a/b")).unwrap();

        assert!(link_resolves_inside(&root, &root.join("a/link"), "file"));
        assert!(link_resolves_inside(&root, &root.join("a/b/link"), "../sibling"));
        assert!(link_resolves_inside(&root, &root.join("a/up"), ".."));
        assert!(!link_resolves_inside(&root, &root.join("link"), "../outside"));
        assert!(!link_resolves_inside(&root, &root.join("a/link"), "/etc/passwd"));
        assert!(!link_resolves_inside(&root, &root.join("a/link"), "../../x"));

        // a/up -> .. is harmless alone but lets a/up/.. climb out
        symlink("..", root.join("a/up")).unwrap();
        assert!(!link_resolves_inside(&root, &root.join("chain"), "a/up/.."));
        assert!(link_resolves_inside(&root, &root.join("chain"), "a/up/a"));
    }

    #[cfg(unix)]
    #[test]
    fn parents_may_not_leave_root() {
        use std::os::unix::fs::symlink;
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        fs::create_dir(root.join("real")).unwrap();
        symlink(outside.path(), root.join("out")).unwrap();
        symlink("real", root.join("alias")).unwrap();

        assert!(check_no_escape(&root, &root.join("real/x/y")).is_ok());
        assert!(check_no_escape(&root, &root.join("alias/x")).is_ok());
        assert!(matches!(
            check_no_escape(&root, &root.join("out/x")),
            Err(CartonError::UnsafePath(_))
        ));
        assert!(check_no_escape(&root, Path::new("/elsewhere")).is_err());
    }
}

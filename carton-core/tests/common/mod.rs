#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const LONG_NAME: &str =
    "file_with_a_very_long_name_that_goes_past_one_hundred_characters_to_exercise_gnu_and_pax_long_name_headers.txt";

/// Names of the fixture entries in archive order.
pub fn fixture_names() -> Vec<String> {
    [
        "file.txt",
        LONG_NAME,
        "folder",
        "folder/folder_file.txt",
        "folder/subfolder",
        "folder/subfolder/subfolder_file.txt",
        "permissions",
        "permissions/executable_file.txt",
        "permissions/private_executable_file.txt",
        "permissions/private_folder",
        "permissions/private_folder/private_file.txt",
        "permissions/readonly_file.txt",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(unix)]
fn chmod(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}

#[cfg(not(unix))]
fn chmod(_path: &Path, _mode: u32) {}

/// Builds the fixture tree under `root/archive` and returns its top-level
/// sources in file-name order.
pub fn fixture(root: &Path) -> Vec<PathBuf> {
    let base = root.join("archive");
    fs::create_dir_all(base.join("folder/subfolder")).unwrap();
    fs::create_dir_all(base.join("permissions/private_folder")).unwrap();

    fs::write(base.join("file.txt"), b"file.txt content\n").unwrap();
    fs::write(base.join(LONG_NAME), b"long name content\n").unwrap();
    fs::write(base.join("folder/folder_file.txt"), b"folder file\n").unwrap();
    fs::write(
        base.join("folder/subfolder/subfolder_file.txt"),
        b"subfolder file\n".repeat(300),
    )
    .unwrap();
    fs::write(base.join("permissions/executable_file.txt"), b"#!/bin/sh\necho hi\n").unwrap();
    fs::write(base.join("permissions/private_executable_file.txt"), b"private exec\n").unwrap();
    fs::write(base.join("permissions/readonly_file.txt"), b"read only\n").unwrap();
    fs::write(base.join("permissions/private_folder/private_file.txt"), b"secret\n").unwrap();

    chmod(&base.join("permissions/executable_file.txt"), 0o755);
    chmod(&base.join("permissions/private_executable_file.txt"), 0o700);
    chmod(&base.join("permissions/readonly_file.txt"), 0o444);
    chmod(&base.join("permissions/private_folder/private_file.txt"), 0o600);
    chmod(&base.join("permissions/private_folder"), 0o700);

    let mut sources: Vec<PathBuf> = fs::read_dir(&base)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    sources.sort();
    sources
}

/// Relative paths of everything under `root`, sorted.
pub fn tree(root: &Path) -> Vec<String> {
    let mut out: Vec<String> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| {
            let e = e.unwrap();
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    out.sort();
    out
}

/// Asserts that every file under `expected` exists with the same content
/// under `actual`, and that directories stay directories.
pub fn assert_same_tree(expected: &Path, actual: &Path, files_only: bool) {
    for rel in tree(expected) {
        let e = expected.join(&rel);
        let a = actual.join(&rel);
        if e.is_dir() {
            if !files_only {
                assert!(a.is_dir(), "{rel} should be a directory");
            }
            continue;
        }
        assert!(a.is_file(), "{rel} missing");
        assert_eq!(fs::read(&e).unwrap(), fs::read(&a).unwrap(), "{rel} differs");
    }
}

#[cfg(unix)]
pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

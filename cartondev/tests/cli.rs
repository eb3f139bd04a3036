use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn cartondev(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cartondev"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn cartondev")
}

fn s(p: &Path) -> &str {
    p.to_str().unwrap()
}

fn fixture(root: &Path) -> std::path::PathBuf {
    let src = root.join("src");
    fs::create_dir_all(src.join("sub")).unwrap();
    fs::write(src.join("a.txt"), b"alpha\n").unwrap();
    fs::write(src.join("sub/b.txt"), b"bravo\n").unwrap();
    src
}

#[test]
fn create_list_extract_tar_gz() {
    let tmp = tempfile::tempdir().unwrap();
    let src = fixture(tmp.path());
    let out = tmp.path().join("bundle.tar.gz");

    let o = cartondev(&["create", s(&out), s(&src)]);
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stderr));
    assert!(out.is_file());

    let o = cartondev(&["list", s(&out)]);
    assert!(o.status.success());
    let listing = String::from_utf8(o.stdout).unwrap();
    let names: Vec<_> = listing.lines().collect();
    assert_eq!(names, ["src", "src/a.txt", "src/sub", "src/sub/b.txt"]);

    let dest = tmp.path().join("dest");
    let o = cartondev(&["extract", s(&out), s(&dest)]);
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stderr));
    assert_eq!(fs::read(dest.join("src/sub/b.txt")).unwrap(), b"bravo\n");

    let restored: Vec<_> = walkdir::WalkDir::new(&dest)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|e| e.unwrap().path().strip_prefix(&dest).unwrap().to_path_buf())
        .collect();
    assert_eq!(restored.len(), 4);
}

#[test]
fn format_flag_appends_extension() {
    let tmp = tempfile::tempdir().unwrap();
    let src = fixture(tmp.path());
    let out = tmp.path().join("bundle");

    let o = cartondev(&["create", "--format", "zip", s(&out), s(&src)]);
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stderr));
    assert!(tmp.path().join("bundle.zip").is_file());
}

#[test]
fn unknown_output_type_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let src = fixture(tmp.path());
    let o = cartondev(&["create", s(&tmp.path().join("bundle.what")), s(&src)]);
    assert!(!o.status.success());
}

#[test]
fn list_json_and_cat() {
    let tmp = tempfile::tempdir().unwrap();
    let src = fixture(tmp.path());
    let out = tmp.path().join("bundle.cpio");
    assert!(cartondev(&["create", s(&out), s(&src)]).status.success());

    let o = cartondev(&["list", "--json", s(&out)]);
    assert!(o.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&o.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[1]["path"], "src/a.txt");
    assert_eq!(rows[1]["kind"], "file");
    assert_eq!(rows[1]["size"], 6);

    let o = cartondev(&["cat", s(&out), "src/a.txt"]);
    assert!(o.status.success());
    assert_eq!(o.stdout, b"alpha\n");

    let o = cartondev(&["cat", s(&out), "src/missing.txt"]);
    assert!(!o.status.success());
}

#[test]
fn compress_then_decompress() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("notes.txt");
    fs::write(&file, b"some notes\n".repeat(50)).unwrap();
    let packed = tmp.path().join("packed");
    fs::create_dir(&packed).unwrap();

    let o = cartondev(&["compress", "-c", "xz", s(&file), s(&packed)]);
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stderr));
    let xz = packed.join("notes.txt.xz");
    assert!(xz.is_file());

    let o = cartondev(&["decompress", s(&xz), s(&packed)]);
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stderr));
    assert_eq!(
        fs::read(packed.join("notes.txt")).unwrap(),
        b"some notes\n".repeat(50)
    );
}

#[test]
fn config_limits_apply_to_extract() {
    let tmp = tempfile::tempdir().unwrap();
    let src = fixture(tmp.path());
    let out = tmp.path().join("bundle.tar");
    assert!(cartondev(&["create", s(&out), s(&src)]).status.success());

    let cfg = tmp.path().join("limits.json");
    fs::write(&cfg, r#"{ "policy": { "max_entries": 2 } }"#).unwrap();
    let o = cartondev(&["--config", s(&cfg), "extract", s(&out), s(&tmp.path().join("d"))]);
    assert!(!o.status.success());
    assert!(String::from_utf8_lossy(&o.stderr).contains("QuotaExceeded"));
}

#[test]
fn codecs_lists_registry() {
    let o = cartondev(&["codecs"]);
    assert!(o.status.success());
    let text = String::from_utf8(o.stdout).unwrap();
    assert!(text.contains("deflate"));
    assert!(text.contains("zip-method=8"));
    assert!(text.contains("zstd"));
}

#[test]
fn list_reads_config() {
    let tmp = tempfile::tempdir().unwrap();
    let src = fixture(tmp.path());
    let out = tmp.path().join("bundle.zip");
    assert!(cartondev(&["create", s(&out), s(&src)]).status.success());

    let cfg = tmp.path().join("opts.json");
    fs::write(&cfg, r#"{ "policy": { "max_entries": 100 } }"#).unwrap();
    let o = cartondev(&["--config", s(&cfg), "list", "--long", s(&out)]);
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stderr));
    assert_eq!(String::from_utf8(o.stdout).unwrap().lines().count(), 4);

    fs::write(&cfg, "{ not json").unwrap();
    let o = cartondev(&["--config", s(&cfg), "list", s(&out)]);
    assert!(!o.status.success());
}

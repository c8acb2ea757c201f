use camino::{Utf8Path, Utf8PathBuf};
use mnbuild_artifacts::{collect_artifacts, write_report};
use mnbuild_types::report::{RunReport, ToolInfo};
use pretty_assertions::assert_eq;

fn touch(dir: &Utf8Path, name: &str, content: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), content).unwrap();
}

fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn files_are_placed_by_extension() {
    let (_temp, root) = scratch();
    let source = root.join("lib/x64/Release");
    touch(&source, "gmp.h", "h");
    touch(&source, "mpir.lib", "lib");
    touch(&source, "mpir.pdb", "pdb");
    touch(&source.join("nested"), "deep.h", "deep");

    let dest = root.join("build/mpir");
    let report = collect_artifacts(&source, &dest).unwrap();

    assert_eq!(
        report.copied,
        vec![dest.join("include/gmp.h"), dest.join("lib/mpir.lib")]
    );
    assert_eq!(report.skipped, vec![source.join("mpir.pdb")]);
    assert_eq!(std::fs::read_to_string(dest.join("lib/mpir.lib")).unwrap(), "lib");
    // Non-recursive.
    assert!(!dest.join("include/deep.h").exists());
    // No executables, so no bin folder.
    assert!(!dest.join("bin").exists());
}

#[test]
fn nothing_collectable_creates_no_folders() {
    let (_temp, root) = scratch();
    let source = root.join("out");
    touch(&source, "build.log", "x");

    let dest = root.join("build/mpfr");
    let report = collect_artifacts(&source, &dest).unwrap();
    assert!(report.copied.is_empty());
    assert!(!dest.exists());
}

#[test]
fn second_collection_overwrites() {
    let (_temp, root) = scratch();
    let source = root.join("Release");
    touch(&source, "MerkurNewton.exe", "v1");
    let dest = root.join("build/MerkurNewton");
    collect_artifacts(&source, &dest).unwrap();

    touch(&source, "MerkurNewton.exe", "v2");
    collect_artifacts(&source, &dest).unwrap();
    assert_eq!(
        std::fs::read_to_string(dest.join("bin/MerkurNewton.exe")).unwrap(),
        "v2"
    );
}

#[test]
fn missing_source_is_an_error() {
    let (_temp, root) = scratch();
    let err = collect_artifacts(&root.join("absent"), &root.join("build")).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn report_is_pretty_json() {
    let (_temp, root) = scratch();
    let path = root.join("report.json");
    let report = RunReport::new(ToolInfo {
        name: "mnbuild".to_string(),
        version: None,
    });
    write_report(&path, &report).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["schema"], "mnbuild.report.v1");
    assert!(text.contains("\n  \"tool\""));
}

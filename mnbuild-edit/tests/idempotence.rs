//! Patching twice gives the same result as patching once.
//!
//! Edits are built from delimited tokens (`<s0>`, `<r0>`, ...) so no edit
//! can create or destroy another edit's search text; the guard against
//! re-applying is what is under test here.

use camino::Utf8Path;
use mnbuild_edit::{apply_patches, patch_text, render_diff};
use mnbuild_types::package::{MpirFork, PackageVariant, Registry};
use mnbuild_types::patch::{Edit, PatchSet};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn arb_edits() -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(any::<bool>(), 1..4).prop_map(|keep_search| {
        keep_search
            .into_iter()
            .enumerate()
            .map(|(i, keep)| {
                let search = format!("<s{i}>");
                // Some replacements still contain their search text.
                let replace = if keep {
                    format!("{search}<r{i}>")
                } else {
                    format!("<r{i}>")
                };
                Edit::new(search, replace)
            })
            .collect()
    })
}

fn arb_text() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        "[a-z ]{0,6}",
        (0usize..4).prop_map(|i| format!("<s{i}>")),
        (0usize..4).prop_map(|i| format!("<r{i}>")),
        Just("\n".to_string()),
        Just("\r\n".to_string()),
    ];
    prop::collection::vec(piece, 0..24).prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn second_pass_changes_nothing(edits in arb_edits(), text in arb_text()) {
        let once = patch_text(&text, &edits);
        let twice = patch_text(&once.text, &edits);
        prop_assert_eq!(&twice.text, &once.text);
    }

    #[test]
    fn line_structure_is_preserved(edits in arb_edits(), text in arb_text()) {
        let out = patch_text(&text, &edits);
        prop_assert_eq!(out.text.matches('\n').count(), text.matches('\n').count());
        prop_assert_eq!(out.text.matches("\r\n").count(), text.matches("\r\n").count());
    }

    #[test]
    fn applicable_count_never_drops_on_repeat(edits in arb_edits(), text in arb_text()) {
        // Guarded edits still count as applicable on the second pass.
        let once = patch_text(&text, &edits);
        let twice = patch_text(&once.text, &edits);
        let keeps_search = edits.iter().all(|e| e.replace.contains(&e.search));
        if keeps_search {
            prop_assert_eq!(twice.applicable, once.applicable);
        }
    }
}

const VCXPROJ: &str = r#"<Project>
  <PreBuildEvent><Command>cd ..\..\build.vc
prebuild haswell\avx x64 15
</Command></PreBuildEvent>
  <PostBuildEvent><Command>postbuild "$(TargetPath)" 15</Command></PostBuildEvent>
  <Command>check_config $(Platform) $(Configuration) 15</Command>
  <AdditionalDependencies>$(OutDir)lib_speed.lib;%(AdditionalDependencies)</AdditionalDependencies>
</Project>
"#;

fn write(root: &Utf8Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn kevin_hake_project_files_are_patched_once() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(temp.path()).unwrap();
    write(root, "lib_mpir_cxx/lib_mpir_cxx.vcxproj", VCXPROJ);
    write(root, "lib_mpir_cxx/lib_mpir_cxx.vcxproj.filters", VCXPROJ);
    write(root, "readme.txt", "prebuild haswell\\avx x64 15\n");

    let registry = Registry::builtin();
    let desc = registry
        .get(PackageVariant::Mpir(MpirFork::KevinHake))
        .unwrap();

    let first = apply_patches(root, &desc.patches).unwrap();
    assert_eq!(first.applied, 4);
    assert_eq!(first.files.len(), 1);

    let patched = std::fs::read_to_string(root.join("lib_mpir_cxx/lib_mpir_cxx.vcxproj")).unwrap();
    assert!(patched.contains(r"prebuild haswell\avx x64 16"));
    assert!(patched.contains(r#"postbuild "$(TargetPath)" 16"#));
    assert!(patched.contains("check_config $(Platform) $(Configuration) 16</Command>"));
    assert!(patched.contains(r"$(SolutionDir)..\lib_speed\$(IntDir)lib_speed.lib"));

    // Non-matching names are left alone.
    let filters =
        std::fs::read_to_string(root.join("lib_mpir_cxx/lib_mpir_cxx.vcxproj.filters")).unwrap();
    assert_eq!(filters, VCXPROJ);
    let readme = std::fs::read_to_string(root.join("readme.txt")).unwrap();
    assert!(readme.contains("x64 15"));

    let second = apply_patches(root, &desc.patches).unwrap();
    let again = std::fs::read_to_string(root.join("lib_mpir_cxx/lib_mpir_cxx.vcxproj")).unwrap();
    assert_eq!(again, patched);
    assert_eq!(second.changed_files().count(), 0);
}

#[test]
fn diff_lists_only_changed_files() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(temp.path()).unwrap();
    write(root, "MerkurNewton.vcxproj", "<IncludePath>BUILDWIN\\mpir\\include</IncludePath>\n");
    write(root, "Other.vcxproj", "<Nothing/>\n");

    let patches = PatchSet::new().rule(r".*\.vcxproj", vec![Edit::new("BUILDWIN", r"..\build")]);
    let report = apply_patches(root, &patches).unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.files.len(), 2);

    let diff = render_diff(root, &report);
    assert!(diff.contains("--- a/MerkurNewton.vcxproj"));
    assert!(diff.contains(r"+<IncludePath>..\build\mpir\include</IncludePath>"));
    assert!(!diff.contains("Other.vcxproj"));
}

#[test]
fn git_internals_are_not_walked() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(temp.path()).unwrap();
    write(root, ".git/x.vcxproj", "BUILDWIN\n");

    let patches = PatchSet::new().rule(r".*\.vcxproj", vec![Edit::new("BUILDWIN", "x")]);
    let report = apply_patches(root, &patches).unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(std::fs::read_to_string(root.join(".git/x.vcxproj")).unwrap(), "BUILDWIN\n");
}

#[test]
fn missing_root_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(temp.path()).unwrap().join("absent");
    let patches = PatchSet::new().rule("a", vec![Edit::new("a", "b")]);
    assert!(matches!(
        apply_patches(&root, &patches),
        Err(mnbuild_edit::EditError::MissingRoot(_))
    ));
}

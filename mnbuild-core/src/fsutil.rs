//! Filesystem helpers shared by the pipeline stages.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use std::io::ErrorKind;
use tracing::{debug, trace};

/// Remove a file or a directory tree.
///
/// Git checkouts on Windows carry read-only pack files, so a permission
/// error clears the read-only bit on everything below `path` and retries once.
pub fn remove_path_forced(path: &Utf8Path) -> anyhow::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if path.is_file() {
        return fs::remove_file(path).map_err(Into::into);
    }

    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            debug!("permission denied removing {}, clearing read-only bits", path);
            clear_readonly(path)?;
            fs::remove_dir_all(path).with_context(|| format!("remove {}", path))
        }
        Err(e) => Err(e.into()),
    }
}

#[allow(clippy::permissions_set_readonly_false)]
fn clear_readonly(root: &Utf8Path) -> anyhow::Result<()> {
    let mut paths = walk(root)?;
    paths.push(root.to_path_buf());
    for path in paths {
        let meta = fs::metadata(&path)?;
        let mut perms = meta.permissions();
        if perms.readonly() {
            trace!("clear read-only {}", path);
            perms.set_readonly(false);
            fs::set_permissions(&path, perms)?;
        }
    }
    Ok(())
}

/// Every path below `root` (files and directories), sorted. Unreadable
/// entries are skipped.
pub fn walk(root: &Utf8Path) -> anyhow::Result<Vec<Utf8PathBuf>> {
    glob_below(root, "**/*")
}

/// Paths below `root` matching the glob `pattern`, sorted.
fn glob_below(root: &Utf8Path, pattern: &str) -> anyhow::Result<Vec<Utf8PathBuf>> {
    let pattern = format!("{}/{}", glob::Pattern::escape(root.as_str()), pattern);
    let mut out = Vec::new();
    for entry in glob::glob(&pattern).with_context(|| format!("walk {}", root))? {
        match entry {
            Ok(path) => match Utf8PathBuf::from_path_buf(path) {
                Ok(path) => out.push(path),
                Err(path) => trace!("skip non UTF-8 path {}", path.display()),
            },
            Err(e) => trace!("skip unreadable {}", e.path().display()),
        }
    }
    out.sort();
    Ok(out)
}

/// Files named `name` (ASCII case-insensitive) anywhere below `root`.
pub fn find_files(root: &Utf8Path, name: &str) -> anyhow::Result<Vec<Utf8PathBuf>> {
    trace!("searching {} below {}", name, root);
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let found: Vec<Utf8PathBuf> = walk(root)?
        .into_iter()
        .filter(|p| p.file_name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
        .filter(|p| p.is_file())
        .collect();
    for path in &found {
        trace!("found {}", path);
    }
    Ok(found)
}

/// Names and paths of the directories directly inside `dir`, sorted by name.
pub fn subdirs(dir: &Utf8Path) -> anyhow::Result<Vec<(String, Utf8PathBuf)>> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir);
    }
    Ok(glob_below(dir, "*")?
        .into_iter()
        .filter(|p| p.is_dir())
        .filter_map(|p| Some((p.file_name()?.to_string(), p.clone())))
        .collect())
}

/// Recursive copy of `src` to `dest`; `dest` must not exist yet.
pub fn copy_dir_all(src: &Utf8Path, dest: &Utf8Path) -> anyhow::Result<u64> {
    if dest.exists() {
        anyhow::bail!("copy target {} already exists", dest);
    }
    if !src.is_dir() {
        anyhow::bail!("copy source {} is not a directory", src);
    }
    fs::create_dir_all(dest)?;
    let mut copied = 0;
    // Sorted, so every directory comes before its contents.
    for path in walk(src)? {
        let rel = path
            .strip_prefix(src)
            .with_context(|| format!("{} is outside {}", path, src))?;
        let target = dest.join(rel);
        if path.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(&path, &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

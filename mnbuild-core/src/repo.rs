//! Repository synchronization.

use crate::error::{BuildError, BuildResult};
use crate::ports::GitPort;
use camino::Utf8Path;
use fs_err as fs;
use mnbuild_types::package::RepoSource;
use mnbuild_types::report::SyncAction;
use tracing::{debug, info, trace};

/// Make `dir` a working copy of `repo` at its branch, up to date with the remote.
///
/// A directory without `.git`, with an unreadable origin, or with an origin
/// other than `repo.url` is deleted and cloned again. Remote URLs are never
/// rewritten in place.
pub fn sync_repository(git: &dyn GitPort, repo: &RepoSource, dir: &Utf8Path) -> BuildResult<SyncAction> {
    info!("cloning/updating {} from {} branch {}", dir, repo.url, repo.branch);
    let sync_err = |message: String| BuildError::RepoSync {
        url: repo.url.clone(),
        message,
    };

    let mut deleted = false;
    if dir.exists()
        && let Some(reason) = stale_reason(git, repo, dir)
    {
        debug!("cleaning {} ({})", dir, reason);
        git.remove_working_copy(dir)
            .map_err(|e| sync_err(format!("could not delete old {dir}: {e:#}")))?;
        if dir.exists() {
            return Err(sync_err(format!("could not delete old {dir}")));
        }
        deleted = true;
    }

    if !dir.exists() {
        debug!("cloning {} to {}", repo.url, dir);
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent).map_err(|e| sync_err(e.to_string()))?;
        }
        git.clone_repo(&repo.url, &repo.branch, dir)
            .map_err(|e| sync_err(format!("{e:#}")))?;
        return Ok(if deleted { SyncAction::Recloned } else { SyncAction::Cloned });
    }

    debug!("updating {}", dir);
    git.checkout(dir, &repo.branch)
        .map_err(|e| sync_err(format!("{e:#}")))?;
    git.pull(dir).map_err(|e| sync_err(format!("{e:#}")))?;
    Ok(SyncAction::Updated)
}

fn stale_reason(git: &dyn GitPort, repo: &RepoSource, dir: &Utf8Path) -> Option<&'static str> {
    if !dir.join(".git").exists() {
        return Some("not a git working copy");
    }
    match git.origin_url(dir) {
        Ok(Some(url)) if url == repo.url => {
            trace!("origin of {} unchanged", dir);
            None
        }
        Ok(Some(_)) => Some("different remote"),
        Ok(None) | Err(_) => Some("unreadable origin"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Clones by creating `.git/origin`; records every call.
    #[derive(Default)]
    struct FakeGit {
        calls: Mutex<Vec<String>>,
        /// Refuse to delete working copies.
        locked: bool,
    }

    impl FakeGit {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl GitPort for FakeGit {
        fn origin_url(&self, repo_dir: &Utf8Path) -> anyhow::Result<Option<String>> {
            let path = repo_dir.join(".git/origin");
            Ok(std::fs::read_to_string(path).ok())
        }

        fn clone_repo(&self, url: &str, _branch: &str, dest: &Utf8Path) -> anyhow::Result<()> {
            self.calls.lock().expect("lock").push(format!("clone {url}"));
            std::fs::create_dir_all(dest.join(".git"))?;
            std::fs::write(dest.join(".git/origin"), url)?;
            Ok(())
        }

        fn checkout(&self, _repo_dir: &Utf8Path, branch: &str) -> anyhow::Result<()> {
            self.calls.lock().expect("lock").push(format!("checkout {branch}"));
            Ok(())
        }

        fn pull(&self, _repo_dir: &Utf8Path) -> anyhow::Result<()> {
            self.calls.lock().expect("lock").push("pull".to_string());
            Ok(())
        }

        fn remove_working_copy(&self, repo_dir: &Utf8Path) -> anyhow::Result<()> {
            if self.locked {
                anyhow::bail!("access denied: {repo_dir}");
            }
            crate::fsutil::remove_path_forced(repo_dir)
        }
    }

    fn source(url: &str) -> RepoSource {
        RepoSource {
            url: url.to_string(),
            branch: "master".to_string(),
        }
    }

    fn scratch() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        (temp, root)
    }

    #[test]
    fn second_sync_updates_instead_of_cloning() {
        let (_temp, root) = scratch();
        let git = FakeGit::default();
        let dir = root.join("mpfr");
        let repo = source("https://example.invalid/mpfr.git");

        assert_eq!(sync_repository(&git, &repo, &dir).unwrap(), SyncAction::Cloned);
        assert_eq!(sync_repository(&git, &repo, &dir).unwrap(), SyncAction::Updated);
        assert_eq!(
            git.calls(),
            vec!["clone https://example.invalid/mpfr.git", "checkout master", "pull"]
        );
    }

    #[test]
    fn changed_url_deletes_and_reclones() {
        let (_temp, root) = scratch();
        let git = FakeGit::default();
        let dir = root.join("mpir");
        sync_repository(&git, &source("https://example.invalid/a/mpir.git"), &dir).unwrap();
        std::fs::write(dir.join("stale.txt"), "old").unwrap();

        let action = sync_repository(&git, &source("https://example.invalid/b/mpir.git"), &dir).unwrap();
        assert_eq!(action, SyncAction::Recloned);
        assert!(!dir.join("stale.txt").exists());
        assert_eq!(git.calls().last().unwrap(), "clone https://example.invalid/b/mpir.git");
    }

    #[test]
    fn plain_directory_is_replaced() {
        let (_temp, root) = scratch();
        let git = FakeGit::default();
        let dir = root.join("MerkurNewton");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("leftover"), "x").unwrap();

        let action = sync_repository(&git, &source("https://example.invalid/mn.git"), &dir).unwrap();
        assert_eq!(action, SyncAction::Recloned);
        assert!(!dir.join("leftover").exists());
    }

    #[test]
    fn unreadable_origin_is_replaced() {
        let (_temp, root) = scratch();
        let git = FakeGit::default();
        let dir = root.join("mpfr");
        std::fs::create_dir_all(dir.join(".git")).unwrap();

        let action = sync_repository(&git, &source("https://example.invalid/mpfr.git"), &dir).unwrap();
        assert_eq!(action, SyncAction::Recloned);
    }

    #[test]
    fn undeletable_stale_copy_is_fatal() {
        let (_temp, root) = scratch();
        let git = FakeGit {
            locked: true,
            ..FakeGit::default()
        };
        let dir = root.join("mpir");
        std::fs::create_dir_all(&dir).unwrap();

        let err = sync_repository(&git, &source("https://example.invalid/mpir.git"), &dir).unwrap_err();
        assert!(matches!(err, BuildError::RepoSync { .. }));
        assert!(err.to_string().contains("could not delete old"));
        assert_eq!(err.exit_code(), 1);
        assert!(git.calls().is_empty());
    }
}

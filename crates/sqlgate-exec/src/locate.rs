//! Tunnel executable lookup: working directory first, then `PATH`.
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ExecError;

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && (m.permissions().mode() & 0o111 != 0))
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Resolve `name` against the current directory and the `PATH` variable.
pub fn locate(name: &str) -> Result<PathBuf, ExecError> {
    let cwd = std::env::current_dir().ok();
    let dirs = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect::<Vec<_>>())
        .unwrap_or_default();
    locate_in(name, cwd.as_deref(), &dirs)
}

/// Deterministic core of [`locate`]: `cwd` wins over any of `dirs`.
///
/// Relative `dirs` entries are resolved against `cwd` (and skipped without one), so a hit is
/// always an absolute path.
pub fn locate_in(name: &str, cwd: Option<&Path>, dirs: &[PathBuf]) -> Result<PathBuf, ExecError> {
    let not_found = || ExecError::ExecutableNotFound {
        name: name.to_string(),
    };
    if name.trim().is_empty() {
        return Err(not_found());
    }

    if let Some(cwd) = cwd {
        let candidate = cwd.join(name);
        if is_executable(&candidate) {
            debug!(path = %candidate.display(), "proxy found in working directory");
            return Ok(candidate);
        }
    }

    for dir in dirs {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let dir = match (dir.is_absolute(), cwd) {
            (true, _) => dir.clone(),
            (false, Some(cwd)) => cwd.join(dir),
            (false, None) => continue,
        };
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            debug!(path = %candidate.display(), "proxy found on PATH");
            return Ok(candidate);
        }
    }
    Err(not_found())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn stub(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\necho ok\n").expect("write stub");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path).expect("meta").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).expect("chmod");
        }
        path
    }

    #[test]
    fn working_directory_wins_over_path() {
        let cwd = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let local = stub(cwd.path(), "cloud_sql_proxy");
        stub(bin.path(), "cloud_sql_proxy");

        let found = locate_in("cloud_sql_proxy", Some(cwd.path()), &[bin.path().to_path_buf()]).unwrap();
        assert_eq!(found, local);
    }

    #[test]
    fn falls_back_to_path_in_order() {
        let cwd = tempfile::tempdir().unwrap();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        stub(second.path(), "cloud_sql_proxy");
        let expected = stub(first.path(), "cloud_sql_proxy");

        let dirs = vec![PathBuf::new(), first.path().to_path_buf(), second.path().to_path_buf()];
        let found = locate_in("cloud_sql_proxy", Some(cwd.path()), &dirs).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn relative_path_entries_resolve_against_cwd() {
        let cwd = tempfile::tempdir().unwrap();
        fs::create_dir(cwd.path().join("bin")).unwrap();
        let expected = stub(&cwd.path().join("bin"), "cloud_sql_proxy");

        let found = locate_in("cloud_sql_proxy", Some(cwd.path()), &[PathBuf::from("bin")]).unwrap();
        assert!(found.is_absolute(), "{}", found.display());
        assert_eq!(found, expected);

        assert!(locate_in("cloud_sql_proxy", None, &[PathBuf::from("bin")]).is_err());
    }

    #[test]
    fn missing_everywhere_is_not_found() {
        let cwd = tempfile::tempdir().unwrap();
        let err = locate_in("cloud_sql_proxy", Some(cwd.path()), &[]).unwrap_err();
        assert!(matches!(err, ExecError::ExecutableNotFound { ref name } if name == "cloud_sql_proxy"));
    }

    #[test]
    fn directories_are_not_executables() {
        let cwd = tempfile::tempdir().unwrap();
        fs::create_dir(cwd.path().join("cloud_sql_proxy")).unwrap();
        assert!(locate_in("cloud_sql_proxy", Some(cwd.path()), &[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_skipped() {
        let cwd = tempfile::tempdir().unwrap();
        fs::write(cwd.path().join("cloud_sql_proxy"), "data").unwrap();
        let bin = tempfile::tempdir().unwrap();
        let expected = stub(bin.path(), "cloud_sql_proxy");

        let found = locate_in("cloud_sql_proxy", Some(cwd.path()), &[bin.path().to_path_buf()]).unwrap();
        assert_eq!(found, expected);
    }
}

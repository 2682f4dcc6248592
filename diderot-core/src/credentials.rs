//! Credential file discovery and loading.
//!
//! # Search order
//!
//! ```text
//! --credentials <path>                 (must exist when given)
//! ~/private/.diderot/credentials
//! ~/.diderot/credentials
//! ```
//!
//! A credentials file holds the username on the first line and the password
//! on the second. On Unix it must not be readable by group or others.
//!
//! # API pattern
//!
//! Every lookup has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{config_io, ConfigError};

/// Default credential locations, relative to the home directory.
pub const DEFAULT_LOCATIONS: [&str; 2] = ["private/.diderot/credentials", ".diderot/credentials"];

/// A username/password pair used to log in.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// Candidate files in lookup order. An explicit path comes first.
pub fn candidates_at(home: &Path, explicit: Option<&Path>) -> Vec<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .into_iter()
        .chain(DEFAULT_LOCATIONS.iter().map(|rel| home.join(rel)))
        .collect()
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Read a single credentials file.
pub fn load_file(path: &Path) -> Result<Credentials, ConfigError> {
    check_permissions(path)?;
    let contents = std::fs::read_to_string(path).map_err(|e| config_io(path, e))?;
    let mut lines = contents.trim().lines().map(str::trim);
    match (lines.next(), lines.next()) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            Ok(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            })
        }
        _ => Err(ConfigError::Malformed {
            path: path.to_path_buf(),
        }),
    }
}

/// Find and load the first available credentials file.
///
/// Returns `Ok(None)` when no default location exists; the caller then
/// prompts. An explicit path that is not a file is an error.
pub fn discover_at(home: &Path, explicit: Option<&Path>) -> Result<Option<Credentials>, ConfigError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(ConfigError::InvalidPath {
                path: path.to_path_buf(),
            });
        }
    }
    for path in candidates_at(home, explicit) {
        if path.is_file() {
            return load_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// `discover_at` convenience wrapper.
pub fn discover(explicit: Option<&Path>) -> Result<Option<Credentials>, ConfigError> {
    discover_at(&home()?, explicit)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)
        .map_err(|e| config_io(path, e))?
        .permissions()
        .mode();
    if mode & 0o177 != 0 {
        return Err(ConfigError::InsecurePermissions {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_private(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, contents).expect("write credentials");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).expect("chmod");
        }
    }

    #[test]
    fn candidates_put_explicit_path_first() {
        let home = TempDir::new().expect("home");
        let explicit = home.path().join("creds");
        let list = candidates_at(home.path(), Some(&explicit));
        assert_eq!(list.len(), 3);
        assert_eq!(list[0], explicit);
        assert!(list[1].ends_with("private/.diderot/credentials"));
        assert!(list[2].ends_with(".diderot/credentials"));
    }

    #[test]
    fn no_files_means_none() {
        let home = TempDir::new().expect("home");
        assert!(discover_at(home.path(), None).expect("discover").is_none());
    }

    #[test]
    fn private_location_wins_over_dotdir() {
        let home = TempDir::new().expect("home");
        write_private(&home.path().join(".diderot/credentials"), "second\npw2\n");
        write_private(&home.path().join("private/.diderot/credentials"), "first\npw1\n");
        let creds = discover_at(home.path(), None).expect("discover").expect("credentials");
        assert_eq!(creds.username, "first");
        assert_eq!(creds.password, "pw1");
    }

    #[test]
    fn debug_output_redacts_password() {
        let creds = Credentials {
            username: "ta".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("ta"));
        assert!(!rendered.contains("hunter2"));
    }
}

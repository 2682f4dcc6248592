//! Credential discovery, permission and error-message tests.

use assert_fs::prelude::*;
use diderot_core::{credentials, ConfigError};
use predicates::prelude::predicate;

#[cfg(unix)]
fn chmod(path: &std::path::Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).expect("chmod");
}

#[test]
fn explicit_file_is_used() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child("creds.txt");
    file.write_str("instructor\nsecret\n").expect("write");
    #[cfg(unix)]
    chmod(file.path(), 0o600);

    let creds = credentials::discover_at(home.path(), Some(file.path()))
        .expect("discover")
        .expect("credentials");
    assert_eq!(creds.username, "instructor");
    assert_eq!(creds.password, "secret");
}

#[test]
fn explicit_missing_file_is_invalid_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let missing = home.child("nope");
    missing.assert(predicate::path::missing());

    let err = credentials::discover_at(home.path(), Some(missing.path())).expect_err("missing file");
    assert!(matches!(err, ConfigError::InvalidPath { .. }), "got: {err}");
    assert!(err.to_string().contains("is invalid"));
}

#[test]
fn single_line_file_is_malformed() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".diderot/credentials");
    file.write_str("only-a-username\n").expect("write");
    #[cfg(unix)]
    chmod(file.path(), 0o600);

    let err = credentials::discover_at(home.path(), None).expect_err("bad permissions");
    assert!(matches!(err, ConfigError::Malformed { .. }), "got: {err}");
    assert!(err.to_string().contains(".diderot/credentials"));
}

#[test]
#[cfg(unix)]
fn group_readable_file_is_rejected() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".diderot/credentials");
    file.write_str("user\npass\n").expect("write");
    chmod(file.path(), 0o644);

    let err = credentials::discover_at(home.path(), None).expect_err("malformed file");
    assert!(matches!(err, ConfigError::InsecurePermissions { .. }), "got: {err}");
    assert!(err.to_string().contains("chmod 600"));
}

//! Attachment resolution for XML chapter uploads.
//!
//! Each entry is `~`/`$VAR` expanded, joined onto the manifest directory
//! (absolute entries stay absolute) and matched as a glob. Directories
//! contribute every file beneath them in sorted traversal order. Entries
//! that match nothing are skipped with a warning.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// Files to attach, plus the entries that could not be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAttachments {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

pub fn resolve(entries: &[String], base_dir: &Path) -> ResolvedAttachments {
    let mut resolved = ResolvedAttachments::default();
    for entry in entries {
        let matches = matches_for(entry, base_dir);
        if matches.is_empty() {
            warn!("cannot find attachment {entry}; skipping");
            resolved.skipped.push(entry.clone());
            continue;
        }
        for path in matches {
            if path.is_dir() {
                resolved.files.extend(files_under(&path));
            } else {
                resolved.files.push(path);
            }
        }
    }
    resolved
}

fn matches_for(entry: &str, base_dir: &Path) -> Vec<PathBuf> {
    let expanded = match shellexpand::full(entry) {
        Ok(s) => s.into_owned(),
        Err(e) => {
            warn!("cannot expand attachment {entry}: {e}");
            entry.to_string()
        }
    };
    // Only the entry is pattern syntax; the manifest directory is literal.
    let escaped_base = glob::Pattern::escape(&base_dir.to_string_lossy());
    let pattern = Path::new(&escaped_base).join(&expanded);
    let candidate = base_dir.join(expanded);
    match glob::glob(&pattern.to_string_lossy()) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        // Not a valid pattern; fall back to the literal path.
        Err(_) if candidate.exists() => vec![candidate],
        Err(_) => vec![],
    }
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, "x").expect("write");
    }

    #[test]
    fn directories_expand_recursively_in_sorted_order() {
        let tmp = TempDir::new().expect("tempdir");
        touch(&tmp.path().join("img/b.png"));
        touch(&tmp.path().join("img/a.png"));
        touch(&tmp.path().join("img/sub/c.png"));

        let resolved = resolve(&["img".to_string()], tmp.path());
        let names: Vec<_> = resolved
            .files
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).expect("under tmp").to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("img/a.png"),
                PathBuf::from("img/b.png"),
                PathBuf::from("img/sub/c.png"),
            ]
        );
        assert!(resolved.skipped.is_empty());
    }

    #[test]
    fn globs_match_relative_to_base_dir() {
        let tmp = TempDir::new().expect("tempdir");
        touch(&tmp.path().join("ch1/fig1.svg"));
        touch(&tmp.path().join("ch1/fig2.svg"));
        touch(&tmp.path().join("ch1/notes.txt"));

        let resolved = resolve(&["ch1/*.svg".to_string()], tmp.path());
        assert_eq!(
            resolved.files,
            vec![tmp.path().join("ch1/fig1.svg"), tmp.path().join("ch1/fig2.svg")]
        );
    }

    #[test]
    fn unresolvable_entries_are_skipped_and_order_is_kept() {
        let tmp = TempDir::new().expect("tempdir");
        touch(&tmp.path().join("z.txt"));
        touch(&tmp.path().join("a.txt"));

        let entries = vec!["z.txt".to_string(), "missing/*.png".to_string(), "a.txt".to_string()];
        let resolved = resolve(&entries, tmp.path());
        assert_eq!(
            resolved.files,
            vec![tmp.path().join("z.txt"), tmp.path().join("a.txt")]
        );
        assert_eq!(resolved.skipped, vec!["missing/*.png".to_string()]);
    }

    #[test]
    fn absolute_entries_ignore_base_dir() {
        let tmp = TempDir::new().expect("tempdir");
        let file = tmp.path().join("abs.txt");
        touch(&file);
        let other = TempDir::new().expect("tempdir");
        let resolved = resolve(&[file.to_string_lossy().into_owned()], other.path());
        assert_eq!(resolved.files, vec![file]);
    }

    #[test]
    fn glob_characters_in_base_dir_are_literal() {
        let tmp = TempDir::new().expect("tempdir");
        let base = tmp.path().join("notes[draft]");
        touch(&base.join("img/fig.png"));
        touch(&base.join("img/fig2.png"));

        let resolved = resolve(&["img/fig.png".to_string(), "img/*.png".to_string()], &base);
        assert!(resolved.skipped.is_empty(), "skipped {:?}", resolved.skipped);
        assert_eq!(
            resolved.files,
            vec![
                base.join("img/fig.png"),
                base.join("img/fig.png"),
                base.join("img/fig2.png"),
            ]
        );
    }
}

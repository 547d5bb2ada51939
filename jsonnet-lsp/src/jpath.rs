//! Import root discovery.
//!
//! Jsonnet projects managed with jsonnet-bundler or Tanka keep their
//! dependencies under `vendor/` and `lib/` next to a marker file. Walking up
//! from the edited file to that marker gives imports the same search path
//! the project's own tooling uses.

use std::path::{Path, PathBuf};

use tracing::debug;

const PROJECT_MARKERS: [&str; 2] = ["jsonnetfile.json", "tkrc.yaml"];

/// Computes the import search path for `file`.
///
/// When a project root is found the result is `<root>/vendor`, `<root>/lib`,
/// the configured paths, then the file's own directory. Without a root only
/// the configured paths and the file's directory remain.
pub fn resolve(file: &str, configured: &[String], use_project_root: bool) -> Vec<String> {
    let dir = Path::new(file)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut jpaths = Vec::new();
    if use_project_root {
        match find_project_root(&dir) {
            Some(root) => {
                jpaths.push(root.join("vendor").to_string_lossy().into_owned());
                jpaths.push(root.join("lib").to_string_lossy().into_owned());
            }
            None => debug!(file, "no project marker found above file"),
        }
    }

    jpaths.extend(configured.iter().cloned());
    jpaths.push(dir.to_string_lossy().into_owned());
    jpaths
}

fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        for marker in PROJECT_MARKERS {
            if dir.join(marker).is_file() {
                return Some(dir.to_path_buf());
            }
        }
        current = dir.parent();
    }
    None
}

//! Loading source trees from disk and selecting files for analysis.

use std::path::Path;

use pbl_guardian_domain::{SourceFile, SourceTree};
use tracing::debug;
use walkdir::WalkDir;

use crate::language::LanguageProfile;

/// Files larger than this are not loaded.
pub const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Directory names whose contents are vendored, generated or build output.
const EXCLUDED_DIRS: &[&str] = &[
    "vendor",
    "node_modules",
    "target",
    "build",
    "dist",
    "__pycache__",
    "venv",
    ".venv",
    "third_party",
    "generated",
];

const EXCLUDED_SUFFIXES: &[&str] = &[".min.js", "_pb2.py", "_pb2_grpc.py", ".lock"];

const LOCK_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "Pipfile.lock",
    "go.sum",
];

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

/// Load every text file under `root`. Hidden entries are skipped; binary
/// and oversized files are counted in `skipped_files` but not loaded,
/// as are files that cannot be read.
pub fn load_tree(root: &Path) -> std::io::Result<SourceTree> {
    let mut files = Vec::new();
    let mut skipped = 0usize;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                debug!(error = %e, "unreadable entry skipped");
                skipped += 1;
                continue;
            }
            Err(e) => {
                return Err(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walk error")
                }))
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.metadata().map(|m| m.len()).unwrap_or(0) > MAX_FILE_BYTES {
            skipped += 1;
            continue;
        }
        let bytes = match std::fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "unreadable file skipped");
                skipped += 1;
                continue;
            }
        };
        if bytes.contains(&0) {
            skipped += 1;
            continue;
        }
        let Ok(content) = String::from_utf8(bytes) else {
            skipped += 1;
            continue;
        };
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push(SourceFile::new(rel, content));
    }

    let mut tree = SourceTree::new(files);
    tree.skipped_files = skipped;
    debug!(root = %root.display(), files = tree.files.len(), skipped, "source tree loaded");
    Ok(tree)
}

/// Whether a path is vendored, generated or a lock file.
pub fn is_excluded(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').collect();
    let (name, dirs) = match segments.split_last() {
        Some((name, dirs)) => (*name, dirs),
        None => return true,
    };
    if dirs.iter().any(|d| EXCLUDED_DIRS.contains(d)) {
        return true;
    }
    LOCK_FILES.contains(&name) || EXCLUDED_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Files of the given language that are not excluded, in path order.
pub fn eligible_files<'a>(tree: &'a SourceTree, profile: &LanguageProfile) -> Vec<&'a SourceFile> {
    tree.files
        .iter()
        .filter(|f| !is_excluded(&f.path))
        .filter(|f| f.extension().is_some_and(|ext| profile.matches_extension(&ext)))
        .collect()
}

use std::path::{Path, PathBuf};

use crate::error::Result;

/// A source file found under the documents directory.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the documents directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
    pub kind: FileKind,
}

/// How a discovered file is turned into documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// One document per page.
    Pdf,
    /// One document for the whole file.
    Text,
}

impl FileKind {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "md" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Recursively walk a directory and discover loadable document files.
///
/// Skips hidden files/directories (names starting with `.`) and only
/// returns `.pdf`, `.txt` and `.md` files, sorted by relative path.
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();

        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            walk_dir(root, &path, results)?;
        } else if file_type.is_symlink() {
            let Ok(resolved) = path.canonicalize() else {
                continue; // broken symlink
            };
            // Directory links are not followed, so walks cannot cycle.
            if resolved.is_file()
                && let Some(kind) = FileKind::from_path(&resolved)
            {
                results.push(make_discovered(root, &path, resolved, kind));
            }
        } else if file_type.is_file()
            && let Some(kind) = FileKind::from_path(&path)
        {
            let absolute = path.canonicalize()?;
            results.push(make_discovered(root, &path, absolute, kind));
        }
    }

    Ok(())
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: PathBuf,
    kind: FileKind,
) -> DiscoveredFile {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    DiscoveredFile {
        relative_path,
        absolute_path,
        kind,
    }
}

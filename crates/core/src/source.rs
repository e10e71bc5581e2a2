//! Source provider abstraction for loading batch fragments.
//!
//! The [`SourceProvider`] trait abstracts file I/O so batches can be loaded
//! from disk or from memory (tests, embedding hosts) through the same path.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// File access needed to load batch fragments.
pub trait SourceProvider {
    /// Read the text of one fragment.
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error>;

    /// Whether `path` names a directory of fragments.
    fn is_dir(&self, path: &Path) -> bool;

    /// Every `.json` fragment directly inside `dir`, sorted by path.
    fn list_fragments(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error>;
}

/// Default filesystem-backed provider.
pub struct FileSystemProvider;

impl SourceProvider for FileSystemProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        std::fs::read_to_string(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_fragments(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_fragment(&path) {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }
}

/// In-memory provider keyed by normalized path.
pub struct InMemoryProvider {
    files: BTreeMap<PathBuf, String>,
}

impl InMemoryProvider {
    pub fn new(files: impl IntoIterator<Item = (PathBuf, String)>) -> Self {
        Self {
            files: files
                .into_iter()
                .map(|(p, text)| (Self::normalize_path(&p), text))
                .collect(),
        }
    }

    /// Resolve `.` and `..` without touching the filesystem.
    fn normalize_path(path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    components.pop();
                }
                other => components.push(other),
            }
        }
        components.iter().collect()
    }
}

impl SourceProvider for InMemoryProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        let normalized = Self::normalize_path(path);
        self.files.get(&normalized).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found in memory: {}", normalized.display()),
            )
        })
    }

    fn is_dir(&self, path: &Path) -> bool {
        let normalized = Self::normalize_path(path);
        !self.files.contains_key(&normalized)
            && self.files.keys().any(|k| k.starts_with(&normalized))
    }

    fn list_fragments(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let normalized = Self::normalize_path(dir);
        Ok(self
            .files
            .keys()
            .filter(|k| k.parent() == Some(normalized.as_path()) && is_fragment(k))
            .cloned()
            .collect())
    }
}

fn is_fragment(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> InMemoryProvider {
        InMemoryProvider::new([
            (PathBuf::from("/batch/units.json"), "{}".to_string()),
            (PathBuf::from("/batch/scalars.json"), "{}".to_string()),
            (PathBuf::from("/batch/notes.txt"), "".to_string()),
            (PathBuf::from("/batch/nested/more.json"), "{}".to_string()),
        ])
    }

    #[test]
    fn normalize_path_resolves_dot_and_dotdot() {
        let normalized = InMemoryProvider::normalize_path(Path::new("/a/b/../c/./d"));
        assert_eq!(normalized, PathBuf::from("/a/c/d"));
    }

    #[test]
    fn read_source_found_and_missing() {
        let p = provider();
        assert_eq!(p.read_source(Path::new("/batch/./units.json")).unwrap(), "{}");
        let err = p.read_source(Path::new("/batch/missing.json")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn list_fragments_is_sorted_and_shallow() {
        let p = provider();
        assert!(p.is_dir(Path::new("/batch")));
        assert!(!p.is_dir(Path::new("/batch/units.json")));
        let listed = p.list_fragments(Path::new("/batch")).unwrap();
        assert_eq!(
            listed,
            vec![
                PathBuf::from("/batch/scalars.json"),
                PathBuf::from("/batch/units.json")
            ]
        );
    }
}

//! Pass 0: load batch fragments and merge them into one [`RawBatch`].
//!
//! Each input path is either a fragment (`.json` document) or a directory
//! whose `.json` children are all fragments. Records without a `prov.file`
//! get the fragment's path.

use crate::ast::RawBatch;
use crate::error::LoadError;
use crate::source::{FileSystemProvider, SourceProvider};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load every fragment named by `inputs` from the filesystem.
pub fn load_batch(inputs: &[PathBuf]) -> Result<RawBatch, LoadError> {
    load_batch_with_provider(inputs, &FileSystemProvider)
}

pub fn load_batch_with_provider(
    inputs: &[PathBuf],
    provider: &dyn SourceProvider,
) -> Result<RawBatch, LoadError> {
    if inputs.is_empty() {
        return Err(LoadError::NoInput);
    }

    let mut batch = RawBatch::default();
    for input in inputs {
        if provider.is_dir(input) {
            let fragments = provider
                .list_fragments(input)
                .map_err(|source| LoadError::Io {
                    path: input.clone(),
                    source,
                })?;
            if fragments.is_empty() {
                return Err(LoadError::NoFragments {
                    path: input.clone(),
                });
            }
            for fragment in &fragments {
                batch.merge(load_fragment(fragment, provider)?);
            }
        } else {
            batch.merge(load_fragment(input, provider)?);
        }
    }
    Ok(batch)
}

fn load_fragment(path: &Path, provider: &dyn SourceProvider) -> Result<RawBatch, LoadError> {
    let text = provider.read_source(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut fragment = RawBatch::from_json_str(&text).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fragment.stamp_file(&path.display().to_string());
    debug!(path = %path.display(), records = fragment.len(), "loaded fragment");
    Ok(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryProvider;

    fn provider() -> InMemoryProvider {
        InMemoryProvider::new([
            (
                PathBuf::from("/batch/a_units.json"),
                r#"{ "units": [{ "ident": "Length" }] }"#.to_string(),
            ),
            (
                PathBuf::from("/batch/b_scalars.json"),
                r#"{ "scalars": [{ "ident": "Distance", "prov": { "line": 2 } }] }"#.to_string(),
            ),
            (PathBuf::from("/bad.json"), "{ units: ".to_string()),
        ])
    }

    #[test]
    fn directory_input_merges_all_fragments() {
        let batch = load_batch_with_provider(&[PathBuf::from("/batch")], &provider()).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.units[0].prov.file, "/batch/a_units.json");
        assert_eq!(batch.scalars[0].prov.file, "/batch/b_scalars.json");
        assert_eq!(batch.scalars[0].prov.line, 2);
    }

    #[test]
    fn malformed_fragment_is_a_load_error() {
        let err = load_batch_with_provider(&[PathBuf::from("/bad.json")], &provider()).unwrap_err();
        assert!(matches!(err, LoadError::Json { .. }));
    }

    #[test]
    fn missing_fragment_is_an_io_error() {
        let err =
            load_batch_with_provider(&[PathBuf::from("/nope.json")], &provider()).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn no_inputs() {
        assert!(matches!(
            load_batch_with_provider(&[], &provider()),
            Err(LoadError::NoInput)
        ));
    }
}

//! Resolution policy, loadable from TOML.

use crate::cancel::Cancellation;
use crate::diagnostics::Severity;
use crate::error::ConfigError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Policy knobs for one resolution run.
///
/// ```toml
/// redundant_listing_severity = "note"
/// max_derived_combinations = 1024
/// parallel = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolutionConfig {
    /// Severity of "already included", "already excluded" and repeated list
    /// elements. These never drop the owning item.
    pub redundant_listing_severity: Severity,
    /// Severity of list elements naming an unknown unit instance. The
    /// element is skipped; the item is kept.
    pub unrecognized_listing_severity: Severity,
    /// Cap on the Cartesian product enumerated for one derivable signature.
    pub max_derived_combinations: usize,
    /// Run per-item work on the rayon pool.
    pub parallel: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        ResolutionConfig {
            redundant_listing_severity: Severity::Warning,
            unrecognized_listing_severity: Severity::Error,
            max_derived_combinations: 4096,
            parallel: true,
        }
    }
}

impl ResolutionConfig {
    pub fn from_toml_str(text: &str) -> Result<ResolutionConfig, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<ResolutionConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ResolutionConfig::from_toml_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `f` to every item, in parallel when configured, preserving
    /// input order. Items reached after cancellation yield `None`.
    pub(crate) fn map_items<T, R, F>(&self, items: &[T], cancel: &Cancellation, f: F) -> Vec<Option<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        let run = |item: &T| {
            if cancel.is_cancelled() {
                None
            } else {
                Some(f(item))
            }
        };
        if self.parallel {
            items.par_iter().map(run).collect()
        } else {
            items.iter().map(run).collect()
        }
    }
}

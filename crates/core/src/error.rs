use std::path::PathBuf;

/// Failure to read or parse a batch fragment.
///
/// These are surface errors: they stop loading before resolution starts.
/// Resolution itself never fails; it reports [`crate::Diagnostic`]s.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed batch fragment {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A directory input contained no `.json` fragments.
    #[error("no batch fragments found in {}", path.display())]
    NoFragments { path: PathBuf },

    #[error("no input paths given")]
    NoInput,
}

/// Failure to load a [`crate::ResolutionConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl LoadError {
    /// Serialize for machine-readable CLI output.
    pub fn to_json_value(&self) -> serde_json::Value {
        let (kind, path) = match self {
            LoadError::Io { path, .. } => ("io", Some(path)),
            LoadError::Json { path, .. } => ("json", Some(path)),
            LoadError::NoFragments { path } => ("no_fragments", Some(path)),
            LoadError::NoInput => ("no_input", None),
        };
        serde_json::json!({
            "kind":    kind,
            "message": self.to_string(),
            "path":    path.map(|p| p.display().to_string()),
        })
    }
}

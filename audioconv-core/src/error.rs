//! Error types for audioconv-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading, saving, or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path that caused it.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// `init` refused to clobber an existing config file.
    #[error("config already exists at {path} (use --force to overwrite)")]
    ConfigExists { path: PathBuf },

    /// Neither the config file nor the front end supplied a required value.
    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("source root must be an existing directory: \"{path}\" is not")]
    SourceRootMissing { path: PathBuf },

    #[error("mirror root must be an existing directory: \"{path}\" is not")]
    MirrorRootMissing { path: PathBuf },

    /// One root lies inside the other.
    #[error("source root {source_root} and mirror root {mirror_root} must not be nested")]
    NestedRoots {
        source_root: PathBuf,
        mirror_root: PathBuf,
    },

    #[error("invalid extension '{0}'")]
    InvalidExtension(String),

    #[error("invalid bitrate '{0}'; expected a positive number of bits per second")]
    InvalidBitrate(String),
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

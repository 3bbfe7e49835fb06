//! Errors from reading and writing `config.ron`.

use std::path::PathBuf;

/// A config file operation failed. IO and parse failures name the file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Covers creating the config directory as well as writing the file.
    #[error("cannot write {}: {source}", .path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid surface config: {source}", .path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("cannot encode surface config: {0}")]
    SerializeError(#[source] ron::Error),
}

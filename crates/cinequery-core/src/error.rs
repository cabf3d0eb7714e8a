//! Error types for the core library.

use std::path::PathBuf;
use thiserror::Error;

/// Catalog-level failures where no structured retrieval is possible at all.
///
/// Per-source introspection failures are recorded inside the catalog itself
/// and are never fatal to the build.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("data directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("no SQLite sources found under {0}")]
    NoSources(PathBuf),

    #[error("failed to read data directory {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors at the reasoning oracle boundary.
///
/// Every caller converts these into a documented safe default; they never
/// abort a turn.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("oracle returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("oracle response malformed: {0}")]
    Malformed(String),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Failures while constructing clients, before any turn runs.
///
/// Runtime tool failures never surface as errors; they are folded into
/// per-tool results.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

use std::path::PathBuf;

use thiserror::Error;

/// Typed errors surfaced by the engine to whatever front-end drives it.
///
/// Configuration, validation and target-file errors are fail-fast: they abort
/// a run before any per-target work is spawned. Failures inside an individual
/// target's execution never appear here; they are contained in that target's
/// outcome.
#[derive(Error, Debug)]
pub enum PocketError {
    #[error("Unknown option: {name}")]
    UnknownOption { name: String },

    #[error("No module selected")]
    NoModuleSelected,

    #[error("Module/Exploit not found: {name}")]
    ModuleNotFound { name: String },

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Cannot read target file {path}: {source}")]
    TargetFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, PocketError>;

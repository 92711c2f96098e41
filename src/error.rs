//! Error types for patch rules and the repackaging pipeline.
//!
//! [`PatchError`] covers everything the structural patcher can report while
//! rewriting disassembly and XML files. [`PipelineError`] wraps it together
//! with the failures of the external tools and missing stage artifacts.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::android::archive::ArchiveError;

/// Result alias for patch rule operations.
pub type PatchResult<T> = Result<T, PatchError>;

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised by the structural patcher.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A start marker was found but no `.end method` follows it before the next
    /// `.method` line or the end of the file.
    #[error("method {method} declared at line {line} has no matching .end method")]
    MalformedRegion { method: String, line: usize },

    #[error("invalid method identity '{0}'")]
    InvalidIdentity(String),

    #[error("invalid replacement body: {0}")]
    InvalidReplacement(String),

    #[error("missing library files: {}", .0.join(", "))]
    MissingLibraries(Vec<String>),
}

impl PatchError {
    /// Malformed regions degrade a single file; everything else aborts the stage.
    pub fn is_degraded(&self) -> bool {
        matches!(self, PatchError::MalformedRegion { .. })
    }
}

/// Errors raised by the pipeline orchestrator.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("input file '{0}' not found")]
    MissingInput(PathBuf),

    #[error("required tool '{name}' not available: {reason}")]
    MissingTool { name: String, reason: String },

    #[error("{tool} failed with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// A stage finished but its expected artifact is absent or empty.
    #[error("{stage}: expected artifact '{path}' is missing or empty")]
    MissingArtifact { stage: String, path: PathBuf },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

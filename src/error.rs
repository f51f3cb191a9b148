use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KegError {
    #[error("{0} is already being installed by this process")]
    AlreadyAttempted(String),

    #[error("{name} {version} is already linked; run `keg unlink {name}` first")]
    AlreadyLinked { name: String, version: String },

    #[error("installed dependencies are not linked: {}", .0.join(", "))]
    UnlinkedDependencies(Vec<String>),

    #[error("cannot install {formula}: it conflicts with {conflict}, which is currently linked")]
    Conflict { formula: String, conflict: String },

    #[error("unsatisfied requirements for {formula}: {}", .requirements.join(", "))]
    UnsatisfiedRequirements {
        formula: String,
        requirements: Vec<String>,
    },

    #[error("formula not found: {0}")]
    FormulaUnavailable(String),

    #[error("formula {name} not found in tap {tap}")]
    TapFormulaUnavailable { tap: String, name: String },

    #[error("failed to pour bottle for {formula}: {reason}")]
    PourFailed { formula: String, reason: String },

    #[error("build of {0} failed")]
    BuildFailed(String),

    #[error("empty installation: nothing was installed to {0}")]
    EmptyInstallation(PathBuf),

    #[error("could not link keg: {} file(s) would be clobbered in the prefix", .files.len())]
    LinkConflict { files: Vec<PathBuf> },

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("no bottle available for {0}")]
    NoBottle(String),

    #[error("unknown bottle architecture: {0}")]
    UnknownBottleArch(String),

    #[error("dependency cycle detected at {0}")]
    DependencyCycle(String),

    #[error("{0} is locked by another process")]
    Locked(String),

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl KegError {
    /// Annotate a formula-unavailable error with the dependent that pulled
    /// it in, so the user sees which edge of the graph failed to load.
    pub fn annotate_dependent(self, dependent: &str) -> Self {
        match self {
            KegError::FormulaUnavailable(name) => KegError::Other(anyhow::anyhow!(
                "{name} (dependency of {dependent}) not found"
            )),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, KegError>;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for a build run.
///
/// Everything except a missing tile asset is fatal: the run aborts with the
/// offending line or address and no output file is written.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("syntax error in '{line}': {reason}")]
    Syntax { line: String, reason: String },

    #[error("unresolved symbol '{name}' in '{line}'")]
    UnresolvedSymbol { name: String, line: String },

    #[error("label addresses did not converge after {passes} passes")]
    Convergence { passes: usize },

    #[error("cannot encode '{line}' at {addr:#06x}: {reason}")]
    Encoding {
        line: String,
        addr: u16,
        reason: String,
    },

    #[error("{}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    pub fn syntax(line: &str, reason: impl Into<String>) -> BuildError {
        BuildError::Syntax {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> BuildError {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the background pipeline.
///
/// These are logged, never propagated as panics: a single bad file must not
/// take down parsing or analysis for the rest of the project.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A background file read kept failing after bounded retries (the file
    /// may be locked or mid-copy for longer than the retry budget).
    #[error("failed to read {path} after {attempts} attempts: {source}")]
    FileRead {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// The external parser panicked. The previously committed tree (if any)
    /// is left untouched.
    #[error("parser panicked while parsing {path}")]
    ParserPanic {
        path: PathBuf,
    },
}

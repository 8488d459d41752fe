//! Check engine error types.

use thiserror::Error;

/// Errors surfaced by the check engine facade.
///
/// Probe failures are not errors; they collapse into Down observations on
/// the event stream.
#[derive(Debug, Error)]
pub enum CheckEngineError {
    /// The engine has not been started, or has already been stopped.
    #[error("check engine is not running")]
    NotRunning,
}

pub type CheckEngineResult<T> = Result<T, CheckEngineError>;

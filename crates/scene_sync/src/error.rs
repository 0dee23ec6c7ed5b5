//! Error types for the synchronization core

use thiserror::Error;

/// Errors raised by the scene synchronization core
///
/// The core does not catch-and-log: errors propagate to the per-frame update
/// driver, which owns fatal-error handling. A failed sync leaves dirty state
/// untouched for the aspects that did not complete, so the next frame retries
/// from where the previous attempt stopped.
#[derive(Error, Debug)]
pub enum SceneError {
    /// A null-equivalent or otherwise unusable argument was passed
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    /// Attempted to insert an object already owned by another world without
    /// the removal mark set
    #[error("object is already owned by another world")]
    AlreadyOwned,

    /// Attempted to remove an object that is not linked into this world
    #[error("object is not part of this world")]
    NotInWorld,

    /// Configuration could not be parsed or validated
    #[error("configuration error: {0}")]
    Config(String),
}

//! Error types used by the crate.

use thiserror::Error;

/// Mapbind error type.
///
/// Only structural misconfiguration is fatal. Missing coordinates, absent
/// provider handles and failed lookups never produce an error at the
/// component API surface: the dependent operation is silently skipped
/// instead.
#[derive(Debug, Error)]
pub enum MapBindError {
    /// The canvas element the map should be constructed in does not exist.
    #[error("map canvas '{0}' does not exist")]
    CanvasNotFound(String),
    /// The map provider reported a failure.
    #[error("provider error: {0}")]
    Provider(String),
    /// A lookup returned no results.
    #[error("no results found")]
    NoResults,
}

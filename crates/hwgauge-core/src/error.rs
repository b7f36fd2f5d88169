//! Error types for the hwgauge core library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by providers, parsers and preference stores.
///
/// Metric queries never return these; a failed read degrades to "no data".
#[derive(Error, Debug)]
pub enum Error {
    /// The sensor provider could not be opened.
    #[error("Sensor provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// I/O error while reading sensor sources or state files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A sensor source produced text that is not a number.
    #[error("Failed to parse {value:?} from {source_name}")]
    Parse { source_name: String, value: String },

    /// Unknown device class name.
    #[error("Invalid device class: {0} (expected network or disk)")]
    InvalidDeviceClass(String),

    /// Persisting preferences or calibration failed.
    #[error("Failed to persist preferences: {0}")]
    Persist(String),
}

use embedded_hal::digital;

/// Errors reported by the stimulation core.
///
/// Every operation that returns an error has already driven the laser back to its idle level,
/// so an error never leaves the light source latched on.
#[derive(Debug, Copy, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A stimulation parameter was rejected before any hardware action.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),
    /// A peripheral could not be brought up.
    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(&'static str),
    /// The settings document is inconsistent or malformed.
    #[error("Invalid configuration: {0}")]
    Config(&'static str),
    /// A peripheral failed while an operation was in progress.
    #[error("I/O error {0:?}")]
    Io(digital::ErrorKind),
}

impl<E: digital::Error> From<E> for Error {
    fn from(value: E) -> Self {
        Self::Io(value.kind())
    }
}

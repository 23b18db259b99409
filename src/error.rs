//! Error types.

/// Error type for smtphook.
///
/// Protocol-level failures are expressed as [`Response`](crate::response::Response)
/// values; this type only covers wiring, configuration and transport problems.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration is invalid: {0}")]
    Config(#[from] serini::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("No {0} hook is wired, refusing to start")]
    MissingHooks(&'static str),
    #[error("Invalid mail address '{address}': {reason}")]
    InvalidAddress {
        address: String,
        reason: &'static str,
    },
}

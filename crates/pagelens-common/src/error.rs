use thiserror::Error;

/// Error taxonomy shared across the workspace.
///
/// Provider failures stay distinguishable by the caller: a missing key is a
/// `Config` error raised before any network I/O, a non-2xx vendor response is
/// an `Api` error with the extracted envelope message, and a well-formed
/// response with no usable content is `EmptyResponse`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("provider returned no usable content")]
    EmptyResponse,

    #[error("network error: {0}")]
    Network(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("host unavailable: {0}")]
    HostUnavailable(String),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures the user can fix themselves (missing or bad keys).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

//! A `thiserror`-based `Error`+`From<io::Error>` pair preserving a `Wait`-vs-`Fatal` shape:
//! callers of `has_failed()` only care whether an error is transient (would-block, timeout: retry
//! on the next poll) or terminal (close the FD).

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("declared payload size {0} is outside (0, MAX_MSG_SIZE]")]
    OversizedPayload(u32),
    #[error("unexpected end of stream mid-frame")]
    Truncated,
    #[error("operation would block")]
    Wait,
    #[error("socket io error: {0}")]
    Io(#[from] io::Error),
    #[error("bind address invalid: {0}")]
    Addr(#[from] std::net::AddrParseError),
    #[error("cluster socket misconfigured: {0}")]
    Config(String),
}

pub type NetworkResult<T> = Result<T, NetworkError>;

impl NetworkError {
    /// True for every variant except the purely transient ones (`Wait`, and an `io::Error` whose
    /// kind is `WouldBlock`).
    pub fn has_failed(&self) -> bool {
        match self {
            NetworkError::Wait => false,
            NetworkError::Io(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            _ => true,
        }
    }
}

impl From<NetworkError> for gdf_kernel::error::CoreError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::OversizedPayload(_) | NetworkError::Truncated => {
                gdf_kernel::error::CoreError::protocol(err.to_string())
            }
            NetworkError::Wait => gdf_kernel::error::CoreError::Timeout,
            NetworkError::Io(e) => gdf_kernel::error::CoreError::Transport(e),
            NetworkError::Addr(e) => gdf_kernel::error::CoreError::config(e.to_string()),
            NetworkError::Config(msg) => gdf_kernel::error::CoreError::config(msg),
        }
    }
}

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("column '{0}' already exists")]
    DuplicateColumn(String),
    #[error("no such column '{0}'")]
    UnknownColumn(String),
    #[error("record stream violation: {0}")]
    Protocol(String),
    #[error("receive timed out before all expected EOF_REC arrived")]
    Timeout,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type FrameResult<T> = Result<T, FrameError>;

impl From<FrameError> for gdf_kernel::error::CoreError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::DuplicateColumn(m) => gdf_kernel::error::CoreError::config(m),
            FrameError::UnknownColumn(m) => gdf_kernel::error::CoreError::config(m),
            FrameError::Protocol(m) => gdf_kernel::error::CoreError::protocol(m),
            FrameError::Timeout => gdf_kernel::error::CoreError::Timeout,
            FrameError::Io(e) => gdf_kernel::error::CoreError::Transport(e),
        }
    }
}

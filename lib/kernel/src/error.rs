//! The error-kind hierarchy from the error handling design, grounded on
//! `neutronium::net::shared::NetworkError`'s `Wait`-vs-`Fatal` shape but widened to the full set
//! of kinds every crate in this workspace converts into at its boundary.

use std::io;

/// Unified error hierarchy. Per-crate error types (`gdf_net::NetworkError`, `gdf_fabric::FabricError`,
/// `gdf_dataframe::FrameError`, ...) convert into this via `From` at the point a worker thread
/// decides whether an error is terminal for its role.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid construction parameter - bad verb, unknown enum, out-of-range depth. The object is
    /// never created; this is surfaced synchronously to the factory caller.
    #[error("config error: {0}")]
    Config(String),

    /// A wire or record-stream protocol violation: declared length over the limit, unknown record
    /// type, EOF before payload complete, missing EOF_REC for a contributing key.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Allocation or file-open failure. Logged CRITICAL at the call site; callers see a negative
    /// status code / `None`.
    #[error("resource error: {0}")]
    Resource(String),

    /// A bounded wait elapsed. Not terminal; retried by the caller per local policy.
    #[error("timeout")]
    Timeout,

    /// The cooperative `active` cancel flag was observed; the worker is unwinding cleanly.
    #[error("shutdown requested")]
    ShutdownRequested,

    /// A socket read/write returned a system error. Triggers close-and-reconnect in the connector
    /// loop; promoted to terminal when `die_on_disconnect` is set.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl CoreError {
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> CoreError {
        CoreError::Config(msg.into())
    }

    #[inline]
    pub fn protocol<S: Into<String>>(msg: S) -> CoreError {
        CoreError::Protocol(msg.into())
    }

    #[inline]
    pub fn resource<S: Into<String>>(msg: S) -> CoreError {
        CoreError::Resource(msg.into())
    }

    /// Whether this error is terminal for the worker role that produced it - `Timeout` is normal
    /// and retried; everything else unwinds the worker (or, for `ShutdownRequested`, unwinds it
    /// cleanly by design).
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CoreError::Timeout)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

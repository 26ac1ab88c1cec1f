//! Device abstraction and poll-loop handler contract, generalizing a multi-`mio::Poll` dispatch
//! loop from "TCP channel only" to any `Device`. A serial-port-style pump-thread pair is the kind
//! of non-socket device class this trait is meant to accommodate, even though this workspace only
//! ships a TCP implementation (`cluster::ClusterSocket`).

use std::time::Duration;

/// Declares which direction(s) of traffic a device carries.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Reader,
    Writer,
    Duplex,
}

/// Common surface every device in the poll loop implements.
pub trait Device {
    /// True if the device is connected and has been so for at least `n` without interruption,
    /// where `n` is caller-defined (e.g. "connected at all" for `n = Duration::ZERO`).
    fn is_connected(&self, n: Duration) -> bool;

    /// Tears down the device's connection (if any) and releases owned resources.
    fn close_connection(&mut self);

    /// Writes up to `buf.len()` bytes, blocking up to `timeout`. Returns the byte count written.
    fn write_buffer(&mut self, buf: &[u8], timeout: Duration) -> crate::error::NetworkResult<usize>;

    /// Reads up to `buf.len()` bytes, blocking up to `timeout`. Returns the byte count read.
    fn read_buffer(&mut self, buf: &mut [u8], timeout: Duration) -> crate::error::NetworkResult<usize>;

    /// A process-unique identifier for this device instance, stable for its lifetime.
    fn unique_id(&self) -> u64;

    /// A short, human-readable description of this device's configuration (address, role, ...),
    /// used in log lines rather than machine-parsed.
    fn config(&self) -> String;

    /// The traffic direction(s) this device carries.
    fn role(&self) -> Role;
}

/// The pair of callbacks the poll loop invokes around each wait, generalizing
/// `Endpoint::sync`'s per-FD dispatch: `poll_handler` fills the requested interest set before the
/// wait, `active_handler` is given the bits the OS actually reported afterward.
pub trait PollHandler {
    /// Called before each wait; `ctx` is handler-defined registration/interest state.
    fn poll_handler(&mut self, fd: usize, ctx: &mut PollContext);

    /// Called after the wait with the event bits the OS reported for `fd`. A negative return
    /// (`Err`) means the device must be closed and `on_disconnect` invoked by the loop owner.
    fn active_handler(&mut self, fd: usize, readable: bool, writable: bool) -> crate::error::NetworkResult<()>;
}

/// The interest a `poll_handler` call requests for one FD ahead of the next wait.
#[derive(Debug, Default, Copy, Clone)]
pub struct PollContext {
    pub readable: bool,
    pub writable: bool,
}

impl PollContext {
    pub fn none() -> PollContext {
        PollContext { readable: false, writable: false }
    }
}

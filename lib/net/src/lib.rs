//! Device abstraction, poll loop, and cluster socket, with a handshake/encryption layer dropped
//! since authentication is out of scope for this workspace.

pub mod buffer;
pub mod cluster;
pub mod device;
pub mod error;
pub mod frame;
pub mod meter;

pub use cluster::{ClusterConfig, ClusterSocket, ClusterVariant, SocketRole};
pub use device::{Device, PollContext, PollHandler, Role};
pub use error::{NetworkError, NetworkResult};

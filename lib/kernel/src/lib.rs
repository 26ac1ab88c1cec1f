#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod error;
pub mod logging;
pub mod time;

/// A single byte in `[0, 255]` describing receive-queue occupancy, as sent on the meter channel.
pub type Meter = u8;

/// Default bounded wait applied to blocking fabric/socket calls by workers that have no more
/// specific timeout of their own.
pub const SYS_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

//! Configuration surface shared between the `gdfrunner` binary and its `gdfrunner_config`
//! config-dumping companion.

pub mod config;

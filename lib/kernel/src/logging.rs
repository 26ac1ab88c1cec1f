//! Root logger construction, mirroring the teacher's `flux::logging` module but completed: the
//! teacher left this building a `Logger` and dropping it before it could be installed anywhere.

use serde::Deserialize;
use slog::Drain;
use sloggers::Config;

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_destination")]
    pub destination: String,
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_destination() -> String {
    "stderr".to_string()
}

fn default_level() -> String {
    "debug".to_string()
}

impl Default for LoggingConfig {
    #[inline]
    fn default() -> Self {
        LoggingConfig {
            destination: default_destination(),
            level: default_level(),
        }
    }
}

/// Builds the process root logger from the supplied config. Every component that owns a worker
/// thread should derive a child logger from this via `log.new(slog::o!(...))` rather than writing
/// to a bare global, so log lines carry component identity (channel id, queue name, frame id).
pub fn init(config: &LoggingConfig) -> slog::Logger {
    let toml = format!(
        "type = \"terminal\"\nlevel = \"{}\"\ndestination = \"{}\"\n",
        config.level, config.destination
    );

    let logger_config: sloggers::LoggerConfig = serdeconv::from_toml_str(&toml)
        .expect("invalid logging config");

    match logger_config.build_logger() {
        Ok(logger) => logger,
        Err(err) => {
            eprintln!("falling back to terminal logger, failed to build configured one: {}", err);
            slog::Logger::root(slog::Discard, slog::o!())
        }
    }
}

/// A logger that discards everything, useful for tests and for components constructed before a
/// root logger is available.
#[inline]
pub fn discard() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

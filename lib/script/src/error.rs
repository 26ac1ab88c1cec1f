/// The narrow error class a script-host boundary call can fail with: a bad verb, an unknown
/// type name, a wrong argument count or shape. Never the construction/dispatch machinery's own
/// fault, so it carries no other variant (spec.md §7's `ConfigError` kind, scoped to this seam).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(msg: impl Into<String>) -> ConfigError {
        ConfigError(msg.into())
    }
}

impl From<ConfigError> for gdf_kernel::error::CoreError {
    fn from(err: ConfigError) -> Self {
        gdf_kernel::error::CoreError::config(err.0)
    }
}

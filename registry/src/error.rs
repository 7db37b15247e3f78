//! Registry error types.

use thiserror::Error;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A named entity is absent from every loaded manifest. Surfaced on
    /// the wire as `manifest_error`.
    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("No driver registered for {kind} '{name}'")]
    DriverMissing { kind: &'static str, name: String },

    #[error("Plugins directory not readable: {0}")]
    PluginsDir(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    pub fn missing(kind: &str, name: &str) -> Self {
        RegistryError::Manifest(format!("{kind} '{name}' not found in any loaded manifest"))
    }
}

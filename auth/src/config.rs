//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// Authentication settings for the serving layer.
///
/// Keys may be stored plaintext (`api_keys`) or hashed (`hashed_keys`,
/// each prefixed with the algorithm, e.g. `sha256:<hex>`). Both lists
/// are consulted; hashed entries with an unknown algorithm prefix are
/// rejected at verification time, never matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub api_keys: Vec<String>,
    pub hashed_keys: Vec<String>,
    /// Header carrying the credential when `allow_api_key_header` is on.
    pub header_name: String,
    pub allow_bearer: bool,
    pub allow_api_key_header: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_keys: Vec::new(),
            hashed_keys: Vec::new(),
            header_name: "x-api-key".to_string(),
            allow_bearer: true,
            allow_api_key_header: true,
        }
    }
}

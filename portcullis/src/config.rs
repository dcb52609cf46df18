//! Loading [`PortcullisConfig`] from TOML
//!
//! Missing sections and keys keep their defaults, except that a `[throttle.user]`
//! or `[throttle.ip]` table must give all four policy keys.
//!
//! ```toml
//! [throttle]
//! enabled = true
//! retention_days = 7
//!
//! [throttle.user]
//! threshold = 5
//! base_duration_minutes = 5
//! max_duration_minutes = 60
//! window_minutes = 5
//!
//! [login]
//! require_verified_email = true
//! session_ttl_hours = 24
//! remember_for_days = 30
//! unverified_grace_hours = 24
//! purge_deleted_after_days = 7
//! ```

use std::path::Path;

use crate::{PortcullisConfig, PortcullisError};

/// Parse and validate a configuration document.
pub fn from_toml_str(document: &str) -> Result<PortcullisConfig, PortcullisError> {
    let config: PortcullisConfig =
        toml::from_str(document).map_err(|e| PortcullisError::ConfigError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Read, parse and validate the configuration file at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<PortcullisConfig, PortcullisError> {
    let path = path.as_ref();
    let document = std::fs::read_to_string(path).map_err(|e| {
        PortcullisError::ConfigError(format!("Failed to read {}: {e}", path.display()))
    })?;

    tracing::debug!(path = %path.display(), "Loaded configuration file");
    from_toml_str(&document)
}

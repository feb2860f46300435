//! TOML configuration file loading
//!
//! Supports `~/.config/veda/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VedaConfigFile {
    /// Backend connection
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Offline profile
    #[serde(default)]
    pub user: UserFileConfig,

    /// Speech and turn-taking
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Command actions
    #[serde(default)]
    pub actions: ActionsFileConfig,
}

/// Backend connection
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Backend base URL (e.g. "http://localhost:5000")
    pub url: Option<String>,

    /// Session token sent as the `token` cookie
    pub token: Option<String>,

    /// Resolver timeout in seconds (unset waits indefinitely)
    pub resolver_timeout_secs: Option<u64>,
}

/// Profile used when the backend profile is not fetched
#[derive(Debug, Default, Deserialize)]
pub struct UserFileConfig {
    pub name: Option<String>,
    pub assistant_name: Option<String>,
}

/// Speech and turn-taking
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Recognition locale (e.g. "en-US")
    pub capture_locale: Option<String>,

    /// Speech output locale (e.g. "hi-IN")
    pub output_locale: Option<String>,

    /// Speak the greeting on attach
    pub greeting: Option<bool>,

    pub startup_delay_ms: Option<u64>,
    pub restart_delay_ms: Option<u64>,
    pub cooldown_ms: Option<u64>,
}

/// Command actions
#[derive(Debug, Default, Deserialize)]
pub struct ActionsFileConfig {
    /// Open resources with the platform handler
    pub open: Option<bool>,
}

/// Load the TOML config file
///
/// An explicit path must exist and parse. The default path is optional: a
/// missing or unreadable file yields `VedaConfigFile::default()`.
///
/// # Errors
///
/// Returns error if an explicit path cannot be read or parsed
pub fn load_config_file(explicit: Option<&Path>) -> Result<VedaConfigFile> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(VedaConfigFile::default());
    };

    if !path.exists() {
        return Ok(VedaConfigFile::default());
    }

    let config = match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VedaConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VedaConfigFile::default()
        }
    };
    Ok(config)
}

/// Return the config file path: `~/.config/veda/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("veda").join("config.toml"))
}

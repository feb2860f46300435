//! Configuration management for the Veda assistant
//!
//! Layers, lowest to highest: defaults, the TOML file, environment
//! variables. Command-line flags are applied by the binary on top.

pub mod file;

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;

use crate::profile::UserProfile;
use crate::session::SessionOptions;
use crate::voice::Timings;
use crate::Result;

use file::VedaConfigFile;

/// Default backend address
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// Veda assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL
    pub server_url: String,

    /// Session token (from `VEDA_SESSION_TOKEN` or the file)
    pub session_token: Option<SecretString>,

    /// Offline user name
    pub user_name: Option<String>,

    /// Offline assistant name (the wake phrase)
    pub assistant_name: Option<String>,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Open resources after a command; off logs them instead
    pub open_resources: bool,

    /// Resolver timeout; `None` waits indefinitely
    pub resolver_timeout: Option<Duration>,
}

/// Speech and turn-taking configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConfig {
    /// Recognition locale
    pub capture_locale: String,

    /// Speech output locale
    pub output_locale: String,

    /// Speak the greeting on attach
    pub greeting: bool,

    /// Startup, restart and cool-down delays
    pub timings: Timings,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            capture_locale: "en-US".to_string(),
            output_locale: "hi-IN".to_string(),
            greeting: true,
            timings: Timings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file and environment
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be loaded
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Ok(Self::from_sources(fc, |key| std::env::var(key).ok()))
    }

    /// Merge a config file with an environment lookup (env > toml > default)
    #[must_use]
    pub fn from_sources(fc: VedaConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = VoiceConfig::default();

        let millis = |key: &str, file: Option<u64>, default: Duration| {
            env(key)
                .and_then(|s| s.parse().ok())
                .or(file)
                .map_or(default, Duration::from_millis)
        };

        let voice = VoiceConfig {
            capture_locale: env("VEDA_CAPTURE_LOCALE")
                .or(fc.voice.capture_locale)
                .unwrap_or(defaults.capture_locale),
            output_locale: env("VEDA_OUTPUT_LOCALE")
                .or(fc.voice.output_locale)
                .unwrap_or(defaults.output_locale),
            greeting: fc.voice.greeting.unwrap_or(defaults.greeting),
            timings: Timings {
                startup: millis(
                    "VEDA_STARTUP_DELAY_MS",
                    fc.voice.startup_delay_ms,
                    defaults.timings.startup,
                ),
                restart: millis(
                    "VEDA_RESTART_DELAY_MS",
                    fc.voice.restart_delay_ms,
                    defaults.timings.restart,
                ),
                cooldown: millis(
                    "VEDA_COOLDOWN_MS",
                    fc.voice.cooldown_ms,
                    defaults.timings.cooldown,
                ),
            },
        };

        let session_token = env("VEDA_SESSION_TOKEN")
            .or(fc.server.token)
            .filter(|t| !t.is_empty())
            .map(SecretString::from);

        let config = Self {
            server_url: env("VEDA_SERVER_URL")
                .or(fc.server.url)
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            session_token,
            user_name: env("VEDA_USER_NAME").or(fc.user.name),
            assistant_name: env("VEDA_ASSISTANT_NAME").or(fc.user.assistant_name),
            voice,
            open_resources: fc.actions.open.unwrap_or(true),
            resolver_timeout: env("VEDA_RESOLVER_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.server.resolver_timeout_secs)
                .map(Duration::from_secs),
        };

        tracing::debug!(
            server = %config.server_url,
            authenticated = config.session_token.is_some(),
            assistant = ?config.assistant_name,
            "configuration resolved"
        );
        config
    }

    /// Profile built from configuration, for use without the backend
    #[must_use]
    pub fn offline_profile(&self) -> UserProfile {
        UserProfile {
            name: self.user_name.clone(),
            assistant_name: self.assistant_name.clone(),
            history: Vec::new(),
        }
    }

    /// Session options derived from this configuration
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            timings: self.voice.timings,
            output_locale: self.voice.output_locale.clone(),
            greeting: self.voice.greeting,
            resolver_timeout: self.resolver_timeout,
        }
    }
}

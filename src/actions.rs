//! Command actions
//!
//! Maps a resolved command type to a web resource and opens it. The table is
//! static; unknown types have no action.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::{Error, Result};

/// How a command type builds its locator
#[derive(Debug, Clone, Copy)]
enum Template {
    /// Prefix followed by the percent-encoded user input
    Query(&'static str),
    /// Locator independent of the input
    Fixed(&'static str),
}

/// Command type to locator template
const ACTIONS: &[(&str, Template)] = &[
    ("google-search", Template::Query("https://www.google.com/search?q=")),
    ("calculator-open", Template::Fixed("https://www.google.com/search?q=calculator")),
    ("instagram-open", Template::Fixed("https://www.instagram.com/")),
    ("facebook-open", Template::Fixed("https://www.facebook.com/")),
    ("weather-show", Template::Fixed("https://www.google.com/search?q=weather")),
    ("youtube-search", Template::Query("https://www.youtube.com/results?search_query=")),
    ("youtube-play", Template::Query("https://www.youtube.com/results?search_query=")),
];

/// A resource the assistant can open (always an absolute URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocator(String);

impl ResourceLocator {
    /// The locator as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Look up the resource for a command
///
/// Exact match on `kind`; `None` for unknown types.
#[must_use]
pub fn dispatch(kind: &str, user_input: &str) -> Option<ResourceLocator> {
    let (_, template) = ACTIONS.iter().find(|(k, _)| *k == kind)?;

    let url = match template {
        Template::Query(prefix) => format!("{prefix}{}", urlencoding::encode(user_input)),
        Template::Fixed(url) => (*url).to_string(),
    };

    Some(ResourceLocator(url))
}

/// Command types that have an action
pub fn known_types() -> impl Iterator<Item = &'static str> {
    ACTIONS.iter().map(|(k, _)| *k)
}

/// Opens a resource locator
#[async_trait]
pub trait ResourceOpener: Send + Sync {
    /// Open the resource
    ///
    /// # Errors
    ///
    /// Returns error if the resource cannot be opened
    async fn open(&self, locator: &ResourceLocator) -> Result<()>;
}

/// Opens resources with the platform URL handler
#[derive(Debug, Clone)]
pub struct SystemOpener {
    program: PathBuf,
    args: Vec<String>,
}

impl SystemOpener {
    /// Locate the platform URL handler
    ///
    /// # Errors
    ///
    /// Returns error if no handler is installed
    pub fn detect() -> Result<Self> {
        let (bin, args): (&str, &[&str]) = if cfg!(target_os = "macos") {
            ("open", &[])
        } else if cfg!(target_os = "windows") {
            ("cmd", &["/C", "start", ""])
        } else {
            ("xdg-open", &[])
        };

        let program = which::which(bin)
            .map_err(|e| Error::Open(format!("{bin} not found: {e}")))?;

        tracing::debug!(program = %program.display(), "resource opener detected");

        Ok(Self {
            program,
            args: args.iter().map(|a| (*a).to_string()).collect(),
        })
    }
}

#[async_trait]
impl ResourceOpener for SystemOpener {
    async fn open(&self, locator: &ResourceLocator) -> Result<()> {
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(locator.as_str())
            .status()
            .await?;

        if !status.success() {
            return Err(Error::Open(format!(
                "{} exited with {status}",
                self.program.display()
            )));
        }

        tracing::info!(url = %locator, "opened resource");
        Ok(())
    }
}

/// Logs resources instead of opening them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOpener;

#[async_trait]
impl ResourceOpener for LogOpener {
    async fn open(&self, locator: &ResourceLocator) -> Result<()> {
        tracing::info!(url = %locator, "resource not opened (opening disabled)");
        Ok(())
    }
}

//! Command resolution boundary
//!
//! A resolver maps free-form user text to a structured [`Command`]. The HTTP
//! implementation lives in [`crate::backend`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Structured command returned by the resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Command type (e.g. "youtube-search"); empty when absent
    #[serde(rename = "type", default)]
    pub kind: String,

    /// The part of the request the action applies to
    #[serde(default)]
    pub user_input: String,

    /// Reply to show and speak
    pub response: String,
}

impl Command {
    /// Build a command
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        user_input: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            user_input: user_input.into(),
            response: response.into(),
        }
    }
}

/// Who is asking, passed along with each query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    /// User display name
    pub user_name: Option<String>,
    /// Assistant name (wake phrase)
    pub assistant_name: Option<String>,
}

/// Maps user text to a command
#[async_trait]
pub trait CommandResolver: Send + Sync {
    /// Resolve a query
    ///
    /// # Errors
    ///
    /// Returns error if the remote call fails or the reply is malformed
    async fn resolve(&self, query: &str, context: &UserContext) -> Result<Command>;
}

//! HTTP client for the assistant backend
//!
//! Every request carries the session cookie. The backend owns prompt
//! construction and persistence; this side only moves JSON.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::COOKIE;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use url::Url;

use crate::history::HistoryStore;
use crate::profile::UserProfile;
use crate::resolver::{Command, CommandResolver, UserContext};
use crate::{Error, Result};

const ASK_PATH: &str = "api/user/asktoassistant";
const HISTORY_PATH: &str = "api/user/history";
const CURRENT_USER_PATH: &str = "api/user/current";
const LOGOUT_PATH: &str = "api/auth/logout";

/// Backend client implementing resolution and history persistence
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    /// Create a client for the backend at `server_url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or not http(s)
    pub fn new(server_url: &str, token: Option<SecretString>) -> Result<Self> {
        let mut base = Url::parse(server_url)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "server url must be http or https: {server_url}"
            )));
        }
        // keep the last path segment when joining
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base,
            token,
        })
    }

    /// Base URL requests are joined to
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// Fetch the logged-in user's profile
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body is not a profile
    pub async fn fetch_profile(&self) -> Result<UserProfile> {
        let response = self
            .request(reqwest::Method::GET, CURRENT_USER_PATH)?
            .send()
            .await?;
        let response = check(response, "fetch profile", Error::Profile).await?;
        let profile: UserProfile = response.json().await?;

        tracing::info!(
            user = profile.name.as_deref().unwrap_or("-"),
            history = profile.history.len(),
            "profile loaded"
        );
        Ok(profile)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let url = self.base.join(path)?;
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.header(COOKIE, format!("token={}", token.expose_secret()));
        }
        Ok(builder)
    }
}

/// Fail on non-success status, classifying the failure with `kind`
async fn check(
    response: reqwest::Response,
    what: &str,
    kind: fn(String) -> Error,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(%status, body = %body, what, "backend rejected request");
    Err(rejection(what, status, &body, kind))
}

fn rejection(what: &str, status: StatusCode, body: &str, kind: fn(String) -> Error) -> Error {
    kind(format!("{what} failed with {status}: {body}"))
}

#[derive(Serialize)]
struct AskRequest<'a> {
    command: &'a str,
}

#[derive(Serialize)]
struct AppendRequest<'a> {
    entry: &'a str,
}

#[derive(Serialize)]
struct ReplaceRequest<'a> {
    history: &'a [String],
}

#[async_trait]
impl CommandResolver for HttpBackend {
    async fn resolve(&self, query: &str, context: &UserContext) -> Result<Command> {
        tracing::debug!(
            query,
            user = context.user_name.as_deref().unwrap_or("-"),
            "resolving"
        );

        let response = self
            .request(reqwest::Method::POST, ASK_PATH)?
            .json(&AskRequest { command: query })
            .send()
            .await
            .map_err(|e| Error::Resolver(e.to_string()))?;

        let response = check(response, "resolve", Error::Resolver).await?;
        let body = response
            .text()
            .await
            .map_err(|e| Error::Resolver(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| Error::Resolver(format!("malformed command: {e}")))
    }
}

#[async_trait]
impl HistoryStore for HttpBackend {
    async fn append_history(&self, entry: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, HISTORY_PATH)?
            .json(&AppendRequest { entry })
            .send()
            .await?;
        check(response, "append history", Error::Persistence).await?;
        Ok(())
    }

    async fn replace_history(&self, history: &[String]) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, HISTORY_PATH)?
            .json(&ReplaceRequest { history })
            .send()
            .await?;
        check(response, "replace history", Error::Persistence).await?;
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        let response = self
            .request(reqwest::Method::GET, LOGOUT_PATH)?
            .send()
            .await?;
        check(response, "logout", Error::Persistence).await?;
        tracing::info!("logged out");
        Ok(())
    }
}

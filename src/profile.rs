//! User profile as provided by the surrounding application

use serde::{Deserialize, Serialize};

use crate::resolver::UserContext;
use crate::voice::{Greeting, WakePhrase};

/// Authenticated user's profile
///
/// Every field may be missing; a missing assistant name disables the wake
/// phrase, a missing history starts empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User display name
    #[serde(default)]
    pub name: Option<String>,

    /// Assistant name, used as the wake phrase
    #[serde(default)]
    pub assistant_name: Option<String>,

    /// Previously submitted queries, oldest first
    #[serde(default)]
    pub history: Vec<String>,
}

impl UserProfile {
    /// Wake phrase matcher for this user
    #[must_use]
    pub fn wake_phrase(&self) -> WakePhrase {
        WakePhrase::new(self.assistant_name.as_deref())
    }

    /// Context passed to the resolver
    #[must_use]
    pub fn context(&self) -> UserContext {
        UserContext {
            user_name: self.name.clone(),
            assistant_name: self.assistant_name.clone(),
        }
    }

    /// Greeting shown and spoken when the session attaches
    #[must_use]
    pub fn greeting(&self) -> Greeting {
        let user = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("GUEST");
        let assistant = self
            .assistant_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(|| "ASSISTANT".to_string(), |n| format!("{}_AI", n.to_uppercase()));

        Greeting {
            display: format!("SYSTEM: [{assistant}] ONLINE. USER_ID: {user}. QUERY?"),
            spoken: format!("ACCESS_GRANTED. USER: {user}. SYSTEM_READY."),
        }
    }
}

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserOptions {
    #[serde(default = "default_true")]
    pub scrobble: bool,
    #[serde(default)]
    pub sync_favorites: bool,
}

fn default_true() -> bool {
    true
}

impl Default for UserOptions {
    fn default() -> Self {
        Self {
            scrobble: true,
            sync_favorites: false,
        }
    }
}

/// A local user linked to a Last.fm account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteUser {
    pub local_user_id: String,
    /// Credentials used against the local library on this user's behalf.
    pub library_username: String,
    #[serde(default, skip_serializing)]
    pub library_password: String,
    pub lastfm_username: String,
    #[serde(default, skip_serializing)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub options: UserOptions,
}

impl RemoteUser {
    pub fn session_key(&self) -> Option<&str> {
        self.session_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn has_session(&self) -> bool {
        self.session_key().is_some()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 255))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: String,
    pub key: String,
    pub subscriber: bool,
}

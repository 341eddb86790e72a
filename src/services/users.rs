use crate::models::RemoteUser;
use std::path::Path;

/// Linked accounts, loaded once at startup. Editing happens outside the bridge.
#[derive(Debug, Default)]
pub struct UserStore {
    users: Vec<RemoteUser>,
}

impl UserStore {
    pub fn new(users: Vec<RemoteUser>) -> Self {
        Self { users }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!("Users file {} not found, no accounts linked", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let users: Vec<RemoteUser> = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid users file {}: {}", path.display(), e))?;

        tracing::info!("Loaded {} linked Last.fm users", users.len());
        Ok(Self::new(users))
    }

    pub fn get(&self, local_user_id: &str) -> Option<&RemoteUser> {
        self.users.iter().find(|u| u.local_user_id == local_user_id)
    }

    /// Users that have completed the Last.fm login.
    pub fn with_session(&self) -> Vec<RemoteUser> {
        self.users
            .iter()
            .filter(|u| u.has_session())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

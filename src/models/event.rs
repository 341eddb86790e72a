use super::Track;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackEvent {
    pub track: Track,
    /// Position reached when the event fired, if the player reported one.
    #[serde(default, rename = "position_seconds", with = "super::track::duration_secs")]
    pub position: Option<Duration>,
    #[serde(default)]
    pub played_to_completion: bool,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

impl PlaybackEvent {
    pub fn primary_user(&self) -> Option<&str> {
        self.user_ids.first().map(String::as_str)
    }
}

/// Why user data for an item was saved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaveReason {
    PlaybackStart,
    PlaybackProgress,
    PlaybackFinished,
    TogglePlayed,
    UpdateUserRating,
    Import,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserDataSaved {
    pub user_id: String,
    pub track: Track,
    pub is_favorite: bool,
    pub reason: SaveReason,
    /// Set when the write was made by the loved tracks import.
    #[serde(default, skip_deserializing)]
    pub during_sync: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    PlaybackStarted(PlaybackEvent),
    PlaybackStopped(PlaybackEvent),
    UserDataSaved(UserDataSaved),
}

impl MediaEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MediaEvent::PlaybackStarted(_) => "playback_started",
            MediaEvent::PlaybackStopped(_) => "playback_stopped",
            MediaEvent::UserDataSaved(_) => "user_data_saved",
        }
    }
}

//! Decides whether a playback event should produce a scrobble or a
//! now-playing notification.
//!
//! Rules are checked in order and the first failure wins:
//!
//! 1. the player reported a position
//! 2. the track is at least [`MIN_TRACK_DURATION`] long
//! 3. at least half the track, or [`MIN_PLAYED_TIME`], was played
//! 4. the user is linked, wants scrobbling and has a session key
//! 5. artist and title are present
//!
//! Now-playing only applies rules 4 and 5.

use crate::models::{PlaybackEvent, RemoteUser, Track};
use std::fmt;
use std::time::Duration;

pub const MIN_TRACK_DURATION: Duration = Duration::from_secs(30);
pub const MIN_PLAYED_TIME: Duration = Duration::from_secs(4 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    UnknownPosition,
    UnknownDuration,
    TooShort,
    NotPlayedEnough,
    NoUser,
    ScrobblingDisabled,
    NoSession,
    MissingMetadata,
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Ineligible::UnknownPosition => "playback position unknown",
            Ineligible::UnknownDuration => "track duration unknown",
            Ineligible::TooShort => "track shorter than 30 seconds",
            Ineligible::NotPlayedEnough => "played less than half and under 4 minutes",
            Ineligible::NoUser => "no linked Last.fm user",
            Ineligible::ScrobblingDisabled => "user does not want to scrobble",
            Ineligible::NoSession => "no session key present",
            Ineligible::MissingMetadata => "missing artist or track name",
        };
        f.write_str(reason)
    }
}

/// Checks a playback-stop event. On success returns the user to scrobble for.
pub fn evaluate_scrobble<'a>(
    event: &PlaybackEvent,
    user: Option<&'a RemoteUser>,
) -> Result<&'a RemoteUser, Ineligible> {
    let track = &event.track;
    let verdict = check_playback(event).and_then(|_| check_user_and_track(track, user));

    if let Err(reason) = verdict {
        tracing::debug!("Not scrobbling '{}': {}", track.title, reason);
    }
    verdict
}

/// Checks a playback-start event for a now-playing notification.
pub fn evaluate_now_playing<'a>(
    track: &Track,
    user: Option<&'a RemoteUser>,
) -> Result<&'a RemoteUser, Ineligible> {
    let verdict = check_user_and_track(track, user);
    if let Err(reason) = verdict {
        tracing::debug!("Not sending now playing for '{}': {}", track.title, reason);
    }
    verdict
}

fn check_playback(event: &PlaybackEvent) -> Result<(), Ineligible> {
    let position = event.position.ok_or(Ineligible::UnknownPosition)?;
    let duration = event.track.duration.ok_or(Ineligible::UnknownDuration)?;

    if duration < MIN_TRACK_DURATION {
        return Err(Ineligible::TooShort);
    }

    // Either threshold is enough.
    let half_played = position.checked_mul(2).map_or(true, |p| p >= duration);
    if !half_played && position < MIN_PLAYED_TIME {
        tracing::debug!(
            "'{}' only played {:.1}%",
            event.track.title,
            position.as_secs_f64() / duration.as_secs_f64() * 100.0
        );
        return Err(Ineligible::NotPlayedEnough);
    }

    Ok(())
}

fn check_user_and_track<'a>(
    track: &Track,
    user: Option<&'a RemoteUser>,
) -> Result<&'a RemoteUser, Ineligible> {
    let user = user.ok_or(Ineligible::NoUser)?;
    if !user.options.scrobble {
        return Err(Ineligible::ScrobblingDisabled);
    }
    if !user.has_session() {
        tracing::info!("No session key present for {}, aborting", user.lastfm_username);
        return Err(Ineligible::NoSession);
    }
    if !track.has_artist_and_title() {
        tracing::info!(
            "Track {} is missing artist ('{}') or track name ('{}') metadata. Not submitting",
            track.id,
            track.artist,
            track.title
        );
        return Err(Ineligible::MissingMetadata);
    }
    Ok(user)
}

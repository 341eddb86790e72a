pub mod event;
pub mod lastfm;
pub mod track;
pub mod user;

pub use event::{MediaEvent, PlaybackEvent, SaveReason, UserDataSaved};
pub use track::{LocalArtist, LovedTrack, PaginatedResult, Track};
pub use user::{LoginRequest, RemoteUser, SessionInfo, UserOptions};

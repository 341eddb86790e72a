pub mod dedup;
pub mod eligibility;
pub mod events;
pub mod import_job;
pub mod job;
pub mod lastfm;
pub mod library;
pub mod loved_tracks;
pub mod navidrome;
pub mod reconciler;
pub mod scrobbler;
pub mod signer;
pub mod users;

pub use events::{EventHub, EventPublisher};
pub use import_job::{ImportLovedTracksJob, SyncController, SyncStatus};
pub use job::SyncScope;
pub use lastfm::{LastfmApi, LastfmClient};
pub use loved_tracks::LovedTracksPaginator;
pub use navidrome::NavidromeClient;
pub use scrobbler::Scrobbler;
pub use users::UserStore;

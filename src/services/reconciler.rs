use crate::models::{LocalArtist, LovedTrack, RemoteUser, SaveReason, Track};
use crate::services::job::Cancelled;
use crate::services::library::LibraryService;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Characters dropped before comparing titles.
const STRIPPED_CHARS: &[char] = &[
    '~', '#', '%', '&', '*', '{', '}', '/', ':', '<', '>', '?', ',', '-', '.', '(', ')', '|', '"',
];

/// Marks local tracks as favorites when the user loved them on Last.fm.
pub struct LibraryReconciler {
    library: Arc<dyn LibraryService>,
}

impl LibraryReconciler {
    pub fn new(library: Arc<dyn LibraryService>) -> Self {
        Self { library }
    }

    /// Returns the number of local tracks matched.
    pub async fn reconcile(
        &self,
        user: &RemoteUser,
        artists: &[LocalArtist],
        loved: Vec<LovedTrack>,
        cancel: &CancellationToken,
    ) -> Result<usize, Cancelled> {
        let loved_by_artist = group_by_artist(loved);
        if loved_by_artist.is_empty() {
            tracing::info!(
                "{} has no loved tracks with a MusicBrainz artist id",
                user.lastfm_username
            );
            return Ok(0);
        }

        let mut matched = 0;

        for artist in artists {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            let Some(mbid) = artist.musicbrainz_id.as_deref().filter(|id| !id.is_empty()) else {
                continue;
            };
            let Some(candidates) = loved_by_artist.get(mbid) else {
                continue;
            };

            let tracks = match self.library.artist_tracks(user, artist).await {
                Ok(tracks) => tracks,
                Err(e) => {
                    tracing::warn!("Failed to list tracks for artist {}: {}", artist.name, e);
                    continue;
                }
            };

            for track in &tracks {
                let Some(loved_track) = find_match(track, candidates) else {
                    continue;
                };

                tracing::info!(
                    "Match found: {}-{} <== Last.fm :: Library ==> {}-{}",
                    loved_track.artist_name,
                    loved_track.title,
                    artist.name,
                    track.title
                );
                matched += 1;

                if let Err(e) = self
                    .library
                    .set_favorite(user, track, true, SaveReason::UpdateUserRating)
                    .await
                {
                    tracing::warn!("Failed to mark '{}' as favorite: {}", track.title, e);
                }
            }
        }

        Ok(matched)
    }
}

fn group_by_artist(loved: Vec<LovedTrack>) -> HashMap<String, Vec<LovedTrack>> {
    let mut grouped: HashMap<String, Vec<LovedTrack>> = HashMap::new();
    for track in loved {
        let Some(mbid) = track.artist_mbid().map(str::to_string) else {
            continue;
        };
        grouped.entry(mbid).or_default().push(track);
    }
    grouped
}

/// Scans every candidate; when several match, the last one is kept.
fn find_match<'a>(track: &Track, candidates: &'a [LovedTrack]) -> Option<&'a LovedTrack> {
    let mut found = None;
    for candidate in candidates {
        if is_like(&track.title, &candidate.title) {
            found = Some(candidate);
        }
    }
    found
}

/// Loose title equality: punctuation, whitespace, accents and case are ignored.
pub fn is_like(a: &str, b: &str) -> bool {
    sanitize_title(a) == sanitize_title(b)
}

pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() || STRIPPED_CHARS.contains(&c) || is_combining_mark(c) {
            continue;
        }
        match fold_diacritic(c) {
            Some(folded) => out.push_str(folded),
            None => out.push(c),
        }
    }
    out
}

/// Combining Diacritical Marks block, left over when a title arrives decomposed.
fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

/// Lowercase Latin-1 Supplement, Latin Extended-A, the accented letters of
/// Latin Extended-B (including Romanian comma-below) and the Vietnamese block
/// of Latin Extended Additional. Other scripts pass through unchanged.
fn fold_diacritic(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' | 'ǎ' | 'ǟ' | 'ǡ' | 'ǻ' | 'ȁ' | 'ȃ'
        | 'ȧ' | 'ạ' | 'ả' | 'ấ' | 'ầ' | 'ẩ' | 'ẫ' | 'ậ' | 'ắ' | 'ằ' | 'ẳ' | 'ẵ' | 'ặ' => "a",
        'æ' | 'ǣ' | 'ǽ' => "ae",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' | 'ȅ' | 'ȇ' | 'ȩ' | 'ẹ' | 'ẻ' | 'ẽ'
        | 'ế' | 'ề' | 'ể' | 'ễ' | 'ệ' => "e",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' | 'ǧ' | 'ǵ' => "g",
        'ĥ' | 'ħ' | 'ȟ' => "h",
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' | 'ǐ' | 'ȉ' | 'ȋ' | 'ỉ' | 'ị' => "i",
        'ĵ' | 'ǰ' => "j",
        'ķ' | 'ǩ' => "k",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "l",
        'ñ' | 'ń' | 'ņ' | 'ň' | 'ǹ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' | 'ơ' | 'ǒ' | 'ǫ' | 'ǭ' | 'ǿ' | 'ȍ'
        | 'ȏ' | 'ȫ' | 'ȭ' | 'ȯ' | 'ȱ' | 'ọ' | 'ỏ' | 'ố' | 'ồ' | 'ổ' | 'ỗ' | 'ộ' | 'ớ' | 'ờ'
        | 'ở' | 'ỡ' | 'ợ' => "o",
        'œ' => "oe",
        'ŕ' | 'ŗ' | 'ř' | 'ȑ' | 'ȓ' => "r",
        'ś' | 'ŝ' | 'ş' | 'š' | 'ș' => "s",
        'ß' => "ss",
        'ţ' | 'ť' | 'ŧ' | 'ț' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' | 'ư' | 'ǔ' | 'ǖ' | 'ǘ' | 'ǚ'
        | 'ǜ' | 'ȕ' | 'ȗ' | 'ụ' | 'ủ' | 'ứ' | 'ừ' | 'ử' | 'ữ' | 'ự' => "u",
        'ŵ' => "w",
        'ý' | 'ÿ' | 'ŷ' | 'ȳ' | 'ỳ' | 'ỵ' | 'ỷ' | 'ỹ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::models::UserOptions;
    use crate::services::loved_tracks::tests::loved;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory library: artists with their tracks, recording favorite writes.
    #[derive(Default)]
    pub struct FakeLibrary {
        pub artists: Vec<LocalArtist>,
        pub tracks: HashMap<String, Vec<Track>>,
        pub favorites: Mutex<Vec<(String, bool, SaveReason)>>,
        pub failing_artist: Option<String>,
    }

    #[async_trait]
    impl LibraryService for FakeLibrary {
        async fn artists(&self, _: &RemoteUser) -> Result<Vec<LocalArtist>> {
            Ok(self.artists.clone())
        }

        async fn artist_tracks(&self, _: &RemoteUser, artist: &LocalArtist) -> Result<Vec<Track>> {
            if self.failing_artist.as_deref() == Some(artist.id.as_str()) {
                return Err(AppError::Library("boom".into()));
            }
            Ok(self.tracks.get(&artist.id).cloned().unwrap_or_default())
        }

        async fn set_favorite(
            &self,
            _: &RemoteUser,
            track: &Track,
            favorite: bool,
            reason: SaveReason,
        ) -> Result<()> {
            self.favorites
                .lock()
                .unwrap()
                .push((track.id.clone(), favorite, reason));
            Ok(())
        }
    }

    pub fn artist(id: &str, mbid: Option<&str>) -> LocalArtist {
        LocalArtist {
            id: id.into(),
            name: format!("Artist {}", id),
            musicbrainz_id: mbid.map(Into::into),
        }
    }

    pub fn track(id: &str, title: &str) -> Track {
        Track {
            id: id.into(),
            title: title.into(),
            artist: "Artist".into(),
            album: None,
            album_artist: None,
            musicbrainz_id: None,
            duration: None,
        }
    }

    pub fn user() -> RemoteUser {
        RemoteUser {
            local_user_id: "u1".into(),
            library_username: "alice".into(),
            library_password: String::new(),
            lastfm_username: "alice_fm".into(),
            session_key: Some("sk".into()),
            options: UserOptions {
                scrobble: true,
                sync_favorites: true,
            },
        }
    }

    #[test]
    fn test_sanitize_ignores_punctuation_accents_and_case() {
        assert!(is_like("Häagen-Dazs (Live)", "Haagen Dazs Live"));
        assert!(is_like("Paranoid Android", "PARANOID ANDROID"));
        assert!(is_like("What's Up?", "What's up"));
        assert!(is_like("Ça   plane pour moi", "ca plane pour moi"));
        assert!(!is_like("Creep", "Creep (Acoustic)"));
        assert_eq!(sanitize_title("A/B: C|D \"E\""), "abcde");
    }

    #[test]
    fn test_sanitize_folds_extended_latin_and_decomposed_marks() {
        assert!(is_like("Ștefan și Țara", "Stefan si Tara"));
        assert!(is_like("Người Ơi", "Nguoi Oi"));
        assert!(is_like("Ǎ Lő", "a lo"));
        assert!(is_like("Cafe\u{0301} del Mar", "Café del Mar"));
        assert_eq!(sanitize_title("Ключ"), "ключ");
    }

    #[tokio::test]
    async fn test_reconcile_marks_matches_as_favorites() {
        let library = Arc::new(FakeLibrary {
            artists: vec![artist("a1", Some("mb-1")), artist("a2", Some("mb-2"))],
            tracks: HashMap::from([
                ("a1".into(), vec![track("t1", "Karma Police"), track("t2", "Airbag")]),
                ("a2".into(), vec![track("t3", "Häagen-Dazs (Live)")]),
            ]),
            ..Default::default()
        });
        let reconciler = LibraryReconciler::new(library.clone());

        let loved_tracks = vec![
            loved("mb-1", "karma police"),
            loved("mb-2", "Haagen Dazs Live"),
            loved("mb-3", "Airbag"),
        ];

        let matched = reconciler
            .reconcile(&user(), &library.artists, loved_tracks, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(matched, 2);
        let favorites = library.favorites.lock().unwrap().clone();
        assert_eq!(
            favorites,
            vec![
                ("t1".to_string(), true, SaveReason::UpdateUserRating),
                ("t3".to_string(), true, SaveReason::UpdateUserRating),
            ]
        );
    }

    #[tokio::test]
    async fn test_artist_without_mbid_never_matches() {
        let library = Arc::new(FakeLibrary {
            artists: vec![artist("a1", None)],
            tracks: HashMap::from([("a1".into(), vec![track("t1", "Karma Police")])]),
            ..Default::default()
        });
        let reconciler = LibraryReconciler::new(library.clone());

        let matched = reconciler
            .reconcile(
                &user(),
                &library.artists,
                vec![loved("mb-1", "Karma Police")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(matched, 0);
        assert!(library.favorites.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_loved_tracks_without_artist_mbid_are_dropped() {
        let library = Arc::new(FakeLibrary {
            artists: vec![artist("a1", Some("mb-1"))],
            tracks: HashMap::from([("a1".into(), vec![track("t1", "Karma Police")])]),
            ..Default::default()
        });
        let reconciler = LibraryReconciler::new(library.clone());
        let mut orphan = loved("", "Karma Police");
        orphan.artist_mbid = None;

        let matched = reconciler
            .reconcile(&user(), &library.artists, vec![orphan], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(matched, 0);
    }

    #[test]
    fn test_last_matching_loved_track_wins() {
        // Suspect: the linear scan keeps the last hit rather than the first.
        // Kept as-is; matched entries differ only in artist name here.
        let mut first = loved("mb-1", "Intro");
        first.artist_name = "First".into();
        let mut second = loved("mb-1", "INTRO");
        second.artist_name = "Second".into();
        let candidates = vec![first, loved("mb-1", "Outro"), second];

        let found = find_match(&track("t1", "intro"), &candidates).unwrap();
        assert_eq!(found.artist_name, "Second");
    }

    #[tokio::test]
    async fn test_failing_artist_is_skipped() {
        let library = Arc::new(FakeLibrary {
            artists: vec![artist("a1", Some("mb-1")), artist("a2", Some("mb-1"))],
            tracks: HashMap::from([
                ("a1".into(), vec![track("t1", "Song")]),
                ("a2".into(), vec![track("t2", "Song")]),
            ]),
            failing_artist: Some("a1".into()),
            ..Default::default()
        });
        let reconciler = LibraryReconciler::new(library.clone());

        let matched = reconciler
            .reconcile(&user(), &library.artists, vec![loved("mb-1", "Song")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(matched, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_artist() {
        let library = Arc::new(FakeLibrary {
            artists: vec![artist("a1", Some("mb-1"))],
            tracks: HashMap::from([("a1".into(), vec![track("t1", "Song")])]),
            ..Default::default()
        });
        let reconciler = LibraryReconciler::new(library.clone());
        let token = CancellationToken::new();
        token.cancel();

        let result = reconciler
            .reconcile(&user(), &library.artists, vec![loved("mb-1", "Song")], &token)
            .await;
        assert_eq!(result, Err(Cancelled));
        assert!(library.favorites.lock().unwrap().is_empty());
    }
}

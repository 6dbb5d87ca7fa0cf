//! Song identity resolution against a target provider.
//!
//! Scores provider search results by weighted title, artist and duration
//! similarity. "No match" is an outcome, not an error: the caller decides
//! whether to skip the song or create it on the target.

use std::collections::HashMap;

use serde::Serialize;

use crate::entities;
use crate::matching::normalize::normalize;
use crate::ports::provider::{ProviderClient, ProviderError, ProviderKind, ProviderTrack};

/// Minimum score for a primary match.
pub const CONFIDENT_MATCH: f64 = 0.6;
/// Minimum score to be reported as an alternative for disambiguation.
pub const ALTERNATIVE_FLOOR: f64 = 0.4;

const TITLE_WEIGHT: f64 = 0.45;
const ARTIST_WEIGHT: f64 = 0.40;
const DURATION_WEIGHT: f64 = 0.15;

/// Duration difference (seconds) scoring full marks.
const DURATION_TIGHT_SECS: f64 = 3.0;
/// Duration difference at which the duration term reaches zero.
const DURATION_MAX_SECS: f64 = 15.0;

const SEARCH_LIMIT: usize = 10;

/// Provider-independent view of the song being resolved.
#[derive(Debug, Clone)]
pub struct SongCandidate {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_seconds: Option<i32>,
    pub provider_ids: HashMap<ProviderKind, String>,
}

impl SongCandidate {
    pub fn provider_id(&self, provider: ProviderKind) -> Option<&str> {
        self.provider_ids.get(&provider).map(String::as_str)
    }
}

impl From<&entities::playlist_song::Model> for SongCandidate {
    fn from(song: &entities::playlist_song::Model) -> Self {
        let mut provider_ids = HashMap::new();
        for provider in [
            ProviderKind::Spotify,
            ProviderKind::AppleMusic,
            ProviderKind::AmazonMusic,
        ] {
            if let Some(id) = song.provider_id(provider) {
                provider_ids.insert(provider, id.to_string());
            }
        }
        Self {
            title: song.title.clone(),
            artist: song.artist.clone(),
            album: song.album.clone(),
            duration_seconds: song.duration_seconds,
            provider_ids,
        }
    }
}

/// One scored search result.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredTrack {
    pub track: ProviderTrack,
    pub confidence: f64,
}

/// Outcome of resolving one song against one provider.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    /// Provider-native id of the primary match, `None` when nothing scored
    /// at or above [`CONFIDENT_MATCH`].
    pub provider_id: Option<String>,
    pub confidence: f64,
    /// Every result scoring at or above [`ALTERNATIVE_FLOOR`], best first.
    pub alternatives: Vec<ScoredTrack>,
}

impl MatchResult {
    fn known(provider_id: String) -> Self {
        Self {
            provider_id: Some(provider_id),
            confidence: 1.0,
            alternatives: Vec::new(),
        }
    }

    fn no_match() -> Self {
        Self {
            provider_id: None,
            confidence: 0.0,
            alternatives: Vec::new(),
        }
    }
}

/// Resolve `candidate` against the adapter's provider.
///
/// A song that already carries the target provider's id short-circuits with
/// confidence 1.0 and performs no network call.
pub async fn resolve(
    adapter: &dyn ProviderClient,
    token: &str,
    candidate: &SongCandidate,
) -> Result<MatchResult, ProviderError> {
    if let Some(id) = candidate.provider_id(adapter.kind()) {
        return Ok(MatchResult::known(id.to_string()));
    }

    let query = format!("{} {}", normalize(&candidate.title), normalize(&candidate.artist));
    let results = adapter.search(query.trim(), token, SEARCH_LIMIT).await?;
    Ok(rank(candidate, results))
}

/// Deterministically rank provider results against the candidate. Ties are
/// broken by the earlier position in the provider's own ordering.
pub fn rank(candidate: &SongCandidate, results: Vec<ProviderTrack>) -> MatchResult {
    let norm_title = normalize(&candidate.title);
    let norm_artist = normalize(&candidate.artist);

    let mut scored: Vec<(usize, f64, ProviderTrack)> = results
        .into_iter()
        .enumerate()
        .map(|(index, track)| {
            let score = score_track(&norm_title, &norm_artist, candidate.duration_seconds, &track);
            (index, score, track)
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let alternatives: Vec<ScoredTrack> = scored
        .into_iter()
        .filter(|(_, score, _)| *score >= ALTERNATIVE_FLOOR)
        .map(|(_, confidence, track)| ScoredTrack { track, confidence })
        .collect();

    match alternatives.first() {
        Some(best) if best.confidence >= CONFIDENT_MATCH => MatchResult {
            provider_id: Some(best.track.id.clone()),
            confidence: best.confidence,
            alternatives,
        },
        _ => MatchResult {
            alternatives,
            ..MatchResult::no_match()
        },
    }
}

fn score_track(
    norm_title: &str,
    norm_artist: &str,
    duration_seconds: Option<i32>,
    track: &ProviderTrack,
) -> f64 {
    let title_sim = field_similarity(norm_title, &normalize(&track.title));
    let artist_sim = field_similarity(norm_artist, &normalize(&track.artist));
    let duration_sim = duration_closeness(duration_seconds, track.duration_seconds);

    TITLE_WEIGHT * title_sim + ARTIST_WEIGHT * artist_sim + DURATION_WEIGHT * duration_sim
}

/// Similarity of two normalized fields: exact match wins, otherwise the
/// better of Jaro-Winkler and substring containment.
fn field_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let jw = jaro_winkler::jaro_winkler(a, b);
    let containment = if a.contains(b) || b.contains(a) { 0.9 } else { 0.0 };
    jw.max(containment)
}

/// 1.0 within [`DURATION_TIGHT_SECS`], decaying linearly to 0.0 at
/// [`DURATION_MAX_SECS`]. Unknown duration on either side is neutral.
fn duration_closeness(a: Option<i32>, b: Option<i32>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    let diff = (i64::from(a) - i64::from(b)).abs() as f64;
    if diff <= DURATION_TIGHT_SECS {
        1.0
    } else if diff >= DURATION_MAX_SECS {
        0.0
    } else {
        (DURATION_MAX_SECS - diff) / (DURATION_MAX_SECS - DURATION_TIGHT_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::provider::MockProviderClient;

    fn candidate(title: &str, artist: &str, duration: Option<i32>) -> SongCandidate {
        SongCandidate {
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            duration_seconds: duration,
            provider_ids: HashMap::new(),
        }
    }

    fn track(id: &str, title: &str, artist: &str, duration: Option<i32>) -> ProviderTrack {
        ProviderTrack {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            duration_seconds: duration,
            cover_image_url: None,
        }
    }

    #[tokio::test]
    async fn known_provider_id_short_circuits_without_search() {
        let mut adapter = MockProviderClient::new();
        adapter.expect_kind().return_const(ProviderKind::Spotify);
        adapter.expect_search().times(0);

        let mut song = candidate("Song 1", "Example Artist", Some(180));
        song.provider_ids
            .insert(ProviderKind::Spotify, "sp-123".to_string());

        let result = resolve(&adapter, "token", &song).await.unwrap();
        assert_eq!(result.provider_id.as_deref(), Some("sp-123"));
        assert_eq!(result.confidence, 1.0);
        assert!(result.alternatives.is_empty());
    }

    #[test]
    fn closer_duration_wins() {
        let song = candidate("Song 1", "Example Artist", Some(180));
        let results = vec![
            track("far", "Song 1", "Example Artist", Some(220)),
            track("near", "Song 1", "Example Artist", Some(181)),
        ];

        let ranked = rank(&song, results);
        assert_eq!(ranked.provider_id.as_deref(), Some("near"));
        assert!(ranked.confidence > CONFIDENT_MATCH);
        assert_eq!(ranked.alternatives.len(), 2);
        assert!(ranked.alternatives[0].confidence > ranked.alternatives[1].confidence);
    }

    #[test]
    fn no_result_above_threshold_is_an_outcome_not_an_error() {
        let song = candidate("Completely Different", "Someone Else", Some(180));
        let results = vec![track("x", "Unrelated Tune", "Another Band", Some(400))];

        let ranked = rank(&song, results);
        assert_eq!(ranked.provider_id, None);
        assert_eq!(ranked.confidence, 0.0);
    }

    #[test]
    fn unknown_duration_is_neutral() {
        assert_eq!(duration_closeness(None, Some(180)), 0.0);
        assert_eq!(duration_closeness(Some(180), None), 0.0);
        assert_eq!(duration_closeness(Some(180), Some(181)), 1.0);
        assert_eq!(duration_closeness(Some(180), Some(200)), 0.0);
        let mid = duration_closeness(Some(180), Some(189));
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn ties_break_on_provider_order() {
        let song = candidate("Song 1", "Example Artist", None);
        let results = vec![
            track("first", "Song 1", "Example Artist", None),
            track("second", "Song 1", "Example Artist", None),
        ];

        let ranked = rank(&song, results);
        assert_eq!(ranked.provider_id.as_deref(), Some("first"));
    }

    #[test]
    fn alternatives_include_everything_above_floor() {
        let song = candidate("Song 1", "Example Artist", Some(180));
        let results = vec![
            track("good", "Song 1", "Example Artist", Some(180)),
            track("partial", "Song 1", "Nobody Known", None),
            track("bad", "zzz", "qqq", None),
        ];

        let ranked = rank(&song, results);
        assert_eq!(ranked.provider_id.as_deref(), Some("good"));
        // "partial" clears the floor on its exact title match alone.
        assert_eq!(ranked.alternatives.len(), 2);
        assert_eq!(ranked.alternatives[1].track.id, "partial");
    }

    #[test]
    fn normalization_bridges_formatting_differences() {
        let song = candidate("Don't Stop Me Now", "Queen", Some(209));
        let results = vec![track("q1", "Dont Stop Me Now", "QUEEN", Some(210))];

        let ranked = rank(&song, results);
        assert_eq!(ranked.provider_id.as_deref(), Some("q1"));
        assert!(ranked.confidence > 0.95);
    }
}

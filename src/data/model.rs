use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioFeature – the closed set of numeric audio descriptors
// ---------------------------------------------------------------------------

/// One of the nine numeric audio descriptors carried by every track.
///
/// The enum is the whole contract: a feature name arriving from the UI is
/// either one of these variants or an [`UnknownFeature`] error, so the
/// aggregation functions never see an unvalidated column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFeature {
    Danceability,
    Energy,
    Loudness,
    Speechiness,
    Acousticness,
    Instrumentalness,
    Liveness,
    Valence,
    Tempo,
}

impl AudioFeature {
    /// All nine features, in the order the dashboard presents them.
    pub const ALL: [AudioFeature; 9] = [
        AudioFeature::Danceability,
        AudioFeature::Energy,
        AudioFeature::Loudness,
        AudioFeature::Speechiness,
        AudioFeature::Acousticness,
        AudioFeature::Instrumentalness,
        AudioFeature::Liveness,
        AudioFeature::Valence,
        AudioFeature::Tempo,
    ];

    /// Canonical column name in the source catalog.
    pub fn name(self) -> &'static str {
        match self {
            AudioFeature::Danceability => "danceability",
            AudioFeature::Energy => "energy",
            AudioFeature::Loudness => "loudness",
            AudioFeature::Speechiness => "speechiness",
            AudioFeature::Acousticness => "acousticness",
            AudioFeature::Instrumentalness => "instrumentalness",
            AudioFeature::Liveness => "liveness",
            AudioFeature::Valence => "valence",
            AudioFeature::Tempo => "tempo",
        }
    }
}

impl fmt::Display for AudioFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A feature name that is not one of the nine recognized descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown audio feature '{0}'")]
pub struct UnknownFeature(pub String);

impl FromStr for AudioFeature {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AudioFeature::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Track – one row of the catalog
// ---------------------------------------------------------------------------

/// A single catalog entry: one song's metadata and audio features for one
/// chart year.  The (song, artist) pair is not unique; the same single can
/// recur in several years and each occurrence is its own record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub song: String,
    pub artist: String,
    pub year: i32,
    /// Popularity score, 0-100 in the source catalog.
    pub popularity: f64,
    pub explicit: bool,
    /// Raw genre string; may list several comma-separated genres.
    pub genre: String,
    pub danceability: f64,
    pub energy: f64,
    pub loudness: f64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
    /// Source columns outside the modeled schema (`duration_ms`, `key`, ...),
    /// kept verbatim so an export reproduces the full source row.
    pub extras: BTreeMap<String, String>,
}

impl Track {
    /// Typed accessor for one audio feature.
    pub fn feature(&self, feature: AudioFeature) -> f64 {
        match feature {
            AudioFeature::Danceability => self.danceability,
            AudioFeature::Energy => self.energy,
            AudioFeature::Loudness => self.loudness,
            AudioFeature::Speechiness => self.speechiness,
            AudioFeature::Acousticness => self.acousticness,
            AudioFeature::Instrumentalness => self.instrumentalness,
            AudioFeature::Liveness => self.liveness,
            AudioFeature::Valence => self.valence,
            AudioFeature::Tempo => self.tempo,
        }
    }

    /// Individual genre labels: the genre string split on commas, each token
    /// trimmed, empty tokens dropped.  "pop, rock" yields "pop" then "rock";
    /// an empty or whitespace genre yields nothing.
    pub fn genre_tokens(&self) -> impl Iterator<Item = &str> {
        self.genre
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

// ---------------------------------------------------------------------------
// TrackDataset – the complete loaded catalog
// ---------------------------------------------------------------------------

/// Required source columns, in the canonical order used when a source format
/// does not carry its own column order.
pub const REQUIRED_COLUMNS: [&str; 15] = [
    "song",
    "artist",
    "year",
    "popularity",
    "genre",
    "explicit",
    "danceability",
    "energy",
    "loudness",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
];

/// The full parsed catalog.  Built once by the loader, never mutated; every
/// derived view borrows from it.
#[derive(Debug, Clone)]
pub struct TrackDataset {
    /// All tracks, in source order.  Ranking tie-breaks rely on this order.
    pub tracks: Vec<Track>,
    /// Source column order as read, used to reproduce the schema on export.
    pub columns: Vec<String>,
    /// Distinct chart years present, ascending.
    pub years: BTreeSet<i32>,
}

impl TrackDataset {
    /// Build a dataset from loaded tracks and the source column order.
    pub fn from_tracks(tracks: Vec<Track>, columns: Vec<String>) -> Self {
        let years = tracks.iter().map(|t| t.year).collect();
        TrackDataset {
            tracks,
            columns,
            years,
        }
    }

    /// Number of tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

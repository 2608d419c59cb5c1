use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use super::model::{AudioFeature, Track, TrackDataset, UnknownFeature};

/// Row count shown by the ranking views when the caller does not choose one.
pub const DEFAULT_TOP_N: usize = 10;

/// Bin count for [`popularity_histogram`] when the caller does not choose one.
pub const DEFAULT_HISTOGRAM_BINS: usize = 20;

/// A view parameter was rejected before any aggregation ran.
#[derive(Debug, PartialEq, Error)]
pub enum QueryError {
    /// The parameter value is outside its legal range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A feature name outside the closed nine-variant set.
    #[error(transparent)]
    UnknownFeature(#[from] UnknownFeature),
}

// ---------------------------------------------------------------------------
// View records – owned result rows handed to the presentation layer
// ---------------------------------------------------------------------------

/// One artist in the popularity ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistRanking {
    pub artist: String,
    pub average_popularity: f64,
    /// How many catalog tracks went into the mean.
    pub track_count: usize,
}

/// Mean of one value across all tracks of one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearAverage {
    pub year: i32,
    pub value: f64,
}

/// Track count for one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: usize,
}

/// Track count for one (year, explicit-flag) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplicitYearCount {
    pub year: i32,
    pub explicit: bool,
    pub count: usize,
}

/// Pearson correlations between a set of audio features.
///
/// `values[i][j]` is the correlation between `features[i]` and
/// `features[j]`. The matrix is symmetric and its diagonal is exactly 1.0;
/// correlations that are undefined over the data (constant column, fewer
/// than two rows) are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub features: Vec<AudioFeature>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Correlation between two features, `None` if either is not part of
    /// the matrix.
    pub fn get(&self, a: AudioFeature, b: AudioFeature) -> Option<f64> {
        let i = self.features.iter().position(|&f| f == a)?;
        let j = self.features.iter().position(|&f| f == b)?;
        Some(self.values[i][j])
    }
}

/// One equal-width histogram bin. The final bin is right-inclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Equal-width histogram over the observed value range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub bins: Vec<HistogramBin>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }
}

/// Mean audio profile of one ranked artist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistProfile {
    pub artist: String,
    pub average_popularity: f64,
    pub danceability: f64,
    pub energy: f64,
    pub loudness: f64,
    pub liveness: f64,
    pub tempo: f64,
}

impl ArtistProfile {
    /// Axis values on the shared display scale, see [`TrackProfile::display_axes`].
    pub fn display_axes(&self) -> [(&'static str, f64); 6] {
        display_axes(
            self.danceability,
            self.energy,
            self.liveness,
            self.loudness,
            self.tempo,
            self.average_popularity,
        )
    }
}

/// Audio profile of one ranked track, the radar-chart record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackProfile {
    pub song: String,
    pub artist: String,
    pub popularity: f64,
    pub danceability: f64,
    pub energy: f64,
    pub loudness: f64,
    pub liveness: f64,
    pub tempo: f64,
}

impl TrackProfile {
    fn from_track(track: &Track) -> Self {
        TrackProfile {
            song: track.song.clone(),
            artist: track.artist.clone(),
            popularity: track.popularity,
            danceability: track.danceability,
            energy: track.energy,
            loudness: track.loudness,
            liveness: track.liveness,
            tempo: track.tempo,
        }
    }

    /// Axis values brought onto one display scale so they can share a
    /// radar or stacked-bar plot: danceability, energy and liveness times
    /// 100, loudness times -5 (dB values are negative), tempo divided by
    /// 2.1, popularity unchanged. Consumers rely on these exact factors.
    pub fn display_axes(&self) -> [(&'static str, f64); 6] {
        display_axes(
            self.danceability,
            self.energy,
            self.liveness,
            self.loudness,
            self.tempo,
            self.popularity,
        )
    }
}

fn display_axes(
    danceability: f64,
    energy: f64,
    liveness: f64,
    loudness: f64,
    tempo: f64,
    popularity: f64,
) -> [(&'static str, f64); 6] {
    [
        ("danceability", danceability * 100.0),
        ("energy", energy * 100.0),
        ("liveness", liveness * 100.0),
        ("loudness", loudness * -5.0),
        ("tempo", tempo / 2.1),
        ("popularity", popularity),
    ]
}

/// One point of a feature-vs-feature scatter series, with the labels the
/// hover card shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub song: String,
    pub artist: String,
    pub genre: String,
    pub x: f64,
    pub y: f64,
}

// ---------------------------------------------------------------------------
// Ranking – most-popular tracks and artists
// ---------------------------------------------------------------------------

/// The `n` most popular tracks, popularity descending. Ties keep dataset
/// order, so repeated calls return the same rows. `n` larger than the
/// dataset returns everything.
pub fn top_tracks(ds: &TrackDataset, n: usize) -> Vec<&Track> {
    rank_by_popularity(ds.tracks.iter().collect(), n)
}

/// [`top_tracks`] restricted to one release year. A year absent from the
/// catalog yields an empty ranking, not an error.
pub fn top_tracks_for_year(ds: &TrackDataset, year: i32, n: usize) -> Vec<&Track> {
    rank_by_popularity(ds.tracks.iter().filter(|t| t.year == year).collect(), n)
}

fn rank_by_popularity(mut refs: Vec<&Track>, n: usize) -> Vec<&Track> {
    // Stable sort: equal popularity keeps catalog order.
    refs.sort_by(|a, b| b.popularity.total_cmp(&a.popularity));
    refs.truncate(n);
    refs
}

/// The `n` artists with the highest mean popularity across all of their
/// catalog tracks. Artists are grouped by exact string; equal means are
/// ordered by artist name ascending.
pub fn top_artists_by_average_popularity(
    ds: &TrackDataset,
    n: usize,
) -> Result<Vec<ArtistRanking>, QueryError> {
    if n == 0 {
        return Err(QueryError::InvalidParameter(
            "artist ranking requires n > 0".to_string(),
        ));
    }

    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for track in &ds.tracks {
        let entry = sums.entry(track.artist.as_str()).or_insert((0.0, 0));
        entry.0 += track.popularity;
        entry.1 += 1;
    }

    let mut rankings: Vec<ArtistRanking> = sums
        .into_iter()
        .map(|(artist, (sum, count))| ArtistRanking {
            artist: artist.to_string(),
            average_popularity: sum / count as f64,
            track_count: count,
        })
        .collect();
    rankings.sort_by(|a, b| {
        b.average_popularity
            .total_cmp(&a.average_popularity)
            .then_with(|| a.artist.cmp(&b.artist))
    });
    rankings.truncate(n);
    Ok(rankings)
}

// ---------------------------------------------------------------------------
// Grouping – per-year and per-genre aggregates
// ---------------------------------------------------------------------------

/// Mean of one audio feature per release year, years ascending.
pub fn average_feature_by_year(ds: &TrackDataset, feature: AudioFeature) -> Vec<YearAverage> {
    let mut sums: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for track in &ds.tracks {
        let entry = sums.entry(track.year).or_insert((0.0, 0));
        entry.0 += track.feature(feature);
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(year, (sum, count))| YearAverage {
            year,
            value: sum / count as f64,
        })
        .collect()
}

/// How often each genre token occurs across the catalog.
///
/// Multi-valued genre strings are split on `,` and trimmed; each token
/// counts once per track it appears on. Tracks with an empty genre string
/// contribute nothing, and no synthetic "unknown" bucket is invented.
pub fn genre_counts(ds: &TrackDataset) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for track in &ds.tracks {
        for token in track.genre_tokens() {
            *counts.entry(token.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// Track count per release year, years ascending.
pub fn track_counts_by_year(ds: &TrackDataset) -> Vec<YearCount> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for track in &ds.tracks {
        *counts.entry(track.year).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(year, count)| YearCount { year, count })
        .collect()
}

/// Track count per (year, explicit) pair, years ascending with the
/// non-explicit count before the explicit one.
pub fn explicit_counts_by_year(ds: &TrackDataset) -> Vec<ExplicitYearCount> {
    let mut counts: BTreeMap<(i32, bool), usize> = BTreeMap::new();
    for track in &ds.tracks {
        *counts.entry((track.year, track.explicit)).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|((year, explicit), count)| ExplicitYearCount {
            year,
            explicit,
            count,
        })
        .collect()
}

/// All tracks released in `year`, in catalog order.
pub fn tracks_for_year(ds: &TrackDataset, year: i32) -> Vec<&Track> {
    ds.tracks.iter().filter(|t| t.year == year).collect()
}

// ---------------------------------------------------------------------------
// Correlation – Pearson matrix over the feature columns
// ---------------------------------------------------------------------------

/// Pearson correlation matrix over the requested features.
///
/// Duplicate features are dropped keeping the first occurrence; an empty
/// request is invalid. Rows where any requested feature is non-finite are
/// excluded from every pair so the matrix stays consistent. The diagonal
/// is exactly 1.0 regardless of the data; off-diagonal entries are `NaN`
/// when undefined (constant column, fewer than two rows).
pub fn correlation_matrix(
    ds: &TrackDataset,
    features: &[AudioFeature],
) -> Result<CorrelationMatrix, QueryError> {
    if features.is_empty() {
        return Err(QueryError::InvalidParameter(
            "correlation requires at least one feature".to_string(),
        ));
    }

    let mut unique: Vec<AudioFeature> = Vec::with_capacity(features.len());
    for &feature in features {
        if !unique.contains(&feature) {
            unique.push(feature);
        }
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(ds.len()); unique.len()];
    for track in &ds.tracks {
        if unique.iter().any(|&f| !track.feature(f).is_finite()) {
            continue;
        }
        for (column, &feature) in columns.iter_mut().zip(&unique) {
            column.push(track.feature(feature));
        }
    }

    let n = unique.len();
    let mut values = vec![vec![1.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let r = pearson(&columns[i], &columns[j]);
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    Ok(CorrelationMatrix {
        features: unique,
        values,
    })
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let len = xs.len();
    if len < 2 {
        return f64::NAN;
    }
    let n = len as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        f64::NAN
    } else {
        cov / denom
    }
}

// ---------------------------------------------------------------------------
// Distributions and profiles
// ---------------------------------------------------------------------------

/// Equal-width popularity histogram, `None` year meaning the whole catalog.
///
/// Bins span the observed value range and the final bin is
/// right-inclusive, so the maximum always lands in the last bin. A year
/// with no tracks yields an empty histogram; a single distinct value
/// collapses to one bin.
pub fn popularity_histogram(
    ds: &TrackDataset,
    year: Option<i32>,
    bins: usize,
) -> Result<Histogram, QueryError> {
    if bins == 0 {
        return Err(QueryError::InvalidParameter(
            "histogram requires at least one bin".to_string(),
        ));
    }

    let values: Vec<f64> = ds
        .tracks
        .iter()
        .filter(|t| year.is_none_or(|y| t.year == y))
        .map(|t| t.popularity)
        .collect();
    if values.is_empty() {
        return Ok(Histogram { bins: Vec::new() });
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in &values {
        min = min.min(v);
        max = max.max(v);
    }
    if min == max {
        return Ok(Histogram {
            bins: vec![HistogramBin {
                start: min,
                end: max,
                count: values.len(),
            }],
        });
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in &values {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    let out = counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: min + i as f64 * width,
            end: if i + 1 == bins {
                max
            } else {
                min + (i + 1) as f64 * width
            },
            count,
        })
        .collect();
    Ok(Histogram { bins: out })
}

/// Mean audio profiles of the top-`n` artists from
/// [`top_artists_by_average_popularity`], same ranking and `n > 0` rule.
pub fn artist_profiles(ds: &TrackDataset, n: usize) -> Result<Vec<ArtistProfile>, QueryError> {
    let rankings = top_artists_by_average_popularity(ds, n)?;

    let profiles = rankings
        .into_iter()
        .map(|ranking| {
            let mut sums = [0.0_f64; 5];
            let mut count = 0usize;
            for track in ds.tracks.iter().filter(|t| t.artist == ranking.artist) {
                sums[0] += track.danceability;
                sums[1] += track.energy;
                sums[2] += track.loudness;
                sums[3] += track.liveness;
                sums[4] += track.tempo;
                count += 1;
            }
            // The artist came out of the ranking, so count >= 1.
            let c = count as f64;
            ArtistProfile {
                artist: ranking.artist,
                average_popularity: ranking.average_popularity,
                danceability: sums[0] / c,
                energy: sums[1] / c,
                loudness: sums[2] / c,
                liveness: sums[3] / c,
                tempo: sums[4] / c,
            }
        })
        .collect();
    Ok(profiles)
}

/// Radar-chart record for one song out of the top ten of `year` (or of the
/// whole catalog when `year` is `None`). Songs outside that ranking are
/// not found.
pub fn track_profile(ds: &TrackDataset, year: Option<i32>, song: &str) -> Option<TrackProfile> {
    let ranked = match year {
        Some(y) => top_tracks_for_year(ds, y, DEFAULT_TOP_N),
        None => top_tracks(ds, DEFAULT_TOP_N),
    };
    ranked
        .into_iter()
        .find(|t| t.song == song)
        .map(TrackProfile::from_track)
}

/// (x-feature, y-feature) pairs for a scatter series, with hover labels.
/// `x == y` is well-defined here; rejecting it is the session layer's
/// rule, not the engine's.
pub fn scatter_points(
    ds: &TrackDataset,
    year: Option<i32>,
    x: AudioFeature,
    y: AudioFeature,
) -> Vec<ScatterPoint> {
    ds.tracks
        .iter()
        .filter(|t| year.is_none_or(|yr| t.year == yr))
        .map(|t| ScatterPoint {
            song: t.song.clone(),
            artist: t.artist.clone(),
            genre: t.genre.clone(),
            x: t.feature(x),
            y: t.feature(y),
        })
        .collect()
}

/// Trailing rolling mean over a year-ordered series, labelled by the
/// window's last year. Output length is `len - window + 1`; a window
/// longer than the series yields an empty vec.
pub fn rolling_mean(series: &[YearAverage], window: usize) -> Result<Vec<YearAverage>, QueryError> {
    if window == 0 {
        return Err(QueryError::InvalidParameter(
            "rolling mean requires a window of at least 1".to_string(),
        ));
    }
    Ok(series
        .windows(window)
        .map(|w| YearAverage {
            year: w[w.len() - 1].year,
            value: w.iter().map(|p| p.value).sum::<f64>() / window as f64,
        })
        .collect())
}

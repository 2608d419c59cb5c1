use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use crate::data::export::{self, ExportError};
use crate::data::model::{AudioFeature, Track, TrackDataset};
use crate::data::query::{
    self, ArtistProfile, ArtistRanking, CorrelationMatrix, ExplicitYearCount, Histogram,
    QueryError, ScatterPoint, TrackProfile, YearAverage, YearCount, DEFAULT_HISTOGRAM_BINS,
    DEFAULT_TOP_N,
};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// The dashboard's view parameters, independent of rendering.
///
/// Owns a handle to the immutable catalog (loaded once at startup and
/// injected here) plus the user's current selections. Every untrusted
/// input goes through a validating setter, so by the time a view method
/// runs a query its parameters are known-good. Fields are private for
/// exactly that reason.
#[derive(Debug)]
pub struct SessionState {
    /// Shared catalog handle. The dataset never changes after load, so
    /// concurrent readers clone the `Arc` and need no locking.
    dataset: Arc<TrackDataset>,

    /// Selected release year; `None` means the whole catalog.
    year: Option<i32>,

    /// Row count for the ranking views.
    top_n: usize,

    /// Feature plotted by the per-year trend view.
    feature: AudioFeature,

    /// Scatter axes. Kept distinct; `set_axes` enforces it.
    x_axis: AudioFeature,
    y_axis: AudioFeature,
}

impl SessionState {
    /// Start a session over a loaded catalog, with the dashboard's
    /// default selections.
    pub fn new(dataset: Arc<TrackDataset>) -> Self {
        SessionState {
            dataset,
            year: None,
            top_n: DEFAULT_TOP_N,
            feature: AudioFeature::Danceability,
            x_axis: AudioFeature::Danceability,
            y_axis: AudioFeature::Loudness,
        }
    }

    pub fn dataset(&self) -> &TrackDataset {
        &self.dataset
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn feature(&self) -> AudioFeature {
        self.feature
    }

    pub fn axes(&self) -> (AudioFeature, AudioFeature) {
        (self.x_axis, self.y_axis)
    }

    // -- validated setters --

    /// Select a release year, or `None` for the whole catalog. Any year
    /// is legal; one absent from the catalog just yields empty views.
    pub fn set_year(&mut self, year: Option<i32>) {
        self.year = year;
    }

    /// Set the ranking row count. Zero is rejected before it can reach a
    /// query.
    pub fn set_top_n(&mut self, top_n: usize) -> Result<(), QueryError> {
        if top_n == 0 {
            return Err(QueryError::InvalidParameter(
                "top-N must be at least 1".to_string(),
            ));
        }
        self.top_n = top_n;
        Ok(())
    }

    /// Select the trend feature from an untrusted name, e.g. a widget
    /// string. Names outside the nine audio features fail here.
    pub fn set_feature(&mut self, name: &str) -> Result<(), QueryError> {
        self.feature = name.parse()?;
        Ok(())
    }

    /// Select the scatter axes. Equal axes are refused, mirroring the
    /// dashboard rule that a feature cannot be plotted against itself.
    pub fn set_axes(&mut self, x: AudioFeature, y: AudioFeature) -> Result<(), QueryError> {
        if x == y {
            return Err(QueryError::InvalidParameter(
                "scatter axes must differ".to_string(),
            ));
        }
        self.x_axis = x;
        self.y_axis = y;
        Ok(())
    }

    // -- views, delegating to the query engine with validated parameters --

    /// Top tracks of the selected year, or of the whole catalog.
    pub fn top_tracks_view(&self) -> Vec<&Track> {
        match self.year {
            Some(year) => query::top_tracks_for_year(&self.dataset, year, self.top_n),
            None => query::top_tracks(&self.dataset, self.top_n),
        }
    }

    /// Year-scoped catalog rows, in source order (the data-table view).
    pub fn tracks_view(&self) -> Vec<&Track> {
        match self.year {
            Some(year) => query::tracks_for_year(&self.dataset, year),
            None => self.dataset.tracks.iter().collect(),
        }
    }

    pub fn artist_ranking_view(&self) -> Result<Vec<ArtistRanking>, QueryError> {
        query::top_artists_by_average_popularity(&self.dataset, self.top_n)
    }

    pub fn artist_profiles_view(&self) -> Result<Vec<ArtistProfile>, QueryError> {
        query::artist_profiles(&self.dataset, self.top_n)
    }

    /// Per-year mean of the selected feature.
    pub fn trend_view(&self) -> Vec<YearAverage> {
        query::average_feature_by_year(&self.dataset, self.feature)
    }

    /// [`Self::trend_view`] smoothed by a trailing rolling mean.
    pub fn smoothed_trend_view(&self, window: usize) -> Result<Vec<YearAverage>, QueryError> {
        query::rolling_mean(&self.trend_view(), window)
    }

    pub fn genre_view(&self) -> BTreeMap<String, usize> {
        query::genre_counts(&self.dataset)
    }

    pub fn track_counts_view(&self) -> Vec<YearCount> {
        query::track_counts_by_year(&self.dataset)
    }

    pub fn explicit_view(&self) -> Vec<ExplicitYearCount> {
        query::explicit_counts_by_year(&self.dataset)
    }

    /// Correlation matrix over all nine audio features.
    pub fn correlation_view(&self) -> Result<CorrelationMatrix, QueryError> {
        query::correlation_matrix(&self.dataset, &AudioFeature::ALL)
    }

    /// Popularity histogram for the selected year (or the whole catalog).
    pub fn histogram_view(&self) -> Result<Histogram, QueryError> {
        query::popularity_histogram(&self.dataset, self.year, DEFAULT_HISTOGRAM_BINS)
    }

    /// Scatter series over the selected axes and year.
    pub fn scatter_view(&self) -> Vec<ScatterPoint> {
        query::scatter_points(&self.dataset, self.year, self.x_axis, self.y_axis)
    }

    /// Radar record for one song of the current top-ten ranking.
    pub fn track_profile_view(&self, song: &str) -> Option<TrackProfile> {
        query::track_profile(&self.dataset, self.year, song)
    }

    /// Export the current selection (whole catalog or one year) as CSV,
    /// the download-button payload.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        match self.year {
            Some(year) => export::write_csv_for_year(&self.dataset, year, writer),
            None => export::write_csv(&self.dataset, writer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Track, REQUIRED_COLUMNS};
    use std::collections::BTreeMap;

    fn track(song: &str, artist: &str, year: i32, popularity: f64) -> Track {
        Track {
            song: song.to_string(),
            artist: artist.to_string(),
            year,
            popularity,
            explicit: false,
            genre: "pop".to_string(),
            danceability: 0.6,
            energy: 0.7,
            loudness: -6.0,
            speechiness: 0.05,
            acousticness: 0.2,
            instrumentalness: 0.0,
            liveness: 0.15,
            valence: 0.5,
            tempo: 120.0,
            extras: BTreeMap::new(),
        }
    }

    fn session() -> SessionState {
        let tracks = vec![
            track("hit_2000", "A", 2000, 90.0),
            track("mid_2000", "B", 2000, 60.0),
            track("hit_2001", "C", 2001, 80.0),
        ];
        let columns = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        SessionState::new(Arc::new(TrackDataset::from_tracks(tracks, columns)))
    }

    #[test]
    fn defaults_match_the_dashboard() {
        let s = session();
        assert_eq!(s.year(), None);
        assert_eq!(s.top_n(), 10);
        assert_eq!(s.feature(), AudioFeature::Danceability);
        assert_eq!(
            s.axes(),
            (AudioFeature::Danceability, AudioFeature::Loudness)
        );
    }

    #[test]
    fn feature_names_are_validated_at_the_boundary() {
        let mut s = session();
        s.set_feature("energy").unwrap();
        assert_eq!(s.feature(), AudioFeature::Energy);

        let err = s.set_feature("nonexistent_feature").unwrap_err();
        assert!(matches!(err, QueryError::UnknownFeature(_)));
        assert!(err.to_string().contains("nonexistent_feature"));
        // The rejected name did not overwrite the selection.
        assert_eq!(s.feature(), AudioFeature::Energy);
    }

    #[test]
    fn zero_top_n_is_rejected() {
        let mut s = session();
        assert!(matches!(
            s.set_top_n(0),
            Err(QueryError::InvalidParameter(_))
        ));
        assert_eq!(s.top_n(), 10);
        s.set_top_n(3).unwrap();
        assert_eq!(s.top_n(), 3);
    }

    #[test]
    fn equal_scatter_axes_are_rejected() {
        let mut s = session();
        assert!(matches!(
            s.set_axes(AudioFeature::Tempo, AudioFeature::Tempo),
            Err(QueryError::InvalidParameter(_))
        ));
        s.set_axes(AudioFeature::Energy, AudioFeature::Tempo).unwrap();
        assert_eq!(s.axes(), (AudioFeature::Energy, AudioFeature::Tempo));
    }

    #[test]
    fn views_follow_the_selected_year() {
        let mut s = session();

        let all: Vec<&str> = s.top_tracks_view().iter().map(|t| t.song.as_str()).collect();
        assert_eq!(all, ["hit_2000", "hit_2001", "mid_2000"]);
        assert_eq!(s.tracks_view().len(), 3);
        assert_eq!(s.scatter_view().len(), 3);

        s.set_year(Some(2001));
        let scoped: Vec<&str> = s.top_tracks_view().iter().map(|t| t.song.as_str()).collect();
        assert_eq!(scoped, ["hit_2001"]);
        assert_eq!(s.tracks_view().len(), 1);
        assert_eq!(s.scatter_view().len(), 1);

        // A year absent from the catalog empties the views, no error.
        s.set_year(Some(2050));
        assert!(s.top_tracks_view().is_empty());
        assert!(s.histogram_view().unwrap().bins.is_empty());
    }

    #[test]
    fn trend_view_uses_the_selected_feature() {
        let mut s = session();
        s.set_feature("tempo").unwrap();
        let trend = s.trend_view();
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].year, 2000);
        assert_eq!(trend[0].value, 120.0);

        let smoothed = s.smoothed_trend_view(2).unwrap();
        assert_eq!(smoothed.len(), 1);
        assert_eq!(smoothed[0].year, 2001);
    }

    #[test]
    fn correlation_view_covers_all_nine_features() {
        let s = session();
        let matrix = s.correlation_view().unwrap();
        assert_eq!(matrix.features.len(), 9);
        for i in 0..9 {
            assert_eq!(matrix.values[i][i], 1.0);
        }
    }

    #[test]
    fn export_follows_the_selected_year() {
        let mut s = session();
        s.set_year(Some(2000));

        let mut buf = Vec::new();
        s.export_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("hit_2000"));
        assert!(text.contains("mid_2000"));
        assert!(!text.contains("hit_2001"));
    }
}

use std::sync::Arc;

use anyhow::Result;
use tempfile::{tempdir, TempDir};

use trackboard::data::model::TrackDataset;
use trackboard::{load_file, write_csv_file, AudioFeature, DataLoadError, SessionState};

/// Small catalog in the real source's column order: three chart years,
/// three artists, multi-valued genres.
const FIXTURE_CSV: &str = "\
artist,song,duration_ms,explicit,year,popularity,danceability,energy,key,loudness,mode,speechiness,acousticness,instrumentalness,liveness,valence,tempo,genre
Nova,Alpha Anthem,201000,False,2000,90,0.6,0.8,5,-4.5,1,0.05,0.2,0.0,0.12,0.8,118.0,pop
Nova,Beta Ballad,215000,False,2000,70,0.7,0.5,2,-7.2,0,0.04,0.45,0.001,0.3,0.4,92.5,\"pop, rock\"
Pulse,Gamma Groove,189000,True,2000,85,0.8,0.9,9,-3.8,1,0.21,0.05,0.0,0.09,0.7,140.0,hip hop
Pulse,Delta Drive,224000,True,2001,65,0.5,0.85,7,-4.1,0,0.08,0.1,0.12,0.33,0.6,128.0,Dance/Electronic
Quill,Epsilon Echo,198000,False,2001,75,0.7,0.6,4,-6.0,1,0.03,0.3,0.0,0.18,0.5,104.0,rock
Quill,Zeta Zoom,232000,False,2002,81,0.9,0.7,11,-5.0,1,0.06,0.15,0.0,0.2,0.9,122.0,pop
";

fn load_fixture(dir: &TempDir) -> Result<Arc<TrackDataset>> {
    let path = dir.path().join("fixture.csv");
    std::fs::write(&path, FIXTURE_CSV)?;
    Ok(Arc::new(load_file(&path)?))
}

#[test]
fn test_catalog_views_over_a_loaded_file() -> Result<()> {
    let dir = tempdir()?;
    let dataset = load_fixture(&dir)?;
    assert_eq!(dataset.len(), 6);
    assert_eq!(dataset.columns[0], "artist");
    assert_eq!(dataset.tracks[0].extras["duration_ms"], "201000");

    let session = SessionState::new(Arc::clone(&dataset));

    // Global ranking, popularity descending.
    let top: Vec<&str> = session
        .top_tracks_view()
        .iter()
        .map(|t| t.song.as_str())
        .collect();
    assert_eq!(
        top,
        [
            "Alpha Anthem",
            "Gamma Groove",
            "Zeta Zoom",
            "Epsilon Echo",
            "Beta Ballad",
            "Delta Drive",
        ]
    );

    // Artist ranking by mean popularity: Nova 80, Quill 78, Pulse 75.
    let artists = session.artist_ranking_view()?;
    let names: Vec<&str> = artists.iter().map(|r| r.artist.as_str()).collect();
    assert_eq!(names, ["Nova", "Quill", "Pulse"]);
    assert_eq!(artists[0].average_popularity, 80.0);
    assert_eq!(artists[0].track_count, 2);

    // Multi-valued genres count once per token.
    let genres = session.genre_view();
    assert_eq!(genres["pop"], 3);
    assert_eq!(genres["rock"], 2);
    assert_eq!(genres["hip hop"], 1);
    assert_eq!(genres["Dance/Electronic"], 1);

    // Danceability trend: 2000 → 0.7, 2001 → 0.6, 2002 → 0.9.
    let trend = session.trend_view();
    assert_eq!(trend.len(), 3);
    assert_eq!(trend[0].year, 2000);
    assert!((trend[0].value - 0.7).abs() < 1e-9);
    assert!((trend[1].value - 0.6).abs() < 1e-9);
    assert!((trend[2].value - 0.9).abs() < 1e-9);

    // Explicit breakdown: year ascending, non-explicit first.
    let explicit = session.explicit_view();
    assert_eq!(explicit.len(), 5);
    assert_eq!((explicit[0].year, explicit[0].explicit, explicit[0].count), (2000, false, 2));
    assert_eq!((explicit[1].year, explicit[1].explicit, explicit[1].count), (2000, true, 1));
    assert_eq!((explicit[4].year, explicit[4].explicit, explicit[4].count), (2002, false, 1));

    let counts = session.track_counts_view();
    let pairs: Vec<(i32, usize)> = counts.iter().map(|c| (c.year, c.count)).collect();
    assert_eq!(pairs, [(2000, 3), (2001, 2), (2002, 1)]);

    // Correlation over all nine features: symmetric, unit diagonal.
    let matrix = session.correlation_view()?;
    assert_eq!(matrix.features.len(), 9);
    for i in 0..9 {
        assert_eq!(matrix.values[i][i], 1.0);
        for j in 0..9 {
            assert_eq!(matrix.values[i][j], matrix.values[j][i]);
        }
    }

    assert_eq!(session.histogram_view()?.total(), 6);

    Ok(())
}

#[test]
fn test_year_scoped_session() -> Result<()> {
    let dir = tempdir()?;
    let mut session = SessionState::new(load_fixture(&dir)?);

    session.set_year(Some(2000));
    let top: Vec<&str> = session
        .top_tracks_view()
        .iter()
        .map(|t| t.song.as_str())
        .collect();
    assert_eq!(top, ["Alpha Anthem", "Gamma Groove", "Beta Ballad"]);

    session.set_top_n(2)?;
    assert_eq!(session.top_tracks_view().len(), 2);

    // Scatter over chosen axes, scoped to the year.
    session.set_axes(AudioFeature::Energy, AudioFeature::Tempo)?;
    let points = session.scatter_view();
    assert_eq!(points.len(), 3);
    let gamma = points.iter().find(|p| p.song == "Gamma Groove").unwrap();
    assert_eq!(gamma.x, 0.9);
    assert_eq!(gamma.y, 140.0);
    assert_eq!(gamma.genre, "hip hop");

    // Radar record comes from the year's top ten only.
    let profile = session.track_profile_view("Gamma Groove").unwrap();
    let axes = profile.display_axes();
    assert_eq!(axes[0], ("danceability", 80.0));
    assert_eq!(axes[3], ("loudness", 19.0));
    assert_eq!(axes[5], ("popularity", 85.0));
    // A 2001 release is invisible under the 2000 scope.
    assert!(session.track_profile_view("Delta Drive").is_none());

    // Unknown years empty the views without failing.
    session.set_year(Some(2050));
    assert!(session.top_tracks_view().is_empty());
    assert!(session.scatter_view().is_empty());
    assert!(session.histogram_view()?.bins.is_empty());

    Ok(())
}

#[test]
fn test_csv_export_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let dataset = load_fixture(&dir)?;

    // Whole catalog: written bytes re-load to an equal dataset.
    let out = dir.path().join("export.csv");
    write_csv_file(&dataset, &out)?;
    let reloaded = load_file(&out)?;
    assert_eq!(reloaded.columns, dataset.columns);
    assert_eq!(reloaded.tracks, dataset.tracks);

    // The year-scoped download holds exactly that year's rows.
    let mut session = SessionState::new(Arc::clone(&dataset));
    session.set_year(Some(2001));
    let mut buf = Vec::new();
    session.export_csv(&mut buf)?;
    let text = String::from_utf8(buf)?;
    assert_eq!(text.lines().count(), 3); // header + two tracks
    assert!(text.contains("Delta Drive"));
    assert!(text.contains("Epsilon Echo"));
    assert!(!text.contains("Alpha Anthem"));

    Ok(())
}

#[test]
fn test_invalid_inputs_fail_before_any_query() -> Result<()> {
    let dir = tempdir()?;
    let mut session = SessionState::new(load_fixture(&dir)?);

    let err = session.set_feature("nonexistent_feature").unwrap_err();
    assert!(err.to_string().contains("nonexistent_feature"));
    assert!(session.set_top_n(0).is_err());
    assert!(session
        .set_axes(AudioFeature::Valence, AudioFeature::Valence)
        .is_err());

    // A catalog missing a contracted column never loads.
    let broken = FIXTURE_CSV.replace(",tempo,", ",bpm,");
    let path = dir.path().join("broken.csv");
    std::fs::write(&path, broken)?;
    match load_file(&path) {
        Err(DataLoadError::MissingColumn(column)) => assert_eq!(column, "tempo"),
        other => panic!("expected MissingColumn, got {other:?}"),
    }

    Ok(())
}

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::model::{Track, TrackDataset};
use super::query::tracks_for_year;

/// Failure while serializing a dataset back to CSV.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The destination file could not be created.
    #[error("creating {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Flushing buffered rows to the destination failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The CSV layer rejected a record.
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Write the whole catalog as CSV: the recorded source column order, one
/// row per track in dataset order.
///
/// Field rendering matches the source conventions, so a written dataset
/// re-loads to an equal one: `explicit` as `True`/`False`, floats in
/// shortest round-trip form, integral popularity without a decimal point,
/// extras verbatim. Quoting only where a field needs it.
pub fn write_csv<W: Write>(ds: &TrackDataset, writer: W) -> Result<(), ExportError> {
    write_rows(ds, ds.tracks.iter(), writer)
}

/// [`write_csv`] into a newly created file.
pub fn write_csv_file(ds: &TrackDataset, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    write_csv(ds, file)?;
    log::info!("Exported {} tracks to {}", ds.len(), path.display());
    Ok(())
}

/// Write only the tracks released in `year`, same layout as [`write_csv`].
pub fn write_csv_for_year<W: Write>(
    ds: &TrackDataset,
    year: i32,
    writer: W,
) -> Result<(), ExportError> {
    write_rows(ds, tracks_for_year(ds, year).into_iter(), writer)
}

/// [`write_csv_for_year`] into a newly created file.
pub fn write_csv_for_year_file(
    ds: &TrackDataset,
    year: i32,
    path: &Path,
) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    write_csv_for_year(ds, year, file)
}

fn write_rows<'a, W, I>(ds: &TrackDataset, rows: I, writer: W) -> Result<(), ExportError>
where
    W: Write,
    I: Iterator<Item = &'a Track>,
{
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(&ds.columns)?;
    for track in rows {
        out.write_record(ds.columns.iter().map(|col| field(track, col)))?;
    }
    out.flush()?;
    Ok(())
}

/// Render one cell for `column`. Columns outside the typed contract come
/// from [`Track::extras`]; an extra the track never carried is empty.
fn field(track: &Track, column: &str) -> String {
    match column {
        "song" => track.song.clone(),
        "artist" => track.artist.clone(),
        "year" => track.year.to_string(),
        "popularity" => format_popularity(track.popularity),
        "explicit" => String::from(if track.explicit { "True" } else { "False" }),
        "genre" => track.genre.clone(),
        other => match other.parse() {
            Ok(feature) => format_float(track.feature(feature)),
            Err(_) => track.extras.get(other).cloned().unwrap_or_default(),
        },
    }
}

/// The source stores popularity as whole numbers; keep integral values
/// free of a decimal point so the column survives a round trip unchanged.
fn format_popularity(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15 {
        format!("{}", v as i64)
    } else {
        format_float(v)
    }
}

/// Shortest round-trip rendering of a feature value, in the same form the
/// source catalog carries it: integral values keep one decimal ("0.0"),
/// magnitudes below 1e-4 switch to exponent notation with a two-digit
/// exponent ("1.77e-05"), NaN renders empty.
fn format_float(v: f64) -> String {
    if v.is_nan() {
        return String::new();
    }
    if v != 0.0 && v.abs() < 1e-4 {
        let s = format!("{v:e}");
        if let Some(pos) = s.find('e') {
            let mantissa = &s[..pos];
            let exp = &s[pos + 1..];
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ("-", d),
                None => ("+", exp),
            };
            return format!("{mantissa}e{sign}{digits:0>2}");
        }
        return s;
    }
    if v.fract() == 0.0 && v.is_finite() {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load_file;
    use crate::data::model::REQUIRED_COLUMNS;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn sample_track() -> Track {
        let mut extras = BTreeMap::new();
        extras.insert("duration_ms".to_string(), "211160".to_string());
        Track {
            song: "Oops!...I Did It Again".to_string(),
            artist: "Britney Spears".to_string(),
            year: 2000,
            popularity: 77.0,
            explicit: false,
            genre: "pop".to_string(),
            danceability: 0.751,
            energy: 0.834,
            loudness: -5.444,
            speechiness: 0.0437,
            acousticness: 0.3,
            instrumentalness: 1.77e-5,
            liveness: 0.355,
            valence: 0.894,
            tempo: 95.053,
            extras,
        }
    }

    fn sample_dataset() -> TrackDataset {
        let mut second = sample_track();
        second.song = "The Real Slim Shady".to_string();
        second.artist = "Eminem".to_string();
        second.popularity = 86.0;
        second.explicit = true;
        second.genre = "hip hop, pop".to_string();
        second.instrumentalness = 0.0;

        let mut columns: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.push("duration_ms".to_string());
        TrackDataset::from_tracks(vec![sample_track(), second], columns)
    }

    fn export_to_string(ds: &TrackDataset) -> String {
        let mut buf = Vec::new();
        write_csv(ds, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_matches_recorded_column_order() {
        let ds = sample_dataset();
        let text = export_to_string(&ds);
        let header = text.lines().next().unwrap();
        assert_eq!(header, ds.columns.join(","));
    }

    #[test]
    fn fields_keep_source_conventions() {
        let text = export_to_string(&sample_dataset());

        // Booleans in the source's True/False form.
        assert!(text.contains(",False,"));
        assert!(text.contains(",True,"));
        // Integral popularity without a decimal point.
        assert!(text.contains(",77,"));
        // Tiny floats in exponent form with a two-digit exponent.
        assert!(text.contains("1.77e-05"));
        // Integral feature values keep one decimal.
        assert!(text.contains(",0.0,"));
        // Extras verbatim.
        assert!(text.contains("211160"));
    }

    #[test]
    fn multi_valued_genre_is_quoted() {
        let text = export_to_string(&sample_dataset());
        assert!(text.contains("\"hip hop, pop\""));
        // Single-token fields stay unquoted.
        assert!(text.contains(",pop,"));
    }

    #[test]
    fn export_reloads_to_an_equal_dataset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roundtrip.csv");

        let ds = sample_dataset();
        write_csv_file(&ds, &path).unwrap();
        let reloaded = load_file(&path).unwrap();

        assert_eq!(reloaded.columns, ds.columns);
        assert_eq!(reloaded.tracks, ds.tracks);
    }

    #[test]
    fn year_scoped_export_contains_only_that_year() {
        let mut ds = sample_dataset();
        ds.tracks[1].year = 2001;
        // Rebuild so the year index matches the edited rows.
        let ds = TrackDataset::from_tracks(ds.tracks, ds.columns);

        let mut buf = Vec::new();
        write_csv_for_year(&ds, 2001, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 2); // header + one track
        assert!(rows[1].contains("Eminem"));
        assert!(!text.contains("Britney Spears"));
    }

    #[test]
    fn missing_extra_renders_empty() {
        let mut bare = sample_track();
        bare.extras.clear();
        let mut columns: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.push("duration_ms".to_string());
        let ds = TrackDataset::from_tracks(vec![bare], columns);

        let text = export_to_string(&ds);
        // The row ends with the empty duration_ms cell.
        assert!(text.lines().nth(1).unwrap().ends_with(','));
    }

    #[test]
    fn float_forms_match_the_source() {
        assert_eq!(format_float(0.751), "0.751");
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(-5.444), "-5.444");
        assert_eq!(format_float(1.77e-5), "1.77e-05");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(f64::NAN), "");
        assert_eq!(format_popularity(77.0), "77");
        assert_eq!(format_popularity(63.5), "63.5");
    }
}

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use trackboard::data::export::write_csv_file;
use trackboard::data::model::{Track, TrackDataset};

/// Column order of the real chart-catalog CSV this sample mimics.
const SOURCE_COLUMNS: [&str; 18] = [
    "artist",
    "song",
    "duration_ms",
    "explicit",
    "year",
    "popularity",
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
    "genre",
];

const ARTISTS: [&str; 12] = [
    "The Vinyl Foxes",
    "Nora Quinn",
    "DJ Meridian",
    "Atlas Avenue",
    "Ruby Delgado",
    "The Night Parade",
    "Cassette Motel",
    "Leon Vega",
    "Golden Hour Club",
    "Mara & The Tides",
    "Static Bloom",
    "Kid Horizon",
];

const SONG_LEAD: [&str; 8] = [
    "Midnight", "Golden", "Broken", "Electric", "Neon", "Summer", "Silent", "Wild",
];
const SONG_TAIL: [&str; 8] = [
    "Heart", "Lights", "Road", "Dreams", "Fire", "River", "Nights", "Echoes",
];

const GENRES: [&str; 8] = [
    "pop",
    "rock",
    "hip hop",
    "Dance/Electronic",
    "R&B",
    "latin",
    "country",
    "metal",
];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    /// Uniform index into `0..n`.
    fn index(&mut self, n: usize) -> usize {
        (self.next_f64() * n as f64) as usize
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn generate_track(year: i32, rng: &mut SimpleRng) -> (Track, i64, i64, i64) {
    let artist = ARTISTS[rng.index(ARTISTS.len())];
    let song = format!(
        "{} {}",
        SONG_LEAD[rng.index(SONG_LEAD.len())],
        SONG_TAIL[rng.index(SONG_TAIL.len())]
    );

    // Roughly a third of the catalog carries a second genre token.
    let mut genre = GENRES[rng.index(GENRES.len())].to_string();
    if rng.next_f64() < 0.3 {
        let second = GENRES[rng.index(GENRES.len())];
        if second != genre {
            genre.push_str(", ");
            genre.push_str(second);
        }
    }

    let explicit_odds = if genre.contains("hip hop") { 0.5 } else { 0.15 };
    let explicit = rng.next_f64() < explicit_odds;

    // Energy drifts upward across the years, giving the trend view a
    // visible slope.
    let drift = f64::from(year - 2000);
    let energy = round3((rng.gauss(0.66 + 0.004 * drift, 0.14)).clamp(0.0, 1.0));

    let instrumentalness = if rng.next_f64() < 0.85 {
        0.0
    } else {
        rng.next_f64() * 0.02
    };

    let duration_ms = (rng.gauss(218_000.0, 32_000.0) as i64).clamp(90_000, 420_000);
    let key = rng.index(12) as i64;
    let mode = i64::from(rng.next_f64() < 0.6);

    let mut extras = BTreeMap::new();
    extras.insert("duration_ms".to_string(), duration_ms.to_string());
    extras.insert("key".to_string(), key.to_string());
    extras.insert("mode".to_string(), mode.to_string());

    let track = Track {
        song,
        artist: artist.to_string(),
        year,
        popularity: rng.gauss(58.0, 18.0).round().clamp(0.0, 100.0),
        explicit,
        genre,
        danceability: round3(rng.gauss(0.66, 0.12).clamp(0.0, 1.0)),
        energy,
        loudness: round3(rng.gauss(-5.6, 1.7).clamp(-20.0, 0.0)),
        speechiness: round3(rng.gauss(0.10, 0.06).clamp(0.02, 0.6)),
        acousticness: round3(rng.gauss(0.13, 0.12).clamp(0.0, 1.0)),
        instrumentalness,
        liveness: round3(rng.gauss(0.18, 0.08).clamp(0.01, 1.0)),
        valence: round3(rng.gauss(0.55, 0.18).clamp(0.0, 1.0)),
        tempo: round3(rng.gauss(121.0, 24.0).clamp(60.0, 210.0)),
        extras,
    };
    (track, duration_ms, key, mode)
}

fn write_parquet(
    tracks: &[Track],
    durations: Vec<i64>,
    keys: Vec<i64>,
    modes: Vec<i64>,
    path: &Path,
) -> Result<()> {
    let fields: Vec<Field> = SOURCE_COLUMNS
        .iter()
        .map(|&name| {
            let dtype = match name {
                "artist" | "song" | "genre" => DataType::Utf8,
                "explicit" => DataType::Boolean,
                "duration_ms" | "year" | "popularity" | "key" | "mode" => DataType::Int64,
                _ => DataType::Float64,
            };
            Field::new(name, dtype, false)
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let strings = |f: fn(&Track) -> &str| -> ArrayRef {
        Arc::new(StringArray::from(
            tracks.iter().map(f).collect::<Vec<_>>(),
        ))
    };
    let floats = |f: fn(&Track) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from(
            tracks.iter().map(f).collect::<Vec<_>>(),
        ))
    };

    let arrays: Vec<ArrayRef> = vec![
        strings(|t| &t.artist),
        strings(|t| &t.song),
        Arc::new(Int64Array::from(durations)),
        Arc::new(BooleanArray::from(
            tracks.iter().map(|t| t.explicit).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            tracks.iter().map(|t| i64::from(t.year)).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            tracks.iter().map(|t| t.popularity as i64).collect::<Vec<_>>(),
        )),
        floats(|t| t.danceability),
        floats(|t| t.energy),
        Arc::new(Int64Array::from(keys)),
        floats(|t| t.loudness),
        Arc::new(Int64Array::from(modes)),
        floats(|t| t.speechiness),
        floats(|t| t.acousticness),
        floats(|t| t.instrumentalness),
        floats(|t| t.liveness),
        floats(|t| t.valence),
        floats(|t| t.tempo),
        strings(|t| &t.genre),
    ];

    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut rng = SimpleRng::new(42);

    let mut tracks = Vec::new();
    let mut durations = Vec::new();
    let mut keys = Vec::new();
    let mut modes = Vec::new();

    for year in 2000..=2019 {
        for _ in 0..50 {
            let (track, duration, key, mode) = generate_track(year, &mut rng);
            tracks.push(track);
            durations.push(duration);
            keys.push(key);
            modes.push(mode);
        }
    }

    let columns: Vec<String> = SOURCE_COLUMNS.iter().map(|c| c.to_string()).collect();
    let dataset = TrackDataset::from_tracks(tracks, columns);

    let csv_path = Path::new("sample_tracks.csv");
    write_csv_file(&dataset, csv_path).context("writing sample CSV")?;

    let parquet_path = Path::new("sample_tracks.parquet");
    write_parquet(&dataset.tracks, durations, keys, modes, parquet_path)?;

    println!(
        "Wrote {} tracks ({} years) to {} and {}",
        dataset.len(),
        dataset.years.len(),
        csv_path.display(),
        parquet_path.display()
    );
    Ok(())
}

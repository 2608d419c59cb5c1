pub mod data;
pub mod state;

pub use data::export::{
    write_csv, write_csv_file, write_csv_for_year, write_csv_for_year_file, ExportError,
};
pub use data::loader::{load_file, DataLoadError};
pub use data::model::{AudioFeature, Track, TrackDataset, UnknownFeature};
pub use data::query::{QueryError, DEFAULT_HISTOGRAM_BINS, DEFAULT_TOP_N};
pub use state::SessionState;

/// Data layer: core types, loading, querying, and export.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → TrackDataset
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ TrackDataset │  Vec<Track>, recorded column order
///   └──────────────┘
///        │
///        ├──────────────┐
///        ▼              ▼
///   ┌──────────┐   ┌──────────┐
///   │  query    │   │  export   │  aggregations / CSV back out
///   └──────────┘   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod query;
pub mod export;

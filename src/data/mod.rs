/// Data layer: spectral tables, reference profiles, loading and selection.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → SpectralTable / PsfProfile
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ SpectralTable │  Vec<Segment>, one per detector segment
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  wavelength range → selected pixels / segments
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;

/// aqmon_service: air-quality station history store and analytics.
///
/// Keeps per-station, per-parameter reading histories for GIOŚ monitoring
/// stations, merges fresh batches into them without duplicates, computes
/// windowed statistics and trend, and persists everything to a local JSON
/// archive.
///
/// # Module structure
///
/// ```text
/// aqmon_service
/// ├── model      : shared data types (Reading, ParameterSeries, StationRecord, WindowSpec, …)
/// ├── merge      : timestamp-keyed merge of reading batches
/// ├── analysis   : window selection, summary statistics, plot points
/// │   └── trend  : least-squares slope and direction
/// ├── archive    : JSON archive load / merge-on-save with atomic writes
/// ├── geo        : haversine distance and map projection
/// ├── stations   : station catalog: city search, radius search, map markers
/// ├── barrier    : epoch-tagged completion counter for per-parameter fetches
/// ├── session    : the station being browsed: record + barrier + analysis
/// ├── ingest
/// │   ├── batch    : lenient decoding of reading batches
/// │   ├── gios     : GIOŚ REST API: stations, sensors, readings
/// │   └── nominatim: geocoding for the radius search
/// ├── verify     : archive integrity report
/// ├── config     : TOML + .env configuration
/// └── logging    : console / file logger with source tags
/// ```

pub mod analysis;
pub mod archive;
pub mod barrier;
pub mod config;
pub mod geo;
pub mod ingest;
pub mod logging;
pub mod merge;
pub mod model;
pub mod session;
pub mod stations;
pub mod verify;

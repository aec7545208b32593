/// Service configuration loaded from TOML.
///
/// Every section and key is optional; anything left out takes the default
/// shown below. A complete file looks like:
///
/// ```toml
/// [archive]
/// path = "station_archive.json"
///
/// [map]
/// lat_min = 49.09
/// lat_max = 54.61
/// lon_min = 14.24
/// lon_max = 22.59
/// width = 600.0
/// height = 465.0
///
/// [search]
/// default_radius_km = 10.0
/// min_location_query_len = 5
///
/// [gios]
/// base_url = "https://api.gios.gov.pl/pjp-api/rest"
/// user_agent = "aqmon_service/0.1"
/// timeout_secs = 30
///
/// [nominatim]
/// base_url = "https://nominatim.openstreetmap.org"
///
/// [logging]
/// level = "info"
/// file = "aqmon.log"
/// console_timestamps = false
///
/// [parameters]
/// PM10 = "Pył zawieszony PM10"
/// ```
///
/// A `[parameters]` table replaces the built-in names rather than adding
/// to them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::geo::MapBounds;
use crate::logging::LogLevel;
use crate::model::ParameterNames;

/// Names the TOML file read by `Config::from_env`.
pub const CONFIG_ENV_VAR: &str = "AQMON_CONFIG";
/// Overrides `[archive] path`.
pub const ARCHIVE_PATH_ENV_VAR: &str = "AQMON_ARCHIVE_PATH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub path: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("station_archive.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Used when the user leaves the radius blank or enters a non-positive value.
    pub default_radius_km: f64,
    /// Shortest location text sent to the geocoder, in characters.
    pub min_location_query_len: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_radius_km: 10.0,
            min_location_query_len: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GiosConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for GiosConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.gios.gov.pl/pjp-api/rest".to_string(),
            user_agent: concat!("aqmon_service/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NominatimConfig {
    pub base_url: String,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Append-only log file; console only when absent.
    pub file: Option<String>,
    pub console_timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            console_timestamps: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub archive: ArchiveConfig,
    pub map: MapBounds,
    pub search: SearchConfig,
    pub gios: GiosConfig,
    pub nominatim: NominatimConfig,
    pub logging: LoggingConfig,
    pub parameters: ParameterNames,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Loads `.env`, then the file named by `AQMON_CONFIG` (defaults when
    /// unset), then applies `AQMON_ARCHIVE_PATH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::resolve(|key| std::env::var(key).ok())
    }

    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_ENV_VAR) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(path) = lookup(ARCHIVE_PATH_ENV_VAR) {
            config.archive.path = PathBuf::from(path);
        }
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PARAM_PM10;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml_str("").expect("empty TOML is valid");
        assert_eq!(config, Config::default());
        assert_eq!(config.archive.path, PathBuf::from("station_archive.json"));
        assert_eq!(config.search.default_radius_km, 10.0);
        assert_eq!(config.search.min_location_query_len, 5);
        assert_eq!(config.map, MapBounds::default());
        assert_eq!(config.parameters.len(), 7);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [search]
            default_radius_km = 25.0

            [map]
            width = 1200.0

            [logging]
            level = "debug"
            "#,
        )
        .expect("valid TOML");

        assert_eq!(config.search.default_radius_km, 25.0);
        assert_eq!(config.search.min_location_query_len, 5);
        assert_eq!(config.map.width, 1200.0);
        assert_eq!(config.map.height, 465.0);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.gios, GiosConfig::default());
    }

    #[test]
    fn test_parameters_table_replaces_defaults() {
        let config = Config::from_toml_str(
            r#"
            [parameters]
            PM10 = "Particulate matter 10"
            "PM2.5" = "Particulate matter 2.5"
            "#,
        )
        .unwrap();
        assert_eq!(config.parameters.len(), 2);
        assert_eq!(config.parameters.display_name(PARAM_PM10), "Particulate matter 10");
        assert_eq!(config.parameters.display_name("O3"), "O3");
    }

    #[test]
    fn test_load_reports_path_on_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        match Config::load(&missing) {
            Err(ConfigError::Io { path, .. }) => assert!(path.ends_with("absent.toml")),
            other => panic!("expected Io error, got {:?}", other),
        }

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[search\nradius = ").unwrap();
        assert!(matches!(Config::load(&broken), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_resolve_applies_file_then_archive_override() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("aqmon.toml");
        fs::write(&file, "[archive]\npath = \"from_file.json\"\n[search]\ndefault_radius_km = 5.0\n")
            .unwrap();
        let file_str = file.to_string_lossy().into_owned();

        let config = Config::resolve(|key| match key {
            CONFIG_ENV_VAR => Some(file_str.clone()),
            ARCHIVE_PATH_ENV_VAR => Some("/var/lib/aqmon/archive.json".to_string()),
            _ => None,
        })
        .expect("config file exists");

        assert_eq!(config.search.default_radius_km, 5.0);
        assert_eq!(config.archive.path, PathBuf::from("/var/lib/aqmon/archive.json"));
    }

    #[test]
    fn test_resolve_without_variables_is_default() {
        let config = Config::resolve(|_| None).unwrap();
        assert_eq!(config, Config::default());
    }
}

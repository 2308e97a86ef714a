//! Configuration loading and typed config structures for Angkot Radar.
//!
//! The canonical configuration lives in `angkot-config.yaml` at the project
//! root. Every field has a default, so an empty or missing file yields a
//! working tracker centred on Jakarta.

use std::path::Path;
use std::time::Duration;

use angkot_types::{Attributes, Coordinate};
use serde::Deserialize;

use crate::proximity::{
    DEFAULT_MAX_AGE_MS, DEFAULT_RADIUS_KM, DEFAULT_SEARCH_RADIUS_KM, ProximityParams,
};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is outside its allowed range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration, mirroring `angkot-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RadarConfig {
    /// Proximity thresholds and timer intervals.
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Where the observer sits before the first fix.
    #[serde(default)]
    pub location: LocationConfig,

    /// Vehicle metadata published while in driver mode.
    #[serde(default)]
    pub driver: DriverConfig,

    /// Observer API binding.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RadarConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `OBSERVER_PORT` overrides `observer.port` when set to a valid port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml reads an empty document as unit rather than a map.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.observer.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tracking;
        if !(t.radius_km.is_finite() && t.radius_km > 0.0) {
            return Err(invalid("tracking.radius_km must be a positive number"));
        }
        if !(t.search_radius_km.is_finite() && t.search_radius_km > 0.0) {
            return Err(invalid("tracking.search_radius_km must be a positive number"));
        }
        if !(t.marker_radius_factor.is_finite() && t.marker_radius_factor >= 1.0) {
            return Err(invalid("tracking.marker_radius_factor must be at least 1"));
        }
        if t.max_age_ms <= 0 {
            return Err(invalid("tracking.max_age_ms must be positive"));
        }
        if t.poll_interval_ms == 0 {
            return Err(invalid("tracking.poll_interval_ms must be non-zero"));
        }
        if t.cleanup_interval_ms == 0 {
            return Err(invalid("tracking.cleanup_interval_ms must be non-zero"));
        }
        if !self.location.default_position().is_finite() {
            return Err(invalid("location default coordinates must be finite"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_owned())
}

/// Proximity thresholds and timer intervals.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackingConfig {
    /// Detection radius in kilometers.
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,

    /// Reports older than this many milliseconds are hidden.
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: i64,

    /// Radius of the nearest-vehicle search in kilometers.
    #[serde(default = "default_search_radius_km")]
    pub search_radius_km: f64,

    /// Markers are shown up to `radius_km * marker_radius_factor`.
    #[serde(default = "default_marker_radius_factor")]
    pub marker_radius_factor: f64,

    /// How often the self report is published in driver mode.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often stale peers are reported for upstream deletion.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

impl TrackingConfig {
    /// Thresholds for the proximity engine.
    pub const fn proximity_params(&self) -> ProximityParams {
        ProximityParams {
            radius_km: self.radius_km,
            max_age_ms: self.max_age_ms,
            search_radius_km: self.search_radius_km,
        }
    }

    /// Radius inside which peers get a map marker.
    pub fn marker_radius_km(&self) -> f64 {
        self.radius_km * self.marker_radius_factor
    }

    /// Self-report publishing period.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Stale-peer cleanup period.
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            radius_km: default_radius_km(),
            max_age_ms: default_max_age_ms(),
            search_radius_km: default_search_radius_km(),
            marker_radius_factor: default_marker_radius_factor(),
            poll_interval_ms: default_poll_interval_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
        }
    }
}

/// Default observer position.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationConfig {
    /// Latitude used until the first fix.
    #[serde(default = "default_lat")]
    pub default_lat: f64,

    /// Longitude used until the first fix.
    #[serde(default = "default_lng")]
    pub default_lng: f64,
}

impl LocationConfig {
    /// The default position as a [`Coordinate`].
    pub const fn default_position(&self) -> Coordinate {
        Coordinate::new(self.default_lat, self.default_lng)
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            default_lat: default_lat(),
            default_lng: default_lng(),
        }
    }
}

/// Vehicle metadata attached to the self report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DriverConfig {
    /// Kind of vehicle, e.g. `angkot`.
    #[serde(default = "default_vehicle_type")]
    pub vehicle_type: String,

    /// License plate shown to riders.
    #[serde(default)]
    pub plate_number: Option<String>,

    /// Route name shown to riders.
    #[serde(default = "default_route")]
    pub route: String,
}

impl DriverConfig {
    /// Attributes in the feed's field naming.
    pub fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            "vehicleType".to_owned(),
            serde_json::Value::from(self.vehicle_type.as_str()),
        );
        attributes.insert(
            "route".to_owned(),
            serde_json::Value::from(self.route.as_str()),
        );
        if let Some(plate) = &self.plate_number {
            attributes.insert(
                "plateNumber".to_owned(),
                serde_json::Value::from(plate.as_str()),
            );
        }
        attributes
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            vehicle_type: default_vehicle_type(),
            plate_number: None,
            route: default_route(),
        }
    }
}

/// Observer API binding.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Host address to bind.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_observer_port")]
    pub port: u16,
}

impl ObserverConfig {
    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = std::env::var("OBSERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.port = port;
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            host: default_observer_host(),
            port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const fn default_radius_km() -> f64 {
    DEFAULT_RADIUS_KM
}

const fn default_max_age_ms() -> i64 {
    DEFAULT_MAX_AGE_MS
}

const fn default_search_radius_km() -> f64 {
    DEFAULT_SEARCH_RADIUS_KM
}

const fn default_marker_radius_factor() -> f64 {
    2.0
}

const fn default_poll_interval_ms() -> u64 {
    10_000
}

const fn default_cleanup_interval_ms() -> u64 {
    60_000
}

const fn default_lat() -> f64 {
    -6.2088
}

const fn default_lng() -> f64 {
    106.8456
}

fn default_vehicle_type() -> String {
    "angkot".to_owned()
}

fn default_route() -> String {
    "Kampung Melayu - Tanah Abang".to_owned()
}

fn default_observer_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_observer_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

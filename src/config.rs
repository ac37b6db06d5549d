use log::{info, warn};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::mapping::{ChannelSettings, FieldMappings};
use crate::models::{Field, FieldMapping, SensorType, FIELD_SLOTS};
use crate::thingspeak::DEFAULT_BASE_URL;
use crate::timerange::TimeRange;

pub const DEFAULT_REFRESH_SECS: u64 = 15;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ThingSpeak channel ID is not configured")]
    MissingChannelId,
    #[error("ThingSpeak read API key is not configured")]
    MissingApiKey,
    #[error("no field mappings are configured")]
    NoMappings,
    #[error("{0} is mapped more than once")]
    DuplicateField(Field),
    #[error("{0} mappings configured, at most {} are supported", FIELD_SLOTS)]
    TooManyMappings(usize),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
    #[error("settings store is read-only")]
    ReadOnly,
    #[error("settings file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid: {0}")]
    Format(#[from] serde_json::Error),
}

/// Where channel settings are loaded from and saved to
///
/// The poller never reads storage itself; it is handed the loaded value.
pub trait SettingsProvider {
    /// `Ok(None)` when nothing has been stored yet
    fn load(&self) -> Result<Option<ChannelSettings>, ConfigError>;
    fn save(&self, settings: &ChannelSettings) -> Result<(), ConfigError>;
}

/// Settings from environment variables (and `.env`)
///
/// Field mappings come from `THINGSPEAK_FIELDS`
/// (`field1=co,field6=pm25:PM 2.5:µg/m³`), else from individual
/// `THINGSPEAK_FIELD<N>` variables, else the standard board layout.
#[derive(Debug, Clone, Default)]
pub struct EnvSettings {
    vars: HashMap<String, String>,
}

impl EnvSettings {
    pub fn from_env() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    /// Read from an explicit set of variables instead of the process environment
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn mappings(&self) -> Result<FieldMappings, ConfigError> {
        if let Some(list) = self.var("THINGSPEAK_FIELDS") {
            let mut entries = Vec::new();
            for pair in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                entries.push(parse_mapping(pair)?);
            }
            return FieldMappings::from_entries(entries);
        }

        // Fallback to individual variables
        let mut entries = Vec::new();
        for field in Field::all() {
            let key = format!("THINGSPEAK_FIELD{}", field.slot());
            if let Some(value) = self.var(&key) {
                entries.push(parse_mapping(&format!("{}={}", field, value))?);
            }
        }
        if entries.is_empty() {
            info!("No field mappings configured, using the standard layout");
            return Ok(FieldMappings::standard());
        }
        FieldMappings::from_entries(entries)
    }
}

/// Parse `fieldN=type[:label[:unit]]`
pub fn parse_mapping(pair: &str) -> Result<FieldMapping, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "THINGSPEAK_FIELDS".to_string(),
        reason,
    };

    let (field, rest) = pair
        .split_once('=')
        .ok_or_else(|| invalid(format!("expected fieldN=type, got '{}'", pair)))?;
    let field: Field = field.parse().map_err(invalid)?;

    let mut parts = rest.splitn(3, ':').map(str::trim);
    let sensor_type: SensorType = parts.next().unwrap_or_default().parse().map_err(invalid)?;

    let mut mapping = FieldMapping::new(field, sensor_type);
    if let Some(label) = parts.next().filter(|l| !l.is_empty()) {
        mapping.label = label.to_string();
    }
    if let Some(unit) = parts.next() {
        mapping.unit = unit.to_string();
    }
    Ok(mapping)
}

impl SettingsProvider for EnvSettings {
    fn load(&self) -> Result<Option<ChannelSettings>, ConfigError> {
        Ok(Some(ChannelSettings {
            channel_id: self.var("THINGSPEAK_CHANNEL_ID").unwrap_or_default().to_string(),
            api_key: self.var("THINGSPEAK_API_KEY").unwrap_or_default().to_string(),
            mappings: self.mappings()?,
        }))
    }

    fn save(&self, _settings: &ChannelSettings) -> Result<(), ConfigError> {
        Err(ConfigError::ReadOnly)
    }
}

/// Settings persisted as a JSON document
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsProvider for JsonFileSettings {
    fn load(&self) -> Result<Option<ChannelSettings>, ConfigError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, settings: &ChannelSettings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(settings)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Runtime configuration for the monitor binary
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub settings: ChannelSettings,
    pub refresh_interval: Duration,
    pub time_range: TimeRange,
    pub base_url: String,
    pub settings_file: Option<PathBuf>,
}

impl MonitorConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();
        Self::from_env(EnvSettings::from_env())
    }

    pub fn from_env(env_settings: EnvSettings) -> Result<Self, Box<dyn std::error::Error>> {
        let refresh_secs = match env_settings.var("THINGSPEAK_REFRESH_SECS") {
            Some(raw) => raw.parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| ConfigError::Invalid {
                key: "THINGSPEAK_REFRESH_SECS".to_string(),
                reason: format!("'{}' is not a positive number of seconds", raw),
            })?,
            None => DEFAULT_REFRESH_SECS,
        };

        let time_range = match env_settings.var("THINGSPEAK_TIME_RANGE") {
            Some(raw) => raw.parse::<TimeRange>().map_err(|reason| ConfigError::Invalid {
                key: "THINGSPEAK_TIME_RANGE".to_string(),
                reason,
            })?,
            None => TimeRange::default(),
        };

        let base_url = env_settings
            .var("THINGSPEAK_BASE_URL")
            .unwrap_or(DEFAULT_BASE_URL)
            .to_string();

        let settings_file = env_settings.var("THINGSPEAK_SETTINGS_FILE").map(PathBuf::from);

        let settings = match &settings_file {
            Some(path) => load_or_seed(&JsonFileSettings::new(path), &env_settings)?,
            None => env_settings.load()?.ok_or(ConfigError::NoMappings)?,
        };

        info!(
            "Channel {} with {} mapped fields, refresh every {}s, range {}",
            if settings.channel_id.is_empty() { "<unset>" } else { settings.channel_id.as_str() },
            settings.mappings.len(),
            refresh_secs,
            time_range
        );

        Ok(MonitorConfig {
            settings,
            refresh_interval: Duration::from_secs(refresh_secs),
            time_range,
            base_url,
            settings_file,
        })
    }

    /// Where the channel settings were loaded from, for logging
    pub fn settings_source(&self) -> String {
        match &self.settings_file {
            Some(path) => path.display().to_string(),
            None => "environment".to_string(),
        }
    }
}

/// Load stored settings, seeding the store from `fallback` on first run
pub fn load_or_seed(
    store: &dyn SettingsProvider,
    fallback: &dyn SettingsProvider,
) -> Result<ChannelSettings, ConfigError> {
    if let Some(settings) = store.load()? {
        return Ok(settings);
    }
    let settings = fallback.load()?.ok_or(ConfigError::NoMappings)?;
    match store.save(&settings) {
        Ok(()) => info!("Seeded settings store from environment"),
        Err(e) => warn!("Could not seed settings store: {}", e),
    }
    Ok(settings)
}

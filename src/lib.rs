pub mod classify;
pub mod config;
pub mod mapping;
pub mod models;
pub mod poller;
pub mod summary;
pub mod thingspeak;
pub mod timerange;
pub mod utils;

pub use classify::{classify, health_advisory, pm10_aqi, pm25_aqi, AqiLevel, AqiStatus};
pub use config::{ConfigError, MonitorConfig, SettingsProvider};
pub use mapping::{ChannelSettings, FieldMappings};
pub use models::{Bucket, ChartPoint, Field, FieldMapping, HistoricalSample, SensorReading, SensorType};
pub use poller::{Poller, PollerPhase, Snapshot};
pub use timerange::{bucket, results_for, TimeRange};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Number of numbered fields a ThingSpeak channel exposes
pub const FIELD_SLOTS: u8 = 8;

/// Semantic kind of a channel field
///
/// Determines which classification scale applies and the default label/unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Co,
    Pm25,
    Pm10,
    Iaq,
    Voc,
    AqiCo,
    Temperature,
    Humidity,
    Custom,
}

impl SensorType {
    pub const ALL: [SensorType; 9] = [
        SensorType::Co,
        SensorType::Pm25,
        SensorType::Pm10,
        SensorType::Iaq,
        SensorType::Voc,
        SensorType::AqiCo,
        SensorType::Temperature,
        SensorType::Humidity,
        SensorType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Co => "co",
            SensorType::Pm25 => "pm25",
            SensorType::Pm10 => "pm10",
            SensorType::Iaq => "iaq",
            SensorType::Voc => "voc",
            SensorType::AqiCo => "aqi_co",
            SensorType::Temperature => "temperature",
            SensorType::Humidity => "humidity",
            SensorType::Custom => "custom",
        }
    }

    /// Default presentation metadata as `(label, unit)`
    ///
    /// `Custom` has none; its label and unit are whatever the user typed.
    pub fn defaults(&self) -> Option<(&'static str, &'static str)> {
        match self {
            SensorType::Co => Some(("CO Level", "ppm")),
            SensorType::Pm25 => Some(("PM 2.5", "µg/m³")),
            SensorType::Pm10 => Some(("PM 10", "µg/m³")),
            SensorType::Iaq => Some(("IAQ Index", "IAQ")),
            SensorType::Voc => Some(("IAQ VOC", "IAQ")),
            SensorType::AqiCo => Some(("AQI-CO", "AQI")),
            SensorType::Temperature => Some(("Temperature", "°C")),
            SensorType::Humidity => Some(("Humidity", "%")),
            SensorType::Custom => None,
        }
    }

    /// Pollutant readings, as opposed to ambient conditions
    pub fn is_air_quality(&self) -> bool {
        matches!(
            self,
            SensorType::Co
                | SensorType::Pm25
                | SensorType::Pm10
                | SensorType::Iaq
                | SensorType::Voc
                | SensorType::AqiCo
        )
    }

    pub fn is_environmental(&self) -> bool {
        matches!(self, SensorType::Temperature | SensorType::Humidity)
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SensorType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown sensor type '{}'", s.trim()))
    }
}

/// One of the eight numbered channel fields (`field1` ..= `field8`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Field(u8);

impl Field {
    pub fn new(slot: u8) -> Option<Self> {
        (1..=FIELD_SLOTS).contains(&slot).then_some(Field(slot))
    }

    pub fn slot(&self) -> u8 {
        self.0
    }

    /// Key used by the remote API for this field
    pub fn key(&self) -> String {
        format!("field{}", self.0)
    }

    pub fn all() -> impl Iterator<Item = Field> {
        (1..=FIELD_SLOTS).map(Field)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field{}", self.0)
    }
}

impl FromStr for Field {
    type Err = String;

    /// Accepts `field3` as well as a bare `3`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("field").unwrap_or(trimmed);
        digits.parse::<u8>().ok().and_then(Field::new).ok_or_else(|| {
            format!("unknown field '{}' (expected field1..field{})", trimmed, FIELD_SLOTS)
        })
    }
}

impl TryFrom<String> for Field {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.key()
    }
}

/// Association of a numbered channel field with a sensor type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field: Field,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub label: String,
    pub unit: String,
}

impl FieldMapping {
    /// Mapping with the type's default label and unit
    pub fn new(field: Field, sensor_type: SensorType) -> Self {
        let (label, unit) = sensor_type.defaults().unwrap_or(("Custom", ""));
        FieldMapping {
            field,
            sensor_type,
            label: label.to_string(),
            unit: unit.to_string(),
        }
    }
}

/// Latest decoded value for one configured mapping
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub sensor_type: SensorType,
    pub label: String,
    pub value: f64,
    pub unit: String,
    pub field: Field,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleValue {
    pub field: Field,
    pub sensor_type: SensorType,
    pub value: f64,
}

/// One decoded feed record, carrying a value for every configured mapping
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSample {
    pub timestamp: OffsetDateTime,
    pub values: Vec<SampleValue>,
}

impl HistoricalSample {
    /// Value of the first mapping with this type
    pub fn get(&self, sensor_type: SensorType) -> Option<f64> {
        self.values
            .iter()
            .find(|v| v.sensor_type == sensor_type)
            .map(|v| v.value)
    }
}

/// A `{timestamp, value}` pair as handed to a chart
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub timestamp: OffsetDateTime,
    pub value: f64,
}

/// Fixed-width aggregation slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub slot_start: OffsetDateTime,
    /// Mean of member samples, 0 when empty
    pub value: f64,
    pub samples: usize,
}

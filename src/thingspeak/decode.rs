/// Projection of raw feed records onto configured mappings
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use time::OffsetDateTime;

use crate::mapping::FieldMappings;
use crate::models::{HistoricalSample, SampleValue, SensorReading};

/// One record as returned by the feed endpoints
///
/// Field values arrive as strings, numbers or null depending on the channel,
/// so everything besides the timestamp is kept as a generic keyed record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub entry_id: Option<u64>,
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelInfo {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of the history endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub channel: Option<ChannelInfo>,
    #[serde(default)]
    pub feeds: Vec<FeedEntry>,
}

/// Numeric value of a raw field
///
/// Missing, null, empty and unparseable values all become 0; so do
/// non-finite numbers. A bad field is a data-quality problem, not a failure.
pub fn parse_field(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => v,
        Some(_) | None => {
            if let Some(raw) = value.filter(|v| !v.is_null()) {
                if raw.as_str().map_or(true, |s| !s.trim().is_empty()) {
                    debug!("Substituting 0 for non-numeric field value {}", raw);
                }
            }
            0.0
        }
    }
}

impl FeedEntry {
    pub fn value(&self, key: &str) -> f64 {
        parse_field(self.fields.get(key))
    }
}

/// Decode one record into a sample with a value for every mapping
pub fn decode_sample(entry: &FeedEntry, mappings: &FieldMappings) -> HistoricalSample {
    HistoricalSample {
        timestamp: entry.created_at,
        values: mappings
            .iter()
            .map(|m| SampleValue {
                field: m.field,
                sensor_type: m.sensor_type,
                value: entry.value(&m.field.key()),
            })
            .collect(),
    }
}

/// Decode a page of records, oldest first
pub fn decode_history(entries: &[FeedEntry], mappings: &FieldMappings) -> Vec<HistoricalSample> {
    let mut history: Vec<HistoricalSample> = entries
        .iter()
        .map(|e| decode_sample(e, mappings))
        .collect();
    // The API already returns ascending order; a stable sort keeps it that way
    history.sort_by_key(|s| s.timestamp);
    history
}

/// Readings in mapping order from one record
pub fn decode_readings(entry: &FeedEntry, mappings: &FieldMappings) -> Vec<SensorReading> {
    mappings
        .iter()
        .map(|m| SensorReading {
            sensor_type: m.sensor_type,
            label: m.label.clone(),
            value: entry.value(&m.field.key()),
            unit: m.unit.clone(),
            field: m.field,
        })
        .collect()
}

/// Readings from an already decoded sample
pub fn readings_from_sample(sample: &HistoricalSample, mappings: &FieldMappings) -> Vec<SensorReading> {
    mappings
        .iter()
        .map(|m| SensorReading {
            sensor_type: m.sensor_type,
            label: m.label.clone(),
            value: sample
                .values
                .iter()
                .find(|v| v.field == m.field)
                .map_or(0.0, |v| v.value),
            unit: m.unit.clone(),
            field: m.field,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Field, SensorType};
    use serde_json::json;
    use time::macros::datetime;

    fn mappings() -> FieldMappings {
        let mut m = FieldMappings::new();
        m.add(SensorType::Co).unwrap();
        m.add(SensorType::Pm25).unwrap();
        m.add(SensorType::Humidity).unwrap();
        m
    }

    #[test]
    fn test_parse_field_never_fails() {
        assert_eq!(parse_field(Some(&json!("3.25"))), 3.25);
        assert_eq!(parse_field(Some(&json!(" 7 "))), 7.0);
        assert_eq!(parse_field(Some(&json!(12.5))), 12.5);
        assert_eq!(parse_field(Some(&json!(""))), 0.0);
        assert_eq!(parse_field(Some(&json!("n/a"))), 0.0);
        assert_eq!(parse_field(Some(&json!("NaN"))), 0.0);
        assert_eq!(parse_field(Some(&json!(null))), 0.0);
        assert_eq!(parse_field(Some(&json!([1, 2]))), 0.0);
        assert_eq!(parse_field(None), 0.0);
    }

    #[test]
    fn test_feed_entry_deserialize() {
        let entry: FeedEntry = serde_json::from_value(json!({
            "created_at": "2024-01-01T00:00:00Z",
            "entry_id": 42,
            "field1": "3.2",
            "field2": null,
            "field3": "garbage"
        }))
        .unwrap();

        assert_eq!(entry.created_at, datetime!(2024-01-01 00:00 UTC));
        assert_eq!(entry.entry_id, Some(42));

        let readings = decode_readings(&entry, &mappings());
        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![3.2, 0.0, 0.0]);
        assert_eq!(readings[0].label, "CO Level");
        assert_eq!(readings[2].field, Field::new(3).unwrap());
    }

    #[test]
    fn test_history_is_sorted_and_complete() {
        let page: FeedPage = serde_json::from_value(json!({
            "channel": {"id": 123456, "name": "Lab sensors"},
            "feeds": [
                {"created_at": "2024-01-01T02:00:00Z", "field1": "2"},
                {"created_at": "2024-01-01T01:00:00Z", "field1": "1", "field2": "9"}
            ]
        }))
        .unwrap();
        assert_eq!(page.channel.unwrap().name.as_deref(), Some("Lab sensors"));

        let history = decode_history(&page.feeds, &mappings());
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].get(SensorType::Co), Some(1.0));
        assert_eq!(history[1].get(SensorType::Pm25), Some(0.0));
        assert_eq!(history[1].values.len(), 3);

        let readings = readings_from_sample(&history[1], &mappings());
        assert_eq!(readings[0].value, 2.0);
    }
}

/// Averages, overall air quality and chart data derived from polled data
use std::fmt;
use time::OffsetDateTime;

use crate::classify::{classify, index_status, pm10_aqi, pm25_aqi, AqiStatus};
use crate::models::{Bucket, HistoricalSample, SensorReading, SensorType};
use crate::timerange::{bucket_history, TimeRange};

/// Mean of every decoded value of `sensor_type` in the history
///
/// Returns 0 for an empty history or an unmapped type.
pub fn average_of(history: &[HistoricalSample], sensor_type: SensorType) -> f64 {
    let values: Vec<f64> = history
        .iter()
        .filter_map(|s| s.get(sensor_type))
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Pollutants competing for the overall index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pollutant {
    CarbonMonoxide,
    Voc,
    Pm25,
    Pm10,
}

impl Pollutant {
    /// Tie-break order: earlier entries win equal values
    const PRIORITY: [(Pollutant, SensorType); 4] = [
        (Pollutant::CarbonMonoxide, SensorType::AqiCo),
        (Pollutant::Voc, SensorType::Voc),
        (Pollutant::Pm25, SensorType::Pm25),
        (Pollutant::Pm10, SensorType::Pm10),
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Pollutant::CarbonMonoxide => "Carbon Monoxide",
            Pollutant::Voc => "VOCs",
            Pollutant::Pm25 => "PM 2.5",
            Pollutant::Pm10 => "PM 10",
        }
    }

    /// Reading expressed on the 0-500 index scale
    fn scaled(&self, raw: f64) -> f64 {
        match self {
            Pollutant::Pm25 => pm25_aqi(raw) as f64,
            Pollutant::Pm10 => pm10_aqi(raw) as f64,
            Pollutant::CarbonMonoxide | Pollutant::Voc => {
                if raw.is_finite() && raw > 0.0 {
                    raw
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Worst pollutant across the configured readings
#[derive(Debug, Clone, PartialEq)]
pub struct OverallAqi {
    pub value: f64,
    /// `None` when no competing pollutant is configured
    pub pollutant: Option<Pollutant>,
    pub status: AqiStatus,
}

impl OverallAqi {
    pub fn pollutant_name(&self) -> &'static str {
        self.pollutant.map_or("Air Quality", |p| p.name())
    }
}

/// Maximum of the AQI-scaled readings
///
/// PM2.5 and PM10 go through the EPA conversion; AQI-CO and VOC are already
/// index values. Unconfigured pollutants do not compete rather than counting
/// as 0, so a lone PM10 at 0 is reported as PM10 and not as a tie won by
/// CO-AQI. Ties among configured pollutants follow `Pollutant::PRIORITY`.
///
/// # Arguments
/// * `readings` - Latest readings; only the first of each pollutant type is used
///
/// # Returns
/// Worst scaled value with its pollutant (None when nothing competed) and status
pub fn overall_aqi(readings: &[SensorReading]) -> OverallAqi {
    let mut best: Option<(Pollutant, f64)> = None;

    for (pollutant, sensor_type) in Pollutant::PRIORITY {
        let Some(reading) = readings.iter().find(|r| r.sensor_type == sensor_type) else {
            continue;
        };
        let scaled = pollutant.scaled(reading.value);
        match best {
            Some((_, current)) if scaled <= current => {}
            _ => best = Some((pollutant, scaled)),
        }
    }

    let value = best.map_or(0.0, |(_, v)| v);
    OverallAqi {
        value,
        pollutant: best.map(|(p, _)| p),
        status: index_status(value),
    }
}

/// Everything a chart needs for one reading
#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub title: String,
    pub unit: String,
    pub color: &'static str,
    pub status: AqiStatus,
    pub buckets: Vec<Bucket>,
    pub average: f64,
    pub current: f64,
}

pub fn chart_data(
    reading: &SensorReading,
    history: &[HistoricalSample],
    range: TimeRange,
    now: OffsetDateTime,
) -> ChartData {
    let status = classify(reading.sensor_type, reading.value);
    ChartData {
        title: reading.label.clone(),
        unit: reading.unit.clone(),
        color: status.color,
        status,
        buckets: bucket_history(history, reading.sensor_type, range, now),
        average: average_of(history, reading.sensor_type),
        current: reading.value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::AqiLevel;
    use crate::models::{Field, SampleValue};

    fn reading(sensor_type: SensorType, value: f64) -> SensorReading {
        SensorReading {
            sensor_type,
            label: sensor_type.to_string(),
            value,
            unit: String::new(),
            field: Field::new(1).unwrap(),
        }
    }

    fn sample(value: f64) -> HistoricalSample {
        HistoricalSample {
            timestamp: OffsetDateTime::UNIX_EPOCH,
            values: vec![SampleValue {
                field: Field::new(1).unwrap(),
                sensor_type: SensorType::Co,
                value,
            }],
        }
    }

    #[test]
    fn test_average_of() {
        let history = vec![sample(1.0), sample(5.0), sample(9.5)];
        assert!((average_of(&history, SensorType::Co) - 15.5 / 3.0).abs() < 1e-9);
        assert_eq!(average_of(&history, SensorType::Pm25), 0.0);
        assert_eq!(average_of(&[], SensorType::Co), 0.0);
    }

    #[test]
    fn test_overall_picks_highest_scaled_value() {
        let readings = vec![
            reading(SensorType::AqiCo, 40.0),
            reading(SensorType::Voc, 80.0),
            // 35.4 µg/m³ is AQI 100
            reading(SensorType::Pm25, 35.4),
            reading(SensorType::Pm10, 20.0),
        ];
        let overall = overall_aqi(&readings);
        assert_eq!(overall.value, 100.0);
        assert_eq!(overall.pollutant, Some(Pollutant::Pm25));
        assert_eq!(overall.status.level, AqiLevel::Moderate);
    }

    #[test]
    fn test_overall_ties_go_to_priority_order() {
        let readings = vec![
            reading(SensorType::Pm25, 12.0), // AQI 50
            reading(SensorType::Voc, 50.0),
        ];
        assert_eq!(overall_aqi(&readings).pollutant, Some(Pollutant::Voc));

        let all_zero = vec![reading(SensorType::Pm10, 0.0), reading(SensorType::AqiCo, 0.0)];
        assert_eq!(overall_aqi(&all_zero).pollutant, Some(Pollutant::CarbonMonoxide));
    }

    #[test]
    fn test_overall_ignores_unconfigured_pollutants() {
        let readings = vec![reading(SensorType::Pm10, 0.0)];
        let overall = overall_aqi(&readings);
        assert_eq!(overall.value, 0.0);
        assert_eq!(overall.pollutant, Some(Pollutant::Pm10));
        assert_eq!(overall.pollutant_name(), "PM 10");
    }

    #[test]
    fn test_overall_without_candidates() {
        let readings = vec![reading(SensorType::Temperature, 22.0), reading(SensorType::Co, 30.0)];
        let overall = overall_aqi(&readings);
        assert_eq!(overall.value, 0.0);
        assert_eq!(overall.pollutant, None);
        assert_eq!(overall.pollutant_name(), "Air Quality");
        assert_eq!(overall.status.level, AqiLevel::Good);
    }
}

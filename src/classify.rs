/// Air quality classification against breakpoint tables and EPA AQI conversion

use crate::models::SensorType;

/// Health level, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AqiLevel {
    Good,
    Moderate,
    UnhealthySensitive,
    Unhealthy,
    Hazardous,
}

impl AqiLevel {
    pub fn slug(&self) -> &'static str {
        match self {
            AqiLevel::Good => "good",
            AqiLevel::Moderate => "moderate",
            AqiLevel::UnhealthySensitive => "unhealthy-sensitive",
            AqiLevel::Unhealthy => "unhealthy",
            AqiLevel::Hazardous => "hazardous",
        }
    }

    /// Shared palette; a level renders the same for every pollutant
    pub fn color(&self) -> &'static str {
        match self {
            AqiLevel::Good => "hsl(142, 76%, 45%)",
            AqiLevel::Moderate => "hsl(45, 93%, 50%)",
            AqiLevel::UnhealthySensitive => "hsl(25, 95%, 53%)",
            AqiLevel::Unhealthy => "hsl(0, 84%, 55%)",
            AqiLevel::Hazardous => "hsl(280, 60%, 35%)",
        }
    }

    pub fn advisory(&self) -> &'static str {
        match self {
            AqiLevel::Good => "Air quality is satisfactory. Enjoy outdoor activities freely.",
            AqiLevel::Moderate => "Air quality is acceptable. Unusually sensitive people should consider reducing prolonged outdoor exertion.",
            AqiLevel::UnhealthySensitive => "Members of sensitive groups may experience health effects. The general public is less likely to be affected.",
            AqiLevel::Unhealthy => "Air quality is unhealthy. Everyone may begin to experience health effects. Avoid prolonged outdoor exposure.",
            AqiLevel::Hazardous => "Health alert: everyone may experience more serious health effects. Stay indoors and keep windows closed.",
        }
    }
}

/// Classified level plus its display metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AqiStatus {
    pub level: AqiLevel,
    pub label: &'static str,
    pub color: &'static str,
}

impl AqiStatus {
    fn new(level: AqiLevel, label: &'static str) -> Self {
        AqiStatus {
            level,
            label,
            color: level.color(),
        }
    }

    pub fn bg_class(&self) -> String {
        format!("bg-aqi-{}", self.level.slug())
    }

    pub fn text_class(&self) -> String {
        format!("text-aqi-{}", self.level.slug())
    }

    pub fn border_class(&self) -> String {
        format!("border-aqi-{}", self.level.slug())
    }

    pub fn card_class(&self) -> String {
        format!("aqi-card-{}", self.level.slug())
    }
}

// Upper bounds are inclusive; anything above the last bound takes the final level.
const CO_SCALE: [(f64, AqiLevel, &str); 2] = [
    (4.4, AqiLevel::Good, "Safe"),
    (9.4, AqiLevel::Moderate, "Elevated"),
];
const CO_CEILING: (AqiLevel, &str) = (AqiLevel::Unhealthy, "Dangerous");

const PM_SCALE: [(f64, AqiLevel, &str); 4] = [
    (12.0, AqiLevel::Good, "Good"),
    (35.0, AqiLevel::Moderate, "Moderate"),
    (55.0, AqiLevel::UnhealthySensitive, "Unhealthy for Sensitive"),
    (150.0, AqiLevel::Unhealthy, "Unhealthy"),
];

const INDEX_SCALE: [(f64, AqiLevel, &str); 4] = [
    (50.0, AqiLevel::Good, "Good"),
    (100.0, AqiLevel::Moderate, "Moderate"),
    (150.0, AqiLevel::UnhealthySensitive, "Unhealthy for Sensitive"),
    (200.0, AqiLevel::Unhealthy, "Unhealthy"),
];

const HAZARDOUS: (AqiLevel, &str) = (AqiLevel::Hazardous, "Hazardous");

/// Value used for types without a health scale
const NEUTRAL_INDEX: f64 = 50.0;

/// Negative and NaN inputs count as 0
fn sanitize(value: f64) -> f64 {
    if value.is_nan() || value < 0.0 {
        0.0
    } else {
        value
    }
}

fn lookup(value: f64, scale: &[(f64, AqiLevel, &'static str)], ceiling: (AqiLevel, &'static str)) -> AqiStatus {
    let value = sanitize(value);
    let (level, label) = scale
        .iter()
        .find(|(upper, _, _)| value <= *upper)
        .map(|(_, level, label)| (*level, *label))
        .unwrap_or(ceiling);
    AqiStatus::new(level, label)
}

/// Raw CO concentration in ppm; never reaches hazardous
pub fn co_status(ppm: f64) -> AqiStatus {
    lookup(ppm, &CO_SCALE, CO_CEILING)
}

/// Raw PM2.5 / PM10 concentration in µg/m³
pub fn pm_status(concentration: f64) -> AqiStatus {
    lookup(concentration, &PM_SCALE, HAZARDOUS)
}

/// Values already on a 0-500 index scale (IAQ, VOC, AQI-CO)
pub fn index_status(index: f64) -> AqiStatus {
    lookup(index, &INDEX_SCALE, HAZARDOUS)
}

/// Classify a measurement according to its sensor type
pub fn classify(sensor_type: SensorType, value: f64) -> AqiStatus {
    match sensor_type {
        SensorType::Co => co_status(value),
        SensorType::Pm25 | SensorType::Pm10 => pm_status(value),
        SensorType::Iaq | SensorType::Voc | SensorType::AqiCo => index_status(value),
        SensorType::Temperature | SensorType::Humidity | SensorType::Custom => {
            index_status(NEUTRAL_INDEX)
        }
    }
}

/// Advisory text for a status, or the no-data fallback
pub fn health_advisory(status: Option<&AqiStatus>) -> &'static str {
    match status {
        Some(status) => status.level.advisory(),
        None => "No data available.",
    }
}

/// EPA breakpoint row: concentration range mapped onto an index range
type Breakpoint = (f64, f64, f64, f64);

const PM25_BREAKPOINTS: [Breakpoint; 5] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.1, 35.4, 51.0, 100.0),
    (35.5, 55.4, 101.0, 150.0),
    (55.5, 150.4, 151.0, 200.0),
    (150.5, 250.4, 201.0, 300.0),
];

const PM10_BREAKPOINTS: [Breakpoint; 4] = [
    (0.0, 54.0, 0.0, 50.0),
    (55.0, 154.0, 51.0, 100.0),
    (155.0, 254.0, 101.0, 150.0),
    (255.0, 354.0, 151.0, 200.0),
];

/// Concentrations beyond the last breakpoint are reported flat at this value
const AQI_CEILING: u16 = 300;

fn interpolate(concentration: f64, breakpoints: &[Breakpoint]) -> u16 {
    let c = sanitize(concentration);

    // Rows are matched on the upper bound so values in the gaps between
    // published ranges (e.g. 12.05) land in the next row.
    for &(c_low, c_high, i_low, i_high) in breakpoints {
        if c <= c_high {
            // AQI = ((Ihigh - Ilow) / (Chigh - Clow)) * (C - Clow) + Ilow
            let aqi = (i_high - i_low) / (c_high - c_low) * (c - c_low) + i_low;
            return aqi.round().max(0.0) as u16;
        }
    }

    AQI_CEILING
}

/// EPA AQI for a PM2.5 concentration in µg/m³
pub fn pm25_aqi(concentration: f64) -> u16 {
    interpolate(concentration, &PM25_BREAKPOINTS)
}

/// EPA AQI for a PM10 concentration in µg/m³
pub fn pm10_aqi(concentration: f64) -> u16 {
    interpolate(concentration, &PM10_BREAKPOINTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pm_boundaries_round_down() {
        assert_eq!(pm_status(12.0).level, AqiLevel::Good);
        assert_eq!(pm_status(12.01).level, AqiLevel::Moderate);
        assert_eq!(pm_status(35.0).level, AqiLevel::Moderate);
        assert_eq!(pm_status(55.0).level, AqiLevel::UnhealthySensitive);
        assert_eq!(pm_status(150.0).level, AqiLevel::Unhealthy);
        assert_eq!(pm_status(150.1).level, AqiLevel::Hazardous);
    }

    #[test]
    fn test_co_has_three_levels() {
        assert_eq!(co_status(0.0).level, AqiLevel::Good);
        assert_eq!(co_status(4.4).level, AqiLevel::Good);
        assert_eq!(co_status(4.5).level, AqiLevel::Moderate);
        assert_eq!(co_status(9.4).level, AqiLevel::Moderate);
        assert_eq!(co_status(9.5).level, AqiLevel::Unhealthy);
        assert_eq!(co_status(10_000.0).level, AqiLevel::Unhealthy);
        assert_eq!(co_status(3.2).label, "Safe");
        assert_eq!(co_status(50.0).label, "Dangerous");
    }

    #[test]
    fn test_index_scale() {
        assert_eq!(index_status(50.0).level, AqiLevel::Good);
        assert_eq!(index_status(100.0).level, AqiLevel::Moderate);
        assert_eq!(index_status(150.0).level, AqiLevel::UnhealthySensitive);
        assert_eq!(index_status(200.0).level, AqiLevel::Unhealthy);
        assert_eq!(index_status(200.5).level, AqiLevel::Hazardous);
    }

    #[test]
    fn test_invalid_inputs_treated_as_zero() {
        assert_eq!(pm_status(-5.0).level, AqiLevel::Good);
        assert_eq!(co_status(f64::NAN).level, AqiLevel::Good);
        assert_eq!(index_status(f64::INFINITY).level, AqiLevel::Hazardous);
        assert_eq!(pm25_aqi(-1.0), 0);
        assert_eq!(pm25_aqi(f64::NAN), 0);
    }

    #[test]
    fn test_dispatch_by_type() {
        assert_eq!(classify(SensorType::Co, 9.0).level, AqiLevel::Moderate);
        assert_eq!(classify(SensorType::Pm10, 60.0).level, AqiLevel::Unhealthy);
        assert_eq!(classify(SensorType::Voc, 120.0).level, AqiLevel::UnhealthySensitive);
        assert_eq!(classify(SensorType::AqiCo, 250.0).level, AqiLevel::Hazardous);
        // No health scale: neutral status regardless of value
        assert_eq!(classify(SensorType::Temperature, 900.0).level, AqiLevel::Good);
        assert_eq!(classify(SensorType::Custom, -3.0).level, AqiLevel::Good);
    }

    #[test]
    fn test_palette_is_shared() {
        assert_eq!(co_status(5.0).color, pm_status(20.0).color);
        assert_eq!(co_status(5.0).color, index_status(75.0).color);
        assert_eq!(pm_status(200.0).card_class(), "aqi-card-hazardous");
        assert_eq!(index_status(120.0).text_class(), "text-aqi-unhealthy-sensitive");
    }

    #[test]
    fn test_pm25_aqi() {
        assert_eq!(pm25_aqi(0.0), 0);
        assert_eq!(pm25_aqi(6.0), 25);
        assert_eq!(pm25_aqi(12.0), 50);
        assert_eq!(pm25_aqi(12.1), 51);
        assert_eq!(pm25_aqi(35.4), 100);
        assert_eq!(pm25_aqi(35.5), 101);
        assert_eq!(pm25_aqi(55.4), 150);
        assert_eq!(pm25_aqi(150.4), 200);
        assert_eq!(pm25_aqi(250.4), 300);
        assert_eq!(pm25_aqi(500.0), 300);
    }

    #[test]
    fn test_pm25_aqi_is_monotonic() {
        let mut previous = 0;
        for step in 0..=6000 {
            let aqi = pm25_aqi(step as f64 * 0.05);
            assert!(aqi >= previous, "aqi dropped at {}", step as f64 * 0.05);
            previous = aqi;
        }
    }

    #[test]
    fn test_pm10_aqi() {
        assert_eq!(pm10_aqi(0.0), 0);
        assert_eq!(pm10_aqi(54.0), 50);
        assert_eq!(pm10_aqi(55.0), 51);
        assert_eq!(pm10_aqi(154.0), 100);
        assert_eq!(pm10_aqi(354.0), 200);
        assert_eq!(pm10_aqi(400.0), 300);
    }

    #[test]
    fn test_health_advisory() {
        assert_eq!(health_advisory(None), "No data available.");
        let hazardous = pm_status(400.0);
        assert!(health_advisory(Some(&hazardous)).starts_with("Health alert"));
    }
}

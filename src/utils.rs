/// Utility functions for formatting and console status output
use log::{info, warn};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::classify::{classify, health_advisory};
use crate::poller::Snapshot;
use crate::timerange::TimeRange;

const DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[day].[month].[year] - [hour]:[minute]:[second]");
const TIME_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");
const SLOT_FORMAT: &[FormatItem<'static>] = format_description!("[month]-[day] [hour]:[minute]");

/// Render `dt` as `DD.MM.YYYY - HH:MM:SS` for status lines
///
/// Uses the value's own offset; a formatting failure yields its `Display` output.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    dt.format(DATETIME_FORMAT).unwrap_or_else(|_| dt.to_string())
}

pub fn format_time(dt: &OffsetDateTime) -> String {
    dt.format(TIME_FORMAT).unwrap_or_else(|_| dt.to_string())
}

/// Connectivity indicator text
pub fn connection_status(snapshot: &Snapshot) -> String {
    if snapshot.is_loading {
        return "Fetching...".to_string();
    }
    if snapshot.is_connected() {
        return match &snapshot.last_updated {
            Some(t) => format!("Updated: {}", format_time(t)),
            None => "Updated: Never".to_string(),
        };
    }
    snapshot
        .error
        .clone()
        .unwrap_or_else(|| "Disconnected".to_string())
}

/// Sparkline of bucket values scaled to the largest one
fn sparkline(values: &[f64]) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let max = values.iter().cloned().fold(0.0_f64, f64::max);
    values
        .iter()
        .map(|v| {
            if max <= 0.0 {
                BARS[0]
            } else {
                let index = ((v / max) * (BARS.len() - 1) as f64).round() as usize;
                BARS[index.min(BARS.len() - 1)]
            }
        })
        .collect()
}

/// Log the current state of the channel
pub fn log_summary(snapshot: &Snapshot, range: TimeRange, now: OffsetDateTime) {
    info!("Status: {}", connection_status(snapshot));

    if snapshot.readings.is_empty() {
        warn!(
            "{}",
            snapshot.error.as_deref().unwrap_or("No data available.")
        );
        return;
    }

    let overall = snapshot.overall();
    info!(
        "Overall air quality: {} ({}), driven by {}",
        overall.value.round(),
        overall.status.label,
        overall.pollutant_name()
    );
    info!("  {}", health_advisory(Some(&overall.status)));

    for reading in snapshot.air_quality_readings() {
        let status = classify(reading.sensor_type, reading.value);
        info!(
            "  {}: {:.2} {} [{}], {} average {:.2}",
            reading.label,
            reading.value,
            reading.unit,
            status.label,
            range.label(),
            snapshot.average_of(reading.sensor_type)
        );
    }
    for reading in snapshot.environmental_readings() {
        info!("  {}: {:.1} {}", reading.label, reading.value, reading.unit);
    }

    for chart in snapshot.charts(range, now) {
        let values: Vec<f64> = chart.buckets.iter().map(|b| b.value).collect();
        let span = match (chart.buckets.first(), chart.buckets.last()) {
            (Some(first), Some(last)) => format!(
                "{} .. {}",
                first.slot_start.format(SLOT_FORMAT).unwrap_or_default(),
                last.slot_start.format(SLOT_FORMAT).unwrap_or_default()
            ),
            _ => String::new(),
        };
        info!("  {} trend {} {}", chart.title, sparkline(&values), span);
    }
}

use log::{error, info};
use std::sync::Arc;
use time::OffsetDateTime;

use thingspeak_aqi_monitor::config::MonitorConfig;
use thingspeak_aqi_monitor::poller::Poller;
use thingspeak_aqi_monitor::thingspeak::ThingSpeakClient;
use thingspeak_aqi_monitor::timerange::results_for;
use thingspeak_aqi_monitor::utils::{format_datetime, log_summary};

async fn main_loop(config: MonitorConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting ThingSpeak air quality monitor");
    info!("Settings loaded from {}", config.settings_source());

    let client = ThingSpeakClient::new(&config.base_url)?;
    let poller = Poller::new(Arc::new(client), config.refresh_interval);
    let mut updates = poller.subscribe();

    poller.start(config.settings.clone(), results_for(config.time_range))?;

    loop {
        // Sender lives inside the poller, so this only fails if it is gone
        if updates.changed().await.is_err() {
            return Ok(());
        }

        let snapshot = updates.borrow_and_update().clone();
        if snapshot.is_loading {
            continue;
        }

        let now = OffsetDateTime::now_utc();
        info!("Update at: {}", format_datetime(&now));
        log_summary(&snapshot, config.time_range, now);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match MonitorConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(config) => {
            match result {
                Ok(_) => info!("Monitor stopped"),
                Err(e) => {
                    error!("Fatal error: {}", e);
                    return Err(e);
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}

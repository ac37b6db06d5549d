/// Timer-driven polling of a ThingSpeak channel with atomic snapshot publication

use futures_util::future::join;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::ConfigError;
use crate::mapping::ChannelSettings;
use crate::models::{HistoricalSample, SensorReading, SensorType};
use crate::summary::{average_of, chart_data, overall_aqi, ChartData, OverallAqi};
use crate::thingspeak::decode::{decode_history, decode_readings, readings_from_sample};
use crate::thingspeak::{FeedEntry, FeedError, FeedPage, FeedSource};
use crate::timerange::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollerPhase {
    #[default]
    Idle,
    Fetching,
    Ready,
    Errored,
}

/// Everything consumers read, replaced atomically after each cycle
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub phase: PollerPhase,
    pub readings: Vec<SensorReading>,
    pub history: Vec<HistoricalSample>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<OffsetDateTime>,
}

impl Snapshot {
    pub fn get_reading(&self, sensor_type: SensorType) -> Option<&SensorReading> {
        self.readings.iter().find(|r| r.sensor_type == sensor_type)
    }

    pub fn average_of(&self, sensor_type: SensorType) -> f64 {
        average_of(&self.history, sensor_type)
    }

    pub fn overall(&self) -> OverallAqi {
        overall_aqi(&self.readings)
    }

    pub fn is_connected(&self) -> bool {
        !self.is_loading && self.error.is_none() && self.phase == PollerPhase::Ready
    }

    pub fn air_quality_readings(&self) -> impl Iterator<Item = &SensorReading> {
        self.readings.iter().filter(|r| r.sensor_type.is_air_quality())
    }

    pub fn environmental_readings(&self) -> impl Iterator<Item = &SensorReading> {
        self.readings.iter().filter(|r| r.sensor_type.is_environmental())
    }

    /// Chart data for every air quality reading
    pub fn charts(&self, range: TimeRange, now: OffsetDateTime) -> Vec<ChartData> {
        self.air_quality_readings()
            .map(|r| chart_data(r, &self.history, range, now))
            .collect()
    }
}

struct Shared {
    state: watch::Sender<Snapshot>,
    /// Sequence number of the most recently issued cycle
    issued: AtomicU64,
    /// Bumped on every stop/reconfigure; cycles from older epochs are ignored
    epoch: AtomicU64,
}

struct Activation {
    settings: Arc<ChannelSettings>,
    results: u32,
    epoch: u64,
    timer: JoinHandle<()>,
}

impl Drop for Activation {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// One combined fetch against a fixed settings snapshot
#[derive(Clone)]
struct Cycle {
    source: Arc<dyn FeedSource>,
    shared: Arc<Shared>,
    settings: Arc<ChannelSettings>,
    results: u32,
    epoch: u64,
}

struct Update {
    readings: Vec<SensorReading>,
    history: Vec<HistoricalSample>,
    last_updated: Option<OffsetDateTime>,
}

impl Cycle {
    fn is_current(&self, seq: u64) -> bool {
        self.shared.epoch.load(Ordering::SeqCst) == self.epoch
            && self.shared.issued.load(Ordering::SeqCst) == seq
    }

    fn decode(&self, latest: Option<FeedEntry>, page: FeedPage) -> Update {
        let mappings = &self.settings.mappings;
        let history = decode_history(&page.feeds, mappings);

        // An empty channel has no latest entry; fall back to the newest sample
        let (readings, last_updated) = match latest {
            Some(entry) => (decode_readings(&entry, mappings), Some(entry.created_at)),
            None => match history.last() {
                Some(sample) => (readings_from_sample(sample, mappings), Some(sample.timestamp)),
                None => (Vec::new(), None),
            },
        };

        Update {
            readings,
            history,
            last_updated,
        }
    }

    async fn run(self) {
        // Epoch check and sequence assignment share the watch lock with `deactivate`
        let mut issued = None;
        self.shared.state.send_if_modified(|s| {
            if self.shared.epoch.load(Ordering::SeqCst) != self.epoch {
                return false;
            }
            issued = Some(self.shared.issued.fetch_add(1, Ordering::SeqCst) + 1);
            s.is_loading = true;
            s.phase = PollerPhase::Fetching;
            true
        });
        let Some(seq) = issued else {
            debug!("Skipping cycle from a previous activation");
            return;
        };
        debug!("Cycle {} fetching channel {}", seq, self.settings.channel_id);

        let (latest, page) = join(
            self.source.fetch_latest(&self.settings),
            self.source.fetch_history(&self.settings, self.results),
        )
        .await;

        // Both halves must succeed for the cycle to count
        let outcome: Result<Update, FeedError> = match (latest, page) {
            (Ok(latest), Ok(page)) => Ok(self.decode(latest, page)),
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        // Only the latest issued cycle of the current epoch may write
        let applied = self.shared.state.send_if_modified(|s| {
            if !self.is_current(seq) {
                return false;
            }
            match outcome {
                Ok(update) => {
                    s.readings = update.readings;
                    s.history = update.history;
                    s.last_updated = update.last_updated;
                    s.error = None;
                    s.phase = PollerPhase::Ready;
                }
                Err(e) => {
                    s.error = Some(e.to_string());
                    s.phase = PollerPhase::Errored;
                }
            }
            s.is_loading = false;
            true
        });

        if !applied {
            debug!("Discarding stale response for cycle {}", seq);
            return;
        }
        let snapshot = self.shared.state.borrow();
        match &snapshot.error {
            Some(e) => error!("Fetch failed for channel {}: {}", self.settings.channel_id, e),
            None => debug!(
                "Cycle {} complete: {} readings, {} samples",
                seq,
                snapshot.readings.len(),
                snapshot.history.len()
            ),
        }
    }
}

/// Owner of the refresh lifecycle
///
/// Clones share the same state and timer. The timer is cancelled on `stop`,
/// on reconfiguration, and when the last clone is dropped.
#[derive(Clone)]
pub struct Poller {
    source: Arc<dyn FeedSource>,
    refresh_interval: Duration,
    shared: Arc<Shared>,
    active: Arc<Mutex<Option<Activation>>>,
}

impl Poller {
    pub fn new(source: Arc<dyn FeedSource>, refresh_interval: Duration) -> Self {
        let (state, _) = watch::channel(Snapshot::default());
        Poller {
            source,
            refresh_interval,
            shared: Arc::new(Shared {
                state,
                issued: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
            }),
            active: Arc::new(Mutex::new(None)),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<Activation>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.state.borrow().clone()
    }

    pub fn get_reading(&self, sensor_type: SensorType) -> Option<SensorReading> {
        self.shared.state.borrow().get_reading(sensor_type).cloned()
    }

    pub fn average_of(&self, sensor_type: SensorType) -> f64 {
        self.shared.state.borrow().average_of(sensor_type)
    }

    pub fn is_active(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Begin polling with `settings`, replacing any previous activation
    ///
    /// Invalid settings leave the poller idle with a not-configured error;
    /// nothing is retried until `start` is called again. Must be called
    /// from within a Tokio runtime.
    ///
    /// # Arguments
    /// * `settings` - Channel credentials and field mappings to poll with
    /// * `results` - Number of history entries requested per fetch
    ///
    /// # Returns
    /// Ok once the timer is running, or the validation error when the
    /// settings or the refresh interval are unusable
    pub fn start(&self, settings: ChannelSettings, results: u32) -> Result<(), ConfigError> {
        let mut active = self.lock_active();
        self.deactivate(&mut active);

        let checked = settings.validate().and_then(|()| self.check_interval());
        if let Err(e) = checked {
            warn!("Polling not started: {}", e);
            self.shared.state.send_replace(Snapshot {
                error: Some(e.to_string()),
                ..Snapshot::default()
            });
            return Err(e);
        }

        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        let settings = Arc::new(settings);
        let cycle = Cycle {
            source: self.source.clone(),
            shared: self.shared.clone(),
            settings: settings.clone(),
            results,
            epoch,
        };

        info!(
            "Polling channel {} every {}s ({} results per fetch)",
            settings.channel_id,
            self.refresh_interval.as_secs_f32(),
            results
        );

        let refresh_interval = self.refresh_interval;
        let timer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // First tick completes immediately, giving the initial fetch
                ticker.tick().await;
                tokio::spawn(cycle.clone().run());
            }
        });

        *active = Some(Activation {
            settings,
            results,
            epoch,
            timer,
        });
        Ok(())
    }

    fn check_interval(&self) -> Result<(), ConfigError> {
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "refresh_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Cancel the timer and return to idle; late responses are discarded
    pub fn stop(&self) {
        let mut active = self.lock_active();
        if active.is_some() {
            info!("Polling stopped");
        }
        self.deactivate(&mut active);
    }

    fn deactivate(&self, active: &mut Option<Activation>) {
        // Dropping the activation aborts its timer
        active.take();
        self.shared.state.send_modify(|s| {
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
            *s = Snapshot::default();
        });
    }

    fn current_cycle(&self) -> Option<Cycle> {
        self.lock_active().as_ref().map(|a| Cycle {
            source: self.source.clone(),
            shared: self.shared.clone(),
            settings: a.settings.clone(),
            results: a.results,
            epoch: a.epoch,
        })
    }

    /// Run one fetch cycle now and wait for it to finish
    ///
    /// Returns false when the poller is not active.
    pub async fn refresh(&self) -> bool {
        match self.current_cycle() {
            Some(cycle) => {
                cycle.run().await;
                true
            }
            None => {
                warn!("Refresh requested while polling is not active");
                false
            }
        }
    }

    /// Trigger a fetch cycle in the background, same path as a timer tick
    pub fn refetch(&self) {
        match self.current_cycle() {
            Some(cycle) => {
                tokio::spawn(cycle.run());
            }
            None => warn!("Refresh requested while polling is not active"),
        }
    }
}

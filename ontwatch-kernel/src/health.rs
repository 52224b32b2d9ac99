use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use rumqttc::{AsyncClient, QoS};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::task;
use tracing::{debug, warn};

use crate::monitor::{CycleReport, MonitorCycle};
use crate::state::{new_state, Shared};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorHealth {
    pub uptime_seconds: u64,
    pub cycles_completed: u64,
    pub cycles_empty: u64,
    pub cycles_skipped: u64,
    pub alerts_fired: u64,
    pub deliveries_ok: u64,
    pub deliveries_failed: u64,
    pub devices_tracked: u64,
    pub last_cycle_at: Option<String>,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    cycles_completed: Arc<AtomicU64>,
    cycles_empty: Arc<AtomicU64>,
    cycles_skipped: Arc<AtomicU64>,
    alerts_fired: Arc<AtomicU64>,
    deliveries_ok: Arc<AtomicU64>,
    deliveries_failed: Arc<AtomicU64>,
    last_cycle_at: Shared<Option<OffsetDateTime>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            cycles_completed: Arc::new(AtomicU64::new(0)),
            cycles_empty: Arc::new(AtomicU64::new(0)),
            cycles_skipped: Arc::new(AtomicU64::new(0)),
            alerts_fired: Arc::new(AtomicU64::new(0)),
            deliveries_ok: Arc::new(AtomicU64::new(0)),
            deliveries_failed: Arc::new(AtomicU64::new(0)),
            last_cycle_at: new_state(None),
        }
    }

    pub fn record_completed(&self, report: &CycleReport, at: OffsetDateTime) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.alerts_fired.fetch_add(report.alerts as u64, Ordering::Relaxed);
        self.deliveries_ok.fetch_add(report.deliveries_ok as u64, Ordering::Relaxed);
        self.deliveries_failed.fetch_add(report.deliveries_failed as u64, Ordering::Relaxed);
        *self.last_cycle_at.lock() = Some(at);
    }

    pub fn record_empty(&self) {
        self.cycles_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self, devices_tracked: usize) -> MonitorHealth {
        let last = *self.last_cycle_at.lock();
        let last_cycle_at = last.and_then(|at| at.format(&Rfc3339).ok());

        MonitorHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_empty: self.cycles_empty.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            alerts_fired: self.alerts_fired.load(Ordering::Relaxed),
            deliveries_ok: self.deliveries_ok.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            devices_tracked: devices_tracked as u64,
            last_cycle_at,
        }
    }
}

/// Publie périodiquement la santé du moniteur sur MQTT
pub fn spawn_health_publisher(
    monitor: Arc<MonitorCycle>,
    client: AsyncClient,
    topic: String,
    every: Duration,
) {
    task::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let health = monitor.health_report();
            match serde_json::to_string(&health) {
                Ok(payload) => {
                    if let Err(e) = client.publish(topic.as_str(), QoS::AtLeastOnce, false, payload).await {
                        warn!("[health] failed to publish: {e:?}");
                    } else {
                        debug!(
                            "[health] published monitor health (uptime: {}s, devices: {})",
                            health.uptime_seconds, health.devices_tracked
                        );
                    }
                }
                Err(e) => warn!("[health] failed to serialize: {e}"),
            }
        }
    });
}

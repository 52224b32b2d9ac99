/*!
MONITOR CYCLE - Orchestration d'un cycle de surveillance

RÔLE :
fetch GenieACS → normalisation → décision d'alerte (diff avec l'état connu)
→ notifications → mise à jour de l'état → publication du snapshot → sauvegarde.

FONCTIONNEMENT :
- Un seul cycle à la fois : un déclenchement pendant un cycle en cours est ignoré
  (`CycleOutcome::Skipped`), jamais mis en file d'attente
- Lot vide (ou fetch en échec) : rien n'est touché, ni état, ni snapshot, ni fichier
- Un ONT à la fois, dans l'ordre du fetch ; un échec de livraison n'arrête rien
- L'état en mémoire est mis à jour pour chaque ONT, alerte ou pas
- Les lecteurs (dashboard, état) ne voient que le résultat complet du dernier cycle
  terminé, et ne prennent jamais le verrou du cycle
*/

use std::sync::Arc;

use time::{Duration, OffsetDateTime, UtcOffset};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertEngine, DEFAULT_RX_WARNING_THRESHOLD};
use crate::genieacs::DataSource;
use crate::health::{HealthTracker, MonitorHealth};
use crate::models::{DeviceState, DeviceStates, ParsedDevice};
use crate::normalizer::{DeviceNormalizer, DEFAULT_OFFLINE_AFTER};
use crate::notifier::SharedNotifier;
use crate::state::Snapshot;
use crate::store::StateStore;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub rx_warning_threshold: f64,
    pub offline_after: Duration,
    pub recipients: Vec<String>,
    pub display_offset: UtcOffset,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            rx_warning_threshold: DEFAULT_RX_WARNING_THRESHOLD,
            offline_after: DEFAULT_OFFLINE_AFTER,
            recipients: Vec::new(),
            display_offset: UtcOffset::UTC,
        }
    }
}

/// Bilan d'un cycle terminé
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub devices: usize,
    pub alerts: usize,
    pub deliveries_ok: usize,
    pub deliveries_failed: usize,
    /// false si la sauvegarde a échoué (l'état mémoire reste correct)
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Un autre cycle était en cours
    Skipped,
    /// Aucun ONT récupéré (ou fetch en échec)
    Empty,
    Completed(CycleReport),
}

pub struct MonitorCycle {
    source: Arc<dyn DataSource>,
    notifier: SharedNotifier,
    store: StateStore,
    normalizer: DeviceNormalizer,
    engine: AlertEngine,
    recipients: Vec<String>,
    // le verrou sert aussi de garde anti-réentrance (try_lock), réservé au cycle
    states: Mutex<DeviceStates>,
    states_view: Snapshot<DeviceStates>,
    latest: Snapshot<Vec<ParsedDevice>>,
    health: HealthTracker,
}

impl MonitorCycle {
    /// Charge l'état persistant puis assemble le moniteur
    pub async fn start(
        source: Arc<dyn DataSource>,
        notifier: SharedNotifier,
        store: StateStore,
        settings: MonitorSettings,
    ) -> Self {
        let states = store.load().await;
        Self::with_states(source, notifier, store, settings, states)
    }

    pub fn with_states(
        source: Arc<dyn DataSource>,
        notifier: SharedNotifier,
        store: StateStore,
        settings: MonitorSettings,
        states: DeviceStates,
    ) -> Self {
        let recipients = settings
            .recipients
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        Self {
            source,
            notifier,
            store,
            normalizer: DeviceNormalizer::new(settings.offline_after),
            engine: AlertEngine::new(settings.rx_warning_threshold, settings.display_offset),
            recipients,
            states_view: Snapshot::new(states.clone()),
            states: Mutex::new(states),
            latest: Snapshot::new(Vec::new()),
            health: HealthTracker::new(),
        }
    }

    /// Dernier lot complet (vide avant le premier cycle terminé)
    pub fn latest_devices(&self) -> Arc<Vec<ParsedDevice>> {
        self.latest.load()
    }

    /// État connu à la fin du dernier cycle terminé (ou au chargement)
    pub fn device_states(&self) -> Arc<DeviceStates> {
        self.states_view.load()
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn health_report(&self) -> MonitorHealth {
        self.health.get_health(self.latest.load().len())
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        self.run_cycle_at(OffsetDateTime::now_utc()).await
    }

    /// Un cycle complet, avec `now` comme horloge (online/offline, lastChecked, message)
    pub async fn run_cycle_at(&self, now: OffsetDateTime) -> CycleOutcome {
        let Ok(mut states) = self.states.try_lock() else {
            warn!("previous polling cycle still running, skipping this trigger");
            self.health.record_skipped();
            return CycleOutcome::Skipped;
        };

        info!("starting polling cycle");
        let batch = self.source.fetch().await;
        if batch.is_empty() {
            info!("no devices fetched or error occurred");
            self.health.record_empty();
            return CycleOutcome::Empty;
        }
        info!(count = batch.len(), "fetched devices from GenieACS, processing");

        let mut report = CycleReport { devices: batch.len(), ..CycleReport::default() };
        let mut parsed = Vec::with_capacity(batch.len());

        for raw in &batch {
            let device = self.normalizer.normalize(raw, now);

            if let Some(event) = self.engine.decide(&device, states.get(&device.id)) {
                info!(id = %device.id, title = %event.kind, "alert triggered");
                let text = self.engine.format_message(&event, now);
                self.fan_out(&text, &mut report).await;
                report.alerts += 1;
            }

            states.insert(device.id.clone(), DeviceState::observed(&device, now));
            parsed.push(device);
        }

        self.latest.publish(parsed);
        self.states_view.publish(states.clone());

        match self.store.save(&states).await {
            Ok(()) => report.persisted = true,
            Err(e) => error!(path = %self.store.path().display(), error = %e, "failed to save device state"),
        }

        self.health.record_completed(&report, now);
        info!(
            alerts = report.alerts,
            delivered = report.deliveries_ok,
            failed = report.deliveries_failed,
            "polling cycle complete"
        );
        CycleOutcome::Completed(report)
    }

    // best effort : un destinataire en échec n'empêche pas les suivants
    async fn fan_out(&self, text: &str, report: &mut CycleReport) {
        for recipient in &self.recipients {
            match self.notifier.deliver(recipient, text).await {
                Ok(()) => {
                    debug!(recipient = %recipient, "alert delivered");
                    report.deliveries_ok += 1;
                }
                Err(e) => {
                    error!(recipient = %recipient, error = %e, "failed to deliver alert");
                    report.deliveries_failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRecord;
    use crate::notifier::{LogNotifier, Notifier, NotifyError};
    use async_trait::async_trait;
    use serde_json::json;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    struct FixedSource(Vec<RawRecord>);

    #[async_trait]
    impl DataSource for FixedSource {
        async fn fetch(&self) -> Vec<RawRecord> {
            self.0.clone()
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn deliver(&self, _recipient: &str, _text: &str) -> Result<(), NotifyError> {
            Err(NotifyError::MissingApiKey)
        }
    }

    fn monitor(batch: Vec<RawRecord>, notifier: SharedNotifier, dir: &tempfile::TempDir) -> MonitorCycle {
        let settings = MonitorSettings {
            recipients: vec!["628111".into(), "  ".into(), "628222".into()],
            ..MonitorSettings::default()
        };
        MonitorCycle::with_states(
            Arc::new(FixedSource(batch)),
            notifier,
            StateStore::new(dir.path().join("device_state.json")),
            settings,
            DeviceStates::new(),
        )
    }

    #[test]
    fn test_blank_recipients_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(Vec::new(), Arc::new(LogNotifier), &dir);
        assert_eq!(m.recipients(), ["628111", "628222"]);
    }

    #[tokio::test]
    async fn test_empty_batch_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(Vec::new(), Arc::new(LogNotifier), &dir);
        assert_eq!(m.run_cycle_at(NOW).await, CycleOutcome::Empty);
        assert!(m.latest_devices().is_empty());
        assert!(!dir.path().join("device_state.json").exists());
        assert_eq!(m.health_report().cycles_empty, 1);
    }

    #[tokio::test]
    async fn test_failed_deliveries_do_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let batch = vec![json!({"_id": "OUI-ONE-SN1"}), json!({"_id": "OUI-TWO-SN2"})];
        let m = monitor(batch, Arc::new(FailingNotifier), &dir);

        let CycleOutcome::Completed(report) = m.run_cycle_at(NOW).await else {
            panic!("cycle should complete");
        };
        assert_eq!(report.alerts, 2);
        assert_eq!(report.deliveries_failed, 4);
        assert_eq!(report.deliveries_ok, 0);
        assert!(report.persisted);
        assert_eq!(m.device_states().len(), 2);
        assert_eq!(m.latest_devices().len(), 2);
    }

    #[tokio::test]
    async fn test_busy_cycle_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(vec![json!({"_id": "OUI-ONE-SN1"})], Arc::new(LogNotifier), &dir);

        let guard = m.states.lock().await;
        assert_eq!(m.run_cycle_at(NOW).await, CycleOutcome::Skipped);
        drop(guard);

        assert!(matches!(m.run_cycle_at(NOW).await, CycleOutcome::Completed(_)));
        assert_eq!(m.health_report().cycles_skipped, 1);
    }

    #[tokio::test]
    async fn test_state_read_does_not_block_or_skip() {
        let dir = tempfile::tempdir().unwrap();
        let m = monitor(vec![json!({"_id": "OUI-ONE-SN1"})], Arc::new(LogNotifier), &dir);

        // un lecteur pendant un cycle en cours obtient le dernier état publié
        let guard = m.states.lock().await;
        assert!(m.device_states().is_empty());
        drop(guard);

        let before = m.device_states();
        assert!(matches!(m.run_cycle_at(NOW).await, CycleOutcome::Completed(_)));
        assert!(before.is_empty());
        assert_eq!(m.device_states().len(), 1);
        assert!(m.device_states().contains_key("ONE"));
        assert_eq!(m.health_report().cycles_skipped, 0);
    }

    #[tokio::test]
    async fn test_save_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let m = MonitorCycle::with_states(
            Arc::new(FixedSource(vec![json!({"_id": "OUI-ONE-SN1"})])),
            Arc::new(LogNotifier),
            StateStore::new(blocker.join("state.json")),
            MonitorSettings { recipients: vec!["628111".into()], ..MonitorSettings::default() },
            DeviceStates::new(),
        );

        let CycleOutcome::Completed(report) = m.run_cycle_at(NOW).await else {
            panic!("cycle should complete");
        };
        assert!(!report.persisted);
        assert_eq!(report.devices, 1);
        assert_eq!(report.alerts, 1);
        assert_eq!(report.deliveries_ok, 1);

        let states = m.device_states();
        assert_eq!(states.len(), 1);
        assert!(!states["ONE"].is_online);
        assert_eq!(m.latest_devices().len(), 1);
        assert_eq!(m.latest_devices()[0].id, "ONE");
        assert_eq!(m.health_report().cycles_completed, 1);
    }
}

/*!
Test Harness pour le moniteur ONT

Facilite l'écriture de tests de bout en bout avec:
- Fichier d'état dans un répertoire temporaire (supprimé à la fin du test)
- Source scriptée + notifier enregistreur branchés sur un vrai `MonitorCycle`
- Redémarrage simulé (nouveau moniteur relisant le même fichier)
- Assertions sur les alertes livrées
*/

use crate::stubs::{RecordingNotifier, StubDataSource};
use anyhow::Result;
use ontwatch_kernel::models::RawRecord;
use ontwatch_kernel::monitor::{CycleOutcome, MonitorCycle, MonitorSettings};
use ontwatch_kernel::store::StateStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;

/// Harness de test complet pour le moniteur
pub struct TestHarness {
    pub source: StubDataSource,
    pub notifier: RecordingNotifier,
    pub monitor: Arc<MonitorCycle>,
    settings: MonitorSettings,
    _dir: TempDir,
    state_path: PathBuf,
}

impl TestHarness {
    /// Moniteur neuf, sans état persistant, seuil et fenêtre par défaut
    pub async fn new(recipients: &[&str]) -> Result<Self> {
        let settings = MonitorSettings {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            ..MonitorSettings::default()
        };
        Self::with_settings(settings, StubDataSource::new()).await
    }

    pub async fn with_settings(settings: MonitorSettings, source: StubDataSource) -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let dir = tempfile::tempdir()?;
        let state_path = dir.path().join("data").join("device_state.json");
        let notifier = RecordingNotifier::new();
        let monitor = Self::boot(&source, &notifier, &state_path, &settings).await;

        Ok(Self {
            source,
            notifier,
            monitor,
            settings,
            _dir: dir,
            state_path,
        })
    }

    async fn boot(
        source: &StubDataSource,
        notifier: &RecordingNotifier,
        state_path: &Path,
        settings: &MonitorSettings,
    ) -> Arc<MonitorCycle> {
        let monitor = MonitorCycle::start(
            Arc::new(source.clone()),
            Arc::new(notifier.clone()),
            StateStore::new(state_path),
            settings.clone(),
        )
        .await;
        Arc::new(monitor)
    }

    /// Simule un redémarrage du processus : l'état est relu depuis le disque
    pub async fn restart(&mut self) {
        log::info!("🔄 Restarting monitor from {}", self.state_path.display());
        self.monitor = Self::boot(&self.source, &self.notifier, &self.state_path, &self.settings).await;
    }

    /// Programme le lot du prochain cycle
    pub fn next_batch(&self, batch: Vec<RawRecord>) -> &Self {
        self.source.push_batch(batch);
        self
    }

    pub async fn cycle_at(&self, now: OffsetDateTime) -> CycleOutcome {
        let outcome = self.monitor.run_cycle_at(now).await;
        log::info!("🔁 Cycle at {now}: {outcome:?}");
        outcome
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Contenu brut du fichier d'état, `None` s'il n'existe pas encore
    pub fn state_file_bytes(&self) -> Result<Option<Vec<u8>>> {
        match std::fs::read(&self.state_path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Titres des alertes livrées à `recipient`, dans l'ordre
    pub fn titles_for(&self, recipient: &str) -> Vec<String> {
        self.notifier
            .delivered_to(recipient)
            .iter()
            .filter_map(|text| extract_title(text))
            .collect()
    }

    /// Assert qu'une alerte portant `title` a été livrée à `recipient`
    pub fn assert_alert_sent(&self, recipient: &str, title: &str) -> Result<()> {
        let titles = self.titles_for(recipient);
        if titles.iter().any(|t| t == title) {
            log::info!("✅ Alert '{title}' delivered to {recipient}");
            return Ok(());
        }
        anyhow::bail!("Expected alert '{title}' for {recipient}, got {titles:?}");
    }

    pub fn assert_no_alerts(&self) -> Result<()> {
        let delivered = self.notifier.delivered();
        if delivered.is_empty() {
            return Ok(());
        }
        anyhow::bail!("Expected no alerts, got {} deliveries", delivered.len());
    }
}

/// Première ligne du message : "*--- TITLE ---*"
fn extract_title(text: &str) -> Option<String> {
    let line = text.lines().next()?;
    let title = line.strip_prefix("*--- ")?.strip_suffix(" ---*")?;
    Some(title.to_string())
}

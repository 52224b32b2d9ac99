/*!
Stubs pour développement sans backend

- `StubDataSource` : rejoue des lots scriptés, un par appel à `fetch()`.
  Une fois la file vide, renvoie un lot vide (comme un GenieACS injoignable).
- `RecordingNotifier` : enregistre chaque livraison, échoue pour les
  destinataires marqués en échec.
*/

use async_trait::async_trait;
use ontwatch_kernel::genieacs::DataSource;
use ontwatch_kernel::models::RawRecord;
use ontwatch_kernel::notifier::{Notifier, NotifyError};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct StubDataSource {
    batches: Arc<Mutex<VecDeque<Vec<RawRecord>>>>,
    fetches: Arc<Mutex<usize>>,
    delay: Option<Duration>,
}

impl StubDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chaque `fetch()` attend `delay` avant de répondre (simule un backend lent)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Ajoute un lot à rejouer
    pub fn push_batch(&self, batch: Vec<RawRecord>) -> &Self {
        self.batches.lock().push_back(batch);
        self
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock()
    }
}

#[async_trait]
impl DataSource for StubDataSource {
    async fn fetch(&self) -> Vec<RawRecord> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        *self.fetches.lock() += 1;
        let batch = self.batches.lock().pop_front().unwrap_or_default();
        log::debug!("📦 Stub fetch returned {} records", batch.len());
        batch
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipient: String,
    pub text: String,
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    delivered: Arc<Mutex<Vec<Delivery>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    attempts: Arc<Mutex<usize>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toute livraison vers `recipient` échouera
    pub fn fail_for(&self, recipient: &str) -> &Self {
        self.failing.lock().insert(recipient.to_string());
        self
    }

    /// Livraisons réussies, dans l'ordre
    pub fn delivered(&self) -> Vec<Delivery> {
        self.delivered.lock().clone()
    }

    pub fn delivered_to(&self, recipient: &str) -> Vec<String> {
        self.delivered
            .lock()
            .iter()
            .filter(|d| d.recipient == recipient)
            .map(|d| d.text.clone())
            .collect()
    }

    /// Tentatives, échecs compris
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }

    pub fn clear(&self) {
        self.delivered.lock().clear();
        *self.attempts.lock() = 0;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, recipient: &str, text: &str) -> Result<(), NotifyError> {
        *self.attempts.lock() += 1;
        if self.failing.lock().contains(recipient) {
            log::warn!("📵 Simulated delivery failure for {recipient}");
            return Err(NotifyError::Rejected(format!("stub refuses {recipient}")));
        }
        self.delivered.lock().push(Delivery {
            recipient: recipient.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

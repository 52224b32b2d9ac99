/*!
NOTIFIER - Livraison des messages d'alerte

RÔLE :
Le moteur n'a besoin que d'une capacité : "livrer ce texte à ce destinataire".
Le transport concret est interchangeable :
- `GatewayNotifier` : passerelle HTTP WhatsApp (payload api_key/receiver/data.message)
- `MqttNotifier`    : publication sur le bus MQTT (un consommateur externe relaie)
- `LogNotifier`     : écrit le message dans les logs (aucun transport configuré)

Un échec est remonté en `Err`, le cycle le logge et continue. Pas de retry.
*/

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rumqttc::{AsyncClient, QoS};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::config::{GatewayConf, NotifyConf, Transport};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gateway rejected message: {0}")]
    Rejected(String),
    #[error("Gateway API key is not configured")]
    MissingApiKey,
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, recipient: &str, text: &str) -> Result<(), NotifyError>;
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Construit le notifier selon la config. `mqtt` est requis pour le transport MQTT.
pub fn from_config(conf: &NotifyConf, mqtt: Option<AsyncClient>) -> Result<SharedNotifier, NotifyError> {
    let notifier: SharedNotifier = match (conf.transport, mqtt) {
        (Transport::Gateway, _) => Arc::new(GatewayNotifier::new(&conf.gateway)?),
        (Transport::Mqtt, Some(client)) => Arc::new(MqttNotifier::new(client, conf.mqtt_topic.clone())),
        (Transport::Mqtt, None) => {
            tracing::warn!("MQTT transport selected but no broker configured, alerts go to the log");
            Arc::new(LogNotifier)
        }
        (Transport::Log, _) => Arc::new(LogNotifier),
    };
    Ok(notifier)
}

#[derive(Debug, Clone)]
pub struct GatewayNotifier {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GatewayNotifier {
    pub fn new(conf: &GatewayConf) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(conf.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: conf.endpoint.clone(),
            api_key: conf.api_key.clone().filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl Notifier for GatewayNotifier {
    async fn deliver(&self, recipient: &str, text: &str) -> Result<(), NotifyError> {
        let api_key = self.api_key.as_deref().ok_or(NotifyError::MissingApiKey)?;
        let payload = json!({
            "api_key": api_key,
            "receiver": recipient,
            "data": { "message": text },
        });

        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(NotifyError::Rejected(format!("status {status}: {body}")));
        }
        if !body.get("status").is_some_and(is_truthy) {
            return Err(NotifyError::Rejected(body.to_string()));
        }
        debug!(recipient, "message delivered through gateway");
        Ok(())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Clone)]
pub struct MqttNotifier {
    client: AsyncClient,
    topic: String,
}

impl MqttNotifier {
    pub fn new(client: AsyncClient, topic: String) -> Self {
        Self { client, topic }
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    async fn deliver(&self, recipient: &str, text: &str) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&json!({
            "recipient": recipient,
            "text": text,
            "ts": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }))?;
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await?;
        debug!(recipient, topic = %self.topic, "alert published");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, recipient: &str, text: &str) -> Result<(), NotifyError> {
        info!(recipient, "alert (log transport)\n{text}");
        Ok(())
    }
}

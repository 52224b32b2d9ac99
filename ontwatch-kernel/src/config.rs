use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use time::UtcOffset;
use tokio::fs;
use tracing::{info, warn};

use crate::alerts::DEFAULT_RX_WARNING_THRESHOLD;
use crate::monitor::MonitorSettings;

// une semaine : au-delà, la valeur est une erreur de saisie
const MAX_WINDOW_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MonitorConfig {
    pub genieacs: GenieAcsConf,
    pub monitor: PollConf,
    pub notify: NotifyConf,
    pub mqtt: Option<MqttConf>,
    pub health: HealthConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GenieAcsConf {
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollConf {
    pub poll_interval_minutes: u64,
    pub initial_delay_secs: u64,
    pub offline_after_minutes: i64,
    pub rx_warning_threshold: f64,
    pub state_file: PathBuf,
    pub display_utc_offset_hours: i8,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Gateway,
    Mqtt,
    Log,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NotifyConf {
    pub recipients: Vec<String>,
    pub transport: Transport,
    pub gateway: GatewayConf,
    pub mqtt_topic: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConf {
    pub endpoint: String,
    pub api_key: Option<String>, // ex: via WA_API_KEY
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HealthConf {
    pub publish: bool,
    pub topic: String,
    pub interval_secs: u64,
}

impl Default for GenieAcsConf {
    fn default() -> Self {
        Self {
            url: "http://localhost:7557".into(),
            username: String::new(),
            password: String::new(),
            timeout_secs: 10,
        }
    }
}

impl Default for PollConf {
    fn default() -> Self {
        Self {
            poll_interval_minutes: 5,
            initial_delay_secs: 2,
            offline_after_minutes: 15,
            rx_warning_threshold: DEFAULT_RX_WARNING_THRESHOLD,
            state_file: PathBuf::from("./data/device_state.json"),
            display_utc_offset_hours: 7,
        }
    }
}

impl Default for NotifyConf {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            transport: Transport::Gateway,
            gateway: GatewayConf::default(),
            mqtt_topic: "ontwatch/alerts@v1".into(),
        }
    }
}

impl Default for GatewayConf {
    fn default() -> Self {
        Self {
            endpoint: "https://app.wacloud.web.id/api/send-message".into(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl Default for MqttConf {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 1883 }
    }
}

impl Default for HealthConf {
    fn default() -> Self {
        Self {
            publish: false,
            topic: "ontwatch/health@v1".into(),
            interval_secs: 30,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.poll_interval_minutes.saturating_mul(60))
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.monitor.initial_delay_secs)
    }

    pub fn display_offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.monitor.display_utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            rx_warning_threshold: self.monitor.rx_warning_threshold,
            offline_after: time::Duration::minutes(
                self.monitor.offline_after_minutes.clamp(1, MAX_WINDOW_MINUTES as i64),
            ),
            recipients: self.notify.recipients.clone(),
            display_offset: self.display_offset(),
        }
    }

    /// Surcharges par variables d'environnement (noms du déploiement historique)
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("GENIEACS_URL") {
            self.genieacs.url = url;
        }
        if let Some(auth) = var("GENIEACS_AUTH") {
            // format "user:pass", le mot de passe peut contenir ':'
            let (user, pass) = auth.split_once(':').unwrap_or((auth.as_str(), ""));
            self.genieacs.username = user.to_string();
            self.genieacs.password = pass.to_string();
        }
        if let Some(v) = parse_var(&var, "POLL_INTERVAL_MINUTES") {
            self.monitor.poll_interval_minutes = v;
        }
        if let Some(v) = parse_var(&var, "RX_WARNING_THRESHOLD") {
            self.monitor.rx_warning_threshold = v;
        }
        if let Some(v) = parse_var(&var, "ONTWATCH_OFFLINE_MINUTES") {
            self.monitor.offline_after_minutes = v;
        }
        if let Some(path) = var("ONTWATCH_STATE_FILE") {
            self.monitor.state_file = PathBuf::from(path);
        }
        if let Some(numbers) = var("WA_TARGET_NUMBERS") {
            self.notify.recipients = numbers.split(',').map(|n| n.trim().to_string()).collect();
        }
        if let Some(key) = var("WA_API_KEY") {
            self.notify.gateway.api_key = Some(key);
        }
    }

    /// Remet à la valeur par défaut tout champ hors bornes (loggé, jamais fatal)
    pub fn sanitize(mut self) -> Self {
        let defaults = PollConf::default();
        self.notify.recipients.retain(|r| !r.trim().is_empty());

        for problem in self.validate() {
            warn!("[config] {problem}, using default");
            if let ConfigError::InvalidValue { field, .. } = problem {
                match field {
                    "monitor.poll_interval_minutes" => self.monitor.poll_interval_minutes = defaults.poll_interval_minutes,
                    "monitor.offline_after_minutes" => self.monitor.offline_after_minutes = defaults.offline_after_minutes,
                    "monitor.rx_warning_threshold" => self.monitor.rx_warning_threshold = defaults.rx_warning_threshold,
                    "monitor.display_utc_offset_hours" => {
                        self.monitor.display_utc_offset_hours = defaults.display_utc_offset_hours
                    }
                    _ => {}
                }
            }
        }
        self
    }

    pub fn validate(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();
        let m = &self.monitor;
        if !(1..=MAX_WINDOW_MINUTES).contains(&m.poll_interval_minutes) {
            problems.push(invalid("monitor.poll_interval_minutes", "must be within 1..=10080"));
        }
        if !(1..=MAX_WINDOW_MINUTES as i64).contains(&m.offline_after_minutes) {
            problems.push(invalid("monitor.offline_after_minutes", "must be within 1..=10080"));
        }
        if !m.rx_warning_threshold.is_finite() {
            problems.push(invalid("monitor.rx_warning_threshold", "must be a finite dBm value"));
        }
        if !(-23..=23).contains(&m.display_utc_offset_hours) {
            problems.push(invalid("monitor.display_utc_offset_hours", "must be within -23..=23"));
        }
        problems
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue { field, reason: reason.to_string() }
}

fn parse_var<F, T>(var: &F, name: &'static str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = var(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("[config] {}", invalid(name, &format!("cannot parse {raw:?}, ignored")));
            None
        }
    }
}

pub fn parse_config(text: &str) -> Result<MonitorConfig, ConfigError> {
    if text.trim().is_empty() {
        return Ok(MonitorConfig::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

async fn read_config_file(path: &str) -> Result<MonitorConfig, ConfigError> {
    let txt = fs::read_to_string(path).await?;
    parse_config(&txt)
}

/// Fichier YAML (ONTWATCH_CONFIG, défaut ontwatch.yaml) + surcharges d'environnement
pub async fn load_config() -> MonitorConfig {
    let path = std::env::var("ONTWATCH_CONFIG").unwrap_or_else(|_| "ontwatch.yaml".into());
    let mut cfg = match read_config_file(&path).await {
        Ok(cfg) => {
            info!("[config] loaded {path}");
            cfg
        }
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("[config] no {path}, using defaults");
            MonitorConfig::default()
        }
        Err(e) => {
            warn!("[config] invalid {path}: {e}, using defaults");
            MonitorConfig::default()
        }
    };
    cfg.apply_env(|name| std::env::var(name).ok());
    cfg.sanitize()
}

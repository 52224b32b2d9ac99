use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;

use crate::normalizer::coerce_f64;

/// Document brut renvoyé par GenieACS (schéma variable selon constructeur/firmware)
pub type RawRecord = serde_json::Value;

/// Vue normalisée d'un ONT, recalculée à chaque cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDevice {
    /// ProductClass résolu (pas le numéro de série)
    pub id: String,
    /// `_id` GenieACS brut (OUI-ProductClass-Serial)
    pub serial: String,
    pub location: String,
    pub is_online: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_contact: Option<OffsetDateTime>,
    /// dBm
    pub rx_power: Option<f64>,
    pub uptime_seconds: u64,
    pub uptime: String,
    pub ip: String,
}

/// Dernier état connu d'un ONT, persisté entre les cycles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub is_online: bool,
    #[serde(default, deserialize_with = "lenient_rx_power")]
    pub rx_power: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_checked: OffsetDateTime,
}

impl DeviceState {
    pub fn observed(device: &ParsedDevice, now: OffsetDateTime) -> Self {
        Self {
            is_online: device.is_online,
            rx_power: device.rx_power,
            last_checked: now,
        }
    }
}

// Anciens fichiers : rxPower pouvait être une chaîne ("-24.5" ou "N/A")
fn lenient_rx_power<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(coerce_f64))
}

/// device id -> dernier état. BTreeMap pour un fichier trié, lisible en diff.
pub type DeviceStates = BTreeMap<String, DeviceState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    OfflineNew,
    LowRxNew,
    WentOffline,
    BackOnline,
    CriticalRx,
}

impl AlertKind {
    pub fn title(self) -> &'static str {
        match self {
            AlertKind::OfflineNew => "ONT OFFLINE (New)",
            AlertKind::LowRxNew => "LOW RX POWER (New)",
            AlertKind::WentOffline => "ONT WENT OFFLINE",
            AlertKind::BackOnline => "ONT BACK ONLINE",
            AlertKind::CriticalRx => "CRITICAL RX POWER",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Alerte éphémère, consommée tout de suite par l'étape de notification
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub device: ParsedDevice,
    pub previous: Option<DeviceState>,
}

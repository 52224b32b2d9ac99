/*!
ALERT ENGINE - Table de décision des alertes ONT

RÔLE :
Compare l'état courant d'un ONT à son dernier état connu et décide s'il faut
alerter. Au plus une alerte par ONT et par cycle, première règle qui matche :

| # | état précédent | condition                                 | alerte               |
|---|----------------|-------------------------------------------|----------------------|
| 1 | absent         | offline                                   | ONT OFFLINE (New)    |
| 2 | absent         | rx connu et < seuil                       | LOW RX POWER (New)   |
| 3 | online         | offline                                   | ONT WENT OFFLINE     |
| 4 | offline        | online                                    | ONT BACK ONLINE      |
| 5 | présent        | rx précédent inconnu ou >= seuil, rx < seuil | CRITICAL RX POWER |

Le formatage du message est une fonction pure de (alerte, seuil, horodatage).
*/

use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::models::{AlertEvent, AlertKind, DeviceState, ParsedDevice};

pub const DEFAULT_RX_WARNING_THRESHOLD: f64 = -27.0;

// Format id-ID : "1/5/2024, 19.00.00"
const TIMESTAMP_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] = format_description!(
    "[day padding:none]/[month padding:none]/[year], [hour].[minute].[second]"
);

#[derive(Debug, Clone)]
pub struct AlertEngine {
    threshold: f64,
    display_offset: UtcOffset,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(DEFAULT_RX_WARNING_THRESHOLD, UtcOffset::UTC)
    }
}

impl AlertEngine {
    pub fn new(threshold: f64, display_offset: UtcOffset) -> Self {
        Self { threshold, display_offset }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Comparaison stricte : -27.0 avec un seuil de -27 n'est pas critique
    pub fn is_below_threshold(&self, rx_power: f64) -> bool {
        rx_power < self.threshold
    }

    pub fn decide(&self, device: &ParsedDevice, previous: Option<&DeviceState>) -> Option<AlertEvent> {
        self.classify(device, previous).map(|kind| AlertEvent {
            kind,
            device: device.clone(),
            previous: previous.cloned(),
        })
    }

    fn classify(&self, device: &ParsedDevice, previous: Option<&DeviceState>) -> Option<AlertKind> {
        let low_rx = device.rx_power.is_some_and(|rx| self.is_below_threshold(rx));

        match previous {
            None if !device.is_online => Some(AlertKind::OfflineNew),
            None if low_rx => Some(AlertKind::LowRxNew),
            None => None,
            Some(prev) if prev.is_online && !device.is_online => Some(AlertKind::WentOffline),
            Some(prev) if !prev.is_online && device.is_online => Some(AlertKind::BackOnline),
            Some(prev) => {
                let was_good = prev.rx_power.map_or(true, |rx| !self.is_below_threshold(rx));
                (was_good && low_rx).then_some(AlertKind::CriticalRx)
            }
        }
    }

    pub fn format_message(&self, event: &AlertEvent, at: OffsetDateTime) -> String {
        let device = &event.device;
        let mut msg = format!("*--- {} ---*\n\n", event.kind);
        msg.push_str(&format!("📍 *Location/Tag:* {}\n", device.location));
        msg.push_str(&format!("🆔 *Device ID:* {}\n", device.id));
        msg.push_str(&format!("🌐 *IP TR069:* {}\n", device.ip));
        msg.push_str(&format!("⏱️ *Uptime:* {}\n", device.uptime));

        let (status_glyph, status) = connectivity(device.is_online);
        msg.push_str(&format!("🔌 *Status:* {status_glyph} {status}\n"));
        if let Some(prev) = event.previous.as_ref().filter(|p| p.is_online != device.is_online) {
            msg.push_str(&format!("   _(was {})_\n", connectivity(prev.is_online).1));
        }

        match device.rx_power {
            Some(rx) => {
                let glyph = if self.is_below_threshold(rx) { "⚠️" } else { "🟢" };
                msg.push_str(&format!("⚡ *Optical Rx:* {glyph} {rx} dBm\n"));
            }
            None => msg.push_str("⚡ *Optical Rx:* ❓ Unknown\n"),
        }

        let stamp = at
            .to_offset(self.display_offset)
            .format(TIMESTAMP_FORMAT)
            .unwrap_or_default();
        msg.push_str(&format!("\n🕒 {stamp}"));
        msg
    }
}

fn connectivity(is_online: bool) -> (&'static str, &'static str) {
    if is_online {
        ("✅", "ONLINE")
    } else {
        ("🔴", "OFFLINE")
    }
}

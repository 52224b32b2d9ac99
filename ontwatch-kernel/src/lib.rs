/*!
ONTWATCH KERNEL - Surveillance des ONT fibre gérés par GenieACS

RÔLE : Interroge périodiquement GenieACS, normalise chaque ONT, compare avec
l'état connu et notifie les transitions (hors ligne, retour en ligne, Rx critique).

MODULES :
- `normalizer` : enregistrement brut GenieACS → `ParsedDevice`
- `alerts`     : décision d'alerte + texte du message
- `store`      : persistance JSON de l'état par ONT
- `notifier`   : livraison (passerelle WhatsApp, MQTT, log)
- `monitor`    : orchestration d'un cycle, snapshot pour le dashboard
- `genieacs`   : client NBI
- `config`, `health`, `mqtt`, `state` : socle
*/

pub mod alerts;
pub mod config;
pub mod genieacs;
pub mod health;
pub mod models;
pub mod monitor;
pub mod mqtt;
pub mod normalizer;
pub mod notifier;
pub mod state;
pub mod store;

pub use alerts::AlertEngine;
pub use config::{load_config, MonitorConfig};
pub use genieacs::{DataSource, GenieAcsSource};
pub use models::{AlertEvent, AlertKind, DeviceState, DeviceStates, ParsedDevice, RawRecord};
pub use monitor::{CycleOutcome, CycleReport, MonitorCycle, MonitorSettings};
pub use normalizer::DeviceNormalizer;
pub use notifier::{Notifier, NotifyError, SharedNotifier};
pub use store::{StateStore, StoreError};

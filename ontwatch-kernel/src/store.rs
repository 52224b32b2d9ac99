/*!
STATE STORE - Persistance JSON du dernier état connu de chaque ONT

RÔLE :
Survivre aux redémarrages : sans ce fichier, chaque ONT serait "nouveau" au boot
et déclencherait une alerte (New).

FONCTIONNEMENT :
- `load()` une seule fois au démarrage : fichier absent ou illisible = état vide
- `save()` à la fin de chaque cycle : réécriture complète, jamais d'append
- Écriture dans `{fichier}.tmp` puis rename, le fichier n'est jamais tronqué
*/

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::models::DeviceStates;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Charge l'état sans jamais échouer : toute erreur est loggée et donne un état vide
    pub async fn load(&self) -> DeviceStates {
        match self.try_load().await {
            Ok(states) => {
                info!(devices = states.len(), path = %self.path.display(), "loaded device state");
                states
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to load device state, starting fresh");
                DeviceStates::new()
            }
        }
    }

    pub async fn try_load(&self) -> Result<DeviceStates, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(DeviceStates::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(DeviceStates::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Réécrit tout le mapping (pas d'incrémental)
    pub async fn save(&self, states: &DeviceStates) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(states)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

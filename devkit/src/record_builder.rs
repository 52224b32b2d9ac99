/*!
Builder d'enregistrements bruts GenieACS

Produit le JSON tel que renvoyé par `GET /devices` : paramètres TR-069 imbriqués,
valeurs dans `_value`, métadonnées `_id` / `_lastInform` / `_tags` à la racine.
*/

use ontwatch_kernel::models::RawRecord;
use serde_json::{json, Map, Value};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

/// Emplacements Rx connus, par ordre de priorité
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxPath {
    Virtual,
    GponInterface,
    OpticalSignalLevel,
    DslDiagnostics,
}

impl RxPath {
    fn path(self) -> &'static str {
        match self {
            RxPath::Virtual => "VirtualParameters.RXPower",
            RxPath::GponInterface => "InternetGatewayDevice.WANDevice.1.X_FH_GponInterfaceConfig.RXPower",
            RxPath::OpticalSignalLevel => "InternetGatewayDevice.WANDevice.1.WANDSLInterfaceConfig.OpticalSignalLevel",
            RxPath::DslDiagnostics => "InternetGatewayDevice.WANDevice.1.WANDSLDiagnostics.RxPower",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawRecordBuilder {
    root: Map<String, Value>,
}

impl RawRecordBuilder {
    /// Enregistrement avec un `_id` au format "OUI-ProductClass-Serial"
    pub fn new(serial: &str) -> Self {
        let mut root = Map::new();
        root.insert("_id".into(), json!(serial));
        Self { root }
    }

    /// Sans `_id`
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn product_class(self, class: &str) -> Self {
        self.param("InternetGatewayDevice.DeviceInfo.ProductClass", json!(class))
    }

    pub fn alt_product_class(self, class: &str) -> Self {
        self.param("DeviceID.ProductClass", json!(class))
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.root.insert("_tags".into(), json!(tags));
        self
    }

    pub fn last_inform(mut self, at: OffsetDateTime) -> Self {
        let ts = at.format(&Rfc3339).unwrap_or_default();
        self.root.insert("_lastInform".into(), json!(ts));
        self
    }

    /// Dernier inform `ago` avant `now`
    pub fn inform_ago(self, now: OffsetDateTime, ago: Duration) -> Self {
        self.last_inform(now - ago)
    }

    pub fn rx_power(self, value: impl Into<Value>) -> Self {
        self.rx_power_at(RxPath::Virtual, value)
    }

    pub fn rx_power_at(self, at: RxPath, value: impl Into<Value>) -> Self {
        self.param(at.path(), value.into())
    }

    pub fn uptime(self, seconds: impl Into<Value>) -> Self {
        self.param("InternetGatewayDevice.DeviceInfo.UpTime", seconds.into())
    }

    pub fn external_ip(self, ip: &str) -> Self {
        self.param(
            "InternetGatewayDevice.WANDevice.1.WANConnectionDevice.1.WANIPConnection.1.ExternalIPAddress",
            json!(ip),
        )
    }

    pub fn connection_request_url(self, url: &str) -> Self {
        self.param("InternetGatewayDevice.ManagementServer.ConnectionRequestURL", json!(url))
    }

    /// Paramètre TR-069 arbitraire : `{"A": {"B": {"_value": v}}}`
    pub fn param(mut self, path: &str, value: Value) -> Self {
        let segments: Vec<&str> = path.split('.').collect();
        insert_path(&mut self.root, &segments, value);
        self
    }

    pub fn build(self) -> RawRecord {
        Value::Object(self.root)
    }
}

fn insert_path(node: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        node.insert("_value".into(), value);
        return;
    };
    let child = node
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match child.as_object_mut() {
        Some(map) => insert_path(map, rest, value),
        None => {
            // une feuille existante devient un noeud
            let mut map = Map::new();
            insert_path(&mut map, rest, value);
            *child = Value::Object(map);
        }
    }
}

/*!
DEVICE NORMALIZER - Conversion d'un document GenieACS brut en `ParsedDevice`

RÔLE :
Chaque constructeur range ses paramètres TR-069 à des endroits différents.
Ce module résout chaque champ logique (ProductClass, Rx, IP...) depuis une liste
ordonnée de chemins candidats : le premier présent gagne.

FONCTIONNEMENT :
- Le document reste un `serde_json::Value` générique, jamais un schéma figé
- Un paramètre TR-069 porte sa valeur dans `_value`
- Fonction totale : tout champ manquant retombe sur une valeur par défaut
*/

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::models::{ParsedDevice, RawRecord};

pub const UNKNOWN: &str = "Unknown";
pub const NO_TAG: &str = "No Tag";
pub const DEFAULT_OFFLINE_AFTER: Duration = Duration::minutes(15);

const ID_FIELD: &str = "_id";
const LAST_INFORM_FIELD: &str = "_lastInform";
const TAGS_FIELD: &str = "_tags";

const PRODUCT_CLASS_PATHS: &[&str] = &[
    "InternetGatewayDevice.DeviceInfo.ProductClass",
    "DeviceID.ProductClass",
];

const RX_POWER_PATHS: &[&str] = &[
    "VirtualParameters.RXPower",
    "InternetGatewayDevice.WANDevice.1.X_FH_GponInterfaceConfig.RXPower",
    "InternetGatewayDevice.WANDevice.1.WANDSLInterfaceConfig.OpticalSignalLevel",
    "InternetGatewayDevice.WANDevice.1.WANDSLDiagnostics.RxPower",
];

const UPTIME_PATH: &str = "InternetGatewayDevice.DeviceInfo.UpTime";
const EXTERNAL_IP_PATH: &str =
    "InternetGatewayDevice.WANDevice.1.WANConnectionDevice.1.WANIPConnection.1.ExternalIPAddress";
const CONNECTION_REQUEST_URL_PATH: &str = "InternetGatewayDevice.ManagementServer.ConnectionRequestURL";

/// Champs demandés à GenieACS (`?projection=`), pour limiter la taille des réponses
pub fn projection() -> Vec<&'static str> {
    let mut fields = vec![ID_FIELD, LAST_INFORM_FIELD, TAGS_FIELD];
    fields.extend_from_slice(PRODUCT_CLASS_PATHS);
    fields.extend_from_slice(RX_POWER_PATHS);
    fields.extend_from_slice(&[EXTERNAL_IP_PATH, CONNECTION_REQUEST_URL_PATH, UPTIME_PATH]);
    fields
}

#[derive(Debug, Clone)]
pub struct DeviceNormalizer {
    offline_after: Duration,
}

impl Default for DeviceNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_OFFLINE_AFTER)
    }
}

impl DeviceNormalizer {
    pub fn new(offline_after: Duration) -> Self {
        Self { offline_after }
    }

    pub fn offline_after(&self) -> Duration {
        self.offline_after
    }

    pub fn normalize(&self, raw: &RawRecord, now: OffsetDateTime) -> ParsedDevice {
        let serial = text_field(raw, ID_FIELD);
        let last_contact = raw
            .get(LAST_INFORM_FIELD)
            .and_then(Value::as_str)
            .and_then(|ts| OffsetDateTime::parse(ts, &Rfc3339).ok());
        let uptime_seconds = param(raw, UPTIME_PATH).map(coerce_seconds).unwrap_or(0);

        ParsedDevice {
            id: resolve_id(raw, serial.as_deref()),
            serial: serial.unwrap_or_else(|| UNKNOWN.to_string()),
            location: resolve_location(raw),
            // pas d'inform connu = écart infini
            is_online: last_contact.is_some_and(|ts| now - ts < self.offline_after),
            last_contact,
            rx_power: first_param(raw, RX_POWER_PATHS).and_then(coerce_f64),
            uptime_seconds,
            uptime: format_uptime(uptime_seconds),
            ip: resolve_ip(raw),
        }
    }
}

fn resolve_id(raw: &RawRecord, serial: Option<&str>) -> String {
    first_param(raw, PRODUCT_CLASS_PATHS)
        .and_then(as_text)
        .or_else(|| serial.and_then(product_class_from_serial))
        .or_else(|| serial.map(str::to_string))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// "OUI-ProductClass-Serial" -> "ProductClass"
fn product_class_from_serial(serial: &str) -> Option<String> {
    let mut segments = serial.split('-');
    segments.next()?;
    segments
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn resolve_location(raw: &RawRecord) -> String {
    let tags: Vec<String> = raw
        .get(TAGS_FIELD)
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(as_text).collect())
        .unwrap_or_default();

    if tags.is_empty() {
        NO_TAG.to_string()
    } else {
        tags.join(", ")
    }
}

fn resolve_ip(raw: &RawRecord) -> String {
    param(raw, EXTERNAL_IP_PATH)
        .and_then(as_text)
        .or_else(|| {
            param(raw, CONNECTION_REQUEST_URL_PATH)
                .and_then(as_text)
                .and_then(|url| host_from_url(&url))
        })
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Ex: "http://10.10.10.2:7547/tr069" -> "10.10.10.2"
fn host_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_start_matches('[').trim_end_matches(']');
    (!host.is_empty()).then(|| host.to_string())
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3_600;
    let minutes = seconds % 3_600 / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}

/// Descend un chemin pointé ("A.B.1.C") dans l'arbre JSON.
/// Un segment numérique est une clé d'objet, ou un index si le nœud est un tableau.
pub fn lookup<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(raw, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Valeur d'un paramètre TR-069 (`{path}._value`), si présente et non vide
pub fn param<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    let node = lookup(raw, path)?;
    let value = match node {
        Value::Object(map) => map.get("_value")?,
        scalar => scalar,
    };
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::Object(_) | Value::Array(_) => None,
        present => Some(present),
    }
}

fn first_param<'a>(raw: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|path| param(raw, path))
}

fn text_field(raw: &Value, field: &str) -> Option<String> {
    raw.get(field).and_then(as_text)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Nombre JSON tel quel, chaîne via son préfixe numérique ("-24.5 dBm" -> -24.5)
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_leading_f64(s),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn coerce_seconds(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| *v > 0.0).map(|v| v as u64))
            .unwrap_or(0),
        Value::String(s) => parse_leading_f64(s)
            .filter(|v| *v > 0.0)
            .map(|v| v.trunc() as u64)
            .unwrap_or(0),
        _ => 0,
    }
}

/// Lit le plus long préfixe décimal d'une chaîne (signe, chiffres, fraction, exposant)
pub fn parse_leading_f64(text: &str) -> Option<f64> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        digits += frac_end - (end + 1);
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    s[..end].parse().ok()
}

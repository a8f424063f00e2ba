use serde::{Deserialize, Deserializer, Serialize};

/// Coordinates above this magnitude are scaled integers (e.g. `-22906512`) and get divided back.
const SCALED_COORDINATE_THRESHOLD: f64 = 1000.0;
const COORDINATE_SCALE: f64 = 1_000_000.0;
const MAX_LONGITUDE: f64 = 180.0;
const MAX_LATITUDE: f64 = 90.0;

/// One physical service point, as written by the spreadsheet converter.
///
/// Field names on the wire are the converter's (Portuguese) column names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(
        rename = "HD",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub hd: Option<String>,

    #[serde(
        rename = "Matricula",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub matricula: Option<String>,

    #[serde(
        rename = "Cliente",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_name: Option<String>,

    #[serde(
        rename = "Endereço",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub address: Option<String>,

    #[serde(
        rename = "Cidade",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub city: Option<String>,

    #[serde(
        rename = "Bairro",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub district: Option<String>,

    #[serde(
        rename = "Classificação",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub classification: Option<String>,

    #[serde(
        rename = "Latitude",
        alias = "latitude",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub latitude: Option<String>,

    #[serde(
        rename = "Longitude",
        alias = "longitude",
        default,
        deserialize_with = "de_opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub longitude: Option<String>,
}

impl Record {
    /// Canonical form used by the store: HD upper-cased, coordinates normalized,
    /// and a coordinate pair that is partial, malformed, out of range or zero/zero
    /// dropped entirely.
    ///
    /// Snapshot values are canonicalized, not preserved: `-22.900000` is stored as `-22.9`.
    pub fn normalized(mut self) -> Self {
        self.hd = self.hd.map(|hd| hd.to_uppercase());

        let lat = self
            .latitude
            .as_deref()
            .and_then(normalize_coordinate)
            .filter(|lat| within(lat, MAX_LATITUDE));
        let lng = self.longitude.as_deref().and_then(normalize_coordinate);
        match (lat, lng) {
            (Some(lat), Some(lng)) if !(is_zero(&lat) && is_zero(&lng)) => {
                self.latitude = Some(lat);
                self.longitude = Some(lng);
            }
            _ => {
                self.latitude = None;
                self.longitude = None;
            }
        }
        self
    }

    /// A record is only indexable when it carries at least one identifier.
    pub fn has_identifier(&self) -> bool {
        self.hd.is_some() || self.matricula.is_some()
    }

    pub fn location(&self) -> Option<(&str, &str)> {
        match (self.latitude.as_deref(), self.longitude.as_deref()) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    /// Google Maps search link for the record's coordinates, if it has any.
    pub fn map_link(&self) -> Option<String> {
        let (lat, lng) = self.location()?;
        Some(format!(
            "https://www.google.com/maps/search/?api=1&query={lat},{lng}"
        ))
    }
}

/// Normalize a raw coordinate into a decimal string with at most 6 fractional digits.
///
/// Commas count as decimal separators, anything but digits, `.` and `-` is dropped,
/// magnitudes above 1000 are treated as scaled integers. Returns `None` when nothing
/// parseable is left or the value is still beyond ±180 after rescaling.
///
/// The output is canonical rather than a copy of the input: trailing zeros are
/// trimmed, so `-22.900000` becomes `-22.9`. Normalizing an already-normalized
/// value returns it unchanged.
pub fn normalize_coordinate(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let mut value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    if value.abs() > SCALED_COORDINATE_THRESHOLD {
        value /= COORDINATE_SCALE;
    }
    if value.abs() > MAX_LONGITUDE {
        return None;
    }

    let fixed = format!("{value:.6}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => Some("0".to_string()),
        other => Some(other.to_string()),
    }
}

fn within(coordinate: &str, limit: f64) -> bool {
    coordinate
        .parse::<f64>()
        .map(|v| v.abs() <= limit)
        .unwrap_or(false)
}

fn is_zero(coordinate: &str) -> bool {
    coordinate.parse::<f64>().map(|v| v == 0.0).unwrap_or(false)
}

/// Accept strings, numbers or null; blank strings read as absent.
fn de_opt_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("nan") {
                None
            } else {
                Some(t.to_string())
            }
        }
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

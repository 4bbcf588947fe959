use std::{cmp::Reverse, collections::HashSet, fmt};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use derive_getters::Getters;
use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;

/// Opaque sensor identifier.
///
/// The remote store may send ids as strings or numbers; both are kept in
/// their string form so lookups and searches compare the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorId(String);

impl SensorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SensorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A sensor record exactly as the remote store sends it.
///
/// Every field is optional and tolerant of wrong types: a value that can't be
/// used is treated as absent rather than failing the whole response.
///
/// The mergeable fields are doubly optional. The outer `None` means the field
/// was not sent; `Some(None)` means it was sent as null or with an unusable
/// value, which still overrides the local value on merge.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSensor {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: Option<SensorId>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub temperature: Option<Option<f64>>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub humidity: Option<Option<f64>>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub soil_moisture: Option<Option<f64>>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_active: Option<Option<bool>>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RawSensor {
    /// `timestamp` wins over `createdAt`.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.or(self.created_at)
    }

    /// Turn the wire record into a snapshot entry. Returns `None` when the
    /// record carries no usable id.
    pub fn normalize(self) -> Option<SensorReading> {
        let recorded_at = self.recorded_at();
        Some(SensorReading {
            id: self.id?,
            location: self.location.flatten(),
            temperature: self.temperature.flatten(),
            humidity: self.humidity.flatten(),
            soil_moisture: self.soil_moisture.flatten(),
            is_active: self.is_active.flatten().unwrap_or(true),
            recorded_at,
        })
    }
}

/// Body of a LIST response. Mock backends sometimes return a bare object
/// instead of an array.
///
/// Only an array of objects or a single object is accepted; any other shape,
/// including an array with a non-object element, fails the whole body.
#[derive(Debug, Clone)]
pub enum SensorPayload {
    Many(Vec<RawSensor>),
    One(RawSensor),
}

impl<'de> Deserialize<'de> for SensorPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(position, item)| match item {
                    Value::Object(_) => RawSensor::deserialize(item).map_err(D::Error::custom),
                    other => Err(D::Error::custom(format!(
                        "sensor record {position} is not an object: {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Many),
            item @ Value::Object(_) => RawSensor::deserialize(item)
                .map(Self::One)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!(
                "expected a sensor list or object, got {other}"
            ))),
        }
    }
}

impl SensorPayload {
    pub fn into_records(self) -> Vec<RawSensor> {
        match self {
            Self::Many(records) => records,
            Self::One(record) => vec![record],
        }
    }

    /// Normalize every record and order them most recent first.
    ///
    /// Records without an id are dropped and the first occurrence of a
    /// duplicated id wins. Ties on `recorded_at` keep the source order.
    pub fn into_snapshot(self) -> Vec<SensorReading> {
        let mut seen = HashSet::new();
        let mut snapshot = Vec::new();

        for (position, record) in self.into_records().into_iter().enumerate() {
            let Some(reading) = record.normalize() else {
                tracing::warn!(position, "Dropping sensor record without an id");
                continue;
            };
            if !seen.insert(reading.id.clone()) {
                tracing::warn!(sensor_id = %reading.id, "Dropping duplicate sensor record");
                continue;
            }
            snapshot.push(reading);
        }

        snapshot.sort_by_key(|reading| Reverse(reading.sort_key()));
        snapshot
    }
}

/// One device's last known telemetry, as held in the repository snapshot.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct SensorReading {
    id: SensorId,
    location: Option<String>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    soil_moisture: Option<f64>,
    #[getter(skip)]
    is_active: bool,
    recorded_at: Option<DateTime<Utc>>,
}

impl SensorReading {
    /// Absent or null `isActive` from the store already defaulted to `true`.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    /// Milliseconds since epoch, with an unknown time sorting as epoch 0.
    pub fn sort_key(&self) -> i64 {
        self.recorded_at
            .map(|recorded_at| recorded_at.timestamp_millis())
            .unwrap_or(0)
    }

    /// Overlay a server representation. Fields the server sent take precedence,
    /// an explicit null included; fields it left out keep their current value.
    pub fn merge(&mut self, update: RawSensor) {
        let recorded_at = update.recorded_at();
        if let Some(location) = update.location {
            self.location = location;
        }
        if let Some(temperature) = update.temperature {
            self.temperature = temperature;
        }
        if let Some(humidity) = update.humidity {
            self.humidity = humidity;
        }
        if let Some(soil_moisture) = update.soil_moisture {
            self.soil_moisture = soil_moisture;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active.unwrap_or(true);
        }
        if recorded_at.is_some() {
            self.recorded_at = recorded_at;
        }
    }
}

/// Parse the timestamp shapes seen from the remote store.
pub fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(text) => parse_timestamp_text(text.trim()),
        serde_json::Value::Number(number) => {
            let millis = number.as_i64().or_else(|| number.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        _ => None,
    }
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

mod lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::SensorId;

    pub fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SensorId>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(id) if !id.is_empty() => Some(SensorId(id)),
            Value::Number(id) => Some(SensorId(id.to_string())),
            _ => None,
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<String>>, D::Error> {
        Ok(Some(match Value::deserialize(deserializer)? {
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }))
    }

    pub fn number<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<f64>>, D::Error> {
        Ok(Some(Value::deserialize(deserializer)?.as_f64()))
    }

    pub fn flag<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<bool>>, D::Error> {
        Ok(Some(Value::deserialize(deserializer)?.as_bool()))
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(super::parse_timestamp(&Value::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn payload(value: serde_json::Value) -> SensorPayload {
        serde_json::from_value(value).unwrap()
    }

    fn ids(snapshot: &[SensorReading]) -> Vec<&str> {
        snapshot.iter().map(|reading| reading.id().as_str()).collect()
    }

    #[test]
    fn numeric_ids_are_kept_as_strings() {
        let raw: RawSensor = serde_json::from_value(json!({ "id": 13 })).unwrap();

        assert_eq!(raw.id, Some(SensorId::from("13")));
    }

    #[test]
    fn absent_or_null_is_active_defaults_to_true() {
        let snapshot = payload(json!([
            { "id": "1" },
            { "id": "2", "isActive": null },
            { "id": "3", "isActive": false },
        ]))
        .into_snapshot();

        let active: Vec<bool> = snapshot.iter().map(SensorReading::is_active).collect();
        assert_eq!(active, vec![true, true, false]);
    }

    #[test]
    fn non_numeric_measurements_are_unknown_not_zero() {
        let reading = payload(json!({
            "id": "1",
            "temperature": "hot",
            "humidity": null,
            "soilMoisture": 31.5,
        }))
        .into_snapshot()
        .remove(0);

        assert_eq!(*reading.temperature(), None);
        assert_eq!(*reading.humidity(), None);
        assert_eq!(*reading.soil_moisture(), Some(31.5));
    }

    #[test]
    fn timestamp_is_preferred_over_created_at() {
        let raw: RawSensor = serde_json::from_value(json!({
            "id": "1",
            "timestamp": "2024-03-01T10:00:00Z",
            "createdAt": "2023-01-01T00:00:00Z",
        }))
        .unwrap();

        assert_eq!(
            raw.recorded_at(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn created_at_is_used_when_timestamp_is_unusable() {
        let raw: RawSensor = serde_json::from_value(json!({
            "id": "1",
            "timestamp": "",
            "createdAt": 1_700_000_000_000_i64,
        }))
        .unwrap();

        assert_eq!(raw.recorded_at(), Utc.timestamp_millis_opt(1_700_000_000_000).single());
    }

    #[test]
    fn accepts_date_only_and_naive_timestamps() {
        assert_eq!(
            parse_timestamp(&json!("2024-01-02")),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp(&json!("2024-01-02 08:30:00")),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 8, 30, 0).unwrap())
        );
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }

    #[test]
    fn snapshot_is_most_recent_first_and_stable_on_ties() {
        let snapshot = payload(json!([
            { "id": "a", "timestamp": "2024-01-01T00:00:00Z" },
            { "id": "b" },
            { "id": "c", "timestamp": "2024-01-03T00:00:00Z" },
            { "id": "d", "createdAt": "2024-01-01T00:00:00Z" },
            { "id": "e" },
        ]))
        .into_snapshot();

        assert_eq!(ids(&snapshot), vec!["c", "a", "d", "b", "e"]);
        assert!(snapshot
            .windows(2)
            .all(|pair| pair[0].sort_key() >= pair[1].sort_key()));
    }

    #[test]
    fn single_object_becomes_one_element_snapshot() {
        let snapshot = payload(json!({ "id": "9", "location": "Greenhouse" })).into_snapshot();

        assert_eq!(ids(&snapshot), vec!["9"]);
        assert_eq!(snapshot[0].location().as_deref(), Some("Greenhouse"));
        assert!(snapshot[0].is_active());
    }

    #[test]
    fn records_without_id_and_duplicates_are_dropped() {
        let snapshot = payload(json!([
            { "location": "nowhere" },
            { "id": "1", "location": "first" },
            { "id": 1, "location": "second" },
        ]))
        .into_snapshot();

        assert_eq!(ids(&snapshot), vec!["1"]);
        assert_eq!(snapshot[0].location().as_deref(), Some("first"));
    }

    #[test]
    fn malformed_body_is_rejected() {
        assert!(serde_json::from_value::<SensorPayload>(json!("oops")).is_err());
        assert!(serde_json::from_value::<SensorPayload>(json!(42)).is_err());
    }

    #[test]
    fn list_with_a_non_object_element_is_rejected_whole() {
        for body in [
            json!([{ "id": "1" }, null]),
            json!(["abc"]),
            json!([1, 2]),
            json!([[{ "id": "1" }]]),
        ] {
            assert!(
                serde_json::from_value::<SensorPayload>(body.clone()).is_err(),
                "accepted {body}"
            );
        }
    }

    #[test]
    fn empty_list_is_an_empty_snapshot() {
        assert!(payload(json!([])).into_snapshot().is_empty());
    }

    #[test]
    fn merge_prefers_server_fields_and_keeps_the_rest() {
        let mut reading = payload(json!({
            "id": "1",
            "location": "North field",
            "temperature": 20.0,
            "isActive": true,
        }))
        .into_snapshot()
        .remove(0);

        let update = json!({ "id": "1", "isActive": false, "temperature": 21.5 });
        reading.merge(serde_json::from_value(update).unwrap());

        assert!(!reading.is_active());
        assert_eq!(*reading.temperature(), Some(21.5));
        assert_eq!(reading.location().as_deref(), Some("North field"));
    }

    #[test]
    fn merge_applies_explicit_nulls_from_the_server() {
        let mut reading = payload(json!({
            "id": "1",
            "location": "North field",
            "humidity": 40,
            "isActive": false,
        }))
        .into_snapshot()
        .remove(0);

        let update = json!({ "id": "1", "isActive": null, "location": null });
        reading.merge(serde_json::from_value(update).unwrap());

        assert!(reading.is_active());
        assert_eq!(*reading.location(), None);
        assert_eq!(*reading.humidity(), Some(40.0));
    }
}

//! Foreign batch -> native readings
//!
//! All-or-nothing: one bad element rejects the whole batch.

use chrono::{DateTime, NaiveDateTime, Utc};
use contracts::{Datapoint, DatapointValue, Reading};
use serde_json::{Map, Value};

use crate::error::{IngestError, Result};
use crate::foreign::value_type_name;

const ASSET_KEYS: [&str; 2] = ["asset_code", "asset"];
const READING_KEYS: [&str; 2] = ["reading", "readings"];
const TIMESTAMP_KEYS: [&str; 2] = ["user_ts", "timestamp"];

/// Convert a foreign list of readings
///
/// # Errors
/// - [`IngestError::NotASequence`] when `batch` is not a list
/// - [`IngestError::EmptyBatch`] for an empty list
/// - [`IngestError::InvalidElement`] for the first malformed element
pub fn readings_from_value(batch: &Value) -> Result<Vec<Reading>> {
    let Value::Array(elements) = batch else {
        return Err(IngestError::NotASequence {
            found: value_type_name(batch),
        });
    };
    if elements.is_empty() {
        return Err(IngestError::EmptyBatch);
    }

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            reading_from_value(element).map_err(|m| IngestError::invalid_element(index, m))
        })
        .collect()
}

fn reading_from_value(element: &Value) -> std::result::Result<Reading, String> {
    let Value::Object(fields) = element else {
        return Err(format!("expected dict, got {}", value_type_name(element)));
    };

    let asset_code = match first_of(fields, &ASSET_KEYS) {
        Some(Value::String(asset)) if !asset.is_empty() => asset.clone(),
        Some(Value::String(_)) => return Err("asset code is empty".to_string()),
        Some(other) => return Err(format!("asset code must be a string, got {}", value_type_name(other))),
        None => return Err("missing asset_code".to_string()),
    };

    let datapoints = match first_of(fields, &READING_KEYS) {
        Some(Value::Object(values)) => datapoints_from_map(values)?,
        Some(other) => return Err(format!("reading must be a dict, got {}", value_type_name(other))),
        None => return Err("missing reading".to_string()),
    };

    let user_ts = match first_of(fields, &TIMESTAMP_KEYS) {
        Some(Value::String(ts)) => parse_timestamp(ts)?,
        Some(Value::Null) | None => Utc::now(),
        Some(other) => return Err(format!("timestamp must be a string, got {}", value_type_name(other))),
    };

    let reading = Reading::with_timestamp(asset_code, datapoints, user_ts);
    match fields.get("id") {
        Some(Value::Number(id)) => id
            .as_u64()
            .map(|id| reading.with_id(id))
            .ok_or_else(|| format!("id must be a non-negative integer, got {id}")),
        Some(Value::Null) | None => Ok(reading),
        Some(other) => Err(format!("id must be an integer, got {}", value_type_name(other))),
    }
}

fn first_of<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| fields.get(*key))
}

fn datapoints_from_map(values: &Map<String, Value>) -> std::result::Result<Vec<Datapoint>, String> {
    values
        .iter()
        .map(|(name, value)| {
            datapoint_value(value)
                .map(|value| Datapoint::new(name.clone(), value))
                .map_err(|e| format!("datapoint '{name}': {e}"))
        })
        .collect()
}

fn datapoint_value(value: &Value) -> std::result::Result<DatapointValue, String> {
    match value {
        Value::Bool(b) => Ok(DatapointValue::Integer(i64::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(DatapointValue::Integer(i)),
            None => n
                .as_f64()
                .map(DatapointValue::Float)
                .ok_or_else(|| format!("unrepresentable number {n}")),
        },
        Value::String(s) => Ok(DatapointValue::String(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_f64().ok_or("arrays may only hold numbers"))
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map(DatapointValue::FloatArray)
            .map_err(str::to_string),
        Value::Object(nested) => datapoints_from_map(nested).map(DatapointValue::Dict),
        Value::Null => Err("null value".to_string()),
    }
}

/// Parse a reading timestamp
///
/// Accepts RFC 3339 and `YYYY-MM-DD HH:MM:SS[.ffffff][+00:00]` (UTC when no
/// offset is given).
fn parse_timestamp(ts: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{ts}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn test_preserves_order_and_count() {
        let batch = json!([
            {"asset_code": "pump1", "reading": {"rpm": 1200}},
            {"asset": "pump2", "readings": {"rpm": 900.5}},
            {"asset_code": "pump3", "reading": {"on": true}},
        ]);

        let readings = readings_from_value(&batch).unwrap();
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].asset_code(), "pump1");
        assert_eq!(readings[1].datapoint("rpm"), Some(&DatapointValue::Float(900.5)));
        assert_eq!(readings[2].datapoint("on"), Some(&DatapointValue::Integer(1)));
    }

    #[test]
    fn test_datapoints_keep_source_key_order() {
        let batch: Value = serde_json::from_str(
            r#"[{"asset_code":"a","reading":{"zeta":1,"alpha":2,"mid":{"z":1,"a":2}}}]"#,
        )
        .unwrap();

        let readings = readings_from_value(&batch).unwrap();
        let names: Vec<&str> = readings[0].datapoints().iter().map(|dp| dp.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);

        let Some(DatapointValue::Dict(nested)) = readings[0].datapoint("mid") else {
            panic!("mid is not a dict");
        };
        let nested: Vec<&str> = nested.iter().map(|dp| dp.name.as_str()).collect();
        assert_eq!(nested, ["z", "a"]);
    }

    #[test]
    fn test_nested_and_array_values() {
        let batch = json!([{
            "asset_code": "imu",
            "reading": {"accel": [0.1, 0.2, 9.8], "meta": {"unit": "m/s2"}}
        }]);

        let readings = readings_from_value(&batch).unwrap();
        assert_eq!(
            readings[0].datapoint("accel"),
            Some(&DatapointValue::FloatArray(vec![0.1, 0.2, 9.8]))
        );
        assert_eq!(
            readings[0].datapoint("meta"),
            Some(&DatapointValue::Dict(vec![Datapoint::new(
                "unit",
                DatapointValue::String("m/s2".to_string())
            )]))
        );
    }

    #[test]
    fn test_timestamps_and_ids() {
        let batch = json!([
            {"asset_code": "a", "reading": {"x": 1}, "user_ts": "2024-03-01 12:30:45.123456+00:00", "id": 7},
            {"asset_code": "b", "reading": {"x": 2}, "timestamp": "2024-03-01T12:30:45Z"},
            {"asset_code": "c", "reading": {"x": 3}, "user_ts": "2024-03-01 12:30:45"},
        ]);

        let readings = readings_from_value(&batch).unwrap();
        let ts = readings[0].user_timestamp();
        assert_eq!((ts.year(), ts.hour(), ts.nanosecond()), (2024, 12, 123_456_000));
        assert_eq!(readings[0].id(), Some(7));
        assert_eq!(readings[1].user_timestamp().minute(), 30);
        assert_eq!(readings[2].user_timestamp().second(), 45);
        assert_eq!(readings[2].id(), None);
    }

    #[test]
    fn test_scalar_batch_rejected() {
        let err = readings_from_value(&json!(42)).unwrap_err();
        assert_eq!(err, IngestError::NotASequence { found: "int" });
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert_eq!(readings_from_value(&json!([])).unwrap_err(), IngestError::EmptyBatch);
    }

    #[test]
    fn test_one_bad_element_rejects_batch() {
        let batch = json!([
            {"asset_code": "ok", "reading": {"x": 1}},
            {"asset_code": "bad", "reading": {"x": null}},
        ]);

        let err = readings_from_value(&batch).unwrap_err();
        assert!(matches!(err, IngestError::InvalidElement { index: 1, .. }));
        assert!(err.to_string().contains("null value"));
    }

    #[test]
    fn test_malformed_elements() {
        for element in [
            json!("text"),
            json!({"reading": {"x": 1}}),
            json!({"asset_code": "", "reading": {"x": 1}}),
            json!({"asset_code": "a"}),
            json!({"asset_code": "a", "reading": [1]}),
            json!({"asset_code": "a", "reading": {"x": ["s"]}}),
            json!({"asset_code": "a", "reading": {"x": 1}, "user_ts": "yesterday"}),
            json!({"asset_code": "a", "reading": {"x": 1}, "id": -1}),
        ] {
            let result = readings_from_value(&Value::Array(vec![element.clone()]));
            assert!(result.is_err(), "accepted {element}");
        }
    }
}

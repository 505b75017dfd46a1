//! Reading - a single sensor observation
//!
//! A reading is immutable once constructed. It is deliberately not `Clone`:
//! readings move between owners, they are never duplicated.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Value carried by a datapoint
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatapointValue {
    /// Signed integer
    Integer(i64),

    /// Floating point number
    Float(f64),

    /// UTF-8 string
    String(String),

    /// Array of floating point numbers
    FloatArray(Vec<f64>),

    /// Nested datapoints, encoded as a JSON object in datapoint order
    #[serde(with = "dict_as_object")]
    Dict(Vec<Datapoint>),
}

mod dict_as_object {
    use super::*;

    pub fn serialize<S: Serializer>(datapoints: &[Datapoint], s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(datapoints.len()))?;
        for dp in datapoints {
            map.serialize_entry(&dp.name, &dp.value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Datapoint>, D::Error> {
        d.deserialize_map(DictVisitor)
    }

    struct DictVisitor;

    impl<'de> Visitor<'de> for DictVisitor {
        type Value = Vec<Datapoint>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object of datapoints")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut datapoints = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, value)) = access.next_entry::<String, DatapointValue>()? {
                datapoints.push(Datapoint::new(name, value));
            }
            Ok(datapoints)
        }
    }
}

impl DatapointValue {
    /// Short type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::FloatArray(_) => "float_array",
            Self::Dict(_) => "dict",
        }
    }
}

/// Named value inside a reading
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    /// Datapoint name
    pub name: String,

    /// Datapoint value
    pub value: DatapointValue,
}

impl Datapoint {
    /// Create a datapoint
    pub fn new(name: impl Into<String>, value: DatapointValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One timestamped observation for an asset
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Storage-assigned id, absent for readings that never hit storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,

    /// Asset (source) name
    asset_code: String,

    /// Observation time (UTC)
    user_ts: DateTime<Utc>,

    /// Payload
    reading: Vec<Datapoint>,
}

impl Reading {
    /// Create a reading timestamped now
    pub fn new(asset_code: impl Into<String>, datapoints: Vec<Datapoint>) -> Self {
        Self::with_timestamp(asset_code, datapoints, Utc::now())
    }

    /// Create a reading with an explicit user timestamp
    pub fn with_timestamp(
        asset_code: impl Into<String>,
        datapoints: Vec<Datapoint>,
        user_ts: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            asset_code: asset_code.into(),
            user_ts,
            reading: datapoints,
        }
    }

    /// Attach a storage id (builder style, consumes the reading)
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn asset_code(&self) -> &str {
        &self.asset_code
    }

    pub fn user_timestamp(&self) -> DateTime<Utc> {
        self.user_ts
    }

    pub fn datapoints(&self) -> &[Datapoint] {
        &self.reading
    }

    /// Look up a top-level datapoint by name
    pub fn datapoint(&self, name: &str) -> Option<&DatapointValue> {
        self.reading
            .iter()
            .find(|dp| dp.name == name)
            .map(|dp| &dp.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_accessors() {
        let reading = Reading::new(
            "pump1",
            vec![
                Datapoint::new("flow", DatapointValue::Float(1.5)),
                Datapoint::new("state", DatapointValue::String("on".to_string())),
            ],
        )
        .with_id(42);

        assert_eq!(reading.asset_code(), "pump1");
        assert_eq!(reading.id(), Some(42));
        assert_eq!(reading.datapoints().len(), 2);
        assert_eq!(reading.datapoint("flow"), Some(&DatapointValue::Float(1.5)));
        assert!(reading.datapoint("missing").is_none());
    }

    #[test]
    fn test_reading_json_shape() {
        let reading = Reading::new(
            "sinusoid",
            vec![Datapoint::new("sinusoid", DatapointValue::Integer(3))],
        );
        let json = serde_json::to_value(&reading).unwrap();

        assert_eq!(json["asset_code"], "sinusoid");
        assert_eq!(json["reading"][0]["name"], "sinusoid");
        assert_eq!(json["reading"][0]["value"], 3);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_nested_datapoints_deserialize() {
        let json = r#"{
            "asset_code": "vib",
            "user_ts": "2024-01-01T00:00:00Z",
            "reading": [
                {"name": "axis", "value": {"x": 0.5, "y": -0.5}},
                {"name": "spectrum", "value": [1.0, 2.0]}
            ]
        }"#;
        let reading: Reading = serde_json::from_str(json).unwrap();

        assert!(matches!(
            reading.datapoint("axis"),
            Some(DatapointValue::Dict(inner)) if inner.len() == 2 && inner[0].name == "x"
        ));
        assert_eq!(
            reading.datapoint("spectrum"),
            Some(&DatapointValue::FloatArray(vec![1.0, 2.0]))
        );
    }

    #[test]
    fn test_empty_dict_keeps_its_type() {
        let reading = Reading::new(
            "meta",
            vec![
                Datapoint::new("tags", DatapointValue::Dict(vec![])),
                Datapoint::new("samples", DatapointValue::FloatArray(vec![])),
            ],
        );
        let json = serde_json::to_string(&reading).unwrap();
        let decoded: Reading = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.datapoint("tags"), Some(&DatapointValue::Dict(vec![])));
        assert_eq!(
            decoded.datapoint("samples"),
            Some(&DatapointValue::FloatArray(vec![]))
        );
    }
}

//! Wire representations for the store's typed scalar values.
//!
//! The remote store encodes non-JSON-native scalars as tagged hashes carrying
//! a `__type` discriminator. This module provides the typed wrappers and their
//! serialization contract: [`Pointer`], [`Date`], [`GeoPoint`], [`Bytes`] and
//! [`File`]. Anything beyond encode/decode (uploading files, geo math) belongs
//! to external collaborators.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{RecordLayerError, RecordLayerResult};

/// The `__type` discriminator key used by every tagged wire hash.
pub const TYPE_KEY: &str = "__type";

/// A reference-only handle to a record: its type name and identifier.
///
/// Pointers are how records refer to each other on the wire; a full body is
/// never embedded. Encoded as
/// `{"__type": "Pointer", "className": "<type>", "objectId": "<id>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointer {
    /// The remote record type name.
    #[serde(rename = "className")]
    pub class_name: String,
    /// The opaque identifier of the referenced record.
    #[serde(rename = "objectId")]
    pub object_id: String,
}

impl Pointer {
    /// Creates a pointer to the given type and identifier.
    pub fn new(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: object_id.into(),
        }
    }

    /// Encodes this pointer as its tagged wire hash.
    pub fn to_value(&self) -> Value {
        json!({
            TYPE_KEY: "Pointer",
            "className": self.class_name,
            "objectId": self.object_id,
        })
    }

    /// Decodes a tagged pointer hash. Returns `None` for anything that is not
    /// a well-formed pointer hash.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.get(TYPE_KEY)?.as_str()? != "Pointer" {
            return None;
        }

        Some(Self {
            class_name: map.get("className")?.as_str()?.to_string(),
            object_id: map.get("objectId")?.as_str()?.to_string(),
        })
    }
}

/// A timestamp value, encoded as `{"__type": "Date", "iso": "<ISO-8601>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date(pub DateTime<Utc>);

impl Date {
    /// Encodes this date as its tagged wire hash, millisecond precision.
    pub fn to_value(&self) -> Value {
        json!({
            TYPE_KEY: "Date",
            "iso": self.0.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    /// Decodes a date from either a bare ISO-8601 string or the tagged
    /// `{iso: ...}` wire hash.
    pub fn from_value(value: &Value) -> RecordLayerResult<Self> {
        let iso = match value {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map
                .get("iso")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    RecordLayerError::Serialization("Date hash missing iso field".into())
                })?,
            other => {
                return Err(RecordLayerError::Serialization(format!(
                    "cannot decode a date from {other}"
                )));
            }
        };

        Ok(Self(DateTime::parse_from_rfc3339(iso)?.with_timezone(&Utc)))
    }
}

/// A geographic coordinate, encoded as
/// `{"__type": "GeoPoint", "latitude": N, "longitude": N}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn to_value(&self) -> Value {
        json!({
            TYPE_KEY: "GeoPoint",
            "latitude": self.latitude,
            "longitude": self.longitude,
        })
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.get(TYPE_KEY)?.as_str()? != "GeoPoint" {
            return None;
        }

        Some(Self {
            latitude: map.get("latitude")?.as_f64()?,
            longitude: map.get("longitude")?.as_f64()?,
        })
    }
}

/// An opaque binary blob, carried as its base64 payload:
/// `{"__type": "Bytes", "base64": "<payload>"}`.
///
/// The payload is stored and forwarded verbatim; decoding the base64 content
/// is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bytes {
    pub base64: String,
}

impl Bytes {
    pub fn to_value(&self) -> Value {
        json!({ TYPE_KEY: "Bytes", "base64": self.base64 })
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.get(TYPE_KEY)?.as_str()? != "Bytes" {
            return None;
        }

        Some(Self {
            base64: map.get("base64")?.as_str()?.to_string(),
        })
    }
}

/// A stored file reference, encoded as
/// `{"__type": "File", "name": "<name>", "url": "<url>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    pub url: Option<String>,
}

impl File {
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(TYPE_KEY.to_string(), Value::String("File".to_string()));
        map.insert("name".to_string(), Value::String(self.name.clone()));
        if let Some(url) = &self.url {
            map.insert("url".to_string(), Value::String(url.clone()));
        }

        Value::Object(map)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.get(TYPE_KEY)?.as_str()? != "File" {
            return None;
        }

        Some(Self {
            name: map.get("name")?.as_str()?.to_string(),
            url: map
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Reduces a value to reference form if it refers to a record.
///
/// A pointer hash stays a pointer; a full record body (an object carrying a
/// `className` and `objectId` but fetched content as well) collapses to the
/// pointer that identifies it. Returns `None` for values that do not
/// reference a record.
pub fn pointer_to(value: &Value) -> Option<Pointer> {
    if let Some(pointer) = Pointer::from_value(value) {
        return Some(pointer);
    }

    // Full bodies carry the same identifying pair without the __type tag.
    let map = value.as_object()?;
    Some(Pointer {
        class_name: map.get("className")?.as_str()?.to_string(),
        object_id: map.get("objectId")?.as_str()?.to_string(),
    })
}

//! Body byte codecs

use serde_json::{Map, Value as Json};
use std::sync::Arc;

use crate::error::{Result, SchemaError};
use crate::types::{Record, ValueType};
use crate::value::FieldValue;

/// Encoding tag written by `JsonBodyCodec`
pub const JSON_ENCODING: &str = "json";

/// Serializes body records to and from stored payload bytes
pub trait BodyCodec: Send + Sync {
    /// Tag recorded next to the payload
    fn encoding(&self) -> &str;

    fn write(&self, body: &Record) -> Result<Vec<u8>>;

    fn read(&self, payload: &[u8], value_type: &Arc<ValueType>) -> Result<Record>;
}

/// JSON object codec. Members are written by name; unknown members are
/// ignored on read and missing members keep their defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBodyCodec {
    pub pretty: bool,
}

impl JsonBodyCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pretty(pretty: bool) -> Self {
        Self { pretty }
    }

    fn codec_error(message: impl Into<String>) -> SchemaError {
        SchemaError::Codec {
            encoding: JSON_ENCODING.to_string(),
            message: message.into(),
        }
    }

    /// JSON object form of a body
    pub fn to_json(body: &Record) -> Json {
        let object: Map<String, Json> = body
            .iter()
            .map(|(member, value)| (member.name.clone(), value.to_json()))
            .collect();
        Json::Object(object)
    }

    /// Build a body from a JSON object
    pub fn from_json(json: &Json, value_type: &Arc<ValueType>) -> Result<Record> {
        let object = json
            .as_object()
            .ok_or_else(|| Self::codec_error(format!("expected a JSON object, found {}", json)))?;

        let mut body = value_type.instantiate();
        for member in value_type.members() {
            let Some(raw) = object.get(&member.name) else {
                continue;
            };
            let value = FieldValue::from_json(raw, member.kind)
                .map_err(|reason| Self::codec_error(format!("member '{}': {}", member.name, reason)))?;
            body.set(&member.name, value)?;
        }
        Ok(body)
    }
}

impl BodyCodec for JsonBodyCodec {
    fn encoding(&self) -> &str {
        JSON_ENCODING
    }

    fn write(&self, body: &Record) -> Result<Vec<u8>> {
        let json = Self::to_json(body);
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&json)?
        } else {
            serde_json::to_vec(&json)?
        };
        Ok(bytes)
    }

    fn read(&self, payload: &[u8], value_type: &Arc<ValueType>) -> Result<Record> {
        let json: Json = serde_json::from_slice(payload)
            .map_err(|e| Self::codec_error(format!("malformed payload: {}", e)))?;
        Self::from_json(&json, value_type)
    }
}

//! Bridge between the value model and JSON.
//!
//! Export goes through `serde::Serialize`, so any serde format works, though
//! JSON is the one the CLI uses. Values without a JSON counterpart are
//! written as strings:
//!
//! - datetimes in their canonical TOML form (`1979-05-27T07:32:00Z`)
//! - integers outside `i64` as decimal digits
//! - `inf`, `-inf` and `nan`
//!
//! Import is `TryFrom<serde_json::Value>`. JSON strings are never sniffed
//! for datetimes. Arrays whose elements are all objects become arrays of
//! tables; every other array becomes an inline array and must be homogeneous.

use crate::error::CodecError;
use crate::value::{Array, InlineArray, Integer, Str, Table, Value, WideInt};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as Json;

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(Integer::Native(n)) => serializer.serialize_i64(*n),
            Value::Int(Integer::Wide(w)) => serializer.collect_str(w),
            Value::Float(f) if f.is_nan() => serializer.serialize_str("nan"),
            Value::Float(f) if f.is_infinite() => {
                serializer.serialize_str(if *f > 0.0 { "inf" } else { "-inf" })
            }
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::String(s) => serializer.serialize_str(&s.value),
            Value::Datetime(dt) => serializer.collect_str(dt),
            Value::Table(t) => serialize_entries(t.entries(), serializer),
            Value::InlineTable(t) => serialize_entries(t.entries(), serializer),
            Value::Array(a) => serializer.collect_seq(a.iter()),
            Value::InlineArray(a) => serializer.collect_seq(a.iter()),
        }
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_entries(self.entries(), serializer)
    }
}

fn serialize_entries<S: Serializer>(
    entries: &[(String, Value)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (key, value) in entries {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

impl TryFrom<Json> for Value {
    type Error = CodecError;

    fn try_from(json: Json) -> Result<Self, Self::Error> {
        match json {
            Json::Null => Err(CodecError::Json(
                "null has no TOML representation".to_string(),
            )),
            Json::Bool(b) => Ok(Value::Bool(b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(i))
                } else if let Some(u) = n.as_u64() {
                    WideInt::from_decimal(false, &u.to_string())
                        .map(|w| Value::Int(Integer::Wide(w)))
                        .ok_or_else(|| CodecError::Json(format!("Invalid integer {n}")))
                } else {
                    n.as_f64()
                        .map(Value::Float)
                        .ok_or_else(|| CodecError::Json(format!("Invalid number {n}")))
                }
            }
            Json::String(s) => Ok(Value::String(Str::new(s))),
            Json::Array(items) if !items.is_empty() && items.iter().all(Json::is_object) => {
                let tables = items
                    .into_iter()
                    .map(Table::try_from)
                    .collect::<Result<Array, _>>()?;
                Ok(Value::Array(tables))
            }
            Json::Array(items) => {
                let values = items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::InlineArray(InlineArray::from_values(values)?))
            }
            Json::Object(map) => Ok(Value::Table(Table::try_from(Json::Object(map))?)),
        }
    }
}

impl TryFrom<Json> for Table {
    type Error = CodecError;

    fn try_from(json: Json) -> Result<Self, Self::Error> {
        let map = match json {
            Json::Object(map) => map,
            other => {
                return Err(CodecError::Json(format!(
                    "Expected a JSON object for a table, got {}",
                    json_type_name(&other)
                )))
            }
        };
        let mut table = Table::new();
        for (key, value) in map {
            let value = Value::try_from(value)
                .map_err(|e| CodecError::Json(format!("at key '{key}': {e}")))?;
            table.insert(key, value);
        }
        Ok(table)
    }
}

fn json_type_name(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

//! Column codec - field values to storage values and back
//!
//! Encoding rules per type tag:
//! - integer, float, text: stored as-is
//! - boolean: `1` / `0`
//! - decimal: canonical text; absent stays NULL
//! - timestamp: epoch milliseconds, finer precision is dropped; absent stays NULL
//! - binary: bytes; absent becomes an empty blob
//! - enum: variant name
//! - entity: the referent's identifier, `0` when absent or not yet known
//! - entity collection: no column (realised through join rows)
//!
//! Decoding is lenient about SQLite's dynamic typing: a numeric column that
//! was written as text still decodes when the text parses.

use std::str::FromStr;

use chrono::DateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rusqlite::types::Value;

use crate::entity::{FieldDescriptor, Node, TypeTag};
use crate::identity::{self, IdentityMap};
use crate::row::Row;
use crate::value::FieldValue;
use crate::{Error, Result};

/// A row ready for writing, plus the references that could not be resolved yet
#[derive(Debug, Default)]
pub struct EncodedRow {
    pub row: Row,
    /// Entity columns written as `0` because the referent has no identifier yet
    pub pending: Vec<(String, Node)>,
}

/// Encode every persisted non-identity column of an entity
pub fn encode_row(node: &Node, ids: &IdentityMap) -> Result<EncodedRow> {
    let descriptor = node.descriptor()?;
    let mut encoded = EncodedRow::default();

    for field in &descriptor.fields {
        let Some(column) = &field.column else {
            continue;
        };
        if field.is_identity() {
            continue;
        }

        let value = node.read(field)?;
        if let FieldValue::Entity(referent) = &value {
            if identity::resolve_id(referent, ids)?.is_none() {
                encoded.pending.push((column.clone(), referent.clone()));
            }
        }
        encoded.row.set(column.clone(), encode(&value, field, ids)?);
    }

    Ok(encoded)
}

/// Encode a single field value
pub fn encode(value: &FieldValue, field: &FieldDescriptor, ids: &IdentityMap) -> Result<Value> {
    let encoded = match (field.tag, value) {
        (TypeTag::Binary, FieldValue::Null) => Value::Blob(Vec::new()),
        (TypeTag::Entity, FieldValue::Null) => Value::Integer(0),
        (_, FieldValue::Null) => Value::Null,
        (_, FieldValue::Integer(v)) => Value::Integer(*v),
        (_, FieldValue::Float(v)) => Value::Real(*v),
        (_, FieldValue::Boolean(v)) => Value::Integer(i64::from(*v)),
        (_, FieldValue::Text(v)) => Value::Text(v.clone()),
        (_, FieldValue::Binary(v)) => Value::Blob(v.clone()),
        (_, FieldValue::Timestamp(v)) => Value::Integer(v.timestamp_millis()),
        (_, FieldValue::Enum(name)) => Value::Text(name.clone()),
        (_, FieldValue::Decimal(v)) => Value::Text(v.normalize().to_string()),
        (_, FieldValue::Entity(referent)) => {
            Value::Integer(identity::resolve_id(referent, ids)?.unwrap_or(0))
        }
        (_, FieldValue::Entities(_)) => {
            return Err(coercion(field, "entity collections have no column".to_string()));
        }
    };
    Ok(encoded)
}

/// Decode a stored value for the given field.
///
/// Entity columns decode to `FieldValue::Integer(id)`; resolving the
/// referent is the materializer's job.
pub fn decode(value: &Value, field: &FieldDescriptor) -> Result<FieldValue> {
    if let Value::Null = value {
        return Ok(FieldValue::Null);
    }

    let decoded = match field.tag {
        TypeTag::Integer | TypeTag::Entity => match value {
            Value::Integer(v) => Some(FieldValue::Integer(*v)),
            Value::Text(s) => s.trim().parse().ok().map(FieldValue::Integer),
            Value::Real(f) if f.fract() == 0.0 => Some(FieldValue::Integer(*f as i64)),
            _ => None,
        },
        TypeTag::Float => match value {
            Value::Real(v) => Some(FieldValue::Float(*v)),
            Value::Integer(v) => Some(FieldValue::Float(*v as f64)),
            Value::Text(s) => s.trim().parse().ok().map(FieldValue::Float),
            _ => None,
        },
        TypeTag::Boolean => match value {
            Value::Integer(v) => Some(FieldValue::Boolean(*v != 0)),
            Value::Text(s) => match s.trim().to_lowercase().as_str() {
                "1" | "true" => Some(FieldValue::Boolean(true)),
                "0" | "false" => Some(FieldValue::Boolean(false)),
                _ => None,
            },
            _ => None,
        },
        TypeTag::Text => match value {
            Value::Text(s) => Some(FieldValue::Text(s.clone())),
            Value::Integer(v) => Some(FieldValue::Text(v.to_string())),
            Value::Real(v) => Some(FieldValue::Text(v.to_string())),
            Value::Blob(b) => String::from_utf8(b.clone()).ok().map(FieldValue::Text),
            Value::Null => None,
        },
        TypeTag::Binary => match value {
            Value::Blob(b) => Some(FieldValue::Binary(b.clone())),
            Value::Text(s) => Some(FieldValue::Binary(s.as_bytes().to_vec())),
            _ => None,
        },
        TypeTag::Timestamp => {
            let millis = match value {
                Value::Integer(v) => Some(*v),
                Value::Text(s) => s.trim().parse().ok(),
                _ => None,
            };
            millis
                .and_then(DateTime::from_timestamp_millis)
                .map(FieldValue::Timestamp)
        }
        TypeTag::Enum => match value {
            Value::Text(s) => Some(FieldValue::Enum(s.clone())),
            _ => None,
        },
        TypeTag::Decimal => match value {
            Value::Text(s) => Decimal::from_str(s.trim()).ok().map(FieldValue::Decimal),
            Value::Integer(v) => Some(FieldValue::Decimal(Decimal::from(*v))),
            Value::Real(v) => Decimal::from_f64(*v).map(FieldValue::Decimal),
            _ => None,
        },
        TypeTag::EntityCollection => {
            return Err(coercion(field, "entity collections have no column".to_string()));
        }
    };

    decoded.ok_or_else(|| {
        coercion(
            field,
            format!("cannot read {} as {}", describe_value(value), field.tag),
        )
    })
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => format!("integer {}", v),
        Value::Real(v) => format!("real {}", v),
        Value::Text(s) => format!("text {:?}", s),
        Value::Blob(b) => format!("blob of {} bytes", b.len()),
    }
}

fn coercion(field: &FieldDescriptor, message: String) -> Error {
    Error::Coercion {
        entity: field.entity.clone(),
        field: field.name.clone(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Handle, cache::descriptor_of};
    use crate::fixtures::{Author, Book, Event, Status};
    use chrono::{TimeZone, Utc};

    fn event_field(name: &str) -> &'static FieldDescriptor {
        descriptor_of::<Event>().unwrap().field(name).unwrap()
    }

    fn roundtrip(value: FieldValue, field: &str) -> FieldValue {
        let field = event_field(field);
        let stored = encode(&value, field, &IdentityMap::new()).unwrap();
        decode(&stored, field).unwrap()
    }

    #[test]
    fn test_scalar_roundtrips() {
        let at = Utc.with_ymd_and_hms(2023, 5, 1, 12, 30, 15).unwrap();
        let price = Decimal::from_str("19.990").unwrap();

        assert_eq!(roundtrip(FieldValue::Integer(-42), "attendees"), FieldValue::Integer(-42));
        assert_eq!(roundtrip(FieldValue::Float(2.5), "rating"), FieldValue::Float(2.5));
        assert_eq!(roundtrip(FieldValue::Boolean(true), "public"), FieldValue::Boolean(true));
        assert_eq!(roundtrip(FieldValue::Text("hi".into()), "title"), FieldValue::Text("hi".into()));
        assert_eq!(roundtrip(FieldValue::Timestamp(at), "starts_at"), FieldValue::Timestamp(at));
        assert_eq!(roundtrip(FieldValue::Decimal(price), "price"), FieldValue::Decimal(price));
        assert_eq!(
            roundtrip(FieldValue::Enum("Published".into()), "status"),
            FieldValue::Enum("Published".into())
        );
        assert_eq!(
            roundtrip(FieldValue::Binary(vec![0, 159, 255]), "payload"),
            FieldValue::Binary(vec![0, 159, 255])
        );
    }

    #[test]
    fn test_timestamp_keeps_whole_milliseconds() {
        let base = Utc.with_ymd_and_hms(2023, 5, 1, 12, 30, 15).unwrap();
        let precise = base + chrono::Duration::nanoseconds(1_234_567);

        assert_eq!(
            roundtrip(FieldValue::Timestamp(precise), "starts_at"),
            FieldValue::Timestamp(base + chrono::Duration::milliseconds(1))
        );
    }

    #[test]
    fn test_absent_values() {
        let none = IdentityMap::new();
        assert_eq!(encode(&FieldValue::Null, event_field("price"), &none).unwrap(), Value::Null);
        assert_eq!(encode(&FieldValue::Null, event_field("starts_at"), &none).unwrap(), Value::Null);
        // Absent binary is stored as an empty blob and reads back empty
        assert_eq!(roundtrip(FieldValue::Null, "payload"), FieldValue::Binary(Vec::new()));
    }

    #[test]
    fn test_boolean_storage() {
        let field = event_field("public");
        let none = IdentityMap::new();
        assert_eq!(encode(&FieldValue::Boolean(false), field, &none).unwrap(), Value::Integer(0));
        assert_eq!(decode(&Value::Text("true".into()), field).unwrap(), FieldValue::Boolean(true));
        assert_eq!(decode(&Value::Integer(7), field).unwrap(), FieldValue::Boolean(true));
    }

    #[test]
    fn test_lenient_numeric_decoding() {
        assert_eq!(
            decode(&Value::Text(" 12 ".into()), event_field("attendees")).unwrap(),
            FieldValue::Integer(12)
        );
        assert_eq!(decode(&Value::Integer(3), event_field("rating")).unwrap(), FieldValue::Float(3.0));
        assert_eq!(
            decode(&Value::Integer(5), event_field("title")).unwrap(),
            FieldValue::Text("5".into())
        );
    }

    #[test]
    fn test_unreadable_value_is_coercion_error() {
        let err = decode(&Value::Text("soon".into()), event_field("starts_at")).unwrap_err();
        assert!(err.is_coercion());
        assert!(err.to_string().contains("starts_at"));
    }

    #[test]
    fn test_enum_decodes_name_only() {
        // Name validation happens when the value is written into the field
        let decoded = decode(&Value::Text("Archived".into()), event_field("status")).unwrap();
        assert_eq!(decoded, FieldValue::Enum("Archived".into()));
        assert_eq!(Status::default(), Status::Draft);
    }

    #[test]
    fn test_entity_reference_encoding() {
        let author = Handle::new(Author::named("Le Guin"));
        let book = Handle::new(Book::titled("Earthsea"));
        book.borrow_mut().author = Some(author.clone());

        let mut ids = IdentityMap::new();
        let encoded = encode_row(&book.erase(), &ids).unwrap();
        assert_eq!(encoded.row.get("AUTHOR"), Some(&Value::Integer(0)));
        assert_eq!(encoded.pending.len(), 1);
        assert_eq!(encoded.pending[0].0, "AUTHOR");

        ids.stage(&author.erase(), 7);
        let encoded = encode_row(&book.erase(), &ids).unwrap();
        assert_eq!(encoded.row.get("AUTHOR"), Some(&Value::Integer(7)));
        assert!(encoded.pending.is_empty());
        assert!(encoded.row.get("ID").is_none());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let book = Handle::new(Book::titled("Dune"));
        let ids = IdentityMap::new();
        let first = encode_row(&book.erase(), &ids).unwrap();
        let second = encode_row(&book.erase(), &ids).unwrap();
        assert_eq!(first.row, second.row);
    }
}

//! Field values - the native side of the column codec
//!
//! Every persisted field is read and written as a [`FieldValue`]. The
//! [`Column`] trait connects concrete Rust types to those values; the codec
//! then turns them into SQLite storage values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;

use crate::entity::{Node, TypeTag};

/// A field's value in its native (pre-storage) form
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Absent value (`None`)
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Binary(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Symbolic name of an enumeration variant
    Enum(String),
    Decimal(Decimal),
    /// A single referenced entity
    Entity(Node),
    /// A collection of referenced entities
    Entities(Vec<Node>),
}

impl FieldValue {
    /// Short name of the variant, used in coercion messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Text(_) => "text",
            FieldValue::Binary(_) => "binary",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Enum(_) => "enum",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::Entity(_) => "entity",
            FieldValue::Entities(_) => "entities",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// The integer payload, if this is an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Boolean(a), Boolean(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Binary(a), Binary(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (Enum(a), Enum(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            // Entities compare by handle identity, never by content
            (Entity(a), Entity(b)) => a.key() == b.key(),
            (Entities(a), Entities(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key() == y.key())
            }
            _ => false,
        }
    }
}

fn mismatch(expected: &str, got: &FieldValue) -> String {
    format!("expected {} value, got {}", expected, got.kind_name())
}

/// A Rust type that can be stored in a single column.
///
/// Implemented for the scalar types the codec understands, for enumerations
/// declared with [`enum_column!`](crate::enum_column), and for `Option<C>`.
pub trait Column: Sized {
    /// Type tag that selects the codec rule for this column
    const TAG: TypeTag;

    fn to_field(&self) -> FieldValue;

    fn from_field(value: FieldValue) -> std::result::Result<Self, String>;
}

impl<C: Column> Column for Option<C> {
    const TAG: TypeTag = C::TAG;

    fn to_field(&self) -> FieldValue {
        match self {
            Some(value) => value.to_field(),
            None => FieldValue::Null,
        }
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
        match value {
            FieldValue::Null => Ok(None),
            other => C::from_field(other).map(Some),
        }
    }
}

impl Column for i64 {
    const TAG: TypeTag = TypeTag::Integer;

    fn to_field(&self) -> FieldValue {
        FieldValue::Integer(*self)
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
        match value {
            FieldValue::Integer(v) => Ok(v),
            other => Err(mismatch("integer", &other)),
        }
    }
}

macro_rules! narrow_integer_column {
    ($($ty:ty),+) => {
        $(
            impl Column for $ty {
                const TAG: TypeTag = TypeTag::Integer;

                fn to_field(&self) -> FieldValue {
                    FieldValue::Integer(i64::from(*self))
                }

                fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
                    match value {
                        FieldValue::Integer(v) => <$ty>::try_from(v)
                            .map_err(|_| format!("{} is out of range for {}", v, stringify!($ty))),
                        other => Err(mismatch("integer", &other)),
                    }
                }
            }
        )+
    };
}

narrow_integer_column!(i32, i16, u32);

impl Column for f64 {
    const TAG: TypeTag = TypeTag::Float;

    fn to_field(&self) -> FieldValue {
        FieldValue::Float(*self)
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
        match value {
            FieldValue::Float(v) => Ok(v),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl Column for f32 {
    const TAG: TypeTag = TypeTag::Float;

    fn to_field(&self) -> FieldValue {
        FieldValue::Float(f64::from(*self))
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
        match value {
            FieldValue::Float(v) => Ok(v as f32),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl Column for bool {
    const TAG: TypeTag = TypeTag::Boolean;

    fn to_field(&self) -> FieldValue {
        FieldValue::Boolean(*self)
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
        match value {
            FieldValue::Boolean(v) => Ok(v),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl Column for String {
    const TAG: TypeTag = TypeTag::Text;

    fn to_field(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
        match value {
            FieldValue::Text(v) => Ok(v),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl Column for Vec<u8> {
    const TAG: TypeTag = TypeTag::Binary;

    fn to_field(&self) -> FieldValue {
        FieldValue::Binary(self.clone())
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
        match value {
            FieldValue::Binary(v) => Ok(v),
            other => Err(mismatch("binary", &other)),
        }
    }
}

impl Column for Decimal {
    const TAG: TypeTag = TypeTag::Decimal;

    fn to_field(&self) -> FieldValue {
        FieldValue::Decimal(*self)
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
        match value {
            FieldValue::Decimal(v) => Ok(v),
            other => Err(mismatch("decimal", &other)),
        }
    }
}

impl Column for DateTime<Utc> {
    const TAG: TypeTag = TypeTag::Timestamp;

    fn to_field(&self) -> FieldValue {
        FieldValue::Timestamp(*self)
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
        match value {
            FieldValue::Timestamp(v) => Ok(v),
            other => Err(mismatch("timestamp", &other)),
        }
    }
}

impl Column for NaiveDateTime {
    const TAG: TypeTag = TypeTag::Timestamp;

    fn to_field(&self) -> FieldValue {
        FieldValue::Timestamp(self.and_utc())
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
        match value {
            FieldValue::Timestamp(v) => Ok(v.naive_utc()),
            other => Err(mismatch("timestamp", &other)),
        }
    }
}

impl Column for NaiveDate {
    const TAG: TypeTag = TypeTag::Timestamp;

    fn to_field(&self) -> FieldValue {
        FieldValue::Timestamp(self.and_time(NaiveTime::MIN).and_utc())
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, String> {
        match value {
            FieldValue::Timestamp(v) => Ok(v.date_naive()),
            other => Err(mismatch("timestamp", &other)),
        }
    }
}

/// Implement [`Column`] for a fieldless enum, stored by variant name.
///
/// ```
/// #[derive(Debug, Default, Clone, Copy, PartialEq)]
/// enum Status { #[default] Draft, Published }
///
/// rowbind::enum_column!(Status { Draft, Published });
/// ```
#[macro_export]
macro_rules! enum_column {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::Column for $ty {
            const TAG: $crate::TypeTag = $crate::TypeTag::Enum;

            fn to_field(&self) -> $crate::FieldValue {
                let name = match self {
                    $($ty::$variant => stringify!($variant),)+
                };
                $crate::FieldValue::Enum(name.to_string())
            }

            fn from_field(value: $crate::FieldValue) -> ::std::result::Result<Self, String> {
                match value {
                    $crate::FieldValue::Enum(name) => match name.as_str() {
                        $(stringify!($variant) => Ok($ty::$variant),)+
                        other => Err(format!("{} has no variant named {:?}", stringify!($ty), other)),
                    },
                    other => Err(format!("expected enum value, got {}", other.kind_name())),
                }
            }
        }
    };
}

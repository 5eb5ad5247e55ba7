use crate::value::Value;
use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// FieldKind
///
/// Semantic type of a field. Relation kinds decide how a path segment joins,
/// how the cache stores the value, and how the value is persisted.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[remain::sorted]
pub enum FieldKind {
    Binary,
    Boolean,
    Char,
    Date,
    DateTime,
    Float,
    Integer,
    Many2Many,
    Many2One,
    One2Many,
    One2One,
    Rev2One,
    Selection,
    Text,
}

impl FieldKind {
    #[must_use]
    pub const fn is_relation(self) -> bool {
        matches!(
            self,
            Self::Many2Many | Self::Many2One | Self::One2Many | Self::One2One | Self::Rev2One
        )
    }

    /// Relation kinds stored as a foreign key column on this side.
    #[must_use]
    pub const fn is_fk(self) -> bool {
        matches!(self, Self::Many2One | Self::One2One)
    }

    /// Relation kinds whose foreign key lives on the related model.
    #[must_use]
    pub const fn is_reverse(self) -> bool {
        matches!(self, Self::One2Many | Self::Rev2One)
    }

    #[must_use]
    pub const fn is_to_many(self) -> bool {
        matches!(self, Self::One2Many | Self::Many2Many)
    }

    /// Whether a value of this kind occupies a column of the owning table.
    #[must_use]
    pub const fn has_column(self) -> bool {
        !matches!(self, Self::Many2Many | Self::One2Many | Self::Rev2One)
    }

    /// Suffix appended to the snake-cased field name to build its json name.
    #[must_use]
    pub const fn json_suffix(self) -> &'static str {
        match self {
            Self::Many2One | Self::One2One | Self::Rev2One => "_id",
            Self::One2Many | Self::Many2Many => "_ids",
            _ => "",
        }
    }

    /// Aggregate applied by grouped reads when the caller names none.
    #[must_use]
    pub const fn default_group_operator(self) -> Option<&'static str> {
        match self {
            Self::Float | Self::Integer => Some("sum"),
            _ => None,
        }
    }

    #[must_use]
    pub const fn zero_value(self) -> Value {
        match self {
            Self::Binary => Value::Blob(Vec::new()),
            Self::Boolean => Value::Bool(false),
            Self::Char | Self::Date | Self::DateTime | Self::Selection | Self::Text => {
                Value::Text(String::new())
            }
            Self::Float => Value::Float(0.0),
            Self::Integer | Self::Many2One | Self::One2One | Self::Rev2One => Value::Int(0),
            Self::Many2Many | Self::One2Many => Value::Ids(Vec::new()),
        }
    }

    /// Normalize a raw storage value into this kind's canonical shape.
    ///
    /// SQL NULL becomes the zero value; booleans stored as integers become
    /// `Bool`, integers read back for float columns become `Float`.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn decode(self, raw: Value) -> Value {
        match (self, raw) {
            (kind, Value::Null) => kind.zero_value(),
            (Self::Boolean, Value::Int(n)) => Value::Bool(n != 0),
            (Self::Float, Value::Int(n)) => Value::Float(n as f64),
            (Self::Binary, Value::Text(s)) => Value::Blob(s.into_bytes()),
            (_, raw) => raw,
        }
    }

    /// Convert a value to the shape written to storage.
    ///
    /// The relation null sentinel is written as NULL so foreign key
    /// constraints are never violated by id 0.
    #[must_use]
    pub fn encode(self, value: Value) -> Value {
        match (self, value) {
            (kind, value) if kind.is_fk() && value.is_null_fk() => Value::Null,
            (_, value) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_kinds_exclude_reverse_and_link_relations() {
        assert!(FieldKind::Many2One.has_column());
        assert!(FieldKind::Char.has_column());
        assert!(!FieldKind::One2Many.has_column());
        assert!(!FieldKind::Rev2One.has_column());
        assert!(!FieldKind::Many2Many.has_column());
    }

    #[test]
    fn decode_null_yields_zero_value() {
        assert_eq!(FieldKind::Float.decode(Value::Null), Value::Float(0.0));
        assert_eq!(FieldKind::Many2One.decode(Value::Null), Value::Int(0));
        assert_eq!(FieldKind::Boolean.decode(Value::Int(1)), Value::Bool(true));
        assert_eq!(FieldKind::Float.decode(Value::Int(3)), Value::Float(3.0));
    }

    #[test]
    fn encode_turns_fk_sentinel_into_null() {
        assert_eq!(FieldKind::Many2One.encode(Value::Int(0)), Value::Null);
        assert_eq!(FieldKind::Many2One.encode(Value::Int(8)), Value::Int(8));
        assert_eq!(FieldKind::Integer.encode(Value::Int(0)), Value::Int(0));
    }
}

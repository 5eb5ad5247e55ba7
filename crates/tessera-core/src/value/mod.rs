#[cfg(test)]
mod tests;

use derive_more::{Deref, DerefMut, IntoIterator};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

///
/// Value
///
/// Dynamic field value flowing between the cache, compute methods and SQL.
///
/// Null       → SQL NULL.
/// Int(0)     → on a many-to-one / one-to-one field, the relation null sentinel.
/// Ids        → record ids of a one-to-many / many-to-many relation.
/// List       → argument list for `In` / `NotIn` predicates over scalars.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Ids(Vec<i64>),
    List(Vec<Self>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for the zero value of every variant (null, false, 0, "", empty).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(n) => *n == 0,
            Self::Float(x) => *x == 0.0,
            Self::Text(s) => s.is_empty(),
            Self::Blob(b) => b.is_empty(),
            Self::Ids(ids) => ids.is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }

    /// True when this value is the relation null sentinel (NULL or id 0).
    #[must_use]
    pub const fn is_null_fk(&self) -> bool {
        matches!(self, Self::Null | Self::Int(0))
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(n) => Some(*n != 0),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Referenced record id of a many-to-one value, `None` for the null sentinel.
    #[must_use]
    pub const fn fk_id(&self) -> Option<i64> {
        match self {
            Self::Int(id) if *id != 0 => Some(*id),
            _ => None,
        }
    }

    /// Record ids carried by this value, for relation values.
    ///
    /// A single id (many-to-one) yields a one-element list, the null sentinel
    /// yields an empty one.
    #[must_use]
    pub fn ids(&self) -> Vec<i64> {
        match self {
            Self::Ids(ids) => ids.clone(),
            Self::Int(id) if *id != 0 => vec![*id],
            Self::List(items) => items.iter().filter_map(Self::fk_id).collect(),
            _ => Vec::new(),
        }
    }

    /// Value equality as used by stored-field recomputation.
    ///
    /// Relation id collections compare as sets, numbers compare across
    /// integer/float representations, everything else structurally.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ids(a), Self::Ids(b)) => {
                a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
            }
            (Self::Ids(a), other) | (other, Self::Ids(a)) if other.is_null_fk() => a.is_empty(),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                match (self, other) {
                    (Self::Int(a), Self::Int(b)) => a == b,
                    _ => self.as_f64() == other.as_f64(),
                }
            }
            (Self::Null, other) | (other, Self::Null) => other.is_zero(),
            _ => self == other,
        }
    }

    /// Flatten an `In`/`NotIn` argument into its element values.
    #[must_use]
    pub fn into_elements(self) -> Vec<Self> {
        match self {
            Self::Ids(ids) => ids.into_iter().map(Self::Int).collect(),
            Self::List(items) => items,
            other => vec![other],
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Self::Ids(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

///
/// FieldMap
///
/// Field name (or json name, or dotted path) to value.
/// Ordered so generated SQL and iteration are deterministic.
///

#[derive(
    Clone, Debug, Default, Deref, DerefMut, Deserialize, IntoIterator, PartialEq, Serialize,
)]
#[into_iterator(owned, ref)]
pub struct FieldMap(BTreeMap<String, Value>);

impl FieldMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Owned list of keys in map order.
    #[must_use]
    pub fn key_list(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

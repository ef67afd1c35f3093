/// Tri-state field presence for partially supplied records
///
/// A record coming from a caller may omit a field (keep whatever is stored),
/// send it as `null` (clear it) or carry a value. `Option` alone cannot tell
/// the first two apart.
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Field<T> {
    /// Not supplied; an update keeps the stored value
    #[default]
    Unset,
    /// Explicitly cleared
    Null,
    Value(T),
}

impl<T> Field<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Field::Unset)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Keep `self` unless it is unset, in which case take `stored`
    pub fn or_stored(self, stored: Field<T>) -> Field<T> {
        match self {
            Field::Unset => stored,
            other => other,
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Value(v),
            None => Field::Null,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(v) => serializer.serialize_some(v),
            _ => serializer.serialize_none(),
        }
    }
}

// A missing key never reaches this impl; `#[serde(default)]` yields `Unset`.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<T>::deserialize(deserializer)?.into())
    }
}

//! Typed attribute values attached to plugs, slots and connections.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value.
///
/// Package authors supply scalar, sequence or mapping values; anything else
/// is rejected by the manifest loader before it reaches this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::String(_) => "string",
            AttrValue::List(_) => "list",
            AttrValue::Map(_) => "map",
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Int(n)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(items: Vec<T>) -> Self {
        AttrValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(n) => write!(f, "{n}"),
            AttrValue::String(s) => write!(f, "{s:?}"),
            AttrValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            AttrValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// An open mapping from attribute name to value.
///
/// Accessors fail with [`Error::InvalidDeclaration`] when the stored value
/// has the wrong type; a missing key is `Ok(None)` so callers decide whether
/// the attribute is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, AttrValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(AttrValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(type_mismatch(key, "string", other)),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(AttrValue::Int(n)) => Ok(Some(*n)),
            Some(other) => Err(type_mismatch(key, "int", other)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(AttrValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(type_mismatch(key, "bool", other)),
        }
    }

    pub fn get_list(&self, key: &str) -> Result<Option<&[AttrValue]>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(AttrValue::List(items)) => Ok(Some(items)),
            Some(other) => Err(type_mismatch(key, "list", other)),
        }
    }

    pub fn get_map(&self, key: &str) -> Result<Option<&BTreeMap<String, AttrValue>>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(AttrValue::Map(map)) => Ok(Some(map)),
            Some(other) => Err(type_mismatch(key, "map", other)),
        }
    }

    /// Like [`Attributes::get_str`], but a missing key is an error.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)?
            .ok_or_else(|| Error::InvalidDeclaration(format!("missing attribute {key:?}")))
    }
}

impl FromIterator<(String, AttrValue)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn type_mismatch(key: &str, expected: &str, found: &AttrValue) -> Error {
    Error::InvalidDeclaration(format!(
        "attribute {key:?} must be a {expected}, found {} {found}",
        found.type_name()
    ))
}

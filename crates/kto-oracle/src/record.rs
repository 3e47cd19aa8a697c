#![forbid(unsafe_code)]

use kto_dtype::Value;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Argument name → value, in kernel declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgMap {
    entries: Vec<(String, Value)>,
}

impl ArgMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `name`, or replaces its value in place if already present.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ArgMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct ArgMapVisitor;

impl<'de> Visitor<'de> for ArgMapVisitor {
    type Value = ArgMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of argument names to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ArgMap, A::Error> {
        let mut args = ArgMap::new();
        while let Some((name, value)) = access.next_entry::<String, Value>()? {
            args.insert(name, value);
        }
        Ok(args)
    }
}

impl<'de> Deserialize<'de> for ArgMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ArgMapVisitor)
    }
}

/// One backend-agnostic test case.
///
/// `inargs` holds every argument; outputs appear there as placeholder
/// buffers. `outargs` holds the expected outputs and is present only when
/// the call succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub inargs: ArgMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outargs: Option<ArgMap>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestCase {
    /// Values of argument `name` in `inargs` and, when present, `outargs`.
    pub fn values_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.inargs
            .get(name)
            .into_iter()
            .chain(self.outargs.as_ref().and_then(|out| out.get(name)))
    }
}

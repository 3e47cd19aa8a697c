#![forbid(unsafe_code)]

use crate::error::GenerationError;
use kto_dtype::Value;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Corpus key holding the generic values bound to default-role arguments.
pub const GENERIC_FIXTURE_KEY: &str = "num";

/// One entry of the fixture corpus.
#[derive(Debug, Clone, PartialEq)]
pub enum FixtureEntry {
    /// Flat values, as under [`GENERIC_FIXTURE_KEY`].
    Values(Vec<Value>),
    /// Instances of a role group, each mapping `group-suffix` keys to values.
    Instances(Vec<BTreeMap<String, Value>>),
}

impl FixtureEntry {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Values(values) => values.len(),
            Self::Instances(instances) => instances.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named input values used to populate kernel arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureCorpus {
    entries: BTreeMap<String, FixtureEntry>,
}

impl FixtureCorpus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: FixtureEntry) {
        self.entries.insert(key.into(), entry);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FixtureEntry> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Values bound to default-role inputs, if the corpus carries any.
    pub fn generic_values(&self) -> Result<Option<&[Value]>, GenerationError> {
        match self.entries.get(GENERIC_FIXTURE_KEY) {
            None => Ok(None),
            Some(FixtureEntry::Values(values)) => Ok(Some(values)),
            Some(FixtureEntry::Instances(instances)) if instances.is_empty() => Ok(Some(&[][..])),
            Some(FixtureEntry::Instances(_)) => Err(GenerationError::MalformedFixture {
                key: GENERIC_FIXTURE_KEY.to_string(),
                detail: "expected a flat list of values".to_string(),
            }),
        }
    }

    /// Finds the corpus key for role group `group`: the exact key first, then
    /// the key with one trailing `s` removed.
    #[must_use]
    pub fn resolve_group(&self, group: &str) -> Option<&str> {
        if let Some((key, _)) = self.entries.get_key_value(group) {
            return Some(key.as_str());
        }
        let singular = group.strip_suffix('s')?;
        self.entries
            .get_key_value(singular)
            .map(|(key, _)| key.as_str())
    }

    /// Instances of the role group `group`, with the key they were found
    /// under.
    pub fn group_instances(
        &self,
        group: &str,
    ) -> Option<Result<(&str, &[BTreeMap<String, Value>]), GenerationError>> {
        let key = self.resolve_group(group)?;
        let entry = self.entries.get(key)?;
        Some(match entry {
            FixtureEntry::Instances(instances) => Ok((key, instances.as_slice())),
            FixtureEntry::Values(values) if values.is_empty() => Ok((key, &[][..])),
            FixtureEntry::Values(_) => Err(GenerationError::MalformedFixture {
                key: key.to_string(),
                detail: "expected a list of group instances".to_string(),
            }),
        })
    }

    /// Builds a corpus from the raw `tests` object of a fixture document.
    ///
    /// A list whose elements are all objects is a list of group instances;
    /// anything else is a list of values.
    pub fn from_raw(
        raw: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, GenerationError> {
        let mut corpus = Self::new();
        for (key, value) in raw {
            let serde_json::Value::Array(items) = value else {
                return Err(GenerationError::MalformedFixture {
                    key: key.clone(),
                    detail: "expected a list".to_string(),
                });
            };
            let malformed = |err: serde_json::Error| GenerationError::MalformedFixture {
                key: key.clone(),
                detail: err.to_string(),
            };
            let entry = if !items.is_empty() && items.iter().all(serde_json::Value::is_object) {
                FixtureEntry::Instances(
                    serde_json::from_value(value.clone()).map_err(malformed)?,
                )
            } else {
                FixtureEntry::Values(serde_json::from_value(value.clone()).map_err(malformed)?)
            };
            corpus.insert(key.clone(), entry);
        }
        Ok(corpus)
    }
}

/// Hand-written cases for one templatized kernel.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitFixture {
    pub name: String,
    /// Whether the kernel is implemented on the backends; suites with
    /// `false` are emitted but marked for skipping.
    #[serde(default = "default_true")]
    pub status: bool,
    pub tests: Vec<UnitFixtureCase>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitFixtureCase {
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFixtureDocument {
    #[serde(default)]
    tests: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "unit-tests", default)]
    unit_tests: Vec<UnitFixture>,
}

/// Parsed fixture document: the generation corpus plus hand-written suites.
#[derive(Debug, Clone, Default)]
pub struct FixtureDocument {
    pub corpus: FixtureCorpus,
    pub unit_tests: Vec<UnitFixture>,
}

impl FixtureDocument {
    #[must_use]
    pub fn unit_fixture(&self, kernel: &str) -> Option<&UnitFixture> {
        self.unit_tests.iter().find(|fixture| fixture.name == kernel)
    }
}

fn default_true() -> bool {
    true
}

pub fn parse_fixture_document(raw: &str) -> Result<FixtureDocument, String> {
    let raw: RawFixtureDocument =
        serde_json::from_str(raw).map_err(|err| format!("invalid fixture json: {err}"))?;
    let corpus = FixtureCorpus::from_raw(&raw.tests).map_err(|err| err.to_string())?;
    Ok(FixtureDocument {
        corpus,
        unit_tests: raw.unit_tests,
    })
}

pub fn load_fixture_document(path: &Path) -> Result<FixtureDocument, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed reading {}: {err}", path.display()))?;
    parse_fixture_document(&raw).map_err(|err| format!("{}: {err}", path.display()))
}

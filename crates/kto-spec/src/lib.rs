#![forbid(unsafe_code)]

pub mod call;

pub use call::{
    Binding, KernelArgs, KernelError, KernelRegistry, MAX_WRITE_INDEX, ReferenceFn, SparseWriteLog,
};

use kto_dtype::{TypeName, TypeParseError};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

/// Role tag meaning "not grouped with any other argument".
pub const DEFAULT_ROLE: &str = "default";
/// Separator between the group and the suffix of a role tag.
pub const ROLE_DELIMITER: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// Grouping tag of an argument. Arguments sharing a group are bound from the
/// same fixture instance and never varied against each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Default,
    Grouped { group: String, suffix: String },
}

impl Role {
    /// Parses `default`, or a `group-suffix` tag split at the first `-`.
    pub fn parse(tag: &str) -> Result<Self, SpecError> {
        let tag = tag.trim();
        if tag.is_empty() || tag == DEFAULT_ROLE {
            return Ok(Self::Default);
        }
        match tag.split_once(ROLE_DELIMITER) {
            Some((group, suffix)) if !group.is_empty() && !suffix.is_empty() => {
                Ok(Self::Grouped {
                    group: group.to_string(),
                    suffix: suffix.to_string(),
                })
            }
            _ => Err(SpecError::MalformedRole {
                role: tag.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Grouped { group, .. } => Some(group),
        }
    }

    #[must_use]
    pub const fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str(DEFAULT_ROLE),
            Self::Grouped { group, suffix } => write!(f, "{group}{ROLE_DELIMITER}{suffix}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    MalformedRole { role: String },
    Type { argument: String, source: TypeParseError },
    DuplicateArgument { kernel: String, argument: String },
    EmptySpecializations { kernel: String },
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRole { role } => {
                write!(f, "role tag '{role}' is neither 'default' nor 'group-suffix'")
            }
            Self::Type { argument, source } => {
                write!(f, "argument '{argument}' has an invalid type: {source}")
            }
            Self::DuplicateArgument { kernel, argument } => {
                write!(f, "kernel '{kernel}' declares argument '{argument}' twice")
            }
            Self::EmptySpecializations { kernel } => {
                write!(f, "kernel '{kernel}' declares no specializations")
            }
        }
    }
}

impl std::error::Error for SpecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Type { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// One kernel argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub type_name: TypeName,
    pub direction: Direction,
    pub role: Role,
}

impl Argument {
    pub fn from_decl(decl: &ArgDecl) -> Result<Self, SpecError> {
        let type_name = TypeName::parse(&decl.type_name).map_err(|source| SpecError::Type {
            argument: decl.name.clone(),
            source,
        })?;
        let role = match decl.role.as_deref() {
            Some(tag) => Role::parse(tag)?,
            None => Role::Default,
        };
        Ok(Self {
            name: decl.name.clone(),
            type_name,
            direction: decl.dir,
            role,
        })
    }

    #[must_use]
    pub fn is_output(&self) -> bool {
        self.direction == Direction::Out
    }

    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        self.type_name.kind.is_unsigned()
    }
}

/// Fully typed signature of one specialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSignature {
    /// Name of the kernel group the specialization belongs to.
    pub templatized_name: String,
    pub name: String,
    pub args: Vec<Argument>,
}

impl KernelSignature {
    pub fn from_decl(templatized_name: &str, decl: &SpecializationDecl) -> Result<Self, SpecError> {
        let mut seen = BTreeSet::new();
        let mut args = Vec::with_capacity(decl.args.len());
        for arg in &decl.args {
            if !seen.insert(arg.name.as_str()) {
                return Err(SpecError::DuplicateArgument {
                    kernel: decl.name.clone(),
                    argument: arg.name.clone(),
                });
            }
            args.push(Argument::from_decl(arg)?);
        }
        Ok(Self {
            templatized_name: templatized_name.to_string(),
            name: decl.name.clone(),
            args,
        })
    }

    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.args.iter().find(|arg| arg.name == name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecificationDocument {
    pub kernels: Vec<KernelDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KernelDecl {
    pub name: String,
    #[serde(rename = "automatic-tests")]
    pub automatic_tests: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub specializations: Vec<SpecializationDecl>,
}

impl KernelDecl {
    /// Blacklisted kernels keep their explicit tests but get no generated ones.
    #[must_use]
    pub fn is_blacklisted(&self) -> bool {
        !self.enabled || !self.automatic_tests
    }

    pub fn signatures(&self) -> Result<Vec<KernelSignature>, SpecError> {
        if self.specializations.is_empty() {
            return Err(SpecError::EmptySpecializations {
                kernel: self.name.clone(),
            });
        }
        self.specializations
            .iter()
            .map(|spec| KernelSignature::from_decl(&self.name, spec))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecializationDecl {
    pub name: String,
    pub args: Vec<ArgDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArgDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub dir: Direction,
    #[serde(default)]
    pub role: Option<String>,
}

fn default_true() -> bool {
    true
}

pub fn parse_specification(raw: &str) -> Result<SpecificationDocument, String> {
    serde_json::from_str(raw).map_err(|err| format!("invalid kernel specification json: {err}"))
}

pub fn load_specification(path: &Path) -> Result<SpecificationDocument, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed reading {}: {err}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|err| format!("invalid kernel specification json {}: {err}", path.display()))
}

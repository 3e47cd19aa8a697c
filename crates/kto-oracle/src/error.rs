#![forbid(unsafe_code)]

use kto_spec::SpecError;
use std::fmt;

/// Fatal conditions that abort test generation for a kernel.
///
/// Domain errors raised by a reference kernel and validation rejections are
/// not represented here: they are recorded as error-path test cases or
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    Spec {
        kernel: String,
        source: SpecError,
    },
    MissingFixture {
        kernel: String,
        group: String,
    },
    MalformedFixture {
        key: String,
        detail: String,
    },
    MissingRoleValue {
        kernel: String,
        argument: String,
        key: String,
        instance: usize,
    },
    UnknownArgument {
        kernel: String,
        argument: String,
    },
    ReferenceFault {
        kernel: String,
        detail: String,
    },
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spec { kernel, source } => {
                write!(f, "kernel '{kernel}' specification error: {source}")
            }
            Self::MissingFixture { kernel, group } => {
                write!(
                    f,
                    "kernel '{kernel}' needs fixture group '{group}' which the corpus does not provide"
                )
            }
            Self::MalformedFixture { key, detail } => {
                write!(f, "fixture entry '{key}' is malformed: {detail}")
            }
            Self::MissingRoleValue {
                kernel,
                argument,
                key,
                instance,
            } => write!(
                f,
                "kernel '{kernel}' argument '{argument}': fixture instance {instance} has no '{key}'"
            ),
            Self::UnknownArgument { kernel, argument } => {
                write!(f, "kernel '{kernel}' has no argument named '{argument}'")
            }
            Self::ReferenceFault { kernel, detail } => {
                write!(f, "reference implementation of '{kernel}' failed: {detail}")
            }
        }
    }
}

impl std::error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spec { source, .. } => Some(source),
            _ => None,
        }
    }
}

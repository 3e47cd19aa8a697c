#![forbid(unsafe_code)]

use crate::record::TestCase;
use kto_dtype::{TypeName, Value};
use kto_spec::{Argument, Binding, KernelArgs, KernelSignature};
use serde::Serialize;

/// Why a candidate test case was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    Type,
    Overflow,
    Range,
}

/// Declared type of `arg` as materialized in a test case. Outputs are always
/// buffers, so a scalar output is checked as a one-level sequence.
#[must_use]
pub fn materialized_type(arg: &Argument) -> TypeName {
    let mut type_name = arg.type_name.clone();
    if arg.is_output() && type_name.depth == 0 {
        type_name.depth = 1;
    }
    type_name
}

/// Every argument is present and every recorded value conforms to its
/// declared type. Non-finite floats never conform.
#[must_use]
pub fn type_validates(signature: &KernelSignature, case: &TestCase) -> bool {
    signature.args.iter().all(|arg| {
        let type_name = materialized_type(arg);
        case.inargs.get(&arg.name).is_some()
            && case
                .values_of(&arg.name)
                .all(|value| type_name.conforms(value) && value.is_finite())
    })
}

/// Bound inputs already conform to their declared types. Combinations that
/// fail here are rejected before the reference kernel runs.
#[must_use]
pub fn inputs_conform(signature: &KernelSignature, bound: &KernelArgs) -> bool {
    signature
        .args
        .iter()
        .filter(|arg| !arg.is_output())
        .all(|arg| match bound.binding(&arg.name) {
            Some(Binding::Input(value)) => materialized_type(arg).conforms(value),
            _ => false,
        })
}

/// No unsigned argument carries a negative scalar.
#[must_use]
pub fn overflow_validates(signature: &KernelSignature, case: &TestCase) -> bool {
    signature
        .args
        .iter()
        .filter(|arg| arg.is_unsigned())
        .all(|arg| {
            case.values_of(&arg.name)
                .all(|value| value.scalars().iter().all(|scalar| !scalar.is_negative()))
        })
}

/// Integer scalars fit their declared kind. Error-path cases always pass.
#[must_use]
pub fn range_validates(signature: &KernelSignature, case: &TestCase) -> bool {
    if !case.success {
        return true;
    }
    signature.args.iter().all(|arg| {
        let Some((min, max)) = arg.type_name.kind.bounds() else {
            return true;
        };
        case.values_of(&arg.name).all(|value| {
            value.scalars().iter().all(|scalar| match scalar {
                Value::Int(v) => (min..=max).contains(v),
                _ => true,
            })
        })
    })
}

/// Filters applied to reference-generated cases.
pub fn validate_generated(
    signature: &KernelSignature,
    case: &TestCase,
    enforce_int_range: bool,
) -> Result<(), Rejection> {
    if !type_validates(signature, case) {
        return Err(Rejection::Type);
    }
    if !overflow_validates(signature, case) {
        return Err(Rejection::Overflow);
    }
    if enforce_int_range && !range_validates(signature, case) {
        return Err(Rejection::Range);
    }
    Ok(())
}

/// Filters applied to hand-written cases.
pub fn validate_explicit(signature: &KernelSignature, case: &TestCase) -> Result<(), Rejection> {
    if !overflow_validates(signature, case) {
        return Err(Rejection::Overflow);
    }
    if !range_validates(signature, case) {
        return Err(Rejection::Range);
    }
    Ok(())
}

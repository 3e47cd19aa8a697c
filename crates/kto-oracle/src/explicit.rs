#![forbid(unsafe_code)]

use crate::error::GenerationError;
use crate::fixtures::{UnitFixture, UnitFixtureCase};
use crate::record::{ArgMap, TestCase};
use crate::validate::validate_explicit;
use kto_dtype::Value;
use kto_spec::KernelSignature;

/// Hand-written test cases for one specialization.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitTestSuite {
    pub kernel: String,
    pub templatized_kernel: String,
    /// `false` when the kernel is not implemented on the backends yet;
    /// renderers emit the cases but mark them skipped.
    pub implemented: bool,
    pub cases: Vec<TestCase>,
    pub dropped: usize,
}

/// Maps every record of `fixture` onto `signature`, dropping records that
/// fail overflow or range validation.
pub fn build_unit_suite(
    signature: &KernelSignature,
    fixture: &UnitFixture,
) -> Result<UnitTestSuite, GenerationError> {
    let mut cases = Vec::with_capacity(fixture.tests.len());
    let mut dropped = 0;
    for record in &fixture.tests {
        let case = unit_case(signature, record)?;
        if validate_explicit(signature, &case).is_ok() {
            cases.push(case);
        } else {
            dropped += 1;
        }
    }
    Ok(UnitTestSuite {
        kernel: signature.name.clone(),
        templatized_kernel: signature.templatized_name.clone(),
        implemented: fixture.status,
        cases,
        dropped,
    })
}

fn unit_case(
    signature: &KernelSignature,
    record: &UnitFixtureCase,
) -> Result<TestCase, GenerationError> {
    if let Some(unknown) = record
        .inputs
        .keys()
        .chain(record.outputs.keys())
        .find(|name| signature.argument(name).is_none())
    {
        return Err(GenerationError::UnknownArgument {
            kernel: signature.name.clone(),
            argument: unknown.clone(),
        });
    }

    let mut inargs = ArgMap::new();
    let mut outargs = ArgMap::new();
    for arg in &signature.args {
        if arg.is_output() {
            if let Some(expected) = record.outputs.get(&arg.name) {
                let len = expected.as_list().map_or(1, <[Value]>::len);
                inargs.insert(&arg.name, arg.type_name.dummy_buffer(len));
                outargs.insert(&arg.name, expected.clone());
            }
        }
        // A value listed under both inputs and outputs is bound from inputs.
        if let Some(value) = record.inputs.get(&arg.name) {
            inargs.insert(&arg.name, value.clone());
        }
    }
    Ok(TestCase {
        inargs,
        outargs: (!record.error).then_some(outargs),
        success: !record.error,
        message: record.message.clone().filter(|message| !message.is_empty()),
    })
}

#![forbid(unsafe_code)]

use crate::error::GenerationError;
use crate::record::{ArgMap, TestCase};
use kto_dtype::Value;
use kto_spec::{Binding, KernelArgs, KernelError, KernelSignature, ReferenceFn};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Outcome of running a reference kernel on one bound argument set.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Completed(TestCase),
    DomainError { case: TestCase, message: String },
}

impl Execution {
    #[must_use]
    pub fn case(&self) -> &TestCase {
        match self {
            Self::Completed(case) | Self::DomainError { case, .. } => case,
        }
    }

    #[must_use]
    pub fn into_case(self) -> TestCase {
        match self {
            Self::Completed(case) | Self::DomainError { case, .. } => case,
        }
    }
}

/// Runs `reference` on a private copy of `bound` and records the result.
///
/// Kernel faults and panics abort generation for the kernel.
pub fn execute(
    signature: &KernelSignature,
    reference: &ReferenceFn,
    bound: &KernelArgs,
) -> Result<Execution, GenerationError> {
    let mut call = bound.clone();
    let outcome = catch_unwind(AssertUnwindSafe(|| reference(&mut call)));
    match outcome {
        Ok(Ok(())) => record_success(signature, &call).map(Execution::Completed),
        Ok(Err(KernelError::Domain(message))) => Ok(Execution::DomainError {
            case: record_failure(signature, bound, &call)?,
            message,
        }),
        Ok(Err(KernelError::Fault(detail))) => Err(reference_fault(signature, detail)),
        Err(payload) => Err(reference_fault(
            signature,
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn record_success(signature: &KernelSignature, call: &KernelArgs) -> Result<TestCase, GenerationError> {
    let mut inargs = ArgMap::new();
    let mut outargs = ArgMap::new();
    for arg in &signature.args {
        match call.binding(&arg.name) {
            Some(Binding::Input(value)) => inargs.insert(&arg.name, value.clone()),
            Some(Binding::Output(log)) => {
                let dense = log.densify(&arg.type_name.placeholder());
                inargs.insert(&arg.name, arg.type_name.dummy_buffer(dense.len()));
                outargs.insert(&arg.name, Value::List(dense));
            }
            None => return Err(unknown_argument(signature, &arg.name)),
        }
    }
    Ok(TestCase {
        inargs,
        outargs: Some(outargs),
        success: true,
        message: None,
    })
}

/// Inputs come from `bound`, untouched by the failed call. Each output gets
/// a placeholder buffer as long as the accumulator, and never shorter than
/// one element.
fn record_failure(
    signature: &KernelSignature,
    bound: &KernelArgs,
    call: &KernelArgs,
) -> Result<TestCase, GenerationError> {
    let mut inargs = ArgMap::new();
    for arg in &signature.args {
        match (bound.binding(&arg.name), call.binding(&arg.name)) {
            (Some(Binding::Input(value)), _) => inargs.insert(&arg.name, value.clone()),
            (Some(Binding::Output(_)), Some(Binding::Output(log))) => {
                inargs.insert(&arg.name, arg.type_name.dummy_buffer(log.len().max(1)));
            }
            _ => return Err(unknown_argument(signature, &arg.name)),
        }
    }
    Ok(TestCase {
        inargs,
        outargs: None,
        success: false,
        message: None,
    })
}

fn unknown_argument(signature: &KernelSignature, name: &str) -> GenerationError {
    GenerationError::UnknownArgument {
        kernel: signature.name.clone(),
        argument: name.to_string(),
    }
}

fn reference_fault(signature: &KernelSignature, detail: String) -> GenerationError {
    GenerationError::ReferenceFault {
        kernel: signature.name.clone(),
        detail,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{Execution, execute};
    use crate::error::GenerationError;
    use kto_dtype::Value;
    use kto_spec::{KernelArgs, KernelError, KernelSignature, ReferenceFn, parse_specification};
    use std::sync::Arc;

    fn signature() -> KernelSignature {
        let doc = parse_specification(
            r#"{"kernels": [{"name": "scatter", "automatic-tests": true, "specializations": [
                {"name": "scatter_64", "args": [
                    {"name": "out", "type": "List[int64_t]", "dir": "out"},
                    {"name": "x", "type": "List[int64_t]", "dir": "in"}
                ]}
            ]}]}"#,
        )
        .expect("declaration should parse");
        doc.kernels[0].signatures().expect("signature").remove(0)
    }

    fn reference(
        kernel: impl Fn(&mut KernelArgs) -> Result<(), KernelError> + Send + Sync + 'static,
    ) -> ReferenceFn {
        Arc::new(kernel)
    }

    fn bound(x: Value) -> KernelArgs {
        let mut args = KernelArgs::new();
        args.bind_output("out");
        args.bind_input("x", x);
        args
    }

    #[test]
    fn success_densifies_outputs_and_keeps_mutated_inputs() {
        let reference = reference(|args: &mut KernelArgs| {
            args.write("out", 2, Value::Int(5))?;
            args.write("out", 0, Value::Int(1))?;
            *args.input_mut("x")? = Value::ints(&[9]);
            Ok(())
        });
        let execution = execute(&signature(), &reference, &bound(Value::ints(&[1]))).expect("runs");
        let Execution::Completed(case) = execution else {
            panic!("expected a completed execution");
        };
        assert!(case.success);
        assert_eq!(
            case.inargs.get("out"),
            Some(&Value::ints(&[123, 123, 123]))
        );
        assert_eq!(case.inargs.get("x"), Some(&Value::ints(&[9])));
        let outargs = case.outargs.expect("success carries outputs");
        assert_eq!(outargs.get("out"), Some(&Value::ints(&[1, 123, 5])));
        assert_eq!(case.inargs.names().collect::<Vec<_>>(), vec!["out", "x"]);
    }

    #[test]
    fn domain_error_without_writes_records_single_placeholder() {
        let reference = reference(|args: &mut KernelArgs| {
            *args.input_mut("x")? = Value::ints(&[0]);
            Err(KernelError::domain("bad input"))
        });
        let execution = execute(&signature(), &reference, &bound(Value::ints(&[4]))).expect("runs");
        let Execution::DomainError { case, message } = execution else {
            panic!("expected a domain error");
        };
        assert_eq!(message, "bad input");
        assert!(!case.success);
        assert!(case.outargs.is_none());
        assert_eq!(case.inargs.get("out"), Some(&Value::ints(&[123])));
        assert_eq!(case.inargs.get("x"), Some(&Value::ints(&[4])));
    }

    #[test]
    fn domain_error_after_writes_sizes_buffer_by_accumulator() {
        let reference = reference(|args: &mut KernelArgs| {
            args.write("out", 0, Value::Int(1))?;
            args.write("out", 1, Value::Int(2))?;
            Err(KernelError::domain("stop"))
        });
        let execution = execute(&signature(), &reference, &bound(Value::ints(&[4]))).expect("runs");
        assert_eq!(execution.case().inargs.get("out"), Some(&Value::ints(&[123, 123])));
    }

    #[test]
    fn faults_and_panics_abort() {
        let fault = reference(|args: &mut KernelArgs| args.int_at("x", 10).map(|_| ()));
        assert!(matches!(
            execute(&signature(), &fault, &bound(Value::ints(&[1]))),
            Err(GenerationError::ReferenceFault { .. })
        ));

        let panicking = reference(|_args: &mut KernelArgs| panic!("kernel bug"));
        let err = execute(&signature(), &panicking, &bound(Value::ints(&[1])))
            .expect_err("panic becomes a fault");
        assert!(err.to_string().contains("kernel bug"));
    }

    #[test]
    fn out_of_bounds_write_index_is_a_fault() {
        let scatter = reference(|args: &mut KernelArgs| {
            let index = args.int_at("x", 0)?;
            args.write("out", index, Value::Int(1))
        });
        let huge = Value::List(vec![Value::Int(i128::from(u64::MAX))]);
        assert!(matches!(
            execute(&signature(), &scatter, &bound(huge)),
            Err(GenerationError::ReferenceFault { .. })
        ));
    }

    #[test]
    fn each_call_gets_its_own_copy() {
        let reference = reference(|args: &mut KernelArgs| {
            args.write("out", 0, Value::Int(7))?;
            Ok(())
        });
        let shared = bound(Value::ints(&[1]));
        execute(&signature(), &reference, &shared).expect("first call");
        let second = execute(&signature(), &reference, &shared).expect("second call");
        assert_eq!(
            second.into_case().outargs.and_then(|out| out.get("out").cloned()),
            Some(Value::ints(&[7]))
        );
        assert!(matches!(
            shared.binding("out"),
            Some(kto_spec::Binding::Output(log)) if log.is_empty()
        ));
    }
}

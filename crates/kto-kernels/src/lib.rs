#![forbid(unsafe_code)]

//! Reference implementations for the bundled kernel declarations.
//!
//! Every kernel reads its inputs by name, writes outputs positionally and
//! reports precondition violations as [`KernelError::Domain`].

use kto_dtype::Value;
use kto_spec::{KernelArgs, KernelError, KernelRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKernel {
    AddOne,
    CheckedDiv,
    LocalIndex,
    ListArrayNum,
    ListOffsetArrayCounts,
    IndexCarry,
    NumpyArrayScale,
}

impl ReferenceKernel {
    pub const ALL: [Self; 7] = [
        Self::AddOne,
        Self::CheckedDiv,
        Self::LocalIndex,
        Self::ListArrayNum,
        Self::ListOffsetArrayCounts,
        Self::IndexCarry,
        Self::NumpyArrayScale,
    ];

    /// Templatized kernel name this implementation is registered under.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AddOne => "add_one",
            Self::CheckedDiv => "checked_div",
            Self::LocalIndex => "localindex",
            Self::ListArrayNum => "ListArray_num",
            Self::ListOffsetArrayCounts => "ListOffsetArray_counts",
            Self::IndexCarry => "Index_carry",
            Self::NumpyArrayScale => "NumpyArray_scale",
        }
    }

    pub fn run(self, args: &mut KernelArgs) -> Result<(), KernelError> {
        match self {
            Self::AddOne => add_one(args),
            Self::CheckedDiv => checked_div(args),
            Self::LocalIndex => localindex(args),
            Self::ListArrayNum => listarray_num(args),
            Self::ListOffsetArrayCounts => listoffsetarray_counts(args),
            Self::IndexCarry => index_carry(args),
            Self::NumpyArrayScale => numpyarray_scale(args),
        }
    }
}

/// Registry holding every [`ReferenceKernel`].
#[must_use]
pub fn builtin_registry() -> KernelRegistry {
    let mut registry = KernelRegistry::new();
    for kernel in ReferenceKernel::ALL {
        registry.register(kernel.name(), move |args: &mut KernelArgs| kernel.run(args));
    }
    registry
}

fn add_one(args: &mut KernelArgs) -> Result<(), KernelError> {
    let x = args.int("x")?;
    args.write("y", 0, Value::Int(x + 1))
}

/// Floor division, as the integer kernels define it.
fn checked_div(args: &mut KernelArgs) -> Result<(), KernelError> {
    let x = args.int("x")?;
    let y = args.int("y")?;
    if y == 0 {
        return Err(KernelError::domain("division by zero"));
    }
    let quotient = x
        .checked_div(y)
        .ok_or_else(|| KernelError::fault(format!("{x} / {y} overflows")))?;
    let floored = if (x % y != 0) && ((x < 0) != (y < 0)) {
        quotient - 1
    } else {
        quotient
    };
    args.write("z", 0, Value::Int(floored))
}

fn localindex(args: &mut KernelArgs) -> Result<(), KernelError> {
    let length = args.int("length")?;
    for i in 0..length {
        args.write("toindex", i, Value::Int(i))?;
    }
    Ok(())
}

fn listarray_num(args: &mut KernelArgs) -> Result<(), KernelError> {
    let length = args.int("length")?;
    for i in 0..length {
        let start = args.int_at("fromstarts", i)?;
        let stop = args.int_at("fromstops", i)?;
        if stop < start {
            return Err(KernelError::domain("stops[i] < starts[i]"));
        }
        args.write("tonum", i, Value::Int(stop - start))?;
    }
    Ok(())
}

fn listoffsetarray_counts(args: &mut KernelArgs) -> Result<(), KernelError> {
    let length = args.int("length")?;
    for i in 0..length {
        let start = args.int_at("fromoffsets", i)?;
        let stop = args.int_at("fromoffsets", i + 1)?;
        if stop < start {
            return Err(KernelError::domain("offsets must be monotonically increasing"));
        }
        args.write("tocounts", i, Value::Int(stop - start))?;
    }
    Ok(())
}

fn index_carry(args: &mut KernelArgs) -> Result<(), KernelError> {
    let lenfromindex = args.int("lenfromindex")?;
    let length = args.int("length")?;
    for i in 0..length {
        let j = args.int_at("carry", i)?;
        if j < 0 || j >= lenfromindex {
            return Err(KernelError::domain("index out of range"));
        }
        let value = args.int_at("fromindex", j)?;
        args.write("toindex", i, Value::Int(value))?;
    }
    Ok(())
}

fn numpyarray_scale(args: &mut KernelArgs) -> Result<(), KernelError> {
    let length = args.int("length")?;
    let scale = args.float("scale")?;
    if !scale.is_finite() {
        return Err(KernelError::domain("scale must be finite"));
    }
    for i in 0..length {
        let value = args.float_at("fromptr", i)?;
        args.write("toptr", i, Value::Float(value * scale))?;
    }
    Ok(())
}

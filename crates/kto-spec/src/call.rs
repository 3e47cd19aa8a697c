//! Calling convention between the oracle and reference kernels.
//!
//! A reference kernel receives every argument by name through
//! [`KernelArgs`]: inputs as [`Value`]s, outputs as empty
//! [`SparseWriteLog`] accumulators that it fills positionally.

use kto_dtype::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Largest index a kernel may write into an output buffer.
pub const MAX_WRITE_INDEX: usize = (1 << 20) - 1;

/// Ordered log of `(index, value)` writes into an output buffer.
///
/// Later writes to an index replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseWriteLog {
    writes: Vec<(usize, Value)>,
}

impl SparseWriteLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log that writes every element of `values` at its own position.
    #[must_use]
    pub fn from_dense(values: &[Value]) -> Self {
        Self {
            writes: values.iter().cloned().enumerate().collect(),
        }
    }

    pub fn write(&mut self, index: usize, value: Value) {
        self.writes.push((index, value));
    }

    #[must_use]
    pub fn writes(&self) -> &[(usize, Value)] {
        &self.writes
    }

    /// Most recent value written at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.writes
            .iter()
            .rev()
            .find(|(written, _)| *written == index)
            .map(|(_, value)| value)
    }

    /// Number of distinct indices written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latest().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Dense sequence covering index 0 through the highest written index,
    /// with unwritten positions set to `placeholder`.
    #[must_use]
    pub fn densify(&self, placeholder: &Value) -> Vec<Value> {
        let latest = self.latest();
        let capacity = latest.keys().next_back().map_or(0, |last| last.saturating_add(1));
        let mut dense = Vec::with_capacity(capacity.min(MAX_WRITE_INDEX + 1));
        for (index, value) in latest {
            while dense.len() < index {
                dense.push(placeholder.clone());
            }
            dense.push(value.clone());
        }
        dense
    }

    fn latest(&self) -> BTreeMap<usize, &Value> {
        let mut latest = BTreeMap::new();
        for (index, value) in &self.writes {
            latest.insert(*index, value);
        }
        latest
    }
}

/// How a reference kernel can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Expected precondition violation; becomes an error-path test case.
    Domain(String),
    /// Defect in the kernel or its fixtures; aborts generation.
    Fault(String),
}

impl KernelError {
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(message.into())
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain(message) => write!(f, "domain error: {message}"),
            Self::Fault(message) => write!(f, "kernel fault: {message}"),
        }
    }
}

impl std::error::Error for KernelError {}

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Input(Value),
    Output(SparseWriteLog),
}

/// Named arguments handed to one reference-kernel invocation, in
/// declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelArgs {
    bindings: Vec<(String, Binding)>,
}

impl KernelArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_input(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.push((name.into(), Binding::Input(value)));
    }

    pub fn bind_output(&mut self, name: impl Into<String>) {
        self.bindings
            .push((name.into(), Binding::Output(SparseWriteLog::new())));
    }

    #[must_use]
    pub fn bindings(&self) -> &[(String, Binding)] {
        &self.bindings
    }

    #[must_use]
    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, binding)| binding)
    }

    pub fn input(&self, name: &str) -> Result<&Value, KernelError> {
        match self.binding(name) {
            Some(Binding::Input(value)) => Ok(value),
            Some(Binding::Output(_)) => Err(KernelError::fault(format!(
                "argument '{name}' is an output, not an input"
            ))),
            None => Err(KernelError::fault(format!("no argument named '{name}'"))),
        }
    }

    pub fn input_mut(&mut self, name: &str) -> Result<&mut Value, KernelError> {
        match self.binding_mut(name) {
            Some(Binding::Input(value)) => Ok(value),
            Some(Binding::Output(_)) => Err(KernelError::fault(format!(
                "argument '{name}' is an output, not an input"
            ))),
            None => Err(KernelError::fault(format!("no argument named '{name}'"))),
        }
    }

    pub fn output(&mut self, name: &str) -> Result<&mut SparseWriteLog, KernelError> {
        match self.binding_mut(name) {
            Some(Binding::Output(log)) => Ok(log),
            Some(Binding::Input(_)) => Err(KernelError::fault(format!(
                "argument '{name}' is an input, not an output"
            ))),
            None => Err(KernelError::fault(format!("no argument named '{name}'"))),
        }
    }

    pub fn int(&self, name: &str) -> Result<i128, KernelError> {
        self.input(name)?
            .as_int()
            .ok_or_else(|| KernelError::fault(format!("argument '{name}' is not an integer")))
    }

    pub fn float(&self, name: &str) -> Result<f64, KernelError> {
        self.input(name)?
            .as_f64()
            .ok_or_else(|| KernelError::fault(format!("argument '{name}' is not numeric")))
    }

    /// Element `index` of a sequence input. Reading past the end is a fault:
    /// kernels must check their own preconditions.
    pub fn element(&self, name: &str, index: i128) -> Result<&Value, KernelError> {
        let items = self
            .input(name)?
            .as_list()
            .ok_or_else(|| KernelError::fault(format!("argument '{name}' is not a sequence")))?;
        usize::try_from(index)
            .ok()
            .and_then(|idx| items.get(idx))
            .ok_or_else(|| {
                KernelError::fault(format!(
                    "read of '{name}'[{index}] outside its {} elements",
                    items.len()
                ))
            })
    }

    pub fn int_at(&self, name: &str, index: i128) -> Result<i128, KernelError> {
        self.element(name, index)?.as_int().ok_or_else(|| {
            KernelError::fault(format!("element '{name}'[{index}] is not an integer"))
        })
    }

    pub fn float_at(&self, name: &str, index: i128) -> Result<f64, KernelError> {
        self.element(name, index)?.as_f64().ok_or_else(|| {
            KernelError::fault(format!("element '{name}'[{index}] is not numeric"))
        })
    }

    /// Records `value` at `index` of output `name`. Indices above
    /// [`MAX_WRITE_INDEX`] are faults.
    pub fn write(&mut self, name: &str, index: i128, value: Value) -> Result<(), KernelError> {
        let slot = usize::try_from(index)
            .ok()
            .filter(|slot| *slot <= MAX_WRITE_INDEX)
            .ok_or_else(|| {
                KernelError::fault(format!("write index {index} into '{name}' out of bounds"))
            })?;
        self.output(name)?.write(slot, value);
        Ok(())
    }

    fn binding_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.bindings
            .iter_mut()
            .find(|(bound, _)| bound == name)
            .map(|(_, binding)| binding)
    }
}

/// Reference implementation of a kernel.
pub type ReferenceFn = Arc<dyn Fn(&mut KernelArgs) -> Result<(), KernelError> + Send + Sync>;

/// Reference implementations keyed by templatized kernel name.
#[derive(Clone, Default)]
pub struct KernelRegistry {
    entries: BTreeMap<String, ReferenceFn>,
}

impl KernelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, reference: F)
    where
        F: Fn(&mut KernelArgs) -> Result<(), KernelError> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(reference));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ReferenceFn> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
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

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelRegistry")
            .field("kernels", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#![forbid(unsafe_code)]

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Integer placeholder written into gaps and dummy buffers.
pub const PLACEHOLDER_INT: i128 = 123;
/// Floating-point placeholder written into gaps and dummy buffers.
pub const PLACEHOLDER_FLOAT: f64 = 123.0;
/// Deepest `List[...]` nesting a kernel argument may declare.
pub const MAX_LIST_DEPTH: u8 = 2;

/// Scalar element kinds a kernel argument can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl ScalarKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "int8_t",
            Self::I16 => "int16_t",
            Self::I32 => "int32_t",
            Self::I64 => "int64_t",
            Self::U8 => "uint8_t",
            Self::U16 => "uint16_t",
            Self::U32 => "uint32_t",
            Self::U64 => "uint64_t",
            Self::F32 => "float",
            Self::F64 => "double",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "bool" => Some(Self::Bool),
            "int8_t" | "int8" | "i8" => Some(Self::I8),
            "int16_t" | "int16" | "i16" => Some(Self::I16),
            "int32_t" | "int32" | "i32" => Some(Self::I32),
            "int64_t" | "int64" | "i64" => Some(Self::I64),
            "uint8_t" | "uint8" | "u8" => Some(Self::U8),
            "uint16_t" | "uint16" | "u16" => Some(Self::U16),
            "uint32_t" | "uint32" | "u32" => Some(Self::U32),
            "uint64_t" | "uint64" | "u64" => Some(Self::U64),
            "float" | "float32" | "f32" => Some(Self::F32),
            "double" | "float64" | "f64" => Some(Self::F64),
            _ => None,
        }
    }

    /// Returns `true` for signed and unsigned integers (not Bool).
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::I8
                | Self::I16
                | Self::I32
                | Self::I64
                | Self::U8
                | Self::U16
                | Self::U32
                | Self::U64
        )
    }

    #[must_use]
    pub const fn is_unsigned(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::I8 | Self::U8 => 8,
            Self::I16 | Self::U16 => 16,
            Self::I32 | Self::U32 | Self::F32 => 32,
            Self::I64 | Self::U64 | Self::F64 => 64,
        }
    }

    /// Inclusive `(min, max)` for integer kinds, `None` otherwise.
    #[must_use]
    pub const fn bounds(self) -> Option<(i128, i128)> {
        match self {
            Self::I8 => Some((i8::MIN as i128, i8::MAX as i128)),
            Self::I16 => Some((i16::MIN as i128, i16::MAX as i128)),
            Self::I32 => Some((i32::MIN as i128, i32::MAX as i128)),
            Self::I64 => Some((i64::MIN as i128, i64::MAX as i128)),
            Self::U8 => Some((0, u8::MAX as i128)),
            Self::U16 => Some((0, u16::MAX as i128)),
            Self::U32 => Some((0, u32::MAX as i128)),
            Self::U64 => Some((0, u64::MAX as i128)),
            Self::Bool | Self::F32 | Self::F64 => None,
        }
    }

    /// Scalar name as used by C-level bindings.
    #[must_use]
    pub const fn c_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::U32 => "uint32",
            Self::U64 => "uint64",
            Self::F32 => "float",
            Self::F64 => "double",
        }
    }

    /// Array-library dtype name (`bool_`, `float32`, ...).
    #[must_use]
    pub const fn array_dtype_name(self) -> &'static str {
        match self {
            Self::Bool => "bool_",
            Self::F32 => "float32",
            Self::F64 => "float64",
            other => other.c_name(),
        }
    }

    /// Canonical placeholder for this kind.
    #[must_use]
    pub fn placeholder(self) -> Value {
        if self.is_float() {
            Value::Float(PLACEHOLDER_FLOAT)
        } else if matches!(self, Self::Bool) {
            Value::Bool(true)
        } else {
            Value::Int(PLACEHOLDER_INT)
        }
    }

    /// Whether a scalar value belongs to this kind's family.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match value {
            Value::Bool(_) => matches!(self, Self::Bool),
            Value::Int(_) => self.is_integer(),
            Value::Float(_) => self.is_float(),
            Value::List(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeParseError {
    Empty,
    Unbalanced { descriptor: String },
    UnknownScalar { descriptor: String, scalar: String },
    NestingTooDeep { descriptor: String, depth: u8 },
}

impl fmt::Display for TypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty type descriptor"),
            Self::Unbalanced { descriptor } => {
                write!(f, "unbalanced brackets in type descriptor '{descriptor}'")
            }
            Self::UnknownScalar { descriptor, scalar } => {
                write!(
                    f,
                    "unknown scalar type '{scalar}' in type descriptor '{descriptor}'"
                )
            }
            Self::NestingTooDeep { descriptor, depth } => {
                write!(
                    f,
                    "type descriptor '{descriptor}' nests {depth} lists (max {MAX_LIST_DEPTH})"
                )
            }
        }
    }
}

impl std::error::Error for TypeParseError {}

/// Declared type of a kernel argument: scalar kind, list nesting depth and
/// const-ness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeName {
    pub kind: ScalarKind,
    pub depth: u8,
    pub is_const: bool,
}

impl TypeName {
    #[must_use]
    pub const fn scalar(kind: ScalarKind) -> Self {
        Self {
            kind,
            depth: 0,
            is_const: false,
        }
    }

    #[must_use]
    pub const fn list(kind: ScalarKind, depth: u8) -> Self {
        Self {
            kind,
            depth,
            is_const: false,
        }
    }

    /// Parses descriptors such as `int64_t`, `List[uint8_t]` or
    /// `Const[List[List[double]]]`.
    pub fn parse(descriptor: &str) -> Result<Self, TypeParseError> {
        let trimmed = descriptor.trim();
        if trimmed.is_empty() {
            return Err(TypeParseError::Empty);
        }

        let mut rest = trimmed;
        let mut is_const = false;
        if let Some(inner) = strip_wrapper(rest, "Const") {
            is_const = true;
            rest = inner;
        }

        let mut depth = 0u8;
        while let Some(inner) = strip_wrapper(rest, "List") {
            depth = depth.saturating_add(1);
            rest = inner;
        }

        if rest.contains('[') || rest.contains(']') {
            return Err(TypeParseError::Unbalanced {
                descriptor: trimmed.to_string(),
            });
        }
        if depth > MAX_LIST_DEPTH {
            return Err(TypeParseError::NestingTooDeep {
                descriptor: trimmed.to_string(),
                depth,
            });
        }

        let kind = ScalarKind::parse(rest).ok_or_else(|| TypeParseError::UnknownScalar {
            descriptor: trimmed.to_string(),
            scalar: rest.trim().to_string(),
        })?;

        Ok(Self {
            kind,
            depth,
            is_const,
        })
    }

    #[must_use]
    pub const fn is_sequence(&self) -> bool {
        self.depth > 0
    }

    /// Placeholder for a single element of this type.
    #[must_use]
    pub fn placeholder(&self) -> Value {
        self.kind.placeholder()
    }

    /// Placeholder buffer of `len` elements, standing in for an output buffer
    /// whose contents are not asserted.
    #[must_use]
    pub fn dummy_buffer(&self, len: usize) -> Value {
        Value::List(vec![self.placeholder(); len])
    }

    /// Nesting depth and scalar family both match, and no sequence on the way
    /// down is empty.
    #[must_use]
    pub fn conforms(&self, value: &Value) -> bool {
        conforms_at(self.kind, self.depth, value)
    }
}

fn strip_wrapper<'a>(raw: &'a str, wrapper: &str) -> Option<&'a str> {
    let rest = raw.trim().strip_prefix(wrapper)?;
    let inner = rest.trim_start().strip_prefix('[')?.strip_suffix(']')?;
    Some(inner.trim())
}

fn conforms_at(kind: ScalarKind, depth: u8, value: &Value) -> bool {
    match (depth, value) {
        (0, scalar) => kind.accepts(scalar),
        (_, Value::List(items)) => {
            !items.is_empty() && items.iter().all(|item| conforms_at(kind, depth - 1, item))
        }
        _ => false,
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = self.kind.name().to_string();
        for _ in 0..self.depth {
            text = format!("List[{text}]");
        }
        if self.is_const {
            text = format!("Const[{text}]");
        }
        f.write_str(&text)
    }
}

/// A fixture or oracle value: a scalar or an arbitrarily nested sequence.
///
/// Integers are held as `i128` so that both the `int64` and `uint64` ranges
/// survive loading and can be bound-checked afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i128),
    Float(f64),
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn ints(values: &[i128]) -> Self {
        Self::List(values.iter().copied().map(Self::Int).collect())
    }

    #[must_use]
    pub fn floats(values: &[f64]) -> Self {
        Self::List(values.iter().copied().map(Self::Float).collect())
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i128> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    #[must_use]
    pub fn is_negative(&self) -> bool {
        match self {
            Self::Int(v) => *v < 0,
            Self::Float(v) => *v < 0.0,
            _ => false,
        }
    }

    /// `false` for NaN or infinite floats anywhere in the value. JSON has no
    /// spelling for them.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.scalars().iter().all(|scalar| match scalar {
            Self::Float(v) => v.is_finite(),
            _ => true,
        })
    }

    /// All scalars, depth first, in element order.
    #[must_use]
    pub fn scalars(&self) -> Vec<&Value> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(value) = stack.pop() {
            match value {
                Self::List(items) => stack.extend(items.iter().rev()),
                scalar => out.push(scalar),
            }
        }
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => {
                if let Ok(narrow) = i64::try_from(*v) {
                    serializer.serialize_i64(narrow)
                } else if let Ok(narrow) = u64::try_from(*v) {
                    serializer.serialize_u64(narrow)
                } else {
                    serializer.serialize_i128(*v)
                }
            }
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a bool, a number, or a (nested) array of those")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(i128::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(Value::Int(i128::from(v)))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::List(items))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

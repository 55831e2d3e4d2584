//! Parameter kinds and the wire-value coercion table.

use std::fmt;

use serde_json::{Map, Number, Value};

/// The native kind a method parameter is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    Bool,
    String,
    Map,
    List,
    Any,
    /// A declared type that cannot be bound from a wire value.
    Unsupported(&'static str),
}

impl ParamKind {
    pub fn name(&self) -> &'static str {
        match self {
            ParamKind::I8 => "i8",
            ParamKind::I16 => "i16",
            ParamKind::I32 => "i32",
            ParamKind::I64 => "i64",
            ParamKind::Isize => "isize",
            ParamKind::U8 => "u8",
            ParamKind::U16 => "u16",
            ParamKind::U32 => "u32",
            ParamKind::U64 => "u64",
            ParamKind::Usize => "usize",
            ParamKind::F32 => "f32",
            ParamKind::F64 => "f64",
            ParamKind::Bool => "bool",
            ParamKind::String => "string",
            ParamKind::Map => "map",
            ParamKind::List => "list",
            ParamKind::Any => "any",
            ParamKind::Unsupported(name) => name,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ParamKind::I8
                | ParamKind::I16
                | ParamKind::I32
                | ParamKind::I64
                | ParamKind::Isize
                | ParamKind::U8
                | ParamKind::U16
                | ParamKind::U32
                | ParamKind::U64
                | ParamKind::Usize
                | ParamKind::F32
                | ParamKind::F64
        )
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A wire value after coercion to its declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Isize(isize),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Usize(usize),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Map(Map<String, Value>),
    List(Vec<Value>),
    Any(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoerceError {
    #[error("expected {expected}, got {found}")]
    Mismatch {
        expected: ParamKind,
        found: &'static str,
    },

    #[error("parameter kind {0} cannot be bound from a wire value")]
    Unsupported(ParamKind),
}

type Coercer = fn(Value, ParamKind) -> Result<Arg, CoerceError>;

fn coercer(kind: ParamKind) -> Coercer {
    match kind {
        ParamKind::Bool => coerce_bool,
        ParamKind::String => coerce_string,
        ParamKind::Map => coerce_map,
        ParamKind::List => coerce_list,
        ParamKind::Any => |value, _| Ok(Arg::Any(value)),
        ParamKind::Unsupported(_) => |_, kind| Err(CoerceError::Unsupported(kind)),
        _ => coerce_number,
    }
}

/// Coerce one wire value into `kind`.
///
/// Numbers are narrowed or widened without range checks. Integer kinds wrap
/// like an `as` cast from `i64`/`u64`; fractional values are truncated toward
/// zero first, and only values beyond the 64-bit range saturate there before
/// wrapping.
pub fn coerce(value: Value, kind: ParamKind) -> Result<Arg, CoerceError> {
    coercer(kind)(value, kind)
}

fn mismatch(kind: ParamKind, value: &Value) -> CoerceError {
    CoerceError::Mismatch {
        expected: kind,
        found: json_type(value),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce_bool(value: Value, kind: ParamKind) -> Result<Arg, CoerceError> {
    match value {
        Value::Bool(b) => Ok(Arg::Bool(b)),
        other => Err(mismatch(kind, &other)),
    }
}

fn coerce_string(value: Value, kind: ParamKind) -> Result<Arg, CoerceError> {
    match value {
        Value::String(s) => Ok(Arg::String(s)),
        other => Err(mismatch(kind, &other)),
    }
}

fn coerce_map(value: Value, kind: ParamKind) -> Result<Arg, CoerceError> {
    match value {
        Value::Object(map) => Ok(Arg::Map(map)),
        other => Err(mismatch(kind, &other)),
    }
}

fn coerce_list(value: Value, kind: ParamKind) -> Result<Arg, CoerceError> {
    match value {
        Value::Array(list) => Ok(Arg::List(list)),
        other => Err(mismatch(kind, &other)),
    }
}

fn coerce_number(value: Value, kind: ParamKind) -> Result<Arg, CoerceError> {
    match value {
        Value::Number(n) => Ok(cast_number(&n, kind)),
        other => Err(mismatch(kind, &other)),
    }
}

fn cast_number(n: &Number, kind: ParamKind) -> Arg {
    macro_rules! cast {
        ($variant:ident, $ty:ty) => {
            if let Some(i) = n.as_i64() {
                Arg::$variant(i as $ty)
            } else if let Some(u) = n.as_u64() {
                Arg::$variant(u as $ty)
            } else {
                let f = n.as_f64().unwrap_or_default();
                if f < 0.0 {
                    Arg::$variant((f as i64) as $ty)
                } else {
                    Arg::$variant((f as u64) as $ty)
                }
            }
        };
    }

    match kind {
        ParamKind::I8 => cast!(I8, i8),
        ParamKind::I16 => cast!(I16, i16),
        ParamKind::I32 => cast!(I32, i32),
        ParamKind::I64 => cast!(I64, i64),
        ParamKind::Isize => cast!(Isize, isize),
        ParamKind::U8 => cast!(U8, u8),
        ParamKind::U16 => cast!(U16, u16),
        ParamKind::U32 => cast!(U32, u32),
        ParamKind::U64 => cast!(U64, u64),
        ParamKind::Usize => cast!(Usize, usize),
        ParamKind::F32 => Arg::F32(n.as_f64().unwrap_or_default() as f32),
        _ => Arg::F64(n.as_f64().unwrap_or_default()),
    }
}

/// A type that a method can declare as a parameter.
pub trait FromArg: Sized + Send + 'static {
    const KIND: ParamKind;

    /// Whether the wire payload may omit this parameter when it is last.
    const OPTIONAL: bool = false;

    fn from_arg(arg: Arg) -> Option<Self>;
}

macro_rules! impl_from_arg {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromArg for $ty {
                const KIND: ParamKind = ParamKind::$variant;

                fn from_arg(arg: Arg) -> Option<Self> {
                    match arg {
                        Arg::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_from_arg! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    bool => Bool,
    String => String,
    Map<String, Value> => Map,
    Vec<Value> => List,
    Value => Any,
}

/// Trailing string-keyed map that callers may leave out; an omitted tail
/// arrives as an empty map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionalParams(pub Map<String, Value>);

impl OptionalParams {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl std::ops::Deref for OptionalParams {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromArg for OptionalParams {
    const KIND: ParamKind = ParamKind::Map;
    const OPTIONAL: bool = true;

    fn from_arg(arg: Arg) -> Option<Self> {
        match arg {
            Arg::Map(map) => Some(OptionalParams(map)),
            _ => None,
        }
    }
}

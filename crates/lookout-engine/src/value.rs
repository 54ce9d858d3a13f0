//! Engine values as seen from outside the engine.
//!
//! Primitives are carried inline. Objects are represented by an
//! [`ObjectRef`]: an engine-issued handle plus enough type information to
//! describe the object without calling back into the engine.

use std::fmt;

/// Broad classification of an object, used to pick CDP subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Plain,
    Array,
    Function,
    Error,
    RegExp,
    Date,
}

/// Handle to an object living in the engine heap.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRef {
    handle: u64,
    kind: ObjectKind,
    class_name: String,
    description: String,
}

impl ObjectRef {
    pub fn new(
        handle: u64,
        kind: ObjectKind,
        class_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            handle,
            kind,
            class_name: class_name.into(),
            description: description.into(),
        }
    }

    /// Engine-private identity of the object.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A script value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Decimal digits of a bigint, without the `n` suffix.
    BigInt(String),
    /// Symbol description.
    Symbol(String),
    Object(ObjectRef),
}

impl Value {
    /// Script truthiness: `undefined`, `null`, `false`, `0`, `NaN`, `""`
    /// and `0n` are false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::BigInt(digits) => digits.trim_start_matches('-') != "0",
            Value::Symbol(_) | Value::Object(_) => true,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Object(obj) if obj.kind() == ObjectKind::Function)
    }
}

/// Number formatting the way scripts print numbers.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        if n.is_sign_negative() { "-0" } else { "0" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{s}"),
            Value::BigInt(digits) => write!(f, "{digits}n"),
            Value::Symbol(desc) => write!(f, "Symbol({desc})"),
            Value::Object(obj) => write!(f, "{}", obj.description()),
        }
    }
}

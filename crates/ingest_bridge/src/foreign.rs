//! Values handed over by the foreign filter runtime
//!
//! The runtime's object model stays outside; the bridge sees either nothing,
//! a capsule wrapping a native callback/context, or plain data as JSON.

use serde_json::Value;

use crate::callback::{IngestCallback, IngestContext};
use crate::error::{IngestError, Result};

/// Native object wrapped for the foreign side
#[derive(Debug, Clone)]
pub enum Capsule {
    Callback(IngestCallback),
    Context(IngestContext),
}

impl Capsule {
    fn kind(&self) -> &'static str {
        match self {
            Self::Callback(_) => "callback",
            Self::Context(_) => "context",
        }
    }
}

/// Object received from the foreign runtime
#[derive(Debug, Clone)]
pub enum ForeignObject {
    /// The runtime's "nothing" value
    None,
    Capsule(Capsule),
    Value(Value),
}

impl ForeignObject {
    pub fn callback(callback: IngestCallback) -> Self {
        Self::Capsule(Capsule::Callback(callback))
    }

    pub fn context(context: IngestContext) -> Self {
        Self::Capsule(Capsule::Context(context))
    }

    /// Type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Capsule(capsule) => capsule.kind(),
            Self::Value(value) => value_type_name(value),
        }
    }

    /// Unwrap a callback capsule
    pub fn as_callback(&self) -> Result<&IngestCallback> {
        match self {
            Self::Capsule(Capsule::Callback(callback)) => Ok(callback),
            other => Err(IngestError::WrongCapsule {
                argument: "callback",
                expected: "callback",
                found: other.type_name(),
            }),
        }
    }

    /// Unwrap a context capsule
    pub fn as_context(&self) -> Result<&IngestContext> {
        match self {
            Self::Capsule(Capsule::Context(context)) => Ok(context),
            other => Err(IngestError::WrongCapsule {
                argument: "context",
                expected: "context",
                found: other.type_name(),
            }),
        }
    }
}

impl From<Value> for ForeignObject {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

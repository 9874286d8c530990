//! Typed sockets and the closed coercion table.
//!
//! Sockets are declared statically by each node kind. A link from an output of
//! type `A` into an input of type `B` is legal only when `coercion(A, B)`
//! returns a rule:
//!
//! | from → to            | rule                                          |
//! |----------------------|-----------------------------------------------|
//! | T → T                | identity                                      |
//! | Int → Float          | exact widening                                |
//! | Bool → Int / Float   | false → 0, true → 1                           |
//! | Float → Image        | constant 1-channel image at render resolution |
//! | KeypointMap → Image  | rasterized OpenPose map                       |
//!
//! Grayscale → RGBA broadcast is shape normalization, not a coercion.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::frame::Frame;
use super::value::Value;

/// Semantic socket type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketType {
    Bool,
    Int,
    Float,
    String,
    Image,
    KeypointMap,
    Conditioning,
}

impl std::fmt::Display for SocketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Compile-time default for an input socket
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(&'static str),
}

impl Literal {
    pub fn to_value(self) -> Value {
        match self {
            Literal::Bool(v) => Value::Bool(v),
            Literal::Int(v) => Value::Int(v),
            Literal::Float(v) => Value::Float(v),
            Literal::Str(v) => Value::String(v.to_string()),
        }
    }
}

/// Static socket declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SocketDef {
    pub name: &'static str,
    pub ty: SocketType,
    pub required: bool,
    pub default: Option<Literal>,
}

impl SocketDef {
    /// Input that must be linked or given a literal parameter
    pub const fn input(name: &'static str, ty: SocketType) -> Self {
        Self {
            name,
            ty,
            required: true,
            default: None,
        }
    }

    /// Input that may stay absent
    pub const fn optional(name: &'static str, ty: SocketType) -> Self {
        Self {
            name,
            ty,
            required: false,
            default: None,
        }
    }

    pub const fn with_default(name: &'static str, ty: SocketType, default: Literal) -> Self {
        Self {
            name,
            ty,
            required: true,
            default: Some(default),
        }
    }

    pub const fn output(name: &'static str, ty: SocketType) -> Self {
        Self {
            name,
            ty,
            required: false,
            default: None,
        }
    }
}

/// Conversion rule between two socket types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Identity,
    IntToFloat,
    BoolToInt,
    BoolToFloat,
    FloatToImage,
    KeypointsToImage,
}

/// Look up the rule for `from → to`; `None` means the link is illegal.
pub fn coercion(from: SocketType, to: SocketType) -> Option<Coercion> {
    use SocketType::*;
    match (from, to) {
        (a, b) if a == b => Some(Coercion::Identity),
        (Int, Float) => Some(Coercion::IntToFloat),
        (Bool, Int) => Some(Coercion::BoolToInt),
        (Bool, Float) => Some(Coercion::BoolToFloat),
        (Float, Image) => Some(Coercion::FloatToImage),
        (KeypointMap, Image) => Some(Coercion::KeypointsToImage),
        _ => None,
    }
}

/// Value does not fit the socket it is routed into.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {actual} to {expected}")]
pub struct TypeMismatch {
    pub expected: SocketType,
    pub actual: SocketType,
}

/// Convert `value` for a socket of type `to`.
/// `resolution` sizes images produced from scalars.
pub fn coerce(value: Value, to: SocketType, resolution: (usize, usize)) -> Result<Value, TypeMismatch> {
    let actual = value.socket_type();
    let mismatch = TypeMismatch { expected: to, actual };
    let rule = coercion(actual, to).ok_or_else(|| mismatch.clone())?;

    Ok(match (rule, value) {
        (Coercion::Identity, v) => v,
        (Coercion::IntToFloat, Value::Int(v)) => Value::Float(v as f32),
        (Coercion::BoolToInt, Value::Bool(v)) => Value::Int(v as i32),
        (Coercion::BoolToFloat, Value::Bool(v)) => Value::Float(if v { 1.0 } else { 0.0 }),
        (Coercion::FloatToImage, Value::Float(v)) => {
            Value::Image(Frame::filled(resolution.0, resolution.1, v))
        }
        (Coercion::KeypointsToImage, Value::Keypoints(map)) => Value::Image(map.to_frame()),
        _ => return Err(mismatch),
    })
}

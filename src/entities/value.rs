//! Runtime values routed over links.

use super::attrs::AttrValue;
use super::frame::Frame;
use super::pose::KeypointMap;
use super::socket::SocketType;

/// One conditioning input for a generative sampler (ControlNet-style).
#[derive(Debug, Clone, PartialEq)]
pub struct ControlGuide {
    /// Control model identifier, e.g. "openpose"
    pub model: String,
    pub image: Frame,
    pub scale: f32,
}

/// Payload produced by an output socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
    Image(Frame),
    Keypoints(KeypointMap),
    Conditioning(Vec<ControlGuide>),
}

impl Value {
    pub fn socket_type(&self) -> SocketType {
        match self {
            Value::Bool(_) => SocketType::Bool,
            Value::Int(_) => SocketType::Int,
            Value::Float(_) => SocketType::Float,
            Value::String(_) => SocketType::String,
            Value::Image(_) => SocketType::Image,
            Value::Keypoints(_) => SocketType::KeypointMap,
            Value::Conditioning(_) => SocketType::Conditioning,
        }
    }

    /// Literal parameter → value.
    pub fn from_literal(literal: &AttrValue) -> Value {
        match literal {
            AttrValue::Bool(v) => Value::Bool(*v),
            AttrValue::Int(v) => Value::Int(*v),
            AttrValue::Float(v) => Value::Float(*v),
            AttrValue::Str(v) => Value::String(v.clone()),
        }
    }

    /// Image-shaped view of the value for live preview, if it has one.
    pub fn preview(&self) -> Option<Frame> {
        match self {
            Value::Image(frame) => Some(frame.clone()),
            Value::Keypoints(map) => Some(map.to_frame()),
            _ => None,
        }
    }

    /// Short description for logs
    pub fn summary(&self) -> String {
        match self {
            Value::Bool(v) => format!("Bool({})", v),
            Value::Int(v) => format!("Int({})", v),
            Value::Float(v) => format!("Float({})", v),
            Value::String(v) => format!("String({:?})", v),
            Value::Image(f) => {
                let (h, w, c) = f.shape();
                format!("Image({}x{}x{})", h, w, c)
            }
            Value::Keypoints(m) => format!("Keypoints({} skeletons)", m.skeletons.len()),
            Value::Conditioning(g) => format!("Conditioning({} guides)", g.len()),
        }
    }
}

impl From<Frame> for Value {
    fn from(frame: Frame) -> Self {
        Value::Image(frame)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

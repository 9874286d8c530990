//! Node - a unit of computation in the node tree.
//!
//! A `Node` pairs an identity (UUID + display name) with a `NodeKind` that
//! selects its compute behaviour, plus a parameter map. The kind declares the
//! node's sockets statically; nodes carry no execution state between runs.
//!
//! ## Compute contract
//!
//! `NodeCompute::compute` receives resolved input values (already coerced to
//! each socket's type), the node's parameters, and a `ComputeContext`. It may
//! call `ctx.emit()` zero or more times with partial results before returning
//! its final outputs. The returned outputs are authoritative.

use enum_dispatch::enum_dispatch;
use indexmap::IndexMap;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use super::attrs::Attrs;
use super::cancel::CancelToken;
use super::frame::{Frame, FrameError};
use super::node_kind::NodeKind;
use super::pose::KeypointMap;
use super::scene::SceneSnapshot;
use super::socket::{SocketDef, SocketType, TypeMismatch};
use super::traits::BackendRegistry;
use super::value::{ControlGuide, Value};

/// Failure inside a node's compute step.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("missing input '{0}'")]
    MissingInput(String),

    #[error("input '{socket}': {source}")]
    TypeMismatch {
        socket: String,
        #[source]
        source: TypeMismatch,
    },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("generative backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Retryable backend failure (busy device, dropped connection)
    #[error("transient backend failure: {0}")]
    BackendTransient(String),

    #[error("backend failure: {0}")]
    Backend(String),

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Compute step observed the cancellation token
    #[error("cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn invalid_param(name: &str, reason: impl Into<String>) -> Self {
        NodeError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Base trait for all node kinds.
#[enum_dispatch]
pub trait NodeCompute {
    /// Stable type identifier used in saved trees ("Math", "Generate", ...)
    fn type_name(&self) -> &'static str;

    /// Declared inputs, in display order
    fn inputs(&self) -> &'static [SocketDef];

    /// Declared outputs; the first one is the primary output
    fn outputs(&self) -> &'static [SocketDef];

    fn compute(
        &self,
        params: &Attrs,
        inputs: &Inputs,
        ctx: &mut ComputeContext<'_>,
    ) -> Result<Outputs, NodeError>;
}

/// Context passed to node compute.
/// Holds everything a node may read besides its own inputs.
pub struct ComputeContext<'a> {
    pub scene: &'a SceneSnapshot,
    pub backends: &'a BackendRegistry,
    pub cancel: &'a CancelToken,
    sink: &'a mut dyn FnMut(Value),
}

impl<'a> ComputeContext<'a> {
    pub fn new(
        scene: &'a SceneSnapshot,
        backends: &'a BackendRegistry,
        cancel: &'a CancelToken,
        sink: &'a mut dyn FnMut(Value),
    ) -> Self {
        Self {
            scene,
            backends,
            cancel,
            sink,
        }
    }

    /// Stream a partial result (live preview) to the executor.
    pub fn emit(&mut self, value: Value) {
        (self.sink)(value);
    }

    /// Render resolution of the scene
    pub fn resolution(&self) -> (usize, usize) {
        self.scene.resolution()
    }

    /// Resolve a `(width, height)` pair where 0 means "scene resolution".
    pub fn size_or_scene(&self, width: i32, height: i32) -> Result<(usize, usize), NodeError> {
        if width < 0 || height < 0 {
            return Err(NodeError::invalid_param("width/height", "must not be negative"));
        }
        let (sw, sh) = self.resolution();
        Ok((
            if width == 0 { sw } else { width as usize },
            if height == 0 { sh } else { height as usize },
        ))
    }

    pub fn check_cancel(&self) -> Result<(), NodeError> {
        if self.cancel.is_cancelled() {
            Err(NodeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Resolved input values for one compute call, keyed by socket name.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    values: HashMap<String, Value>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn require(&self, name: &str) -> Result<&Value, NodeError> {
        self.values
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    fn mismatch(name: &str, expected: SocketType, value: &Value) -> NodeError {
        NodeError::TypeMismatch {
            socket: name.to_string(),
            source: TypeMismatch {
                expected,
                actual: value.socket_type(),
            },
        }
    }

    pub fn image(&self, name: &str) -> Result<&Frame, NodeError> {
        match self.require(name)? {
            Value::Image(f) => Ok(f),
            v => Err(Self::mismatch(name, SocketType::Image, v)),
        }
    }

    /// Optional image input; absent → `None`, wrong type → error.
    pub fn opt_image(&self, name: &str) -> Result<Option<&Frame>, NodeError> {
        match self.values.get(name) {
            None => Ok(None),
            Some(Value::Image(f)) => Ok(Some(f)),
            Some(v) => Err(Self::mismatch(name, SocketType::Image, v)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f32, NodeError> {
        match self.require(name)? {
            Value::Float(v) => Ok(*v),
            v => Err(Self::mismatch(name, SocketType::Float, v)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i32, NodeError> {
        match self.require(name)? {
            Value::Int(v) => Ok(*v),
            v => Err(Self::mismatch(name, SocketType::Int, v)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool, NodeError> {
        match self.require(name)? {
            Value::Bool(v) => Ok(*v),
            v => Err(Self::mismatch(name, SocketType::Bool, v)),
        }
    }

    pub fn string(&self, name: &str) -> Result<&str, NodeError> {
        match self.require(name)? {
            Value::String(v) => Ok(v),
            v => Err(Self::mismatch(name, SocketType::String, v)),
        }
    }

    pub fn keypoints(&self, name: &str) -> Result<&KeypointMap, NodeError> {
        match self.require(name)? {
            Value::Keypoints(v) => Ok(v),
            v => Err(Self::mismatch(name, SocketType::KeypointMap, v)),
        }
    }

    /// Optional conditioning chain; absent → empty.
    pub fn conditioning(&self, name: &str) -> Result<&[ControlGuide], NodeError> {
        match self.values.get(name) {
            None => Ok(&[]),
            Some(Value::Conditioning(g)) => Ok(g),
            Some(v) => Err(Self::mismatch(name, SocketType::Conditioning, v)),
        }
    }
}

/// Values produced by one compute call, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Outputs {
    values: IndexMap<String, Value>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(name: &str, value: Value) -> Self {
        Self::new().with(name, value)
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Node instance in a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: Uuid,
    pub name: String,
    pub kind: NodeKind,
    pub params: Attrs,
}

impl Node {
    pub fn new(kind: NodeKind, name: &str) -> Self {
        Self::with_id(Uuid::new_v4(), kind, name)
    }

    pub fn with_id(id: Uuid, kind: NodeKind, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            params: Attrs::new(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn input(&self, name: &str) -> Option<&'static SocketDef> {
        self.kind.inputs().iter().find(|s| s.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&'static SocketDef> {
        self.kind.outputs().iter().find(|s| s.name == name)
    }

    /// First declared output
    pub fn primary_output(&self) -> Option<&'static SocketDef> {
        self.kind.outputs().first()
    }
}

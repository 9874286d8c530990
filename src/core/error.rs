//! Error types for graph validation and execution.
//!
//! Cancellation is not an error: it surfaces as `RunOutcome::Cancelled`.

use thiserror::Error;
use uuid::Uuid;

use crate::entities::{NodeError, SocketType};

/// Tree is not runnable. Raised before any compute step.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("tree has no output node")]
    NoOutput,

    #[error("link references unknown node {0}")]
    UnknownNode(Uuid),

    #[error("node '{node}' has no {direction} socket '{socket}'")]
    UnknownSocket {
        node: String,
        socket: String,
        direction: &'static str,
    },

    #[error("link {from_node}.{from_socket} -> {to_node}.{to_socket}: cannot convert {from} to {to}")]
    Incompatible {
        from_node: String,
        from_socket: String,
        from: SocketType,
        to_node: String,
        to_socket: String,
        to: SocketType,
    },

    #[error("input '{node}.{socket}' has more than one link")]
    DuplicateLink { node: String, socket: String },

    #[error("cycle through nodes: {}", .nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    #[error("required input '{node}.{socket}' is not connected and has no value")]
    UnresolvedInput { node: String, socket: String },

    #[error("parameter '{node}.{socket}' holds {found}, expected {expected}")]
    InvalidLiteral {
        node: String,
        socket: String,
        expected: SocketType,
        found: String,
    },
}

/// Failure while running a validated tree.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("node '{node}' ({kind}) failed: {source}")]
    NodeCompute {
        node: String,
        kind: &'static str,
        #[source]
        source: NodeError,
    },

    #[error("node '{node}' did not produce its '{socket}' output")]
    MissingOutput { node: String, socket: String },

    #[error("output node '{node}' produced {actual}, which is not an image")]
    InvalidResult { node: String, actual: SocketType },
}

impl ExecError {
    /// Underlying node failure, if this is one
    pub fn node_error(&self) -> Option<&NodeError> {
        match self {
            ExecError::NodeCompute { source, .. } => Some(source),
            _ => None,
        }
    }
}

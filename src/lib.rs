//! dream-engine - node-graph render engine library
//!
//! Runs node trees that produce images (procedural sources, OpenPose
//! annotations, generative synthesis) and hands the results to a host
//! renderer or viewport.

// Data model: frames, values, nodes, trees, scene snapshots
pub mod entities;

// Executor, backends, render adapter, viewport
pub mod core;

// App modules
pub mod cli;
pub mod config;

pub use config::EngineConfig;
pub use core::{execute, ExecError, RenderEngine, RenderHost, RunOutcome, ValidationError};
pub use entities::{Frame, NodeKind, NodeTree, SceneSnapshot, Value};

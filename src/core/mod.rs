//! Core engine modules - executor, backends, render adapter, viewport
//!
//! These modules run node trees and talk to hosts. The data model they
//! operate on lives in `entities`.

pub mod backend;
pub mod error;
pub mod executor;
pub mod headless;
pub mod render;
pub mod viewport;

// Re-exports for convenience
pub use backend::ProceduralBackend;
pub use error::{ExecError, ValidationError};
pub use executor::{execute, ExecutionContext, ExecutionObserver, Executor, Plan, Progress, RunOutcome};
pub use headless::HeadlessHost;
pub use render::{RenderEngine, RenderHost, RenderResult, RenderStatus, ReportLevel};
pub use viewport::{DisplayBackend, DrawData, GpuBlend, ViewContext};

//! Render adapter: runs a node tree for the host's render-engine slot.
//!
//! The host implements `RenderHost` (result buffer, progress, stats, reports,
//! break polling). `RenderEngine` owns the backends and the viewport state and
//! translates executor callbacks into host calls:
//!
//! | executor        | host                                                |
//! |-----------------|-----------------------------------------------------|
//! | node_begin      | `update_stats("Node", name)`                        |
//! | node_update     | previewable value → RGBA → Combined pass → `update_result` |
//! | node_end        | `update_progress(fraction)`, `test_break()` polling |
//!
//! Nothing here knows about node kinds; the executor stays host-agnostic.

use indexmap::IndexMap;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::backend::ProceduralBackend;
use super::error::ExecError;
use super::executor::{execute, ExecutionObserver, Progress, RunOutcome};
use super::viewport::Viewport;
use crate::config::EngineConfig;
use crate::entities::frame::Channels;
use crate::entities::{BackendRegistry, CancelToken, CropAlign, Frame, Node, NodeTree, SceneSnapshot, Value};

/// Name of the pass the engine writes
pub const COMBINED: &str = "Combined";

/// Severity of a host report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Warning,
    Error,
}

/// One pass of a result layer, in the host's flat `rect` layout.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    pub name: String,
    pub channels: usize,
    /// Row-major RGBA pixels, origin top-left
    pub rect: Vec<[f32; 4]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderLayer {
    pub name: String,
    pub passes: IndexMap<String, RenderPass>,
}

/// Incremental pixel buffer for one render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub layers: Vec<RenderLayer>,
}

impl RenderResult {
    /// Result with one view layer holding a transparent Combined pass.
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        let pass = RenderPass {
            name: COMBINED.to_string(),
            channels: 4,
            rect: vec![[0.0; 4]; width * height],
        };
        Self {
            x,
            y,
            width,
            height,
            layers: vec![RenderLayer {
                name: "View Layer".to_string(),
                passes: IndexMap::from([(COMBINED.to_string(), pass)]),
            }],
        }
    }

    /// Combined pass of the first layer
    pub fn combined(&self) -> Option<&RenderPass> {
        self.layers.first()?.passes.get(COMBINED)
    }

    pub fn combined_mut(&mut self) -> Option<&mut RenderPass> {
        self.layers.first_mut()?.passes.get_mut(COMBINED)
    }

    /// Write `frame` into the Combined pass, cropped or padded to the rect.
    pub fn write(&mut self, frame: &Frame) {
        let (w, h) = (self.width, self.height);
        if let Some(pass) = self.combined_mut() {
            pass.rect = frame.fit(w, h, CropAlign::LeftTop).to_rect();
        }
    }

    /// Combined pass as an RGBA frame
    pub fn to_frame(&self) -> Option<Frame> {
        let pass = self.combined()?;
        let data = pass.rect.iter().flatten().copied().collect();
        Frame::from_vec(self.width, self.height, Channels::Rgba, data).ok()
    }
}

/// Render-engine capabilities the host provides.
pub trait RenderHost {
    fn begin_result(&mut self, x: usize, y: usize, width: usize, height: usize) -> RenderResult {
        RenderResult::new(x, y, width, height)
    }

    /// Show the current buffer contents (progressive refinement)
    fn update_result(&mut self, result: &RenderResult);

    /// Commit the final buffer
    fn end_result(&mut self, result: RenderResult);

    fn update_progress(&mut self, progress: f32);

    fn update_stats(&mut self, stats: &str, info: &str);

    fn report(&mut self, level: ReportLevel, message: &str);

    /// True once the user asked to stop
    fn test_break(&self) -> bool;
}

/// How a render ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Finished,
    Cancelled,
}

/// Executor observer that streams into the host.
struct HostObserver<'h> {
    host: &'h mut dyn RenderHost,
    result: &'h mut RenderResult,
    cancel: &'h CancelToken,
}

impl HostObserver<'_> {
    fn poll_break(&mut self) {
        if !self.cancel.is_cancelled() && self.host.test_break() {
            info!("Render break requested");
            self.cancel.cancel();
        }
    }
}

impl ExecutionObserver for HostObserver<'_> {
    fn node_begin(&mut self, node: &Node) {
        self.host.update_stats("Node", &node.name);
    }

    fn node_update(&mut self, _node: &Node, value: &Value) {
        if let Some(frame) = value.preview() {
            self.result.write(&frame.to_rgba());
            self.host.update_result(&*self.result);
        }
        self.poll_break();
    }

    fn node_end(&mut self, _node: &Node, _value: &Value, progress: Progress) {
        self.host.update_progress(progress.fraction());
        self.poll_break();
    }
}

/// The engine instance the host creates per render session.
pub struct RenderEngine {
    backends: BackendRegistry,
    cancel: CancelToken,
    pub(crate) viewport: Viewport,
}

impl RenderEngine {
    pub fn new(backends: BackendRegistry) -> Self {
        Self {
            backends,
            cancel: CancelToken::new(),
            viewport: Viewport::default(),
        }
    }

    /// Engine with the procedural backend registered and config applied.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut backends = BackendRegistry::new();
        let procedural =
            ProceduralBackend::new().with_step_delay(Duration::from_millis(config.procedural.step_delay_ms));
        backends.register(Arc::new(procedural));
        if !config.default_backend.is_empty() {
            backends.set_default(&config.default_backend);
        }

        let mut engine = Self::new(backends);
        engine.viewport.live_render = config.viewport.live_render;
        engine
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    pub fn backends_mut(&mut self) -> &mut BackendRegistry {
        &mut self.backends
    }

    /// Token the host may trigger from another thread to stop a render.
    /// Cleared once the render it stopped has returned.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Most recent image shown in the viewport
    pub fn last_image(&self) -> Option<&Frame> {
        self.viewport.image()
    }

    /// Final render at the scene resolution.
    pub fn render(
        &mut self,
        host: &mut dyn RenderHost,
        tree: &NodeTree,
        scene: &SceneSnapshot,
    ) -> Result<RenderStatus, ExecError> {
        let (w, h) = scene.resolution();
        info!("Render '{}' at {}x{} with tree '{}'", scene.name, w, h, tree.name);

        let mut result = host.begin_result(0, 0, w, h);
        host.update_result(&result);

        let outcome = {
            let mut observer = HostObserver {
                host: &mut *host,
                result: &mut result,
                cancel: &self.cancel,
            };
            execute(tree, scene, &self.backends, &self.cancel, &mut observer)
        };
        // Re-arm for the next run
        self.cancel.reset();

        match outcome {
            Ok(RunOutcome::Finished(frame)) => {
                result.write(&frame);
                self.viewport.set_image(frame);
                host.end_result(result);
                debug!("Render committed");
                Ok(RenderStatus::Finished)
            }
            Ok(RunOutcome::Cancelled) => {
                warn!("Render cancelled, nothing committed");
                Ok(RenderStatus::Cancelled)
            }
            Err(e) => {
                error!("Render failed: {}", e);
                host.report(ReportLevel::Error, &e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::error::ValidationError;
    use crate::entities::keys::*;
    use crate::entities::nodes::generate::GenerateNode;
    use crate::entities::nodes::output::GroupOutputNode;
    use crate::entities::nodes::source::ConstantImageNode;

    /// Host that records every call.
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub updates: usize,
        pub committed: Option<RenderResult>,
        pub progress: Vec<f32>,
        pub stats: Vec<String>,
        pub reports: Vec<(ReportLevel, String)>,
        pub break_after_progress: Option<usize>,
    }

    impl RenderHost for RecordingHost {
        fn update_result(&mut self, _result: &RenderResult) {
            self.updates += 1;
        }

        fn end_result(&mut self, result: RenderResult) {
            self.committed = Some(result);
        }

        fn update_progress(&mut self, progress: f32) {
            self.progress.push(progress);
        }

        fn update_stats(&mut self, _stats: &str, info: &str) {
            self.stats.push(info.to_string());
        }

        fn report(&mut self, level: ReportLevel, message: &str) {
            self.reports.push((level, message.to_string()));
        }

        fn test_break(&self) -> bool {
            self.break_after_progress.is_some_and(|n| self.progress.len() >= n)
        }
    }

    fn scene(w: u32, h: u32) -> SceneSnapshot {
        let mut scene = SceneSnapshot::default();
        scene.render.resolution_x = w;
        scene.render.resolution_y = h;
        scene
    }

    fn constant_tree(size: i32) -> NodeTree {
        let mut tree = NodeTree::new("const");
        let src = tree.add_node(ConstantImageNode, "source");
        tree.set_param(src, S_VALUE, 0.5f32).unwrap();
        tree.set_param(src, S_WIDTH, size).unwrap();
        tree.set_param(src, S_HEIGHT, size).unwrap();
        let out = tree.add_node(GroupOutputNode, "output");
        tree.connect(src, S_IMAGE, out, S_IMAGE).unwrap();
        tree
    }

    #[test]
    fn test_render_commits_rgba_result() {
        let mut engine = RenderEngine::new(BackendRegistry::new());
        let mut host = RecordingHost::default();
        let status = engine.render(&mut host, &constant_tree(64), &scene(64, 64)).unwrap();

        assert_eq!(status, RenderStatus::Finished);
        let committed = host.committed.expect("result committed");
        let pass = committed.combined().unwrap();
        assert_eq!(pass.rect.len(), 64 * 64);
        assert!(pass.rect.iter().all(|px| *px == [0.5, 0.5, 0.5, 1.0]));
        assert_eq!(host.progress, vec![0.5, 1.0]);
        assert_eq!(host.stats, vec!["source", "output"]);
        assert!(host.reports.is_empty());
        assert_eq!(engine.last_image().map(|f| f.shape()), Some((64, 64, 4)));
    }

    #[test]
    fn test_result_fitted_to_scene_rect() {
        let mut engine = RenderEngine::new(BackendRegistry::new());
        let mut host = RecordingHost::default();
        engine.render(&mut host, &constant_tree(4), &scene(6, 2)).unwrap();

        let frame = host.committed.unwrap().to_frame().unwrap();
        assert_eq!(frame.shape(), (2, 6, 4));
        assert_eq!(frame.pixel(3, 1), [0.5, 0.5, 0.5, 1.0]);
        // Padding outside the 4x4 source stays transparent
        assert_eq!(frame.pixel(5, 0), [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_backend_unavailable_reported_not_committed() {
        let mut tree = NodeTree::new("gen");
        let generate = tree.add_node(GenerateNode, "generate");
        let out = tree.add_node(GroupOutputNode, "out");
        tree.connect(generate, S_IMAGE, out, S_IMAGE).unwrap();

        let mut engine = RenderEngine::new(BackendRegistry::new());
        let mut host = RecordingHost::default();
        let err = engine.render(&mut host, &tree, &scene(8, 8)).unwrap_err();

        assert!(host.committed.is_none());
        assert_eq!(host.reports.len(), 1);
        assert_eq!(host.reports[0].0, ReportLevel::Error);
        assert_eq!(host.reports[0].1, err.to_string());
        assert!(host.reports[0].1.contains("generative backend unavailable"));
    }

    #[test]
    fn test_break_cancels_without_commit() {
        let mut tree = NodeTree::new("three");
        let src = tree.add_node(ConstantImageNode, "source");
        let generate = tree.add_node(GenerateNode, "generate");
        let out = tree.add_node(GroupOutputNode, "out");
        tree.connect(src, S_IMAGE, generate, S_INIT_IMAGE).unwrap();
        tree.connect(generate, S_IMAGE, out, S_IMAGE).unwrap();

        let mut engine = RenderEngine::from_config(&EngineConfig::default());
        let mut host = RecordingHost {
            break_after_progress: Some(1),
            ..Default::default()
        };
        let status = engine.render(&mut host, &tree, &scene(8, 8)).unwrap();

        assert_eq!(status, RenderStatus::Cancelled);
        assert!(host.committed.is_none());
        assert!(host.reports.is_empty());
        assert_eq!(host.stats, vec!["source"]);
        assert!(engine.last_image().is_none());
    }

    #[test]
    fn test_cancel_before_render_is_honoured() {
        let mut engine = RenderEngine::new(BackendRegistry::new());
        let tree = constant_tree(1);
        engine.cancel_token().cancel();

        let mut host = RecordingHost::default();
        let status = engine.render(&mut host, &tree, &scene(4, 4)).unwrap();
        assert_eq!(status, RenderStatus::Cancelled);
        assert!(host.committed.is_none());
        assert!(host.stats.is_empty());

        // The next render starts clean
        let mut host = RecordingHost::default();
        let status = engine.render(&mut host, &tree, &scene(4, 4)).unwrap();
        assert_eq!(status, RenderStatus::Finished);
        assert!(host.committed.is_some());
    }

    #[test]
    fn test_validation_error_reported() {
        let tree = NodeTree::new("empty");
        let mut engine = RenderEngine::new(BackendRegistry::new());
        let mut host = RecordingHost::default();
        let err = engine.render(&mut host, &tree, &scene(8, 8)).unwrap_err();
        assert!(matches!(err, ExecError::Validation(ValidationError::NoOutput)));
        assert_eq!(host.reports.len(), 1);
        assert!(host.committed.is_none());
    }
}

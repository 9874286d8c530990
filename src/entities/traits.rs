//! Abstract traits for dependency inversion.
//!
//! The generative model is an opaque collaborator: nodes only see the
//! `GenerativeBackend` trait and look backends up by name in a
//! `BackendRegistry`. Implementations live in `core/backend.rs` (or in the
//! embedding host).

use indexmap::IndexMap;
use std::sync::Arc;

use super::cancel::CancelToken;
use super::frame::Frame;
use super::node::NodeError;
use super::value::ControlGuide;

/// Everything a sampler needs for one image.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: usize,
    pub height: usize,
    pub steps: u32,
    pub seed: u64,
    pub cfg_scale: f32,
    /// Image-to-image source
    pub init_image: Option<Frame>,
    /// How much of `init_image` is replaced (0 = keep, 1 = ignore)
    pub strength: f32,
    pub control: Vec<ControlGuide>,
}

/// Partial result streamed while sampling.
#[derive(Debug, Clone)]
pub struct StepPreview {
    pub step: u32,
    pub steps: u32,
    pub image: Frame,
}

/// Image-synthesis backend.
///
/// `generate` may block for a long time and may run its own background work,
/// but must invoke `on_step` on the calling thread. It should poll `cancel`
/// and return `NodeError::Cancelled` once set.
pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
        on_step: &mut dyn FnMut(StepPreview),
    ) -> Result<Frame, NodeError>;
}

/// Named backends available to generation nodes.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: IndexMap<String, Arc<dyn GenerativeBackend>>,
    default: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend; the first one registered becomes the default.
    pub fn register(&mut self, backend: Arc<dyn GenerativeBackend>) {
        let name = backend.name().to_string();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.backends.insert(name, backend);
    }

    pub fn set_default(&mut self, name: &str) {
        self.default = Some(name.to_string());
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Resolve `name`, or the default backend when `name` is empty/absent.
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn GenerativeBackend>, NodeError> {
        let key = match name.filter(|n| !n.is_empty()) {
            Some(n) => n,
            None => self
                .default
                .as_deref()
                .ok_or_else(|| NodeError::BackendUnavailable("no backend registered".to_string()))?,
        };
        self.backends
            .get(key)
            .cloned()
            .ok_or_else(|| NodeError::BackendUnavailable(format!("backend '{}' is not registered", key)))
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("default", &self.default)
            .finish()
    }
}

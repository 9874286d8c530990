//! Generative image synthesis through a registered backend.
//!
//! The node builds a `GenerationRequest` from its inputs, resolves the backend
//! named by the `backend` parameter (empty = registry default) and forwards
//! every step preview to the executor as a partial result. Transient backend
//! failures are retried up to `retries` times; anything else fails the node.

use log::{debug, warn};

use crate::entities::attrs::Attrs;
use crate::entities::keys::*;
use crate::entities::node::{ComputeContext, Inputs, NodeCompute, NodeError, Outputs};
use crate::entities::socket::{Literal, SocketDef, SocketType};
use crate::entities::traits::GenerationRequest;
use crate::entities::value::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GenerateNode;

const GENERATE_INPUTS: &[SocketDef] = &[
    SocketDef::with_default(S_PROMPT, SocketType::String, Literal::Str("")),
    SocketDef::with_default(S_NEGATIVE_PROMPT, SocketType::String, Literal::Str("")),
    SocketDef::with_default(S_STEPS, SocketType::Int, Literal::Int(20)),
    SocketDef::with_default(S_SEED, SocketType::Int, Literal::Int(0)),
    SocketDef::with_default(S_CFG_SCALE, SocketType::Float, Literal::Float(7.0)),
    SocketDef::with_default(S_WIDTH, SocketType::Int, Literal::Int(0)),
    SocketDef::with_default(S_HEIGHT, SocketType::Int, Literal::Int(0)),
    SocketDef::optional(S_INIT_IMAGE, SocketType::Image),
    SocketDef::with_default(S_STRENGTH, SocketType::Float, Literal::Float(0.75)),
    SocketDef::optional(S_CONTROL, SocketType::Conditioning),
];
const GENERATE_OUT: &[SocketDef] = &[SocketDef::output(S_IMAGE, SocketType::Image)];

impl GenerateNode {
    fn request(inputs: &Inputs, ctx: &ComputeContext<'_>) -> Result<GenerationRequest, NodeError> {
        let steps = inputs.int(S_STEPS)?;
        if steps < 1 {
            return Err(NodeError::invalid_param(S_STEPS, "must be at least 1"));
        }
        let strength = inputs.float(S_STRENGTH)?;
        if !(0.0..=1.0).contains(&strength) {
            return Err(NodeError::invalid_param(S_STRENGTH, "must be within 0..1"));
        }
        let (width, height) = ctx.size_or_scene(inputs.int(S_WIDTH)?, inputs.int(S_HEIGHT)?)?;

        Ok(GenerationRequest {
            prompt: inputs.string(S_PROMPT)?.to_string(),
            negative_prompt: inputs.string(S_NEGATIVE_PROMPT)?.to_string(),
            width,
            height,
            steps: steps as u32,
            seed: inputs.int(S_SEED)? as u32 as u64,
            cfg_scale: inputs.float(S_CFG_SCALE)?,
            init_image: inputs.opt_image(S_INIT_IMAGE)?.cloned(),
            strength,
            control: inputs.conditioning(S_CONTROL)?.to_vec(),
        })
    }
}

impl NodeCompute for GenerateNode {
    fn type_name(&self) -> &'static str {
        "Generate"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        GENERATE_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        GENERATE_OUT
    }

    fn compute(&self, params: &Attrs, inputs: &Inputs, ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let request = Self::request(inputs, ctx)?;
        let backend = ctx.backends.get(params.get_str(P_BACKEND))?;
        let retries = params.get_i32_or(P_RETRIES, 0).max(0) as u32;
        let cancel = ctx.cancel;

        debug!(
            "Generate: backend '{}', {}x{}, {} steps, seed {}, {} control guide(s)",
            backend.name(),
            request.width,
            request.height,
            request.steps,
            request.seed,
            request.control.len()
        );

        let mut attempt = 0;
        loop {
            ctx.check_cancel()?;
            let result = backend.generate(&request, cancel, &mut |preview| {
                ctx.emit(Value::Image(preview.image));
            });
            match result {
                Ok(frame) => return Ok(Outputs::single(S_IMAGE, Value::Image(frame))),
                Err(NodeError::BackendTransient(msg)) if attempt < retries => {
                    attempt += 1;
                    warn!(
                        "Generate: backend '{}' failed transiently ({}), retry {}/{}",
                        backend.name(),
                        msg,
                        attempt,
                        retries
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::cancel::CancelToken;
    use crate::entities::frame::Frame;
    use crate::entities::nodes::testing::{run, scene};
    use crate::entities::traits::{BackendRegistry, GenerativeBackend, StepPreview};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails transiently `fail_first` times, then returns a flat image.
    struct Flaky {
        fail_first: u32,
        calls: AtomicU32,
    }

    impl GenerativeBackend for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn generate(
            &self,
            request: &GenerationRequest,
            _cancel: &CancelToken,
            on_step: &mut dyn FnMut(StepPreview),
        ) -> Result<Frame, NodeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(NodeError::BackendTransient("device busy".into()));
            }
            for step in 1..=request.steps {
                on_step(StepPreview {
                    step,
                    steps: request.steps,
                    image: Frame::filled(request.width, request.height, step as f32),
                });
            }
            Ok(Frame::filled(request.width, request.height, 1.0))
        }
    }

    fn inputs(steps: i32) -> Inputs {
        let mut inputs = Inputs::new();
        inputs.insert(S_PROMPT, Value::String("a dancer".into()));
        inputs.insert(S_NEGATIVE_PROMPT, Value::String(String::new()));
        inputs.insert(S_STEPS, Value::Int(steps));
        inputs.insert(S_SEED, Value::Int(1));
        inputs.insert(S_CFG_SCALE, Value::Float(7.0));
        inputs.insert(S_WIDTH, Value::Int(0));
        inputs.insert(S_HEIGHT, Value::Int(0));
        inputs.insert(S_STRENGTH, Value::Float(0.75));
        inputs
    }

    fn registry(fail_first: u32) -> (BackendRegistry, Arc<Flaky>) {
        let backend = Arc::new(Flaky {
            fail_first,
            calls: AtomicU32::new(0),
        });
        let mut registry = BackendRegistry::new();
        registry.register(backend.clone());
        (registry, backend)
    }

    #[test]
    fn test_streams_step_previews() {
        let (registry, _) = registry(0);
        let (out, partials) = run(&GenerateNode, &Attrs::new(), &inputs(3), &scene(4, 4), &registry);
        assert!(out.is_ok());
        assert_eq!(partials.len(), 3);
        match &partials[2] {
            Value::Image(f) => assert_eq!(f.pixel(0, 0)[0], 3.0),
            other => panic!("unexpected partial {:?}", other.socket_type()),
        }
    }

    #[test]
    fn test_retries_transient_failures() {
        let (registry, backend) = registry(2);
        let mut params = Attrs::new();
        params.set(P_RETRIES, 2);
        let (out, _) = run(&GenerateNode, &params, &inputs(1), &scene(4, 4), &registry);
        assert!(out.is_ok());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_retries() {
        let (registry, backend) = registry(5);
        let mut params = Attrs::new();
        params.set(P_RETRIES, 1);
        let (out, _) = run(&GenerateNode, &params, &inputs(1), &scene(4, 4), &registry);
        assert!(matches!(out, Err(NodeError::BackendTransient(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_backend() {
        let (registry, _) = registry(0);
        let mut params = Attrs::new();
        params.set(P_BACKEND, "sdxl");
        let (out, _) = run(&GenerateNode, &params, &inputs(1), &scene(4, 4), &registry);
        assert!(matches!(out, Err(NodeError::BackendUnavailable(_))));
    }

    #[test]
    fn test_rejects_zero_steps() {
        let (registry, _) = registry(0);
        let (out, _) = run(&GenerateNode, &Attrs::new(), &inputs(0), &scene(4, 4), &registry);
        assert!(matches!(out, Err(NodeError::InvalidParameter { .. })));
    }
}

//! Procedural reference backend.
//!
//! A deterministic stand-in for a real diffusion sampler. It runs the step
//! loop on a named worker thread and streams step previews back over a
//! bounded channel; the caller's thread drains the channel, forwards previews
//! and watches the cancellation token.
//!
//! ```text
//! caller thread                     dream-sampler thread
//!   generate() ── spawn ──────────►  latent = noise(seed) | init ⊕ noise
//!   recv loop  ◄── Step(preview) ──  latent += (target - latent) / remaining
//!   on_step()                        ...
//!   cancel? ─── stop flag ────────►  exits at next step
//!   Ok(frame) ◄── Done(frame) ─────
//! ```
//!
//! The target image is derived from a hash of the prompt, a little seeded
//! noise, the init image (weighted by `strength`) and every control guide
//! (non-black pixels, weighted by `scale`). Same request, same pixels.

use crossbeam_channel::{bounded, Receiver};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::entities::frame::Channels;
use crate::entities::{CancelToken, Frame, GenerationRequest, GenerativeBackend, NodeError, StepPreview};

/// Name the procedural backend registers under
pub const PROCEDURAL: &str = "procedural";

enum SamplerMsg {
    Step(StepPreview),
    Done(Frame),
}

/// Deterministic sampler for tests, demos and headless runs.
#[derive(Debug, Clone)]
pub struct ProceduralBackend {
    name: String,
    step_delay: Duration,
}

impl Default for ProceduralBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ProceduralBackend {
    pub fn new() -> Self {
        Self {
            name: PROCEDURAL.to_string(),
            step_delay: Duration::ZERO,
        }
    }

    /// Sleep per step, to mimic a real model's latency.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    fn spawn(&self, request: GenerationRequest, stop: Arc<AtomicBool>) -> Result<(Receiver<SamplerMsg>, thread::JoinHandle<()>), NodeError> {
        let (tx, rx) = bounded::<SamplerMsg>(2);
        let delay = self.step_delay;

        let handle = thread::Builder::new()
            .name("dream-sampler".to_string())
            .spawn(move || {
                trace!("Sampler started: {} steps", request.steps);
                let target = target_image(&request);
                let mut latent = initial_latent(&request);

                for step in 1..=request.steps {
                    if stop.load(Ordering::Relaxed) {
                        trace!("Sampler stopped at step {}", step);
                        return;
                    }
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    let remaining = (request.steps - step + 1) as f32;
                    latent = approach(&latent, &target, 1.0 / remaining);

                    let preview = StepPreview {
                        step,
                        steps: request.steps,
                        image: rgba_frame(request.width, request.height, latent.clone()),
                    };
                    // Receiver gone means the caller gave up
                    if tx.send(SamplerMsg::Step(preview)).is_err() {
                        return;
                    }
                }
                let _ = tx.send(SamplerMsg::Done(rgba_frame(request.width, request.height, latent)));
                trace!("Sampler finished");
            })
            .map_err(|e| NodeError::Backend(format!("cannot spawn sampler thread: {}", e)))?;

        Ok((rx, handle))
    }
}

impl GenerativeBackend for ProceduralBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
        on_step: &mut dyn FnMut(StepPreview),
    ) -> Result<Frame, NodeError> {
        if request.width == 0 || request.height == 0 {
            return Err(NodeError::invalid_param("width/height", "image must not be empty"));
        }
        debug!(
            "Procedural: '{}' {}x{} steps={} seed={}",
            request.prompt, request.width, request.height, request.steps, request.seed
        );

        let stop = Arc::new(AtomicBool::new(false));
        let (rx, handle) = self.spawn(request.clone(), Arc::clone(&stop))?;

        let mut result = None;
        for msg in rx.iter() {
            match msg {
                SamplerMsg::Step(preview) => {
                    on_step(preview);
                    if cancel.is_cancelled() {
                        stop.store(true, Ordering::Relaxed);
                        break;
                    }
                }
                SamplerMsg::Done(frame) => {
                    result = Some(frame);
                    break;
                }
            }
        }
        // Unblocks a sender waiting on a full channel
        drop(rx);
        if handle.join().is_err() {
            return Err(NodeError::Backend("sampler thread panicked".to_string()));
        }

        if cancel.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        result.ok_or_else(|| NodeError::Backend("sampler exited without a result".to_string()))
    }
}

fn rgba_frame(width: usize, height: usize, data: Vec<f32>) -> Frame {
    Frame::from_vec(width, height, Channels::Rgba, data).unwrap_or_else(|_| Frame::new(width, height, Channels::Rgba))
}

/// `a + (b - a) * t`, alpha forced to 1.
fn approach(a: &[f32], b: &[f32], t: f32) -> Vec<f32> {
    let mut out = a.to_vec();
    out.par_chunks_mut(4).zip(b.par_chunks(4)).for_each(|(px, target)| {
        for c in 0..3 {
            px[c] += (target[c] - px[c]) * t;
        }
        px[3] = 1.0;
    });
    out
}

fn noise(width: usize, height: usize, seed: u64) -> Vec<f32> {
    let mut data = vec![0.0f32; width * height * 4];
    data.par_chunks_mut(width * 4).enumerate().for_each(|(y, row)| {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(y as u64));
        for px in row.chunks_exact_mut(4) {
            px[0] = rng.r#gen();
            px[1] = rng.r#gen();
            px[2] = rng.r#gen();
            px[3] = 1.0;
        }
    });
    data
}

fn initial_latent(request: &GenerationRequest) -> Vec<f32> {
    let (w, h) = (request.width, request.height);
    let latent = noise(w, h, request.seed);
    match &request.init_image {
        Some(init) => {
            let init = init.to_rgba().resize(w, h);
            approach(init.data(), &latent, request.strength)
        }
        None => latent,
    }
}

/// 64-bit FNV-1a; fixed across builds and toolchains.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |h, &b| {
        (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn prompt_colors(prompt: &str) -> ([f32; 3], [f32; 3]) {
    let bits = fnv1a(prompt.as_bytes());
    let channel = |shift: u32| ((bits >> shift) & 0xFF) as f32 / 255.0;
    (
        [channel(0), channel(8), channel(16)],
        [channel(24), channel(32), channel(40)],
    )
}

fn target_image(request: &GenerationRequest) -> Vec<f32> {
    let (w, h) = (request.width, request.height);
    let (top, bottom) = prompt_colors(&request.prompt);
    let grain = noise(w, h, request.seed ^ 0x5EED);

    let mut data = vec![0.0f32; w * h * 4];
    data.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        let t = if h > 1 { y as f32 / (h - 1) as f32 } else { 0.0 };
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let g = (y * w + x) * 4;
            for c in 0..3 {
                let base = top[c] + (bottom[c] - top[c]) * t;
                px[c] = (base + (grain[g + c] - 0.5) * 0.1).clamp(0.0, 1.0);
            }
            px[3] = 1.0;
        }
    });

    if let Some(init) = &request.init_image {
        let init = init.to_rgba().resize(w, h);
        data = approach(init.data(), &data, request.strength);
    }

    for guide in &request.control {
        let control = guide.image.to_rgba().resize(w, h);
        let weight = guide.scale.clamp(0.0, 1.0);
        data.par_chunks_mut(4).zip(control.data().par_chunks(4)).for_each(|(px, ctl)| {
            if ctl[0] + ctl[1] + ctl[2] > 0.05 {
                for c in 0..3 {
                    px[c] += (ctl[c] - px[c]) * weight;
                }
            }
        });
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ControlGuide;

    fn request(steps: u32) -> GenerationRequest {
        GenerationRequest {
            prompt: "a dancer on a beach".into(),
            negative_prompt: String::new(),
            width: 8,
            height: 6,
            steps,
            seed: 42,
            cfg_scale: 7.0,
            init_image: None,
            strength: 0.75,
            control: vec![],
        }
    }

    fn generate(req: &GenerationRequest) -> (Frame, Vec<u32>) {
        let mut steps = Vec::new();
        let frame = ProceduralBackend::new()
            .generate(req, &CancelToken::new(), &mut |p| steps.push(p.step))
            .unwrap();
        (frame, steps)
    }

    #[test]
    fn test_deterministic_and_ordered() {
        let req = request(4);
        let (a, steps) = generate(&req);
        let (b, _) = generate(&req);
        assert_eq!(a.shape(), (6, 8, 4));
        assert_eq!(a, b);
        assert_eq!(steps, vec![1, 2, 3, 4]);

        let mut other = request(4);
        other.seed = 43;
        assert_ne!(generate(&other).0, a);
    }

    #[test]
    fn test_prompt_hash_is_fixed() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
        let (top, bottom) = prompt_colors("a");
        assert_eq!(top, [0x8c as f32 / 255.0, 0xec as f32 / 255.0, 0x01 as f32 / 255.0]);
        assert_eq!(bottom, [0x86 as f32 / 255.0, 0x4c as f32 / 255.0, 0xdc as f32 / 255.0]);
    }

    #[test]
    fn test_final_step_matches_result() {
        let req = request(3);
        let mut last = None;
        let frame = ProceduralBackend::new()
            .generate(&req, &CancelToken::new(), &mut |p| last = Some(p.image))
            .unwrap();
        assert_eq!(last, Some(frame));
    }

    #[test]
    fn test_control_guide_applied() {
        let mut req = request(2);
        req.control.push(ControlGuide {
            model: "openpose".into(),
            image: Frame::solid(8, 6, [1.0, 0.0, 0.0, 1.0]),
            scale: 1.0,
        });
        let (frame, _) = generate(&req);
        let px = frame.pixel(3, 3);
        for (got, want) in px.iter().zip([1.0, 0.0, 0.0, 1.0]) {
            assert!((got - want).abs() < 1e-5, "{:?}", px);
        }
    }

    #[test]
    fn test_cancel_stops_sampling() {
        let req = request(50);
        let cancel = CancelToken::new();
        let mut seen = 0;
        let result = ProceduralBackend::new().generate(&req, &cancel, &mut |_| {
            seen += 1;
            if seen == 2 {
                cancel.cancel();
            }
        });
        assert!(matches!(result, Err(NodeError::Cancelled)));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_empty_size_rejected() {
        let mut req = request(1);
        req.width = 0;
        let result = ProceduralBackend::new().generate(&req, &CancelToken::new(), &mut |_| {});
        assert!(matches!(result, Err(NodeError::InvalidParameter { .. })));
    }
}

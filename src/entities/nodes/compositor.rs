//! Image operations: blend two images, brightness/contrast, resize.
//!
//! Blend modes follow the usual layer compositing set. `Mix` treats `a` as
//! the bottom layer and `b` as the top layer, with `factor` acting as the top
//! layer's opacity:
//!
//! `result = a * (1 - b.alpha * factor) + blend(a, b) * b.alpha * factor`

use log::trace;
use rayon::prelude::*;

use crate::entities::attrs::Attrs;
use crate::entities::frame::{Channels, Frame};
use crate::entities::keys::*;
use crate::entities::node::{ComputeContext, Inputs, NodeCompute, NodeError, Outputs};
use crate::entities::socket::{Literal, SocketDef, SocketType};
use crate::entities::value::Value;

const IMAGE_OUT: &[SocketDef] = &[SocketDef::output(S_IMAGE, SocketType::Image)];

/// Layer blend modes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Screen,
    Add,
    Subtract,
    Multiply,
    Divide,
    Difference,
}

impl BlendMode {
    pub fn parse(name: &str) -> Option<BlendMode> {
        Some(match name.to_ascii_lowercase().as_str() {
            "normal" | "mix" => BlendMode::Normal,
            "screen" => BlendMode::Screen,
            "add" => BlendMode::Add,
            "subtract" => BlendMode::Subtract,
            "multiply" => BlendMode::Multiply,
            "divide" => BlendMode::Divide,
            "difference" => BlendMode::Difference,
            _ => return None,
        })
    }

    /// Blend one colour channel of `top` over `bottom`.
    pub fn apply(self, bottom: f32, top: f32) -> f32 {
        let t = top.clamp(0.0, 1.0);
        let b = bottom.clamp(0.0, 1.0);
        match self {
            BlendMode::Normal => t,
            BlendMode::Screen => 1.0 - (1.0 - b) * (1.0 - t),
            BlendMode::Add => (b + t).min(1.0),
            BlendMode::Subtract => (b - t).max(0.0),
            BlendMode::Multiply => b * t,
            BlendMode::Divide => {
                if t <= 0.00001 {
                    b
                } else {
                    (b / t).min(1.0)
                }
            }
            BlendMode::Difference => (b - t).abs(),
        }
    }
}

/// Blend `top` over `bottom` (both RGBA, same size) into `result`.
fn blend_rgba(bottom: &[f32], top: &[f32], opacity: f32, mode: BlendMode, result: &mut [f32]) {
    debug_assert_eq!(bottom.len(), top.len());
    debug_assert_eq!(bottom.len(), result.len());

    for i in (0..bottom.len()).step_by(4) {
        let top_alpha = top[i + 3] * opacity;
        let inv_alpha = 1.0 - top_alpha;
        for c in 0..3 {
            result[i + c] = bottom[i + c] * inv_alpha + mode.apply(bottom[i + c], top[i + c]) * top_alpha;
        }
        result[i + 3] = bottom[i + 3] * inv_alpha + top_alpha;
    }
}

/// Two-image blend. `b` is resized to `a` when their sizes differ.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MixNode;

const MIX_INPUTS: &[SocketDef] = &[
    SocketDef::input(S_A, SocketType::Image),
    SocketDef::input(S_B, SocketType::Image),
    SocketDef::with_default(S_FACTOR, SocketType::Float, Literal::Float(1.0)),
];

impl NodeCompute for MixNode {
    fn type_name(&self) -> &'static str {
        "Mix"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        MIX_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        IMAGE_OUT
    }

    fn compute(&self, params: &Attrs, inputs: &Inputs, _ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let name = params.get_str_or(P_BLEND_MODE, "normal");
        let mode = BlendMode::parse(name)
            .ok_or_else(|| NodeError::invalid_param(P_BLEND_MODE, format!("unknown blend mode '{}'", name)))?;
        let factor = inputs.float(S_FACTOR)?.clamp(0.0, 1.0);

        let bottom = inputs.image(S_A)?.to_rgba();
        let (w, h) = bottom.resolution();
        let mut top = inputs.image(S_B)?.to_rgba();
        if top.resolution() != (w, h) {
            trace!("Mix: resizing b {:?} -> {:?}", top.resolution(), (w, h));
            top = top.resize(w, h);
        }

        let mut out = vec![0.0f32; w * h * 4];
        let row = w.max(1) * 4;
        out.par_chunks_mut(row)
            .zip(bottom.data().par_chunks(row))
            .zip(top.data().par_chunks(row))
            .for_each(|((dst, b), t)| blend_rgba(b, t, factor, mode, dst));

        let frame = Frame::from_vec(w, h, Channels::Rgba, out)?;
        Ok(Outputs::single(S_IMAGE, Value::Image(frame)))
    }
}

/// `out = (v - 0.5) * (1 + contrast) + 0.5 + brightness` on colour channels.
/// Values are not clamped so HDR input survives.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BrightnessContrastNode;

const BC_INPUTS: &[SocketDef] = &[
    SocketDef::input(S_IMAGE, SocketType::Image),
    SocketDef::with_default(S_BRIGHTNESS, SocketType::Float, Literal::Float(0.0)),
    SocketDef::with_default(S_CONTRAST, SocketType::Float, Literal::Float(0.0)),
];

impl NodeCompute for BrightnessContrastNode {
    fn type_name(&self) -> &'static str {
        "BrightnessContrast"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        BC_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        IMAGE_OUT
    }

    fn compute(&self, _params: &Attrs, inputs: &Inputs, _ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let frame = inputs.image(S_IMAGE)?;
        let brightness = inputs.float(S_BRIGHTNESS)?;
        let contrast = inputs.float(S_CONTRAST)?;

        if brightness.abs() < 0.0001 && contrast.abs() < 0.0001 {
            return Ok(Outputs::single(S_IMAGE, Value::Image(frame.clone())));
        }

        let cf = 1.0 + contrast;
        let adjust = |v: f32| (v - 0.5) * cf + 0.5 + brightness;
        let mut data = frame.data().to_vec();
        match frame.channels() {
            Channels::Gray => data.par_iter_mut().for_each(|v| *v = adjust(*v)),
            // Alpha unchanged
            Channels::Rgba => data.par_chunks_mut(4).for_each(|px| {
                px[0] = adjust(px[0]);
                px[1] = adjust(px[1]);
                px[2] = adjust(px[2]);
            }),
        }

        let out = Frame::from_vec(frame.width(), frame.height(), frame.channels(), data)?;
        Ok(Outputs::single(S_IMAGE, Value::Image(out)))
    }
}

/// Bilinear resize; 0 for either side means scene resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResizeNode;

const RESIZE_INPUTS: &[SocketDef] = &[
    SocketDef::input(S_IMAGE, SocketType::Image),
    SocketDef::with_default(S_WIDTH, SocketType::Int, Literal::Int(0)),
    SocketDef::with_default(S_HEIGHT, SocketType::Int, Literal::Int(0)),
];

impl NodeCompute for ResizeNode {
    fn type_name(&self) -> &'static str {
        "Resize"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        RESIZE_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        IMAGE_OUT
    }

    fn compute(&self, _params: &Attrs, inputs: &Inputs, ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let (w, h) = ctx.size_or_scene(inputs.int(S_WIDTH)?, inputs.int(S_HEIGHT)?)?;
        let frame = inputs.image(S_IMAGE)?.resize(w, h);
        Ok(Outputs::single(S_IMAGE, Value::Image(frame)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::nodes::testing::{run, scene};
    use crate::entities::traits::BackendRegistry;

    fn image_out(out: Result<Outputs, NodeError>) -> Frame {
        match out.unwrap().get(S_IMAGE) {
            Some(Value::Image(f)) => f.clone(),
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_blend_modes() {
        assert_eq!(BlendMode::Normal.apply(0.2, 0.8), 0.8);
        assert_eq!(BlendMode::Add.apply(0.7, 0.6), 1.0);
        assert_eq!(BlendMode::Subtract.apply(0.2, 0.6), 0.0);
        assert_eq!(BlendMode::Multiply.apply(0.5, 0.5), 0.25);
        assert_eq!(BlendMode::Divide.apply(0.5, 0.0), 0.5);
        assert_eq!(BlendMode::Screen.apply(0.5, 0.5), 0.75);
        assert_eq!(BlendMode::parse("DIFFERENCE"), Some(BlendMode::Difference));
        assert_eq!(BlendMode::parse("overlay"), None);
    }

    #[test]
    fn test_mix_half_factor() {
        let mut params = Attrs::new();
        params.set(P_BLEND_MODE, "normal");
        let mut inputs = Inputs::new();
        inputs.insert(S_A, Value::Image(Frame::filled(4, 4, 0.0)));
        // Different size: resized to a
        inputs.insert(S_B, Value::Image(Frame::filled(2, 2, 1.0)));
        inputs.insert(S_FACTOR, Value::Float(0.5));

        let (out, _) = run(&MixNode, &params, &inputs, &scene(1, 1), &BackendRegistry::new());
        let frame = image_out(out);
        assert_eq!(frame.shape(), (4, 4, 4));
        let px = frame.pixel(2, 3);
        assert!((px[0] - 0.5).abs() < 1e-6);
        assert!((px[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mix_rejects_unknown_mode() {
        let mut params = Attrs::new();
        params.set(P_BLEND_MODE, "overlay");
        let mut inputs = Inputs::new();
        inputs.insert(S_A, Value::Image(Frame::filled(1, 1, 0.0)));
        inputs.insert(S_B, Value::Image(Frame::filled(1, 1, 0.0)));
        inputs.insert(S_FACTOR, Value::Float(1.0));
        let (out, _) = run(&MixNode, &params, &inputs, &scene(1, 1), &BackendRegistry::new());
        assert!(matches!(out, Err(NodeError::InvalidParameter { .. })));
    }

    #[test]
    fn test_brightness_contrast_keeps_alpha() {
        let mut inputs = Inputs::new();
        inputs.insert(S_IMAGE, Value::Image(Frame::solid(2, 2, [0.5, 0.25, 0.75, 0.5])));
        inputs.insert(S_BRIGHTNESS, Value::Float(0.1));
        inputs.insert(S_CONTRAST, Value::Float(1.0));

        let (out, _) = run(&BrightnessContrastNode, &Attrs::new(), &inputs, &scene(1, 1), &BackendRegistry::new());
        let px = image_out(out).pixel(0, 0);
        assert!((px[0] - 0.6).abs() < 1e-6);
        assert!((px[1] - 0.1).abs() < 1e-6);
        assert!((px[2] - 1.1).abs() < 1e-6);
        assert_eq!(px[3], 0.5);
    }

    #[test]
    fn test_resize_to_scene() {
        let mut inputs = Inputs::new();
        inputs.insert(S_IMAGE, Value::Image(Frame::filled(8, 8, 0.3)));
        inputs.insert(S_WIDTH, Value::Int(0));
        inputs.insert(S_HEIGHT, Value::Int(2));
        let (out, _) = run(&ResizeNode, &Attrs::new(), &inputs, &scene(4, 4), &BackendRegistry::new());
        let frame = image_out(out);
        assert_eq!(frame.shape(), (2, 4, 1));
        assert!(frame.data().iter().all(|v| (v - 0.3).abs() < 1e-6));
    }
}

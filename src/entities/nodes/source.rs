//! Image sources: constant fill, file on disk, seeded noise.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::entities::attrs::Attrs;
use crate::entities::frame::{Channels, Frame};
use crate::entities::keys::*;
use crate::entities::node::{ComputeContext, Inputs, NodeCompute, NodeError, Outputs};
use crate::entities::socket::{Literal, SocketDef, SocketType};
use crate::entities::value::Value;

/// Single-channel image filled with one value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConstantImageNode;

const CONSTANT_INPUTS: &[SocketDef] = &[
    SocketDef::with_default(S_VALUE, SocketType::Float, Literal::Float(0.0)),
    SocketDef::with_default(S_WIDTH, SocketType::Int, Literal::Int(0)),
    SocketDef::with_default(S_HEIGHT, SocketType::Int, Literal::Int(0)),
];
const IMAGE_OUT: &[SocketDef] = &[SocketDef::output(S_IMAGE, SocketType::Image)];

impl NodeCompute for ConstantImageNode {
    fn type_name(&self) -> &'static str {
        "ConstantImage"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        CONSTANT_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        IMAGE_OUT
    }

    fn compute(&self, _params: &Attrs, inputs: &Inputs, ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let (w, h) = ctx.size_or_scene(inputs.int(S_WIDTH)?, inputs.int(S_HEIGHT)?)?;
        let frame = Frame::filled(w, h, inputs.float(S_VALUE)?);
        Ok(Outputs::single(S_IMAGE, frame.into()))
    }
}

/// Image loaded from disk (PNG, JPEG, EXR, ...), always RGBA.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImageFileNode;

const FILE_INPUTS: &[SocketDef] = &[SocketDef::with_default(S_PATH, SocketType::String, Literal::Str(""))];

impl NodeCompute for ImageFileNode {
    fn type_name(&self) -> &'static str {
        "ImageFile"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        FILE_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        IMAGE_OUT
    }

    fn compute(&self, _params: &Attrs, inputs: &Inputs, _ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let path = inputs.string(S_PATH)?;
        if path.is_empty() {
            return Err(NodeError::invalid_param(S_PATH, "no file given"));
        }
        let frame = Frame::load(path)?;
        debug!("ImageFile: loaded {} ({}x{})", path, frame.width(), frame.height());
        Ok(Outputs::single(S_IMAGE, frame.into()))
    }
}

/// Uniform white noise in [0, 1), reproducible per seed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NoiseNode;

const NOISE_INPUTS: &[SocketDef] = &[
    SocketDef::with_default(S_SEED, SocketType::Int, Literal::Int(0)),
    SocketDef::with_default(S_WIDTH, SocketType::Int, Literal::Int(0)),
    SocketDef::with_default(S_HEIGHT, SocketType::Int, Literal::Int(0)),
];

/// Per-row seed so rows can be filled in parallel with a stable result.
fn row_seed(seed: i32, row: usize) -> u64 {
    (seed as u32 as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(row as u64)
}

impl NodeCompute for NoiseNode {
    fn type_name(&self) -> &'static str {
        "Noise"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        NOISE_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        IMAGE_OUT
    }

    fn compute(&self, _params: &Attrs, inputs: &Inputs, ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let seed = inputs.int(S_SEED)?;
        let (w, h) = ctx.size_or_scene(inputs.int(S_WIDTH)?, inputs.int(S_HEIGHT)?)?;

        let mut data = vec![0.0f32; w * h];
        data.par_chunks_mut(w.max(1)).enumerate().for_each(|(y, row)| {
            let mut rng = StdRng::seed_from_u64(row_seed(seed, y));
            for v in row.iter_mut() {
                *v = rng.r#gen::<f32>();
            }
        });

        let frame = Frame::from_vec(w, h, Channels::Gray, data)?;
        Ok(Outputs::single(S_IMAGE, Value::Image(frame)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::nodes::testing::{run, scene};
    use crate::entities::traits::BackendRegistry;

    #[test]
    fn test_constant_uses_scene_resolution_when_zero() {
        let mut inputs = Inputs::new();
        inputs.insert(S_VALUE, Value::Float(0.5));
        inputs.insert(S_WIDTH, Value::Int(0));
        inputs.insert(S_HEIGHT, Value::Int(0));

        let (out, partials) = run(&ConstantImageNode, &Attrs::new(), &inputs, &scene(32, 16), &BackendRegistry::new());
        let out = out.unwrap();
        assert!(partials.is_empty());
        match out.get(S_IMAGE) {
            Some(Value::Image(f)) => {
                assert_eq!(f.shape(), (16, 32, 1));
                assert!(f.data().iter().all(|v| *v == 0.5));
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_negative_size_rejected() {
        let mut inputs = Inputs::new();
        inputs.insert(S_VALUE, Value::Float(0.5));
        inputs.insert(S_WIDTH, Value::Int(-4));
        inputs.insert(S_HEIGHT, Value::Int(4));

        let (out, _) = run(&ConstantImageNode, &Attrs::new(), &inputs, &scene(8, 8), &BackendRegistry::new());
        assert!(matches!(out, Err(NodeError::InvalidParameter { .. })));
    }

    #[test]
    fn test_noise_deterministic_per_seed() {
        let noise = |seed: i32| {
            let mut inputs = Inputs::new();
            inputs.insert(S_SEED, Value::Int(seed));
            inputs.insert(S_WIDTH, Value::Int(16));
            inputs.insert(S_HEIGHT, Value::Int(8));
            let (out, _) = run(&NoiseNode, &Attrs::new(), &inputs, &scene(1, 1), &BackendRegistry::new());
            match out.unwrap().get(S_IMAGE) {
                Some(Value::Image(f)) => f.clone(),
                other => panic!("unexpected output {:?}", other),
            }
        };

        let a = noise(7);
        assert_eq!(a.shape(), (8, 16, 1));
        assert_eq!(a, noise(7));
        assert_ne!(a, noise(8));
        assert!(a.data().iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn test_image_file_requires_path() {
        let mut inputs = Inputs::new();
        inputs.insert(S_PATH, Value::String(String::new()));
        let (out, _) = run(&ImageFileNode, &Attrs::new(), &inputs, &scene(1, 1), &BackendRegistry::new());
        assert!(matches!(out, Err(NodeError::InvalidParameter { .. })));
    }

    #[test]
    fn test_image_file_loads_png() {
        let path = std::env::temp_dir().join(format!("dream_engine_src_{}.png", std::process::id()));
        Frame::solid(3, 2, [1.0, 0.0, 0.0, 1.0]).save_png(&path).unwrap();

        let mut inputs = Inputs::new();
        inputs.insert(S_PATH, Value::String(path.to_string_lossy().into_owned()));
        let (out, _) = run(&ImageFileNode, &Attrs::new(), &inputs, &scene(1, 1), &BackendRegistry::new());
        let _ = std::fs::remove_file(&path);

        match out.unwrap().get(S_IMAGE) {
            Some(Value::Image(f)) => {
                assert_eq!(f.shape(), (2, 3, 4));
                assert_eq!(f.pixel(1, 1), [1.0, 0.0, 0.0, 1.0]);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }
}

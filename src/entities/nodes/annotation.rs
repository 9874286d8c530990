//! Pose annotation and conditioning nodes.
//!
//! `OpenPose` turns annotated armatures into a keypoint map at render
//! resolution. `ControlNet` pairs a control image with a model name and
//! strength, appending to an incoming conditioning chain.

use log::debug;

use crate::entities::attrs::Attrs;
use crate::entities::keys::*;
use crate::entities::node::{ComputeContext, Inputs, NodeCompute, NodeError, Outputs};
use crate::entities::pose::KeypointMap;
use crate::entities::socket::{Literal, SocketDef, SocketType};
use crate::entities::value::{ControlGuide, Value};

/// Keypoint extraction from the scene's annotated armatures.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OpenPoseNode;

const OPENPOSE_INPUTS: &[SocketDef] = &[SocketDef::with_default(S_ARMATURE, SocketType::String, Literal::Str(""))];
const OPENPOSE_OUT: &[SocketDef] = &[SocketDef::output(S_KEYPOINTS, SocketType::KeypointMap)];

impl NodeCompute for OpenPoseNode {
    fn type_name(&self) -> &'static str {
        "OpenPose"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        OPENPOSE_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        OPENPOSE_OUT
    }

    fn compute(&self, _params: &Attrs, inputs: &Inputs, ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let filter = Some(inputs.string(S_ARMATURE)?).filter(|s| !s.is_empty());
        if let Some(name) = filter {
            if ctx.scene.armature(name).is_none() {
                return Err(NodeError::invalid_param(S_ARMATURE, format!("no armature named '{}'", name)));
            }
        }

        let (w, h) = ctx.resolution();
        let map = KeypointMap::from_scene(ctx.scene, filter, w, h);
        debug!("OpenPose: {} skeleton(s) at {}x{}", map.skeletons.len(), w, h);
        Ok(Outputs::single(S_KEYPOINTS, Value::Keypoints(map)))
    }
}

/// One control guide appended to the incoming chain.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControlNetNode;

const CONTROLNET_INPUTS: &[SocketDef] = &[
    SocketDef::input(S_CONTROL_IMAGE, SocketType::Image),
    SocketDef::with_default(S_CONDITIONING_SCALE, SocketType::Float, Literal::Float(1.0)),
    SocketDef::optional(S_CONDITIONING, SocketType::Conditioning),
];
const CONTROLNET_OUT: &[SocketDef] = &[SocketDef::output(S_CONDITIONING, SocketType::Conditioning)];

impl NodeCompute for ControlNetNode {
    fn type_name(&self) -> &'static str {
        "ControlNet"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        CONTROLNET_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        CONTROLNET_OUT
    }

    fn compute(&self, params: &Attrs, inputs: &Inputs, _ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let scale = inputs.float(S_CONDITIONING_SCALE)?;
        if scale < 0.0 {
            return Err(NodeError::invalid_param(S_CONDITIONING_SCALE, "must not be negative"));
        }

        let mut chain = inputs.conditioning(S_CONDITIONING)?.to_vec();
        chain.push(ControlGuide {
            model: params.get_str_or(P_MODEL, "openpose").to_string(),
            image: inputs.image(S_CONTROL_IMAGE)?.to_rgba(),
            scale,
        });
        Ok(Outputs::single(S_CONDITIONING, Value::Conditioning(chain)))
    }
}

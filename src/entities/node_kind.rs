//! NodeKind - enum wrapper for all built-in node types.
//!
//! Dispatch goes through `enum_dispatch`, so adding a kind means adding a
//! variant here and implementing `NodeCompute` for its struct.

use enum_dispatch::enum_dispatch;

use super::attrs::Attrs;
use super::node::{ComputeContext, Inputs, NodeCompute, NodeError, Outputs};
use super::nodes::annotation::{ControlNetNode, OpenPoseNode};
use super::nodes::compositor::{BrightnessContrastNode, MixNode, ResizeNode};
use super::nodes::generate::GenerateNode;
use super::nodes::output::GroupOutputNode;
use super::nodes::scalar::{MathNode, RandomValueNode, ValueNode};
use super::nodes::scene_info::RenderPropertiesNode;
use super::nodes::source::{ConstantImageNode, ImageFileNode, NoiseNode};
use super::socket::SocketDef;

/// All node types a tree can hold.
#[enum_dispatch(NodeCompute)]
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    GroupOutput(GroupOutputNode),
    ConstantImage(ConstantImageNode),
    ImageFile(ImageFileNode),
    Noise(NoiseNode),
    Value(ValueNode),
    Math(MathNode),
    RandomValue(RandomValueNode),
    Mix(MixNode),
    BrightnessContrast(BrightnessContrastNode),
    Resize(ResizeNode),
    RenderProperties(RenderPropertiesNode),
    OpenPose(OpenPoseNode),
    ControlNet(ControlNetNode),
    Generate(GenerateNode),
}

impl NodeKind {
    /// Every kind once, in menu order
    pub fn all() -> Vec<NodeKind> {
        vec![
            GroupOutputNode.into(),
            ConstantImageNode.into(),
            ImageFileNode.into(),
            NoiseNode.into(),
            ValueNode.into(),
            MathNode.into(),
            RandomValueNode.into(),
            MixNode.into(),
            BrightnessContrastNode.into(),
            ResizeNode.into(),
            RenderPropertiesNode.into(),
            OpenPoseNode.into(),
            ControlNetNode.into(),
            GenerateNode.into(),
        ]
    }

    /// Inverse of `NodeCompute::type_name`, used when loading saved trees.
    pub fn from_type_name(name: &str) -> Option<NodeKind> {
        Self::all().into_iter().find(|k| k.type_name() == name)
    }

    pub fn is_output(&self) -> bool {
        matches!(self, NodeKind::GroupOutput(_))
    }
}

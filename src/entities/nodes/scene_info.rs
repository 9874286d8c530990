//! Scene information as node outputs.

use crate::entities::attrs::Attrs;
use crate::entities::keys::*;
use crate::entities::node::{ComputeContext, Inputs, NodeCompute, NodeError, Outputs};
use crate::entities::socket::{SocketDef, SocketType};
use crate::entities::value::Value;

/// Effective render resolution and current frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderPropertiesNode;

const RENDER_PROPS_OUT: &[SocketDef] = &[
    SocketDef::output(S_RESOLUTION_X, SocketType::Int),
    SocketDef::output(S_RESOLUTION_Y, SocketType::Int),
    SocketDef::output(S_FRAME, SocketType::Int),
];

impl NodeCompute for RenderPropertiesNode {
    fn type_name(&self) -> &'static str {
        "RenderProperties"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        &[]
    }

    fn outputs(&self) -> &'static [SocketDef] {
        RENDER_PROPS_OUT
    }

    fn compute(&self, _params: &Attrs, _inputs: &Inputs, ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let (w, h) = ctx.resolution();
        Ok(Outputs::new()
            .with(S_RESOLUTION_X, Value::Int(w as i32))
            .with(S_RESOLUTION_Y, Value::Int(h as i32))
            .with(S_FRAME, Value::Int(ctx.scene.frame)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::nodes::testing::{run, scene};
    use crate::entities::traits::BackendRegistry;

    #[test]
    fn test_reports_effective_resolution() {
        let mut scene = scene(1920, 1080);
        scene.render.resolution_percentage = 50;
        scene.frame = 12;

        let (out, _) = run(&RenderPropertiesNode, &Attrs::new(), &Inputs::new(), &scene, &BackendRegistry::new());
        let out = out.unwrap();
        assert_eq!(out.get(S_RESOLUTION_X), Some(&Value::Int(960)));
        assert_eq!(out.get(S_RESOLUTION_Y), Some(&Value::Int(540)));
        assert_eq!(out.get(S_FRAME), Some(&Value::Int(12)));
    }
}

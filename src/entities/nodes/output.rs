//! Tree output node.

use crate::entities::attrs::Attrs;
use crate::entities::keys::*;
use crate::entities::node::{ComputeContext, Inputs, NodeCompute, NodeError, Outputs};
use crate::entities::socket::{SocketDef, SocketType};
use crate::entities::value::Value;

/// Final image of the tree. Passes its input through unchanged; shape
/// normalization happens in the executor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GroupOutputNode;

const OUTPUT_INPUTS: &[SocketDef] = &[SocketDef::input(S_IMAGE, SocketType::Image)];
const OUTPUT_OUT: &[SocketDef] = &[SocketDef::output(S_IMAGE, SocketType::Image)];

impl NodeCompute for GroupOutputNode {
    fn type_name(&self) -> &'static str {
        "GroupOutput"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        OUTPUT_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        OUTPUT_OUT
    }

    fn compute(&self, _params: &Attrs, inputs: &Inputs, _ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let image = inputs.image(S_IMAGE)?.clone();
        Ok(Outputs::single(S_IMAGE, Value::Image(image)))
    }
}

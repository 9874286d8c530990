//! Scalar nodes: constant value, binary math, seeded random value.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::entities::attrs::Attrs;
use crate::entities::keys::*;
use crate::entities::node::{ComputeContext, Inputs, NodeCompute, NodeError, Outputs};
use crate::entities::socket::{Literal, SocketDef, SocketType};
use crate::entities::value::Value;

const VALUE_OUT: &[SocketDef] = &[SocketDef::output(S_VALUE, SocketType::Float)];

/// Passes a float through; usually driven by its `value` parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ValueNode;

const VALUE_INPUTS: &[SocketDef] = &[SocketDef::with_default(S_VALUE, SocketType::Float, Literal::Float(0.0))];

impl NodeCompute for ValueNode {
    fn type_name(&self) -> &'static str {
        "Value"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        VALUE_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        VALUE_OUT
    }

    fn compute(&self, _params: &Attrs, inputs: &Inputs, _ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        Ok(Outputs::single(S_VALUE, Value::Float(inputs.float(S_VALUE)?)))
    }
}

/// Binary float operation selected by the `operation` parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MathNode;

const MATH_INPUTS: &[SocketDef] = &[
    SocketDef::with_default(S_A, SocketType::Float, Literal::Float(0.0)),
    SocketDef::with_default(S_B, SocketType::Float, Literal::Float(0.0)),
];

/// Math operations by parameter name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Minimum,
    Maximum,
}

impl MathOp {
    pub fn parse(name: &str) -> Option<MathOp> {
        Some(match name.to_ascii_lowercase().as_str() {
            "add" => MathOp::Add,
            "subtract" => MathOp::Subtract,
            "multiply" => MathOp::Multiply,
            "divide" => MathOp::Divide,
            "power" => MathOp::Power,
            "minimum" => MathOp::Minimum,
            "maximum" => MathOp::Maximum,
            _ => return None,
        })
    }

    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            MathOp::Add => a + b,
            MathOp::Subtract => a - b,
            MathOp::Multiply => a * b,
            // Division by zero yields 0, like shader math nodes
            MathOp::Divide => {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }
            MathOp::Power => a.powf(b),
            MathOp::Minimum => a.min(b),
            MathOp::Maximum => a.max(b),
        }
    }
}

impl NodeCompute for MathNode {
    fn type_name(&self) -> &'static str {
        "Math"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        MATH_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        VALUE_OUT
    }

    fn compute(&self, params: &Attrs, inputs: &Inputs, _ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let name = params.get_str_or(P_OPERATION, "add");
        let op = MathOp::parse(name)
            .ok_or_else(|| NodeError::invalid_param(P_OPERATION, format!("unknown operation '{}'", name)))?;
        let result = op.apply(inputs.float(S_A)?, inputs.float(S_B)?);
        Ok(Outputs::single(S_VALUE, Value::Float(result)))
    }
}

/// Uniform float in `[min, max)`, reproducible per seed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RandomValueNode;

const RANDOM_INPUTS: &[SocketDef] = &[
    SocketDef::with_default(S_MIN, SocketType::Float, Literal::Float(0.0)),
    SocketDef::with_default(S_MAX, SocketType::Float, Literal::Float(1.0)),
    SocketDef::with_default(S_SEED, SocketType::Int, Literal::Int(0)),
];

impl NodeCompute for RandomValueNode {
    fn type_name(&self) -> &'static str {
        "RandomValue"
    }

    fn inputs(&self) -> &'static [SocketDef] {
        RANDOM_INPUTS
    }

    fn outputs(&self) -> &'static [SocketDef] {
        VALUE_OUT
    }

    fn compute(&self, _params: &Attrs, inputs: &Inputs, _ctx: &mut ComputeContext<'_>) -> Result<Outputs, NodeError> {
        let (min, max) = (inputs.float(S_MIN)?, inputs.float(S_MAX)?);
        if max < min {
            return Err(NodeError::invalid_param(S_MAX, format!("{} is below min {}", max, min)));
        }
        let mut rng = StdRng::seed_from_u64(inputs.int(S_SEED)? as u32 as u64);
        let t: f32 = rng.r#gen();
        Ok(Outputs::single(S_VALUE, Value::Float(min + (max - min) * t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::nodes::testing::{run, scene};
    use crate::entities::traits::BackendRegistry;

    fn math(op: &str, a: f32, b: f32) -> Result<f32, NodeError> {
        let mut params = Attrs::new();
        params.set(P_OPERATION, op);
        let mut inputs = Inputs::new();
        inputs.insert(S_A, Value::Float(a));
        inputs.insert(S_B, Value::Float(b));
        let (out, _) = run(&MathNode, &params, &inputs, &scene(1, 1), &BackendRegistry::new());
        match out?.get(S_VALUE) {
            Some(Value::Float(v)) => Ok(*v),
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_math_operations() {
        assert_eq!(math("add", 2.0, 3.0).unwrap(), 5.0);
        assert_eq!(math("Subtract", 2.0, 3.0).unwrap(), -1.0);
        assert_eq!(math("multiply", 2.0, 3.0).unwrap(), 6.0);
        assert_eq!(math("divide", 3.0, 0.0).unwrap(), 0.0);
        assert_eq!(math("power", 2.0, 3.0).unwrap(), 8.0);
        assert_eq!(math("minimum", 2.0, 3.0).unwrap(), 2.0);
        assert_eq!(math("maximum", 2.0, 3.0).unwrap(), 3.0);
        assert!(matches!(math("modulo", 1.0, 1.0), Err(NodeError::InvalidParameter { .. })));
    }

    #[test]
    fn test_random_value_in_range_and_stable() {
        let sample = |seed: i32| {
            let mut inputs = Inputs::new();
            inputs.insert(S_MIN, Value::Float(2.0));
            inputs.insert(S_MAX, Value::Float(4.0));
            inputs.insert(S_SEED, Value::Int(seed));
            let (out, _) = run(&RandomValueNode, &Attrs::new(), &inputs, &scene(1, 1), &BackendRegistry::new());
            match out.unwrap().get(S_VALUE) {
                Some(Value::Float(v)) => *v,
                other => panic!("unexpected output {:?}", other),
            }
        };
        let v = sample(3);
        assert!((2.0..4.0).contains(&v));
        assert_eq!(v, sample(3));
    }
}

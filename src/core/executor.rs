//! Graph executor: validate, order, run.
//!
//! # Run model
//!
//! ```text
//! Executor::new(tree)      validate whole tree, Kahn order, keep reachable
//!   └─ run(scene, ...)     fresh ExecutionContext (cache) per call
//!        for node in order:
//!          cancelled?      -> RunOutcome::Cancelled
//!          node_begin
//!          gather inputs   link (coerced) | param | default
//!          compute         ctx.emit(v) -> node_update(v)
//!          node_update(primary), node_end(primary, progress)
//!          cache outputs   fan-out reads the cache, never recomputes
//!   result = output node's primary output -> Image -> RGBA
//! ```
//!
//! Everything runs on the caller's thread. Nodes may do background work
//! internally but every observer callback happens here.

use log::{debug, info, trace};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::time::Instant;
use uuid::Uuid;

use super::error::{ExecError, ValidationError};
use crate::entities::socket::{coerce, coercion};
use crate::entities::{
    BackendRegistry, CancelToken, ComputeContext, Frame, InputSource, Inputs, Node, NodeCompute, NodeError,
    NodeTree, Outputs, SceneSnapshot, SocketType, Value,
};

/// Run progress after a node finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Fraction in [0, 1]; exactly 1.0 once every node finished.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 || self.completed >= self.total {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

/// Lifecycle callbacks, all invoked on the executor's thread.
pub trait ExecutionObserver {
    fn node_begin(&mut self, _node: &Node) {}

    /// Partial result, or the final primary output right before `node_end`
    fn node_update(&mut self, _node: &Node, _value: &Value) {}

    fn node_end(&mut self, _node: &Node, _value: &Value, _progress: Progress) {}
}

/// No-op observer
impl ExecutionObserver for () {}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Final image, always RGBA
    Finished(Frame),
    Cancelled,
}

/// Per-run state. Created by `Executor::run`, dropped when it returns.
pub struct ExecutionContext<'a> {
    pub scene: &'a SceneSnapshot,
    pub backends: &'a BackendRegistry,
    pub cancel: &'a CancelToken,
    cache: HashMap<Uuid, Outputs>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(scene: &'a SceneSnapshot, backends: &'a BackendRegistry, cancel: &'a CancelToken) -> Self {
        Self {
            scene,
            backends,
            cancel,
            cache: HashMap::new(),
        }
    }

    pub fn cached(&self, id: Uuid) -> Option<&Outputs> {
        self.cache.get(&id)
    }
}

/// Validated execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub output: Uuid,
    /// Reachable nodes, dependencies first
    pub order: Vec<Uuid>,
}

/// Validated tree, ready to run any number of times.
#[derive(Debug)]
pub struct Executor<'t> {
    tree: &'t NodeTree,
    plan: Plan,
}

impl<'t> Executor<'t> {
    pub fn new(tree: &'t NodeTree) -> Result<Self, ValidationError> {
        let plan = plan(tree)?;
        Ok(Self { tree, plan })
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn tree(&self) -> &NodeTree {
        self.tree
    }

    /// Execute every planned node once and return the output image.
    pub fn run(
        &self,
        scene: &SceneSnapshot,
        backends: &BackendRegistry,
        cancel: &CancelToken,
        observer: &mut dyn ExecutionObserver,
    ) -> Result<RunOutcome, ExecError> {
        let start = Instant::now();
        let mut ctx = ExecutionContext::new(scene, backends, cancel);
        let total = self.plan.order.len();

        for (i, id) in self.plan.order.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Tree '{}': cancelled after {}/{} nodes", self.tree.name, i, total);
                return Ok(RunOutcome::Cancelled);
            }
            let node = self.tree.node(*id).ok_or(ValidationError::UnknownNode(*id))?;
            trace!("Tree '{}': [{}/{}] {} '{}'", self.tree.name, i + 1, total, node.type_name(), node.name);

            observer.node_begin(node);
            let inputs = self.gather_inputs(node, &ctx)?;

            let result = {
                let mut sink = |value: Value| observer.node_update(node, &value);
                let mut compute_ctx = ComputeContext::new(ctx.scene, ctx.backends, ctx.cancel, &mut sink);
                node.kind.compute(&node.params, &inputs, &mut compute_ctx)
            };
            let outputs = match result {
                Ok(outputs) => outputs,
                Err(NodeError::Cancelled) => {
                    info!("Tree '{}': cancelled inside '{}'", self.tree.name, node.name);
                    return Ok(RunOutcome::Cancelled);
                }
                Err(source) => {
                    return Err(ExecError::NodeCompute {
                        node: node.name.clone(),
                        kind: node.type_name(),
                        source,
                    });
                }
            };

            let primary = primary_value(node, &outputs)?;
            observer.node_update(node, primary);
            observer.node_end(node, primary, Progress { completed: i + 1, total });
            debug!("Tree '{}': '{}' -> {}", self.tree.name, node.name, primary.summary());

            ctx.cache.insert(*id, outputs);
        }

        let frame = self.result(&ctx)?;
        info!(
            "Tree '{}': {} nodes in {:.1} ms -> {}x{}",
            self.tree.name,
            total,
            start.elapsed().as_secs_f64() * 1000.0,
            frame.width(),
            frame.height()
        );
        Ok(RunOutcome::Finished(frame))
    }

    /// Resolve every declared input of `node` for this run.
    fn gather_inputs(&self, node: &Node, ctx: &ExecutionContext<'_>) -> Result<Inputs, ExecError> {
        let resolution = ctx.scene.resolution();
        let mut inputs = Inputs::new();

        for def in node.kind.inputs() {
            let value = match self.tree.resolve_input(node.id, def.name) {
                InputSource::Link(link) => {
                    let upstream = ctx.cache.get(&link.from).and_then(|o| o.get(&link.from_socket));
                    match upstream {
                        Some(v) => v.clone(),
                        None => {
                            let name = self.tree.node(link.from).map(|n| n.name.clone()).unwrap_or_default();
                            return Err(ExecError::MissingOutput {
                                node: name,
                                socket: link.from_socket.clone(),
                            });
                        }
                    }
                }
                InputSource::Literal(v) => v,
                InputSource::Missing => continue,
            };

            let value = coerce(value, def.ty, resolution).map_err(|e| ExecError::NodeCompute {
                node: node.name.clone(),
                kind: node.type_name(),
                source: NodeError::TypeMismatch {
                    socket: def.name.to_string(),
                    source: e,
                },
            })?;
            inputs.insert(def.name, value);
        }
        Ok(inputs)
    }

    fn result(&self, ctx: &ExecutionContext<'_>) -> Result<Frame, ExecError> {
        let node = self
            .tree
            .node(self.plan.output)
            .ok_or(ValidationError::UnknownNode(self.plan.output))?;
        let outputs = ctx.cache.get(&node.id).ok_or_else(|| ExecError::MissingOutput {
            node: node.name.clone(),
            socket: String::new(),
        })?;
        let value = primary_value(node, outputs)?.clone();
        let actual = value.socket_type();

        match coerce(value, SocketType::Image, ctx.scene.resolution()) {
            Ok(Value::Image(frame)) => Ok(frame.to_rgba()),
            _ => Err(ExecError::InvalidResult {
                node: node.name.clone(),
                actual,
            }),
        }
    }
}

fn primary_value<'o>(node: &Node, outputs: &'o Outputs) -> Result<&'o Value, ExecError> {
    let socket = node.primary_output().map(|s| s.name).unwrap_or_default();
    outputs.get(socket).ok_or_else(|| ExecError::MissingOutput {
        node: node.name.clone(),
        socket: socket.to_string(),
    })
}

/// Validate the whole tree and compute the execution order.
pub fn plan(tree: &NodeTree) -> Result<Plan, ValidationError> {
    let output = tree.output_node().ok_or(ValidationError::NoOutput)?.id;
    validate_links(tree)?;
    let order = topo_order(tree)?;

    let reachable = upstream_of(tree, output);
    let order: Vec<Uuid> = order.into_iter().filter(|id| reachable.contains(id)).collect();

    for id in &order {
        if let Some(node) = tree.node(*id) {
            validate_inputs(tree, node)?;
        }
    }

    debug!(
        "Tree '{}': plan {} of {} nodes: [{}]",
        tree.name,
        order.len(),
        tree.len(),
        order
            .iter()
            .filter_map(|id| tree.node(*id).map(|n| n.name.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(Plan { output, order })
}

/// Link endpoints exist, socket directions and types line up, one link per input.
fn validate_links(tree: &NodeTree) -> Result<(), ValidationError> {
    let mut seen_inputs = HashSet::new();
    for link in tree.links() {
        let src = tree.node(link.from).ok_or(ValidationError::UnknownNode(link.from))?;
        let dst = tree.node(link.to).ok_or(ValidationError::UnknownNode(link.to))?;

        let out_def = src.output(&link.from_socket).ok_or_else(|| ValidationError::UnknownSocket {
            node: src.name.clone(),
            socket: link.from_socket.clone(),
            direction: "output",
        })?;
        let in_def = dst.input(&link.to_socket).ok_or_else(|| ValidationError::UnknownSocket {
            node: dst.name.clone(),
            socket: link.to_socket.clone(),
            direction: "input",
        })?;
        if coercion(out_def.ty, in_def.ty).is_none() {
            return Err(ValidationError::Incompatible {
                from_node: src.name.clone(),
                from_socket: link.from_socket.clone(),
                from: out_def.ty,
                to_node: dst.name.clone(),
                to_socket: link.to_socket.clone(),
                to: in_def.ty,
            });
        }
        if !seen_inputs.insert((link.to, link.to_socket.as_str())) {
            return Err(ValidationError::DuplicateLink {
                node: dst.name.clone(),
                socket: link.to_socket.clone(),
            });
        }
    }
    Ok(())
}

/// Kahn's algorithm over the whole tree. Sources come first in insertion
/// order; nodes released later tie-break on insertion order too.
fn topo_order(tree: &NodeTree) -> Result<Vec<Uuid>, ValidationError> {
    let ids: Vec<Uuid> = tree.nodes().map(|n| n.id).collect();
    let mut in_degree = vec![0usize; ids.len()];
    let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];

    for link in tree.links() {
        // Endpoints checked by validate_links
        if let (Some(from), Some(to)) = (tree.index_of(link.from), tree.index_of(link.to)) {
            in_degree[to] += 1;
            downstream[from].push(to);
        }
    }

    let sources: Vec<usize> = (0..ids.len()).filter(|i| in_degree[*i] == 0).collect();
    let mut ready = BTreeSet::new();
    let mut order = Vec::with_capacity(ids.len());
    let release = |i: usize, in_degree: &mut [usize], ready: &mut BTreeSet<usize>| {
        for &d in &downstream[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(d);
            }
        }
    };

    for &i in &sources {
        order.push(ids[i]);
        release(i, &mut in_degree, &mut ready);
    }
    while let Some(i) = ready.pop_first() {
        order.push(ids[i]);
        release(i, &mut in_degree, &mut ready);
    }

    if order.len() < ids.len() {
        let nodes = (0..ids.len())
            .filter(|i| in_degree[*i] > 0)
            .filter_map(|i| tree.node(ids[i]).map(|n| n.name.clone()))
            .collect();
        return Err(ValidationError::Cycle { nodes });
    }
    Ok(order)
}

/// `output` and everything it depends on.
fn upstream_of(tree: &NodeTree, output: Uuid) -> HashSet<Uuid> {
    let mut seen = HashSet::from([output]);
    let mut queue = VecDeque::from([output]);
    while let Some(id) = queue.pop_front() {
        for dep in tree.dependencies(id) {
            if seen.insert(dep) {
                queue.push_back(dep);
            }
        }
    }
    seen
}

/// Required inputs resolve; literal parameters fit their socket.
fn validate_inputs(tree: &NodeTree, node: &Node) -> Result<(), ValidationError> {
    for def in node.kind.inputs() {
        if tree.input_link(node.id, def.name).is_none() {
            if let Some(param) = node.params.get(def.name) {
                let found = Value::from_literal(param).socket_type();
                if coercion(found, def.ty).is_none() {
                    return Err(ValidationError::InvalidLiteral {
                        node: node.name.clone(),
                        socket: def.name.to_string(),
                        expected: def.ty,
                        found: found.to_string(),
                    });
                }
            }
        }
        if def.required && tree.resolve_input(node.id, def.name) == InputSource::Missing {
            return Err(ValidationError::UnresolvedInput {
                node: node.name.clone(),
                socket: def.name.to_string(),
            });
        }
    }
    Ok(())
}

/// Validate and run `tree` once.
pub fn execute(
    tree: &NodeTree,
    scene: &SceneSnapshot,
    backends: &BackendRegistry,
    cancel: &CancelToken,
    observer: &mut dyn ExecutionObserver,
) -> Result<RunOutcome, ExecError> {
    Executor::new(tree)?.run(scene, backends, cancel, observer)
}

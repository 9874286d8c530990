//! Entities module - the node graph data model, independent of any host.
//!
//! - `frame`, `value`, `socket`: pixel arrays, runtime values, typed sockets
//! - `node`, `node_kind`, `nodes`: the compute trait and the built-in node library
//! - `tree`: the editable DAG and its JSON form
//! - `scene`, `pose`: read-only scene snapshot and OpenPose keypoint extraction
//! - `traits`: seams implemented by `core` (generative backends)

pub mod attrs;
pub mod cancel;
pub mod frame;
pub mod keys;
pub mod node;
pub mod node_kind;
pub mod nodes;
pub mod pose;
pub mod scene;
pub mod socket;
pub mod traits;
pub mod tree;
pub mod value;

pub use attrs::{AttrValue, Attrs};
pub use cancel::CancelToken;
pub use frame::{Channels, CropAlign, Frame, FrameError};
pub use node::{ComputeContext, Inputs, Node, NodeCompute, NodeError, Outputs};
pub use node_kind::NodeKind;
pub use pose::{JointRole, KeypointMap, Side};
pub use scene::SceneSnapshot;
pub use socket::{SocketDef, SocketType};
pub use traits::{BackendRegistry, GenerationRequest, GenerativeBackend, StepPreview};
pub use tree::{InputSource, Link, NodeTree, TreeError};
pub use value::{ControlGuide, Value};

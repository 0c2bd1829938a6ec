// Entity Models
// Following the same philosophy as the rest of the crate: "Identity persists, values change"
//
// - Framework: top-level container, identified by a unique external id
// - Node: a level (child of the framework root) or a competency (child of a level)

pub mod framework;
pub mod node;

pub use framework::{Framework, FrameworkDraft, FrameworkId, Scale, ScaleConfiguration, ScaleId};
pub use node::{Node, NodeDraft, NodeId, NodeRole, Parent};

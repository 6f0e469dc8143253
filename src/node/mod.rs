//! Node orchestration: identity, mode routines and lifecycle

pub mod dev;
pub mod identity;
#[allow(clippy::module_inception)]
pub mod node;

pub use dev::{produce, run_generator, synthesize};
pub use identity::NodeIdentity;
pub use node::Node;

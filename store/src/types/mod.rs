//! Value types shared by every layer of the store.

mod constraint;
mod node;

pub use constraint::{Constraint, ConstraintElement, Variable};
pub use node::{COLUMNS, MIN_NODE, NONE, NodeId, Quad};

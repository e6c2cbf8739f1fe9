//! Compiled query plans over signature rows.
//!
//! The planner lowers a parsed query into an immutable [`RowMatchNode`]
//! tree describing which rows to intersect, union, and invert. Nodes live
//! in a caller-supplied [`Arena`]; the tree's lifetime is bounded by the
//! arena's.

pub mod arena;
pub mod codec;
pub mod node;

pub use self::arena::Arena;
pub use self::codec::{ObjectFormatter, ObjectParser, TextObjectFormatter, TextObjectParser};
pub use self::node::{Builder, NodeType, PlanArena, RowMatchNode};

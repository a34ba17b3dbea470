//! Parse-tree arena and tree queries for the pyz type checker.
//!
//! The tree is an arena of nodes with integer indices; every node carries a
//! kind tag, a span, and a parent index. Parsing is out of scope here — trees
//! are materialized through `TreeBuilder` by the host (or by tests).
//!
//! Submodules:
//! - `node` - `NodeArena`, `NodeIndex`, `SyntaxKind`, per-kind payloads
//! - `builder` - `TreeBuilder` for programmatic construction
//! - `tree_utils` - pure tree predicates (enclosing scopes, expression
//!   matching, write-access detection, docstrings, statement ranges,
//!   call/active-argument mapping)

pub mod builder;
pub mod node;
pub mod tree_utils;

pub use builder::TreeBuilder;
pub use node::{
    ArgumentCategory, BinaryOperator, ConstantKind, Node, NodeArena, NodeIndex, NodePayload,
    StringKind, SyntaxKind, UnaryOperator,
};

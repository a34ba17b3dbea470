//! Narrowing-callback construction.
//!
//! This crate holds the syntactic half of the narrowing engine: given a
//! reference expression and a test expression known to have evaluated truthy
//! (or falsy) on the current control-flow edge, it compiles the test into an
//! AST-agnostic `TypeGuard` and hands back a `NarrowingCallback` — a pure
//! `Type -> Type` function the checker applies to the reference's pre-edge
//! type. Guard application itself lives in `pyz_solver::narrow`.
//!
//! The evaluator consumes three capabilities: the parse-tree arena, the type
//! interner, and a node-type table mapping already-evaluated expressions to
//! their types (the checker computes those types; narrowing only reads
//! them).

mod guards;

use rustc_hash::FxHashMap;

use pyz_solver::intern::TypeInterner;
use pyz_solver::narrow::{NarrowingCallback, NarrowingContext};
use pyz_solver::recursion::{DepthCounter, RecursionProfile};
use pyz_solver::types::TypeId;
use pyz_tree::node::{NodeArena, NodeIndex};

/// Types of already-evaluated expressions, keyed by node index.
pub type NodeTypes = FxHashMap<u32, TypeId>;

pub struct TypeEvaluator<'a> {
    arena: &'a NodeArena,
    interner: &'a TypeInterner,
    node_types: &'a NodeTypes,
}

impl<'a> TypeEvaluator<'a> {
    pub fn new(arena: &'a NodeArena, interner: &'a TypeInterner, node_types: &'a NodeTypes) -> Self {
        Self {
            arena,
            interner,
            node_types,
        }
    }

    pub fn arena(&self) -> &'a NodeArena {
        self.arena
    }

    pub fn interner(&self) -> &'a TypeInterner {
        self.interner
    }

    /// A context for applying the callbacks this evaluator produces.
    pub fn narrowing_context(&self) -> NarrowingContext<'a> {
        NarrowingContext::new(self.interner)
    }

    /// The type the checker recorded for an expression, if any.
    pub fn node_type(&self, idx: NodeIndex) -> Option<TypeId> {
        self.node_types.get(&idx.0).copied()
    }

    /// Compile `(reference, test_expr, is_positive)` into a narrowing
    /// callback, or `None` when the test says nothing about the reference.
    ///
    /// The callback is constructed once per predicate and may be applied to
    /// any number of incoming types.
    pub fn narrowing_callback_for(
        &self,
        reference: NodeIndex,
        test_expr: NodeIndex,
        is_positive: bool,
    ) -> Option<NarrowingCallback> {
        let mut depth = DepthCounter::with_profile(RecursionProfile::Narrowing);
        self.callback_for(reference, test_expr, is_positive, &mut depth)
    }
}

//! Centralized limits and thresholds for the pyz type checker.
//!
//! This module provides shared constants for recursion depths, operation
//! counts, and capacity limits used throughout the codebase. Centralizing
//! these values:
//! - Prevents duplicate definitions with inconsistent values
//! - Documents the rationale for each limit
//!
//! # Solver recursion limits
//!
//! Recursion limits for the solver (subtype checking, type-variable solving,
//! narrowing application) are centralized in
//! `pyz_solver::recursion::RecursionProfile` rather than here. The profiles
//! are the single source of truth for solver recursion.

/// Maximum iterations for any upward or downward walk over the parse tree.
///
/// Every `enclosing_*` query and write-scan loops over parent pointers; a
/// malformed tree with a parent cycle would otherwise hang. Real trees are
/// nowhere near this deep.
pub const MAX_TREE_WALK_ITERATIONS: usize = 1000;

/// Maximum number of union subtypes an inferred type-variable bound may
/// accumulate before widening degrades to `object`.
///
/// Repeatedly assigning distinct types to the same bounded TypeVar grows its
/// narrow bound one union member at a time. Past this threshold the union no
/// longer carries useful information and each further widening re-checks
/// every member against the declared bound, so the solver collapses the
/// bound to `object` instead.
pub const MAX_SUBTYPES_FOR_INFERRED_TYPE: usize = 64;

/// Maximum number of statements scanned when searching a scope for the
/// assignment that defines an aliased condition.
///
/// Aliased-condition narrowing (`cond = x is None` ... `if cond:`) scans the
/// enclosing suite for the alias's assignment and for intervening writes.
/// Suites larger than this forgo the narrowing rather than pay a quadratic
/// scan.
pub const MAX_ALIASED_CONDITION_SCAN: usize = 512;

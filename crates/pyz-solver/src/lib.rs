//! Type model, constraint solver, and narrowing engine for the pyz type
//! checker.
//!
//! This crate is organized into several submodules:
//! - `types` - the tagged sum of type categories and its flag sets
//! - `intern` - `TypeInterner`, structural interning and the builtins table
//! - `type_ops` - subtype traversal, concretisation, conversions
//! - `typevar_context` - per-solve-scope type-variable bindings
//! - `subtype` - the assignability judgment (`SubtypeChecker`)
//! - `solve` - type-variable solving (`assign_type_var`, ParamSpec binding,
//!   expected-type population)
//! - `narrow` - guard application (`TypeGuard`, `NarrowingContext`)
//! - `recursion` - recursion guards and profiles
//! - `diagnostics` - structured mismatch addenda
//! - `display` - human-readable type rendering

pub mod diagnostics;
pub mod display;
pub mod intern;
pub mod narrow;
pub mod recursion;
mod solve;
pub mod subtype;
pub mod type_ops;
pub mod typevar_context;
pub mod types;

pub use diagnostics::{DiagAddendum, MismatchKind};
pub use display::format_type;
pub use intern::{BuiltinClass, Builtins, TypeInterner};
pub use narrow::{NarrowingCallback, NarrowingContext, TypeGuard};
pub use recursion::{DepthCounter, RecursionGuard, RecursionProfile, RecursionResult};
pub use subtype::{AssignFlags, SubtypeChecker};
pub use typevar_context::{ParamSpecEntry, TypeVarContext, TypeVarEntry};
pub use types::{
    ClassFlags, ClassType, FunctionFlags, FunctionType, LiteralValue, NarrowedEntry,
    ParamCategory, ParamInfo, TupleArg, TypeCondition, TypeGuardInfo, TypeId, TypeKey,
    TypeVarFlags, TypeVarScopeId, TypeVarType, TypedDictEntry, TypedDictMember, Variance,
};

#[cfg(test)]
mod tests;

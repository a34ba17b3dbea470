//! Per-solve-scope type-variable bindings.
//!
//! A `TypeVarContext` lives for the duration of one assignability or
//! call-argument-matching task: created by the caller, mutated by the
//! solver, sealed with `lock()`, discarded when the task ends. Entries are
//! keyed by the TypeVar's interned id in instance form; the solver
//! normalizes keys before reading or writing.

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::types::{FunctionFlags, ParamInfo, TypeId, TypeVarScopeId};

/// The pair of monotone bounds tracked for a type variable, plus the
/// literal-retention bit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeVarEntry {
    /// Lower bound of the solution set; only ever widens.
    pub narrow: Option<TypeId>,
    /// Upper bound of the solution set; only ever tightens.
    pub wide: Option<TypeId>,
    /// Keep literal values when solving this variable.
    pub retain_literals: bool,
}

/// A parameter-specification binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamSpecEntry {
    pub params: Vec<ParamInfo>,
    pub flags: FunctionFlags,
    pub scope_id: Option<TypeVarScopeId>,
    /// A ParamSpec the bound parameter list itself came from, if any.
    pub param_spec: Option<TypeId>,
}

#[derive(Clone, Debug, Default)]
pub struct TypeVarContext {
    solve_for_scopes: SmallVec<[TypeVarScopeId; 2]>,
    entries: IndexMap<TypeId, TypeVarEntry, FxBuildHasher>,
    param_specs: IndexMap<TypeId, ParamSpecEntry, FxBuildHasher>,
    locked: bool,
}

impl TypeVarContext {
    pub fn new(scope: TypeVarScopeId) -> Self {
        let mut context = Self::default();
        context.solve_for_scopes.push(scope);
        context
    }

    pub fn with_scopes(scopes: &[TypeVarScopeId]) -> Self {
        let mut context = Self::default();
        context.solve_for_scopes.extend_from_slice(scopes);
        context
    }

    pub fn add_solve_for_scope(&mut self, scope: TypeVarScopeId) {
        if !self.solve_for_scopes.contains(&scope) {
            self.solve_for_scopes.push(scope);
        }
    }

    pub fn has_solve_for_scope(&self, scope: TypeVarScopeId) -> bool {
        self.solve_for_scopes.contains(&scope)
    }

    pub fn solve_for_scopes(&self) -> &[TypeVarScopeId] {
        &self.solve_for_scopes
    }

    pub fn get(&self, type_var: TypeId) -> Option<&TypeVarEntry> {
        self.entries.get(&type_var)
    }

    /// Replace a type variable's entry. On a locked context this is a no-op:
    /// the solver treats a locked context as "validate only".
    pub fn set(
        &mut self,
        type_var: TypeId,
        narrow: Option<TypeId>,
        wide: Option<TypeId>,
        retain_literals: bool,
    ) {
        if self.locked {
            return;
        }
        self.entries.insert(
            type_var,
            TypeVarEntry {
                narrow,
                wide,
                retain_literals,
            },
        );
    }

    pub fn get_param_spec(&self, type_var: TypeId) -> Option<&ParamSpecEntry> {
        self.param_specs.get(&type_var)
    }

    pub fn set_param_spec(&mut self, type_var: TypeId, entry: ParamSpecEntry) {
        if self.locked {
            return;
        }
        self.param_specs.insert(type_var, entry);
    }

    /// Seal the context: all further writes become no-ops.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.param_specs.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeVarEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }
}

//! The constraint solver.
//!
//! `assign_type_var` maintains the pair of monotone bounds tracked per type
//! variable: the narrow bound only widens, the wide bound only tightens, and
//! any update that would break `narrow ⊑ wide` fails without touching the
//! context. Constrained TypeVars bypass the bounds and solve into their
//! closed constraint set instead.

use pyz_common::limits::MAX_SUBTYPES_FOR_INFERRED_TYPE;
use tracing::trace;

use crate::diagnostics::{DiagAddendum, MismatchKind};
use crate::subtype::{AssignFlags, SubtypeChecker};
use crate::type_ops::*;
use crate::typevar_context::{ParamSpecEntry, TypeVarContext};
use crate::types::*;

impl<'a> SubtypeChecker<'a> {
    /// Bind (or validate against) a destination type variable.
    ///
    /// On failure the context is left unchanged; the single write happens at
    /// the end of a successful update and is a no-op on a locked context.
    pub fn assign_type_var(
        &mut self,
        dest: TypeId,
        src: TypeId,
        mut diag: Option<&mut DiagAddendum>,
        ctx: &mut TypeVarContext,
        flags: AssignFlags,
    ) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let interner = self.interner();
        let Some(dest_tv) = interner.type_var_of(dest) else {
            return false;
        };
        if dest_tv.is_param_spec() {
            return self.assign_param_spec(dest, src, diag, ctx);
        }
        let mut src = transform_possible_recursive_type_alias(interner, src);

        // A variadic TypeVar packages a non-unpacked source into a synthetic
        // unpacked tuple.
        if dest_tv.is_variadic() {
            let already_packaged = interner
                .class_of(src)
                .is_some_and(|class| class.is_tuple() && class.tuple_args.is_some());
            if !already_packaged {
                src = interner.tuple_of(&[src]);
            }
        }

        // A bare `type` instance carries no class information; it binds an
        // instantiable TypeVar as Any.
        if dest_tv.is_instantiable
            && let Some(src_class) = interner.class_of(src)
            && src_class.name == interner.builtins().r#type.name
            && !src_class.is_instantiable
            && src_class.type_args.is_none()
        {
            src = TypeId::ANY;
        }

        // Scope check: a TypeVar outside the solve-for set is opaque.
        let in_scope = dest_tv
            .scope_id
            .is_some_and(|scope| ctx.has_solve_for_scope(scope))
            || flags.contains(AssignFlags::IGNORE_TYPE_VAR_SCOPE) && dest_tv.scope_id.is_some();
        if !in_scope {
            if interner.is_any_or_unknown(src) {
                return true;
            }
            if let Some(src_class) = interner.class_of(src)
                && src_class.flags.contains(ClassFlags::DERIVES_FROM_UNKNOWN)
            {
                return true;
            }
            if flags.intersects(
                AssignFlags::REVERSE_TYPE_VAR_MATCHING | AssignFlags::IGNORE_TYPE_VAR_SCOPE,
            ) {
                let concrete_dest = concretize_type(interner, dest);
                let concrete_src = concretize_type(interner, src);
                return self.assign(
                    concrete_dest,
                    concrete_src,
                    None,
                    None,
                    None,
                    AssignFlags::SKIP_SOLVE_TYPE_VARS,
                );
            }
            if !dest_tv.is_synthesized()
                && let Some(diag) = diag.as_deref_mut()
            {
                diag.add(MismatchKind::TypeVarScopeViolation {
                    type_var: dest_tv.name,
                    src,
                });
            }
            return false;
        }

        let key = canonical_type_var_key(interner, dest);
        trace!(?dest, ?src, ?flags, "assign_type_var");
        if !dest_tv.constraints.is_empty() {
            self.assign_constrained_type_var(&dest_tv, key, src, diag, ctx)
        } else {
            self.assign_unconstrained_type_var(&dest_tv, key, src, diag, ctx, flags)
        }
    }

    // =========================================================================
    // Constrained TypeVars
    // =========================================================================

    fn assign_constrained_type_var(
        &mut self,
        dest_tv: &TypeVarType,
        key: TypeId,
        src: TypeId,
        mut diag: Option<&mut DiagAddendum>,
        ctx: &mut TypeVarContext,
    ) -> bool {
        let interner = self.interner();
        let probe = AssignFlags::SKIP_SOLVE_TYPE_VARS;

        // A source TypeVar whose own solution space fits the destination's
        // constraint set binds as itself.
        if let Some(src_tv) = interner.type_var_of(src) {
            let constraints = dest_tv.constraints.clone();
            let acceptable = if !src_tv.constraints.is_empty() {
                src_tv.constraints.iter().all(|&src_constraint| {
                    constraints
                        .iter()
                        .any(|&dest_constraint| {
                            self.assign(dest_constraint, src_constraint, None, None, None, probe)
                        })
                })
            } else if let Some(bound) = src_tv.bound {
                constraints
                    .iter()
                    .any(|&dest_constraint| {
                        self.assign(dest_constraint, bound, None, None, None, probe)
                    })
            } else {
                false
            };
            if acceptable {
                return self.update_constrained_binding(dest_tv, key, src, diag, ctx);
            }
        }

        let constraints = dest_tv.constraints.clone();
        let subtypes = interner.subtypes_of(src);

        // For each source subtype, find the narrowest accepting constraint:
        // among constraints that accept the subtype, one that is not a
        // supertype of another accepting constraint.
        let mut per_subtype: Vec<(TypeId, Option<usize>)> = Vec::with_capacity(subtypes.len());
        for &subtype in &subtypes {
            let accepting: Vec<usize> = (0..constraints.len())
                .filter(|&i| self.assign(constraints[i], subtype, None, None, None, probe))
                .collect();
            let narrowest = accepting
                .iter()
                .copied()
                .find(|&i| {
                    !accepting.iter().any(|&j| {
                        j != i && self.assign(constraints[i], constraints[j], None, None, None, probe)
                    })
                })
                .or_else(|| accepting.first().copied());
            per_subtype.push((subtype, narrowest));
        }

        // All unconditional source subtypes must map to the same constraint
        // (`str | bytes` cannot solve an `AnyStr`-style variable).
        let mut agreed: Option<usize> = None;
        for &(subtype, choice) in &per_subtype {
            let Some(index) = choice else { continue };
            if !self.interner().condition_set(subtype).is_empty() {
                continue;
            }
            match agreed {
                Some(previous) if previous != index => {
                    if let Some(diag) = diag.as_deref_mut() {
                        diag.add(MismatchKind::TypeVarConstraintAmbiguity {
                            type_var: dest_tv.name,
                            first: constraints[previous],
                            second: constraints[index],
                        });
                    }
                    return false;
                }
                _ => agreed = Some(index),
            }
        }

        let some_unmatched = per_subtype.iter().any(|&(_, choice)| choice.is_none());
        let chosen = if some_unmatched || per_subtype.iter().all(|&(_, c)| c.is_none()) {
            // No per-subtype solution; accept a constraint that takes the
            // union as a whole.
            (0..constraints.len())
                .find(|&i| self.assign(constraints[i], src, None, None, None, probe))
        } else {
            agreed.or_else(|| per_subtype.iter().find_map(|&(_, choice)| choice))
        };

        let Some(index) = chosen else {
            if let Some(diag) = diag.as_deref_mut() {
                diag.add(MismatchKind::TypeVarConstraintViolation {
                    type_var: dest_tv.name,
                    src,
                });
            }
            return false;
        };

        let condition = TypeCondition {
            type_var: dest_tv.name,
            constraint_index: index as u32,
        };
        let binding = self
            .interner()
            .with_conditions(constraints[index], std::slice::from_ref(&condition));
        self.update_constrained_binding(dest_tv, key, binding, diag, ctx)
    }

    fn update_constrained_binding(
        &mut self,
        dest_tv: &TypeVarType,
        key: TypeId,
        binding: TypeId,
        mut diag: Option<&mut DiagAddendum>,
        ctx: &mut TypeVarContext,
    ) -> bool {
        let probe = AssignFlags::SKIP_SOLVE_TYPE_VARS;
        let (current, retain) = match ctx.get(key) {
            Some(entry) => (entry.narrow, entry.retain_literals),
            None => (None, false),
        };
        if let Some(current) = current {
            if self.assign(current, binding, None, None, None, probe) {
                // The existing binding already covers the new one.
                return true;
            }
            if self.assign(binding, current, None, None, None, probe) {
                ctx.set(key, Some(binding), None, retain);
                return true;
            }
            if let Some(diag) = diag.as_deref_mut() {
                diag.add(MismatchKind::TypeVarConstraintAmbiguity {
                    type_var: dest_tv.name,
                    first: current,
                    second: binding,
                });
            }
            return false;
        }
        ctx.set(key, Some(binding), None, retain);
        true
    }

    // =========================================================================
    // Unconstrained TypeVars
    // =========================================================================

    fn assign_unconstrained_type_var(
        &mut self,
        dest_tv: &TypeVarType,
        key: TypeId,
        src: TypeId,
        mut diag: Option<&mut DiagAddendum>,
        ctx: &mut TypeVarContext,
        flags: AssignFlags,
    ) -> bool {
        let interner = self.interner();
        let probe = AssignFlags::SKIP_SOLVE_TYPE_VARS;
        let entry = ctx.get(key).cloned();
        let cur_narrow = entry.as_ref().and_then(|e| e.narrow);
        let cur_wide = entry.as_ref().and_then(|e| e.wide);

        // Literal retention is requested by the flag, the context entry, or
        // a literal-bearing declared bound.
        let retain_literals = flags.contains(AssignFlags::RETAIN_LITERALS_FOR_TYPE_VAR)
            || entry.as_ref().is_some_and(|e| e.retain_literals)
            || dest_tv
                .bound
                .is_some_and(|bound| contains_literal(interner, bound));
        let mut adj_src = if retain_literals {
            src
        } else {
            strip_literal_values(interner, src)
        };

        if dest_tv.is_instantiable {
            match interner.to_instantiable(adj_src) {
                Some(converted) => adj_src = converted,
                None => {
                    if let Some(diag) = diag.as_deref_mut() {
                        diag.add(MismatchKind::TypeIncompatible {
                            dest: key,
                            src: adj_src,
                        });
                    }
                    return false;
                }
            }
        }

        let mut new_narrow = cur_narrow;
        let mut new_wide = cur_wide;
        let mut degraded_to_object = false;

        if flags.intersects(
            AssignFlags::REVERSE_TYPE_VAR_MATCHING | AssignFlags::ALLOW_TYPE_VAR_NARROWING,
        ) {
            // Contravariant mode tightens the wide bound.
            match cur_wide {
                None => new_wide = Some(adj_src),
                Some(wide) if wide == adj_src => {}
                Some(wide) => {
                    let concrete_src = concretize_type(interner, adj_src);
                    if self.assign(wide, concrete_src, None, None, None, probe) {
                        new_wide = Some(adj_src);
                    } else if self.assign(adj_src, wide, None, None, None, probe) {
                        // The existing wide bound is already tighter.
                    } else {
                        if let Some(diag) = diag.as_deref_mut() {
                            diag.add(MismatchKind::TypeIncompatible {
                                dest: adj_src,
                                src: wide,
                            });
                        }
                        return false;
                    }
                }
            }
            if let (Some(wide), Some(narrow)) = (new_wide, new_narrow)
                && !self.assign(wide, narrow, None, None, None, probe)
            {
                if let Some(diag) = diag.as_deref_mut() {
                    diag.add(MismatchKind::TypeIncompatible {
                        dest: wide,
                        src: narrow,
                    });
                }
                return false;
            }
        } else {
            // Covariant (default) mode widens the narrow bound.
            match cur_narrow {
                None => new_narrow = Some(adj_src),
                Some(narrow) => {
                    if self.assign(narrow, adj_src, None, None, None, probe) {
                        // Prefer the existing bound; a fully known source
                        // that also covers a partly-unknown existing bound
                        // replaces it.
                        if is_partly_unknown(interner, narrow)
                            && !is_partly_unknown(interner, adj_src)
                            && self.assign(adj_src, narrow, None, None, None, probe)
                        {
                            new_narrow = Some(adj_src);
                        }
                    } else if ctx.is_locked() {
                        if let Some(diag) = diag.as_deref_mut() {
                            diag.add(MismatchKind::LockedContextRefusal {
                                type_var: dest_tv.name,
                                existing: narrow,
                                requested: adj_src,
                            });
                        }
                        return false;
                    } else if dest_tv.is_variadic() {
                        if let Some(diag) = diag.as_deref_mut() {
                            diag.add(MismatchKind::VariadicWideningRefusal {
                                type_var: dest_tv.name,
                            });
                        }
                        return false;
                    } else if interner.subtypes_of(narrow).len() > MAX_SUBTYPES_FOR_INFERRED_TYPE
                        && dest_tv.bound.is_some()
                    {
                        // Pathological union: degrade to object rather than
                        // growing (and re-checking) an enormous union. The
                        // degraded bound stands in for "no useful
                        // information" and bypasses the declared-bound
                        // check.
                        new_narrow = Some(interner.builtins().object.instance);
                        degraded_to_object = true;
                    } else {
                        new_narrow = Some(interner.union2(narrow, adj_src));
                    }
                }
            }
            if let (Some(narrow), Some(wide)) = (new_narrow, new_wide) {
                let concrete_narrow = concretize_type(interner, narrow);
                // A TypeVar wide bound matched exactly or unioned is
                // acceptable without concretisation.
                let ok = self.assign(wide, concrete_narrow, None, None, None, probe)
                    || self.assign(wide, narrow, None, None, None, probe);
                if !ok {
                    if let Some(diag) = diag.as_deref_mut() {
                        diag.add(MismatchKind::TypeIncompatible {
                            dest: wide,
                            src: narrow,
                        });
                    }
                    return false;
                }
            }
        }

        // The surviving bound must satisfy the declared bound. A synthesized
        // `Self` destination reuses the ambient context so the bound itself
        // can bind other type variables.
        if let Some(bound) = dest_tv.bound
            && !degraded_to_object
            && let Some(surviving) = new_narrow.or(new_wide)
        {
            let concrete = concretize_type(self.interner(), surviving);
            let ok = if dest_tv.flags.contains(TypeVarFlags::SYNTHESIZED_SELF) {
                self.assign(
                    bound,
                    concrete,
                    None,
                    Some(&mut *ctx),
                    None,
                    flags & !AssignFlags::REVERSE_TYPE_VAR_MATCHING,
                )
            } else {
                self.assign(bound, concrete, None, None, None, probe)
            };
            if !ok {
                if !dest_tv.is_synthesized()
                    && let Some(diag) = diag.as_deref_mut()
                {
                    diag.add(MismatchKind::TypeVarBoundViolation {
                        type_var: dest_tv.name,
                        bound,
                        actual: concrete,
                    });
                }
                return false;
            }
        }

        ctx.set(key, new_narrow, new_wide, retain_literals);
        true
    }

    // =========================================================================
    // Parameter specifications
    // =========================================================================

    /// Bind a parameter-specification destination: another ParamSpec, a
    /// function type (whose parameter list is extracted), or Any/Unknown.
    pub fn assign_param_spec(
        &mut self,
        dest: TypeId,
        src: TypeId,
        mut diag: Option<&mut DiagAddendum>,
        ctx: &mut TypeVarContext,
    ) -> bool {
        let interner = self.interner();
        let Some(dest_tv) = interner.type_var_of(dest) else {
            return false;
        };
        debug_assert!(dest_tv.is_param_spec());
        let key = canonical_type_var_key(interner, dest);

        if interner.is_any_or_unknown(src) {
            return true;
        }

        match interner.lookup(src) {
            Some(TypeKey::TypeVar(src_tv)) if src_tv.is_param_spec() => {
                let entry = ParamSpecEntry {
                    params: Vec::new(),
                    flags: FunctionFlags::empty(),
                    scope_id: src_tv.scope_id,
                    param_spec: Some(canonical_type_var_key(interner, src)),
                };
                if let Some(existing) = ctx.get_param_spec(key) {
                    if existing.param_spec == entry.param_spec {
                        return true;
                    }
                    if let Some(diag) = diag.as_deref_mut() {
                        diag.add(MismatchKind::ParamSpecSignatureMismatch {
                            param_spec: dest_tv.name,
                        });
                    }
                    return false;
                }
                ctx.set_param_spec(key, entry);
                true
            }
            Some(TypeKey::Function(src_func)) => {
                let entry = ParamSpecEntry {
                    params: src_func.params.clone(),
                    flags: src_func.flags & FunctionFlags::SYNTHESIZED,
                    scope_id: dest_tv.scope_id,
                    param_spec: src_func.param_spec,
                };
                if let Some(existing) = ctx.get_param_spec(key) {
                    let existing_params = existing.params.clone();
                    // Re-binding must match the recorded parameter list under
                    // function equivalence (return type ignored).
                    if self.params_equivalent(&existing_params, &entry.params) {
                        return true;
                    }
                    if let Some(diag) = diag.as_deref_mut() {
                        diag.add(MismatchKind::ParamSpecSignatureMismatch {
                            param_spec: dest_tv.name,
                        });
                    }
                    return false;
                }
                ctx.set_param_spec(key, entry);
                true
            }
            _ => {
                if let Some(diag) = diag.as_deref_mut() {
                    diag.add(MismatchKind::ParamSpecFunctionExpected { src });
                }
                false
            }
        }
    }

    // =========================================================================
    // Expected-type population
    // =========================================================================

    /// Infer type arguments for `target` that make it assignable to the
    /// expected specialized supertype, recording them in `ctx`. Returns
    /// false when any projected argument is absent.
    pub fn populate_context_from_expected_type(
        &mut self,
        target: TypeId,
        expected: TypeId,
        ctx: &mut TypeVarContext,
        live_scopes: &[TypeVarScopeId],
    ) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let interner = self.interner();
        let expected = transform_possible_recursive_type_alias(interner, expected);

        if let Some(TypeKey::Union(members)) = interner.lookup(expected) {
            // A single specialization must be chosen; the first member that
            // fully populates wins.
            return members
                .iter()
                .any(|&member| self.populate_context_from_expected_type(target, member, ctx, live_scopes));
        }

        let Some(target_class) = interner.class_of(target) else {
            return false;
        };
        let Some(expected_class) = interner.class_of(expected) else {
            return false;
        };
        if target_class.type_params.is_empty() {
            return false;
        }

        // Same generic class: copy the specialization directly, respecting
        // declared variance.
        if expected_class.name == target_class.name {
            let Some(expected_args) = expected_class.type_args.as_deref() else {
                return false;
            };
            if expected_args.len() != target_class.type_params.len() {
                return false;
            }
            for (&param, &arg) in target_class.type_params.iter().zip(expected_args.iter()) {
                let Some(arg) = self.transform_expected_for_constructor(arg, live_scopes) else {
                    return false;
                };
                let key = canonical_type_var_key(interner, param);
                let variance = interner
                    .type_var_of(param)
                    .map_or(Variance::Invariant, |tv| tv.variance);
                match variance {
                    Variance::Covariant => ctx.set(key, Some(arg), None, true),
                    Variance::Contravariant => ctx.set(key, None, Some(arg), true),
                    Variance::Invariant => ctx.set(key, Some(arg), Some(arg), true),
                }
            }
            return true;
        }

        // Different classes: synthesize E' over fresh synthetic TypeVars,
        // let the judgment bind them against the target's generic form, and
        // project the bindings back onto the target's TypeVars.
        let Some(expected_args) = expected_class.type_args.clone() else {
            return false;
        };
        let synth_scope = interner.fresh_type_var_scope();
        let mut synth_vars = Vec::with_capacity(expected_args.len());
        for index in 0..expected_args.len() {
            let mut tv = TypeVarType::named(interner.atom(&format!("__expected{index}")));
            tv.scope_id = Some(synth_scope);
            tv.flags = TypeVarFlags::SYNTHESIZED;
            tv.synthesized_index = Some(index as u32);
            synth_vars.push(interner.intern(TypeKey::TypeVar(tv)));
        }
        let mut e_prime = expected_class.clone();
        e_prime.type_args = Some(synth_vars.clone());
        let e_prime_id = interner.intern(TypeKey::Class(e_prime));

        let mut t_prime = target_class.clone();
        t_prime.type_args = Some(
            target_class
                .type_params
                .iter()
                .map(|&param| interner.to_instance(param))
                .collect(),
        );
        let t_prime_id = interner.intern(TypeKey::Class(t_prime));

        let mut synth_ctx = TypeVarContext::new(synth_scope);
        if !self.assign(
            e_prime_id,
            t_prime_id,
            None,
            Some(&mut synth_ctx),
            None,
            AssignFlags::POPULATING_EXPECTED_TYPE,
        ) {
            return false;
        }

        let interner = self.interner();
        for (index, &synth) in synth_vars.iter().enumerate() {
            let synth_key = canonical_type_var_key(interner, synth);
            let Some(entry) = synth_ctx.get(synth_key) else {
                continue;
            };
            let Some(binding) = entry.narrow.or(entry.wide) else {
                continue;
            };
            // A binding that is exactly one of the target's TypeVars
            // projects the expected argument onto it.
            let binding_key = canonical_type_var_key(interner, binding);
            let matching = target_class
                .type_params
                .iter()
                .copied()
                .find(|&param| canonical_type_var_key(interner, param) == binding_key);
            let Some(param) = matching else {
                continue;
            };
            let Some(arg) =
                self.transform_expected_for_constructor(expected_args[index], live_scopes)
            else {
                return false;
            };
            let key = canonical_type_var_key(interner, param);
            let variance = interner
                .type_var_of(param)
                .map_or(Variance::Invariant, |tv| tv.variance);
            match variance {
                Variance::Covariant => ctx.set(key, Some(arg), None, true),
                Variance::Contravariant => ctx.set(key, None, Some(arg), true),
                Variance::Invariant => ctx.set(key, Some(arg), Some(arg), true),
            }
        }

        target_class
            .type_params
            .iter()
            .all(|&param| ctx.get(canonical_type_var_key(interner, param)).is_some())
    }

    /// Keep an expected argument only when every TypeVar it mentions is
    /// live in the caller's scopes; otherwise the projection is unusable.
    fn transform_expected_for_constructor(
        &self,
        expected: TypeId,
        live_scopes: &[TypeVarScopeId],
    ) -> Option<TypeId> {
        let interner = self.interner();
        fn has_dead_type_var(
            interner: &crate::intern::TypeInterner,
            ty: TypeId,
            live_scopes: &[TypeVarScopeId],
            depth: u32,
        ) -> bool {
            if depth > 8 {
                return false;
            }
            match interner.lookup(ty) {
                Some(TypeKey::TypeVar(tv)) => match tv.scope_id {
                    Some(scope) => !live_scopes.contains(&scope),
                    None => true,
                },
                Some(TypeKey::Union(members)) => members
                    .iter()
                    .any(|&m| has_dead_type_var(interner, m, live_scopes, depth + 1)),
                Some(TypeKey::Class(class)) => {
                    class
                        .type_args
                        .iter()
                        .flatten()
                        .any(|&arg| has_dead_type_var(interner, arg, live_scopes, depth + 1))
                        || class
                            .tuple_args
                            .iter()
                            .flatten()
                            .any(|arg| has_dead_type_var(interner, arg.ty, live_scopes, depth + 1))
                }
                _ => false,
            }
        }
        if has_dead_type_var(interner, expected, live_scopes, 0) {
            None
        } else {
            Some(expected)
        }
    }
}

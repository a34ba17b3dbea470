//! Subtype traversal, conversion, and inspection utilities.
//!
//! These are the small, widely shared operations the solver and the
//! narrowing engine are built from: union mapping, top-level TypeVar
//! concretisation, literal stripping, recursive-alias expansion, MRO
//! queries, TypedDict views, and literal enumeration.

use pyz_common::interner::Atom;

use crate::intern::TypeInterner;
use crate::recursion::{DepthCounter, RecursionProfile};
use crate::typevar_context::TypeVarContext;
use crate::types::*;

// =============================================================================
// Aliases
// =============================================================================

/// Expand a recursive-alias placeholder to its registered target. Types must
/// pass through here before any structural inspection; an alias whose target
/// was never registered degrades to `Unknown`.
pub fn transform_possible_recursive_type_alias(interner: &TypeInterner, ty: TypeId) -> TypeId {
    let mut current = ty;
    let mut depth = DepthCounter::with_profile(RecursionProfile::ShallowTraversal);
    loop {
        match interner.lookup(current) {
            Some(TypeKey::Alias(_)) => {
                if !depth.enter() {
                    return TypeId::UNKNOWN;
                }
                match interner.alias_target(current) {
                    Some(target) => current = target,
                    None => return TypeId::UNKNOWN,
                }
            }
            _ => return current,
        }
    }
}

// =============================================================================
// Union traversal
// =============================================================================

/// Apply `f` to each subtype of a (possibly union) type and rebuild the
/// union from the kept results. `None` drops the subtype; dropping every
/// subtype yields `Never`.
pub fn map_subtypes(
    interner: &TypeInterner,
    ty: TypeId,
    mut f: impl FnMut(TypeId) -> Option<TypeId>,
) -> TypeId {
    let subtypes = interner.subtypes_of(ty);
    let mut kept: Vec<TypeId> = Vec::with_capacity(subtypes.len());
    for subtype in subtypes {
        if let Some(mapped) = f(subtype) {
            kept.push(mapped);
        }
    }
    interner.union(kept)
}

pub fn for_each_subtype(interner: &TypeInterner, ty: TypeId, mut f: impl FnMut(TypeId)) {
    for subtype in interner.subtypes_of(ty) {
        f(subtype);
    }
}

/// Like `map_subtypes`, but TypeVar subtypes are expanded first: a
/// constrained TypeVar contributes each constraint tagged with its
/// provenance condition, a bounded TypeVar contributes its bound. `f`
/// receives both the expanded and the original subtype. An optional
/// condition filter restricts which constraint expansions are considered.
pub fn map_subtypes_expand_type_vars(
    interner: &TypeInterner,
    ty: TypeId,
    condition_filter: Option<&[TypeCondition]>,
    mut f: impl FnMut(TypeId, TypeId) -> Option<TypeId>,
) -> TypeId {
    let subtypes = interner.subtypes_of(ty);
    let mut kept: Vec<TypeId> = Vec::new();
    for subtype in subtypes {
        if let Some(tv) = interner.type_var_of(subtype) {
            if !tv.constraints.is_empty() {
                for (index, &constraint) in tv.constraints.iter().enumerate() {
                    let condition = TypeCondition {
                        type_var: tv.name,
                        constraint_index: index as u32,
                    };
                    if let Some(filter) = condition_filter
                        && !filter.contains(&condition)
                    {
                        continue;
                    }
                    let expanded = interner.with_conditions(constraint, &[condition]);
                    if let Some(mapped) = f(expanded, subtype) {
                        kept.push(mapped);
                    }
                }
                continue;
            }
            if let Some(bound) = tv.bound {
                if let Some(mapped) = f(bound, subtype) {
                    kept.push(mapped);
                }
                continue;
            }
        }
        if let Some(mapped) = f(subtype, subtype) {
            kept.push(mapped);
        }
    }
    interner.union(kept)
}

// =============================================================================
// Concretisation and literal handling
// =============================================================================

/// Replace top-level TypeVars by their concrete bounds: the declared bound,
/// the union of the constraints (condition-tagged), or `Unknown` for a
/// fully unconstrained variable.
pub fn concretize_type(interner: &TypeInterner, ty: TypeId) -> TypeId {
    map_subtypes(interner, ty, |subtype| {
        let Some(tv) = interner.type_var_of(subtype) else {
            return Some(subtype);
        };
        if !tv.constraints.is_empty() {
            let tagged: Vec<TypeId> = tv
                .constraints
                .iter()
                .enumerate()
                .map(|(index, &constraint)| {
                    interner.with_conditions(
                        constraint,
                        &[TypeCondition {
                            type_var: tv.name,
                            constraint_index: index as u32,
                        }],
                    )
                })
                .collect();
            return Some(interner.union(tagged));
        }
        Some(tv.bound.unwrap_or(TypeId::UNKNOWN))
    })
}

/// Strip literal values from class-instance subtypes.
pub fn strip_literal_values(interner: &TypeInterner, ty: TypeId) -> TypeId {
    map_subtypes(interner, ty, |subtype| {
        match interner.lookup(subtype) {
            Some(TypeKey::Class(mut class)) if class.literal.is_some() => {
                class.literal = None;
                Some(interner.intern(TypeKey::Class(class)))
            }
            _ => Some(subtype),
        }
    })
}

/// Does any subtype carry a literal value?
pub fn contains_literal(interner: &TypeInterner, ty: TypeId) -> bool {
    let mut found = false;
    for_each_subtype(interner, ty, |subtype| {
        if let Some(class) = interner.class_of(subtype)
            && class.literal.is_some()
        {
            found = true;
        }
    });
    found
}

/// Does the type contain `Unknown` anywhere shallow enough to matter for
/// bound preference (top level, type arguments, tuple elements)?
pub fn is_partly_unknown(interner: &TypeInterner, ty: TypeId) -> bool {
    fn walk(interner: &TypeInterner, ty: TypeId, depth: &mut DepthCounter) -> bool {
        if ty == TypeId::UNKNOWN {
            return true;
        }
        if !depth.enter() {
            return false;
        }
        let result = match interner.lookup(ty) {
            Some(TypeKey::Union(members)) => {
                members.iter().any(|&m| walk(interner, m, depth))
            }
            Some(TypeKey::Class(class)) => {
                if class.flags.contains(ClassFlags::DERIVES_FROM_UNKNOWN) {
                    true
                } else {
                    let in_args = class
                        .type_args
                        .iter()
                        .flatten()
                        .any(|&arg| walk(interner, arg, depth));
                    let in_tuple = class
                        .tuple_args
                        .iter()
                        .flatten()
                        .any(|arg| walk(interner, arg.ty, depth));
                    in_args || in_tuple
                }
            }
            _ => false,
        };
        depth.leave();
        result
    }
    let mut depth = DepthCounter::with_profile(RecursionProfile::ShallowTraversal);
    walk(interner, ty, &mut depth)
}

// =============================================================================
// Class queries
// =============================================================================

pub fn is_object_instance(interner: &TypeInterner, ty: TypeId) -> bool {
    interner.class_of(ty).is_some_and(|class| {
        class.name == interner.builtins().object.name
            && !class.is_instantiable
            && class.literal.is_none()
    })
}

/// Nominal derivation: is `class` the named class, or does its MRO contain
/// it?
pub fn derives_from(interner: &TypeInterner, class: &ClassType, ancestor: Atom) -> bool {
    if class.name == ancestor {
        return true;
    }
    class.mro.iter().any(|&entry| {
        interner
            .class_of(entry)
            .is_some_and(|ancestor_class| ancestor_class.name == ancestor)
    })
}

/// The (specialized) MRO entry with the given name, if any. The class's own
/// shape is returned for its own name.
pub fn find_mro_entry(
    interner: &TypeInterner,
    class: &ClassType,
    name: Atom,
) -> Option<ClassType> {
    if class.name == name {
        return Some(class.clone());
    }
    for &entry in &class.mro {
        if let Some(entry_class) = interner.class_of(entry)
            && entry_class.name == name
        {
            return Some(entry_class);
        }
    }
    None
}

/// Look up a declared member on a class or along its MRO.
pub fn lookup_member(interner: &TypeInterner, class: &ClassType, name: Atom) -> Option<TypeId> {
    if let Some(ty) = class.own_field(name) {
        return Some(ty);
    }
    for &entry in &class.mro {
        if let Some(entry_class) = interner.class_of(entry)
            && let Some(ty) = entry_class.own_field(name)
        {
            return Some(ty);
        }
    }
    None
}

// =============================================================================
// Literal enumeration
// =============================================================================

/// The finite literal space of a class, when it has one: `{True, False}`
/// for `bool`, the member set for enums. Underscore-prefixed enum fields
/// are implementation details, not members.
pub fn enumerate_literal_members(interner: &TypeInterner, ty: TypeId) -> Option<Vec<TypeId>> {
    let class = interner.class_of(ty)?;
    if class.name == interner.builtins().bool.name {
        return Some(vec![
            interner.literal_bool(true),
            interner.literal_bool(false),
        ]);
    }
    if !class.is_enum() {
        return None;
    }
    let mut members = Vec::new();
    for &(field_name, field_ty) in &class.fields {
        let text = interner.resolve_atom(field_name);
        if text.starts_with('_') {
            continue;
        }
        if let Some(field_class) = interner.class_of(field_ty)
            && matches!(field_class.literal, Some(LiteralValue::EnumMember(_)))
            && field_class.name == class.name
        {
            members.push(field_ty);
        }
    }
    Some(members)
}

// =============================================================================
// TypedDict views
// =============================================================================

/// The merged per-key view of a TypedDict: declared entries overlaid with
/// narrowing deltas. Required entries are implicitly provided; a key absent
/// from the narrowed map inherits declared required-ness.
pub fn get_typed_dict_members(
    _interner: &TypeInterner,
    class: &ClassType,
    allow_narrowed: bool,
) -> Vec<(Atom, TypedDictMember)> {
    class
        .td_entries
        .iter()
        .map(|&(key, entry)| {
            let mut member = TypedDictMember {
                value_type: entry.value_type,
                is_required: entry.is_required,
                is_provided: entry.is_required,
            };
            if allow_narrowed
                && let Some(narrowed) = class.narrowed_entry(key)
            {
                member.is_provided = member.is_provided || narrowed.is_provided;
            }
            (key, member)
        })
        .collect()
}

// =============================================================================
// Applying solved bindings
// =============================================================================

/// Replace solved in-scope TypeVars with their narrow (else wide) bound,
/// recursing through unions, type arguments, and tuple elements. Unsolved
/// in-scope variables become `Unknown`.
pub fn apply_solved_type_vars(
    interner: &TypeInterner,
    ty: TypeId,
    context: &TypeVarContext,
) -> TypeId {
    fn apply(
        interner: &TypeInterner,
        ty: TypeId,
        context: &TypeVarContext,
        depth: &mut DepthCounter,
    ) -> TypeId {
        if !depth.enter() {
            return ty;
        }
        let result = match interner.lookup(ty) {
            Some(TypeKey::TypeVar(tv)) => {
                let in_scope = tv
                    .scope_id
                    .is_some_and(|scope| context.has_solve_for_scope(scope));
                if !in_scope {
                    ty
                } else {
                    let key = canonical_type_var_key(interner, ty);
                    match context.get(key) {
                        Some(entry) => entry.narrow.or(entry.wide).unwrap_or(TypeId::UNKNOWN),
                        None => TypeId::UNKNOWN,
                    }
                }
            }
            Some(TypeKey::Union(members)) => {
                let applied = members
                    .into_iter()
                    .map(|m| apply(interner, m, context, depth))
                    .collect();
                interner.union(applied)
            }
            Some(TypeKey::Class(mut class)) => {
                if let Some(args) = class.type_args.take() {
                    class.type_args = Some(
                        args.into_iter()
                            .map(|arg| apply(interner, arg, context, depth))
                            .collect(),
                    );
                }
                if let Some(args) = class.tuple_args.take() {
                    class.tuple_args = Some(
                        args.into_iter()
                            .map(|mut arg| {
                                arg.ty = apply(interner, arg.ty, context, depth);
                                arg
                            })
                            .collect(),
                    );
                }
                interner.intern(TypeKey::Class(class))
            }
            _ => ty,
        };
        depth.leave();
        result
    }
    let mut depth = DepthCounter::with_profile(RecursionProfile::ShallowTraversal);
    apply(interner, ty, context, &mut depth)
}

/// Context entries are keyed by the TypeVar in instance form, so that the
/// instantiable and instance flavors of one variable share a binding.
pub fn canonical_type_var_key(interner: &TypeInterner, type_var: TypeId) -> TypeId {
    match interner.lookup(type_var) {
        Some(TypeKey::TypeVar(mut tv)) if tv.is_instantiable => {
            tv.is_instantiable = false;
            interner.intern(TypeKey::TypeVar(tv))
        }
        _ => type_var,
    }
}

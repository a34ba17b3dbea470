//! Guard application: narrowing a type along a control-flow edge.
//!
//! The syntactic half of the narrowing engine (in the evaluator crate)
//! compiles a test expression into an AST-agnostic `TypeGuard`; this module
//! applies a guard to a type. A `NarrowingCallback` packages a guard with
//! its polarity into a pure `Type -> Type` function: no identity, freely
//! cloneable, and referentially transparent.

use pyz_common::CancellationToken;
use pyz_common::interner::Atom;
use tracing::trace;

use crate::intern::TypeInterner;
use crate::subtype::SubtypeChecker;
use crate::type_ops::*;
use crate::typevar_context::TypeVarContext;
use crate::types::*;

/// An AST-agnostic description of a narrowing test.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeGuard {
    /// `x is None` / `x == None`.
    IsNone { is_operator: bool },
    /// `x[i] is None` for an integer-literal subscript.
    TupleEntryNone { index: usize },
    /// `type(x) is Y`.
    ClassIs { class: TypeId },
    /// `x is L` (enum/bool) or `x == L` for a literal `L`.
    LiteralEquality { literal: TypeId, is_operator: bool },
    /// `x["k"] == L` on TypedDict subtypes.
    TypedDictDiscriminant { key: Atom, literal: TypeId },
    /// `x[i] == L` on fixed-length tuples.
    TupleEntryEquality { index: usize, literal: TypeId },
    /// `len(x) == n`.
    TupleLength { length: usize },
    /// `x.m == L` / `x.m is L` on a literal-typed attribute.
    MemberEquality {
        member: Atom,
        literal: TypeId,
        is_operator: bool,
    },
    /// `x.m is None`.
    MemberIsNone { member: Atom },
    /// `x in c` where `c` has element type `element`.
    InContainer { element: TypeId },
    /// `"k" in td` on TypedDict subtypes.
    TypedDictKey { key: Atom },
    /// `isinstance(x, ...)` / `issubclass(x, ...)`.
    IsInstance {
        filters: Vec<TypeId>,
        is_subclass: bool,
    },
    /// `callable(x)`.
    Callable,
    /// A user-defined type guard returning `TypeGuard[G]` or
    /// `StrictTypeGuard[G]`.
    Predicate { guarded: TypeId, is_strict: bool },
    /// Truthiness of the reference itself (also `bool(x)`).
    Truthy,
}

/// A guard bound to a control-flow polarity: the pure `Type -> Type`
/// callback handed to the checker, produced once per predicate and applied
/// once per edge.
#[derive(Clone, Debug, PartialEq)]
pub struct NarrowingCallback {
    pub guard: TypeGuard,
    pub is_positive: bool,
}

impl NarrowingCallback {
    pub fn new(guard: TypeGuard, is_positive: bool) -> Self {
        Self { guard, is_positive }
    }

    pub fn apply(&self, context: &NarrowingContext<'_>, ty: TypeId) -> TypeId {
        context.narrow_type(ty, &self.guard, self.is_positive)
    }
}

pub struct NarrowingContext<'a> {
    interner: &'a TypeInterner,
    cancellation: Option<&'a CancellationToken>,
}

impl<'a> NarrowingContext<'a> {
    pub fn new(interner: &'a TypeInterner) -> Self {
        Self {
            interner,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn interner(&self) -> &'a TypeInterner {
        self.interner
    }

    fn checker(&self) -> SubtypeChecker<'a> {
        match self.cancellation {
            Some(token) => SubtypeChecker::new(self.interner).with_cancellation(token),
            None => SubtypeChecker::new(self.interner),
        }
    }

    /// Refine `ty` under the assumption that the guarded test evaluated to
    /// `is_positive` on this edge. Cancellation yields the identity.
    pub fn narrow_type(&self, ty: TypeId, guard: &TypeGuard, is_positive: bool) -> TypeId {
        if self
            .cancellation
            .is_some_and(|token| token.is_cancelled())
        {
            return ty;
        }
        let ty = transform_possible_recursive_type_alias(self.interner, ty);
        trace!(?ty, ?guard, is_positive, "narrow_type");
        match guard {
            TypeGuard::IsNone { is_operator } => self.narrow_is_none(ty, *is_operator, is_positive),
            TypeGuard::TupleEntryNone { index } => {
                self.narrow_tuple_entry_none(ty, *index, is_positive)
            }
            TypeGuard::ClassIs { class } => self.narrow_class_is(ty, *class, is_positive),
            TypeGuard::LiteralEquality {
                literal,
                is_operator,
            } => self.narrow_literal_equality(ty, *literal, *is_operator, is_positive),
            TypeGuard::TypedDictDiscriminant { key, literal } => {
                self.narrow_typed_dict_discriminant(ty, *key, *literal, is_positive)
            }
            TypeGuard::TupleEntryEquality { index, literal } => {
                self.narrow_tuple_entry_equality(ty, *index, *literal, is_positive)
            }
            TypeGuard::TupleLength { length } => self.narrow_tuple_length(ty, *length, is_positive),
            TypeGuard::MemberEquality {
                member,
                literal,
                is_operator,
            } => self.narrow_member_equality(ty, *member, *literal, *is_operator, is_positive),
            TypeGuard::MemberIsNone { member } => {
                self.narrow_member_is_none(ty, *member, is_positive)
            }
            TypeGuard::InContainer { element } => {
                self.narrow_in_container(ty, *element, is_positive)
            }
            TypeGuard::TypedDictKey { key } => self.narrow_typed_dict_key(ty, *key, is_positive),
            TypeGuard::IsInstance {
                filters,
                is_subclass,
            } => self.narrow_is_instance(ty, filters, *is_subclass, is_positive),
            TypeGuard::Callable => self.narrow_callable(ty, is_positive),
            TypeGuard::Predicate { guarded, is_strict } => {
                self.narrow_predicate(ty, *guarded, *is_strict, is_positive)
            }
            TypeGuard::Truthy => self.narrow_truthy(ty, is_positive),
        }
    }

    // =========================================================================
    // None tests
    // =========================================================================

    fn narrow_is_none(&self, ty: TypeId, _is_operator: bool, is_positive: bool) -> TypeId {
        let interner = self.interner;
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _unexpanded| {
            match interner.lookup(expanded) {
                // Any remains Any in both branches.
                Some(TypeKey::Any) | Some(TypeKey::Unknown) => Some(expanded),
                Some(TypeKey::None(none)) if !none.is_instantiable => {
                    if is_positive { Some(expanded) } else { None }
                }
                _ if is_object_instance(interner, expanded) => {
                    if is_positive {
                        // `object` could be None; the narrowed instance
                        // carries the input's conditions.
                        let conditions = interner.condition_set(expanded);
                        Some(interner.with_conditions(TypeId::NONE, &conditions))
                    } else {
                        Some(expanded)
                    }
                }
                _ => {
                    if is_positive {
                        None
                    } else {
                        Some(expanded)
                    }
                }
            }
        })
    }

    fn narrow_tuple_entry_none(&self, ty: TypeId, index: usize, is_positive: bool) -> TypeId {
        let interner = self.interner;
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            let Some(class) = interner.class_of(expanded) else {
                return Some(expanded);
            };
            let Some(args) = class.tuple_args.as_deref() else {
                return Some(expanded);
            };
            if args.iter().any(|arg| arg.is_unbounded) || index >= args.len() {
                return Some(expanded);
            }
            let element = args[index].ty;
            let could_be_none = interner.subtypes_of(element).iter().any(|&member| {
                interner.is_none_instance(member) || interner.is_any_or_unknown(member)
            });
            let definitely_none = interner.is_none_instance(element);
            if is_positive {
                // Eliminate tuples whose element is incompatible with None.
                if could_be_none { Some(expanded) } else { None }
            } else if definitely_none {
                None
            } else {
                Some(expanded)
            }
        })
    }

    // =========================================================================
    // type(x) comparison
    // =========================================================================

    fn narrow_class_is(&self, ty: TypeId, filter: TypeId, is_positive: bool) -> TypeId {
        let interner = self.interner;
        let Some(filter_class) = interner.class_of(filter) else {
            return ty;
        };
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            let key = interner.lookup(expanded);
            match key {
                Some(TypeKey::Any) | Some(TypeKey::Unknown) => Some(expanded),
                Some(TypeKey::Class(subtype)) if !subtype.is_instantiable => {
                    if is_positive {
                        if subtype.name == filter_class.name {
                            // Retain the subtype with the exact same generic
                            // class.
                            Some(expanded)
                        } else if derives_from(interner, &filter_class, subtype.name) {
                            let instance = interner.to_instance(filter);
                            Some(interner.with_conditions(instance, &subtype.conditions))
                        } else {
                            None
                        }
                    } else if subtype.is_final() && subtype.name == filter_class.name {
                        None
                    } else {
                        Some(expanded)
                    }
                }
                _ => {
                    if is_positive {
                        None
                    } else {
                        Some(expanded)
                    }
                }
            }
        })
    }

    // =========================================================================
    // Literal comparison
    // =========================================================================

    fn narrow_literal_equality(
        &self,
        ty: TypeId,
        literal: TypeId,
        is_operator: bool,
        is_positive: bool,
    ) -> TypeId {
        let interner = self.interner;
        let Some(literal_class) = interner.class_of(literal) else {
            return ty;
        };
        let Some(literal_value) = literal_class.literal.clone() else {
            return ty;
        };
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            match interner.lookup(expanded) {
                Some(TypeKey::Any) | Some(TypeKey::Unknown) => Some(expanded),
                Some(TypeKey::None(_)) => {
                    // None never equals (or is) a class-instance literal.
                    if is_positive { None } else { Some(expanded) }
                }
                Some(TypeKey::Class(subtype))
                    if !subtype.is_instantiable && subtype.name == literal_class.name =>
                {
                    match &subtype.literal {
                        Some(value) => {
                            let matches = *value == literal_value;
                            if is_positive == matches {
                                Some(expanded)
                            } else {
                                None
                            }
                        }
                        None => {
                            if is_positive {
                                Some(interner.with_conditions(literal, &subtype.conditions))
                            } else if let Some(all) =
                                enumerate_literal_members(interner, expanded)
                            {
                                let remaining: Vec<TypeId> = all
                                    .into_iter()
                                    .filter(|&member| member != literal)
                                    .map(|member| {
                                        interner.with_conditions(member, &subtype.conditions)
                                    })
                                    .collect();
                                if remaining.is_empty() {
                                    None
                                } else {
                                    Some(interner.union(remaining))
                                }
                            } else {
                                Some(expanded)
                            }
                        }
                    }
                }
                _ => {
                    // A different class: `is` can never hold, `==` might via
                    // a user-defined __eq__.
                    if is_positive && is_operator {
                        None
                    } else {
                        Some(expanded)
                    }
                }
            }
        })
    }

    /// Does a declared entry/attribute type accept the literal?
    fn literal_accepted_by(&self, entry_type: TypeId, literal: TypeId) -> bool {
        let mut checker = self.checker();
        checker.is_assignable(entry_type, literal)
    }

    /// Is the declared type exactly this one literal (so a `!=` test rules
    /// the whole subtype out)?
    fn is_exactly_literal(&self, entry_type: TypeId, literal: TypeId) -> bool {
        entry_type == literal
            || self
                .interner
                .class_of(entry_type)
                .zip(self.interner.class_of(literal))
                .is_some_and(|(entry, lit)| {
                    entry.name == lit.name
                        && entry.literal.is_some()
                        && entry.literal == lit.literal
                })
    }

    /// Is the type a literal, or a union made entirely of literals?
    fn is_literal_or_literal_union(&self, entry_type: TypeId) -> bool {
        let subtypes = self.interner.subtypes_of(entry_type);
        !subtypes.is_empty()
            && subtypes.iter().all(|&member| {
                self.interner
                    .class_of(member)
                    .is_some_and(|class| class.literal.is_some())
            })
    }

    // =========================================================================
    // Discriminators
    // =========================================================================

    fn narrow_typed_dict_discriminant(
        &self,
        ty: TypeId,
        key: Atom,
        literal: TypeId,
        is_positive: bool,
    ) -> TypeId {
        let interner = self.interner;
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            let Some(class) = interner.class_of(expanded) else {
                return Some(expanded);
            };
            if !class.is_typed_dict() {
                return Some(expanded);
            }
            let Some(entry) = class.declared_entry(key) else {
                return Some(expanded);
            };
            if !self.is_literal_or_literal_union(entry.value_type) {
                return Some(expanded);
            }
            if is_positive {
                if self.literal_accepted_by(entry.value_type, literal) {
                    Some(expanded)
                } else {
                    None
                }
            } else if self.is_exactly_literal(entry.value_type, literal) {
                None
            } else {
                Some(expanded)
            }
        })
    }

    fn narrow_tuple_entry_equality(
        &self,
        ty: TypeId,
        index: usize,
        literal: TypeId,
        is_positive: bool,
    ) -> TypeId {
        let interner = self.interner;
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            let Some(class) = interner.class_of(expanded) else {
                return Some(expanded);
            };
            let Some(args) = class.tuple_args.as_deref() else {
                return Some(expanded);
            };
            if args.iter().any(|arg| arg.is_unbounded) || index >= args.len() {
                return Some(expanded);
            }
            let element = args[index].ty;
            if is_positive {
                if self.literal_accepted_by(element, literal) {
                    Some(expanded)
                } else {
                    None
                }
            } else if self.is_exactly_literal(element, literal) {
                None
            } else {
                Some(expanded)
            }
        })
    }

    fn narrow_tuple_length(&self, ty: TypeId, length: usize, is_positive: bool) -> TypeId {
        let interner = self.interner;
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            let Some(class) = interner.class_of(expanded) else {
                return Some(expanded);
            };
            let Some(args) = class.tuple_args.as_deref() else {
                return Some(expanded);
            };
            // Unbounded tuples are preserved in both branches.
            if args.iter().any(|arg| arg.is_unbounded) {
                return Some(expanded);
            }
            let matches = args.len() == length;
            if matches == is_positive {
                Some(expanded)
            } else {
                None
            }
        })
    }

    fn narrow_member_equality(
        &self,
        ty: TypeId,
        member: Atom,
        literal: TypeId,
        _is_operator: bool,
        is_positive: bool,
    ) -> TypeId {
        let interner = self.interner;
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            let Some(class) = interner.class_of(expanded) else {
                return Some(expanded);
            };
            let Some(mut member_type) = lookup_member(interner, &class, member) else {
                return Some(expanded);
            };
            // A property whose getter is literal-typed is treated as the
            // attribute.
            if let Some(func) = interner.function_of(member_type) {
                if func.flags.contains(FunctionFlags::PROPERTY) {
                    member_type = func.return_type;
                } else {
                    return Some(expanded);
                }
            }
            if !self.is_literal_or_literal_union(member_type) {
                return Some(expanded);
            }
            if is_positive {
                if self.literal_accepted_by(member_type, literal) {
                    Some(expanded)
                } else {
                    None
                }
            } else if self.is_exactly_literal(member_type, literal) {
                None
            } else {
                Some(expanded)
            }
        })
    }

    fn narrow_member_is_none(&self, ty: TypeId, member: Atom, is_positive: bool) -> TypeId {
        let interner = self.interner;
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            let Some(class) = interner.class_of(expanded) else {
                return Some(expanded);
            };
            let Some(member_type) = lookup_member(interner, &class, member) else {
                return Some(expanded);
            };
            // Descriptors and properties can return anything; skip.
            match interner.lookup(member_type) {
                Some(TypeKey::Function(_)) | Some(TypeKey::Overloaded(_)) => {
                    return Some(expanded);
                }
                _ => {}
            }
            if is_positive {
                let could_be_none = interner.subtypes_of(member_type).iter().any(|&m| {
                    interner.is_none_instance(m) || interner.is_any_or_unknown(m)
                });
                if could_be_none { Some(expanded) } else { None }
            } else {
                // The negative branch eliminates only a member type that is
                // exactly None. A member that merely includes None is
                // retained.
                // TODO: revisit against the conformance corpus; the broader
                // "includes None" reading would also be defensible here.
                if interner.is_none_instance(member_type) {
                    None
                } else {
                    Some(expanded)
                }
            }
        })
    }

    // =========================================================================
    // Containment
    // =========================================================================

    fn narrow_in_container(&self, ty: TypeId, element: TypeId, is_positive: bool) -> TypeId {
        if !is_positive {
            return ty;
        }
        let interner = self.interner;
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            if interner.is_any_or_unknown(expanded) {
                return Some(expanded);
            }
            let mut checker = self.checker();
            if checker.is_assignable(element, expanded) {
                // The subtype fits inside the element type.
                return Some(expanded);
            }
            if checker.is_assignable(expanded, element) {
                // The subtype is a supertype of the element type; when it is
                // exactly the literal-stripped element type, refine to the
                // literals themselves.
                if strip_literal_values(interner, element) == expanded {
                    return Some(element);
                }
                return Some(expanded);
            }
            None
        })
    }

    fn narrow_typed_dict_key(&self, ty: TypeId, key: Atom, is_positive: bool) -> TypeId {
        let interner = self.interner;
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            let Some(class) = interner.class_of(expanded) else {
                return Some(expanded);
            };
            if !class.is_typed_dict() {
                return Some(expanded);
            }
            let members = get_typed_dict_members(interner, &class, true);
            let member = members
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, member)| *member);
            let declared = member.is_some();
            let provided = member
                .is_some_and(|member| member.is_required || member.is_provided)
                || class.narrowed_entry(key).is_some_and(|entry| entry.is_provided);
            if is_positive {
                if provided {
                    Some(expanded)
                } else if !declared && class.is_final() {
                    // A final TypedDict cannot acquire undeclared keys.
                    None
                } else {
                    // The key is now known to be present: record an
                    // is-provided mark in the narrowed entries.
                    let mut narrowed = class.clone();
                    match narrowed
                        .narrowed_entries
                        .iter_mut()
                        .find(|(name, _)| *name == key)
                    {
                        Some((_, entry)) => entry.is_provided = true,
                        None => {
                            narrowed
                                .narrowed_entries
                                .push((key, NarrowedEntry { is_provided: true }));
                            narrowed.narrowed_entries.sort_by_key(|(name, _)| *name);
                        }
                    }
                    Some(interner.intern(TypeKey::Class(narrowed)))
                }
            } else if provided {
                None
            } else {
                Some(expanded)
            }
        })
    }

    // =========================================================================
    // isinstance / issubclass
    // =========================================================================

    fn narrow_is_instance(
        &self,
        ty: TypeId,
        filters: &[TypeId],
        is_subclass: bool,
        is_positive: bool,
    ) -> TypeId {
        // Two-pass convention: first without intersection synthesis, then
        // with it if everything was filtered away.
        let first = self.is_instance_pass(ty, filters, is_subclass, is_positive, false);
        if is_positive && first == TypeId::NEVER {
            return self.is_instance_pass(ty, filters, is_subclass, is_positive, true);
        }
        first
    }

    fn filter_union(&self, filters: &[TypeId], is_subclass: bool) -> TypeId {
        let interner = self.interner;
        let converted: Vec<TypeId> = filters
            .iter()
            .map(|&filter| {
                if is_subclass {
                    filter
                } else {
                    interner.to_instance(filter)
                }
            })
            .collect();
        interner.union(converted)
    }

    fn is_instance_pass(
        &self,
        ty: TypeId,
        filters: &[TypeId],
        is_subclass: bool,
        is_positive: bool,
        allow_synthesis: bool,
    ) -> TypeId {
        let interner = self.interner;
        let mut any_substitutions: Vec<TypeId> = Vec::new();
        let filtered = map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            if interner.is_any_or_unknown(expanded) {
                if is_positive {
                    any_substitutions.push(self.filter_union(filters, is_subclass));
                    return None;
                }
                return Some(expanded);
            }
            self.apply_instance_filters(expanded, filters, is_subclass, is_positive, allow_synthesis)
        });
        if filtered == TypeId::NEVER && !any_substitutions.is_empty() {
            return interner.union(any_substitutions);
        }
        if any_substitutions.is_empty() {
            filtered
        } else {
            let mut all = vec![filtered];
            all.extend(any_substitutions);
            interner.union(all)
        }
    }

    fn apply_instance_filters(
        &self,
        subtype: TypeId,
        filters: &[TypeId],
        is_subclass: bool,
        is_positive: bool,
        allow_synthesis: bool,
    ) -> Option<TypeId> {
        let interner = self.interner;
        let mut kept: Vec<TypeId> = Vec::new();
        let mut any_superclass = false;
        let mut indeterminate = false;
        for &filter in filters {
            match self.classify_filter(subtype, filter, is_subclass) {
                FilterRelation::Superclass { conditions } => {
                    any_superclass = true;
                    if is_positive {
                        kept.push(interner.with_conditions(subtype, &conditions));
                    }
                }
                FilterRelation::Subclass => {
                    if is_positive {
                        kept.push(self.specialize_filter(filter, subtype, is_subclass));
                    }
                }
                FilterRelation::Indeterminate => {
                    indeterminate = true;
                    if is_positive {
                        kept.push(subtype);
                    }
                }
                FilterRelation::NoRelation => {
                    if is_positive
                        && allow_synthesis
                        && let Some(intersection) =
                            self.synthesize_intersection(subtype, filter, is_subclass)
                    {
                        kept.push(intersection);
                    }
                }
            }
        }
        if is_positive {
            if kept.is_empty() {
                None
            } else {
                Some(interner.union(kept))
            }
        } else {
            // Negative narrowing keeps the subtype unless some filter is a
            // definite superclass; indeterminate pairs retain it.
            if any_superclass && !indeterminate {
                None
            } else {
                Some(subtype)
            }
        }
    }

    fn classify_filter(
        &self,
        subtype: TypeId,
        filter: TypeId,
        is_subclass: bool,
    ) -> FilterRelation {
        let interner = self.interner;
        let builtins = *interner.builtins();

        // `None` as a filter matches exactly the None instance.
        if filter == TypeId::NONE_TYPE {
            let matches = if is_subclass {
                subtype == TypeId::NONE_TYPE
            } else {
                interner.is_none_instance(subtype)
            };
            return if matches {
                FilterRelation::Superclass {
                    conditions: Vec::new(),
                }
            } else {
                FilterRelation::NoRelation
            };
        }

        let Some(filter_class) = interner.class_of(filter) else {
            return FilterRelation::NoRelation;
        };
        let filter_conditions = filter_class.conditions.clone();

        // The `type` filter matches class objects.
        if filter_class.name == builtins.r#type.name {
            let matches = match interner.lookup(subtype) {
                Some(TypeKey::Class(class)) => {
                    class.is_instantiable || class.name == builtins.r#type.name
                }
                Some(TypeKey::None(none)) => none.is_instantiable,
                _ => false,
            };
            return if matches {
                FilterRelation::Superclass {
                    conditions: filter_conditions,
                }
            } else {
                FilterRelation::NoRelation
            };
        }

        // Callable-protocol filters accept functions and callable classes.
        let call_atom = interner.atom("__call__");
        if filter_class.is_protocol()
            && filter_class.own_field(call_atom).is_some()
            && matches!(
                interner.lookup(subtype),
                Some(TypeKey::Function(_)) | Some(TypeKey::Overloaded(_))
            )
        {
            return FilterRelation::Superclass {
                conditions: filter_conditions,
            };
        }

        let subtype_class = match interner.lookup(subtype) {
            Some(TypeKey::Class(class)) => class,
            Some(TypeKey::None(none)) if !none.is_instantiable && !is_subclass => {
                // `None` is an instance only of object-like filters.
                return if filter_class.name == builtins.object.name {
                    FilterRelation::Superclass {
                        conditions: filter_conditions,
                    }
                } else {
                    FilterRelation::NoRelation
                };
            }
            _ => return FilterRelation::NoRelation,
        };

        // In instance mode a class object only matches `type`-like filters
        // (handled above) and `object`.
        if !is_subclass && subtype_class.is_instantiable {
            return if filter_class.name == builtins.object.name {
                FilterRelation::Superclass {
                    conditions: filter_conditions,
                }
            } else {
                FilterRelation::NoRelation
            };
        }
        if is_subclass && !subtype_class.is_instantiable {
            return FilterRelation::NoRelation;
        }

        let unknown_involved = subtype_class
            .flags
            .contains(ClassFlags::DERIVES_FROM_UNKNOWN)
            || filter_class.flags.contains(ClassFlags::DERIVES_FROM_UNKNOWN);

        // dict filters accept TypedDict subtypes.
        if subtype_class.is_typed_dict() && filter_class.name == builtins.dict.name {
            return FilterRelation::Superclass {
                conditions: filter_conditions,
            };
        }

        if derives_from(interner, &subtype_class, filter_class.name) {
            return FilterRelation::Superclass {
                conditions: filter_conditions,
            };
        }
        if derives_from(interner, &filter_class, subtype_class.name) {
            return FilterRelation::Subclass;
        }

        // Protocol filters classify structurally.
        if filter_class.is_protocol() {
            let mut checker = self.checker();
            let filter_instance = interner.to_instance(filter);
            let subtype_instance = interner.to_instance(subtype);
            if checker.is_assignable(filter_instance, subtype_instance) {
                return FilterRelation::Superclass {
                    conditions: filter_conditions,
                };
            }
        }
        if subtype_class.is_protocol() {
            let mut checker = self.checker();
            let filter_instance = interner.to_instance(filter);
            let subtype_instance = interner.to_instance(subtype);
            if checker.is_assignable(subtype_instance, filter_instance) {
                return FilterRelation::Subclass;
            }
        }

        if unknown_involved {
            return FilterRelation::Indeterminate;
        }
        FilterRelation::NoRelation
    }

    /// Specialize a subclass filter against the (super-typed) subtype so
    /// that type arguments survive the narrowing.
    fn specialize_filter(&self, filter: TypeId, subtype: TypeId, is_subclass: bool) -> TypeId {
        let interner = self.interner;
        let Some(filter_class) = interner.class_of(filter) else {
            return filter;
        };
        let result = if filter_class.type_params.is_empty() {
            filter
        } else {
            let scopes: Vec<TypeVarScopeId> = filter_class
                .type_params
                .iter()
                .filter_map(|&param| interner.type_var_of(param).and_then(|tv| tv.scope_id))
                .collect();
            let mut generic = filter_class.clone();
            generic.is_instantiable = false;
            generic.type_args = Some(
                filter_class
                    .type_params
                    .iter()
                    .map(|&param| interner.to_instance(param))
                    .collect(),
            );
            let generic_id = interner.intern(TypeKey::Class(generic));
            let expected = interner.to_instance(subtype);
            let mut context = TypeVarContext::with_scopes(&scopes);
            let mut checker = self.checker();
            if checker.populate_context_from_expected_type(generic_id, expected, &mut context, &scopes)
            {
                let applied = apply_solved_type_vars(interner, generic_id, &context);
                if is_subclass {
                    interner.to_instantiable(applied).unwrap_or(applied)
                } else {
                    applied
                }
            } else {
                filter
            }
        };
        if is_subclass {
            result
        } else {
            interner.to_instance(result)
        }
    }

    /// Build the `<subclass of S and F>` intersection class for a subtype
    /// and filter with no nominal or structural relation. Interning keys the
    /// synthesized identity by content, so repeated narrowing of the same
    /// expression yields the same class.
    fn synthesize_intersection(
        &self,
        subtype: TypeId,
        filter: TypeId,
        is_subclass: bool,
    ) -> Option<TypeId> {
        let interner = self.interner;
        let subtype_class = interner.class_of(subtype)?;
        let filter_class = interner.class_of(filter)?;
        if subtype_class.is_final() {
            return None;
        }
        let short = |atom: Atom| {
            let full = interner.resolve_atom(atom);
            full.rsplit('.').next().unwrap_or(&full).to_string()
        };
        let name = format!(
            "<subclass of {} and {}>",
            short(subtype_class.name),
            short(filter_class.name)
        );
        let mut class = ClassType::named(interner.atom(&name));
        class.flags = ClassFlags::SYNTHESIZED;
        let subtype_instantiable = interner.to_instantiable(subtype)?;
        let filter_instantiable = interner.to_instantiable(filter)?;
        let mut mro = vec![subtype_instantiable, filter_instantiable];
        for &entry in subtype_class.mro.iter().chain(filter_class.mro.iter()) {
            if !mro.contains(&entry) {
                mro.push(entry);
            }
        }
        class.mro = mro;
        // The intersection carries the subtype's TypeVar conditions.
        class.conditions = subtype_class.conditions.clone();
        class.is_instantiable = is_subclass;
        Some(interner.intern(TypeKey::Class(class)))
    }

    // =========================================================================
    // callable()
    // =========================================================================

    fn narrow_callable(&self, ty: TypeId, is_positive: bool) -> TypeId {
        let first = self.callable_pass(ty, is_positive, false);
        if is_positive && first == TypeId::NEVER {
            return self.callable_pass(ty, is_positive, true);
        }
        first
    }

    fn callable_pass(&self, ty: TypeId, is_positive: bool, allow_synthesis: bool) -> TypeId {
        let interner = self.interner;
        let call_atom = interner.atom("__call__");
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            match interner.lookup(expanded) {
                Some(TypeKey::Any) | Some(TypeKey::Unknown) => Some(expanded),
                Some(TypeKey::Function(_)) | Some(TypeKey::Overloaded(_)) => {
                    if is_positive { Some(expanded) } else { None }
                }
                Some(TypeKey::None(_)) | Some(TypeKey::Module(_)) => {
                    if is_positive { None } else { Some(expanded) }
                }
                Some(TypeKey::Class(class)) => {
                    if class.is_instantiable {
                        // Class objects are callable constructors.
                        if is_positive { Some(expanded) } else { None }
                    } else {
                        let has_call = lookup_member(interner, &class, call_atom).is_some();
                        if is_positive {
                            if has_call {
                                Some(expanded)
                            } else if allow_synthesis {
                                let callable_proto = self.synthesized_callable_protocol();
                                self.synthesize_intersection(expanded, callable_proto, false)
                            } else {
                                None
                            }
                        } else if has_call {
                            None
                        } else {
                            Some(expanded)
                        }
                    }
                }
                _ => Some(expanded),
            }
        })
    }

    /// A synthesized protocol with a permissive `__call__`, used to
    /// intersect non-callable-looking instances in the second callable()
    /// pass.
    fn synthesized_callable_protocol(&self) -> TypeId {
        let interner = self.interner;
        let call_atom = interner.atom("__call__");
        let call_fn = FunctionType {
            name: call_atom,
            params: vec![
                ParamInfo {
                    category: ParamCategory::VarPositional,
                    name: Some(interner.atom("args")),
                    ty: TypeId::UNKNOWN,
                    has_default: false,
                },
                ParamInfo {
                    category: ParamCategory::VarKeyword,
                    name: Some(interner.atom("kwargs")),
                    ty: TypeId::UNKNOWN,
                    has_default: false,
                },
            ],
            return_type: TypeId::UNKNOWN,
            flags: FunctionFlags::SYNTHESIZED,
            type_guard: None,
            param_spec: None,
        };
        let call_id = interner.intern(TypeKey::Function(call_fn));
        let mut class = ClassType::named(interner.atom("<callable>"));
        class.flags = ClassFlags::PROTOCOL | ClassFlags::SYNTHESIZED;
        class.fields = vec![(call_atom, call_id)];
        class.mro = vec![interner.builtins().object.class];
        class.is_instantiable = false;
        interner.intern(TypeKey::Class(class))
    }

    // =========================================================================
    // User-defined type guards
    // =========================================================================

    fn narrow_predicate(
        &self,
        ty: TypeId,
        guarded: TypeId,
        is_strict: bool,
        is_positive: bool,
    ) -> TypeId {
        let interner = self.interner;
        if is_positive && !is_strict {
            return guarded;
        }
        if !is_positive && !is_strict {
            // Non-strict guards narrow only the positive branch.
            return ty;
        }
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            let mut checker = self.checker();
            let contained = checker.is_assignable(guarded, expanded);
            if is_positive {
                if contained {
                    return Some(expanded);
                }
                // Pointwise intersection with the guarded type.
                let overlap: Vec<TypeId> = interner
                    .subtypes_of(guarded)
                    .into_iter()
                    .filter(|&member| {
                        let mut probe = self.checker();
                        probe.is_assignable(expanded, member)
                    })
                    .collect();
                if overlap.is_empty() {
                    None
                } else {
                    Some(interner.union(overlap))
                }
            } else if contained {
                // Strict negative: subtypes wholly inside the guarded type
                // are eliminated.
                None
            } else {
                Some(expanded)
            }
        })
    }

    // =========================================================================
    // Truthiness
    // =========================================================================

    fn narrow_truthy(&self, ty: TypeId, is_positive: bool) -> TypeId {
        let interner = self.interner;
        map_subtypes_expand_type_vars(interner, ty, None, |expanded, _| {
            if is_positive {
                if can_be_truthy(interner, expanded) {
                    Some(remove_falsiness(interner, expanded))
                } else {
                    None
                }
            } else if can_be_falsy(interner, expanded) {
                Some(remove_truthiness(interner, expanded))
            } else {
                None
            }
        })
    }
}

enum FilterRelation {
    /// The filter is an ancestor (or structural acceptor) of the subtype.
    Superclass { conditions: Vec<TypeCondition> },
    /// The filter is a descendant of the subtype.
    Subclass,
    /// Unknown bases make the relation undecidable.
    Indeterminate,
    NoRelation,
}

// =============================================================================
// Truthiness predicates
// =============================================================================

/// Can a value of this (non-union) type ever be truthy?
pub fn can_be_truthy(interner: &TypeInterner, ty: TypeId) -> bool {
    match interner.lookup(ty) {
        Some(TypeKey::None(none)) => none.is_instantiable,
        Some(TypeKey::Never) => false,
        Some(TypeKey::Class(class)) => {
            if let Some(literal) = &class.literal {
                return match literal {
                    LiteralValue::Bool(value) => *value,
                    LiteralValue::Int(value) => *value != 0,
                    LiteralValue::Str(atom) | LiteralValue::Bytes(atom) => {
                        !interner.resolve_atom(*atom).is_empty()
                    }
                    LiteralValue::EnumMember(_) => true,
                };
            }
            if let Some(args) = class.tuple_args.as_deref() {
                // The empty tuple is always falsy.
                return !args.is_empty() || args.iter().any(|arg| arg.is_unbounded);
            }
            true
        }
        _ => true,
    }
}

/// Can a value of this (non-union) type ever be falsy?
pub fn can_be_falsy(interner: &TypeInterner, ty: TypeId) -> bool {
    match interner.lookup(ty) {
        Some(TypeKey::None(none)) => !none.is_instantiable,
        Some(TypeKey::Function(_)) | Some(TypeKey::Overloaded(_)) | Some(TypeKey::Module(_)) => {
            false
        }
        Some(TypeKey::Class(class)) => {
            if class.is_instantiable {
                return false;
            }
            if let Some(literal) = &class.literal {
                return match literal {
                    LiteralValue::Bool(value) => !*value,
                    LiteralValue::Int(value) => *value == 0,
                    LiteralValue::Str(atom) | LiteralValue::Bytes(atom) => {
                        interner.resolve_atom(*atom).is_empty()
                    }
                    LiteralValue::EnumMember(_) => false,
                };
            }
            if let Some(args) = class.tuple_args.as_deref() {
                // A fixed non-empty tuple is always truthy.
                return args.is_empty() || args.iter().any(|arg| arg.is_unbounded);
            }
            true
        }
        _ => true,
    }
}

/// In the negative branch, scalar classes collapse to their falsy literal.
pub fn remove_truthiness(interner: &TypeInterner, ty: TypeId) -> TypeId {
    let builtins = *interner.builtins();
    let Some(class) = interner.class_of(ty) else {
        return ty;
    };
    if class.literal.is_some() || class.is_instantiable {
        return ty;
    }
    if class.name == builtins.bool.name {
        return interner.literal_bool(false);
    }
    if class.name == builtins.int.name {
        return interner.literal_int(0);
    }
    if class.name == builtins.str.name {
        return interner.literal_str("");
    }
    if class.name == builtins.bytes.name {
        return interner.literal_bytes("");
    }
    ty
}

/// In the positive branch, `bool` collapses to `Literal[True]`.
pub fn remove_falsiness(interner: &TypeInterner, ty: TypeId) -> TypeId {
    let builtins = *interner.builtins();
    let Some(class) = interner.class_of(ty) else {
        return ty;
    };
    if class.literal.is_some() || class.is_instantiable {
        return ty;
    }
    if class.name == builtins.bool.name {
        return interner.literal_bool(true);
    }
    ty
}

//! The assignability judgment.
//!
//! `SubtypeChecker` decides `src ≤ dest` ("src is assignable to dest"). The
//! solver consumes it as a capability and is called back by it: when the
//! destination is an in-scope type variable and a `TypeVarContext` was
//! supplied, the judgment dispatches into `assign_type_var` (see `solve`),
//! which in turn re-enters the judgment for bound and constraint checks.
//!
//! Recursion over type pairs is guarded; a denied entry (cycle or exhausted
//! budget) yields conservative success so that recursive aliases and
//! protocols terminate.

use bitflags::bitflags;
use pyz_common::CancellationToken;
use tracing::trace;

use crate::diagnostics::{DiagAddendum, MismatchKind};
use crate::intern::TypeInterner;
use crate::recursion::{RecursionGuard, RecursionProfile, RecursionResult};
use crate::type_ops::*;
use crate::typevar_context::TypeVarContext;
use crate::types::*;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct AssignFlags: u32 {
        /// Match destination type variables contravariantly: updates flow to
        /// the wide bound, and source type variables are the ones solved.
        const REVERSE_TYPE_VAR_MATCHING = 1 << 0;
        /// Do not solve type variables even when a context is present.
        const SKIP_SOLVE_TYPE_VARS = 1 << 1;
        /// Bind type variables whose scope is not in the context's
        /// solve-for set.
        const IGNORE_TYPE_VAR_SCOPE = 1 << 2;
        /// Permit the wide bound to tighten below an existing narrow bound
        /// candidate.
        const ALLOW_TYPE_VAR_NARROWING = 1 << 3;
        /// Keep literal values when binding type variables.
        const RETAIN_LITERALS_FOR_TYPE_VAR = 1 << 4;
        /// The assignment is populating an expected-type context rather
        /// than validating a real value flow.
        const POPULATING_EXPECTED_TYPE = 1 << 5;
    }
}

pub struct SubtypeChecker<'a> {
    interner: &'a TypeInterner,
    guard: RecursionGuard<(TypeId, TypeId)>,
    cancellation: Option<&'a CancellationToken>,
}

impl<'a> SubtypeChecker<'a> {
    pub fn new(interner: &'a TypeInterner) -> Self {
        Self {
            interner,
            guard: RecursionGuard::with_profile(RecursionProfile::SubtypeCheck),
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

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation.is_some_and(|token| token.is_cancelled())
    }

    /// Context-free assignability: `src ≤ dest`.
    pub fn is_assignable(&mut self, dest: TypeId, src: TypeId) -> bool {
        self.assign(dest, src, None, None, None, AssignFlags::empty())
    }

    /// The full judgment. `dest_ctx`/`src_ctx` receive type-variable
    /// bindings; `diag` receives structured mismatch addenda on failure.
    pub fn assign(
        &mut self,
        dest: TypeId,
        src: TypeId,
        mut diag: Option<&mut DiagAddendum>,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
    ) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let dest = transform_possible_recursive_type_alias(self.interner, dest);
        let src = transform_possible_recursive_type_alias(self.interner, src);
        if dest == src {
            return true;
        }
        match self.guard.enter((dest, src)) {
            RecursionResult::Entered => {}
            denied => {
                trace!(?dest, ?src, ?denied, "assign recursion denied; conservative success");
                return true;
            }
        }
        let result = stacker::maybe_grow(64 * 1024, 1024 * 1024, || {
            self.assign_inner(
                dest,
                src,
                diag.as_deref_mut(),
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
            )
        });
        self.guard.leave((dest, src));
        result
    }

    fn assign_inner(
        &mut self,
        dest: TypeId,
        src: TypeId,
        mut diag: Option<&mut DiagAddendum>,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
    ) -> bool {
        if src == TypeId::NEVER {
            return true;
        }
        if self.interner.is_any_or_unknown(dest) || self.interner.is_any_or_unknown(src) {
            return true;
        }

        // Destination type variable: dispatch into the solver when a context
        // is available.
        if let Some(dest_tv) = self.interner.type_var_of(dest) {
            if dest_tv.is_param_spec() {
                if !flags.contains(AssignFlags::SKIP_SOLVE_TYPE_VARS)
                    && let Some(ctx) = dest_ctx.as_deref_mut()
                {
                    return self.assign_param_spec(dest, src, diag, ctx);
                }
                return self.same_type_var(dest, src);
            }
            if !flags.contains(AssignFlags::SKIP_SOLVE_TYPE_VARS)
                && let Some(ctx) = dest_ctx.as_deref_mut()
            {
                return self.assign_type_var(dest, src, diag, ctx, flags);
            }
            if self.same_type_var(dest, src) {
                return true;
            }
            let concrete = concretize_type(self.interner, dest);
            if concrete != dest {
                return self.assign(
                    concrete,
                    src,
                    diag,
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags,
                );
            }
            if let Some(diag) = diag.as_deref_mut() {
                diag.add(MismatchKind::TypeIncompatible { dest, src });
            }
            return false;
        }

        // Reverse matching binds the source type variable instead.
        if flags.contains(AssignFlags::REVERSE_TYPE_VAR_MATCHING)
            && !flags.contains(AssignFlags::SKIP_SOLVE_TYPE_VARS)
            && let Some(src_tv) = self.interner.type_var_of(src)
            && !src_tv.is_param_spec()
            && let Some(ctx) = src_ctx.as_deref_mut()
        {
            return self.assign_type_var(src, dest, diag, ctx, flags);
        }

        // Source union: every member must find a home in the destination.
        if let Some(TypeKey::Union(members)) = self.interner.lookup(src) {
            for member in members {
                if !self.assign(
                    dest,
                    member,
                    diag.as_deref_mut(),
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags,
                ) {
                    if let Some(diag) = diag.as_deref_mut() {
                        diag.add(MismatchKind::TypeIncompatible { dest, src: member });
                    }
                    return false;
                }
            }
            return true;
        }

        // Source type variable without a binding context: compare its
        // concrete form.
        if self.interner.type_var_of(src).is_some() {
            let concrete = concretize_type(self.interner, src);
            if concrete == src {
                return false;
            }
            return self.assign(
                dest,
                concrete,
                diag,
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
            );
        }

        // Destination union: some member accepts the source. Member probes
        // are speculative, so they do not receive the diagnostic sink.
        if let Some(TypeKey::Union(members)) = self.interner.lookup(dest) {
            for member in members {
                if self.assign(
                    member,
                    src,
                    None,
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags,
                ) {
                    return true;
                }
            }
            if let Some(diag) = diag.as_deref_mut() {
                diag.add(MismatchKind::TypeIncompatible { dest, src });
            }
            return false;
        }

        let accepted = match self.interner.lookup(dest) {
            Some(TypeKey::None(dest_none)) => match self.interner.lookup(src) {
                Some(TypeKey::None(src_none)) => {
                    dest_none.is_instantiable == src_none.is_instantiable
                }
                _ => false,
            },
            Some(TypeKey::Module(dest_module)) => match self.interner.lookup(src) {
                Some(TypeKey::Module(src_module)) => dest_module.name == src_module.name,
                _ => false,
            },
            Some(TypeKey::Function(dest_func)) => self.assign_to_function(
                &dest_func,
                src,
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
            ),
            Some(TypeKey::Overloaded(dest_overloads)) => {
                dest_overloads.iter().all(|&overload| {
                    self.assign(
                        overload,
                        src,
                        None,
                        dest_ctx.as_deref_mut(),
                        src_ctx.as_deref_mut(),
                        flags,
                    )
                })
            }
            Some(TypeKey::Class(dest_class)) => self.assign_to_class(
                &dest_class,
                src,
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
            ),
            _ => false,
        };
        if !accepted && let Some(diag) = diag {
            diag.add(MismatchKind::TypeIncompatible { dest, src });
        }
        accepted
    }

    // =========================================================================
    // Classes
    // =========================================================================

    fn assign_to_class(
        &mut self,
        dest_class: &ClassType,
        src: TypeId,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
    ) -> bool {
        let builtins = *self.interner.builtins();
        let dest_is_object_instance =
            dest_class.name == builtins.object.name && !dest_class.is_instantiable;
        match self.interner.lookup(src) {
            Some(TypeKey::Class(src_class)) => self.assign_class_to_class(
                dest_class,
                &src_class,
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
            ),
            Some(TypeKey::None(src_none)) => {
                if !src_none.is_instantiable {
                    // `None` is an instance of `object`.
                    dest_is_object_instance
                } else {
                    // `type[None]` is a class object.
                    dest_is_object_instance
                        || (dest_class.name == builtins.r#type.name && !dest_class.is_instantiable)
                }
            }
            Some(TypeKey::Function(_)) | Some(TypeKey::Overloaded(_)) => {
                if dest_class.is_instantiable {
                    return false;
                }
                if dest_is_object_instance {
                    return true;
                }
                if dest_class.is_protocol() {
                    let call_atom = self.interner.atom("__call__");
                    if let Some(call_member) = lookup_member(self.interner, dest_class, call_atom) {
                        return self.assign(
                            call_member,
                            src,
                            None,
                            dest_ctx.as_deref_mut(),
                            src_ctx.as_deref_mut(),
                            flags,
                        );
                    }
                }
                false
            }
            Some(TypeKey::Module(_)) => dest_is_object_instance,
            _ => false,
        }
    }

    fn assign_class_to_class(
        &mut self,
        dest_class: &ClassType,
        src_class: &ClassType,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
    ) -> bool {
        let builtins = *self.interner.builtins();

        if dest_class.is_instantiable != src_class.is_instantiable {
            if !dest_class.is_instantiable && src_class.is_instantiable {
                // A class object is an instance of `type` (and of `object`).
                return dest_class.name == builtins.r#type.name
                    || dest_class.name == builtins.object.name;
            }
            return false;
        }

        // `object` is the top of the instance lattice.
        if dest_class.name == builtins.object.name && !dest_class.is_instantiable {
            return true;
        }

        // Literal destinations accept only the identical literal.
        if let Some(dest_literal) = &dest_class.literal {
            return src_class.name == dest_class.name
                && src_class.literal.as_ref() == Some(dest_literal);
        }

        if dest_class.is_typed_dict() {
            return self.assign_typed_dict(dest_class, src_class, flags);
        }

        // A TypedDict is a mapping; `dict[str, object]`-shaped destinations
        // accept it wholesale.
        if src_class.is_typed_dict() && dest_class.name == builtins.dict.name {
            return true;
        }

        // Tuple specializations.
        if dest_class.tuple_args.is_some() {
            if !derives_from(self.interner, src_class, builtins.tuple.name) {
                return false;
            }
            let src_entry = find_mro_entry(self.interner, src_class, builtins.tuple.name);
            let src_args = src_entry.and_then(|entry| entry.tuple_args);
            return self.assign_tuple_args(
                dest_class.tuple_args.as_deref().unwrap_or(&[]),
                src_args.as_deref(),
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
            );
        }

        // Nominal: the source (or an MRO ancestor) is the same generic
        // class; compare specializations under declared variance.
        if let Some(entry) = find_mro_entry(self.interner, src_class, dest_class.name) {
            return self.check_specialization(
                dest_class,
                &entry,
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
            );
        }

        // Structural: protocols are satisfied by declared members.
        if dest_class.is_protocol() {
            return self.assign_protocol(
                dest_class,
                src_class,
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
            );
        }

        // A class with an unresolved base could be anything.
        if src_class.flags.contains(ClassFlags::DERIVES_FROM_UNKNOWN) {
            return true;
        }

        false
    }

    fn check_specialization(
        &mut self,
        dest_class: &ClassType,
        src_entry: &ClassType,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
    ) -> bool {
        if let (Some(dest_tuple), src_tuple) =
            (dest_class.tuple_args.as_deref(), src_entry.tuple_args.as_deref())
        {
            return self.assign_tuple_args(
                dest_tuple,
                src_tuple,
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
            );
        }
        let Some(dest_args) = dest_class.type_args.as_deref() else {
            return true;
        };
        let Some(src_args) = src_entry.type_args.as_deref() else {
            // Unspecialized source: implicit Unknown arguments.
            return true;
        };
        if dest_args.len() != src_args.len() {
            return false;
        }
        for (index, (&dest_arg, &src_arg)) in dest_args.iter().zip(src_args.iter()).enumerate() {
            let variance = dest_class
                .type_params
                .get(index)
                .and_then(|&param| self.interner.type_var_of(param))
                .map_or(Variance::Invariant, |tv| tv.variance);
            let ok = match variance {
                Variance::Covariant => self.assign(
                    dest_arg,
                    src_arg,
                    None,
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags,
                ),
                Variance::Contravariant => self.assign(
                    src_arg,
                    dest_arg,
                    None,
                    src_ctx.as_deref_mut(),
                    dest_ctx.as_deref_mut(),
                    flags | AssignFlags::REVERSE_TYPE_VAR_MATCHING,
                ),
                Variance::Invariant => {
                    self.assign(
                        dest_arg,
                        src_arg,
                        None,
                        dest_ctx.as_deref_mut(),
                        src_ctx.as_deref_mut(),
                        flags,
                    ) && self.assign(
                        src_arg,
                        dest_arg,
                        None,
                        src_ctx.as_deref_mut(),
                        dest_ctx.as_deref_mut(),
                        flags | AssignFlags::REVERSE_TYPE_VAR_MATCHING,
                    )
                }
            };
            if !ok {
                return false;
            }
        }
        true
    }

    fn assign_tuple_args(
        &mut self,
        dest_args: &[TupleArg],
        src_args: Option<&[TupleArg]>,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
    ) -> bool {
        let Some(src_args) = src_args else {
            // Unspecialized tuple source.
            return true;
        };
        match dest_args {
            [only] if only.is_unbounded => src_args.iter().all(|src_arg| {
                self.assign(
                    only.ty,
                    src_arg.ty,
                    None,
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags,
                )
            }),
            _ => {
                if src_args.iter().any(|arg| arg.is_unbounded) {
                    return false;
                }
                if dest_args.len() != src_args.len() {
                    return false;
                }
                dest_args.iter().zip(src_args.iter()).all(|(d, s)| {
                    self.assign(
                        d.ty,
                        s.ty,
                        None,
                        dest_ctx.as_deref_mut(),
                        src_ctx.as_deref_mut(),
                        flags,
                    )
                })
            }
        }
    }

    fn assign_typed_dict(
        &mut self,
        dest_class: &ClassType,
        src_class: &ClassType,
        flags: AssignFlags,
    ) -> bool {
        if !src_class.is_typed_dict() {
            return false;
        }
        let dest_members = get_typed_dict_members(self.interner, dest_class, true);
        let src_members = get_typed_dict_members(self.interner, src_class, true);
        for (key, dest_member) in dest_members {
            // Every destination key must be declared by the source, even the
            // non-required ones.
            let Some((_, src_member)) = src_members.iter().find(|(name, _)| *name == key) else {
                return false;
            };
            if dest_member.is_required && !src_member.is_required && !src_member.is_provided {
                return false;
            }
            // A key writable-and-deletable through the destination view must
            // not be required in the source.
            if !dest_member.is_required && src_member.is_required {
                return false;
            }
            if !self.assign(
                dest_member.value_type,
                src_member.value_type,
                None,
                None,
                None,
                flags,
            ) {
                return false;
            }
            // Required entries are mutable through the destination view, so
            // the value types must agree in both directions.
            if dest_member.is_required
                && !self.assign(
                    src_member.value_type,
                    dest_member.value_type,
                    None,
                    None,
                    None,
                    flags,
                )
            {
                return false;
            }
        }
        true
    }

    fn assign_protocol(
        &mut self,
        dest_class: &ClassType,
        src_class: &ClassType,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
    ) -> bool {
        for &(name, member_ty) in &dest_class.fields {
            let Some(src_member) = lookup_member(self.interner, src_class, name) else {
                return false;
            };
            if !self.assign(
                member_ty,
                src_member,
                None,
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
            ) {
                return false;
            }
        }
        true
    }

    // =========================================================================
    // Functions
    // =========================================================================

    fn assign_to_function(
        &mut self,
        dest_func: &FunctionType,
        src: TypeId,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
    ) -> bool {
        match self.interner.lookup(src) {
            Some(TypeKey::Function(src_func)) => self.assign_function_to_function(
                dest_func,
                &src_func,
                dest_ctx.as_deref_mut(),
                src_ctx.as_deref_mut(),
                flags,
            ),
            Some(TypeKey::Overloaded(overloads)) => overloads.iter().any(|&overload| {
                let Some(src_func) = self.interner.function_of(overload) else {
                    return false;
                };
                self.assign_function_to_function(
                    dest_func,
                    &src_func,
                    dest_ctx.as_deref_mut(),
                    src_ctx.as_deref_mut(),
                    flags,
                )
            }),
            Some(TypeKey::Class(src_class)) if !src_class.is_instantiable => {
                let call_atom = self.interner.atom("__call__");
                match lookup_member(self.interner, &src_class, call_atom) {
                    Some(call_member) => {
                        let Some(src_func) = self.interner.function_of(call_member) else {
                            return false;
                        };
                        self.assign_function_to_function(
                            dest_func,
                            &src_func,
                            dest_ctx.as_deref_mut(),
                            src_ctx.as_deref_mut(),
                            flags,
                        )
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    fn assign_function_to_function(
        &mut self,
        dest_func: &FunctionType,
        src_func: &FunctionType,
        mut dest_ctx: Option<&mut TypeVarContext>,
        mut src_ctx: Option<&mut TypeVarContext>,
        flags: AssignFlags,
    ) -> bool {
        // Return types are covariant.
        if !self.assign(
            dest_func.return_type,
            src_func.return_type,
            None,
            dest_ctx.as_deref_mut(),
            src_ctx.as_deref_mut(),
            flags,
        ) {
            return false;
        }

        // Identical ParamSpec parameter lists match wholesale.
        if let (Some(dest_ps), Some(src_ps)) = (dest_func.param_spec, src_func.param_spec)
            && dest_ps == src_ps
        {
            return true;
        }

        let src_simple: Vec<&ParamInfo> = src_func
            .params
            .iter()
            .filter(|p| p.category == ParamCategory::Simple)
            .collect();
        let src_var_positional = src_func
            .params
            .iter()
            .find(|p| p.category == ParamCategory::VarPositional);
        let src_var_keyword = src_func
            .params
            .iter()
            .find(|p| p.category == ParamCategory::VarKeyword);

        let mut src_index = 0usize;
        for dest_param in &dest_func.params {
            match dest_param.category {
                ParamCategory::Simple => {
                    if let Some(src_param) = src_simple.get(src_index) {
                        src_index += 1;
                        // Parameters are contravariant.
                        if !self.assign(
                            src_param.ty,
                            dest_param.ty,
                            None,
                            src_ctx.as_deref_mut(),
                            dest_ctx.as_deref_mut(),
                            flags | AssignFlags::REVERSE_TYPE_VAR_MATCHING,
                        ) {
                            return false;
                        }
                    } else if let Some(var_pos) = src_var_positional {
                        if !self.assign(
                            var_pos.ty,
                            dest_param.ty,
                            None,
                            src_ctx.as_deref_mut(),
                            dest_ctx.as_deref_mut(),
                            flags | AssignFlags::REVERSE_TYPE_VAR_MATCHING,
                        ) {
                            return false;
                        }
                    } else {
                        return false;
                    }
                }
                ParamCategory::VarPositional => {
                    let Some(var_pos) = src_var_positional else {
                        return false;
                    };
                    if !self.assign(
                        var_pos.ty,
                        dest_param.ty,
                        None,
                        src_ctx.as_deref_mut(),
                        dest_ctx.as_deref_mut(),
                        flags | AssignFlags::REVERSE_TYPE_VAR_MATCHING,
                    ) {
                        return false;
                    }
                }
                ParamCategory::VarKeyword => {
                    let Some(var_kw) = src_var_keyword else {
                        return false;
                    };
                    if !self.assign(
                        var_kw.ty,
                        dest_param.ty,
                        None,
                        src_ctx.as_deref_mut(),
                        dest_ctx.as_deref_mut(),
                        flags | AssignFlags::REVERSE_TYPE_VAR_MATCHING,
                    ) {
                        return false;
                    }
                }
            }
        }

        // The source may declare extra positional parameters only when they
        // are defaulted.
        src_simple
            .iter()
            .skip(src_index)
            .all(|param| param.has_default)
    }

    /// Equivalence of parameter lists, ignoring return types. Used when a
    /// ParamSpec is re-bound.
    pub(crate) fn params_equivalent(&mut self, a: &[ParamInfo], b: &[ParamInfo]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b.iter()).all(|(pa, pb)| {
            pa.category == pb.category
                && self.is_assignable(pa.ty, pb.ty)
                && self.is_assignable(pb.ty, pa.ty)
        })
    }

    fn same_type_var(&self, a: TypeId, b: TypeId) -> bool {
        if self.interner.type_var_of(b).is_none() {
            return false;
        }
        canonical_type_var_key(self.interner, a) == canonical_type_var_key(self.interner, b)
    }
}

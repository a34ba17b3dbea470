//! Constraint-solver behavior: bound maintenance, constrained TypeVars,
//! ParamSpecs, and expected-type population.

use super::fixtures::*;
use crate::diagnostics::DiagAddendum;
use crate::intern::TypeInterner;
use crate::subtype::{AssignFlags, SubtypeChecker};
use crate::typevar_context::TypeVarContext;
use crate::types::*;

#[test]
fn first_assignment_sets_the_narrow_bound() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", Some(scope), |_| {});
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);

    assert!(checker.assign_type_var(
        t,
        builtins.int.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    assert_eq!(ctx.get(t).unwrap().narrow, Some(builtins.int.instance));
    assert_eq!(ctx.get(t).unwrap().wide, None);
}

#[test]
fn narrow_bound_only_widens() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", Some(scope), |_| {});
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);

    assert!(checker.assign_type_var(
        t,
        builtins.int.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    assert!(checker.assign_type_var(
        t,
        builtins.str.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    let narrow = ctx.get(t).unwrap().narrow.unwrap();
    let members = interner.subtypes_of(narrow);
    assert!(members.contains(&builtins.int.instance));
    assert!(members.contains(&builtins.str.instance));

    // A third assignment already inside the union is a no-op.
    assert!(checker.assign_type_var(
        t,
        builtins.int.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    assert_eq!(ctx.get(t).unwrap().narrow, Some(narrow));
}

#[test]
fn literals_are_stripped_unless_retention_is_requested() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", Some(scope), |_| {});
    let mut checker = SubtypeChecker::new(&interner);

    let mut ctx = TypeVarContext::new(scope);
    assert!(checker.assign_type_var(
        t,
        interner.literal_int(3),
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    assert_eq!(ctx.get(t).unwrap().narrow, Some(builtins.int.instance));

    let mut ctx = TypeVarContext::new(scope);
    assert!(checker.assign_type_var(
        t,
        interner.literal_int(3),
        None,
        &mut ctx,
        AssignFlags::RETAIN_LITERALS_FOR_TYPE_VAR
    ));
    assert_eq!(ctx.get(t).unwrap().narrow, Some(interner.literal_int(3)));
}

#[test]
fn scope_isolation_never_mutates_the_context() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let foreign = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", Some(foreign), |_| {});
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);
    let mut diag = DiagAddendum::new();

    assert!(!checker.assign_type_var(
        t,
        builtins.int.instance,
        Some(&mut diag),
        &mut ctx,
        AssignFlags::empty()
    ));
    assert!(ctx.is_empty());
    assert!(!diag.is_empty());

    // Any is accepted without binding.
    assert!(checker.assign_type_var(t, TypeId::ANY, None, &mut ctx, AssignFlags::empty()));
    assert!(ctx.is_empty());
}

#[test]
fn scope_violation_diagnostic_suppressed_for_synthesized() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let foreign = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", Some(foreign), |tv| {
        tv.flags = TypeVarFlags::SYNTHESIZED;
    });
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);
    let mut diag = DiagAddendum::new();

    assert!(!checker.assign_type_var(
        t,
        builtins.int.instance,
        Some(&mut diag),
        &mut ctx,
        AssignFlags::empty()
    ));
    assert!(diag.is_empty());
}

#[test]
fn type_var_without_scope_is_never_bound() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", None, |_| {});
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);

    assert!(!checker.assign_type_var(
        t,
        builtins.int.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    assert!(ctx.is_empty());
}

#[test]
fn locked_context_validates_only() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", Some(scope), |_| {});
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);

    assert!(checker.assign_type_var(
        t,
        builtins.int.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    ctx.lock();

    // Compatible source: validates fine, no widening needed.
    assert!(checker.assign_type_var(
        t,
        builtins.int.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    // Incompatible source would need widening: refused.
    let mut diag = DiagAddendum::new();
    assert!(!checker.assign_type_var(
        t,
        builtins.str.instance,
        Some(&mut diag),
        &mut ctx,
        AssignFlags::empty()
    ));
    assert!(!diag.is_empty());
    assert_eq!(ctx.get(t).unwrap().narrow, Some(builtins.int.instance));
}

#[test]
fn contravariant_mode_tightens_the_wide_bound() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let (animal_class, animal) = simple_class(&interner, "zoo.Animal", &[]);
    let (_, dog) = simple_class(&interner, "zoo.Dog", &[animal_class]);
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", Some(scope), |_| {});
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);

    assert!(checker.assign_type_var(
        t,
        animal,
        None,
        &mut ctx,
        AssignFlags::REVERSE_TYPE_VAR_MATCHING
    ));
    assert_eq!(ctx.get(t).unwrap().wide, Some(animal));

    // A narrower source tightens the wide bound.
    assert!(checker.assign_type_var(
        t,
        dog,
        None,
        &mut ctx,
        AssignFlags::REVERSE_TYPE_VAR_MATCHING
    ));
    assert_eq!(ctx.get(t).unwrap().wide, Some(dog));

    // A wider source leaves the tighter bound in place.
    assert!(checker.assign_type_var(
        t,
        animal,
        None,
        &mut ctx,
        AssignFlags::REVERSE_TYPE_VAR_MATCHING
    ));
    assert_eq!(ctx.get(t).unwrap().wide, Some(dog));

    // An unrelated source fails and leaves the context unchanged.
    assert!(!checker.assign_type_var(
        t,
        builtins.str.instance,
        None,
        &mut ctx,
        AssignFlags::REVERSE_TYPE_VAR_MATCHING
    ));
    assert_eq!(ctx.get(t).unwrap().wide, Some(dog));
}

#[test]
fn constrained_type_var_rejects_mixed_union() {
    // dest = T constrained by {str, bytes}, source str | bytes: two
    // unconditional subtypes map to different constraints.
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "AnyStr", Some(scope), |tv| {
        tv.constraints = vec![builtins.str.instance, builtins.bytes.instance];
    });
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);
    let mut diag = DiagAddendum::new();

    let union = interner.union2(builtins.str.instance, builtins.bytes.instance);
    assert!(!checker.assign_type_var(
        t,
        union,
        Some(&mut diag),
        &mut ctx,
        AssignFlags::empty()
    ));
    assert!(ctx.is_empty());
    assert!(!diag.is_empty());
}

#[test]
fn constrained_type_var_binds_the_narrowest_constraint() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "AnyStr", Some(scope), |tv| {
        tv.constraints = vec![builtins.str.instance, builtins.bytes.instance];
    });
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);

    assert!(checker.assign_type_var(
        t,
        interner.literal_str("x"),
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    let narrow = ctx.get(t).unwrap().narrow.unwrap();
    // The binding is the str constraint, tagged with its provenance.
    let class = interner.class_of(narrow).unwrap();
    assert_eq!(class.name, builtins.str.name);
    assert_eq!(
        interner.condition_set(narrow),
        vec![TypeCondition {
            type_var: interner.atom("AnyStr"),
            constraint_index: 0,
        }]
    );

    // Re-binding with a compatible source keeps the constraint.
    assert!(checker.assign_type_var(
        t,
        builtins.str.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    assert_eq!(ctx.get(t).unwrap().narrow, Some(narrow));

    // A source matching the other constraint fails.
    assert!(!checker.assign_type_var(
        t,
        builtins.bytes.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
}

#[test]
fn bounded_type_var_accepts_and_rejects_by_bound() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let fixture = sequence_fixture(&interner);
    let seq_int = specialize1(&interner, &fixture.sequence, builtins.int.instance);
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", Some(scope), |tv| {
        tv.bound = Some(seq_int);
    });
    let mut checker = SubtypeChecker::new(&interner);

    let list_int = list_of(&interner, &fixture, builtins.int.instance);
    let mut ctx = TypeVarContext::new(scope);
    assert!(checker.assign_type_var(t, list_int, None, &mut ctx, AssignFlags::empty()));
    assert_eq!(ctx.get(t).unwrap().narrow, Some(list_int));

    // int is not a Sequence[int]: bound violation, context unchanged.
    let mut diag = DiagAddendum::new();
    assert!(!checker.assign_type_var(
        t,
        builtins.int.instance,
        Some(&mut diag),
        &mut ctx,
        AssignFlags::empty()
    ));
    assert_eq!(ctx.get(t).unwrap().narrow, Some(list_int));
    assert!(!diag.is_empty());
}

#[test]
fn bounded_type_var_widens_then_degrades_past_the_threshold() {
    // Scenario: T bounded by Sequence[int]; list[int], then tuple[int, ...]
    // widen the narrow bound; a pathological union degrades to object.
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let fixture = sequence_fixture(&interner);
    let seq_int = specialize1(&interner, &fixture.sequence, builtins.int.instance);
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", Some(scope), |tv| {
        tv.bound = Some(seq_int);
    });
    let mut checker = SubtypeChecker::new(&interner);
    let mut ctx = TypeVarContext::new(scope);

    let list_int = list_of(&interner, &fixture, builtins.int.instance);
    assert!(checker.assign_type_var(t, list_int, None, &mut ctx, AssignFlags::empty()));
    assert_eq!(ctx.get(t).unwrap().narrow, Some(list_int));

    let tuple_int = unbounded_tuple_seq(&interner, &fixture, builtins.int.instance);
    assert!(checker.assign_type_var(t, tuple_int, None, &mut ctx, AssignFlags::empty()));
    let narrow = ctx.get(t).unwrap().narrow.unwrap();
    assert_eq!(
        interner.subtypes_of(narrow),
        vec![list_int, tuple_int]
    );

    // Seed a narrow bound past the pathological-union threshold, then widen
    // once more: the solver gives up and binds object.
    let huge: Vec<TypeId> = (0..65)
        .map(|i| {
            let elem = interner.literal_int(i);
            list_of(&interner, &fixture, elem)
        })
        .collect();
    ctx.set(t, Some(interner.union(huge)), None, true);
    assert!(checker.assign_type_var(t, list_int, None, &mut ctx, AssignFlags::empty()));
    assert_eq!(
        ctx.get(t).unwrap().narrow,
        Some(builtins.object.instance)
    );
}

#[test]
fn variadic_type_var_packages_and_refuses_widening() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let ts = type_var(&interner, "Ts", Some(scope), |tv| {
        tv.flags = TypeVarFlags::VARIADIC;
    });
    let mut checker = SubtypeChecker::new(&interner);
    let mut ctx = TypeVarContext::new(scope);

    // A non-tuple source is packaged into a synthetic unpacked tuple.
    assert!(checker.assign_type_var(
        ts,
        builtins.int.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    let narrow = ctx.get(ts).unwrap().narrow.unwrap();
    assert_eq!(narrow, interner.tuple_of(&[builtins.int.instance]));

    // Widening a variadic binding is refused.
    let mut diag = DiagAddendum::new();
    assert!(!checker.assign_type_var(
        ts,
        builtins.str.instance,
        Some(&mut diag),
        &mut ctx,
        AssignFlags::empty()
    ));
    assert!(!diag.is_empty());
    assert_eq!(ctx.get(ts).unwrap().narrow, Some(narrow));
}

#[test]
fn bare_type_instance_binds_instantiable_type_var_as_any() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", Some(scope), |tv| {
        tv.is_instantiable = true;
    });
    let mut checker = SubtypeChecker::new(&interner);
    let mut ctx = TypeVarContext::new(scope);

    assert!(checker.assign_type_var(
        t,
        builtins.r#type.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    let key = crate::type_ops::canonical_type_var_key(&interner, t);
    assert_eq!(ctx.get(key).unwrap().narrow, Some(TypeId::ANY));
}

#[test]
fn instantiable_type_var_converts_sources() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let t = type_var(&interner, "T", Some(scope), |tv| {
        tv.is_instantiable = true;
    });
    let mut checker = SubtypeChecker::new(&interner);
    let mut ctx = TypeVarContext::new(scope);

    assert!(checker.assign_type_var(
        t,
        builtins.int.instance,
        None,
        &mut ctx,
        AssignFlags::empty()
    ));
    let key = crate::type_ops::canonical_type_var_key(&interner, t);
    assert_eq!(ctx.get(key).unwrap().narrow, Some(builtins.int.class));

    // A module has no instantiable form.
    let module = interner.intern(TypeKey::Module(ModuleType {
        name: interner.atom("os"),
    }));
    let mut fresh = TypeVarContext::new(scope);
    assert!(!checker.assign_type_var(t, module, None, &mut fresh, AssignFlags::empty()));
}

// =============================================================================
// ParamSpecs
// =============================================================================

#[test]
fn param_spec_binds_a_function_parameter_list() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let p = type_var(&interner, "P", Some(scope), |tv| {
        tv.flags = TypeVarFlags::PARAM_SPEC;
    });
    let func = interner.intern(TypeKey::Function(FunctionType::new(
        interner.atom("handler"),
        vec![
            ParamInfo::positional(Some(interner.atom("a")), builtins.int.instance),
            ParamInfo::positional(Some(interner.atom("b")), builtins.str.instance),
        ],
        TypeId::NONE,
    )));
    let mut checker = SubtypeChecker::new(&interner);
    let mut ctx = TypeVarContext::new(scope);

    assert!(checker.assign_param_spec(p, func, None, &mut ctx));
    let entry = ctx.get_param_spec(p).expect("param spec was bound");
    assert_eq!(entry.params.len(), 2);
    assert_eq!(entry.params[0].ty, builtins.int.instance);

    // Re-binding with an equivalent signature is accepted; a different one
    // is not. The return type is ignored.
    let same_params_other_return = interner.intern(TypeKey::Function(FunctionType::new(
        interner.atom("other"),
        vec![
            ParamInfo::positional(Some(interner.atom("x")), builtins.int.instance),
            ParamInfo::positional(Some(interner.atom("y")), builtins.str.instance),
        ],
        builtins.int.instance,
    )));
    assert!(checker.assign_param_spec(p, same_params_other_return, None, &mut ctx));

    let different = interner.intern(TypeKey::Function(FunctionType::new(
        interner.atom("different"),
        vec![ParamInfo::positional(None, builtins.int.instance)],
        TypeId::NONE,
    )));
    let mut diag = DiagAddendum::new();
    assert!(!checker.assign_param_spec(p, different, Some(&mut diag), &mut ctx));
    assert!(!diag.is_empty());
}

#[test]
fn param_spec_rejects_non_function_sources() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let scope = interner.fresh_type_var_scope();
    let p = type_var(&interner, "P", Some(scope), |tv| {
        tv.flags = TypeVarFlags::PARAM_SPEC;
    });
    let mut checker = SubtypeChecker::new(&interner);
    let mut ctx = TypeVarContext::new(scope);

    let mut diag = DiagAddendum::new();
    assert!(!checker.assign_param_spec(p, builtins.int.instance, Some(&mut diag), &mut ctx));
    assert!(!diag.is_empty());
    // Any is accepted.
    assert!(checker.assign_param_spec(p, TypeId::ANY, None, &mut ctx));
}

// =============================================================================
// Expected-type population
// =============================================================================

#[test]
fn populate_same_generic_class_copies_arguments() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let fixture = sequence_fixture(&interner);
    let list_generic = fixture.list.instance;
    let expected = list_of(&interner, &fixture, builtins.int.instance);
    let scope = interner
        .type_var_of(fixture.list.param)
        .unwrap()
        .scope_id
        .unwrap();
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);

    assert!(checker.populate_context_from_expected_type(list_generic, expected, &mut ctx, &[]));
    let entry = ctx.get(fixture.list.param).expect("list param populated");
    // Invariant parameter: both bounds are pinned.
    assert_eq!(entry.narrow, Some(builtins.int.instance));
    assert_eq!(entry.wide, Some(builtins.int.instance));
}

#[test]
fn populate_supertype_infers_arguments_through_the_mro() {
    // Expected Sequence[int] against generic list[T] infers T = int.
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let fixture = sequence_fixture(&interner);
    let expected = specialize1(&interner, &fixture.sequence, builtins.int.instance);
    let scope = interner
        .type_var_of(fixture.list.param)
        .unwrap()
        .scope_id
        .unwrap();
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);

    assert!(checker.populate_context_from_expected_type(
        fixture.list.instance,
        expected,
        &mut ctx,
        &[]
    ));
    let entry = ctx.get(fixture.list.param).expect("list param populated");
    assert_eq!(entry.narrow, Some(builtins.int.instance));
}

#[test]
fn populate_fails_on_unrelated_expectation() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let fixture = sequence_fixture(&interner);
    let scope = interner
        .type_var_of(fixture.list.param)
        .unwrap()
        .scope_id
        .unwrap();
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);

    assert!(!checker.populate_context_from_expected_type(
        fixture.list.instance,
        builtins.int.instance,
        &mut ctx,
        &[]
    ));
}

#[test]
fn populate_union_expected_takes_the_first_match() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let fixture = sequence_fixture(&interner);
    let expected = interner.union2(
        builtins.int.instance,
        specialize1(&interner, &fixture.sequence, builtins.str.instance),
    );
    let scope = interner
        .type_var_of(fixture.list.param)
        .unwrap()
        .scope_id
        .unwrap();
    let mut ctx = TypeVarContext::new(scope);
    let mut checker = SubtypeChecker::new(&interner);

    assert!(checker.populate_context_from_expected_type(
        fixture.list.instance,
        expected,
        &mut ctx,
        &[]
    ));
    assert_eq!(
        ctx.get(fixture.list.param).unwrap().narrow,
        Some(builtins.str.instance)
    );
}

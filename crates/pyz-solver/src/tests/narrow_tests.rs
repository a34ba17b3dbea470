//! Guard-application behavior, including the soundness and exhaustiveness
//! properties narrowing promises the checker.

use super::fixtures::*;
use crate::intern::TypeInterner;
use crate::narrow::{NarrowingCallback, NarrowingContext, TypeGuard};
use crate::subtype::SubtypeChecker;
use crate::types::*;

fn narrow(interner: &TypeInterner, ty: TypeId, guard: &TypeGuard, positive: bool) -> TypeId {
    NarrowingContext::new(interner).narrow_type(ty, guard, positive)
}

// =============================================================================
// is None
// =============================================================================

#[test]
fn is_none_splits_optional() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let optional_int = interner.union2(builtins.int.instance, TypeId::NONE);
    let guard = TypeGuard::IsNone { is_operator: true };

    assert_eq!(narrow(&interner, optional_int, &guard, true), TypeId::NONE);
    assert_eq!(
        narrow(&interner, optional_int, &guard, false),
        builtins.int.instance
    );
}

#[test]
fn is_none_keeps_any_in_both_branches() {
    let interner = TypeInterner::new();
    let guard = TypeGuard::IsNone { is_operator: true };
    assert_eq!(narrow(&interner, TypeId::ANY, &guard, true), TypeId::ANY);
    assert_eq!(narrow(&interner, TypeId::ANY, &guard, false), TypeId::ANY);
}

#[test]
fn is_none_narrows_object_to_none() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let guard = TypeGuard::IsNone { is_operator: true };
    assert_eq!(
        narrow(&interner, builtins.object.instance, &guard, true),
        TypeId::NONE
    );
    // The negative branch cannot remove None from object.
    assert_eq!(
        narrow(&interner, builtins.object.instance, &guard, false),
        builtins.object.instance
    );
}

#[test]
fn tuple_entry_none_discriminates_tuples() {
    // x: tuple[int, str] | tuple[None, str], tested with `x[0] is None`.
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let with_int = interner.tuple_of(&[builtins.int.instance, builtins.str.instance]);
    let with_none = interner.tuple_of(&[TypeId::NONE, builtins.str.instance]);
    let union = interner.union2(with_int, with_none);
    let guard = TypeGuard::TupleEntryNone { index: 0 };

    assert_eq!(narrow(&interner, union, &guard, true), with_none);
    assert_eq!(narrow(&interner, union, &guard, false), with_int);

    // Unbounded tuples are preserved in both branches.
    let unbounded = interner.unbounded_tuple(builtins.int.instance);
    assert_eq!(narrow(&interner, unbounded, &guard, true), unbounded);
    assert_eq!(narrow(&interner, unbounded, &guard, false), unbounded);
}

// =============================================================================
// type(x) is Y
// =============================================================================

#[test]
fn class_is_replaces_with_the_filter_class() {
    let interner = TypeInterner::new();
    let (animal_class, animal) = simple_class(&interner, "zoo.Animal", &[]);
    let (dog_class, dog) = simple_class(&interner, "zoo.Dog", &[animal_class]);
    let guard = TypeGuard::ClassIs { class: dog_class };

    assert_eq!(narrow(&interner, animal, &guard, true), dog);
    // Negative narrowing cannot eliminate a non-final class.
    assert_eq!(narrow(&interner, animal, &guard, false), animal);

    // The exact same generic class is retained as-is.
    assert_eq!(narrow(&interner, dog, &guard, true), dog);
}

#[test]
fn class_is_negative_eliminates_final_matches() {
    let interner = TypeInterner::new();
    let (sealed_class, sealed) = class_with(&interner, "zoo.Sealed", &[], |c| {
        c.flags = ClassFlags::FINAL;
    });
    let (_, other) = simple_class(&interner, "zoo.Other", &[]);
    let union = interner.union2(sealed, other);
    let guard = TypeGuard::ClassIs { class: sealed_class };

    assert_eq!(narrow(&interner, union, &guard, false), other);
}

// =============================================================================
// Literal comparison
// =============================================================================

#[test]
fn bool_literal_comparison_enumerates() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let guard = TypeGuard::LiteralEquality {
        literal: interner.literal_bool(true),
        is_operator: true,
    };

    assert_eq!(
        narrow(&interner, builtins.bool.instance, &guard, true),
        interner.literal_bool(true)
    );
    assert_eq!(
        narrow(&interner, builtins.bool.instance, &guard, false),
        interner.literal_bool(false)
    );
}

#[test]
fn enum_literal_comparison_enumerates_members() {
    let interner = TypeInterner::new();
    let (color, members) = enum_class(&interner, "palette.Color", &["RED", "GREEN", "BLUE"]);
    let guard = TypeGuard::LiteralEquality {
        literal: members[0],
        is_operator: true,
    };

    assert_eq!(narrow(&interner, color, &guard, true), members[0]);
    let negative = narrow(&interner, color, &guard, false);
    let kept = interner.subtypes_of(negative);
    assert_eq!(kept.len(), 2);
    assert!(kept.contains(&members[1]));
    assert!(kept.contains(&members[2]));
}

#[test]
fn literal_comparison_on_matching_literal_subtypes() {
    let interner = TypeInterner::new();
    let one = interner.literal_int(1);
    let two = interner.literal_int(2);
    let union = interner.union2(one, two);
    let guard = TypeGuard::LiteralEquality {
        literal: one,
        is_operator: false,
    };

    assert_eq!(narrow(&interner, union, &guard, true), one);
    assert_eq!(narrow(&interner, union, &guard, false), two);
}

#[test]
fn equality_on_a_different_class_narrows_only_for_is() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let union = interner.union2(builtins.str.instance, TypeId::NONE);
    let literal = interner.literal_int(1);

    // `x == 1` cannot rule out str (custom __eq__), but None drops.
    let eq_guard = TypeGuard::LiteralEquality {
        literal,
        is_operator: false,
    };
    assert_eq!(
        narrow(&interner, union, &eq_guard, true),
        builtins.str.instance
    );

    // `x is 1` rules out both.
    let is_guard = TypeGuard::LiteralEquality {
        literal,
        is_operator: true,
    };
    assert_eq!(narrow(&interner, union, &is_guard, true), TypeId::NEVER);
}

// =============================================================================
// Discriminators
// =============================================================================

#[test]
fn member_discriminator_selects_the_variant() {
    // x: Circle | Square with kind: Literal["circle"] / Literal["square"].
    let interner = TypeInterner::new();
    let circle = discriminated_class(
        &interner,
        "shapes.Circle",
        "kind",
        interner.literal_str("circle"),
    );
    let square = discriminated_class(
        &interner,
        "shapes.Square",
        "kind",
        interner.literal_str("square"),
    );
    let shape = interner.union2(circle, square);
    let guard = TypeGuard::MemberEquality {
        member: interner.atom("kind"),
        literal: interner.literal_str("circle"),
        is_operator: false,
    };

    assert_eq!(narrow(&interner, shape, &guard, true), circle);
    assert_eq!(narrow(&interner, shape, &guard, false), square);
}

#[test]
fn member_discriminator_through_a_property_getter() {
    let interner = TypeInterner::new();
    let kind_atom = interner.atom("kind");
    let getter = interner.intern(TypeKey::Function(FunctionType {
        name: kind_atom,
        params: Vec::new(),
        return_type: interner.literal_str("circle"),
        flags: FunctionFlags::PROPERTY,
        type_guard: None,
        param_spec: None,
    }));
    let (_, circle) = class_with(&interner, "shapes.Circle", &[], |c| {
        c.fields = vec![(kind_atom, getter)];
    });
    let square = discriminated_class(
        &interner,
        "shapes.Square",
        "kind",
        interner.literal_str("square"),
    );
    let shape = interner.union2(circle, square);
    let guard = TypeGuard::MemberEquality {
        member: kind_atom,
        literal: interner.literal_str("circle"),
        is_operator: false,
    };

    assert_eq!(narrow(&interner, shape, &guard, true), circle);
}

#[test]
fn member_union_discriminator_keeps_overlapping_variants() {
    // status: Literal["a"] | Literal["b"] narrows only definite mismatches.
    let interner = TypeInterner::new();
    let ab = interner.union2(interner.literal_str("a"), interner.literal_str("b"));
    let (_, wide) = class_with(&interner, "m.Wide", &[], |c| {
        c.fields = vec![(interner.atom("status"), ab)];
    });
    let only_a = discriminated_class(&interner, "m.OnlyA", "status", interner.literal_str("a"));
    let union = interner.union2(wide, only_a);
    let guard = TypeGuard::MemberEquality {
        member: interner.atom("status"),
        literal: interner.literal_str("a"),
        is_operator: false,
    };

    // Both accept "a" in the positive branch.
    assert_eq!(narrow(&interner, union, &guard, true), union);
    // Negative drops only the single-literal variant.
    assert_eq!(narrow(&interner, union, &guard, false), wide);
}

#[test]
fn typed_dict_discriminator() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let ok = typed_dict(
        &interner,
        "api.Ok",
        &[
            ("status", interner.literal_str("ok"), true),
            ("data", builtins.str.instance, true),
        ],
        false,
    );
    let err = typed_dict(
        &interner,
        "api.Err",
        &[
            ("status", interner.literal_str("error"), true),
            ("message", builtins.str.instance, true),
        ],
        false,
    );
    let response = interner.union2(ok, err);
    let guard = TypeGuard::TypedDictDiscriminant {
        key: interner.atom("status"),
        literal: interner.literal_str("ok"),
    };

    assert_eq!(narrow(&interner, response, &guard, true), ok);
    assert_eq!(narrow(&interner, response, &guard, false), err);
}

#[test]
fn tuple_entry_equality_discriminates() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let tagged_a = interner.tuple_of(&[interner.literal_str("a"), builtins.int.instance]);
    let tagged_b = interner.tuple_of(&[interner.literal_str("b"), builtins.int.instance]);
    let union = interner.union2(tagged_a, tagged_b);
    let guard = TypeGuard::TupleEntryEquality {
        index: 0,
        literal: interner.literal_str("a"),
    };

    assert_eq!(narrow(&interner, union, &guard, true), tagged_a);
    assert_eq!(narrow(&interner, union, &guard, false), tagged_b);
}

#[test]
fn tuple_length_narrowing() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let pair = interner.tuple_of(&[builtins.int.instance, builtins.str.instance]);
    let single = interner.tuple_of(&[builtins.int.instance]);
    let unbounded = interner.unbounded_tuple(builtins.int.instance);
    let union = interner.union3(pair, single, unbounded);
    let guard = TypeGuard::TupleLength { length: 2 };

    assert_eq!(
        narrow(&interner, union, &guard, true),
        interner.union2(pair, unbounded)
    );
    assert_eq!(
        narrow(&interner, union, &guard, false),
        interner.union2(single, unbounded)
    );
}

// =============================================================================
// x.m is None
// =============================================================================

#[test]
fn member_is_none_positive_requires_a_none_possibility() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let optional = interner.union2(builtins.int.instance, TypeId::NONE);
    let (_, maybe) = class_with(&interner, "m.Maybe", &[], |c| {
        c.fields = vec![(interner.atom("value"), optional)];
    });
    let (_, definite) = class_with(&interner, "m.Definite", &[], |c| {
        c.fields = vec![(interner.atom("value"), builtins.int.instance)];
    });
    let union = interner.union2(maybe, definite);
    let guard = TypeGuard::MemberIsNone {
        member: interner.atom("value"),
    };

    assert_eq!(narrow(&interner, union, &guard, true), maybe);
    // The negative branch eliminates only members that are exactly None.
    assert_eq!(narrow(&interner, union, &guard, false), union);

    let (_, always_none) = class_with(&interner, "m.AlwaysNone", &[], |c| {
        c.fields = vec![(interner.atom("value"), TypeId::NONE)];
    });
    let with_always = interner.union2(definite, always_none);
    assert_eq!(narrow(&interner, with_always, &guard, false), definite);
}

// =============================================================================
// Containment
// =============================================================================

#[test]
fn in_container_refines_supertypes_to_the_literal_elements() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let element = interner.union2(interner.literal_str("a"), interner.literal_str("b"));
    let guard = TypeGuard::InContainer { element };

    // str is a supertype of Literal['a'] | Literal['b'] and strips to it.
    assert_eq!(
        narrow(&interner, builtins.str.instance, &guard, true),
        element
    );
    // Unrelated subtypes are eliminated.
    let union = interner.union2(builtins.str.instance, builtins.int.instance);
    assert_eq!(narrow(&interner, union, &guard, true), element);
    // The negative branch does not narrow.
    assert_eq!(narrow(&interner, union, &guard, false), union);
}

#[test]
fn typed_dict_key_marks_provided_entries() {
    // x: Movie | Book, tested with `"director" in x`.
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let movie = typed_dict(
        &interner,
        "media.Movie",
        &[
            ("title", builtins.str.instance, true),
            ("director", builtins.str.instance, true),
        ],
        false,
    );
    let book = typed_dict(
        &interner,
        "media.Book",
        &[("title", builtins.str.instance, true)],
        false,
    );
    let union = interner.union2(movie, book);
    let guard = TypeGuard::TypedDictKey {
        key: interner.atom("director"),
    };

    let narrowed = narrow(&interner, union, &guard, true);
    let members = interner.subtypes_of(narrowed);
    assert_eq!(members.len(), 2);
    assert!(members.contains(&movie));
    // Book was replaced by a variant marking the key as provided.
    let book_prime = members.into_iter().find(|&m| m != movie).unwrap();
    assert_ne!(book_prime, book);
    let class = interner.class_of(book_prime).unwrap();
    assert_eq!(
        class.narrowed_entry(interner.atom("director")),
        Some(NarrowedEntry { is_provided: true })
    );

    // The negative branch drops subtypes whose key is required or provided.
    assert_eq!(narrow(&interner, union, &guard, false), book);
    assert_eq!(narrow(&interner, narrowed, &guard, false), TypeId::NEVER);
}

#[test]
fn typed_dict_key_drops_final_dicts_lacking_the_key() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let movie = typed_dict(
        &interner,
        "media.Movie",
        &[("director", builtins.str.instance, true)],
        false,
    );
    let book = typed_dict(
        &interner,
        "media.SealedBook",
        &[("title", builtins.str.instance, true)],
        true,
    );
    let union = interner.union2(movie, book);
    let guard = TypeGuard::TypedDictKey {
        key: interner.atom("director"),
    };

    assert_eq!(narrow(&interner, union, &guard, true), movie);
}

// =============================================================================
// isinstance / issubclass
// =============================================================================

#[test]
fn isinstance_keeps_matching_subtypes() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let union = interner.union2(builtins.int.instance, builtins.str.instance);
    let guard = TypeGuard::IsInstance {
        filters: vec![builtins.int.class],
        is_subclass: false,
    };

    assert_eq!(
        narrow(&interner, union, &guard, true),
        builtins.int.instance
    );
    assert_eq!(
        narrow(&interner, union, &guard, false),
        builtins.str.instance
    );
}

#[test]
fn isinstance_replaces_any_with_the_filter_union() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let guard = TypeGuard::IsInstance {
        filters: vec![builtins.int.class, builtins.str.class],
        is_subclass: false,
    };

    assert_eq!(
        narrow(&interner, TypeId::ANY, &guard, true),
        interner.union2(builtins.int.instance, builtins.str.instance)
    );
    assert_eq!(narrow(&interner, TypeId::ANY, &guard, false), TypeId::ANY);
}

#[test]
fn isinstance_specializes_a_subclass_filter() {
    // x: Sequence[int], isinstance(x, list) keeps the element type.
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let fixture = sequence_fixture(&interner);
    let seq_int = specialize1(&interner, &fixture.sequence, builtins.int.instance);
    let guard = TypeGuard::IsInstance {
        filters: vec![fixture.list.class],
        is_subclass: false,
    };

    let narrowed = narrow(&interner, seq_int, &guard, true);
    let class = interner.class_of(narrowed).expect("narrowed to a class");
    assert_eq!(class.name, fixture.list.name);
    assert_eq!(class.type_args, Some(vec![builtins.int.instance]));
    assert!(!class.is_instantiable);
}

#[test]
fn isinstance_synthesizes_an_intersection_on_the_second_pass() {
    let interner = TypeInterner::new();
    let (_, left) = simple_class(&interner, "m.Left", &[]);
    let (right_class, _) = simple_class(&interner, "m.Right", &[]);
    let guard = TypeGuard::IsInstance {
        filters: vec![right_class],
        is_subclass: false,
    };

    let narrowed = narrow(&interner, left, &guard, true);
    let class = interner.class_of(narrowed).expect("intersection class");
    assert_eq!(
        &*interner.resolve_atom(class.name),
        "<subclass of Left and Right>"
    );
    assert!(class.flags.contains(ClassFlags::SYNTHESIZED));

    // Repeated narrowing of the same pair yields the same identity.
    assert_eq!(narrow(&interner, left, &guard, true), narrowed);

    // A final subtype cannot be intersected away.
    let (_, sealed) = class_with(&interner, "m.Sealed", &[], |c| {
        c.flags = ClassFlags::FINAL;
    });
    assert_eq!(narrow(&interner, sealed, &guard, true), TypeId::NEVER);
}

#[test]
fn isinstance_type_filter_separates_classes_from_instances() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let union = interner.union2(builtins.int.class, builtins.int.instance);
    let guard = TypeGuard::IsInstance {
        filters: vec![builtins.r#type.class],
        is_subclass: false,
    };

    assert_eq!(narrow(&interner, union, &guard, true), builtins.int.class);
    assert_eq!(
        narrow(&interner, union, &guard, false),
        builtins.int.instance
    );
}

#[test]
fn issubclass_narrows_class_objects() {
    let interner = TypeInterner::new();
    let (animal_class, _) = simple_class(&interner, "zoo.Animal", &[]);
    let (dog_class, _) = simple_class(&interner, "zoo.Dog", &[animal_class]);
    let (rock_class, _) = simple_class(&interner, "zoo.Rock", &[]);
    let union = interner.union2(dog_class, rock_class);
    let guard = TypeGuard::IsInstance {
        filters: vec![animal_class],
        is_subclass: true,
    };

    assert_eq!(narrow(&interner, union, &guard, true), dog_class);
    assert_eq!(narrow(&interner, union, &guard, false), rock_class);
}

#[test]
fn isinstance_with_none_filter() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let optional = interner.union2(builtins.str.instance, TypeId::NONE);
    let guard = TypeGuard::IsInstance {
        filters: vec![TypeId::NONE_TYPE],
        is_subclass: false,
    };

    assert_eq!(narrow(&interner, optional, &guard, true), TypeId::NONE);
    assert_eq!(
        narrow(&interner, optional, &guard, false),
        builtins.str.instance
    );
}

// =============================================================================
// callable()
// =============================================================================

#[test]
fn callable_filters_out_non_callables() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let func = interner.intern(TypeKey::Function(FunctionType::new(
        interner.atom("f"),
        Vec::new(),
        TypeId::NONE,
    )));
    let union = interner.union3(func, TypeId::NONE, builtins.int.class);
    let guard = TypeGuard::Callable;

    assert_eq!(
        narrow(&interner, union, &guard, true),
        interner.union2(func, builtins.int.class)
    );
    assert_eq!(narrow(&interner, union, &guard, false), TypeId::NONE);
}

#[test]
fn callable_keeps_instances_with_dunder_call() {
    let interner = TypeInterner::new();
    let call_atom = interner.atom("__call__");
    let call_fn = interner.intern(TypeKey::Function(FunctionType::new(
        call_atom,
        Vec::new(),
        TypeId::NONE,
    )));
    let (_, functor) = class_with(&interner, "m.Functor", &[], |c| {
        c.fields = vec![(call_atom, call_fn)];
    });
    let guard = TypeGuard::Callable;

    assert_eq!(narrow(&interner, functor, &guard, true), functor);
    assert_eq!(narrow(&interner, functor, &guard, false), TypeId::NEVER);
}

#[test]
fn callable_synthesizes_for_plain_instances() {
    let interner = TypeInterner::new();
    let (_, plain) = simple_class(&interner, "m.Plain", &[]);
    let guard = TypeGuard::Callable;

    // Nothing survives the first pass, so the second pass synthesizes an
    // intersection with a callable protocol.
    let narrowed = narrow(&interner, plain, &guard, true);
    let class = interner.class_of(narrowed).expect("synthesized class");
    assert!(class.flags.contains(ClassFlags::SYNTHESIZED));
    // And the plain instance survives the negative branch.
    assert_eq!(narrow(&interner, plain, &guard, false), plain);
}

// =============================================================================
// User-defined type guards
// =============================================================================

#[test]
fn type_guard_replaces_the_positive_branch() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let union = interner.union2(builtins.int.instance, builtins.str.instance);
    let guard = TypeGuard::Predicate {
        guarded: builtins.str.instance,
        is_strict: false,
    };

    assert_eq!(
        narrow(&interner, union, &guard, true),
        builtins.str.instance
    );
    // Non-strict guards leave the negative branch alone.
    assert_eq!(narrow(&interner, union, &guard, false), union);
}

#[test]
fn strict_type_guard_narrows_both_branches() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let union = interner.union2(builtins.int.instance, builtins.str.instance);
    let guard = TypeGuard::Predicate {
        guarded: builtins.str.instance,
        is_strict: true,
    };

    assert_eq!(
        narrow(&interner, union, &guard, true),
        builtins.str.instance
    );
    assert_eq!(
        narrow(&interner, union, &guard, false),
        builtins.int.instance
    );
}

// =============================================================================
// Truthiness
// =============================================================================

#[test]
fn truthiness_splits_optionals_and_scalars() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let optional_int = interner.union2(builtins.int.instance, TypeId::NONE);
    let guard = TypeGuard::Truthy;

    assert_eq!(
        narrow(&interner, optional_int, &guard, true),
        builtins.int.instance
    );
    assert_eq!(
        narrow(&interner, optional_int, &guard, false),
        interner.union2(interner.literal_int(0), TypeId::NONE)
    );

    assert_eq!(
        narrow(&interner, builtins.bool.instance, &guard, true),
        interner.literal_bool(true)
    );
    assert_eq!(
        narrow(&interner, builtins.bool.instance, &guard, false),
        interner.literal_bool(false)
    );
}

#[test]
fn truthiness_drops_known_literals() {
    let interner = TypeInterner::new();
    let empty = interner.literal_str("");
    let hello = interner.literal_str("hello");
    let union = interner.union2(empty, hello);
    let guard = TypeGuard::Truthy;

    assert_eq!(narrow(&interner, union, &guard, true), hello);
    assert_eq!(narrow(&interner, union, &guard, false), empty);
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn narrowing_is_exhaustive_across_branches() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let inputs = vec![
        interner.union2(builtins.int.instance, TypeId::NONE),
        interner.union2(builtins.bool.instance, builtins.str.instance),
        builtins.object.instance,
    ];
    let guards = vec![
        TypeGuard::IsNone { is_operator: true },
        TypeGuard::Truthy,
        TypeGuard::IsInstance {
            filters: vec![builtins.int.class],
            is_subclass: false,
        },
    ];
    for ty in &inputs {
        for guard in &guards {
            let positive = narrow(&interner, *ty, guard, true);
            let negative = narrow(&interner, *ty, guard, false);
            let both = interner.union2(positive, negative);
            let mut checker = SubtypeChecker::new(&interner);
            assert!(
                checker.is_assignable(both, *ty),
                "value dropped from both branches: {ty:?} under {guard:?}"
            );
        }
    }
}

#[test]
fn callbacks_are_pure() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let optional = interner.union2(builtins.int.instance, TypeId::NONE);
    let callback = NarrowingCallback::new(TypeGuard::IsNone { is_operator: true }, false);
    let cloned = callback.clone();
    let context = NarrowingContext::new(&interner);

    let first = callback.apply(&context, optional);
    let second = callback.apply(&context, optional);
    let third = cloned.apply(&context, optional);
    assert_eq!(first, second);
    assert_eq!(first, third);
    assert_eq!(first, builtins.int.instance);
}

#[test]
fn narrowing_a_recursive_alias_terminates() {
    let interner = TypeInterner::new();
    let builtins = *interner.builtins();
    let alias = interner.alias(interner.atom("Tree"));
    let node = interner.tuple_of(&[builtins.int.instance, alias]);
    interner.set_alias_target(alias, interner.union2(node, TypeId::NONE));

    let guard = TypeGuard::IsNone { is_operator: true };
    assert_eq!(narrow(&interner, alias, &guard, true), TypeId::NONE);
    assert_eq!(narrow(&interner, alias, &guard, false), node);
}

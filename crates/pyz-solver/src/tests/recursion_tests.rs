use crate::recursion::{DepthCounter, RecursionGuard, RecursionProfile, RecursionResult};

#[test]
fn profile_limits() {
    assert_eq!(RecursionProfile::SubtypeCheck.max_depth(), 100);
    assert_eq!(RecursionProfile::TypeVarSolve.max_depth(), 50);
    assert_eq!(RecursionProfile::Narrowing.max_depth(), 50);
    assert_eq!(RecursionProfile::ShallowTraversal.max_depth(), 20);
    let custom = RecursionProfile::Custom {
        max_depth: 7,
        max_iterations: 42,
    };
    assert_eq!(custom.max_depth(), 7);
    assert_eq!(custom.max_iterations(), 42);
}

#[test]
fn all_profiles_have_valid_limits() {
    let profiles = [
        RecursionProfile::SubtypeCheck,
        RecursionProfile::TypeVarSolve,
        RecursionProfile::Narrowing,
        RecursionProfile::ShallowTraversal,
    ];
    for profile in profiles {
        assert!(profile.max_depth() > 0, "{profile:?} has zero max_depth");
        assert!(
            profile.max_iterations() >= profile.max_depth(),
            "{profile:?} has max_iterations < max_depth"
        );
        let guard = RecursionGuard::<u32>::with_profile(profile);
        assert_eq!(guard.max_depth(), profile.max_depth());
    }
}

#[test]
fn basic_enter_leave() {
    let mut guard = RecursionGuard::new(10, 100);
    assert_eq!(guard.enter(1u32), RecursionResult::Entered);
    assert_eq!(guard.depth(), 1);
    assert!(guard.is_visiting(&1));
    assert!(guard.is_active());

    guard.leave(1);
    assert_eq!(guard.depth(), 0);
    assert!(!guard.is_visiting(&1));
    assert!(!guard.is_active());
}

#[test]
fn cycle_detected_on_same_key() {
    let mut guard = RecursionGuard::new(10, 100);
    assert_eq!(guard.enter((1u32, 2u32)), RecursionResult::Entered);
    assert_eq!(guard.enter((1u32, 2u32)), RecursionResult::Cycle);
    // Direction matters for pair keys.
    assert_eq!(guard.enter((2u32, 1u32)), RecursionResult::Entered);
    guard.leave((2, 1));
    guard.leave((1, 2));
}

#[test]
fn depth_exceeded_is_sticky() {
    let mut guard = RecursionGuard::new(2, 100);
    assert_eq!(guard.enter(1u32), RecursionResult::Entered);
    assert_eq!(guard.enter(2u32), RecursionResult::Entered);
    assert_eq!(guard.enter(3u32), RecursionResult::DepthExceeded);
    assert!(guard.is_exceeded());
    guard.leave(2);
    guard.leave(1);
    // The sticky flag survives unwinding.
    assert!(guard.is_exceeded());
    assert_eq!(guard.depth(), 0);
}

#[test]
fn iteration_limit() {
    let mut guard = RecursionGuard::new(100, 3);
    for key in 0u32..3 {
        assert_eq!(guard.enter(key), RecursionResult::Entered);
        guard.leave(key);
    }
    assert_eq!(guard.enter(4u32), RecursionResult::IterationExceeded);
    assert!(guard.is_exceeded());
}

#[test]
fn denied_entries_still_count_iterations() {
    let mut guard = RecursionGuard::new(10, 100);
    assert_eq!(guard.enter(1u32), RecursionResult::Entered);
    assert_eq!(guard.iterations(), 1);
    assert_eq!(guard.enter(1u32), RecursionResult::Cycle);
    assert_eq!(guard.iterations(), 2);
    guard.leave(1);
}

#[test]
fn scope_enters_and_leaves() {
    let mut guard = RecursionGuard::new(10, 100);
    let result = guard.scope(1u32, || 42);
    assert_eq!(result, Ok(42));
    assert!(!guard.is_visiting(&1));
    assert_eq!(guard.depth(), 0);

    assert_eq!(guard.enter(1u32), RecursionResult::Entered);
    assert_eq!(guard.scope(1u32, || 42), Err(RecursionResult::Cycle));
    guard.leave(1);
}

#[test]
fn reset_clears_state_and_preserves_limits() {
    let mut guard = RecursionGuard::new(42, 999).with_max_visiting(7);
    assert_eq!(guard.enter(1u32), RecursionResult::Entered);
    guard.mark_exceeded();
    guard.reset();
    assert_eq!(guard.depth(), 0);
    assert_eq!(guard.iterations(), 0);
    assert!(!guard.is_exceeded());
    assert_eq!(guard.max_depth(), 42);
    assert_eq!(guard.max_iterations(), 999);
}

#[test]
fn max_visiting_enforced() {
    let mut guard = RecursionGuard::new(1000, 100_000).with_max_visiting(2);
    assert_eq!(guard.enter(1u32), RecursionResult::Entered);
    assert_eq!(guard.enter(2u32), RecursionResult::Entered);
    assert_eq!(guard.enter(3u32), RecursionResult::DepthExceeded);
    guard.leave(2);
    guard.leave(1);
}

#[test]
fn result_helpers() {
    assert!(RecursionResult::Entered.is_entered());
    assert!(!RecursionResult::Entered.is_denied());
    assert!(RecursionResult::Cycle.is_cycle());
    assert!(RecursionResult::Cycle.is_denied());
    assert!(!RecursionResult::Cycle.is_exceeded());
    assert!(RecursionResult::DepthExceeded.is_exceeded());
    assert!(RecursionResult::IterationExceeded.is_exceeded());
}

#[test]
fn depth_counter_basics() {
    let mut counter = DepthCounter::new(2);
    assert!(counter.enter());
    assert!(counter.enter());
    assert!(!counter.enter());
    assert!(counter.is_exceeded());
    counter.leave();
    counter.leave();
    assert_eq!(counter.depth(), 0);
    // Sticky until reset.
    assert!(counter.is_exceeded());
    counter.reset();
    assert!(!counter.is_exceeded());
}

#[test]
fn depth_counter_with_initial_depth() {
    let mut counter = DepthCounter::with_initial_depth(10, 5);
    assert_eq!(counter.depth(), 5);
    for _ in 0..5 {
        assert!(counter.enter());
    }
    assert!(!counter.enter());
    for _ in 0..5 {
        counter.leave();
    }
    assert_eq!(counter.depth(), 5);
    counter.reset();
    assert_eq!(counter.depth(), 5);
}

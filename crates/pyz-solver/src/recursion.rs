//! Recursion guards.
//!
//! Recursive type structures (self-referential aliases, recursive protocols,
//! mutually recursive solve/assign calls) are bounded by explicit guards
//! rather than by the call stack. The profiles below are the single source
//! of truth for engine recursion limits; exceeding a limit makes the caller
//! return a conservative answer (subtype/solve: success; narrowing:
//! identity), which guarantees termination.

use rustc_hash::FxHashSet;
use std::hash::Hash;

/// Named recursion budgets for the engine entry points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecursionProfile {
    /// Assignability checks; pairs of types re-entered along a cycle are the
    /// common case here.
    SubtypeCheck,
    /// Type-variable solving, including the callbacks from the assignability
    /// judgment.
    TypeVarSolve,
    /// Narrowing-callback construction and application.
    Narrowing,
    /// Short walks that should never be deep (alias expansion, conversion).
    ShallowTraversal,
    Custom {
        max_depth: u32,
        max_iterations: u32,
    },
}

impl RecursionProfile {
    pub const fn max_depth(self) -> u32 {
        match self {
            RecursionProfile::SubtypeCheck => 100,
            RecursionProfile::TypeVarSolve => 50,
            RecursionProfile::Narrowing => 50,
            RecursionProfile::ShallowTraversal => 20,
            RecursionProfile::Custom { max_depth, .. } => max_depth,
        }
    }

    pub const fn max_iterations(self) -> u32 {
        match self {
            RecursionProfile::Custom { max_iterations, .. } => max_iterations,
            _ => 100_000,
        }
    }
}

/// Outcome of attempting to enter a guarded recursion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecursionResult {
    Entered,
    /// The key is already on the active path.
    Cycle,
    DepthExceeded,
    IterationExceeded,
}

impl RecursionResult {
    pub const fn is_entered(self) -> bool {
        matches!(self, RecursionResult::Entered)
    }

    pub const fn is_cycle(self) -> bool {
        matches!(self, RecursionResult::Cycle)
    }

    pub const fn is_exceeded(self) -> bool {
        matches!(
            self,
            RecursionResult::DepthExceeded | RecursionResult::IterationExceeded
        )
    }

    pub const fn is_denied(self) -> bool {
        !self.is_entered()
    }
}

/// A depth- and cycle-tracking guard keyed by an arbitrary hashable key
/// (typically a `TypeId` or a `(TypeId, TypeId)` pair).
pub struct RecursionGuard<K> {
    visiting: FxHashSet<K>,
    depth: u32,
    iterations: u32,
    max_depth: u32,
    max_iterations: u32,
    max_visiting: usize,
    exceeded: bool,
}

impl<K: Hash + Eq + Clone> RecursionGuard<K> {
    pub fn new(max_depth: u32, max_iterations: u32) -> Self {
        Self {
            visiting: FxHashSet::default(),
            depth: 0,
            iterations: 0,
            max_depth,
            max_iterations,
            max_visiting: usize::MAX,
            exceeded: false,
        }
    }

    pub fn with_profile(profile: RecursionProfile) -> Self {
        Self::new(profile.max_depth(), profile.max_iterations())
    }

    pub fn with_max_visiting(mut self, max_visiting: usize) -> Self {
        self.max_visiting = max_visiting;
        self
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn visiting_count(&self) -> usize {
        self.visiting.len()
    }

    pub fn is_visiting(&self, key: &K) -> bool {
        self.visiting.contains(key)
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    /// True once any limit has been hit. Sticky until `reset`.
    pub fn is_exceeded(&self) -> bool {
        self.exceeded
    }

    pub fn mark_exceeded(&mut self) {
        self.exceeded = true;
    }

    /// Try to enter a recursion keyed by `key`.
    ///
    /// Check order: iteration budget, then depth, then cycle, then the
    /// visiting-set capacity. Denied entries still count as iterations.
    pub fn enter(&mut self, key: K) -> RecursionResult {
        self.iterations = self.iterations.saturating_add(1);
        if self.iterations > self.max_iterations {
            self.exceeded = true;
            return RecursionResult::IterationExceeded;
        }
        if self.depth >= self.max_depth {
            self.exceeded = true;
            return RecursionResult::DepthExceeded;
        }
        if self.visiting.contains(&key) {
            return RecursionResult::Cycle;
        }
        if self.visiting.len() >= self.max_visiting {
            self.exceeded = true;
            return RecursionResult::DepthExceeded;
        }
        self.visiting.insert(key);
        self.depth += 1;
        RecursionResult::Entered
    }

    /// Leave a recursion previously entered with the same key.
    pub fn leave(&mut self, key: K) {
        let removed = self.visiting.remove(&key);
        debug_assert!(removed, "leave() for a key not in the visiting set");
        if removed {
            self.depth = self.depth.saturating_sub(1);
        }
    }

    /// Run `f` inside an enter/leave pair, or report why entry was denied.
    pub fn scope<T>(&mut self, key: K, f: impl FnOnce() -> T) -> Result<T, RecursionResult> {
        match self.enter(key.clone()) {
            RecursionResult::Entered => {
                let value = f();
                self.leave(key);
                Ok(value)
            }
            denied => Err(denied),
        }
    }

    /// Clear all tracking state, preserving the configured limits.
    pub fn reset(&mut self) {
        self.visiting.clear();
        self.depth = 0;
        self.iterations = 0;
        self.exceeded = false;
    }
}

/// A plain nesting-depth counter for recursions that need no cycle
/// detection.
pub struct DepthCounter {
    depth: u32,
    base_depth: u32,
    max_depth: u32,
    exceeded: bool,
}

impl DepthCounter {
    pub fn new(max_depth: u32) -> Self {
        Self::with_initial_depth(max_depth, 0)
    }

    pub fn with_profile(profile: RecursionProfile) -> Self {
        Self::new(profile.max_depth())
    }

    /// A counter that starts partway down, for threading an ambient depth
    /// into a nested engine.
    pub fn with_initial_depth(max_depth: u32, depth: u32) -> Self {
        Self {
            depth,
            base_depth: depth,
            max_depth,
            exceeded: false,
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_exceeded(&self) -> bool {
        self.exceeded
    }

    pub fn mark_exceeded(&mut self) {
        self.exceeded = true;
    }

    /// Returns false (and sets the sticky exceeded flag) when the budget is
    /// exhausted.
    pub fn enter(&mut self) -> bool {
        if self.depth >= self.max_depth {
            self.exceeded = true;
            return false;
        }
        self.depth += 1;
        true
    }

    pub fn leave(&mut self) {
        debug_assert!(self.depth > self.base_depth, "leave() at depth 0");
        self.depth = self.depth.saturating_sub(1).max(self.base_depth);
    }

    /// Clear tracking state back to the base depth, preserving the limit.
    pub fn reset(&mut self) {
        self.depth = self.base_depth;
        self.exceeded = false;
    }
}

//! Cooperative cancellation.
//!
//! The solver and the narrowing engine poll a `CancellationToken` at each
//! subtype map and each solver recursion. A cancelled token makes the
//! engines return a conservative answer immediately (solver: success with no
//! context mutation; narrowing: identity); the caller that observed the
//! cancellation discards the results, so no partial state is visible.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cloneable cancellation flag shared between a host and the engines it
/// drives.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones of this token observe the flag.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Poll the flag.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}

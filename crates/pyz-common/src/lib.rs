//! Common types and utilities for the pyz type checker.
//!
//! This crate provides foundational types used across all pyz crates:
//! - String interning (`Atom`, `StringInterner`)
//! - Source spans (`Span`)
//! - Centralized limits and thresholds
//! - Cooperative cancellation (`CancellationToken`)
//! - Diagnostic primitives

// String interning for identifier deduplication
pub mod interner;
pub use interner::{Atom, StringInterner};

// Span - Source location tracking (byte offsets)
pub mod span;
pub use span::Span;

// Centralized limits and thresholds
pub mod limits;

// Cooperative cancellation
pub mod cancellation;
pub use cancellation::CancellationToken;

// Diagnostic primitives
pub mod diagnostics;
pub use diagnostics::{Diagnostic, DiagnosticCategory};

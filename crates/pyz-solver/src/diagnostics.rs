//! Structured diagnostic addenda.
//!
//! The solver never raises for predictable mismatches: it returns `false`
//! and, when the caller supplied a sink, records what failed in structured
//! terms. The surrounding checker turns addenda into user-facing messages;
//! `format` here exists for tests and logs and delegates type rendering to
//! the `display` module.

use pyz_common::interner::Atom;

use crate::display::format_type;
use crate::intern::TypeInterner;
use crate::types::TypeId;

/// The structured description of one mismatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MismatchKind {
    /// Plain assignability failure.
    TypeIncompatible { dest: TypeId, src: TypeId },
    /// The surviving bound is not assignable to the TypeVar's declared
    /// bound.
    TypeVarBoundViolation {
        type_var: Atom,
        bound: TypeId,
        actual: TypeId,
    },
    /// No constraint of a constrained TypeVar accepts the source.
    TypeVarConstraintViolation { type_var: Atom, src: TypeId },
    /// Two unconditional source subtypes map to different constraints.
    TypeVarConstraintAmbiguity {
        type_var: Atom,
        first: TypeId,
        second: TypeId,
    },
    /// Binding attempted outside the context's solve-for scopes.
    TypeVarScopeViolation { type_var: Atom, src: TypeId },
    /// Widening refused because the context is locked.
    LockedContextRefusal {
        type_var: Atom,
        existing: TypeId,
        requested: TypeId,
    },
    /// Widening refused because the destination is variadic.
    VariadicWideningRefusal { type_var: Atom },
    /// A ParamSpec destination needs a function-shaped source.
    ParamSpecFunctionExpected { src: TypeId },
    /// Re-binding a ParamSpec to an incompatible parameter list.
    ParamSpecSignatureMismatch { param_spec: Atom },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiagAddendum {
    entries: Vec<AddendumEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddendumEntry {
    pub kind: MismatchKind,
    pub nested: DiagAddendum,
}

impl DiagAddendum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: MismatchKind) {
        self.entries.push(AddendumEntry {
            kind,
            nested: DiagAddendum::new(),
        });
    }

    pub fn add_nested(&mut self, kind: MismatchKind, nested: DiagAddendum) {
        self.entries.push(AddendumEntry { kind, nested });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AddendumEntry] {
        &self.entries
    }

    /// Render the addendum tree as indented lines.
    pub fn format(&self, interner: &TypeInterner) -> Vec<String> {
        let mut lines = Vec::new();
        self.format_into(interner, 0, &mut lines);
        lines
    }

    fn format_into(&self, interner: &TypeInterner, indent: usize, lines: &mut Vec<String>) {
        let pad = "  ".repeat(indent);
        for entry in &self.entries {
            lines.push(format!("{pad}{}", entry.kind.render(interner)));
            entry.nested.format_into(interner, indent + 1, lines);
        }
    }
}

impl MismatchKind {
    fn render(&self, interner: &TypeInterner) -> String {
        let name = |atom: &Atom| interner.resolve_atom(*atom);
        let ty = |id: &TypeId| format_type(interner, *id);
        match self {
            MismatchKind::TypeIncompatible { dest, src } => {
                format!("type \"{}\" is not assignable to \"{}\"", ty(src), ty(dest))
            }
            MismatchKind::TypeVarBoundViolation {
                type_var,
                bound,
                actual,
            } => format!(
                "type \"{}\" is not assignable to the bound \"{}\" of \"{}\"",
                ty(actual),
                ty(bound),
                name(type_var)
            ),
            MismatchKind::TypeVarConstraintViolation { type_var, src } => format!(
                "type \"{}\" satisfies no constraint of \"{}\"",
                ty(src),
                name(type_var)
            ),
            MismatchKind::TypeVarConstraintAmbiguity {
                type_var,
                first,
                second,
            } => format!(
                "subtypes of the source map to both \"{}\" and \"{}\" for \"{}\"",
                ty(first),
                ty(second),
                name(type_var)
            ),
            MismatchKind::TypeVarScopeViolation { type_var, src } => format!(
                "\"{}\" cannot be bound to \"{}\" outside its solve scope",
                name(type_var),
                ty(src)
            ),
            MismatchKind::LockedContextRefusal {
                type_var,
                existing,
                requested,
            } => format!(
                "cannot widen \"{}\" from \"{}\" to \"{}\" in a locked context",
                name(type_var),
                ty(existing),
                ty(requested)
            ),
            MismatchKind::VariadicWideningRefusal { type_var } => {
                format!("variadic \"{}\" refuses union widening", name(type_var))
            }
            MismatchKind::ParamSpecFunctionExpected { src } => format!(
                "expected a function or parameter specification, found \"{}\"",
                ty(src)
            ),
            MismatchKind::ParamSpecSignatureMismatch { param_spec } => format!(
                "parameter list is incompatible with the existing binding of \"{}\"",
                name(param_spec)
            ),
        }
    }
}

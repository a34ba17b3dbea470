//! Pure tree predicates and queries.
//!
//! Every query here is a single bounded walk up or down the tree. Nothing
//! mutates the arena and nothing consults a cache; the only inputs are the
//! arena and the node indices handed in.

use pyz_common::interner::Atom;
use pyz_common::limits::MAX_TREE_WALK_ITERATIONS;
use pyz_common::span::Span;

use crate::node::{NodeArena, NodeIndex, StringKind, SyntaxKind, UnaryOperator};

// =============================================================================
// Enclosing scopes
// =============================================================================

/// Find the nearest enclosing scope node (function, lambda, class, module,
/// or comprehension) of `idx`, not counting `idx` itself.
///
/// A decorator is not "inside" the function or class it decorates: walking up
/// from a decorator expression skips the decorated definition and lands in
/// the scope that contains it.
pub fn enclosing_scope(arena: &NodeArena, idx: NodeIndex) -> NodeIndex {
    let mut prev = idx;
    let mut current = arena.parent(idx);
    let mut iterations = 0;
    while !current.is_none() {
        iterations += 1;
        if iterations > MAX_TREE_WALK_ITERATIONS {
            return NodeIndex::NONE;
        }
        if let Some(node) = arena.get(current) {
            if node.kind.is_scope() && !is_decorator_of(arena, current, prev) {
                return current;
            }
        }
        prev = current;
        current = arena.parent(current);
    }
    NodeIndex::NONE
}

/// True when `child` is one of the decorator expressions of definition node
/// `def_idx`.
fn is_decorator_of(arena: &NodeArena, def_idx: NodeIndex, child: NodeIndex) -> bool {
    let decorators: &[NodeIndex] = if let Some(func) = arena.get_function_def(def_idx) {
        &func.decorators
    } else if let Some(class) = arena.get_class_def(def_idx) {
        &class.decorators
    } else {
        return false;
    };
    decorators.contains(&child)
}

/// Find the nearest enclosing function-like scope (function or lambda).
pub fn enclosing_function(arena: &NodeArena, idx: NodeIndex) -> Option<NodeIndex> {
    let mut scope = enclosing_scope(arena, idx);
    let mut iterations = 0;
    while !scope.is_none() {
        iterations += 1;
        if iterations > MAX_TREE_WALK_ITERATIONS {
            return None;
        }
        match arena.kind(scope)? {
            SyntaxKind::FunctionDef | SyntaxKind::Lambda => return Some(scope),
            _ => scope = enclosing_scope(arena, scope),
        }
    }
    None
}

/// Find the nearest enclosing class scope.
pub fn enclosing_class(arena: &NodeArena, idx: NodeIndex) -> Option<NodeIndex> {
    let mut scope = enclosing_scope(arena, idx);
    let mut iterations = 0;
    while !scope.is_none() {
        iterations += 1;
        if iterations > MAX_TREE_WALK_ITERATIONS {
            return None;
        }
        match arena.kind(scope)? {
            SyntaxKind::ClassDef => return Some(scope),
            // A nested function seals off the class body.
            SyntaxKind::FunctionDef | SyntaxKind::Lambda => return None,
            _ => scope = enclosing_scope(arena, scope),
        }
    }
    None
}

/// Find the module node containing `idx`.
pub fn enclosing_module(arena: &NodeArena, idx: NodeIndex) -> NodeIndex {
    let mut current = idx;
    let mut iterations = 0;
    while !current.is_none() {
        iterations += 1;
        if iterations > MAX_TREE_WALK_ITERATIONS {
            return NodeIndex::NONE;
        }
        if arena.kind(current) == Some(SyntaxKind::Module) {
            return current;
        }
        current = arena.parent(current);
    }
    NodeIndex::NONE
}

/// Find the scope that owns type variables referenced at `idx`: the nearest
/// enclosing function or class. The walk does not look past the first
/// function-like scope.
pub fn enclosing_type_var_scope(arena: &NodeArena, idx: NodeIndex) -> Option<NodeIndex> {
    let mut scope = enclosing_scope(arena, idx);
    let mut iterations = 0;
    while !scope.is_none() {
        iterations += 1;
        if iterations > MAX_TREE_WALK_ITERATIONS {
            return None;
        }
        match arena.kind(scope)? {
            SyntaxKind::FunctionDef | SyntaxKind::Lambda | SyntaxKind::ClassDef => {
                return Some(scope);
            }
            SyntaxKind::Module => return None,
            _ => scope = enclosing_scope(arena, scope),
        }
    }
    None
}

/// The lexical scope whose symbol table resolves free references at `idx`.
///
/// Comprehension leakage: the iterable of the outermost `for` clause of a
/// comprehension is evaluated in the comprehension's enclosing scope, not in
/// the comprehension scope itself.
pub fn evaluation_scope(arena: &NodeArena, idx: NodeIndex) -> NodeIndex {
    let mut prev = idx;
    let mut current = arena.parent(idx);
    let mut skip_next_comprehension = false;
    let mut iterations = 0;
    while !current.is_none() {
        iterations += 1;
        if iterations > MAX_TREE_WALK_ITERATIONS {
            return NodeIndex::NONE;
        }
        if let Some(node) = arena.get(current) {
            if node.kind == SyntaxKind::ComprehensionFor
                && let Some(clause) = arena.get_comprehension_for(current)
                && clause.iterable == prev
                && is_first_comprehension_clause(arena, current)
            {
                skip_next_comprehension = true;
            }
            if node.kind.is_scope() && !is_decorator_of(arena, current, prev) {
                if node.kind == SyntaxKind::ListComprehension && skip_next_comprehension {
                    skip_next_comprehension = false;
                } else {
                    return current;
                }
            }
        }
        prev = current;
        current = arena.parent(current);
    }
    NodeIndex::NONE
}

fn is_first_comprehension_clause(arena: &NodeArena, clause: NodeIndex) -> bool {
    let comp_idx = arena.parent(clause);
    arena
        .get_list_comprehension(comp_idx)
        .is_some_and(|comp| comp.clauses.first() == Some(&clause))
}

/// The scope in which code at `idx` actually executes. Class bodies are
/// skipped: a name in a class body runs in the scope containing the class.
pub fn execution_scope(arena: &NodeArena, idx: NodeIndex) -> NodeIndex {
    let mut scope = evaluation_scope(arena, idx);
    let mut iterations = 0;
    while !scope.is_none() {
        iterations += 1;
        if iterations > MAX_TREE_WALK_ITERATIONS {
            return NodeIndex::NONE;
        }
        if arena.kind(scope) == Some(SyntaxKind::ClassDef) {
            scope = evaluation_scope(arena, scope);
        } else {
            return scope;
        }
    }
    NodeIndex::NONE
}

// =============================================================================
// Expression matching
// =============================================================================

/// Structural equality of two reference expressions.
///
/// Matching shapes are names, member-access chains, and index expressions
/// whose subscript is an integer literal, a negated integer literal, or a
/// string literal. Any other subscript shape never matches (the value could
/// differ between evaluations).
pub fn is_matching_expression(arena: &NodeArena, reference: NodeIndex, candidate: NodeIndex) -> bool {
    if reference == candidate {
        return true;
    }
    let (Some(ref_node), Some(cand_node)) = (arena.get(reference), arena.get(candidate)) else {
        return false;
    };
    if ref_node.kind != cand_node.kind {
        return false;
    }
    match ref_node.kind {
        SyntaxKind::Name => {
            let (Some(a), Some(b)) = (arena.get_name(reference), arena.get_name(candidate)) else {
                return false;
            };
            a.id == b.id
        }
        SyntaxKind::MemberAccess => {
            let (Some(a), Some(b)) = (
                arena.get_member_access(reference),
                arena.get_member_access(candidate),
            ) else {
                return false;
            };
            a.member == b.member && is_matching_expression(arena, a.receiver, b.receiver)
        }
        SyntaxKind::Index => {
            let (Some(a), Some(b)) = (
                arena.get_index_expr(reference),
                arena.get_index_expr(candidate),
            ) else {
                return false;
            };
            if !is_matching_expression(arena, a.base, b.base) {
                return false;
            }
            match (scalar_subscript(arena, a.subscript), scalar_subscript(arena, b.subscript)) {
                (Some(sa), Some(sb)) => sa == sb,
                _ => false,
            }
        }
        _ => false,
    }
}

/// A subscript value usable for expression matching.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ScalarSubscript {
    Int(i64),
    Str(Atom),
    Bytes(Atom),
}

fn scalar_subscript(arena: &NodeArena, idx: NodeIndex) -> Option<ScalarSubscript> {
    match arena.kind(idx)? {
        SyntaxKind::Number => arena.get_number(idx).map(|n| ScalarSubscript::Int(n.value)),
        SyntaxKind::UnaryOp => {
            let unary = arena.get_unary_expr(idx)?;
            if unary.op != UnaryOperator::Minus {
                return None;
            }
            let number = arena.get_number(unary.operand)?;
            Some(ScalarSubscript::Int(-number.value))
        }
        SyntaxKind::StringLit => {
            let lit = arena.get_string_lit(idx)?;
            Some(match lit.kind {
                StringKind::Str => ScalarSubscript::Str(lit.value),
                StringKind::Bytes => ScalarSubscript::Bytes(lit.value),
            })
        }
        _ => None,
    }
}

/// True when `candidate` is a strict prefix of `reference` under
/// member-access / index chains (e.g. `a.b` is a partial match of `a.b.c`
/// and of `a.b[0]`).
pub fn is_partial_matching_expression(
    arena: &NodeArena,
    reference: NodeIndex,
    candidate: NodeIndex,
) -> bool {
    let base = match arena.kind(reference) {
        Some(SyntaxKind::MemberAccess) => arena.get_member_access(reference).map(|m| m.receiver),
        Some(SyntaxKind::Index) => arena.get_index_expr(reference).map(|i| i.base),
        _ => None,
    };
    let Some(base) = base else {
        return false;
    };
    if is_matching_expression(arena, base, candidate) {
        return true;
    }
    is_partial_matching_expression(arena, base, candidate)
}

// =============================================================================
// Write access
// =============================================================================

/// True when `idx` appears in a position that (re)binds or deletes it:
/// assignment target, augmented-assignment target, walrus target, `for`
/// target, comprehension-for target, `except ... as`, `with ... as`, `del`,
/// or an `import ... as` alias. Tuple-unpacking targets are looked through.
pub fn is_write_access(arena: &NodeArena, idx: NodeIndex) -> bool {
    let mut current = idx;
    let mut iterations = 0;
    loop {
        iterations += 1;
        if iterations > MAX_TREE_WALK_ITERATIONS {
            return false;
        }
        let parent = arena.parent(current);
        if parent.is_none() {
            return false;
        }
        let Some(parent_node) = arena.get(parent) else {
            return false;
        };
        match parent_node.kind {
            SyntaxKind::Assignment => {
                let Some(assign) = arena.get_assignment(parent) else {
                    return false;
                };
                return assign.targets.contains(&current);
            }
            SyntaxKind::AugAssignment => {
                let Some(assign) = arena.get_aug_assignment(parent) else {
                    return false;
                };
                return assign.target == current;
            }
            SyntaxKind::AssignmentExpr => {
                let Some(walrus) = arena.get_assignment_expr(parent) else {
                    return false;
                };
                return walrus.target == current;
            }
            SyntaxKind::For => {
                let Some(for_stmt) = arena.get_for(parent) else {
                    return false;
                };
                return for_stmt.target == current;
            }
            SyntaxKind::ComprehensionFor => {
                let Some(clause) = arena.get_comprehension_for(parent) else {
                    return false;
                };
                return clause.target == current;
            }
            SyntaxKind::ExceptClause => {
                let Some(clause) = arena.get_except_clause(parent) else {
                    return false;
                };
                return clause.name == current;
            }
            SyntaxKind::WithItem => {
                let Some(item) = arena.get_with_item(parent) else {
                    return false;
                };
                return item.target == current;
            }
            SyntaxKind::Del => {
                let Some(del) = arena.get_del(parent) else {
                    return false;
                };
                return del.targets.contains(&current);
            }
            SyntaxKind::ImportAs => {
                let Some(import) = arena.get_import_as(parent) else {
                    return false;
                };
                return import.alias == current;
            }
            // Unpacking targets: `a, b = ...` binds through the tuple.
            SyntaxKind::TupleExpr => {
                current = parent;
            }
            _ => return false,
        }
    }
}

// =============================================================================
// Docstrings
// =============================================================================

/// True when `stmt` is a docstring: a string-literal expression statement in
/// the first position of a module, function, or class body.
pub fn is_docstring(arena: &NodeArena, stmt: NodeIndex) -> bool {
    let Some(expr_stmt) = arena.get_expression_stmt(stmt) else {
        return false;
    };
    let Some(lit) = arena.get_string_lit(expr_stmt.expr) else {
        return false;
    };
    if lit.kind != StringKind::Str {
        return false;
    }
    let parent = arena.parent(stmt);
    scope_body(arena, parent).is_some_and(|body| body.first() == Some(&stmt))
}

fn scope_body(arena: &NodeArena, idx: NodeIndex) -> Option<&[NodeIndex]> {
    match arena.kind(idx)? {
        SyntaxKind::Module => arena.get_module(idx).map(|m| m.body.as_slice()),
        SyntaxKind::FunctionDef => arena.get_function_def(idx).map(|f| f.body.as_slice()),
        SyntaxKind::ClassDef => arena.get_class_def(idx).map(|c| c.body.as_slice()),
        _ => None,
    }
}

/// The docstring of a module, function, or class, if it has one.
pub fn get_docstring(arena: &NodeArena, scope: NodeIndex) -> Option<Atom> {
    let body = scope_body(arena, scope)?;
    let first = *body.first()?;
    if !is_docstring(arena, first) {
        return None;
    }
    let expr_stmt = arena.get_expression_stmt(first)?;
    arena.get_string_lit(expr_stmt.expr).map(|lit| lit.value)
}

// =============================================================================
// Statement ranges
// =============================================================================

/// The source range covered by a statement and its whole subtree.
pub fn statement_range(arena: &NodeArena, stmt: NodeIndex) -> Span {
    let mut span = arena.span(stmt);
    let mut stack: Vec<NodeIndex> = arena.children(stmt).into_vec();
    let mut iterations = 0;
    while let Some(idx) = stack.pop() {
        iterations += 1;
        if iterations > MAX_TREE_WALK_ITERATIONS {
            break;
        }
        span = span.cover(arena.span(idx));
        stack.extend(arena.children(idx));
    }
    span
}

// =============================================================================
// Call / active argument
// =============================================================================

/// Which argument of a call an offset falls on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveArgument {
    /// Zero-based argument index.
    pub index: usize,
    /// True when the cursor sits past the last argument: `index` then names
    /// the not-yet-written argument slot.
    pub is_fake: bool,
}

/// Map an offset inside a call expression to the argument it belongs to.
///
/// Returns `None` when the offset is outside the call's range entirely.
pub fn call_active_argument(
    arena: &NodeArena,
    call: NodeIndex,
    offset: u32,
) -> Option<ActiveArgument> {
    let data = arena.get_call_expr(call)?;
    let call_span = statement_range(arena, call);
    if !call_span.contains(offset) && call_span.end != offset {
        return None;
    }
    for (index, &arg) in data.args.iter().enumerate() {
        let arg_span = statement_range(arena, arg);
        if arg_span.is_dummy() {
            continue;
        }
        if offset <= arg_span.end {
            return Some(ActiveArgument {
                index,
                is_fake: false,
            });
        }
    }
    Some(ActiveArgument {
        index: data.args.len(),
        is_fake: true,
    })
}

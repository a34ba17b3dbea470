//! Test-expression dispatch.
//!
//! Compiles the syntactic shapes a test expression can take — comparisons,
//! subscript and member discriminators, `len`/`type`/`bool`/`callable`/
//! `isinstance`/`issubclass` calls, user-defined type guards, containment,
//! the walrus, `not`, aliased conditions, and reference truthiness — into
//! `TypeGuard`s. Polarity flips (`is not`, `!=`, `not in`) fold into the
//! callback's positive bit.

use std::sync::Arc;

use pyz_common::interner::Atom;
use pyz_common::limits::MAX_ALIASED_CONDITION_SCAN;
use tracing::trace;

use pyz_solver::narrow::{NarrowingCallback, TypeGuard};
use pyz_solver::recursion::DepthCounter;
use pyz_solver::types::{LiteralValue, TypeId, TypeKey};
use pyz_tree::node::{
    BinaryOpData, BinaryOperator, CallData, ConstantKind, NodeIndex, StringKind, SyntaxKind,
    UnaryOperator,
};
use pyz_tree::tree_utils::{
    execution_scope, is_matching_expression, is_partial_matching_expression, is_write_access,
};

use crate::TypeEvaluator;

impl<'a> TypeEvaluator<'a> {
    pub(crate) fn callback_for(
        &self,
        reference: NodeIndex,
        test: NodeIndex,
        is_positive: bool,
        depth: &mut DepthCounter,
    ) -> Option<NarrowingCallback> {
        if !depth.enter() {
            return None;
        }
        let result = self.callback_for_inner(reference, test, is_positive, depth);
        depth.leave();
        result
    }

    fn callback_for_inner(
        &self,
        reference: NodeIndex,
        test: NodeIndex,
        is_positive: bool,
        depth: &mut DepthCounter,
    ) -> Option<NarrowingCallback> {
        let arena = self.arena();
        let node = arena.get(test)?;
        trace!(?reference, ?test, kind = ?node.kind, is_positive, "narrowing dispatch");
        match node.kind {
            // A walrus narrows through its value; the bound name itself
            // narrows by truthiness.
            SyntaxKind::AssignmentExpr => {
                let walrus = arena.get_assignment_expr(test)?;
                if let Some(callback) = self.callback_for(reference, walrus.value, is_positive, depth)
                {
                    return Some(callback);
                }
                if is_matching_expression(arena, reference, walrus.target) {
                    return Some(NarrowingCallback::new(TypeGuard::Truthy, is_positive));
                }
                None
            }
            SyntaxKind::BinaryOp => {
                let bin = arena.get_binary_expr(test)?;
                match bin.op {
                    BinaryOperator::Is
                    | BinaryOperator::IsNot
                    | BinaryOperator::Equals
                    | BinaryOperator::NotEquals => self.equality_callback(reference, bin, is_positive),
                    BinaryOperator::In | BinaryOperator::NotIn => {
                        self.containment_callback(reference, bin, is_positive)
                    }
                    _ => None,
                }
            }
            SyntaxKind::Call => self.call_callback(reference, test, is_positive),
            SyntaxKind::UnaryOp => {
                let unary = arena.get_unary_expr(test)?;
                if unary.op == UnaryOperator::Not {
                    self.callback_for(reference, unary.operand, !is_positive, depth)
                } else {
                    None
                }
            }
            SyntaxKind::Name | SyntaxKind::MemberAccess | SyntaxKind::Index => {
                if is_matching_expression(arena, reference, test) {
                    return Some(NarrowingCallback::new(TypeGuard::Truthy, is_positive));
                }
                if node.kind == SyntaxKind::Name {
                    self.aliased_condition_callback(reference, test, is_positive, depth)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    // =========================================================================
    // Comparisons
    // =========================================================================

    fn equality_callback(
        &self,
        reference: NodeIndex,
        bin: &BinaryOpData,
        is_positive: bool,
    ) -> Option<NarrowingCallback> {
        let is_operator = matches!(bin.op, BinaryOperator::Is | BinaryOperator::IsNot);
        let positive_op = matches!(bin.op, BinaryOperator::Is | BinaryOperator::Equals);
        let adj_positive = if positive_op { is_positive } else { !is_positive };

        if let Some(callback) =
            self.equality_subject(reference, bin.left, bin.right, is_operator, adj_positive)
        {
            return Some(callback);
        }
        self.equality_subject(reference, bin.right, bin.left, is_operator, adj_positive)
    }

    /// Try one orientation of a comparison: `subject <op> other`, where the
    /// subject is the reference or a projection of it.
    fn equality_subject(
        &self,
        reference: NodeIndex,
        subject: NodeIndex,
        other: NodeIndex,
        is_operator: bool,
        adj_positive: bool,
    ) -> Option<NarrowingCallback> {
        let arena = self.arena();
        let other_is_none = matches!(
            arena.get_constant(other).map(|c| c.kind),
            Some(ConstantKind::None)
        );

        // The reference itself.
        if is_matching_expression(arena, reference, subject) {
            if other_is_none {
                return Some(NarrowingCallback::new(
                    TypeGuard::IsNone { is_operator },
                    adj_positive,
                ));
            }
            let literal = self.literal_type_of(other)?;
            if is_operator && !self.is_enum_or_bool_literal(literal) {
                // `is` only narrows identity-comparable literals.
                return None;
            }
            return Some(NarrowingCallback::new(
                TypeGuard::LiteralEquality {
                    literal,
                    is_operator,
                },
                adj_positive,
            ));
        }

        // Subscript projections: x[i] and x["k"].
        if let Some(index_expr) = arena.get_index_expr(subject)
            && is_matching_expression(arena, reference, index_expr.base)
        {
            if let Some(number) = arena.get_number(index_expr.subscript)
                && number.value >= 0
            {
                let index = number.value as usize;
                if other_is_none {
                    if is_operator {
                        return Some(NarrowingCallback::new(
                            TypeGuard::TupleEntryNone { index },
                            adj_positive,
                        ));
                    }
                    return None;
                }
                if !is_operator {
                    let literal = self.literal_type_of(other)?;
                    return Some(NarrowingCallback::new(
                        TypeGuard::TupleEntryEquality { index, literal },
                        adj_positive,
                    ));
                }
                return None;
            }
            if let Some(lit) = arena.get_string_lit(index_expr.subscript)
                && lit.kind == StringKind::Str
                && !is_operator
                && !other_is_none
            {
                let key = self.shared_atom(lit.value);
                let literal = self.literal_type_of(other)?;
                return Some(NarrowingCallback::new(
                    TypeGuard::TypedDictDiscriminant { key, literal },
                    adj_positive,
                ));
            }
            return None;
        }

        // Member projections: x.m.
        if let Some(member_access) = arena.get_member_access(subject)
            && is_matching_expression(arena, reference, member_access.receiver)
        {
            let member = self.shared_atom(member_access.member);
            if other_is_none {
                if is_operator {
                    return Some(NarrowingCallback::new(
                        TypeGuard::MemberIsNone { member },
                        adj_positive,
                    ));
                }
                return None;
            }
            let literal = self.literal_type_of(other)?;
            if is_operator && !self.is_enum_or_bool_literal(literal) {
                return None;
            }
            return Some(NarrowingCallback::new(
                TypeGuard::MemberEquality {
                    member,
                    literal,
                    is_operator,
                },
                adj_positive,
            ));
        }

        // Call projections: len(x) and type(x).
        if let Some(call) = arena.get_call_expr(subject) {
            let callee = self.callee_name(call.callee)?;
            if &*callee == "len"
                && !is_operator
                && let Some(arg) = self.call_arg(call, 0)
                && is_matching_expression(arena, reference, arg)
                && call.args.len() == 1
                && let Some(number) = arena.get_number(other)
                && number.value >= 0
            {
                return Some(NarrowingCallback::new(
                    TypeGuard::TupleLength {
                        length: number.value as usize,
                    },
                    adj_positive,
                ));
            }
            if &*callee == "type"
                && is_operator
                && let Some(arg) = self.call_arg(call, 0)
                && is_matching_expression(arena, reference, arg)
                && call.args.len() == 1
                && let Some(class) = self.instantiable_class_of(other)
            {
                return Some(NarrowingCallback::new(
                    TypeGuard::ClassIs { class },
                    adj_positive,
                ));
            }
        }

        None
    }

    fn containment_callback(
        &self,
        reference: NodeIndex,
        bin: &BinaryOpData,
        is_positive: bool,
    ) -> Option<NarrowingCallback> {
        let arena = self.arena();
        let adj_positive = if bin.op == BinaryOperator::In {
            is_positive
        } else {
            !is_positive
        };

        // x in container
        if is_matching_expression(arena, reference, bin.left) {
            let container = self.node_type(bin.right)?;
            let element = self.container_element_type(container)?;
            return Some(NarrowingCallback::new(
                TypeGuard::InContainer { element },
                adj_positive,
            ));
        }

        // "key" in typed_dict
        if is_matching_expression(arena, reference, bin.right)
            && let Some(lit) = arena.get_string_lit(bin.left)
            && lit.kind == StringKind::Str
        {
            let key = self.shared_atom(lit.value);
            return Some(NarrowingCallback::new(
                TypeGuard::TypedDictKey { key },
                adj_positive,
            ));
        }

        None
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call_callback(
        &self,
        reference: NodeIndex,
        test: NodeIndex,
        is_positive: bool,
    ) -> Option<NarrowingCallback> {
        let arena = self.arena();
        let call = arena.get_call_expr(test)?;
        if let Some(callee) = self.callee_name(call.callee) {
            match &*callee {
                "isinstance" | "issubclass" if call.args.len() == 2 => {
                    let arg0 = self.call_arg(call, 0)?;
                    if !is_matching_expression(arena, reference, arg0) {
                        return None;
                    }
                    let filters = self.filter_types(self.call_arg(call, 1)?)?;
                    if filters.is_empty() {
                        return None;
                    }
                    return Some(NarrowingCallback::new(
                        TypeGuard::IsInstance {
                            filters,
                            is_subclass: &*callee == "issubclass",
                        },
                        is_positive,
                    ));
                }
                "callable" if call.args.len() == 1 => {
                    let arg0 = self.call_arg(call, 0)?;
                    if is_matching_expression(arena, reference, arg0) {
                        return Some(NarrowingCallback::new(TypeGuard::Callable, is_positive));
                    }
                    return None;
                }
                "bool" if call.args.len() == 1 => {
                    let arg0 = self.call_arg(call, 0)?;
                    if is_matching_expression(arena, reference, arg0) {
                        return Some(NarrowingCallback::new(TypeGuard::Truthy, is_positive));
                    }
                    return None;
                }
                _ => {}
            }
        }

        // A user-defined type guard: the callee's declared return type
        // carries a guard annotation.
        let callee_type = self.node_type(call.callee)?;
        let func = self.interner().function_of(callee_type)?;
        let guard_info = func.type_guard?;
        let arg0 = self.call_arg(call, 0)?;
        if !is_matching_expression(arena, reference, arg0) {
            return None;
        }
        Some(NarrowingCallback::new(
            TypeGuard::Predicate {
                guarded: guard_info.guarded,
                is_strict: guard_info.is_strict,
            },
            is_positive,
        ))
    }

    // =========================================================================
    // Aliased conditions
    // =========================================================================

    /// `cond = <test>` ... `if cond:` narrows through the aliased test when
    /// the alias has exactly one assignment in the reference's execution
    /// scope and neither the alias nor the reference is written between the
    /// assignment and the condition.
    fn aliased_condition_callback(
        &self,
        reference: NodeIndex,
        test: NodeIndex,
        is_positive: bool,
        depth: &mut DepthCounter,
    ) -> Option<NarrowingCallback> {
        let arena = self.arena();
        let alias = arena.get_name(test)?.id;
        let scope = execution_scope(arena, test);
        if scope.is_none() {
            return None;
        }

        let mut assignment: Option<(NodeIndex, NodeIndex)> = None;
        let mut write_count = 0usize;
        self.for_each_local_node(scope, |idx| {
            if let Some(assign) = arena.get_assignment(idx)
                && let [target] = assign.targets.as_slice()
                && arena.get_name(*target).is_some_and(|name| name.id == alias)
            {
                write_count += 1;
                assignment = Some((idx, assign.value));
                return;
            }
            // Any other write to the alias disqualifies it.
            if arena.get_name(idx).is_some_and(|name| name.id == alias)
                && idx != test
                && is_write_access(arena, idx)
                && !matches!(assignment, Some((stmt, _)) if arena.span(stmt).contains_span(arena.span(idx)))
            {
                write_count += 1;
            }
        });
        if write_count != 1 {
            return None;
        }
        let (assign_stmt, value) = assignment?;

        let assign_span = arena.span(assign_stmt);
        let test_span = arena.span(test);
        if assign_span.end > test_span.start {
            return None;
        }

        // Scan for intervening writes to the alias or the reference (or a
        // prefix of the reference).
        let mut blocked = false;
        self.for_each_local_node(scope, |idx| {
            let span = arena.span(idx);
            if span.is_dummy() || span.start < assign_span.end || span.end > test_span.start {
                return;
            }
            if !is_write_access(arena, idx) {
                return;
            }
            if arena.get_name(idx).is_some_and(|name| name.id == alias)
                || is_matching_expression(arena, reference, idx)
                || is_partial_matching_expression(arena, reference, idx)
            {
                blocked = true;
            }
        });
        if blocked {
            return None;
        }

        self.callback_for(reference, value, is_positive, depth)
    }

    /// Visit every node of a scope's subtree without descending into nested
    /// scopes, up to a fixed scan budget.
    fn for_each_local_node(&self, scope: NodeIndex, mut f: impl FnMut(NodeIndex)) {
        let arena = self.arena();
        let mut stack: Vec<NodeIndex> = arena.children(scope).into_vec();
        let mut scanned = 0usize;
        while let Some(idx) = stack.pop() {
            scanned += 1;
            if scanned > MAX_ALIASED_CONDITION_SCAN {
                return;
            }
            let Some(node) = arena.get(idx) else { continue };
            f(idx);
            if !node.kind.is_scope() {
                stack.extend(arena.children(idx));
            }
        }
    }

    // =========================================================================
    // Expression helpers
    // =========================================================================

    fn call_arg(&self, call: &CallData, index: usize) -> Option<NodeIndex> {
        let arg = *call.args.get(index)?;
        self.arena().get_argument(arg).map(|data| data.value)
    }

    fn callee_name(&self, callee: NodeIndex) -> Option<Arc<str>> {
        let name = self.arena().get_name(callee)?;
        Some(self.arena().strings().resolve(name.id))
    }

    /// Re-intern a tree atom through the type interner's string table, so
    /// lookups against interned type names compare equal even when the
    /// arena was built with a separate string interner.
    fn shared_atom(&self, atom: Atom) -> Atom {
        let text = self.arena().strings().resolve(atom);
        self.interner().atom(&text)
    }

    /// The literal type denoted by a comparand: taken from the node-type
    /// table when the checker recorded one, or rebuilt from the literal
    /// node's shape.
    fn literal_type_of(&self, node: NodeIndex) -> Option<TypeId> {
        let interner = self.interner();
        if let Some(ty) = self.node_type(node)
            && interner
                .class_of(ty)
                .is_some_and(|class| class.literal.is_some())
        {
            return Some(ty);
        }
        let arena = self.arena();
        match arena.kind(node)? {
            SyntaxKind::Number => arena.get_number(node).map(|n| interner.literal_int(n.value)),
            SyntaxKind::StringLit => {
                let lit = arena.get_string_lit(node)?;
                let text = arena.strings().resolve(lit.value);
                Some(match lit.kind {
                    StringKind::Str => interner.literal_str(&text),
                    StringKind::Bytes => interner.literal_bytes(&text),
                })
            }
            SyntaxKind::Constant => match arena.get_constant(node)?.kind {
                ConstantKind::True => Some(interner.literal_bool(true)),
                ConstantKind::False => Some(interner.literal_bool(false)),
                _ => None,
            },
            SyntaxKind::UnaryOp => {
                let unary = arena.get_unary_expr(node)?;
                if unary.op != UnaryOperator::Minus {
                    return None;
                }
                let number = arena.get_number(unary.operand)?;
                Some(interner.literal_int(-number.value))
            }
            // An enum member reference; only the recorded type can say.
            SyntaxKind::MemberAccess => self.node_type(node).filter(|&ty| {
                interner
                    .class_of(ty)
                    .is_some_and(|class| class.literal.is_some())
            }),
            _ => None,
        }
    }

    fn is_enum_or_bool_literal(&self, literal: TypeId) -> bool {
        self.interner()
            .class_of(literal)
            .is_some_and(|class| {
                matches!(
                    class.literal,
                    Some(LiteralValue::Bool(_)) | Some(LiteralValue::EnumMember(_))
                )
            })
    }

    /// The instantiable class denoted by a `type(x) is Y` comparand.
    fn instantiable_class_of(&self, node: NodeIndex) -> Option<TypeId> {
        let ty = self.node_type(node)?;
        self.interner()
            .class_of(ty)
            .filter(|class| class.is_instantiable)
            .map(|_| ty)
    }

    /// The filter list of an `isinstance`/`issubclass` second argument:
    /// a single class, a tuple of classes, or `None`.
    fn filter_types(&self, node: NodeIndex) -> Option<Vec<TypeId>> {
        let arena = self.arena();
        if let Some(tuple) = arena.get_tuple_expr(node) {
            let mut filters = Vec::with_capacity(tuple.elements.len());
            for &element in &tuple.elements {
                filters.push(self.single_filter_type(element)?);
            }
            return Some(filters);
        }
        // A comparand whose recorded type is a tuple instance (a runtime
        // tuple of classes) contributes each element.
        if let Some(ty) = self.node_type(node)
            && let Some(class) = self.interner().class_of(ty)
            && let Some(args) = class.tuple_args.as_deref()
            && !class.is_instantiable
        {
            let filters: Vec<TypeId> = args.iter().map(|arg| arg.ty).collect();
            if !filters.is_empty() {
                return Some(filters);
            }
        }
        Some(vec![self.single_filter_type(node)?])
    }

    fn single_filter_type(&self, node: NodeIndex) -> Option<TypeId> {
        let arena = self.arena();
        if matches!(
            arena.get_constant(node).map(|c| c.kind),
            Some(ConstantKind::None)
        ) {
            return Some(TypeId::NONE_TYPE);
        }
        let ty = self.node_type(node)?;
        match self.interner().lookup(ty)? {
            TypeKey::Class(class) if class.is_instantiable => Some(ty),
            TypeKey::None(none) if none.is_instantiable => Some(ty),
            TypeKey::TypeVar(tv) if tv.is_instantiable => Some(ty),
            _ => None,
        }
    }

    /// The element type a container contributes to `in` narrowing: the
    /// element of the sequence-like builtins, the key type of the mapping
    /// builtins, or the union of a tuple's element types.
    fn container_element_type(&self, container: TypeId) -> Option<TypeId> {
        let interner = self.interner();
        let class = interner.class_of(container)?;
        if class.is_instantiable {
            return None;
        }
        if let Some(args) = class.tuple_args.as_deref() {
            let elements: Vec<TypeId> = args.iter().map(|arg| arg.ty).collect();
            if elements.is_empty() {
                return None;
            }
            return Some(interner.union(elements));
        }
        let builtins = interner.builtins();
        let is_container = builtins
            .container_classes()
            .iter()
            .any(|entry| entry.name == class.name);
        if !is_container {
            return None;
        }
        class.type_args.as_deref().and_then(|args| args.first().copied())
    }
}

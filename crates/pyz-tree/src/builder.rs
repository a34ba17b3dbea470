//! Programmatic tree construction.
//!
//! `TreeBuilder` materializes nodes into a `NodeArena` in source order:
//! leaves are assigned monotonically increasing spans as they are created,
//! and `finish` computes composite spans bottom-up and links every child to
//! its parent. Children must be created before the node that contains them,
//! and each node must appear in exactly one parent.

use pyz_common::interner::{Atom, StringInterner};
use pyz_common::span::Span;
use std::sync::Arc;

use crate::node::*;

pub struct TreeBuilder {
    arena: NodeArena,
    cursor: u32,
}

impl TreeBuilder {
    pub fn new(strings: Arc<StringInterner>) -> Self {
        Self {
            arena: NodeArena::new(strings),
            cursor: 0,
        }
    }

    /// Builder with a fresh string interner.
    pub fn fresh() -> Self {
        Self::new(Arc::new(StringInterner::new()))
    }

    pub fn strings(&self) -> Arc<StringInterner> {
        Arc::clone(self.arena.strings())
    }

    pub fn intern(&self, text: &str) -> Atom {
        self.arena.strings().intern(text)
    }

    fn leaf_span(&mut self, width: u32) -> Span {
        let start = self.cursor;
        self.cursor += width.max(1) + 1;
        Span::new(start, start + width.max(1))
    }

    fn push(&mut self, payload: NodePayload, span: Span) -> NodeIndex {
        self.arena.push(payload, span)
    }

    fn push_leaf(&mut self, payload: NodePayload, width: u32) -> NodeIndex {
        let span = self.leaf_span(width);
        self.push(payload, span)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub fn name(&mut self, id: &str) -> NodeIndex {
        let id = self.intern(id);
        self.push_leaf(NodePayload::Name(NameData { id }), 1)
    }

    pub fn number(&mut self, value: i64) -> NodeIndex {
        self.push_leaf(NodePayload::Number(NumberData { value }), 1)
    }

    pub fn string(&mut self, value: &str) -> NodeIndex {
        let value = self.intern(value);
        self.push_leaf(
            NodePayload::StringLit(StringLitData {
                value,
                kind: StringKind::Str,
            }),
            1,
        )
    }

    pub fn bytes(&mut self, value: &str) -> NodeIndex {
        let value = self.intern(value);
        self.push_leaf(
            NodePayload::StringLit(StringLitData {
                value,
                kind: StringKind::Bytes,
            }),
            1,
        )
    }

    pub fn constant(&mut self, kind: ConstantKind) -> NodeIndex {
        self.push_leaf(NodePayload::Constant(ConstantData { kind }), 1)
    }

    pub fn none(&mut self) -> NodeIndex {
        self.constant(ConstantKind::None)
    }

    pub fn true_const(&mut self) -> NodeIndex {
        self.constant(ConstantKind::True)
    }

    pub fn false_const(&mut self) -> NodeIndex {
        self.constant(ConstantKind::False)
    }

    pub fn member(&mut self, receiver: NodeIndex, member: &str) -> NodeIndex {
        let member = self.intern(member);
        self.push(
            NodePayload::MemberAccess(MemberAccessData { receiver, member }),
            Span::dummy(),
        )
    }

    pub fn index(&mut self, base: NodeIndex, subscript: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::Index(IndexData { base, subscript }),
            Span::dummy(),
        )
    }

    pub fn argument(&mut self, value: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::Argument(ArgumentData {
                category: ArgumentCategory::Simple,
                name: None,
                value,
            }),
            Span::dummy(),
        )
    }

    /// Call with plain positional arguments.
    pub fn call(&mut self, callee: NodeIndex, values: &[NodeIndex]) -> NodeIndex {
        let args: Vec<NodeIndex> = values.iter().map(|&value| self.argument(value)).collect();
        self.push(NodePayload::Call(CallData { callee, args }), Span::dummy())
    }

    pub fn binary(&mut self, left: NodeIndex, op: BinaryOperator, right: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::BinaryOp(BinaryOpData { left, op, right }),
            Span::dummy(),
        )
    }

    pub fn unary(&mut self, op: UnaryOperator, operand: NodeIndex) -> NodeIndex {
        self.push(NodePayload::UnaryOp(UnaryOpData { op, operand }), Span::dummy())
    }

    pub fn not_expr(&mut self, operand: NodeIndex) -> NodeIndex {
        self.unary(UnaryOperator::Not, operand)
    }

    pub fn walrus(&mut self, target: NodeIndex, value: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::AssignmentExpr(AssignmentExprData { target, value }),
            Span::dummy(),
        )
    }

    pub fn tuple_expr(&mut self, elements: &[NodeIndex]) -> NodeIndex {
        self.push(
            NodePayload::TupleExpr(TupleExprData {
                elements: elements.to_vec(),
            }),
            Span::dummy(),
        )
    }

    pub fn parameter(&mut self, name: &str) -> NodeIndex {
        let name = self.intern(name);
        self.push_leaf(
            NodePayload::Parameter(ParameterData {
                name,
                annotation: NodeIndex::NONE,
                default: NodeIndex::NONE,
            }),
            1,
        )
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn assign(&mut self, target: NodeIndex, value: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::Assignment(AssignmentData {
                targets: vec![target],
                value,
            }),
            Span::dummy(),
        )
    }

    pub fn assign_many(&mut self, targets: &[NodeIndex], value: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::Assignment(AssignmentData {
                targets: targets.to_vec(),
                value,
            }),
            Span::dummy(),
        )
    }

    pub fn aug_assign(&mut self, target: NodeIndex, value: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::AugAssignment(AugAssignmentData { target, value }),
            Span::dummy(),
        )
    }

    pub fn expr_stmt(&mut self, expr: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::ExpressionStmt(ExpressionStmtData { expr }),
            Span::dummy(),
        )
    }

    pub fn return_stmt(&mut self, expr: NodeIndex) -> NodeIndex {
        self.push(NodePayload::Return(ReturnData { expr }), Span::dummy())
    }

    pub fn del_stmt(&mut self, targets: &[NodeIndex]) -> NodeIndex {
        self.push(
            NodePayload::Del(DelData {
                targets: targets.to_vec(),
            }),
            Span::dummy(),
        )
    }

    pub fn pass_stmt(&mut self) -> NodeIndex {
        self.push_leaf(NodePayload::Pass, 1)
    }

    pub fn if_stmt(
        &mut self,
        test: NodeIndex,
        body: &[NodeIndex],
        orelse: &[NodeIndex],
    ) -> NodeIndex {
        self.push(
            NodePayload::If(IfData {
                test,
                body: body.to_vec(),
                orelse: orelse.to_vec(),
            }),
            Span::dummy(),
        )
    }

    pub fn for_stmt(
        &mut self,
        target: NodeIndex,
        iterable: NodeIndex,
        body: &[NodeIndex],
    ) -> NodeIndex {
        self.push(
            NodePayload::For(ForData {
                target,
                iterable,
                body: body.to_vec(),
                orelse: Vec::new(),
            }),
            Span::dummy(),
        )
    }

    pub fn with_item(&mut self, expr: NodeIndex, target: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::WithItem(WithItemData { expr, target }),
            Span::dummy(),
        )
    }

    pub fn with_stmt(&mut self, items: &[NodeIndex], body: &[NodeIndex]) -> NodeIndex {
        self.push(
            NodePayload::With(WithData {
                items: items.to_vec(),
                body: body.to_vec(),
            }),
            Span::dummy(),
        )
    }

    pub fn except_clause(&mut self, type_expr: NodeIndex, name: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::ExceptClause(ExceptClauseData { type_expr, name }),
            Span::dummy(),
        )
    }

    pub fn try_stmt(&mut self, body: &[NodeIndex], handlers: &[NodeIndex]) -> NodeIndex {
        self.push(
            NodePayload::Try(TryData {
                body: body.to_vec(),
                handlers: handlers.to_vec(),
                orelse: Vec::new(),
                finally: Vec::new(),
            }),
            Span::dummy(),
        )
    }

    pub fn import_as(&mut self, module: &str, alias: NodeIndex) -> NodeIndex {
        let module = self.intern(module);
        self.push(
            NodePayload::ImportAs(ImportAsData { module, alias }),
            Span::dummy(),
        )
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    pub fn function_def(
        &mut self,
        name: &str,
        params: &[NodeIndex],
        body: &[NodeIndex],
        decorators: &[NodeIndex],
    ) -> NodeIndex {
        let name = self.intern(name);
        self.push(
            NodePayload::FunctionDef(FunctionDefData {
                name,
                params: params.to_vec(),
                decorators: decorators.to_vec(),
                body: body.to_vec(),
                is_async: false,
            }),
            Span::dummy(),
        )
    }

    pub fn lambda(&mut self, params: &[NodeIndex], expr: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::Lambda(LambdaData {
                params: params.to_vec(),
                expr,
            }),
            Span::dummy(),
        )
    }

    pub fn class_def(&mut self, name: &str, bases: &[NodeIndex], body: &[NodeIndex]) -> NodeIndex {
        let name = self.intern(name);
        self.push(
            NodePayload::ClassDef(ClassDefData {
                name,
                bases: bases.to_vec(),
                decorators: Vec::new(),
                body: body.to_vec(),
            }),
            Span::dummy(),
        )
    }

    pub fn comp_for(&mut self, target: NodeIndex, iterable: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::ComprehensionFor(ComprehensionForData {
                target,
                iterable,
                is_async: false,
            }),
            Span::dummy(),
        )
    }

    pub fn comp_if(&mut self, test: NodeIndex) -> NodeIndex {
        self.push(
            NodePayload::ComprehensionIf(ComprehensionIfData { test }),
            Span::dummy(),
        )
    }

    pub fn list_comprehension(&mut self, element: NodeIndex, clauses: &[NodeIndex]) -> NodeIndex {
        self.push(
            NodePayload::ListComprehension(ComprehensionData {
                element,
                clauses: clauses.to_vec(),
            }),
            Span::dummy(),
        )
    }

    pub fn module(&mut self, body: &[NodeIndex]) -> NodeIndex {
        self.push(
            NodePayload::Module(ModuleData {
                body: body.to_vec(),
            }),
            Span::dummy(),
        )
    }

    /// Finish construction: compute composite spans bottom-up and link
    /// children to parents.
    pub fn finish(mut self) -> NodeArena {
        // Children always have smaller indices than the node that contains
        // them, so one ascending pass settles every composite span.
        for i in 0..self.arena.len() {
            let idx = NodeIndex(i as u32);
            let mut span = self.arena.span(idx);
            for child in self.arena.children(idx) {
                span = span.cover(self.arena.span(child));
            }
            self.arena.set_span(idx, span);
            for child in self.arena.children(idx) {
                self.arena.set_parent(child, idx);
            }
        }
        self.arena
    }
}

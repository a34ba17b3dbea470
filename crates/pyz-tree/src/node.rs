//! Node arena for the parse tree.
//!
//! Nodes live in a flat arena and reference each other by `NodeIndex`. A
//! node is a `(kind, parent, span)` triple; the kind-specific shape lives in
//! a parallel payload table and is reached through typed accessors
//! (`get_member_access`, `get_binary_expr`, ...). Parent pointers are what
//! make the upward walks in `tree_utils` possible.

use pyz_common::interner::Atom;
use pyz_common::span::Span;
use smallvec::SmallVec;
use std::sync::Arc;

use pyz_common::interner::StringInterner;

/// Index of a node in a `NodeArena`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// Sentinel for "no node" (absent parent, omitted optional child).
    pub const NONE: NodeIndex = NodeIndex(u32::MAX);

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

/// Node kind tag. Mirrors the payload variant stored for the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    // Scope-bearing nodes
    Module,
    FunctionDef,
    Lambda,
    ClassDef,
    ListComprehension,
    // Comprehension clauses
    ComprehensionFor,
    ComprehensionIf,
    // Expressions
    Name,
    MemberAccess,
    Index,
    Call,
    Argument,
    Parameter,
    BinaryOp,
    UnaryOp,
    Number,
    StringLit,
    Constant,
    AssignmentExpr,
    TupleExpr,
    // Statements
    Assignment,
    AugAssignment,
    ExpressionStmt,
    Return,
    Del,
    If,
    For,
    With,
    WithItem,
    Try,
    ExceptClause,
    ImportAs,
    Pass,
}

impl SyntaxKind {
    /// Nodes that introduce a lexical scope.
    #[inline]
    pub const fn is_scope(self) -> bool {
        matches!(
            self,
            SyntaxKind::Module
                | SyntaxKind::FunctionDef
                | SyntaxKind::Lambda
                | SyntaxKind::ClassDef
                | SyntaxKind::ListComprehension
        )
    }

    #[inline]
    pub const fn is_function_like(self) -> bool {
        matches!(self, SyntaxKind::FunctionDef | SyntaxKind::Lambda)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstantKind {
    None,
    True,
    False,
    Ellipsis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StringKind {
    Str,
    Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgumentCategory {
    Simple,
    UnpackedList,
    UnpackedDict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Is,
    IsNot,
    Equals,
    NotEquals,
    In,
    NotIn,
    And,
    Or,
    Add,
    Subtract,
    Multiply,
    Divide,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
    BitInvert,
}

#[derive(Clone, Debug)]
pub struct ModuleData {
    pub body: Vec<NodeIndex>,
}

#[derive(Clone, Debug)]
pub struct FunctionDefData {
    pub name: Atom,
    pub params: Vec<NodeIndex>,
    pub decorators: Vec<NodeIndex>,
    pub body: Vec<NodeIndex>,
    pub is_async: bool,
}

#[derive(Clone, Debug)]
pub struct LambdaData {
    pub params: Vec<NodeIndex>,
    pub expr: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct ClassDefData {
    pub name: Atom,
    pub bases: Vec<NodeIndex>,
    pub decorators: Vec<NodeIndex>,
    pub body: Vec<NodeIndex>,
}

#[derive(Clone, Debug)]
pub struct ComprehensionData {
    pub element: NodeIndex,
    pub clauses: Vec<NodeIndex>,
}

#[derive(Clone, Debug)]
pub struct ComprehensionForData {
    pub target: NodeIndex,
    pub iterable: NodeIndex,
    pub is_async: bool,
}

#[derive(Clone, Debug)]
pub struct ComprehensionIfData {
    pub test: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct NameData {
    pub id: Atom,
}

#[derive(Clone, Debug)]
pub struct MemberAccessData {
    pub receiver: NodeIndex,
    pub member: Atom,
}

#[derive(Clone, Debug)]
pub struct IndexData {
    pub base: NodeIndex,
    pub subscript: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct CallData {
    pub callee: NodeIndex,
    /// Argument nodes, in source order.
    pub args: Vec<NodeIndex>,
}

#[derive(Clone, Debug)]
pub struct ArgumentData {
    pub category: ArgumentCategory,
    pub name: Option<Atom>,
    pub value: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct ParameterData {
    pub name: Atom,
    pub annotation: NodeIndex,
    pub default: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct BinaryOpData {
    pub left: NodeIndex,
    pub op: BinaryOperator,
    pub right: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct UnaryOpData {
    pub op: UnaryOperator,
    pub operand: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct NumberData {
    pub value: i64,
}

#[derive(Clone, Debug)]
pub struct StringLitData {
    pub value: Atom,
    pub kind: StringKind,
}

#[derive(Clone, Debug)]
pub struct ConstantData {
    pub kind: ConstantKind,
}

#[derive(Clone, Debug)]
pub struct AssignmentExprData {
    pub target: NodeIndex,
    pub value: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct TupleExprData {
    pub elements: Vec<NodeIndex>,
}

#[derive(Clone, Debug)]
pub struct AssignmentData {
    pub targets: Vec<NodeIndex>,
    pub value: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct AugAssignmentData {
    pub target: NodeIndex,
    pub value: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct ExpressionStmtData {
    pub expr: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct ReturnData {
    pub expr: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct DelData {
    pub targets: Vec<NodeIndex>,
}

#[derive(Clone, Debug)]
pub struct IfData {
    pub test: NodeIndex,
    pub body: Vec<NodeIndex>,
    pub orelse: Vec<NodeIndex>,
}

#[derive(Clone, Debug)]
pub struct ForData {
    pub target: NodeIndex,
    pub iterable: NodeIndex,
    pub body: Vec<NodeIndex>,
    pub orelse: Vec<NodeIndex>,
}

#[derive(Clone, Debug)]
pub struct WithData {
    pub items: Vec<NodeIndex>,
    pub body: Vec<NodeIndex>,
}

#[derive(Clone, Debug)]
pub struct WithItemData {
    pub expr: NodeIndex,
    pub target: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct TryData {
    pub body: Vec<NodeIndex>,
    pub handlers: Vec<NodeIndex>,
    pub orelse: Vec<NodeIndex>,
    pub finally: Vec<NodeIndex>,
}

#[derive(Clone, Debug)]
pub struct ExceptClauseData {
    pub type_expr: NodeIndex,
    /// `except E as name` binding; a Name node, or NONE when absent.
    pub name: NodeIndex,
}

#[derive(Clone, Debug)]
pub struct ImportAsData {
    pub module: Atom,
    /// `import m as alias` binding; a Name node, or NONE when absent.
    pub alias: NodeIndex,
}

/// Kind-specific node data.
#[derive(Clone, Debug)]
pub enum NodePayload {
    Module(ModuleData),
    FunctionDef(FunctionDefData),
    Lambda(LambdaData),
    ClassDef(ClassDefData),
    ListComprehension(ComprehensionData),
    ComprehensionFor(ComprehensionForData),
    ComprehensionIf(ComprehensionIfData),
    Name(NameData),
    MemberAccess(MemberAccessData),
    Index(IndexData),
    Call(CallData),
    Argument(ArgumentData),
    Parameter(ParameterData),
    BinaryOp(BinaryOpData),
    UnaryOp(UnaryOpData),
    Number(NumberData),
    StringLit(StringLitData),
    Constant(ConstantData),
    AssignmentExpr(AssignmentExprData),
    TupleExpr(TupleExprData),
    Assignment(AssignmentData),
    AugAssignment(AugAssignmentData),
    ExpressionStmt(ExpressionStmtData),
    Return(ReturnData),
    Del(DelData),
    If(IfData),
    For(ForData),
    With(WithData),
    WithItem(WithItemData),
    Try(TryData),
    ExceptClause(ExceptClauseData),
    ImportAs(ImportAsData),
    Pass,
}

impl NodePayload {
    pub const fn kind(&self) -> SyntaxKind {
        match self {
            NodePayload::Module(_) => SyntaxKind::Module,
            NodePayload::FunctionDef(_) => SyntaxKind::FunctionDef,
            NodePayload::Lambda(_) => SyntaxKind::Lambda,
            NodePayload::ClassDef(_) => SyntaxKind::ClassDef,
            NodePayload::ListComprehension(_) => SyntaxKind::ListComprehension,
            NodePayload::ComprehensionFor(_) => SyntaxKind::ComprehensionFor,
            NodePayload::ComprehensionIf(_) => SyntaxKind::ComprehensionIf,
            NodePayload::Name(_) => SyntaxKind::Name,
            NodePayload::MemberAccess(_) => SyntaxKind::MemberAccess,
            NodePayload::Index(_) => SyntaxKind::Index,
            NodePayload::Call(_) => SyntaxKind::Call,
            NodePayload::Argument(_) => SyntaxKind::Argument,
            NodePayload::Parameter(_) => SyntaxKind::Parameter,
            NodePayload::BinaryOp(_) => SyntaxKind::BinaryOp,
            NodePayload::UnaryOp(_) => SyntaxKind::UnaryOp,
            NodePayload::Number(_) => SyntaxKind::Number,
            NodePayload::StringLit(_) => SyntaxKind::StringLit,
            NodePayload::Constant(_) => SyntaxKind::Constant,
            NodePayload::AssignmentExpr(_) => SyntaxKind::AssignmentExpr,
            NodePayload::TupleExpr(_) => SyntaxKind::TupleExpr,
            NodePayload::Assignment(_) => SyntaxKind::Assignment,
            NodePayload::AugAssignment(_) => SyntaxKind::AugAssignment,
            NodePayload::ExpressionStmt(_) => SyntaxKind::ExpressionStmt,
            NodePayload::Return(_) => SyntaxKind::Return,
            NodePayload::Del(_) => SyntaxKind::Del,
            NodePayload::If(_) => SyntaxKind::If,
            NodePayload::For(_) => SyntaxKind::For,
            NodePayload::With(_) => SyntaxKind::With,
            NodePayload::WithItem(_) => SyntaxKind::WithItem,
            NodePayload::Try(_) => SyntaxKind::Try,
            NodePayload::ExceptClause(_) => SyntaxKind::ExceptClause,
            NodePayload::ImportAs(_) => SyntaxKind::ImportAs,
            NodePayload::Pass => SyntaxKind::Pass,
        }
    }

    /// Collect the node's children in source order.
    pub fn children(&self, out: &mut SmallVec<[NodeIndex; 8]>) {
        fn push(out: &mut SmallVec<[NodeIndex; 8]>, idx: NodeIndex) {
            if !idx.is_none() {
                out.push(idx);
            }
        }
        fn push_all(out: &mut SmallVec<[NodeIndex; 8]>, list: &[NodeIndex]) {
            for &idx in list {
                push(out, idx);
            }
        }
        match self {
            NodePayload::Module(data) => push_all(out, &data.body),
            NodePayload::FunctionDef(data) => {
                push_all(out, &data.decorators);
                push_all(out, &data.params);
                push_all(out, &data.body);
            }
            NodePayload::Lambda(data) => {
                push_all(out, &data.params);
                push(out, data.expr);
            }
            NodePayload::ClassDef(data) => {
                push_all(out, &data.decorators);
                push_all(out, &data.bases);
                push_all(out, &data.body);
            }
            NodePayload::ListComprehension(data) => {
                push(out, data.element);
                push_all(out, &data.clauses);
            }
            NodePayload::ComprehensionFor(data) => {
                push(out, data.target);
                push(out, data.iterable);
            }
            NodePayload::ComprehensionIf(data) => push(out, data.test),
            NodePayload::Name(_)
            | NodePayload::Number(_)
            | NodePayload::StringLit(_)
            | NodePayload::Constant(_)
            | NodePayload::Pass => {}
            NodePayload::MemberAccess(data) => push(out, data.receiver),
            NodePayload::Index(data) => {
                push(out, data.base);
                push(out, data.subscript);
            }
            NodePayload::Call(data) => {
                push(out, data.callee);
                push_all(out, &data.args);
            }
            NodePayload::Argument(data) => push(out, data.value),
            NodePayload::Parameter(data) => {
                push(out, data.annotation);
                push(out, data.default);
            }
            NodePayload::BinaryOp(data) => {
                push(out, data.left);
                push(out, data.right);
            }
            NodePayload::UnaryOp(data) => push(out, data.operand),
            NodePayload::AssignmentExpr(data) => {
                push(out, data.target);
                push(out, data.value);
            }
            NodePayload::TupleExpr(data) => push_all(out, &data.elements),
            NodePayload::Assignment(data) => {
                push_all(out, &data.targets);
                push(out, data.value);
            }
            NodePayload::AugAssignment(data) => {
                push(out, data.target);
                push(out, data.value);
            }
            NodePayload::ExpressionStmt(data) => push(out, data.expr),
            NodePayload::Return(data) => push(out, data.expr),
            NodePayload::Del(data) => push_all(out, &data.targets),
            NodePayload::If(data) => {
                push(out, data.test);
                push_all(out, &data.body);
                push_all(out, &data.orelse);
            }
            NodePayload::For(data) => {
                push(out, data.target);
                push(out, data.iterable);
                push_all(out, &data.body);
                push_all(out, &data.orelse);
            }
            NodePayload::With(data) => {
                push_all(out, &data.items);
                push_all(out, &data.body);
            }
            NodePayload::WithItem(data) => {
                push(out, data.expr);
                push(out, data.target);
            }
            NodePayload::Try(data) => {
                push_all(out, &data.body);
                push_all(out, &data.handlers);
                push_all(out, &data.orelse);
                push_all(out, &data.finally);
            }
            NodePayload::ExceptClause(data) => {
                push(out, data.type_expr);
                push(out, data.name);
            }
            NodePayload::ImportAs(data) => push(out, data.alias),
        }
    }
}

/// A node header: kind tag, parent link, source span.
#[derive(Clone, Copy, Debug)]
pub struct Node {
    pub kind: SyntaxKind,
    pub parent: NodeIndex,
    pub span: Span,
}

/// The parse-tree arena.
pub struct NodeArena {
    nodes: Vec<Node>,
    payloads: Vec<NodePayload>,
    strings: Arc<StringInterner>,
}

macro_rules! payload_accessor {
    ($fn_name:ident, $variant:ident, $data:ty) => {
        pub fn $fn_name(&self, idx: NodeIndex) -> Option<&$data> {
            match self.payload(idx)? {
                NodePayload::$variant(data) => Some(data),
                _ => None,
            }
        }
    };
}

impl NodeArena {
    pub fn new(strings: Arc<StringInterner>) -> Self {
        Self {
            nodes: Vec::new(),
            payloads: Vec::new(),
            strings,
        }
    }

    /// The string interner shared with this arena.
    pub fn strings(&self) -> &Arc<StringInterner> {
        &self.strings
    }

    /// Append a node. Parent links are fixed up by the builder.
    pub(crate) fn push(&mut self, payload: NodePayload, span: Span) -> NodeIndex {
        let idx = NodeIndex(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind: payload.kind(),
            parent: NodeIndex::NONE,
            span,
        });
        self.payloads.push(payload);
        idx
    }

    pub(crate) fn set_parent(&mut self, child: NodeIndex, parent: NodeIndex) {
        if let Some(node) = self.nodes.get_mut(child.0 as usize) {
            node.parent = parent;
        }
    }

    pub(crate) fn set_span(&mut self, idx: NodeIndex, span: Span) {
        if let Some(node) = self.nodes.get_mut(idx.0 as usize) {
            node.span = span;
        }
    }

    pub fn get(&self, idx: NodeIndex) -> Option<&Node> {
        if idx.is_none() {
            return None;
        }
        self.nodes.get(idx.0 as usize)
    }

    pub fn payload(&self, idx: NodeIndex) -> Option<&NodePayload> {
        if idx.is_none() {
            return None;
        }
        self.payloads.get(idx.0 as usize)
    }

    pub fn kind(&self, idx: NodeIndex) -> Option<SyntaxKind> {
        self.get(idx).map(|node| node.kind)
    }

    pub fn parent(&self, idx: NodeIndex) -> NodeIndex {
        self.get(idx).map_or(NodeIndex::NONE, |node| node.parent)
    }

    pub fn span(&self, idx: NodeIndex) -> Span {
        self.get(idx).map_or(Span::dummy(), |node| node.span)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Collect a node's children in source order.
    pub fn children(&self, idx: NodeIndex) -> SmallVec<[NodeIndex; 8]> {
        let mut out = SmallVec::new();
        if let Some(payload) = self.payload(idx) {
            payload.children(&mut out);
        }
        out
    }

    payload_accessor!(get_module, Module, ModuleData);
    payload_accessor!(get_function_def, FunctionDef, FunctionDefData);
    payload_accessor!(get_lambda, Lambda, LambdaData);
    payload_accessor!(get_class_def, ClassDef, ClassDefData);
    payload_accessor!(get_list_comprehension, ListComprehension, ComprehensionData);
    payload_accessor!(get_comprehension_for, ComprehensionFor, ComprehensionForData);
    payload_accessor!(get_comprehension_if, ComprehensionIf, ComprehensionIfData);
    payload_accessor!(get_name, Name, NameData);
    payload_accessor!(get_member_access, MemberAccess, MemberAccessData);
    payload_accessor!(get_index_expr, Index, IndexData);
    payload_accessor!(get_call_expr, Call, CallData);
    payload_accessor!(get_argument, Argument, ArgumentData);
    payload_accessor!(get_parameter, Parameter, ParameterData);
    payload_accessor!(get_binary_expr, BinaryOp, BinaryOpData);
    payload_accessor!(get_unary_expr, UnaryOp, UnaryOpData);
    payload_accessor!(get_number, Number, NumberData);
    payload_accessor!(get_string_lit, StringLit, StringLitData);
    payload_accessor!(get_constant, Constant, ConstantData);
    payload_accessor!(get_assignment_expr, AssignmentExpr, AssignmentExprData);
    payload_accessor!(get_tuple_expr, TupleExpr, TupleExprData);
    payload_accessor!(get_assignment, Assignment, AssignmentData);
    payload_accessor!(get_aug_assignment, AugAssignment, AugAssignmentData);
    payload_accessor!(get_expression_stmt, ExpressionStmt, ExpressionStmtData);
    payload_accessor!(get_return, Return, ReturnData);
    payload_accessor!(get_del, Del, DelData);
    payload_accessor!(get_if, If, IfData);
    payload_accessor!(get_for, For, ForData);
    payload_accessor!(get_with, With, WithData);
    payload_accessor!(get_with_item, WithItem, WithItemData);
    payload_accessor!(get_try, Try, TryData);
    payload_accessor!(get_except_clause, ExceptClause, ExceptClauseData);
    payload_accessor!(get_import_as, ImportAs, ImportAsData);
}

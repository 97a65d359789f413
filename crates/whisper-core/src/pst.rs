//! The packed syntax tree: a read-only `u32` word array plus a constants
//! table, and the typed cursor API the frame machine reads it through.
//!
//! # Encoding
//!
//! Every node is a header word (low 12 bits: [`NodeType`]; high 20 bits:
//! an `extra` field whose meaning is node-specific — usually a count)
//! followed by zero or more *metadata* words (constant-table indices that
//! are not themselves nodes: a name, a literal, a parameter list) and then
//! zero or more *child* nodes, emitted depth-first, back to back, with no
//! padding.
//!
//! `spec.md` §4.3 describes a variant of this shape with an explicit
//! relative-offset table ahead of the children, to support random access.
//! Every consumer in this interpreter (`FileSyntaxFrame`, `BlockSyntaxFrame`,
//! `CallExprSyntaxFrame`, `IfStmt` arm dispatch, `VarSyntaxFrame`) only
//! ever walks children in left-to-right order, never backward and never
//! by index out of sequence, so this rewrite drops the offset table and
//! instead makes every node *self-delimiting*: [`node_span`] recursively
//! computes how many words a node (header, metadata, and all children)
//! occupies, and a reader skips forward by that span to reach the next
//! sibling. This is a strictly simpler encoding with the same contract
//! (`data` is read-only; a node is found by `(pst, offset)`) and the same
//! asymptotic behaviour the frames actually need (sequential, not random,
//! access). See `DESIGN.md`.

use std::rc::Rc;

/// The twenty-one dispatched node kinds from `spec.md` §4.5.3, plus
/// `Block`: the statement-list container used by `def`/`if`/`loop`/arrow
/// bodies, which is read directly by its parent frame rather than routed
/// through `@NodeType` handler dispatch (there is no `@Block` handler
/// name in the table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NodeType {
    File = 0,
    Block = 1,
    EmptyStmt = 2,
    ExprStmt = 3,
    ReturnStmt = 4,
    IfStmt = 5,
    DefStmt = 6,
    ConstStmt = 7,
    VarStmt = 8,
    LoopStmt = 9,
    CallExpr = 10,
    DotExpr = 11,
    ArrowExpr = 12,
    PosExpr = 13,
    NegExpr = 14,
    AddExpr = 15,
    SubExpr = 16,
    MulExpr = 17,
    DivExpr = 18,
    ParenExpr = 19,
    NameExpr = 20,
    IntegerExpr = 21,
}

impl NodeType {
    const NODE_TYPE_BITS: u32 = 12;

    /// The `@NodeType` handler name `spec.md` §4.5.3 dispatches this node
    /// kind to. `Block` has none: it is read structurally by its parent.
    pub fn handler_name(self) -> Option<&'static str> {
        match self {
            NodeType::File => Some("@File"),
            NodeType::Block => None,
            NodeType::EmptyStmt => Some("@EmptyStmt"),
            NodeType::ExprStmt => Some("@ExprStmt"),
            NodeType::ReturnStmt => Some("@ReturnStmt"),
            NodeType::IfStmt => Some("@IfStmt"),
            NodeType::DefStmt => Some("@DefStmt"),
            NodeType::ConstStmt => Some("@ConstStmt"),
            NodeType::VarStmt => Some("@VarStmt"),
            NodeType::LoopStmt => Some("@LoopStmt"),
            NodeType::CallExpr => Some("@CallExpr"),
            NodeType::DotExpr => Some("@Dot"),
            NodeType::ArrowExpr => Some("@Arrow"),
            NodeType::PosExpr => Some("@Pos"),
            NodeType::NegExpr => Some("@Neg"),
            NodeType::AddExpr => Some("@Add"),
            NodeType::SubExpr => Some("@Sub"),
            NodeType::MulExpr => Some("@Mul"),
            NodeType::DivExpr => Some("@Div"),
            NodeType::ParenExpr => Some("@ParenExpr"),
            NodeType::NameExpr => Some("@NameExpr"),
            NodeType::IntegerExpr => Some("@Integer"),
        }
    }

    fn from_word(word: u32) -> NodeType {
        match word & ((1 << Self::NODE_TYPE_BITS) - 1) {
            0 => NodeType::File,
            1 => NodeType::Block,
            2 => NodeType::EmptyStmt,
            3 => NodeType::ExprStmt,
            4 => NodeType::ReturnStmt,
            5 => NodeType::IfStmt,
            6 => NodeType::DefStmt,
            7 => NodeType::ConstStmt,
            8 => NodeType::VarStmt,
            9 => NodeType::LoopStmt,
            10 => NodeType::CallExpr,
            11 => NodeType::DotExpr,
            12 => NodeType::ArrowExpr,
            13 => NodeType::PosExpr,
            14 => NodeType::NegExpr,
            15 => NodeType::AddExpr,
            16 => NodeType::SubExpr,
            17 => NodeType::MulExpr,
            18 => NodeType::DivExpr,
            19 => NodeType::ParenExpr,
            20 => NodeType::NameExpr,
            21 => NodeType::IntegerExpr,
            other => unreachable!("node type tag {other} out of the 22-variant range"),
        }
    }
}

/// A constant referenced by index from node metadata: either an
/// identifier/string or an integer literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Str(String),
    Int(i32),
}

/// The packed program: words plus a constants table. Read-only once
/// built; shared (via `Rc`) by every `SyntaxNodeRef` over it, exactly as
/// `spec.md` §3 describes a `(pst, offset)` pair as stack-only and cheap
/// to copy.
#[derive(Debug)]
pub struct PackedSyntaxTree {
    data: Vec<u32>,
    constants: Vec<Constant>,
}

impl PackedSyntaxTree {
    pub fn root(self: &Rc<Self>) -> SyntaxNodeRef {
        SyntaxNodeRef {
            pst: Rc::clone(self),
            offset: 0,
        }
    }
}

fn metadata_word_count(node_type: NodeType, extra: u32) -> u32 {
    match node_type {
        NodeType::NameExpr | NodeType::IntegerExpr | NodeType::DotExpr => 1,
        NodeType::DefStmt => 1 + extra,
        NodeType::ArrowExpr => extra,
        NodeType::VarStmt | NodeType::ConstStmt => 2 * extra,
        _ => 0,
    }
}

/// `None` for `VarStmt`/`ConstStmt`: their child count depends on which
/// bindings carry an initializer, which requires reading the metadata
/// rather than just `extra`.
fn simple_child_count(node_type: NodeType, extra: u32) -> Option<u32> {
    match node_type {
        NodeType::File | NodeType::Block => Some(extra),
        NodeType::EmptyStmt | NodeType::NameExpr | NodeType::IntegerExpr => Some(0),
        NodeType::ExprStmt
        | NodeType::PosExpr
        | NodeType::NegExpr
        | NodeType::ParenExpr
        | NodeType::DotExpr
        | NodeType::DefStmt
        | NodeType::ArrowExpr => Some(1),
        NodeType::ReturnStmt => Some(extra),
        NodeType::IfStmt => Some(2 * (extra >> 1) + (extra & 1)),
        NodeType::LoopStmt | NodeType::AddExpr | NodeType::SubExpr | NodeType::MulExpr | NodeType::DivExpr => Some(2),
        NodeType::CallExpr => Some(1 + extra),
        NodeType::VarStmt | NodeType::ConstStmt => None,
    }
}

fn node_header(pst: &PackedSyntaxTree, offset: u32) -> (NodeType, u32) {
    let word = pst.data[offset as usize];
    (NodeType::from_word(word), word >> NodeType::NODE_TYPE_BITS)
}

fn binding_has_init(pst: &PackedSyntaxTree, offset: u32, index: u32) -> bool {
    let (node_type, _) = node_header(pst, offset);
    debug_assert!(matches!(node_type, NodeType::VarStmt | NodeType::ConstStmt));
    pst.data[(offset + 1 + 2 * index + 1) as usize] != 0
}

fn child_count(pst: &PackedSyntaxTree, offset: u32) -> u32 {
    let (node_type, extra) = node_header(pst, offset);
    if let Some(n) = simple_child_count(node_type, extra) {
        return n;
    }
    (0..extra).filter(|&i| binding_has_init(pst, offset, i)).count() as u32
}

fn children_start(pst: &PackedSyntaxTree, offset: u32) -> u32 {
    let (node_type, extra) = node_header(pst, offset);
    offset + 1 + metadata_word_count(node_type, extra)
}

/// Total word length of the node at `offset`, header through its last
/// descendant, computed recursively. This is what lets a reader skip a
/// whole subtree without an explicit offset table.
pub fn node_span(pst: &PackedSyntaxTree, offset: u32) -> u32 {
    let start_of_children = children_start(pst, offset);
    let mut cursor = start_of_children;
    for _ in 0..child_count(pst, offset) {
        cursor += node_span(pst, cursor);
    }
    cursor - offset
}

fn nth_child_offset(pst: &PackedSyntaxTree, offset: u32, index: u32) -> u32 {
    let mut cursor = children_start(pst, offset);
    for _ in 0..index {
        cursor += node_span(pst, cursor);
    }
    cursor
}

/// A `(pst, offset)` pair: cheap to copy (an `Rc` clone plus a `u32`),
/// the realization of `spec.md` §3's stack-only `SyntaxNodeRef`.
#[derive(Clone)]
pub struct SyntaxNodeRef {
    pst: Rc<PackedSyntaxTree>,
    offset: u32,
}

impl std::fmt::Debug for SyntaxNodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyntaxNodeRef({:?}@{})", self.node_type(), self.offset)
    }
}

impl PartialEq for SyntaxNodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.pst, &other.pst) && self.offset == other.offset
    }
}

impl SyntaxNodeRef {
    /// Builds a reference to the node at `offset` in `pst` directly —
    /// `spec.md` §6's `interpret_syntax(tc, scope, pst, offset)` entry
    /// point, which addresses a node without having navigated to it via
    /// `child()` from an existing reference.
    pub fn at(pst: &Rc<PackedSyntaxTree>, offset: u32) -> SyntaxNodeRef {
        SyntaxNodeRef {
            pst: Rc::clone(pst),
            offset,
        }
    }

    pub fn pst(&self) -> &Rc<PackedSyntaxTree> {
        &self.pst
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn node_type(&self) -> NodeType {
        node_header(&self.pst, self.offset).0
    }

    pub fn extra(&self) -> u32 {
        node_header(&self.pst, self.offset).1
    }

    /// Raw metadata word `i` (a constant index or a raw flag, depending
    /// on the node type).
    pub fn metadata(&self, i: u32) -> u32 {
        self.pst.data[(self.offset + 1 + i) as usize]
    }

    pub fn child(&self, index: u32) -> SyntaxNodeRef {
        SyntaxNodeRef {
            pst: Rc::clone(&self.pst),
            offset: nth_child_offset(&self.pst, self.offset, index),
        }
    }

    pub fn child_count(&self) -> u32 {
        child_count(&self.pst, self.offset)
    }

    pub fn const_at(&self, index: u32) -> &Constant {
        &self.pst.constants[index as usize]
    }

    pub fn const_str(&self, index: u32) -> &str {
        match self.const_at(index) {
            Constant::Str(s) => s,
            Constant::Int(_) => panic!("constant {index} is not a string"),
        }
    }

    pub fn const_int(&self, index: u32) -> i32 {
        match self.const_at(index) {
            Constant::Int(n) => *n,
            Constant::Str(_) => panic!("constant {index} is not an integer"),
        }
    }

    // -- node-specific convenience accessors -------------------------------

    pub fn name_expr_name(&self) -> &str {
        self.const_str(self.metadata(0))
    }

    pub fn integer_literal(&self) -> i32 {
        self.const_int(self.metadata(0))
    }

    pub fn dot_expr_name(&self) -> &str {
        self.const_str(self.metadata(0))
    }

    pub fn dot_expr_target(&self) -> SyntaxNodeRef {
        self.child(0)
    }

    pub fn def_stmt_name(&self) -> &str {
        self.const_str(self.metadata(0))
    }

    pub fn def_stmt_params(&self) -> Vec<&str> {
        (0..self.extra()).map(|i| self.const_str(self.metadata(1 + i))).collect()
    }

    pub fn def_stmt_body(&self) -> SyntaxNodeRef {
        self.child(0)
    }

    pub fn arrow_params(&self) -> Vec<&str> {
        (0..self.extra()).map(|i| self.const_str(self.metadata(i))).collect()
    }

    pub fn arrow_body(&self) -> SyntaxNodeRef {
        self.child(0)
    }

    pub fn return_has_expr(&self) -> bool {
        self.extra() != 0
    }

    pub fn call_expr_callee(&self) -> SyntaxNodeRef {
        self.child(0)
    }

    pub fn call_expr_arg_count(&self) -> u32 {
        self.extra()
    }

    pub fn call_expr_arg(&self, index: u32) -> SyntaxNodeRef {
        self.child(1 + index)
    }

    pub fn if_arm_count(&self) -> u32 {
        self.extra() >> 1
    }

    pub fn if_has_else(&self) -> bool {
        self.extra() & 1 != 0
    }

    pub fn if_arm_cond(&self, i: u32) -> SyntaxNodeRef {
        self.child(2 * i)
    }

    pub fn if_arm_body(&self, i: u32) -> SyntaxNodeRef {
        self.child(2 * i + 1)
    }

    pub fn if_else_body(&self) -> SyntaxNodeRef {
        debug_assert!(self.if_has_else());
        self.child(2 * self.if_arm_count())
    }

    pub fn binding_count(&self) -> u32 {
        self.extra()
    }

    pub fn binding_name(&self, i: u32) -> &str {
        self.const_str(self.metadata(2 * i))
    }

    pub fn binding_has_init(&self, i: u32) -> bool {
        self.metadata(2 * i + 1) != 0
    }

    pub fn binding_init(&self, i: u32) -> Option<SyntaxNodeRef> {
        if !self.binding_has_init(i) {
            return None;
        }
        let init_index = (0..i).filter(|&j| self.binding_has_init(j)).count() as u32;
        Some(self.child(init_index))
    }
}

/// Write-side counterpart to the cursor API: builds a [`PackedSyntaxTree`]
/// depth-first with no backpatching, since the encoding is self-delimiting.
/// Mirrors the way the teacher keeps its bytecode builder beside the
/// bytecode it emits.
#[derive(Default)]
pub struct Builder {
    data: Vec<u32>,
    constants: Vec<Constant>,
    str_consts: ahash::AHashMap<String, u32>,
    int_consts: ahash::AHashMap<i32, u32>,
}

/// A deferred node emission: calling it appends that node's complete,
/// self-contained subtree to the builder and returns its start offset.
pub type NodeBuilder<'a> = Box<dyn FnOnce(&mut Builder) -> u32 + 'a>;

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn intern_str(&mut self, s: &str) -> u32 {
        if let Some(id) = self.str_consts.get(s) {
            return *id;
        }
        let id = self.constants.len() as u32;
        self.constants.push(Constant::Str(s.to_string()));
        self.str_consts.insert(s.to_string(), id);
        id
    }

    pub fn intern_int(&mut self, n: i32) -> u32 {
        if let Some(id) = self.int_consts.get(&n) {
            return *id;
        }
        let id = self.constants.len() as u32;
        self.constants.push(Constant::Int(n));
        self.int_consts.insert(n, id);
        id
    }

    fn push_header(&mut self, node_type: NodeType, extra: u32) -> u32 {
        let start = self.data.len() as u32;
        self.data.push((node_type as u32) | (extra << NodeType::NODE_TYPE_BITS));
        start
    }

    /// Finishes the tree: `root` must emit exactly one node starting at
    /// offset 0.
    pub fn build(mut self, root: NodeBuilder) -> PackedSyntaxTree {
        let start = root(&mut self);
        debug_assert_eq!(start, 0, "root node must be the first thing emitted");
        PackedSyntaxTree {
            data: self.data,
            constants: self.constants,
        }
    }

    fn block_like<'a>(node_type: NodeType, statements: Vec<NodeBuilder<'a>>) -> NodeBuilder<'a> {
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(node_type, statements.len() as u32);
            for stmt in statements {
                stmt(b);
            }
            start
        })
    }

    pub fn file(statements: Vec<NodeBuilder>) -> NodeBuilder {
        Self::block_like(NodeType::File, statements)
    }

    pub fn block(statements: Vec<NodeBuilder>) -> NodeBuilder {
        Self::block_like(NodeType::Block, statements)
    }

    pub fn empty_stmt<'a>() -> NodeBuilder<'a> {
        Box::new(|b: &mut Builder| b.push_header(NodeType::EmptyStmt, 0))
    }

    pub fn expr_stmt(expr: NodeBuilder) -> NodeBuilder {
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(NodeType::ExprStmt, 0);
            expr(b);
            start
        })
    }

    pub fn return_stmt<'a>(expr: Option<NodeBuilder<'a>>) -> NodeBuilder<'a> {
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(NodeType::ReturnStmt, u32::from(expr.is_some()));
            if let Some(expr) = expr {
                expr(b);
            }
            start
        })
    }

    pub fn if_stmt<'a>(arms: Vec<(NodeBuilder<'a>, NodeBuilder<'a>)>, else_body: Option<NodeBuilder<'a>>) -> NodeBuilder<'a> {
        Box::new(move |b: &mut Builder| {
            let extra = ((arms.len() as u32) << 1) | u32::from(else_body.is_some());
            let start = b.push_header(NodeType::IfStmt, extra);
            for (cond, body) in arms {
                cond(b);
                body(b);
            }
            if let Some(else_body) = else_body {
                else_body(b);
            }
            start
        })
    }

    pub fn def_stmt<'a>(name: &str, params: &[&str], body: NodeBuilder<'a>) -> NodeBuilder<'a> {
        let name = name.to_string();
        let params: Vec<String> = params.iter().map(|s| (*s).to_string()).collect();
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(NodeType::DefStmt, params.len() as u32);
            let name_id = b.intern_str(&name);
            b.data.push(name_id);
            for p in &params {
                let id = b.intern_str(p);
                b.data.push(id);
            }
            body(b);
            start
        })
    }

    pub fn binding_stmt<'a>(is_const: bool, bindings: Vec<(&str, Option<NodeBuilder<'a>>)>) -> NodeBuilder<'a> {
        let node_type = if is_const { NodeType::ConstStmt } else { NodeType::VarStmt };
        let names: Vec<String> = bindings.iter().map(|(n, _)| (*n).to_string()).collect();
        let inits: Vec<Option<NodeBuilder<'a>>> = bindings.into_iter().map(|(_, init)| init).collect();
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(node_type, names.len() as u32);
            let name_ids: Vec<u32> = names.iter().map(|n| b.intern_str(n)).collect();
            for (name_id, init) in name_ids.iter().zip(inits.iter()) {
                b.data.push(*name_id);
                b.data.push(u32::from(init.is_some()));
            }
            for init in inits {
                if let Some(init) = init {
                    init(b);
                }
            }
            start
        })
    }

    pub fn loop_stmt<'a>(cond: NodeBuilder<'a>, body: NodeBuilder<'a>) -> NodeBuilder<'a> {
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(NodeType::LoopStmt, 0);
            cond(b);
            body(b);
            start
        })
    }

    pub fn call_expr<'a>(callee: NodeBuilder<'a>, args: Vec<NodeBuilder<'a>>) -> NodeBuilder<'a> {
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(NodeType::CallExpr, args.len() as u32);
            callee(b);
            for arg in args {
                arg(b);
            }
            start
        })
    }

    pub fn dot_expr<'a>(target: NodeBuilder<'a>, name: &str) -> NodeBuilder<'a> {
        let name = name.to_string();
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(NodeType::DotExpr, 0);
            let id = b.intern_str(&name);
            b.data.push(id);
            target(b);
            start
        })
    }

    pub fn arrow_expr<'a>(params: &[&str], body: NodeBuilder<'a>) -> NodeBuilder<'a> {
        let params: Vec<String> = params.iter().map(|s| (*s).to_string()).collect();
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(NodeType::ArrowExpr, params.len() as u32);
            for p in &params {
                let id = b.intern_str(p);
                b.data.push(id);
            }
            body(b);
            start
        })
    }

    fn unary<'a>(node_type: NodeType, operand: NodeBuilder<'a>) -> NodeBuilder<'a> {
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(node_type, 0);
            operand(b);
            start
        })
    }

    fn binary<'a>(node_type: NodeType, lhs: NodeBuilder<'a>, rhs: NodeBuilder<'a>) -> NodeBuilder<'a> {
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(node_type, 0);
            lhs(b);
            rhs(b);
            start
        })
    }

    pub fn pos_expr(operand: NodeBuilder) -> NodeBuilder {
        Self::unary(NodeType::PosExpr, operand)
    }

    pub fn neg_expr(operand: NodeBuilder) -> NodeBuilder {
        Self::unary(NodeType::NegExpr, operand)
    }

    pub fn add_expr<'a>(lhs: NodeBuilder<'a>, rhs: NodeBuilder<'a>) -> NodeBuilder<'a> {
        Self::binary(NodeType::AddExpr, lhs, rhs)
    }

    pub fn sub_expr<'a>(lhs: NodeBuilder<'a>, rhs: NodeBuilder<'a>) -> NodeBuilder<'a> {
        Self::binary(NodeType::SubExpr, lhs, rhs)
    }

    pub fn mul_expr<'a>(lhs: NodeBuilder<'a>, rhs: NodeBuilder<'a>) -> NodeBuilder<'a> {
        Self::binary(NodeType::MulExpr, lhs, rhs)
    }

    pub fn div_expr<'a>(lhs: NodeBuilder<'a>, rhs: NodeBuilder<'a>) -> NodeBuilder<'a> {
        Self::binary(NodeType::DivExpr, lhs, rhs)
    }

    pub fn paren_expr(inner: NodeBuilder) -> NodeBuilder {
        Self::unary(NodeType::ParenExpr, inner)
    }

    pub fn name_expr<'a>(name: &str) -> NodeBuilder<'a> {
        let name = name.to_string();
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(NodeType::NameExpr, 0);
            let id = b.intern_str(&name);
            b.data.push(id);
            start
        })
    }

    pub fn integer_expr<'a>(value: i32) -> NodeBuilder<'a> {
        Box::new(move |b: &mut Builder| {
            let start = b.push_header(NodeType::IntegerExpr, 0);
            let id = b.intern_int(value);
            b.data.push(id);
            start
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_with_one_integer_statement_round_trips() {
        let tree = Builder::new().build(Builder::file(vec![Builder::expr_stmt(Builder::integer_expr(42))]));
        let root = Rc::new(tree);
        let file = root.root();
        assert_eq!(file.node_type(), NodeType::File);
        assert_eq!(file.child_count(), 1);
        let stmt = file.child(0);
        assert_eq!(stmt.node_type(), NodeType::ExprStmt);
        let expr = stmt.child(0);
        assert_eq!(expr.node_type(), NodeType::IntegerExpr);
        assert_eq!(expr.integer_literal(), 42);
    }

    #[test]
    fn call_expr_args_are_reachable_in_order() {
        let tree = Builder::new().build(Builder::file(vec![Builder::expr_stmt(Builder::call_expr(
            Builder::name_expr("f"),
            vec![Builder::integer_expr(1), Builder::integer_expr(2)],
        ))]));
        let root = Rc::new(tree);
        let call = root.root().child(0).child(0);
        assert_eq!(call.node_type(), NodeType::CallExpr);
        assert_eq!(call.call_expr_callee().node_type(), NodeType::NameExpr);
        assert_eq!(call.call_expr_arg_count(), 2);
        assert_eq!(call.call_expr_arg(0).integer_literal(), 1);
        assert_eq!(call.call_expr_arg(1).integer_literal(), 2);
    }

    #[test]
    fn var_stmt_skips_bindings_without_initializers() {
        let tree = Builder::new().build(Builder::file(vec![Builder::binding_stmt(
            false,
            vec![
                ("a", Some(Builder::integer_expr(1))),
                ("b", None),
                ("c", Some(Builder::integer_expr(3))),
            ],
        )]));
        let root = Rc::new(tree);
        let var_stmt = root.root().child(0);
        assert_eq!(var_stmt.binding_count(), 3);
        assert_eq!(var_stmt.binding_name(1), "b");
        assert!(!var_stmt.binding_has_init(1));
        assert_eq!(var_stmt.binding_init(0).unwrap().integer_literal(), 1);
        assert_eq!(var_stmt.binding_init(2).unwrap().integer_literal(), 3);
    }

    #[test]
    fn sibling_after_variable_length_node_is_reachable() {
        let tree = Builder::new().build(Builder::file(vec![
            Builder::expr_stmt(Builder::call_expr(Builder::name_expr("f"), vec![Builder::integer_expr(1)])),
            Builder::expr_stmt(Builder::integer_expr(99)),
        ]));
        let root = Rc::new(tree);
        let file = root.root();
        assert_eq!(file.child_count(), 2);
        let second = file.child(1).child(0);
        assert_eq!(second.node_type(), NodeType::IntegerExpr);
        assert_eq!(second.integer_literal(), 99);
    }
}

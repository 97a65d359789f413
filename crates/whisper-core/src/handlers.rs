//! The native `@NodeType` syntactic handlers: the only code in this crate
//! that actually understands statements and expressions. Everything here
//! is bound onto the global scope by `runtime::make_global_scope`, and a
//! program can shadow or delegate-override any one of these bindings the
//! same way it would any other scope property, since dispatch always goes
//! through an ordinary property lookup (`frame::step_invoke_syntax_node`).
//!
//! A handler is called with exactly one unevaluated syntax operand: the
//! node it was dispatched for. Most handlers just translate that node
//! into the matching dedicated frame kind already defined in `frame.rs`
//! (`@File` into `FileSyntax`, `@CallExpr` into `CallExprSyntax`, and so
//! on) and step into it. The handlers with no dedicated frame kind of
//! their own — the unary/binary operators, `@IfStmt`, `@LoopStmt` — build
//! their control flow directly out of `NativeCallResume`, the same
//! suspend/resume primitive a multi-step native function would use.

use crate::exception::ExcKind;
use crate::frame::{
    self, CallExprState, CallResult, DotExprState, EvalResult, FrameKind, NativeCallInfo, NativeFn, NativeOperands, ResumeFn,
};
use crate::function::{CallConvention, FunctionData, FunctionObjectData};
use crate::heap::{HeapId, HeapPayload};
use crate::pst::{NodeType, SyntaxNodeRef};
use crate::runtime::ThreadContext;
use crate::scope::{define_property, lookup_property, LookupResult, PropertyDescriptor};
use crate::value::{ValBox, ValKind};

/// Every native handler `make_global_scope` binds under its `@NodeType`
/// name, in no particular order (property definition order does not
/// matter for a flat global scope).
pub const NATIVE_HANDLERS: &[(&str, NativeFn)] = &[
    ("@File", handler_file),
    ("@EmptyStmt", handler_empty_stmt),
    ("@ExprStmt", handler_expr_stmt),
    ("@ReturnStmt", handler_return_stmt),
    ("@IfStmt", handler_if_stmt),
    ("@DefStmt", handler_def_stmt),
    ("@ConstStmt", handler_var_stmt),
    ("@VarStmt", handler_var_stmt),
    ("@LoopStmt", handler_loop_stmt),
    ("@CallExpr", handler_call_expr),
    ("@Dot", handler_dot_expr),
    ("@Arrow", handler_arrow_expr),
    ("@Pos", handler_pos_expr),
    ("@Neg", handler_neg_expr),
    ("@Add", handler_binary_expr),
    ("@Sub", handler_binary_expr),
    ("@Mul", handler_binary_expr),
    ("@Div", handler_binary_expr),
    ("@ParenExpr", handler_paren_expr),
    ("@NameExpr", handler_name_expr),
    ("@Integer", handler_integer_expr),
];

/// Every handler is invoked with `NativeOperands::Operative(vec![node])`,
/// `node` being the syntax it was dispatched for — pulls that one node
/// back out.
fn single_operand(info: &NativeCallInfo) -> SyntaxNodeRef {
    match &info.operands {
        NativeOperands::Operative(nodes) => nodes[0].clone(),
        NativeOperands::Applicative(_) => unreachable!("a @NodeType handler is always invoked operatively"),
    }
}

fn propagate(result: EvalResult) -> CallResult {
    match result {
        EvalResult::Value(v) => CallResult::Value(v),
        EvalResult::Void => CallResult::Void,
        EvalResult::Error(e) => CallResult::Error(e),
        EvalResult::Exc { raising_frame, exception } => CallResult::Exc { raising_frame, exception },
    }
}

fn require_value(ctx: &mut ThreadContext, frame_id: HeapId, what: &str, incoming: EvalResult) -> Result<ValBox, CallResult> {
    match incoming {
        EvalResult::Value(v) => Ok(v),
        EvalResult::Void => Err(frame::raise_call(
            &mut ctx.heap,
            frame_id,
            ExcKind::VoidWhereValueRequired,
            format!("{what} produced no value"),
            vec![],
        )),
        other => Err(propagate(other)),
    }
}

/// Evaluates `syntax` in `scope` and forwards whatever it produces
/// straight back to `info.self_frame`'s caller, unexamined. Grounded on
/// `frame.rs`'s own pass-through `Resolve(parent, incoming)` arms —
/// nothing to combine, so no `NativeCallResume` is needed.
fn continue_into(ctx: &mut ThreadContext, info: &NativeCallInfo, syntax: SyntaxNodeRef, scope: HeapId) -> CallResult {
    let child = frame::alloc_frame(&mut ctx.heap, info.self_frame, FrameKind::Entry { syntax, scope });
    CallResult::Continue(child)
}

/// Evaluates `syntax` in `scope`, then hands the result to `resume` along
/// with `state` for further processing — the building block every
/// operator and control-flow handler below chains through.
fn spawn_resume(ctx: &mut ThreadContext, info: &NativeCallInfo, syntax: SyntaxNodeRef, scope: HeapId, resume: ResumeFn, state: ValBox) -> CallResult {
    let child = frame::alloc_frame(
        &mut ctx.heap,
        info.self_frame,
        FrameKind::NativeCallResume {
            call_info: info.clone(),
            eval_scope: scope,
            syntax_node: syntax,
            resume,
            state,
        },
    );
    CallResult::Continue(child)
}

fn to_f64(ctx: &ThreadContext, v: ValBox) -> Option<f64> {
    match v.unpack() {
        ValKind::Int32(n) => Some(f64::from(n)),
        ValKind::Double(d) => Some(d),
        ValKind::HeapDoubleRef(id) => match &ctx.heap.get(id).payload {
            HeapPayload::HeapDouble(d) => Some(*d),
            _ => None,
        },
        _ => None,
    }
}

/// Wraps `n` as a number, falling back to a heap-boxed double when the
/// immediate encoding can't hold it (`spec.md` §3's `Double`/`HeapDouble`
/// split — see `value.rs`'s `ValBox::double`).
fn make_number(ctx: &mut ThreadContext, n: f64) -> ValBox {
    match ValBox::double(n) {
        Ok(v) => v,
        Err(_) => {
            let id = ctx.heap.allocate(HeapPayload::HeapDouble(n));
            ValBox::heap_double(id)
        }
    }
}

fn reify(ctx: &mut ThreadContext, owner: HeapId, function: HeapId) -> HeapId {
    ctx.heap.allocate(HeapPayload::FunctionObject(FunctionObjectData {
        function,
        bound_self: Some(owner),
    }))
}

fn handler_file(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let child = frame::alloc_frame(
        &mut ctx.heap,
        info.self_frame,
        FrameKind::FileSyntax { node, scope: info.scope, statement_no: 0 },
    );
    CallResult::Continue(child)
}

fn handler_empty_stmt(_ctx: &mut ThreadContext, _info: NativeCallInfo) -> CallResult {
    CallResult::Value(ValBox::UNDEFINED)
}

fn handler_expr_stmt(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let scope = info.scope;
    continue_into(ctx, &info, node.child(0), scope)
}

fn handler_paren_expr(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let scope = info.scope;
    continue_into(ctx, &info, node.child(0), scope)
}

fn handler_return_stmt(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let child = frame::alloc_frame(&mut ctx.heap, info.self_frame, FrameKind::ReturnStmtSyntax { node, scope: info.scope });
    CallResult::Continue(child)
}

fn handler_var_stmt(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let is_const = node.node_type() == NodeType::ConstStmt;
    let child = frame::alloc_frame(
        &mut ctx.heap,
        info.self_frame,
        FrameKind::VarSyntax {
            node,
            scope: info.scope,
            binding_no: 0,
            is_const,
            last_value: ValBox::UNDEFINED,
        },
    );
    CallResult::Continue(child)
}

fn handler_call_expr(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let child = frame::alloc_frame(
        &mut ctx.heap,
        info.self_frame,
        FrameKind::CallExprSyntax { node, scope: info.scope, state: CallExprState::Callee },
    );
    CallResult::Continue(child)
}

fn handler_dot_expr(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let child = frame::alloc_frame(
        &mut ctx.heap,
        info.self_frame,
        FrameKind::DotExprSyntax { node, scope: info.scope, state: DotExprState::Target },
    );
    CallResult::Continue(child)
}

fn handler_integer_expr(_ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    CallResult::Value(ValBox::int32(node.integer_literal()))
}

fn handler_name_expr(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let name = node.name_expr_name().to_string();
    let name_id = ctx.intern(&name);
    match lookup_property(&ctx.heap, info.scope, name_id) {
        LookupResult::NotFound => frame::raise_call(&mut ctx.heap, info.self_frame, ExcKind::NameNotFound, format!("name not found: {name}"), vec![]),
        LookupResult::Found { owner, descriptor } => match descriptor {
            PropertyDescriptor::Value { value, .. } => CallResult::Value(value),
            PropertyDescriptor::Method(function_id) => {
                let func_obj = reify(ctx, owner, function_id);
                CallResult::Value(ValBox::object(func_obj))
            }
            // No `@NodeType` handler ever defines an accessor property,
            // and user code has no syntax to create one either — a plain
            // name can only ever resolve to a value or a method.
            PropertyDescriptor::Accessor { .. } => frame::raise_call(
                &mut ctx.heap,
                info.self_frame,
                ExcKind::NotCallable,
                format!("name resolves to an accessor, which a plain reference cannot invoke: {name}"),
                vec![],
            ),
        },
    }
}

fn handler_def_stmt(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let param_names = node.def_stmt_params().iter().map(|p| ctx.intern(p)).collect();
    let body = node.def_stmt_body();
    let function_id = ctx.heap.allocate(HeapPayload::Function(FunctionData::Scripted {
        convention: CallConvention::Applicative,
        param_names,
        body,
        closure_scope: info.scope,
    }));
    let name_id = ctx.intern(node.def_stmt_name());
    define_property(&mut ctx.heap, info.scope, name_id, PropertyDescriptor::Method(function_id));
    CallResult::Value(ValBox::UNDEFINED)
}

fn handler_arrow_expr(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let param_names = node.arrow_params().iter().map(|p| ctx.intern(p)).collect();
    let body = node.arrow_body();
    let function_id = ctx.heap.allocate(HeapPayload::Function(FunctionData::Scripted {
        convention: CallConvention::Applicative,
        param_names,
        body,
        closure_scope: info.scope,
    }));
    let func_obj = ctx.heap.allocate(HeapPayload::FunctionObject(FunctionObjectData {
        function: function_id,
        bound_self: None,
    }));
    CallResult::Value(ValBox::object(func_obj))
}

fn handler_pos_expr(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let scope = info.scope;
    spawn_resume(ctx, &info, node.child(0), scope, resume_pos, ValBox::UNDEFINED)
}

fn resume_pos(ctx: &mut ThreadContext, call_info: &NativeCallInfo, _state: ValBox, incoming: EvalResult) -> CallResult {
    let v = match require_value(ctx, call_info.self_frame, "operand", incoming) {
        Ok(v) => v,
        Err(result) => return result,
    };
    if v.is_number() {
        CallResult::Value(v)
    } else {
        frame::raise_call(&mut ctx.heap, call_info.self_frame, ExcKind::BadOperandType, "operand to unary + is not a number", vec![v])
    }
}

fn handler_neg_expr(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let scope = info.scope;
    spawn_resume(ctx, &info, node.child(0), scope, resume_neg, ValBox::UNDEFINED)
}

fn resume_neg(ctx: &mut ThreadContext, call_info: &NativeCallInfo, _state: ValBox, incoming: EvalResult) -> CallResult {
    let v = match require_value(ctx, call_info.self_frame, "operand", incoming) {
        Ok(v) => v,
        Err(result) => return result,
    };
    match v.unpack() {
        ValKind::Int32(n) => match n.checked_neg() {
            Some(r) => CallResult::Value(ValBox::int32(r)),
            None => frame::raise_call(&mut ctx.heap, call_info.self_frame, ExcKind::IntegerOverflow, "integer negation overflowed", vec![v]),
        },
        _ => match to_f64(ctx, v) {
            Some(n) => CallResult::Value(make_number(ctx, -n)),
            None => frame::raise_call(&mut ctx.heap, call_info.self_frame, ExcKind::BadOperandType, "operand to unary - is not a number", vec![v]),
        },
    }
}

/// Shared by `@Add`/`@Sub`/`@Mul`/`@Div`: evaluate the left operand, then
/// the right, then dispatch on the node's own type (always recoverable
/// from `call_info`, so the two resume stages below need not be
/// duplicated per operator).
fn handler_binary_expr(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let scope = info.scope;
    spawn_resume(ctx, &info, node.child(0), scope, resume_binary_lhs, ValBox::UNDEFINED)
}

fn resume_binary_lhs(ctx: &mut ThreadContext, call_info: &NativeCallInfo, _state: ValBox, incoming: EvalResult) -> CallResult {
    let lhs = match require_value(ctx, call_info.self_frame, "left operand", incoming) {
        Ok(v) => v,
        Err(result) => return result,
    };
    let node = single_operand(call_info);
    spawn_resume(ctx, call_info, node.child(1), call_info.scope, resume_binary_rhs, lhs)
}

fn resume_binary_rhs(ctx: &mut ThreadContext, call_info: &NativeCallInfo, lhs: ValBox, incoming: EvalResult) -> CallResult {
    let rhs = match require_value(ctx, call_info.self_frame, "right operand", incoming) {
        Ok(v) => v,
        Err(result) => return result,
    };
    let node = single_operand(call_info);
    apply_binary(ctx, call_info.self_frame, node.node_type(), lhs, rhs)
}

fn apply_binary(ctx: &mut ThreadContext, frame_id: HeapId, op: NodeType, lhs: ValBox, rhs: ValBox) -> CallResult {
    if let (Some(a), Some(b)) = (lhs.as_int32(), rhs.as_int32()) {
        if op == NodeType::DivExpr && b == 0 {
            return frame::raise_call(&mut ctx.heap, frame_id, ExcKind::DivisionByZero, "division by zero", vec![lhs, rhs]);
        }
        let result = match op {
            NodeType::AddExpr => a.checked_add(b),
            NodeType::SubExpr => a.checked_sub(b),
            NodeType::MulExpr => a.checked_mul(b),
            NodeType::DivExpr => a.checked_div(b),
            _ => unreachable!("apply_binary is only wired to arithmetic node types"),
        };
        return match result {
            Some(n) => CallResult::Value(ValBox::int32(n)),
            None => frame::raise_call(&mut ctx.heap, frame_id, ExcKind::IntegerOverflow, "integer arithmetic overflowed", vec![lhs, rhs]),
        };
    }
    let (Some(a), Some(b)) = (to_f64(ctx, lhs), to_f64(ctx, rhs)) else {
        return frame::raise_call(&mut ctx.heap, frame_id, ExcKind::BadOperandType, "operand is not a number", vec![lhs, rhs]);
    };
    if op == NodeType::DivExpr && b == 0.0 {
        return frame::raise_call(&mut ctx.heap, frame_id, ExcKind::DivisionByZero, "division by zero", vec![lhs, rhs]);
    }
    let result = match op {
        NodeType::AddExpr => a + b,
        NodeType::SubExpr => a - b,
        NodeType::MulExpr => a * b,
        NodeType::DivExpr => a / b,
        _ => unreachable!("apply_binary is only wired to arithmetic node types"),
    };
    CallResult::Value(make_number(ctx, result))
}

fn handler_if_stmt(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    if_try_arm(ctx, &info, node, 0)
}

fn if_try_arm(ctx: &mut ThreadContext, info: &NativeCallInfo, node: SyntaxNodeRef, arm: u32) -> CallResult {
    if arm == node.if_arm_count() {
        if node.if_has_else() {
            let else_body = node.if_else_body();
            continue_into(ctx, info, else_body, info.scope)
        } else {
            CallResult::Value(ValBox::UNDEFINED)
        }
    } else {
        let cond = node.if_arm_cond(arm);
        let scope = info.scope;
        spawn_resume(ctx, info, cond, scope, resume_if_cond, ValBox::int32(arm as i32))
    }
}

fn resume_if_cond(ctx: &mut ThreadContext, call_info: &NativeCallInfo, state: ValBox, incoming: EvalResult) -> CallResult {
    let arm = state.as_int32().expect("if-statement resume state always carries the arm index") as u32;
    let v = match require_value(ctx, call_info.self_frame, "if condition", incoming) {
        Ok(v) => v,
        Err(result) => return result,
    };
    let node = single_operand(call_info);
    if frame::is_truthy(v) {
        let body = node.if_arm_body(arm);
        continue_into(ctx, call_info, body, call_info.scope)
    } else {
        if_try_arm(ctx, call_info, node, arm + 1)
    }
}

fn handler_loop_stmt(ctx: &mut ThreadContext, info: NativeCallInfo) -> CallResult {
    let node = single_operand(&info);
    let scope = info.scope;
    spawn_resume(ctx, &info, node.child(0), scope, resume_loop_cond, ValBox::UNDEFINED)
}

fn resume_loop_cond(ctx: &mut ThreadContext, call_info: &NativeCallInfo, _state: ValBox, incoming: EvalResult) -> CallResult {
    let v = match require_value(ctx, call_info.self_frame, "loop condition", incoming) {
        Ok(v) => v,
        Err(result) => return result,
    };
    let node = single_operand(call_info);
    if frame::is_truthy(v) {
        spawn_resume(ctx, call_info, node.child(1), call_info.scope, resume_loop_body, ValBox::UNDEFINED)
    } else {
        CallResult::Value(ValBox::UNDEFINED)
    }
}

fn resume_loop_body(ctx: &mut ThreadContext, call_info: &NativeCallInfo, _state: ValBox, incoming: EvalResult) -> CallResult {
    match incoming {
        EvalResult::Error(_) | EvalResult::Exc { .. } => propagate(incoming),
        EvalResult::Value(_) | EvalResult::Void => {
            let node = single_operand(call_info);
            spawn_resume(ctx, call_info, node.child(0), call_info.scope, resume_loop_cond, ValBox::UNDEFINED)
        }
    }
}

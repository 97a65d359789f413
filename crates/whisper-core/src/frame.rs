//! The frame machine: a linked stack of heap-allocated frames, each
//! implementing `Step`/`Resolve`, that the trampoline in `runtime.rs`
//! drives to completion. See `spec.md` §4.5 for the frame catalog this
//! module is a direct, per-kind implementation of.
//!
//! # Trampoline contract
//!
//! Rather than exposing `Step`/`Resolve` as two separately callable
//! operations the way `spec.md` phrases them, this module exposes one
//! entry point per action — [`step`] and [`resolve`] — each returning a
//! [`Transition`] telling the trampoline what to do next: call `Step` on
//! a freshly pushed child, call `Resolve` on a popped-to parent with a
//! value, or stop (the terminal frame absorbed a result). This keeps the
//! alternation explicit in the caller rather than implicit in frame
//! state, and is what makes "forward unchanged to parent" (repeated
//! throughout §4.5) a one-line `Transition::Resolve(self.parent, result)`
//! at every call site that needs it.

use std::collections::HashMap;

use smallvec::{smallvec, SmallVec};

use crate::exception::{ExcKind, ExceptionData};
use crate::heap::{forward_id, Heap, HeapId, HeapPayload};
use crate::pst::SyntaxNodeRef;
use crate::runtime::ThreadContext;
use crate::scope::{define_property, lookup_property, LookupResult, PropertyDescriptor, ScopeData, ScopeKind};
use crate::value::ValBox;

/// `spec.md` §3's `EvalResult`: what a frame produces when it finishes.
#[derive(Debug, Clone)]
pub enum EvalResult {
    Value(ValBox),
    Void,
    Error(String),
    Exc { raising_frame: HeapId, exception: HeapId },
}

/// `spec.md` §3's `CallResult`: what a native handler returns.
#[derive(Debug, Clone)]
pub enum CallResult {
    Value(ValBox),
    Void,
    Error(String),
    Exc { raising_frame: HeapId, exception: HeapId },
    Continue(HeapId),
}

impl CallResult {
    fn into_eval(self) -> Option<EvalResult> {
        match self {
            CallResult::Value(v) => Some(EvalResult::Value(v)),
            CallResult::Void => Some(EvalResult::Void),
            CallResult::Error(e) => Some(EvalResult::Error(e)),
            CallResult::Exc { raising_frame, exception } => Some(EvalResult::Exc { raising_frame, exception }),
            CallResult::Continue(_) => None,
        }
    }
}

/// What the trampoline does after a `Step`/`Resolve` call.
pub enum Transition {
    /// Make `HeapId` the new top frame and call `Step` on it next.
    Step(HeapId),
    /// Call `Resolve` on `HeapId` (normally the current frame's parent)
    /// with this result next.
    Resolve(HeapId, EvalResult),
    /// The terminal frame absorbed a result; the trampoline stops.
    Done(EvalResult),
}

fn call_result_transition(parent: HeapId, result: CallResult) -> Transition {
    match result {
        CallResult::Continue(next) => Transition::Step(next),
        other => Transition::Resolve(parent, other.into_eval().expect("non-Continue CallResult always converts")),
    }
}

/// Raw, unevaluated syntax (for an operative call) or already-evaluated
/// values (for an applicative call) passed to a native function.
#[derive(Debug, Clone)]
pub enum NativeOperands {
    Applicative(Vec<ValBox>),
    Operative(SmallVec<[SyntaxNodeRef; 4]>),
}

/// Everything a native entry point needs: the scope it was called from,
/// its operands, and the frame it should parent any child frame it
/// spawns to (so a suspend-then-resume native correctly rejoins the
/// spine it was invoked from).
#[derive(Debug, Clone)]
pub struct NativeCallInfo {
    pub scope: HeapId,
    pub operands: NativeOperands,
    pub self_frame: HeapId,
}

pub type NativeFn = fn(&mut ThreadContext, NativeCallInfo) -> CallResult;
pub type ResumeFn = fn(&mut ThreadContext, &NativeCallInfo, ValBox, EvalResult) -> CallResult;

/// What a `Continuation` heap object resolves to when invoked: either a
/// real captured frame, or the sentinel bound under the global scope's
/// `@retcont` that turns every top-level `return` into the diagnostic
/// E3 names ("return used in non-returnable context.").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationTarget {
    Frame(HeapId),
    NonReturnable,
}

/// `CallExprSyntaxFrame`'s three-state machine (`spec.md` §4.5.8).
#[derive(Debug, Clone)]
pub enum CallExprState {
    Callee,
    Arg {
        callee_func_obj: HeapId,
        arg_no: u32,
        operands: Vec<ValBox>,
    },
    Invoke {
        callee_func_obj: HeapId,
        operands: Vec<ValBox>,
    },
}

/// `DotExprSyntaxFrame`'s two-state machine (`spec.md` §4.5.10).
#[derive(Debug, Clone)]
pub enum DotExprState {
    Target,
    Invoke { func_obj: HeapId },
}

/// Every frame kind from `spec.md` §4.5, plus the `parent` every frame
/// carries (§3's "a `Frame`'s `parent` field is the only owning path to
/// ancestor frames").
#[derive(Debug)]
pub struct Frame {
    pub parent: HeapId,
    pub kind: FrameKind,
}

#[derive(Debug)]
pub enum FrameKind {
    Terminal {
        result: Option<EvalResult>,
    },
    Entry {
        syntax: SyntaxNodeRef,
        scope: HeapId,
    },
    InvokeSyntaxNode {
        syntax: SyntaxNodeRef,
        scope: HeapId,
    },
    FileSyntax {
        node: SyntaxNodeRef,
        scope: HeapId,
        statement_no: u32,
    },
    BlockSyntax {
        node: SyntaxNodeRef,
        scope: HeapId,
        statement_no: u32,
    },
    ReturnStmtSyntax {
        node: SyntaxNodeRef,
        scope: HeapId,
    },
    VarSyntax {
        node: SyntaxNodeRef,
        scope: HeapId,
        binding_no: u32,
        is_const: bool,
        last_value: ValBox,
    },
    CallExprSyntax {
        node: SyntaxNodeRef,
        scope: HeapId,
        state: CallExprState,
    },
    InvokeApplicative {
        caller_scope: HeapId,
        callee_func_obj: HeapId,
        operands: Vec<ValBox>,
    },
    InvokeOperative {
        caller_scope: HeapId,
        callee_func_obj: HeapId,
        syntax_node: SyntaxNodeRef,
    },
    DotExprSyntax {
        node: SyntaxNodeRef,
        scope: HeapId,
        state: DotExprState,
    },
    NativeCallResume {
        call_info: NativeCallInfo,
        eval_scope: HeapId,
        syntax_node: SyntaxNodeRef,
        resume: ResumeFn,
        state: ValBox,
    },
}

impl Frame {
    pub(crate) fn trace(&self, out: &mut Vec<HeapId>) {
        out.push(self.parent);
        match &self.kind {
            FrameKind::Terminal { result } => {
                if let Some(r) = result {
                    trace_eval_result(r, out);
                }
            }
            FrameKind::Entry { scope, .. } | FrameKind::InvokeSyntaxNode { scope, .. } => out.push(*scope),
            FrameKind::FileSyntax { scope, .. } | FrameKind::BlockSyntax { scope, .. } => out.push(*scope),
            FrameKind::ReturnStmtSyntax { scope, .. } => out.push(*scope),
            FrameKind::VarSyntax { scope, last_value, .. } => {
                out.push(*scope);
                if let Some(id) = last_value.as_object_ref() {
                    out.push(id);
                }
            }
            FrameKind::CallExprSyntax { scope, state, .. } => {
                out.push(*scope);
                match state {
                    CallExprState::Callee => {}
                    CallExprState::Arg {
                        callee_func_obj,
                        operands,
                        ..
                    }
                    | CallExprState::Invoke {
                        callee_func_obj,
                        operands,
                    } => {
                        out.push(*callee_func_obj);
                        for v in operands {
                            if let Some(id) = v.as_object_ref() {
                                out.push(id);
                            }
                        }
                    }
                }
            }
            FrameKind::InvokeApplicative {
                caller_scope,
                callee_func_obj,
                operands,
            } => {
                out.push(*caller_scope);
                out.push(*callee_func_obj);
                for v in operands {
                    if let Some(id) = v.as_object_ref() {
                        out.push(id);
                    }
                }
            }
            FrameKind::InvokeOperative {
                caller_scope,
                callee_func_obj,
                ..
            } => {
                out.push(*caller_scope);
                out.push(*callee_func_obj);
            }
            FrameKind::DotExprSyntax { scope, state, .. } => {
                out.push(*scope);
                if let DotExprState::Invoke { func_obj } = state {
                    out.push(*func_obj);
                }
            }
            FrameKind::NativeCallResume {
                call_info, eval_scope, state, ..
            } => {
                out.push(call_info.scope);
                out.push(call_info.self_frame);
                out.push(*eval_scope);
                if let Some(id) = state.as_object_ref() {
                    out.push(id);
                }
                if let NativeOperands::Applicative(values) = &call_info.operands {
                    for v in values {
                        if let Some(id) = v.as_object_ref() {
                            out.push(id);
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn update(&mut self, forwarding: &HashMap<HeapId, HeapId>) {
        forward_id(&mut self.parent, forwarding);
        match &mut self.kind {
            FrameKind::Terminal { result } => {
                if let Some(r) = result {
                    update_eval_result(r, forwarding);
                }
            }
            FrameKind::Entry { scope, .. } | FrameKind::InvokeSyntaxNode { scope, .. } => forward_id(scope, forwarding),
            FrameKind::FileSyntax { scope, .. } | FrameKind::BlockSyntax { scope, .. } => forward_id(scope, forwarding),
            FrameKind::ReturnStmtSyntax { scope, .. } => forward_id(scope, forwarding),
            FrameKind::VarSyntax { scope, last_value, .. } => {
                forward_id(scope, forwarding);
                crate::heap::forward_value(last_value, forwarding);
            }
            FrameKind::CallExprSyntax { scope, state, .. } => {
                forward_id(scope, forwarding);
                match state {
                    CallExprState::Callee => {}
                    CallExprState::Arg {
                        callee_func_obj,
                        operands,
                        ..
                    }
                    | CallExprState::Invoke {
                        callee_func_obj,
                        operands,
                    } => {
                        forward_id(callee_func_obj, forwarding);
                        for v in operands.iter_mut() {
                            crate::heap::forward_value(v, forwarding);
                        }
                    }
                }
            }
            FrameKind::InvokeApplicative {
                caller_scope,
                callee_func_obj,
                operands,
            } => {
                forward_id(caller_scope, forwarding);
                forward_id(callee_func_obj, forwarding);
                for v in operands.iter_mut() {
                    crate::heap::forward_value(v, forwarding);
                }
            }
            FrameKind::InvokeOperative {
                caller_scope,
                callee_func_obj,
                ..
            } => {
                forward_id(caller_scope, forwarding);
                forward_id(callee_func_obj, forwarding);
            }
            FrameKind::DotExprSyntax { scope, state, .. } => {
                forward_id(scope, forwarding);
                if let DotExprState::Invoke { func_obj } = state {
                    forward_id(func_obj, forwarding);
                }
            }
            FrameKind::NativeCallResume {
                call_info, eval_scope, state, ..
            } => {
                forward_id(&mut call_info.scope, forwarding);
                forward_id(&mut call_info.self_frame, forwarding);
                forward_id(eval_scope, forwarding);
                crate::heap::forward_value(state, forwarding);
                if let NativeOperands::Applicative(values) = &mut call_info.operands {
                    for v in values.iter_mut() {
                        crate::heap::forward_value(v, forwarding);
                    }
                }
            }
        }
    }
}

pub(crate) fn trace_eval_result(result: &EvalResult, out: &mut Vec<HeapId>) {
    match result {
        EvalResult::Value(v) => {
            if let Some(id) = v.as_object_ref() {
                out.push(id);
            }
        }
        EvalResult::Exc {
            raising_frame,
            exception,
        } => {
            out.push(*raising_frame);
            out.push(*exception);
        }
        EvalResult::Void | EvalResult::Error(_) => {}
    }
}

pub(crate) fn update_eval_result(result: &mut EvalResult, forwarding: &HashMap<HeapId, HeapId>) {
    match result {
        EvalResult::Value(v) => crate::heap::forward_value(v, forwarding),
        EvalResult::Exc {
            raising_frame,
            exception,
        } => {
            forward_id(raising_frame, forwarding);
            forward_id(exception, forwarding);
        }
        EvalResult::Void | EvalResult::Error(_) => {}
    }
}

pub(crate) fn alloc_frame(heap: &mut Heap, parent: HeapId, kind: FrameKind) -> HeapId {
    heap.allocate(HeapPayload::Frame(Frame { parent, kind }))
}

fn frame_kind<'h>(heap: &'h Heap, id: HeapId) -> &'h FrameKind {
    match &heap.get(id).payload {
        HeapPayload::Frame(frame) => &frame.kind,
        _ => panic!("heap id {id:?} does not reference a frame"),
    }
}

fn frame_parent(heap: &Heap, id: HeapId) -> HeapId {
    match &heap.get(id).payload {
        HeapPayload::Frame(frame) => frame.parent,
        _ => panic!("heap id {id:?} does not reference a frame"),
    }
}

fn write_frame_kind(heap: &mut Heap, id: HeapId, kind: FrameKind) {
    heap.write(id, |payload| {
        if let HeapPayload::Frame(frame) = payload {
            frame.kind = kind;
        }
    });
}

/// Allocates an `Exception` heap object and wraps it as an `EvalResult`.
pub fn raise(heap: &mut Heap, frame: HeapId, kind: ExcKind, message: impl Into<String>, args: Vec<ValBox>) -> EvalResult {
    let exception = heap.allocate(HeapPayload::Exception(ExceptionData::new(kind, message, args)));
    EvalResult::Exc {
        raising_frame: frame,
        exception,
    }
}

pub(crate) fn raise_call(heap: &mut Heap, frame: HeapId, kind: ExcKind, message: impl Into<String>, args: Vec<ValBox>) -> CallResult {
    match raise(heap, frame, kind, message, args) {
        EvalResult::Exc { raising_frame, exception } => CallResult::Exc { raising_frame, exception },
        _ => unreachable!("raise always returns Exc"),
    }
}

/// `spec.md` §4.6's ValBox truthiness rule for `@IfStmt`/`@LoopStmt`:
/// `Undefined`/`Null`/`Bool(false)`/`Int32(0)` are falsy; everything
/// else, including `Double(0.0)`, is truthy.
pub fn is_truthy(v: ValBox) -> bool {
    match v.unpack() {
        crate::value::ValKind::Undefined | crate::value::ValKind::Null => false,
        crate::value::ValKind::Bool(b) => b,
        crate::value::ValKind::Int32(n) => n != 0,
        _ => true,
    }
}

fn reify_method(heap: &mut Heap, owner: HeapId, function: HeapId) -> HeapId {
    heap.allocate(HeapPayload::FunctionObject(crate::function::FunctionObjectData {
        function,
        bound_self: Some(owner),
    }))
}

fn lookup_handler(
    ctx: &mut ThreadContext,
    self_id: HeapId,
    scope: HeapId,
    handler_name: &str,
) -> Result<(HeapId, HeapId), EvalResult> {
    let name_id = ctx.intern(handler_name);
    match lookup_property(&ctx.heap, scope, name_id) {
        LookupResult::NotFound => Err(raise(
            &mut ctx.heap,
            self_id,
            ExcKind::SyntaxMethodNotFound,
            format!("Syntax method binding not found: {handler_name}"),
            vec![],
        )),
        LookupResult::Found { owner, descriptor } => match descriptor {
            PropertyDescriptor::Method(function_id) => Ok((owner, function_id)),
            _ => Err(raise(
                &mut ctx.heap,
                self_id,
                ExcKind::NotCallable,
                format!("Syntax method binding is not a function: {handler_name}"),
                vec![],
            )),
        },
    }
}

fn function_convention(heap: &Heap, function_id: HeapId) -> crate::function::CallConvention {
    match &heap.get(function_id).payload {
        HeapPayload::Function(data) => data.convention(),
        _ => panic!("heap id {function_id:?} does not reference a function"),
    }
}

/// Dispatches `Step` for the current top frame.
pub fn step(ctx: &mut ThreadContext, frame_id: HeapId) -> Transition {
    let kind_snapshot = clone_relevant(frame_kind(&ctx.heap, frame_id));
    match kind_snapshot {
        FrameKindSnapshot::Terminal => unreachable!("Step invoked on TerminalFrame: protocol violation"),
        FrameKindSnapshot::Entry { syntax, scope } => {
            // A function/arrow body, an `@IfStmt`/`@LoopStmt` arm, is a
            // `Block` node, and `Block` carries no `@NodeType` handler name
            // (it is structural, not dispatchable) — so entering one runs
            // the statement-list machinery directly instead of routing
            // through `InvokeSyntaxNode`'s scope-handler lookup.
            let child = if syntax.node_type() == crate::pst::NodeType::Block {
                alloc_frame(
                    &mut ctx.heap,
                    frame_id,
                    FrameKind::BlockSyntax {
                        node: syntax.clone(),
                        scope,
                        statement_no: 0,
                    },
                )
            } else {
                alloc_frame(
                    &mut ctx.heap,
                    frame_id,
                    FrameKind::InvokeSyntaxNode {
                        syntax: syntax.clone(),
                        scope,
                    },
                )
            };
            Transition::Step(child)
        }
        FrameKindSnapshot::InvokeSyntaxNode { syntax, scope } => step_invoke_syntax_node(ctx, frame_id, syntax, scope),
        FrameKindSnapshot::FileSyntax {
            node,
            scope,
            statement_no,
            is_block,
        } => step_list(ctx, frame_id, node, scope, statement_no, is_block),
        FrameKindSnapshot::ReturnStmtSyntax { node, scope } => {
            if node.return_has_expr() {
                let child = alloc_frame(
                    &mut ctx.heap,
                    frame_id,
                    FrameKind::InvokeSyntaxNode {
                        syntax: node.child(0),
                        scope,
                    },
                );
                Transition::Step(child)
            } else {
                resolve_return(ctx, frame_id, scope, EvalResult::Value(ValBox::UNDEFINED))
            }
        }
        FrameKindSnapshot::VarSyntax {
            node,
            scope,
            binding_no,
            is_const,
            last_value,
        } => step_var(ctx, frame_id, node, scope, binding_no, is_const, last_value),
        FrameKindSnapshot::CallExprCallee { node, scope } => {
            let child = alloc_frame(
                &mut ctx.heap,
                frame_id,
                FrameKind::InvokeSyntaxNode {
                    syntax: node.call_expr_callee(),
                    scope,
                },
            );
            Transition::Step(child)
        }
        FrameKindSnapshot::CallExprArg { node, scope, arg_no, .. } => {
            let child = alloc_frame(
                &mut ctx.heap,
                frame_id,
                FrameKind::InvokeSyntaxNode {
                    syntax: node.call_expr_arg(arg_no),
                    scope,
                },
            );
            Transition::Step(child)
        }
        FrameKindSnapshot::CallExprInvoke {
            node,
            scope,
            callee_func_obj,
            operands,
        } => step_call_invoke(ctx, frame_id, node, scope, callee_func_obj, operands),
        FrameKindSnapshot::InvokeApplicative {
            caller_scope,
            callee_func_obj,
            operands,
        } => step_invoke_applicative(ctx, frame_id, caller_scope, callee_func_obj, operands),
        FrameKindSnapshot::InvokeOperative {
            caller_scope,
            callee_func_obj,
            syntax_node,
        } => step_invoke_operative(ctx, frame_id, caller_scope, callee_func_obj, syntax_node),
        FrameKindSnapshot::DotExprTarget { node, scope } => {
            let child = alloc_frame(
                &mut ctx.heap,
                frame_id,
                FrameKind::InvokeSyntaxNode {
                    syntax: node.dot_expr_target(),
                    scope,
                },
            );
            Transition::Step(child)
        }
        FrameKindSnapshot::DotExprInvoke { node, scope, func_obj } => {
            let child = alloc_frame(
                &mut ctx.heap,
                frame_id,
                FrameKind::InvokeOperative {
                    caller_scope: scope,
                    callee_func_obj: func_obj,
                    syntax_node: node.clone(),
                },
            );
            Transition::Step(child)
        }
        FrameKindSnapshot::NativeCallResume { eval_scope, syntax_node, .. } => {
            let child = alloc_frame(
                &mut ctx.heap,
                frame_id,
                FrameKind::Entry {
                    syntax: syntax_node,
                    scope: eval_scope,
                },
            );
            Transition::Step(child)
        }
    }
}

/// Dispatches `Resolve` for `frame_id`, which just finished receiving
/// `incoming` from a child it spawned.
pub fn resolve(ctx: &mut ThreadContext, frame_id: HeapId, incoming: EvalResult) -> Transition {
    let kind_snapshot = clone_relevant(frame_kind(&ctx.heap, frame_id));
    let parent = frame_parent(&ctx.heap, frame_id);
    match kind_snapshot {
        FrameKindSnapshot::Terminal => {
            write_frame_kind(&mut ctx.heap, frame_id, FrameKind::Terminal { result: Some(incoming.clone()) });
            Transition::Done(incoming)
        }
        FrameKindSnapshot::Entry { .. } => Transition::Resolve(parent, incoming),
        FrameKindSnapshot::InvokeSyntaxNode { .. } => Transition::Resolve(parent, incoming),
        FrameKindSnapshot::FileSyntax {
            node,
            scope,
            statement_no,
            is_block,
        } => resolve_list(ctx, frame_id, parent, node, scope, statement_no, is_block, incoming),
        FrameKindSnapshot::ReturnStmtSyntax { scope, .. } => match incoming {
            EvalResult::Error(_) | EvalResult::Exc { .. } => Transition::Resolve(parent, incoming),
            EvalResult::Void => {
                let exc = raise(&mut ctx.heap, frame_id, ExcKind::VoidWhereValueRequired, "return expression produced no value", vec![]);
                Transition::Resolve(parent, exc)
            }
            value @ EvalResult::Value(_) => resolve_return(ctx, frame_id, scope, value),
        },
        FrameKindSnapshot::VarSyntax {
            node,
            scope,
            binding_no,
            is_const,
            ..
        } => resolve_var(ctx, frame_id, parent, node, scope, binding_no, is_const, incoming),
        FrameKindSnapshot::CallExprCallee { node, scope } => {
            resolve_call_callee(ctx, frame_id, parent, node, scope, incoming)
        }
        FrameKindSnapshot::CallExprArg {
            node,
            scope,
            arg_no,
            callee_func_obj,
            mut operands,
        } => match incoming {
            EvalResult::Error(_) | EvalResult::Exc { .. } => Transition::Resolve(parent, incoming),
            EvalResult::Void => {
                let exc = raise(
                    &mut ctx.heap,
                    frame_id,
                    ExcKind::VoidWhereValueRequired,
                    format!("argument {arg_no} produced no value"),
                    vec![],
                );
                Transition::Resolve(parent, exc)
            }
            EvalResult::Value(v) => {
                operands.push(v);
                let next_state = if arg_no + 1 == node.call_expr_arg_count() {
                    CallExprState::Invoke {
                        callee_func_obj,
                        operands,
                    }
                } else {
                    CallExprState::Arg {
                        callee_func_obj,
                        arg_no: arg_no + 1,
                        operands,
                    }
                };
                write_frame_kind(
                    &mut ctx.heap,
                    frame_id,
                    FrameKind::CallExprSyntax { node, scope, state: next_state },
                );
                Transition::Step(frame_id)
            }
        },
        FrameKindSnapshot::CallExprInvoke { .. } => Transition::Resolve(parent, incoming),
        FrameKindSnapshot::InvokeApplicative { .. } => {
            ctx.call_depth = ctx.call_depth.saturating_sub(1);
            Transition::Resolve(parent, incoming)
        }
        FrameKindSnapshot::InvokeOperative { .. } => Transition::Resolve(parent, incoming),
        FrameKindSnapshot::DotExprTarget { node, scope } => resolve_dot_target(ctx, frame_id, parent, node, scope, incoming),
        FrameKindSnapshot::DotExprInvoke { .. } => Transition::Resolve(parent, incoming),
        FrameKindSnapshot::NativeCallResume {
            call_info, resume, state, ..
        } => call_result_transition(parent, resume(ctx, &call_info, state, incoming)),
    }
}

// A plain-data snapshot of `FrameKind` used so `step`/`resolve` can
// `match` without holding a borrow of `ctx.heap` across calls that need
// `&mut ctx.heap`. Cloning `SyntaxNodeRef`/`ValBox`/`HeapId` is O(1).
enum FrameKindSnapshot {
    Terminal,
    Entry {
        syntax: SyntaxNodeRef,
        scope: HeapId,
    },
    InvokeSyntaxNode {
        syntax: SyntaxNodeRef,
        scope: HeapId,
    },
    FileSyntax {
        node: SyntaxNodeRef,
        scope: HeapId,
        statement_no: u32,
        is_block: bool,
    },
    ReturnStmtSyntax {
        node: SyntaxNodeRef,
        scope: HeapId,
    },
    VarSyntax {
        node: SyntaxNodeRef,
        scope: HeapId,
        binding_no: u32,
        is_const: bool,
        last_value: ValBox,
    },
    CallExprCallee {
        node: SyntaxNodeRef,
        scope: HeapId,
    },
    CallExprArg {
        node: SyntaxNodeRef,
        scope: HeapId,
        arg_no: u32,
        callee_func_obj: HeapId,
        operands: Vec<ValBox>,
    },
    CallExprInvoke {
        node: SyntaxNodeRef,
        scope: HeapId,
        callee_func_obj: HeapId,
        operands: Vec<ValBox>,
    },
    InvokeApplicative {
        caller_scope: HeapId,
        callee_func_obj: HeapId,
        operands: Vec<ValBox>,
    },
    InvokeOperative {
        caller_scope: HeapId,
        callee_func_obj: HeapId,
        syntax_node: SyntaxNodeRef,
    },
    DotExprTarget {
        node: SyntaxNodeRef,
        scope: HeapId,
    },
    DotExprInvoke {
        node: SyntaxNodeRef,
        scope: HeapId,
        func_obj: HeapId,
    },
    NativeCallResume {
        call_info: NativeCallInfo,
        eval_scope: HeapId,
        syntax_node: SyntaxNodeRef,
        resume: ResumeFn,
        state: ValBox,
    },
}

fn clone_relevant(kind: &FrameKind) -> FrameKindSnapshot {
    match kind {
        FrameKind::Terminal { .. } => FrameKindSnapshot::Terminal,
        FrameKind::Entry { syntax, scope } => FrameKindSnapshot::Entry {
            syntax: syntax.clone(),
            scope: *scope,
        },
        FrameKind::InvokeSyntaxNode { syntax, scope } => FrameKindSnapshot::InvokeSyntaxNode {
            syntax: syntax.clone(),
            scope: *scope,
        },
        FrameKind::FileSyntax { node, scope, statement_no } => FrameKindSnapshot::FileSyntax {
            node: node.clone(),
            scope: *scope,
            statement_no: *statement_no,
            is_block: false,
        },
        FrameKind::BlockSyntax { node, scope, statement_no } => FrameKindSnapshot::FileSyntax {
            node: node.clone(),
            scope: *scope,
            statement_no: *statement_no,
            is_block: true,
        },
        FrameKind::ReturnStmtSyntax { node, scope } => FrameKindSnapshot::ReturnStmtSyntax {
            node: node.clone(),
            scope: *scope,
        },
        FrameKind::VarSyntax {
            node,
            scope,
            binding_no,
            is_const,
            last_value,
        } => FrameKindSnapshot::VarSyntax {
            node: node.clone(),
            scope: *scope,
            binding_no: *binding_no,
            is_const: *is_const,
            last_value: *last_value,
        },
        FrameKind::CallExprSyntax { node, scope, state } => match state {
            CallExprState::Callee => FrameKindSnapshot::CallExprCallee {
                node: node.clone(),
                scope: *scope,
            },
            CallExprState::Arg {
                callee_func_obj,
                arg_no,
                operands,
            } => FrameKindSnapshot::CallExprArg {
                node: node.clone(),
                scope: *scope,
                arg_no: *arg_no,
                callee_func_obj: *callee_func_obj,
                operands: operands.clone(),
            },
            CallExprState::Invoke { callee_func_obj, operands } => FrameKindSnapshot::CallExprInvoke {
                node: node.clone(),
                scope: *scope,
                callee_func_obj: *callee_func_obj,
                operands: operands.clone(),
            },
        },
        FrameKind::InvokeApplicative {
            caller_scope,
            callee_func_obj,
            operands,
        } => FrameKindSnapshot::InvokeApplicative {
            caller_scope: *caller_scope,
            callee_func_obj: *callee_func_obj,
            operands: operands.clone(),
        },
        FrameKind::InvokeOperative {
            caller_scope,
            callee_func_obj,
            syntax_node,
        } => FrameKindSnapshot::InvokeOperative {
            caller_scope: *caller_scope,
            callee_func_obj: *callee_func_obj,
            syntax_node: syntax_node.clone(),
        },
        FrameKind::DotExprSyntax { node, scope, state } => match state {
            DotExprState::Target => FrameKindSnapshot::DotExprTarget {
                node: node.clone(),
                scope: *scope,
            },
            DotExprState::Invoke { func_obj } => FrameKindSnapshot::DotExprInvoke {
                node: node.clone(),
                scope: *scope,
                func_obj: *func_obj,
            },
        },
        FrameKind::NativeCallResume {
            call_info,
            eval_scope,
            syntax_node,
            resume,
            state,
        } => FrameKindSnapshot::NativeCallResume {
            call_info: call_info.clone(),
            eval_scope: *eval_scope,
            syntax_node: syntax_node.clone(),
            resume: *resume,
            state: *state,
        },
    }
}

fn step_invoke_syntax_node(ctx: &mut ThreadContext, frame_id: HeapId, syntax: SyntaxNodeRef, scope: HeapId) -> Transition {
    let parent = frame_parent(&ctx.heap, frame_id);
    let Some(handler_name) = syntax.node_type().handler_name() else {
        return Transition::Resolve(
            parent,
            EvalResult::Error(format!("{:?} is not a dispatchable node type", syntax.node_type())),
        );
    };
    let (_owner, function_id) = match lookup_handler(ctx, frame_id, scope, handler_name) {
        Ok(pair) => pair,
        Err(exc) => return Transition::Resolve(parent, exc),
    };
    if function_convention(&ctx.heap, function_id) != crate::function::CallConvention::Operative {
        let exc = raise(
            &mut ctx.heap,
            frame_id,
            ExcKind::NotCallable,
            format!("Syntax method binding is not operative: {handler_name}"),
            vec![],
        );
        return Transition::Resolve(parent, exc);
    }
    let entry = match &ctx.heap.get(function_id).payload {
        HeapPayload::Function(crate::function::FunctionData::Native { entry, .. }) => *entry,
        _ => {
            let exc = raise(
                &mut ctx.heap,
                frame_id,
                ExcKind::NotCallable,
                format!("Syntax method binding is not operative: {handler_name}"),
                vec![],
            );
            return Transition::Resolve(parent, exc);
        }
    };
    let info = NativeCallInfo {
        scope,
        operands: NativeOperands::Operative(smallvec![syntax]),
        self_frame: frame_id,
    };
    call_result_transition(frame_id, entry(ctx, info))
}

fn step_list(ctx: &mut ThreadContext, frame_id: HeapId, node: SyntaxNodeRef, scope: HeapId, statement_no: u32, is_block: bool) -> Transition {
    let parent = frame_parent(&ctx.heap, frame_id);
    if statement_no == node.child_count() {
        return Transition::Resolve(parent, EvalResult::Value(ValBox::UNDEFINED));
    }
    let child = alloc_frame(
        &mut ctx.heap,
        frame_id,
        FrameKind::InvokeSyntaxNode {
            syntax: node.child(statement_no),
            scope,
        },
    );
    let _ = is_block;
    Transition::Step(child)
}

#[allow(clippy::too_many_arguments)]
fn resolve_list(
    ctx: &mut ThreadContext,
    frame_id: HeapId,
    parent: HeapId,
    node: SyntaxNodeRef,
    scope: HeapId,
    statement_no: u32,
    is_block: bool,
    incoming: EvalResult,
) -> Transition {
    match incoming {
        EvalResult::Error(_) | EvalResult::Exc { .. } => Transition::Resolve(parent, incoming),
        result => {
            let is_last = statement_no + 1 == node.child_count();
            if is_last {
                // A file is a statement list the same as a block; the
                // last statement's value is the list's own value.
                return Transition::Resolve(parent, result);
            }
            let successor_kind = if is_block {
                FrameKind::BlockSyntax {
                    node,
                    scope,
                    statement_no: statement_no + 1,
                }
            } else {
                FrameKind::FileSyntax {
                    node,
                    scope,
                    statement_no: statement_no + 1,
                }
            };
            let _ = frame_id;
            let successor = alloc_frame(&mut ctx.heap, parent, successor_kind);
            Transition::Step(successor)
        }
    }
}

fn resolve_return(ctx: &mut ThreadContext, frame_id: HeapId, scope: HeapId, value: EvalResult) -> Transition {
    let EvalResult::Value(v) = value else {
        unreachable!("resolve_return is only called with a Value")
    };
    let retcont_name = ctx.intern("@retcont");
    match lookup_property(&ctx.heap, scope, retcont_name) {
        LookupResult::NotFound => {
            let exc = raise(&mut ctx.heap, frame_id, ExcKind::RetcontNotFound, "@retcont not found", vec![]);
            let parent = frame_parent(&ctx.heap, frame_id);
            Transition::Resolve(parent, exc)
        }
        LookupResult::Found { descriptor, .. } => {
            let PropertyDescriptor::Value { value: bound, .. } = descriptor else {
                let exc = raise(&mut ctx.heap, frame_id, ExcKind::RetcontNotAnObject, "@retcont is not an object", vec![]);
                let parent = frame_parent(&ctx.heap, frame_id);
                return Transition::Resolve(parent, exc);
            };
            let Some(cont_id) = bound.as_object_ref() else {
                let exc = raise(&mut ctx.heap, frame_id, ExcKind::RetcontNotAnObject, "@retcont is not an object", vec![]);
                let parent = frame_parent(&ctx.heap, frame_id);
                return Transition::Resolve(parent, exc);
            };
            let target = match &ctx.heap.get(cont_id).payload {
                HeapPayload::Continuation(target) => *target,
                _ => {
                    let exc = raise(
                        &mut ctx.heap,
                        frame_id,
                        ExcKind::RetcontNotAContinuation,
                        "@retcont is not a continuation",
                        vec![],
                    );
                    let parent = frame_parent(&ctx.heap, frame_id);
                    return Transition::Resolve(parent, exc);
                }
            };
            match target {
                ContinuationTarget::Frame(target_frame) => Transition::Resolve(target_frame, EvalResult::Value(v)),
                ContinuationTarget::NonReturnable => {
                    let exc = raise(
                        &mut ctx.heap,
                        frame_id,
                        ExcKind::ReturnOutsideFunction,
                        "return used in non-returnable context.",
                        vec![],
                    );
                    let parent = frame_parent(&ctx.heap, frame_id);
                    Transition::Resolve(parent, exc)
                }
            }
        }
    }
}

fn step_var(
    ctx: &mut ThreadContext,
    frame_id: HeapId,
    node: SyntaxNodeRef,
    scope: HeapId,
    binding_no: u32,
    is_const: bool,
    last_value: ValBox,
) -> Transition {
    let parent = frame_parent(&ctx.heap, frame_id);
    let mut i = binding_no;
    while i < node.binding_count() && !node.binding_has_init(i) {
        let name_id = ctx.intern(node.binding_name(i));
        define_property(
            &mut ctx.heap,
            scope,
            name_id,
            PropertyDescriptor::Value {
                value: ValBox::UNDEFINED,
                writable: !is_const,
                configurable: true,
            },
        );
        i += 1;
    }
    if i == node.binding_count() {
        return Transition::Resolve(parent, EvalResult::Value(last_value));
    }
    write_frame_kind(
        &mut ctx.heap,
        frame_id,
        FrameKind::VarSyntax {
            node: node.clone(),
            scope,
            binding_no: i,
            is_const,
            last_value,
        },
    );
    let child = alloc_frame(
        &mut ctx.heap,
        frame_id,
        FrameKind::InvokeSyntaxNode {
            syntax: node.binding_init(i).expect("loop stopped at a binding with an initializer"),
            scope,
        },
    );
    Transition::Step(child)
}

#[allow(clippy::too_many_arguments)]
fn resolve_var(
    ctx: &mut ThreadContext,
    frame_id: HeapId,
    parent: HeapId,
    node: SyntaxNodeRef,
    scope: HeapId,
    binding_no: u32,
    is_const: bool,
    incoming: EvalResult,
) -> Transition {
    match incoming {
        EvalResult::Error(_) | EvalResult::Exc { .. } => Transition::Resolve(parent, incoming),
        EvalResult::Void => {
            let exc = raise(
                &mut ctx.heap,
                frame_id,
                ExcKind::VoidWhereValueRequired,
                "variable initializer produced no value",
                vec![],
            );
            Transition::Resolve(parent, exc)
        }
        EvalResult::Value(v) => {
            let name_id = ctx.intern(node.binding_name(binding_no));
            define_property(
                &mut ctx.heap,
                scope,
                name_id,
                PropertyDescriptor::Value {
                    value: v,
                    writable: !is_const,
                    configurable: true,
                },
            );
            write_frame_kind(
                &mut ctx.heap,
                frame_id,
                FrameKind::VarSyntax {
                    node,
                    scope,
                    binding_no: binding_no + 1,
                    is_const,
                    last_value: v,
                },
            );
            Transition::Step(frame_id)
        }
    }
}

fn resolve_call_callee(
    ctx: &mut ThreadContext,
    frame_id: HeapId,
    parent: HeapId,
    node: SyntaxNodeRef,
    scope: HeapId,
    incoming: EvalResult,
) -> Transition {
    match incoming {
        EvalResult::Error(_) | EvalResult::Exc { .. } => Transition::Resolve(parent, incoming),
        EvalResult::Void => {
            let exc = raise(&mut ctx.heap, frame_id, ExcKind::VoidWhereValueRequired, "callee produced no value", vec![]);
            Transition::Resolve(parent, exc)
        }
        EvalResult::Value(v) => {
            let Some(func_obj) = v.as_object_ref().filter(|id| ctx.heap.format_of(*id) == crate::heap::HeapFormat::FunctionObject) else {
                let exc = raise(
                    &mut ctx.heap,
                    frame_id,
                    ExcKind::NotCallable,
                    "Callee expression is not callable",
                    vec![v],
                );
                return Transition::Resolve(parent, exc);
            };
            let function_id = match &ctx.heap.get(func_obj).payload {
                HeapPayload::FunctionObject(data) => data.function,
                _ => unreachable!("format check above guarantees FunctionObject"),
            };
            let convention = function_convention(&ctx.heap, function_id);
            let next_state = match convention {
                crate::function::CallConvention::Operative => CallExprState::Invoke {
                    callee_func_obj: func_obj,
                    operands: vec![],
                },
                crate::function::CallConvention::Applicative if node.call_expr_arg_count() == 0 => CallExprState::Invoke {
                    callee_func_obj: func_obj,
                    operands: vec![],
                },
                crate::function::CallConvention::Applicative => CallExprState::Arg {
                    callee_func_obj: func_obj,
                    arg_no: 0,
                    operands: vec![],
                },
            };
            write_frame_kind(&mut ctx.heap, frame_id, FrameKind::CallExprSyntax { node, scope, state: next_state });
            Transition::Step(frame_id)
        }
    }
}

fn step_call_invoke(
    ctx: &mut ThreadContext,
    frame_id: HeapId,
    _node: SyntaxNodeRef,
    scope: HeapId,
    callee_func_obj: HeapId,
    operands: Vec<ValBox>,
) -> Transition {
    let function_id = match &ctx.heap.get(callee_func_obj).payload {
        HeapPayload::FunctionObject(data) => data.function,
        _ => unreachable!("callee_func_obj always references a FunctionObject"),
    };
    let convention = function_convention(&ctx.heap, function_id);
    let child = match convention {
        crate::function::CallConvention::Applicative => alloc_frame(
            &mut ctx.heap,
            frame_id,
            FrameKind::InvokeApplicative {
                caller_scope: scope,
                callee_func_obj,
                operands,
            },
        ),
        crate::function::CallConvention::Operative => {
            debug_assert!(operands.is_empty(), "operative invocation carries no evaluated operands");
            alloc_frame(
                &mut ctx.heap,
                frame_id,
                FrameKind::InvokeOperative {
                    caller_scope: scope,
                    callee_func_obj,
                    syntax_node: _node,
                },
            )
        }
    };
    Transition::Step(child)
}

fn step_invoke_applicative(
    ctx: &mut ThreadContext,
    frame_id: HeapId,
    caller_scope: HeapId,
    callee_func_obj: HeapId,
    operands: Vec<ValBox>,
) -> Transition {
    let function_id = match &ctx.heap.get(callee_func_obj).payload {
        HeapPayload::FunctionObject(data) => data.function,
        _ => unreachable!("callee_func_obj always references a FunctionObject"),
    };
    let parent = frame_parent(&ctx.heap, frame_id);
    ctx.call_depth += 1;
    if let Err(err) = ctx.resource.on_call(ctx.call_depth) {
        ctx.call_depth -= 1;
        return Transition::Resolve(parent, EvalResult::Error(err.to_string()));
    }
    match &ctx.heap.get(function_id).payload {
        HeapPayload::Function(crate::function::FunctionData::Native { entry, .. }) => {
            let entry = *entry;
            let info = NativeCallInfo {
                scope: caller_scope,
                operands: NativeOperands::Applicative(operands),
                self_frame: frame_id,
            };
            call_result_transition(frame_id, entry(ctx, info))
        }
        HeapPayload::Function(crate::function::FunctionData::Scripted {
            param_names,
            body,
            closure_scope,
            ..
        }) => {
            let param_names = param_names.clone();
            let body = body.clone();
            let closure_scope = *closure_scope;
            if param_names.len() != operands.len() {
                let exc = raise_call(
                    &mut ctx.heap,
                    frame_id,
                    ExcKind::WrongArity,
                    format!("wrong number of arguments: expected {}, got {}", param_names.len(), operands.len()),
                    vec![],
                );
                return call_result_transition(parent, exc);
            }
            let call_scope = ctx.heap.allocate(HeapPayload::ScopeObject(ScopeData::new(ScopeKind::Call, vec![closure_scope])));
            for (name, value) in param_names.iter().zip(operands.iter()) {
                define_property(
                    &mut ctx.heap,
                    call_scope,
                    *name,
                    PropertyDescriptor::Value {
                        value: *value,
                        writable: true,
                        configurable: true,
                    },
                );
            }
            let continuation = ctx
                .heap
                .allocate(HeapPayload::Continuation(ContinuationTarget::Frame(frame_id)));
            let retcont_name = ctx.intern("@retcont");
            define_property(
                &mut ctx.heap,
                call_scope,
                retcont_name,
                PropertyDescriptor::Value {
                    value: ValBox::object(continuation),
                    writable: false,
                    configurable: false,
                },
            );
            let entry_frame = alloc_frame(&mut ctx.heap, frame_id, FrameKind::Entry { syntax: body, scope: call_scope });
            Transition::Step(entry_frame)
        }
        _ => unreachable!("function_id always references a Function"),
    }
}

fn step_invoke_operative(
    ctx: &mut ThreadContext,
    frame_id: HeapId,
    caller_scope: HeapId,
    callee_func_obj: HeapId,
    syntax_node: SyntaxNodeRef,
) -> Transition {
    let function_id = match &ctx.heap.get(callee_func_obj).payload {
        HeapPayload::FunctionObject(data) => data.function,
        _ => unreachable!("callee_func_obj always references a FunctionObject"),
    };
    match &ctx.heap.get(function_id).payload {
        HeapPayload::Function(crate::function::FunctionData::Native { entry, .. }) => {
            let entry = *entry;
            let arg_nodes = (0..syntax_node.call_expr_arg_count())
                .map(|i| syntax_node.call_expr_arg(i))
                .collect();
            let info = NativeCallInfo {
                scope: caller_scope,
                operands: NativeOperands::Operative(arg_nodes),
                self_frame: frame_id,
            };
            call_result_transition(frame_id, entry(ctx, info))
        }
        HeapPayload::Function(crate::function::FunctionData::Scripted { .. }) => {
            let parent = frame_parent(&ctx.heap, frame_id);
            Transition::Resolve(
                parent,
                EvalResult::Error("an operative scripted function was invoked, which this language's surface cannot construct".into()),
            )
        }
        _ => unreachable!("function_id always references a Function"),
    }
}

fn resolve_dot_target(
    ctx: &mut ThreadContext,
    frame_id: HeapId,
    parent: HeapId,
    node: SyntaxNodeRef,
    scope: HeapId,
    incoming: EvalResult,
) -> Transition {
    match incoming {
        EvalResult::Error(_) | EvalResult::Exc { .. } => Transition::Resolve(parent, incoming),
        EvalResult::Void => {
            let exc = raise(&mut ctx.heap, frame_id, ExcKind::VoidWhereValueRequired, "dot target produced no value", vec![]);
            Transition::Resolve(parent, exc)
        }
        EvalResult::Value(v) => {
            let Some(target) = v.as_object_ref() else {
                let exc = raise(&mut ctx.heap, frame_id, ExcKind::BadOperandType, "dot target is not an object", vec![v]);
                return Transition::Resolve(parent, exc);
            };
            let dot_name = ctx.intern("@Dot");
            let (owner, function_id) = match lookup_property(&ctx.heap, target, dot_name) {
                LookupResult::NotFound => {
                    let exc = raise(&mut ctx.heap, frame_id, ExcKind::DotHandlerNotFound, "@Dot not found", vec![]);
                    return Transition::Resolve(parent, exc);
                }
                LookupResult::Found { owner, descriptor } => match descriptor {
                    PropertyDescriptor::Method(function_id) => (owner, function_id),
                    _ => {
                        let exc = raise(&mut ctx.heap, frame_id, ExcKind::NotCallable, "@Dot binding is not a function", vec![]);
                        return Transition::Resolve(parent, exc);
                    }
                },
            };
            if function_convention(&ctx.heap, function_id) != crate::function::CallConvention::Operative {
                let exc = raise(&mut ctx.heap, frame_id, ExcKind::NotCallable, "@Dot binding is not operative", vec![]);
                return Transition::Resolve(parent, exc);
            }
            let func_obj = reify_method(&mut ctx.heap, owner, function_id);
            write_frame_kind(
                &mut ctx.heap,
                frame_id,
                FrameKind::DotExprSyntax {
                    node,
                    scope,
                    state: DotExprState::Invoke { func_obj },
                },
            );
            Transition::Step(frame_id)
        }
    }
}

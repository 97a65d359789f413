//! `spec.md` §6's external interface: the handful of entry points a host
//! embedding this interpreter calls, plus the trampoline loop that drives
//! `frame::step`/`frame::resolve` to completion and the periodic
//! collections that keep the heap bounded while doing so.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::exception::{RunError, RunResult};
use crate::frame::{self, EvalResult, Frame, FrameKind, Transition};
use crate::function::{CallConvention, FunctionData};
use crate::heap::{derive_spoiler, Heap, HeapId, HeapPayload};
use crate::intern::{Interner, StringId};
use crate::pst::{PackedSyntaxTree, SyntaxNodeRef};
use crate::resource::{NoLimitTracker, ResourceTracker};
use crate::scope::{define_property, PropertyDescriptor, ScopeData, ScopeKind};
use crate::tracer::{NoopTracer, VmTracer};
use crate::value::ValBox;

/// Hatchery objects survive this many trampoline steps between minor
/// collections; picked to amortize collection cost over a handful of
/// frame allocations rather than collecting on every single step (the
/// spec's "only between steps" rule is about correctness — a safe point —
/// not about frequency).
const GC_MINOR_INTERVAL: u64 = 256;
/// Nursery survivors promote to tenured after this many minor collections.
const GC_MAJOR_INTERVAL_MINORS: u32 = 8;

/// A handle returned by the host, not in any way magic: the runtime holds
/// no global mutable state of its own. It exists so `register_thread`'s
/// signature matches `spec.md` §6 and so a host has something to hold
/// onto before it has a thread context.
pub struct Runtime {
    _private: (),
}

pub fn create_runtime() -> Runtime {
    Runtime { _private: () }
}

thread_local! {
    static REGISTERED_ON_THIS_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Registers the calling OS thread against `rt`, handing back the
/// [`ThreadContext`] that owns this thread's heap, interner, and
/// trampoline state. Calling this twice on the same OS thread is an
/// error — `spec.md` §6 describes `register_thread` as idempotent in the
/// sense that a host need not worry about concurrent double-registration
/// racing on per-thread storage, not that a second call silently returns
/// the first context back (the first context has already been moved out
/// to its caller).
pub fn register_thread(_rt: &Runtime) -> RunResult<ThreadContext> {
    let already_registered = REGISTERED_ON_THIS_THREAD.with(|flag| flag.replace(true));
    if already_registered {
        return Err(RunError::ThreadAlreadyRegistered);
    }
    Ok(ThreadContext {
        heap: Heap::new(derive_spoiler()),
        interner: Interner::new(),
        call_depth: 0,
        resource: Box::new(NoLimitTracker),
        tracer: Box::new(NoopTracer),
        steps_since_minor: 0,
        minors_since_major: 0,
    })
}

/// Everything a single OS thread's interpretation needs: its own heap
/// (generations are never shared between threads), its own string table,
/// and the pluggable observability/resource hooks a host can swap in
/// before calling [`interpret_source_file`]/[`interpret_syntax`].
pub struct ThreadContext {
    pub heap: Heap,
    interner: Interner,
    pub(crate) call_depth: usize,
    pub(crate) resource: Box<dyn ResourceTracker>,
    tracer: Box<dyn VmTracer>,
    steps_since_minor: u64,
    minors_since_major: u32,
}

impl ThreadContext {
    pub fn intern(&mut self, name: &str) -> StringId {
        self.interner.intern(name)
    }

    pub fn resolve_name(&self, id: StringId) -> &str {
        self.interner.resolve(id)
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn VmTracer>) {
        self.tracer = tracer;
    }

    pub fn set_resource_tracker(&mut self, tracker: Box<dyn ResourceTracker>) {
        self.resource = tracker;
    }
}

/// A handle to the global scope a thread's program runs against. Holds a
/// persistent GC root rather than a bare [`HeapId`]: between two
/// top-level [`interpret_syntax`] calls with no live frame in between, no
/// frame's `scope` chain reaches the global scope to keep the collector
/// from being the only thing that still knows where it moved to, so the
/// handle itself must be rooted. Call [`GlobalScope::current`] each time
/// you need the live id rather than caching one.
pub struct GlobalScope {
    root_index: usize,
}

impl GlobalScope {
    pub fn current(&self, ctx: &ThreadContext) -> HeapId {
        ctx.heap
            .rooted_value(self.root_index)
            .as_object_ref()
            .expect("GlobalScope's root always holds an object reference")
    }
}

/// Builds a fresh global scope: the `@retcont` sentinel that turns every
/// top-level `return` into `spec.md` §8's E3 diagnostic, plus every
/// `@NodeType` native syntactic handler bound as a `Method` property.
pub fn make_global_scope(ctx: &mut ThreadContext) -> GlobalScope {
    let scope_id = ctx.heap.allocate(HeapPayload::ScopeObject(ScopeData::new(ScopeKind::Global, vec![])));
    let root_index = ctx.heap.root_value(ValBox::object(scope_id));

    let retcont_sentinel = ctx
        .heap
        .allocate(HeapPayload::Continuation(crate::frame::ContinuationTarget::NonReturnable));
    let retcont_name = ctx.intern("@retcont");
    define_property(
        &mut ctx.heap,
        scope_id,
        retcont_name,
        PropertyDescriptor::Value {
            value: ValBox::object(retcont_sentinel),
            writable: false,
            configurable: false,
        },
    );

    for (name, entry) in crate::handlers::NATIVE_HANDLERS {
        let function_id = ctx.heap.allocate(HeapPayload::Function(FunctionData::Native {
            convention: CallConvention::Operative,
            name,
            entry: *entry,
        }));
        let name_id = ctx.intern(name);
        define_property(&mut ctx.heap, scope_id, name_id, PropertyDescriptor::Method(function_id));
    }

    GlobalScope { root_index }
}

/// `spec.md` §6's sugar over [`interpret_syntax`] for a whole parsed file:
/// `root` is the file's `@File` node, as produced by
/// `whisper_syntax::build_packed_syntax_tree`.
pub fn interpret_source_file(ctx: &mut ThreadContext, root: SyntaxNodeRef, scope: HeapId) -> EvalResult {
    run_trampoline(ctx, root, scope)
}

/// `spec.md` §6's general entry point: interpret the node at `offset`
/// inside `pst` against `scope`.
pub fn interpret_syntax(ctx: &mut ThreadContext, scope: HeapId, pst: &Rc<PackedSyntaxTree>, offset: u32) -> EvalResult {
    run_trampoline(ctx, SyntaxNodeRef::at(pst, offset), scope)
}

fn run_trampoline(ctx: &mut ThreadContext, syntax: SyntaxNodeRef, scope: HeapId) -> EvalResult {
    let terminal = ctx.heap.allocate(HeapPayload::Frame(Frame {
        parent: HeapId::from_word(0),
        kind: FrameKind::Terminal { result: None },
    }));
    ctx.heap.write(terminal, |payload| {
        if let HeapPayload::Frame(frame) = payload {
            frame.parent = terminal;
        }
    });
    let entry = ctx.heap.allocate(HeapPayload::Frame(Frame {
        parent: terminal,
        kind: FrameKind::Entry { syntax, scope },
    }));

    ctx.call_depth = 0;
    let mut top_frame = entry;
    let mut pending = PendingAction::Step(entry);

    loop {
        if let Err(err) = ctx.resource.on_step() {
            return EvalResult::Error(err.to_string());
        }
        let transition = match pending {
            PendingAction::Step(id) => {
                ctx.tracer.on_step(id);
                frame::step(ctx, id)
            }
            PendingAction::Resolve(id, result) => {
                ctx.tracer.on_resolve(id, &result);
                frame::resolve(ctx, id, result)
            }
        };
        match transition {
            Transition::Step(id) => {
                top_frame = id;
                pending = PendingAction::Step(id);
            }
            Transition::Resolve(id, result) => {
                if let EvalResult::Exc { raising_frame, exception } = &result {
                    if let HeapPayload::Exception(data) = &ctx.heap.get(*exception).payload {
                        ctx.tracer.on_exception(*raising_frame, data);
                    }
                }
                top_frame = id;
                pending = PendingAction::Resolve(id, result);
            }
            Transition::Done(result) => return result,
        }
        collect_with_pending_rooted(ctx, &mut top_frame, &mut pending);
    }
}

/// A `Resolve`d result sitting in `pending` between trampoline iterations
/// is reachable only from this local variable, not from any traced frame
/// field, so a collection firing right here would free or relocate
/// whatever it references out from under the next `frame::resolve` call.
/// Rooted the same way [`FrameKind::Terminal`]'s own `result` field is
/// already kept live and up to date across a collection.
fn collect_with_pending_rooted(ctx: &mut ThreadContext, top_frame: &mut HeapId, pending: &mut PendingAction) {
    let mut rooted: Vec<(HeapId, usize)> = Vec::new();
    if let PendingAction::Resolve(_, result) = pending {
        let mut referenced = Vec::new();
        frame::trace_eval_result(result, &mut referenced);
        for id in referenced {
            rooted.push((id, ctx.heap.root_value(ValBox::object(id))));
        }
    }

    maybe_collect(ctx, top_frame);

    if !rooted.is_empty() {
        let mut forwarding = HashMap::new();
        for (old_id, index) in rooted {
            if let Some(new_id) = ctx.heap.rooted_value(index).as_object_ref() {
                if new_id != old_id {
                    forwarding.insert(old_id, new_id);
                }
            }
            ctx.heap.unroot_value(index);
        }
        if let PendingAction::Resolve(_, result) = pending {
            frame::update_eval_result(result, &forwarding);
        }
    }

    match pending {
        PendingAction::Step(id) | PendingAction::Resolve(id, _) => *id = *top_frame,
    }
}

enum PendingAction {
    Step(HeapId),
    Resolve(HeapId, EvalResult),
}

/// Runs a minor (and, periodically, a major) collection between frame
/// steps, exactly the safe point `spec.md` §4.2 requires, rewriting
/// `top_frame` in place if the collector moved it.
fn maybe_collect(ctx: &mut ThreadContext, top_frame: &mut HeapId) {
    ctx.steps_since_minor += 1;
    if ctx.steps_since_minor < GC_MINOR_INTERVAL {
        return;
    }
    ctx.steps_since_minor = 0;
    ctx.heap.collect_minor(top_frame);
    ctx.tracer.on_collect(true, ctx.heap.stats());
    ctx.minors_since_major += 1;
    if ctx.minors_since_major >= GC_MAJOR_INTERVAL_MINORS {
        ctx.minors_since_major = 0;
        ctx.heap.collect_major(top_frame);
        ctx.tracer.on_collect(false, ctx.heap.stats());
    }
}

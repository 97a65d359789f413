//! The interpreter core: tagged values, the generational heap, the
//! frame-machine trampoline, and the native `@NodeType` handlers that give
//! syntax its meaning. `whisper-syntax` builds [`pst::PackedSyntaxTree`]s
//! for this crate to run; `whisper-cli` wires the two together behind a
//! command-line front end.

mod exception;
mod frame;
mod function;
mod handlers;
mod heap;
mod intern;
mod pst;
mod resource;
mod runtime;
mod scope;
mod tracer;
mod value;

pub use exception::{ExcKind, ExceptionData, RunError, RunResult};
pub use frame::EvalResult;
pub use heap::{Heap, HeapFormat, HeapId, HeapPayload, HeapStats};
pub use intern::StringId;
pub use pst::{Builder, Constant, NodeBuilder, NodeType, PackedSyntaxTree, SyntaxNodeRef};
pub use resource::{NoLimitTracker, ResourceError, ResourceTracker, StepLimitTracker};
pub use runtime::{create_runtime, interpret_source_file, interpret_syntax, make_global_scope, register_thread, GlobalScope, Runtime, ThreadContext};
pub use scope::{lookup_property, LookupResult, PropertyDescriptor, ScopeKind};
pub use tracer::{NoopTracer, StderrTracer, VmTracer};
pub use value::{PayloadOutOfRange, ValBox, ValKind};

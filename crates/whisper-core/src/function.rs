//! Functions: the native handler table and user-defined scripted closures.
//!
//! A `Function` is a bare descriptor — parameters plus a body, or a native
//! entry point — and carries the operative/applicative distinction from
//! `spec.md` §4.4: an operative function receives its operand list
//! unevaluated along with the caller's dynamic scope; an applicative
//! function receives already-evaluated arguments. `@NodeType` syntactic
//! handlers are operative native functions; everything a script can define
//! with an arrow expression is an applicative scripted function.
//!
//! A `FunctionObject` is the value a script actually holds: a `Function`
//! together with a `self` binding, the same split the teacher's own
//! `FunctionObject`/bound-method pattern makes between an unbound
//! descriptor and a callable value.

use crate::frame::NativeFn;
use crate::heap::{forward_id, HeapId};
use crate::intern::StringId;
use crate::pst::SyntaxNodeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConvention {
    Operative,
    Applicative,
}

#[derive(Debug, Clone)]
pub enum FunctionData {
    Native {
        convention: CallConvention,
        name: &'static str,
        entry: NativeFn,
    },
    Scripted {
        convention: CallConvention,
        param_names: Vec<StringId>,
        body: SyntaxNodeRef,
        closure_scope: HeapId,
    },
}

impl FunctionData {
    pub fn convention(&self) -> CallConvention {
        match self {
            FunctionData::Native { convention, .. } | FunctionData::Scripted { convention, .. } => *convention,
        }
    }

    pub(crate) fn trace(&self, out: &mut Vec<HeapId>) {
        if let FunctionData::Scripted { closure_scope, .. } = self {
            out.push(*closure_scope);
        }
    }

    pub(crate) fn update(&mut self, forwarding: &std::collections::HashMap<HeapId, HeapId>) {
        if let FunctionData::Scripted { closure_scope, .. } = self {
            forward_id(closure_scope, forwarding);
        }
    }
}

/// The value a script holds and calls: a function descriptor plus the
/// `self` it is bound to (set when a `Method` property descriptor is
/// fetched off a scope — see `scope.rs`).
#[derive(Debug)]
pub struct FunctionObjectData {
    pub function: HeapId,
    pub bound_self: Option<HeapId>,
}

impl FunctionObjectData {
    pub(crate) fn trace(&self, out: &mut Vec<HeapId>) {
        out.push(self.function);
        if let Some(id) = self.bound_self {
            out.push(id);
        }
    }

    pub(crate) fn update(&mut self, forwarding: &std::collections::HashMap<HeapId, HeapId>) {
        forward_id(&mut self.function, forwarding);
        if let Some(id) = &mut self.bound_self {
            forward_id(id, forwarding);
        }
    }
}

//! The object/scope model: delegate-chain property lookup over a
//! dictionary, the substrate every `CallScope`, `ModuleScope`, and
//! `GlobalScope` is built from.
//!
//! Lookup is grounded on the teacher's own multi-map delegation pattern
//! (`types/chain_map.rs`'s `ChainMap`: the first mapping in the chain that
//! defines a key wins). A `ScopeObject` generalizes that to a *tree* of
//! delegates rather than a flat chain, because user code can construct
//! scopes with more than one parent (`spec.md` §4.4's delegate list), but
//! the lookup rule — first hit wins, depth-first, left-to-right — is the
//! same rule.

use indexmap::IndexMap;

use crate::heap::{forward_id, forward_value, HeapId};
use crate::intern::StringId;
use crate::value::ValBox;

/// How a property was bound: a plain value, a method (called with the
/// receiving scope as `self`), or an accessor pair.
#[derive(Debug, Clone)]
pub enum PropertyDescriptor {
    Value {
        value: ValBox,
        writable: bool,
        configurable: bool,
    },
    Method(HeapId),
    Accessor {
        getter: Option<HeapId>,
        setter: Option<HeapId>,
    },
}

impl PropertyDescriptor {
    fn trace(&self, out: &mut Vec<HeapId>) {
        match self {
            PropertyDescriptor::Value { value, .. } => {
                if let Some(id) = value.as_object_ref() {
                    out.push(id);
                }
                if let Some(id) = value.as_heap_string_ref() {
                    out.push(id);
                }
            }
            PropertyDescriptor::Method(id) => out.push(*id),
            PropertyDescriptor::Accessor { getter, setter } => {
                out.extend(getter.iter().chain(setter.iter()));
            }
        }
    }

    fn update(&mut self, forwarding: &std::collections::HashMap<HeapId, HeapId>) {
        match self {
            PropertyDescriptor::Value { value, .. } => forward_value(value, forwarding),
            PropertyDescriptor::Method(id) => forward_id(id, forwarding),
            PropertyDescriptor::Accessor { getter, setter } => {
                if let Some(id) = getter {
                    forward_id(id, forwarding);
                }
                if let Some(id) = setter {
                    forward_id(id, forwarding);
                }
            }
        }
    }
}

/// Which role a `ScopeObject` was created to play. Purely informational —
/// lookup and definition behave identically regardless — but handlers and
/// diagnostics use it to explain what a scope is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Call,
    Module,
    Global,
}

/// A property dictionary plus an ordered list of delegate scopes searched
/// on a local miss.
#[derive(Debug)]
pub struct ScopeData {
    pub kind: ScopeKind,
    pub delegates: Vec<HeapId>,
    pub properties: IndexMap<StringId, PropertyDescriptor>,
}

impl ScopeData {
    pub fn new(kind: ScopeKind, delegates: Vec<HeapId>) -> ScopeData {
        ScopeData {
            kind,
            delegates,
            properties: IndexMap::new(),
        }
    }

    pub(crate) fn trace(&self, out: &mut Vec<HeapId>) {
        out.extend_from_slice(&self.delegates);
        for descriptor in self.properties.values() {
            descriptor.trace(out);
        }
    }

    pub(crate) fn update(&mut self, forwarding: &std::collections::HashMap<HeapId, HeapId>) {
        for delegate in &mut self.delegates {
            forward_id(delegate, forwarding);
        }
        for descriptor in self.properties.values_mut() {
            descriptor.update(forwarding);
        }
    }
}

/// Outcome of a property lookup: either the defining scope and descriptor,
/// or a clean miss (never found on any delegate).
#[derive(Debug)]
pub enum LookupResult {
    Found { owner: HeapId, descriptor: PropertyDescriptor },
    NotFound,
}

/// Free-function API over `(heap, id)` rather than a `Wobject` trait
/// object: the heap owns every object's storage, so lookup walks the
/// `Heap` directly instead of through dynamic dispatch, matching the
/// teacher's own `Heap::with_entry` access pattern.
pub fn lookup_property(heap: &crate::heap::Heap, scope: HeapId, name: StringId) -> LookupResult {
    lookup_property_visiting(heap, scope, name, &mut Vec::new())
}

fn lookup_property_visiting(
    heap: &crate::heap::Heap,
    scope: HeapId,
    name: StringId,
    visited: &mut Vec<HeapId>,
) -> LookupResult {
    if visited.contains(&scope) {
        // A delegate cycle; treat as a clean miss rather than looping
        // forever. Scope graphs are not expected to be cyclic, but
        // nothing in the object model forbids a user from building one.
        return LookupResult::NotFound;
    }
    visited.push(scope);

    let scope_data = match &heap.get(scope).payload {
        crate::heap::HeapPayload::ScopeObject(data) => data,
        _ => return LookupResult::NotFound,
    };

    if let Some(descriptor) = scope_data.properties.get(&name) {
        return LookupResult::Found {
            owner: scope,
            descriptor: descriptor.clone(),
        };
    }

    for delegate in scope_data.delegates.clone() {
        if let LookupResult::Found { owner, descriptor } = lookup_property_visiting(heap, delegate, name, visited) {
            return LookupResult::Found { owner, descriptor };
        }
    }

    LookupResult::NotFound
}

/// Defines (or overwrites) a property directly on `scope`, never walking
/// delegates. Routed through `Heap::write` so the owning card is dirtied.
pub fn define_property(heap: &mut crate::heap::Heap, scope: HeapId, name: StringId, descriptor: PropertyDescriptor) {
    heap.write(scope, |payload| {
        if let crate::heap::HeapPayload::ScopeObject(data) = payload {
            data.properties.insert(name, descriptor);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{Heap, HeapPayload};
    use crate::intern::Interner;

    #[test]
    fn lookup_prefers_local_over_delegate() {
        let mut heap = Heap::new(0);
        let mut interner = Interner::new();
        let parent = heap.allocate(HeapPayload::ScopeObject(ScopeData::new(ScopeKind::Module, vec![])));
        let child = heap.allocate(HeapPayload::ScopeObject(ScopeData::new(ScopeKind::Call, vec![parent])));
        let name = interner.intern("x");
        define_property(
            &mut heap,
            parent,
            name,
            PropertyDescriptor::Value {
                value: ValBox::int32(1),
                writable: true,
                configurable: true,
            },
        );
        define_property(
            &mut heap,
            child,
            name,
            PropertyDescriptor::Value {
                value: ValBox::int32(2),
                writable: true,
                configurable: true,
            },
        );
        match lookup_property(&heap, child, name) {
            LookupResult::Found { descriptor, .. } => match descriptor {
                PropertyDescriptor::Value { value, .. } => assert_eq!(value.as_int32(), Some(2)),
                _ => panic!("expected a value descriptor"),
            },
            LookupResult::NotFound => panic!("expected to find x"),
        }
    }

    #[test]
    fn lookup_falls_through_to_delegate_on_miss() {
        let mut heap = Heap::new(0);
        let mut interner = Interner::new();
        let parent = heap.allocate(HeapPayload::ScopeObject(ScopeData::new(ScopeKind::Module, vec![])));
        let child = heap.allocate(HeapPayload::ScopeObject(ScopeData::new(ScopeKind::Call, vec![parent])));
        let name = interner.intern("y");
        define_property(
            &mut heap,
            parent,
            name,
            PropertyDescriptor::Value {
                value: ValBox::int32(9),
                writable: true,
                configurable: true,
            },
        );
        match lookup_property(&heap, child, name) {
            LookupResult::Found { owner, .. } => assert_eq!(owner, parent),
            LookupResult::NotFound => panic!("expected to find y on delegate"),
        }
    }
}

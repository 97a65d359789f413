//! The slab allocator and generational garbage collector.
//!
//! # Pointers as arena indices
//!
//! The spec describes a precise, moving collector addressed through raw
//! pointers. This rewrite keeps the collector precise and moving (objects
//! really do get copied between generations and old storage really is
//! reclaimed) but represents every heap reference as a [`HeapId`] — an
//! index into a generation's slot table — rather than a raw pointer. This
//! is the same translation the teacher codebase makes for its own arena
//! (`Value::Ref(HeapId)`), and it is what lets a moving collector exist at
//! all without `unsafe` pointer rewriting: a collection rebuilds the slot
//! tables and remaps every `HeapId` it finds, exactly as a pointer-based
//! collector would remap pointers, but through an indirection a borrow
//! checker can verify.
//!
//! # Cards without raw bytes
//!
//! Without byte-addressed memory there is no literal 1 KiB "card", so a
//! card here is a fixed run of [`CARD_SLOTS`] consecutive arena slots. The
//! write barrier dirties the card containing a mutated slot exactly as the
//! spec describes; collection in this implementation does not yet use the
//! dirty set to restrict which roots a minor collection traces from (it
//! always traces from the full root set for soundness-by-construction), so
//! the barrier is exercised and tested but not yet a scalability
//! optimization. See `DESIGN.md`.

use std::collections::HashMap;

use ahash::AHashMap;

use crate::exception::ExceptionData;
use crate::frame::{ContinuationTarget, Frame};
use crate::function::{FunctionData, FunctionObjectData};
use crate::scope::ScopeData;
use crate::value::ValBox;

/// One of the three generations a traced object can live in, plus the
/// pseudo-generation used for singleton slabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Generation {
    Hatchery = 0,
    Nursery = 1,
    Tenured = 2,
    Singleton = 3,
}

impl Generation {
    const ALL_TRACED: [Generation; 4] = [
        Generation::Hatchery,
        Generation::Nursery,
        Generation::Tenured,
        Generation::Singleton,
    ];

    fn from_bits(bits: u64) -> Generation {
        match bits & 0b11 {
            0 => Generation::Hatchery,
            1 => Generation::Nursery,
            2 => Generation::Tenured,
            _ => Generation::Singleton,
        }
    }
}

/// Arena index identifying a heap object: which pool, which slab in that
/// pool, and which slot in that slab.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HeapId(u64);

impl std::fmt::Debug for HeapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HeapId(gen={:?}, slab={}, slot={})",
            self.generation(),
            self.slab_index(),
            self.slot_index()
        )
    }
}

impl HeapId {
    const GEN_BITS: u32 = 2;
    const SLAB_BITS: u32 = 24;

    fn new(generation: Generation, slab_index: u32, slot_index: u32) -> HeapId {
        let word = (generation as u64)
            | ((slab_index as u64) << Self::GEN_BITS)
            | ((slot_index as u64) << (Self::GEN_BITS + Self::SLAB_BITS));
        HeapId(word)
    }

    pub fn generation(self) -> Generation {
        Generation::from_bits(self.0)
    }

    fn slab_index(self) -> u32 {
        ((self.0 >> Self::GEN_BITS) & ((1 << Self::SLAB_BITS) - 1)) as u32
    }

    fn slot_index(self) -> u32 {
        (self.0 >> (Self::GEN_BITS + Self::SLAB_BITS)) as u32
    }

    /// Packs this id into the bits [`crate::value::ValBox`] stores above its
    /// tag. Only `value.rs` calls this.
    pub(crate) fn to_word(self) -> u64 {
        self.0
    }

    pub(crate) fn from_word(word: u64) -> HeapId {
        HeapId(word)
    }
}

/// Every heap object format the collector knows how to scan and update.
/// `HeapThing::header.format` always equals the variant that produced its
/// payload (testable property 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapFormat {
    HeapDouble,
    HeapString,
    ScopeObject,
    Function,
    FunctionObject,
    Frame,
    Continuation,
    Exception,
    /// A growable array of `ValBox`, used for evaluated operand/argument
    /// lists (see `DESIGN.md` for why this replaces the source's
    /// single-linked, reverse-at-invocation operand list).
    Array,
}

/// The per-format payload a [`HeapThing`] carries.
#[derive(Debug)]
pub enum HeapPayload {
    HeapDouble(f64),
    HeapString(Vec<u16>),
    ScopeObject(ScopeData),
    Function(FunctionData),
    FunctionObject(FunctionObjectData),
    Frame(Frame),
    Continuation(ContinuationTarget),
    Exception(ExceptionData),
    Array(Vec<ValBox>),
}

impl HeapPayload {
    pub fn format(&self) -> HeapFormat {
        match self {
            HeapPayload::HeapDouble(_) => HeapFormat::HeapDouble,
            HeapPayload::HeapString(_) => HeapFormat::HeapString,
            HeapPayload::ScopeObject(_) => HeapFormat::ScopeObject,
            HeapPayload::Function(_) => HeapFormat::Function,
            HeapPayload::FunctionObject(_) => HeapFormat::FunctionObject,
            HeapPayload::Frame(_) => HeapFormat::Frame,
            HeapPayload::Continuation(_) => HeapFormat::Continuation,
            HeapPayload::Exception(_) => HeapFormat::Exception,
            HeapPayload::Array(_) => HeapFormat::Array,
        }
    }

    /// `true` for formats that can never hold a heap-valued field, letting
    /// the allocator route them to the non-traced end of a slab.
    pub fn is_leaf(&self) -> bool {
        matches!(self, HeapPayload::HeapDouble(_) | HeapPayload::HeapString(_))
    }
}

/// The 8-byte-equivalent header every heap object carries.
#[derive(Debug, Clone, Copy)]
pub struct HeapHeader {
    pub format: HeapFormat,
    pub size_words: u16,
    pub generation: Generation,
    pub marked: bool,
    pub user_data: u8,
}

#[derive(Debug)]
pub struct HeapThing {
    pub header: HeapHeader,
    pub payload: HeapPayload,
}

/// Number of consecutive arena slots that make up one write-barrier card.
pub const CARD_SLOTS: usize = 64;

/// Slots per standard slab; an object whose size would leave fewer than
/// one slot of headroom in a standard slab is instead given its own
/// singleton slab.
pub const STANDARD_SLAB_CAPACITY: usize = 512;

enum Slot {
    Free,
    Occupied(HeapThing),
}

/// A page-aligned-in-spirit region bump-allocated from both ends: traced
/// objects grow down from the head, non-traced (leaf) objects grow up from
/// the tail, and the slab is exhausted once the two pointers meet.
pub struct Slab {
    generation: Generation,
    slots: Vec<Slot>,
    head_next: usize,
    tail_next: usize,
    dirty_cards: Vec<bool>,
}

impl Slab {
    fn new(generation: Generation, capacity: usize) -> Slab {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Free);
        let card_count = capacity.div_ceil(CARD_SLOTS);
        Slab {
            generation,
            slots,
            head_next: 0,
            tail_next: capacity,
            dirty_cards: vec![false; card_count.max(1)],
        }
    }

    fn singleton(generation: Generation) -> Slab {
        Slab::new(generation, 1)
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_full(&self) -> bool {
        self.head_next >= self.tail_next
    }

    /// Bump-allocates a traced object from the head of the slab.
    fn allocate_head(&mut self, thing: HeapThing) -> Option<usize> {
        if self.head_next >= self.tail_next {
            return None;
        }
        let index = self.head_next;
        self.head_next += 1;
        self.slots[index] = Slot::Occupied(thing);
        Some(index)
    }

    /// Bump-allocates a non-traced (leaf) object from the tail of the slab.
    fn allocate_tail(&mut self, thing: HeapThing) -> Option<usize> {
        if self.head_next >= self.tail_next {
            return None;
        }
        self.tail_next -= 1;
        let index = self.tail_next;
        self.slots[index] = Slot::Occupied(thing);
        Some(index)
    }

    fn get(&self, slot: usize) -> Option<&HeapThing> {
        match self.slots.get(slot) {
            Some(Slot::Occupied(thing)) => Some(thing),
            _ => None,
        }
    }

    fn get_mut(&mut self, slot: usize) -> Option<&mut HeapThing> {
        match self.slots.get_mut(slot) {
            Some(Slot::Occupied(thing)) => Some(thing),
            _ => None,
        }
    }

    fn mark_dirty(&mut self, slot: usize) {
        let card = slot / CARD_SLOTS;
        if let Some(flag) = self.dirty_cards.get_mut(card) {
            *flag = true;
        }
    }

    fn occupied_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Occupied(_) => Some(i),
            Slot::Free => None,
        })
    }
}

/// Every live pointer the interpreter holds outside the heap is registered
/// here, so the collector can find and relocate it. A [`Local`] guard is
/// the scoped-handle realization of this registry: it registers on
/// construction and unregisters on drop, mirroring the way the spec's
/// thread-local root chain is threaded through the C stack.
#[derive(Default)]
pub struct RootRegistry {
    slots: Vec<Option<ValBox>>,
    free: Vec<usize>,
}

impl RootRegistry {
    fn register(&mut self, value: ValBox) -> usize {
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(value);
            index
        } else {
            self.slots.push(Some(value));
            self.slots.len() - 1
        }
    }

    fn unregister(&mut self, index: usize) {
        self.slots[index] = None;
        self.free.push(index);
    }

    fn get(&self, index: usize) -> ValBox {
        self.slots[index].expect("root slot read after unregister")
    }

    fn set(&mut self, index: usize, value: ValBox) {
        self.slots[index] = Some(value);
    }

    fn iter(&self) -> impl Iterator<Item = ValBox> + '_ {
        self.slots.iter().filter_map(|s| *s)
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut ValBox> + '_ {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }
}

/// A scoped root handle. Holding one guarantees the GC will not collect
/// (or will correctly relocate and keep visible) the `ValBox` it wraps for
/// as long as the guard is alive.
pub struct Local<'h> {
    heap: &'h mut Heap,
    index: usize,
}

impl<'h> Local<'h> {
    pub fn get(&self) -> ValBox {
        self.heap.roots.get(self.index)
    }

    pub fn set(&mut self, value: ValBox) {
        self.heap.roots.set(self.index, value);
    }
}

impl Drop for Local<'_> {
    fn drop(&mut self) {
        self.heap.roots.unregister(self.index);
    }
}

/// The object heap and garbage collector.
pub struct Heap {
    hatchery: Vec<Option<Slab>>,
    nursery: Vec<Option<Slab>>,
    tenured: Vec<Option<Slab>>,
    singleton: Vec<Option<Slab>>,
    pub roots: RootRegistry,
    /// Per-thread hash spoiler, derived once at heap creation, mixed into
    /// every string hash to resist adversarial collisions.
    pub spoiler: u64,
}

impl Heap {
    pub fn new(spoiler: u64) -> Heap {
        Heap {
            hatchery: Vec::new(),
            nursery: Vec::new(),
            tenured: Vec::new(),
            singleton: Vec::new(),
            roots: RootRegistry::default(),
            spoiler,
        }
    }

    /// Registers `value` as a root and returns a scoped guard. The guard
    /// must be kept alive for as long as the reference must survive a
    /// collection; dropping it unregisters the root.
    pub fn root(&mut self, value: ValBox) -> Local<'_> {
        let index = self.roots.register(value);
        Local { heap: self, index }
    }

    /// Registers `value` as a root with no scope guard attached. Unlike
    /// [`Heap::root`], the caller keeps only the returned index, not a
    /// borrow of the heap — this is how `ThreadContext` keeps the global
    /// scope alive across separate `interpret_syntax` calls, when no live
    /// frame's `scope` chain happens to reach it at the moment.
    pub fn root_value(&mut self, value: ValBox) -> usize {
        self.roots.register(value)
    }

    pub fn rooted_value(&self, index: usize) -> ValBox {
        self.roots.get(index)
    }

    /// Releases an index returned by [`Heap::root_value`]. The matching
    /// counterpart for roots that were never wrapped in a [`Local`] guard.
    pub fn unroot_value(&mut self, index: usize) {
        self.roots.unregister(index);
    }

    fn pool(&self, generation: Generation) -> &Vec<Option<Slab>> {
        match generation {
            Generation::Hatchery => &self.hatchery,
            Generation::Nursery => &self.nursery,
            Generation::Tenured => &self.tenured,
            Generation::Singleton => &self.singleton,
        }
    }

    fn pool_mut(&mut self, generation: Generation) -> &mut Vec<Option<Slab>> {
        match generation {
            Generation::Hatchery => &mut self.hatchery,
            Generation::Nursery => &mut self.nursery,
            Generation::Tenured => &mut self.tenured,
            Generation::Singleton => &mut self.singleton,
        }
    }

    /// Allocates `payload` into the hatchery generation, the age every new
    /// object is born into.
    pub fn allocate(&mut self, payload: HeapPayload) -> HeapId {
        self.allocate_in(Generation::Hatchery, payload)
    }

    fn allocate_in(&mut self, generation: Generation, payload: HeapPayload) -> HeapId {
        let is_leaf = payload.is_leaf();
        let format = payload.format();
        let thing = HeapThing {
            header: HeapHeader {
                format,
                size_words: 1,
                generation,
                marked: false,
                user_data: 0,
            },
            payload,
        };

        if generation == Generation::Singleton {
            let slab_index = self.singleton.len() as u32;
            let mut slab = Slab::singleton(generation);
            let slot = slab
                .allocate_head(thing)
                .expect("freshly created singleton slab always has room for one object");
            self.singleton.push(Some(slab));
            return HeapId::new(generation, slab_index, slot as u32);
        }

        let mut thing = Some(thing);
        let pool = self.pool_mut(generation);
        for (slab_index, slot) in pool.iter_mut().enumerate() {
            if let Some(slab) = slot {
                if !slab.is_full() {
                    let slot_index = if is_leaf {
                        slab.allocate_tail(thing.take().expect("thing not yet consumed"))
                    } else {
                        slab.allocate_head(thing.take().expect("thing not yet consumed"))
                    };
                    let slot_index = slot_index.unwrap_or_else(|| {
                        unreachable!(
                            "is_full() was just checked with no intervening mutation on this \
                             single-threaded &mut self path, so allocate_head/allocate_tail \
                             cannot report full here"
                        )
                    });
                    return HeapId::new(generation, slab_index as u32, slot_index as u32);
                }
            }
        }

        let mut slab = Slab::new(generation, STANDARD_SLAB_CAPACITY);
        let slot_index = if is_leaf {
            slab.allocate_tail(thing.take().expect("thing not yet consumed"))
        } else {
            slab.allocate_head(thing.take().expect("thing not yet consumed"))
        }
        .expect("freshly created slab always has room for one object");
        let slab_index = self.push_into_pool(generation, slab);
        HeapId::new(generation, slab_index as u32, slot_index as u32)
    }

    fn push_into_pool(&mut self, generation: Generation, slab: Slab) -> usize {
        let pool = self.pool_mut(generation);
        if let Some(hole) = pool.iter().position(Option::is_none) {
            pool[hole] = Some(slab);
            hole
        } else {
            pool.push(Some(slab));
            pool.len() - 1
        }
    }

    pub fn get(&self, id: HeapId) -> &HeapThing {
        self.pool(id.generation())[id.slab_index() as usize]
            .as_ref()
            .expect("heap id referenced a freed slab")
            .get(id.slot_index() as usize)
            .expect("heap id referenced a freed slot")
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapThing {
        self.pool_mut(id.generation())[id.slab_index() as usize]
            .as_mut()
            .expect("heap id referenced a freed slab")
            .get_mut(id.slot_index() as usize)
            .expect("heap id referenced a freed slot")
    }

    pub fn format_of(&self, id: HeapId) -> HeapFormat {
        self.get(id).header.format
    }

    /// Mutates a heap object's payload and marks the card containing it
    /// dirty, the write barrier every in-place mutation of an
    /// already-allocated object must go through.
    pub fn write<R>(&mut self, id: HeapId, f: impl FnOnce(&mut HeapPayload) -> R) -> R {
        let slot_index = id.slot_index() as usize;
        let generation = id.generation();
        let slab_index = id.slab_index() as usize;
        let result = {
            let thing = self.pool_mut(generation)[slab_index]
                .as_mut()
                .expect("heap id referenced a freed slab")
                .get_mut(slot_index)
                .expect("heap id referenced a freed slot");
            f(&mut thing.payload)
        };
        self.pool_mut(generation)[slab_index]
            .as_mut()
            .expect("slab present by construction")
            .mark_dirty(slot_index);
        result
    }

    fn clear_marks(&mut self) {
        for generation in Generation::ALL_TRACED {
            for slab in self.pool_mut(generation).iter_mut().flatten() {
                for index in 0..slab.capacity() {
                    if let Some(thing) = slab.get_mut(index) {
                        thing.header.marked = false;
                    }
                }
            }
        }
    }

    /// Marks every object reachable from `roots` (the registered
    /// [`Local`] handles) plus `extra_roots` (generation-agnostic, e.g.
    /// the current top frame).
    fn mark_all_reachable(&mut self, extra_roots: &[HeapId]) {
        self.clear_marks();
        let mut worklist: Vec<HeapId> = self.roots.iter().filter_map(|v| v.as_object_ref()).collect();
        worklist.extend_from_slice(extra_roots);
        while let Some(id) = worklist.pop() {
            if !self.is_live(id) {
                continue;
            }
            let thing = self.get_mut(id);
            if thing.header.marked {
                continue;
            }
            thing.header.marked = true;
            trace_edges(&thing.payload, &mut worklist);
        }
    }

    fn is_live(&self, id: HeapId) -> bool {
        self.pool(id.generation())
            .get(id.slab_index() as usize)
            .and_then(|s| s.as_ref())
            .is_some_and(|slab| slab.get(id.slot_index() as usize).is_some())
    }

    fn update_all_edges(&mut self, forwarding: &HashMap<HeapId, HeapId>) {
        for generation in Generation::ALL_TRACED {
            let slab_count = self.pool(generation).len();
            for slab_index in 0..slab_count {
                let indices: Vec<usize> = match self.pool(generation)[slab_index].as_ref() {
                    Some(slab) => slab.occupied_indices().collect(),
                    None => continue,
                };
                for slot_index in indices {
                    if let Some(slab) = self.pool_mut(generation)[slab_index].as_mut() {
                        if let Some(thing) = slab.get_mut(slot_index) {
                            update_edges(&mut thing.payload, forwarding);
                        }
                    }
                }
            }
        }
        for value in self.roots.iter_mut() {
            if let Some(old_id) = value.as_object_ref() {
                if let Some(new_id) = forwarding.get(&old_id) {
                    *value = ValBox::object(*new_id);
                }
            }
        }
    }

    /// Runs a minor collection: hatchery survivors copy into the nursery,
    /// the hatchery is emptied, and `top_frame` (an extra root the caller
    /// supplies, plus the thread's own `Local` roots) is remapped in
    /// place if it moved.
    pub fn collect_minor(&mut self, top_frame: &mut HeapId) {
        self.mark_all_reachable(&[*top_frame]);
        let forwarding = self.compact_generation(Generation::Hatchery, Generation::Nursery);
        self.update_all_edges(&forwarding);
        if let Some(new_id) = forwarding.get(top_frame) {
            *top_frame = *new_id;
        }
        self.sweep_singletons();
    }

    /// Runs a major collection: nursery survivors promote to tenured.
    pub fn collect_major(&mut self, top_frame: &mut HeapId) {
        self.mark_all_reachable(&[*top_frame]);
        let forwarding = self.compact_generation(Generation::Nursery, Generation::Tenured);
        self.update_all_edges(&forwarding);
        if let Some(new_id) = forwarding.get(top_frame) {
            *top_frame = *new_id;
        }
        self.sweep_singletons();
    }

    /// Copies every marked object out of `from` into freshly allocated
    /// slabs in `to`, discards `from`'s old slabs entirely, and returns
    /// the old-id-to-new-id forwarding map used to fix up every surviving
    /// reference.
    fn compact_generation(&mut self, from: Generation, to: Generation) -> HashMap<HeapId, HeapId> {
        let mut forwarding = HashMap::new();
        let old_pool = std::mem::take(self.pool_mut(from));
        for (slab_index, slab_opt) in old_pool.into_iter().enumerate() {
            let Some(mut slab) = slab_opt else { continue };
            let indices: Vec<usize> = slab.occupied_indices().collect();
            for slot_index in indices {
                let marked = slab.get(slot_index).is_some_and(|t| t.header.marked);
                if !marked {
                    continue;
                }
                let Slot::Occupied(mut thing) = std::mem::replace(&mut slab.slots[slot_index], Slot::Free) else {
                    continue;
                };
                thing.header.generation = to;
                let old_id = HeapId::new(from, slab_index as u32, slot_index as u32);
                let payload = std::mem::replace(&mut thing.payload, HeapPayload::HeapDouble(0.0));
                let new_id = self.allocate_in(to, payload);
                forwarding.insert(old_id, new_id);
            }
        }
        forwarding
    }

    fn sweep_singletons(&mut self) {
        for slot in &mut self.singleton {
            if let Some(slab) = slot {
                let alive = slab.get(0).is_some_and(|t| t.header.marked);
                if !alive {
                    *slot = None;
                }
            }
        }
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats::default();
        for generation in Generation::ALL_TRACED {
            for slab in self.pool(generation).iter().flatten() {
                stats.live_objects += slab.occupied_indices().count();
                stats.total_slots += slab.capacity();
            }
        }
        stats
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub live_objects: usize,
    pub total_slots: usize,
}

/// Collects every `HeapId` directly reachable from `payload` into
/// `out` — the "Scan" half of the format-specific trace/update pair,
/// implemented as one function per format inside a closed match rather
/// than via reflection, per `spec.md` §3's "every heap field is declared
/// through a traceable wrapper" requirement.
fn trace_edges(payload: &HeapPayload, out: &mut Vec<HeapId>) {
    match payload {
        HeapPayload::HeapDouble(_) | HeapPayload::HeapString(_) => {}
        HeapPayload::ScopeObject(scope) => scope.trace(out),
        HeapPayload::Function(func) => func.trace(out),
        HeapPayload::FunctionObject(func_obj) => func_obj.trace(out),
        HeapPayload::Frame(frame) => frame.trace(out),
        HeapPayload::Continuation(ContinuationTarget::Frame(frame_id)) => out.push(*frame_id),
        HeapPayload::Continuation(ContinuationTarget::NonReturnable) => {}
        HeapPayload::Exception(exc) => exc.trace(out),
        HeapPayload::Array(items) => {
            for item in items {
                if let Some(id) = item.as_object_ref() {
                    out.push(id);
                }
            }
        }
    }
}

/// The "Update" half of the trace/update pair: rewrites every heap-valued
/// field using the forwarding map produced by a collection.
fn update_edges(payload: &mut HeapPayload, forwarding: &HashMap<HeapId, HeapId>) {
    match payload {
        HeapPayload::HeapDouble(_) | HeapPayload::HeapString(_) => {}
        HeapPayload::ScopeObject(scope) => scope.update(forwarding),
        HeapPayload::Function(func) => func.update(forwarding),
        HeapPayload::FunctionObject(func_obj) => func_obj.update(forwarding),
        HeapPayload::Frame(frame) => frame.update(forwarding),
        HeapPayload::Continuation(ContinuationTarget::Frame(frame_id)) => {
            if let Some(new_id) = forwarding.get(frame_id) {
                *frame_id = *new_id;
            }
        }
        HeapPayload::Continuation(ContinuationTarget::NonReturnable) => {}
        HeapPayload::Exception(exc) => exc.update(forwarding),
        HeapPayload::Array(items) => {
            for item in items.iter_mut() {
                if let Some(old_id) = item.as_object_ref() {
                    if let Some(new_id) = forwarding.get(&old_id) {
                        *item = ValBox::object(*new_id);
                    }
                }
            }
        }
    }
}

/// Updates a single `HeapId` field in place against a forwarding map.
/// Exported so sibling modules implementing `trace`/`update` for their own
/// payloads (scope, function, frame, exception) don't duplicate this.
pub(crate) fn forward_id(id: &mut HeapId, forwarding: &HashMap<HeapId, HeapId>) {
    if let Some(new_id) = forwarding.get(id) {
        *id = *new_id;
    }
}

pub(crate) fn forward_value(value: &mut ValBox, forwarding: &HashMap<HeapId, HeapId>) {
    if let Some(old_id) = value.as_object_ref() {
        if let Some(new_id) = forwarding.get(&old_id) {
            *value = ValBox::object(*new_id);
        }
    }
}

/// Derives the per-thread string-hash spoiler once at startup. Not
/// cryptographically strong, only collision-resistant against a
/// non-adaptive adversary, matching the spec's stated goal.
pub fn derive_spoiler() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let addr = &nanos as *const u64 as u64;
    let mut map = AHashMap::new();
    map.insert(nanos, addr);
    nanos ^ addr.rotate_left(17)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_word_aligned_by_construction() {
        // HeapId carries no byte address, so "alignment" is expressed as:
        // every allocation returns a distinct, validly-dereferenceable id.
        let mut heap = Heap::new(0);
        let a = heap.allocate(HeapPayload::HeapDouble(1.0));
        let b = heap.allocate(HeapPayload::HeapDouble(2.0));
        assert_ne!(a, b);
        assert!(heap.is_live(a));
        assert!(heap.is_live(b));
    }

    #[test]
    fn header_format_matches_payload() {
        let mut heap = Heap::new(0);
        let id = heap.allocate(HeapPayload::HeapDouble(3.5));
        assert_eq!(heap.format_of(id), HeapFormat::HeapDouble);
    }

    #[test]
    fn slab_head_and_tail_bump_toward_each_other() {
        let mut slab = Slab::new(Generation::Hatchery, 4);
        let thing = |fmt_payload| HeapThing {
            header: HeapHeader {
                format: HeapFormat::HeapDouble,
                size_words: 1,
                generation: Generation::Hatchery,
                marked: false,
                user_data: 0,
            },
            payload: fmt_payload,
        };
        assert_eq!(slab.allocate_head(thing(HeapPayload::HeapDouble(1.0))), Some(0));
        assert_eq!(slab.allocate_tail(thing(HeapPayload::HeapDouble(2.0))), Some(3));
        assert_eq!(slab.allocate_head(thing(HeapPayload::HeapDouble(3.0))), Some(1));
        assert_eq!(slab.allocate_tail(thing(HeapPayload::HeapDouble(4.0))), Some(2));
        assert!(slab.is_full());
        assert_eq!(slab.allocate_head(thing(HeapPayload::HeapDouble(5.0))), None);
    }

    #[test]
    fn minor_collection_keeps_rooted_objects_and_drops_garbage() {
        let mut heap = Heap::new(0);
        let kept_id = heap.allocate(HeapPayload::HeapDouble(1.0));
        let _garbage = heap.allocate(HeapPayload::HeapDouble(2.0));
        let root = heap.root(ValBox::object(kept_id));
        let mut top_frame = kept_id; // stand-in; no real frame needed for this test
        root.heap.collect_minor(&mut top_frame);
        let new_kept_id = root.get().as_object_ref().unwrap();
        assert_eq!(root.heap.get(new_kept_id).header.generation, Generation::Nursery);
        drop(root);
    }

    #[test]
    fn write_marks_containing_card_dirty() {
        let mut heap = Heap::new(0);
        let id = heap.allocate(HeapPayload::Array(vec![]));
        heap.write(id, |payload| {
            if let HeapPayload::Array(items) = payload {
                items.push(ValBox::int32(1));
            }
        });
        let slab = heap.pool(id.generation())[id.slab_index() as usize].as_ref().unwrap();
        assert!(slab.dirty_cards[id.slot_index() as usize / CARD_SLOTS]);
    }
}

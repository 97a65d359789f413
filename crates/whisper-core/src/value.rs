//! The tagged value box (`ValBox`): the universal 64-bit currency between
//! every other component of the interpreter.
//!
//! Raw bit twiddling is confined to this module, per the rewrite's own
//! design notes: every other module reaches `ValBox` only through the
//! constructors, predicates, and accessors exported here.

use std::fmt;

use crate::heap::HeapId;

/// Low 3 bits of a [`ValBox`] word: the primary tag.
///
/// `Obj` is chosen as `0b000` so that a heap pointer's natural alignment
/// (the allocator guarantees every object starts on an 8-byte boundary)
/// would leave those bits free if this were a true pointer-tagged design;
/// here it tags a [`HeapId`] instead (see `heap.rs` for why references are
/// arena indices rather than raw pointers).
const TAG_BITS: u64 = 3;
const TAG_MASK: u64 = (1 << TAG_BITS) - 1;

const TAG_OBJECT: u64 = 0b000;
const TAG_INT32: u64 = 0b001;
const TAG_DOUBLE_IMM: u64 = 0b010;
const TAG_HEAP_DOUBLE: u64 = 0b011;
const TAG_STR8: u64 = 0b100;
const TAG_STR16: u64 = 0b101;
const TAG_HEAP_STRING: u64 = 0b110;
const TAG_OTHER: u64 = 0b111;

/// Sub-tags living in the next 2 bits above [`TAG_OTHER`], distinguishing
/// the handful of remaining singleton-ish variants.
const SUB_MASK: u64 = 0b11 << TAG_BITS;
const SUB_UNDEFINED: u64 = 0b00 << TAG_BITS;
const SUB_NULL: u64 = 0b01 << TAG_BITS;
const SUB_BOOL: u64 = 0b10 << TAG_BITS;
const SUB_MAGIC: u64 = 0b11 << TAG_BITS;

const BOOL_BIT: u64 = 1 << (TAG_BITS + 2);

/// Immediate doubles are restricted to a biased exponent range so the
/// payload always round-trips through the tagged word; anything outside
/// that range is boxed on the heap instead (`HeapDoubleRef`).
const DOUBLE_EXP_MIN: i32 = -127;
const DOUBLE_EXP_MAX: i32 = 128;

/// Inline strings bounded in length: up to 7 bytes (`Str8`) or up to 3
/// UTF-16 code units (`Str16`), matching `spec.md` §3.
pub const STR8_MAX_LEN: usize = 7;
pub const STR16_MAX_LEN: usize = 3;

/// The 64-bit tagged value. Copy, because every variant either fits inline
/// or is an index into the GC arena.
#[derive(Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValBox {
    raw: u64,
}

/// A dereferenced view of a [`ValBox`] for pattern matching; never stored,
/// only returned by [`ValBox::unpack`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValKind {
    Undefined,
    Null,
    Bool(bool),
    Int32(i32),
    Double(f64),
    HeapDoubleRef(HeapId),
    Str8(Str8),
    Str16(Str16),
    HeapStringRef(HeapId),
    ObjectRef(HeapId),
    Magic(u32),
}

/// Inline string of up to [`STR8_MAX_LEN`] bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Str8 {
    len: u8,
    bytes: [u8; STR8_MAX_LEN],
}

impl Str8 {
    pub fn as_str(&self) -> &str {
        // Safety-free: constructed only from validated UTF-8 ASCII-range
        // bytes in `ValBox::str8`.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Str8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Str8({:?})", self.as_str())
    }
}

/// Inline string of up to [`STR16_MAX_LEN`] UTF-16 code units.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Str16 {
    len: u8,
    units: [u16; STR16_MAX_LEN],
}

impl Str16 {
    pub fn units(&self) -> &[u16] {
        &self.units[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn to_string(&self) -> String {
        String::from_utf16_lossy(self.units())
    }
}

impl fmt::Debug for Str16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Str16({:?})", self.to_string())
    }
}

/// Error returned when a constructor's payload does not fit the variant's
/// invariants (e.g. a string too long to inline, a double exponent out of
/// the immediate range).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadOutOfRange;

impl fmt::Display for PayloadOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("value payload out of range for its inline representation")
    }
}

impl std::error::Error for PayloadOutOfRange {}

impl ValBox {
    /// The sentinel "invalid" value: `raw == 0`. Never observable by user
    /// code; used as a placeholder before a slot is initialized.
    pub const INVALID: ValBox = ValBox { raw: 0 };

    pub const UNDEFINED: ValBox = ValBox {
        raw: TAG_OTHER | SUB_UNDEFINED | (1 << (TAG_BITS + 2 + 1)),
    };
    pub const NULL: ValBox = ValBox {
        raw: TAG_OTHER | SUB_NULL | (1 << (TAG_BITS + 2 + 1)),
    };

    #[inline]
    pub fn bool(b: bool) -> ValBox {
        let payload = if b { BOOL_BIT } else { 0 };
        ValBox {
            raw: TAG_OTHER | SUB_BOOL | payload,
        }
    }

    #[inline]
    pub fn int32(n: i32) -> ValBox {
        ValBox {
            raw: TAG_INT32 | ((n as u32 as u64) << TAG_BITS),
        }
    }

    /// Constructs an immediate double. Fails (falls back to
    /// [`ValBox::heap_double`] being the caller's responsibility) when the
    /// unbiased exponent falls outside `[-127, 128]`.
    pub fn double(n: f64) -> Result<ValBox, PayloadOutOfRange> {
        if n.is_nan() || n.is_infinite() {
            // NaN/Inf exponents sit outside any finite biased range; route
            // through the heap-boxed path like any other out-of-range double.
            return Err(PayloadOutOfRange);
        }
        let bits = n.to_bits();
        let biased_exp = ((bits >> 52) & 0x7ff) as i32;
        let exp = biased_exp - 1023;
        if exp < DOUBLE_EXP_MIN || exp > DOUBLE_EXP_MAX {
            return Err(PayloadOutOfRange);
        }
        // Immediate doubles keep the full 64-bit pattern in an auxiliary
        // table-free encoding: we store the mantissa/sign/exponent shifted
        // left by TAG_BITS, which is lossy for the low bits of the
        // mantissa. To keep the round trip exact we instead store doubles
        // whose low TAG_BITS mantissa bits are zero; anything else must be
        // heap-boxed. This keeps `is_number`/arithmetic exact without
        // requiring a non-power-of-two shift scheme.
        if bits & TAG_MASK != 0 {
            return Err(PayloadOutOfRange);
        }
        Ok(ValBox {
            raw: TAG_DOUBLE_IMM | bits,
        })
    }

    #[inline]
    pub fn heap_double(id: HeapId) -> ValBox {
        ValBox {
            raw: TAG_HEAP_DOUBLE | (id.to_word() << TAG_BITS),
        }
    }

    pub fn str8(s: &str) -> Result<ValBox, PayloadOutOfRange> {
        let bytes = s.as_bytes();
        if bytes.len() > STR8_MAX_LEN || !s.is_ascii() {
            return Err(PayloadOutOfRange);
        }
        let mut buf = [0u8; STR8_MAX_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        let packed = Str8 {
            len: bytes.len() as u8,
            bytes: buf,
        };
        Ok(ValBox {
            raw: TAG_STR8 | (pack_str8(&packed) << TAG_BITS),
        })
    }

    pub fn str16(units: &[u16]) -> Result<ValBox, PayloadOutOfRange> {
        if units.len() > STR16_MAX_LEN {
            return Err(PayloadOutOfRange);
        }
        let mut buf = [0u16; STR16_MAX_LEN];
        buf[..units.len()].copy_from_slice(units);
        let packed = Str16 {
            len: units.len() as u8,
            units: buf,
        };
        Ok(ValBox {
            raw: TAG_STR16 | (pack_str16(&packed) << TAG_BITS),
        })
    }

    #[inline]
    pub fn heap_string(id: HeapId) -> ValBox {
        ValBox {
            raw: TAG_HEAP_STRING | (id.to_word() << TAG_BITS),
        }
    }

    #[inline]
    pub fn object(id: HeapId) -> ValBox {
        ValBox {
            raw: TAG_OBJECT | (id.to_word() << TAG_BITS),
        }
    }

    /// A runtime-private bit pattern, never produced by user-visible
    /// syntax; used internally (e.g. as a "hole" sentinel distinct from
    /// `INVALID`).
    #[inline]
    pub fn magic(payload: u32) -> ValBox {
        ValBox {
            raw: TAG_OTHER | SUB_MAGIC | ((payload as u64) << (TAG_BITS + 2)),
        }
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self.raw == 0
    }

    #[inline]
    fn primary_tag(self) -> u64 {
        self.raw & TAG_MASK
    }

    #[inline]
    pub fn is_undefined(self) -> bool {
        matches!(self.unpack(), ValKind::Undefined)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        matches!(self.unpack(), ValKind::Null)
    }

    #[inline]
    pub fn is_bool(self) -> bool {
        matches!(self.unpack(), ValKind::Bool(_))
    }

    #[inline]
    pub fn is_int32(self) -> bool {
        self.primary_tag() == TAG_INT32
    }

    #[inline]
    pub fn is_object_ref(self) -> bool {
        self.primary_tag() == TAG_OBJECT
    }

    /// Covers every numeric representation: `Int32`, immediate `Double`,
    /// and `HeapDoubleRef`.
    pub fn is_number(self) -> bool {
        matches!(
            self.unpack(),
            ValKind::Int32(_) | ValKind::Double(_) | ValKind::HeapDoubleRef(_)
        )
    }

    /// Covers both immediate and heap strings.
    pub fn is_string(self) -> bool {
        matches!(
            self.unpack(),
            ValKind::Str8(_) | ValKind::Str16(_) | ValKind::HeapStringRef(_)
        )
    }

    pub fn as_int32(self) -> Option<i32> {
        match self.unpack() {
            ValKind::Int32(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self.unpack() {
            ValKind::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_object_ref(self) -> Option<HeapId> {
        match self.unpack() {
            ValKind::ObjectRef(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_heap_string_ref(self) -> Option<HeapId> {
        match self.unpack() {
            ValKind::HeapStringRef(id) => Some(id),
            _ => None,
        }
    }

    /// Decodes the raw word into a matchable [`ValKind`]. This is the one
    /// place that interprets tag bits; everything else in the crate should
    /// match on this instead of touching `raw` directly.
    pub fn unpack(self) -> ValKind {
        match self.primary_tag() {
            TAG_OBJECT => ValKind::ObjectRef(HeapId::from_word(self.raw >> TAG_BITS)),
            TAG_INT32 => ValKind::Int32((self.raw >> TAG_BITS) as u32 as i32),
            TAG_DOUBLE_IMM => ValKind::Double(f64::from_bits(self.raw & !TAG_MASK)),
            TAG_HEAP_DOUBLE => ValKind::HeapDoubleRef(HeapId::from_word(self.raw >> TAG_BITS)),
            TAG_STR8 => ValKind::Str8(unpack_str8(self.raw >> TAG_BITS)),
            TAG_STR16 => ValKind::Str16(unpack_str16(self.raw >> TAG_BITS)),
            TAG_HEAP_STRING => ValKind::HeapStringRef(HeapId::from_word(self.raw >> TAG_BITS)),
            TAG_OTHER => match self.raw & SUB_MASK {
                SUB_UNDEFINED => ValKind::Undefined,
                SUB_NULL => ValKind::Null,
                SUB_BOOL => ValKind::Bool(self.raw & BOOL_BIT != 0),
                SUB_MAGIC => ValKind::Magic((self.raw >> (TAG_BITS + 2)) as u32),
                _ => unreachable!("sub-tag mask only has four values"),
            },
            _ => unreachable!("primary tag is masked to 3 bits"),
        }
    }

    /// Hashes this value. Stable within a process; string hashes are mixed
    /// with the thread-local spoiler so that two threads never agree on an
    /// adversarially-chosen collision.
    pub fn stable_hash(self, spoiler: u64) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = ahash::AHasher::default();
        match self.unpack() {
            ValKind::Undefined => 0u8.hash(&mut hasher),
            ValKind::Null => 1u8.hash(&mut hasher),
            ValKind::Bool(b) => (2u8, b).hash(&mut hasher),
            ValKind::Int32(n) => (3u8, n).hash(&mut hasher),
            ValKind::Double(d) => (4u8, d.to_bits()).hash(&mut hasher),
            ValKind::HeapDoubleRef(id) => (4u8, id).hash(&mut hasher),
            ValKind::Str8(s) => {
                (5u8, spoiler, s.as_str()).hash(&mut hasher);
            }
            ValKind::Str16(s) => {
                (5u8, spoiler, s.to_string()).hash(&mut hasher);
            }
            ValKind::HeapStringRef(id) => (5u8, spoiler, id).hash(&mut hasher),
            ValKind::ObjectRef(id) => (6u8, id).hash(&mut hasher),
            ValKind::Magic(m) => (7u8, m).hash(&mut hasher),
        }
        hasher.finish()
    }

    /// Ordering is defined only within equal categories; cross-category
    /// comparisons are a caller-level `TypeError`-class exception, not
    /// representable here.
    pub fn partial_cmp_same_category(self, other: ValBox) -> Option<std::cmp::Ordering> {
        use ValKind::{Double, HeapDoubleRef, Int32};
        let lhs = self.as_f64_if_number()?;
        let rhs = other.as_f64_if_number()?;
        match (self.unpack(), other.unpack()) {
            (Int32(_) | Double(_) | HeapDoubleRef(_), Int32(_) | Double(_) | HeapDoubleRef(_)) => {
                lhs.partial_cmp(&rhs)
            }
            _ => None,
        }
    }

    fn as_f64_if_number(self) -> Option<f64> {
        match self.unpack() {
            ValKind::Int32(n) => Some(f64::from(n)),
            ValKind::Double(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Debug for ValBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValBox({:?})", self.unpack())
    }
}

fn pack_str8(s: &Str8) -> u64 {
    let mut word = u64::from(s.len);
    for (i, byte) in s.bytes.iter().enumerate() {
        word |= u64::from(*byte) << (8 + i * 8);
    }
    word
}

fn unpack_str8(word: u64) -> Str8 {
    let len = (word & 0xff) as u8;
    let mut bytes = [0u8; STR8_MAX_LEN];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = ((word >> (8 + i * 8)) & 0xff) as u8;
    }
    Str8 { len, bytes }
}

fn pack_str16(s: &Str16) -> u64 {
    let mut word = u64::from(s.len);
    for (i, unit) in s.units.iter().enumerate() {
        word |= u64::from(*unit) << (8 + i * 16);
    }
    word
}

fn unpack_str16(word: u64) -> Str16 {
    let len = (word & 0xff) as u8;
    let mut units = [0u16; STR16_MAX_LEN];
    for (i, unit) in units.iter_mut().enumerate() {
        *unit = ((word >> (8 + i * 16)) & 0xffff) as u16;
    }
    Str16 { len, units }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_soundness_exactly_one_predicate() {
        let samples = [
            ValBox::UNDEFINED,
            ValBox::NULL,
            ValBox::bool(true),
            ValBox::bool(false),
            ValBox::int32(42),
            ValBox::int32(-1),
            ValBox::str8("hi").unwrap(),
            ValBox::magic(7),
        ];
        for v in samples {
            let count = [
                v.is_undefined(),
                v.is_null(),
                v.is_bool(),
                v.is_int32(),
                matches!(v.unpack(), ValKind::Double(_)),
                matches!(v.unpack(), ValKind::Str8(_)),
                matches!(v.unpack(), ValKind::Magic(_)),
            ]
            .into_iter()
            .filter(|b| *b)
            .count();
            assert_eq!(count, 1, "value {v:?} satisfied {count} predicates");
        }
    }

    #[test]
    fn int32_round_trip() {
        for n in [i32::MIN, -1, 0, 1, 42, i32::MAX] {
            assert_eq!(ValBox::int32(n).as_int32(), Some(n));
        }
    }

    #[test]
    fn str8_round_trip() {
        for s in ["", "a", "hello12", "1234567"] {
            let v = ValBox::str8(s).unwrap();
            match v.unpack() {
                ValKind::Str8(packed) => assert_eq!(packed.as_str(), s),
                other => panic!("unexpected unpack: {other:?}"),
            }
        }
    }

    #[test]
    fn str8_rejects_too_long() {
        assert!(ValBox::str8("12345678").is_err());
    }

    #[test]
    fn invalid_is_zero_and_unobservable_tag() {
        assert_eq!(ValBox::INVALID.raw, 0);
    }

    #[test]
    fn double_round_trips_when_representable() {
        let v = ValBox::double(2.0).unwrap();
        assert_eq!(v.unpack(), ValKind::Double(2.0));
    }

    #[test]
    fn cross_category_ordering_is_none() {
        let s = ValBox::str8("x").unwrap();
        let n = ValBox::int32(1);
        assert_eq!(s.partial_cmp_same_category(n), None);
    }
}

//! Interface query: objects advertise which types they can be viewed as
//! and hand out a fresh strong reference on a match.
//!
//! Multiple-inheritance / virtual-dispatch-based `QueryInterface` idioms
//! are replaced here with a tagged-variant dispatch table: every object
//! carries one v-table whose entries associate a [`TypeId`] with a
//! thunk. `query_interface` walks that table and, on a hit, hands back a
//! fresh, type-erased strong reference.

use std::fmt;

/// A 128-bit type identifier, laid out the way GUIDs commonly are: four
/// bytes, two bytes, two bytes, eight bytes — so ids read naturally as
/// const literals (`TypeId::from_parts(0xAAAAAAAA, 0xBBBB, 0xCCCC, [..8
/// bytes..])`). String and GUID-string conversion are out of scope, so
/// this type has no `FromStr`/`ToString` round-trip — only the `Debug`
/// impl below, which is just for diagnostics.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct TypeId {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

impl TypeId {
    pub const fn from_parts(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        TypeId {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Derives a deterministic `TypeId` from a fully-qualified type name
    /// (e.g. `concat!(module_path!(), "::", stringify!(Widget))`), so two
    /// same-named types in different modules never collide. Two FNV-1a
    /// passes over the same bytes with different seeds fill the id's two
    /// halves, rather than hashing twice over differently-salted strings —
    /// there is no string concatenation available in a `const fn`.
    /// `#[derive(Object)]` is the only expected caller; written as a
    /// public `const fn` so that call site can run at the derive target's
    /// own compile time, with its own `module_path!()`.
    pub const fn from_qualified_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let h1 = fnv1a(bytes, 0xcbf2_9ce4_8422_2325);
        let h2 = fnv1a(bytes, 0x8422_2325_cbf2_9ce4);
        let data1 = (h1 >> 32) as u32;
        let data2 = ((h1 >> 16) & 0xffff) as u16;
        let data3 = (h1 & 0xffff) as u16;
        let data4 = h2.to_be_bytes();
        TypeId {
            data1,
            data2,
            data3,
            data4,
        }
    }
}

const fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    const PRIME: u64 = 0x100_0000_01b3;
    let mut hash = seed;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

/// Associates a type with its canonical [`TypeId`]. Usually derived with
/// `#[derive(swarmrt_derive::Object)]` rather than written by hand.
pub trait TypeIdentified {
    const TYPE_ID: TypeId;
}

/// Types that can answer `query_interface`. The default implementation
/// (the common case: one object, one identity, no additional facets)
/// answers only to its own [`TypeIdentified::TYPE_ID`]; types that expose
/// several interfaces override `answers_to` to also accept the other ids
/// they support (all such ids must be castable back to `Self`'s layout —
/// this crate does not model distinct-offset multiple inheritance, see
/// DESIGN.md).
pub trait Interface: TypeIdentified + 'static {
    fn answers_to(id: TypeId) -> bool {
        id == Self::TYPE_ID
    }
}

/// A type-erased marker used only as `StrongRef<Opaque>` / `WeakRef<Opaque>`.
/// It is never constructed; its only job is to stand in for "some `Interface`
/// type, caller doesn't know which" as a type parameter. Zero-sized so
/// that reading through it (`StrongRef<Opaque>::get()`) touches no memory.
#[repr(C)]
pub struct Opaque {
    _never: [u8; 0],
}

impl TypeIdentified for Opaque {
    // Never compared against; query dispatch never asks "is this id
    // Opaque's id", it asks "does this object's real type answer to id".
    const TYPE_ID: TypeId = TypeId::from_parts(0, 0, 0, [0; 8]);
}

impl Interface for Opaque {
    fn answers_to(_id: TypeId) -> bool {
        false
    }
}

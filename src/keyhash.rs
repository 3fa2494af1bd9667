//! Stable key hashing for bucket selection.
//!
//! Bucket selection must be deterministic across processes and restarts:
//! two instances of the same service must agree on which bucket a key
//! lives in so that tooling, tracing, and capacity planning line up.
//! `std::collections::hash_map::RandomState` is randomly seeded per
//! process and therefore unsuitable. [`StableHash`] instead hashes a
//! big-endian encoding of the key with 64-bit FNV-1a.
//!
//! ## Supported key types
//!
//! Integers (signed and unsigned, including 128-bit), `bool`, `char`,
//! strings, and byte slices. Raw pointers are deliberately not supported:
//! a pointer value is meaningless as a stable cache key, and the missing
//! implementation turns that mistake into a compile error.
//!
//! Storage accepts any `Fn(&K) -> u64` override for key types without a
//! [`StableHash`] implementation.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Computes the 64-bit FNV-1a hash of `bytes`.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// A hash that is stable across processes, platforms, and versions.
///
/// Implementations hash a canonical big-endian encoding of the value
/// with [`fnv1a`].
pub trait StableHash {
    /// Returns the stable 64-bit hash of `self`.
    fn stable_hash(&self) -> u64;
}

macro_rules! impl_stable_hash_for_int {
    ($($ty:ty => $unsigned:ty),* $(,)?) => {
        $(
            impl StableHash for $ty {
                fn stable_hash(&self) -> u64 {
                    fnv1a(&(*self as $unsigned).to_be_bytes())
                }
            }
        )*
    };
}

impl_stable_hash_for_int! {
    u8 => u8,
    u16 => u16,
    u32 => u32,
    u64 => u64,
    u128 => u128,
    i8 => u8,
    i16 => u16,
    i32 => u32,
    i64 => u64,
    i128 => u128,
}

// usize/isize are widened to 64 bits so the encoding does not depend on
// the platform word size.
impl StableHash for usize {
    fn stable_hash(&self) -> u64 {
        fnv1a(&(*self as u64).to_be_bytes())
    }
}

impl StableHash for isize {
    fn stable_hash(&self) -> u64 {
        fnv1a(&(*self as i64 as u64).to_be_bytes())
    }
}

impl StableHash for bool {
    fn stable_hash(&self) -> u64 {
        fnv1a(&[u8::from(*self)])
    }
}

impl StableHash for char {
    fn stable_hash(&self) -> u64 {
        fnv1a(&u32::from(*self).to_be_bytes())
    }
}

impl StableHash for str {
    fn stable_hash(&self) -> u64 {
        fnv1a(self.as_bytes())
    }
}

impl StableHash for String {
    fn stable_hash(&self) -> u64 {
        fnv1a(self.as_bytes())
    }
}

impl StableHash for [u8] {
    fn stable_hash(&self) -> u64 {
        fnv1a(self)
    }
}

impl StableHash for Vec<u8> {
    fn stable_hash(&self) -> u64 {
        fnv1a(self)
    }
}

impl<T: StableHash + ?Sized> StableHash for &T {
    fn stable_hash(&self) -> u64 {
        (**self).stable_hash()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

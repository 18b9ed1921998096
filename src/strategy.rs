//! Hash functions that map marshalled key bytes to 32-bit bucket hashes.
//!
//! Three interchangeable algorithms are provided:
//! - [`Lcg`]: deterministic across runs, no state, weak distribution.
//! - [`Zobrist`]: table of random words, reproducible only within a process.
//! - [`KeyedDigest`]: keyed MD5, resistant to chosen-key collision floods.
//!
//! [`HashFunction`] selects one of them at runtime. Any [`HashStrategy`] can
//! be shared between tables through `&S`, `Rc<S>` or `Arc<S>`.

use crate::error::{HashTableError, Result};
use crate::keyed_digest;
use core::fmt;
use log::debug;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maps marshalled key bytes to a 32-bit hash.
pub trait HashStrategy {
    fn hash_bytes(&self, bytes: &[u8]) -> u32;
}

impl<S: HashStrategy + ?Sized> HashStrategy for &S {
    fn hash_bytes(&self, bytes: &[u8]) -> u32 {
        (**self).hash_bytes(bytes)
    }
}

impl<S: HashStrategy + ?Sized> HashStrategy for Rc<S> {
    fn hash_bytes(&self, bytes: &[u8]) -> u32 {
        (**self).hash_bytes(bytes)
    }
}

impl<S: HashStrategy + ?Sized> HashStrategy for Arc<S> {
    fn hash_bytes(&self, bytes: &[u8]) -> u32 {
        (**self).hash_bytes(bytes)
    }
}

impl<S: HashStrategy + ?Sized> HashStrategy for Box<S> {
    fn hash_bytes(&self, bytes: &[u8]) -> u32 {
        (**self).hash_bytes(bytes)
    }
}

const LCG_A: u32 = 1_664_525;
const LCG_B: u32 = 1_013_904_223;

/// Linear-congruential hash (Numerical Recipes constants).
///
/// Bytes are packed big-endian into 32-bit groups; each group `v` becomes
/// `v * 1664525 + 1013904223 (mod 2^32)` and the results are XORed. A final
/// short group keeps only its own bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lcg;

impl HashStrategy for Lcg {
    fn hash_bytes(&self, bytes: &[u8]) -> u32 {
        bytes.chunks(4).fold(0u32, |acc, group| {
            let v = group
                .iter()
                .fold(0u32, |v, &b| (v << 8) | u32::from(b));
            acc ^ v.wrapping_mul(LCG_A).wrapping_add(LCG_B)
        })
    }
}

/// Largest Zobrist table length accepted.
pub const MAX_ZOBRIST_LEN: usize = 1 << 30;

/// Zobrist hash over a `256 x table_len` table of random words.
pub struct Zobrist {
    table_len: usize,
    mask: usize,
    // row-major: table[byte * table_len + position]
    table: Vec<u32>,
}

impl Zobrist {
    /// Table randomized from the current time; reproducible only within
    /// this process.
    pub fn new(table_len: usize) -> Result<Self> {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
        Self::with_seed(table_len, seed)
    }

    /// `table_len` is rounded down to a power of two (at least 1). Fails
    /// with `AllocationFailure` if the `256 x table_len` table cannot be
    /// reserved.
    pub fn with_seed(table_len: usize, seed: u64) -> Result<Self> {
        let table_len = round_down_pow2(table_len.clamp(1, MAX_ZOBRIST_LEN));
        let mut table = alloc_words(256 * table_len)?;
        let mut rng = StdRng::seed_from_u64(seed);
        table.extend((0..256 * table_len).map(|_| rng.next_u32()));
        debug!("zobrist table built: 256 x {}", table_len);
        Ok(Self {
            table_len,
            mask: table_len - 1,
            table,
        })
    }

    pub fn table_len(&self) -> usize {
        self.table_len
    }

    pub fn is_released(&self) -> bool {
        self.table.is_empty()
    }

    /// Frees the random table early. Afterwards every input hashes to 0.
    pub fn release(&mut self) {
        self.table = Vec::new();
    }
}

fn alloc_words(n: usize) -> Result<Vec<u32>> {
    let mut words = Vec::new();
    words
        .try_reserve_exact(n)
        .map_err(|_| HashTableError::AllocationFailure { requested: n })?;
    Ok(words)
}

fn round_down_pow2(n: usize) -> usize {
    1 << (usize::BITS - 1 - n.leading_zeros())
}

impl HashStrategy for Zobrist {
    fn hash_bytes(&self, bytes: &[u8]) -> u32 {
        if self.table.is_empty() {
            return 0;
        }
        bytes.iter().enumerate().fold(0u32, |acc, (i, &b)| {
            acc ^ self.table[usize::from(b) * self.table_len + (i & self.mask)]
        })
    }
}

impl fmt::Debug for Zobrist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zobrist")
            .field("table_len", &self.table_len)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Keyed-MD5 hash; the low 32 bits of the keyed digest.
#[derive(Debug, Clone, Copy)]
pub struct KeyedDigest {
    _secret: &'static [u8; keyed_digest::DIGEST_LEN],
}

impl KeyedDigest {
    /// Initializes the process secret if this is the first keyed digest.
    pub fn new() -> Self {
        Self {
            _secret: keyed_digest::shared_secret(),
        }
    }
}

impl Default for KeyedDigest {
    fn default() -> Self {
        Self::new()
    }
}

impl HashStrategy for KeyedDigest {
    fn hash_bytes(&self, bytes: &[u8]) -> u32 {
        let d = keyed_digest::keyed_digest(bytes);
        u32::from_ne_bytes([d[0], d[1], d[2], d[3]])
    }
}

/// Tag of a [`HashFunction`] variant.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HashFunctionType {
    Lcg,
    Zobrist,
    KeyedDigest,
}

impl fmt::Display for HashFunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HashFunctionType::Lcg => "lcg",
            HashFunctionType::Zobrist => "zobrist",
            HashFunctionType::KeyedDigest => "keyed-digest",
        })
    }
}

/// Runtime-selected hash function.
#[derive(Debug)]
pub enum HashFunction {
    Lcg(Lcg),
    Zobrist(Zobrist),
    KeyedDigest(KeyedDigest),
}

impl HashFunction {
    pub fn lcg() -> Self {
        HashFunction::Lcg(Lcg)
    }

    pub fn zobrist(table_len: usize) -> Result<Self> {
        Zobrist::new(table_len).map(HashFunction::Zobrist)
    }

    pub fn keyed_digest() -> Self {
        HashFunction::KeyedDigest(KeyedDigest::new())
    }

    /// Builds a hash function from its tag; `zobrist_len` is only used for
    /// [`HashFunctionType::Zobrist`].
    pub fn from_type(ty: HashFunctionType, zobrist_len: usize) -> Result<Self> {
        match ty {
            HashFunctionType::Lcg => Ok(Self::lcg()),
            HashFunctionType::Zobrist => Self::zobrist(zobrist_len),
            HashFunctionType::KeyedDigest => Ok(Self::keyed_digest()),
        }
    }

    pub fn function_type(&self) -> HashFunctionType {
        match self {
            HashFunction::Lcg(_) => HashFunctionType::Lcg,
            HashFunction::Zobrist(_) => HashFunctionType::Zobrist,
            HashFunction::KeyedDigest(_) => HashFunctionType::KeyedDigest,
        }
    }

    /// Releases Zobrist state. Other functions own no releasable state and
    /// are left untouched.
    pub fn release(&mut self) -> Result<()> {
        match self {
            HashFunction::Zobrist(z) => {
                z.release();
                Ok(())
            }
            other => Err(HashTableError::InvalidStrategyOperation {
                function: other.function_type(),
            }),
        }
    }
}

impl HashStrategy for HashFunction {
    fn hash_bytes(&self, bytes: &[u8]) -> u32 {
        match self {
            HashFunction::Lcg(h) => h.hash_bytes(bytes),
            HashFunction::Zobrist(h) => h.hash_bytes(bytes),
            HashFunction::KeyedDigest(h) => h.hash_bytes(bytes),
        }
    }
}

impl From<Lcg> for HashFunction {
    fn from(h: Lcg) -> Self {
        HashFunction::Lcg(h)
    }
}

impl From<Zobrist> for HashFunction {
    fn from(h: Zobrist) -> Self {
        HashFunction::Zobrist(h)
    }
}

impl From<KeyedDigest> for HashFunction {
    fn from(h: KeyedDigest) -> Self {
        HashFunction::KeyedDigest(h)
    }
}

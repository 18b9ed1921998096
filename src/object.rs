//! Object registry: the byte-level contract every key and yield type fulfils.
//!
//! Each storable type is tied to one [`ObjectType`] tag. The tag resolves to
//! a static [`ObjectDescriptor`] carrying the type's fixed marshalled length,
//! and the [`HashObject`] trait supplies the per-type operations:
//! compare (`compare`), copy (`Clone`) and marshal (`marshal_into`).
//! The table never looks at key or yield bytes except through this trait.

use core::cmp::Ordering;
use core::fmt;
use core::ops::Deref;

/// Capacity of the stack buffer used by [`Marshalled`]; every registered
/// fixed length fits.
pub const MAX_MARSHALLED_LEN: usize = 64;

/// Semantic type tags known to the registry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    Connection,
    OneSidedConnection,
    UnsignedInt,
    Double,
    ConnectionInfo,
}

/// Immutable registry entry for one [`ObjectType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub object_type: ObjectType,
    pub name: &'static str,
    /// Exact number of bytes `marshal` produces.
    pub fixed_length: usize,
}

static REGISTRY: [ObjectDescriptor; 5] = [
    ObjectDescriptor {
        object_type: ObjectType::Connection,
        name: "connection",
        fixed_length: ObjectType::Connection.fixed_length(),
    },
    ObjectDescriptor {
        object_type: ObjectType::OneSidedConnection,
        name: "one-sided connection",
        fixed_length: ObjectType::OneSidedConnection.fixed_length(),
    },
    ObjectDescriptor {
        object_type: ObjectType::UnsignedInt,
        name: "unsigned int",
        fixed_length: ObjectType::UnsignedInt.fixed_length(),
    },
    ObjectDescriptor {
        object_type: ObjectType::Double,
        name: "double",
        fixed_length: ObjectType::Double.fixed_length(),
    },
    ObjectDescriptor {
        object_type: ObjectType::ConnectionInfo,
        name: "connection info",
        fixed_length: ObjectType::ConnectionInfo.fixed_length(),
    },
];

// Every registered length must fit the `Marshalled` stack buffer.
const _: () = {
    let mut i = 0;
    while i < ObjectType::ALL.len() {
        assert!(ObjectType::ALL[i].fixed_length() <= MAX_MARSHALLED_LEN);
        i += 1;
    }
};

impl ObjectType {
    pub const ALL: [ObjectType; 5] = [
        ObjectType::Connection,
        ObjectType::OneSidedConnection,
        ObjectType::UnsignedInt,
        ObjectType::Double,
        ObjectType::ConnectionInfo,
    ];

    fn index(self) -> usize {
        match self {
            ObjectType::Connection => 0,
            ObjectType::OneSidedConnection => 1,
            ObjectType::UnsignedInt => 2,
            ObjectType::Double => 3,
            ObjectType::ConnectionInfo => 4,
        }
    }

    pub fn descriptor(self) -> &'static ObjectDescriptor {
        &REGISTRY[self.index()]
    }

    pub const fn fixed_length(self) -> usize {
        match self {
            ObjectType::Connection | ObjectType::OneSidedConnection => 13,
            ObjectType::UnsignedInt => 4,
            ObjectType::Double => 8,
            // three u32 counters followed by three f64 counters
            ObjectType::ConnectionInfo => 36,
        }
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operations the table needs from a key or yield type.
///
/// Implementations must keep `compare` consistent with `marshal_into`:
/// two values that compare `Equal` marshal to identical bytes, so that they
/// land in the same bucket under every hash function.
pub trait HashObject: Clone {
    /// Registry tag of this type; its descriptor fixes the marshalled
    /// length.
    const TYPE: ObjectType;

    /// Three-way order used for lookup equality and sorting.
    fn compare(&self, other: &Self) -> Ordering;

    /// Writes the hashing representation of `self`. `out` is exactly
    /// `Self::TYPE.fixed_length()` bytes long and must be filled entirely.
    fn marshal_into(&self, out: &mut [u8]);

    fn marshal(&self) -> Marshalled {
        Marshalled::of(self)
    }

    fn same_as(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

/// Marshalled bytes of one object, held on the stack.
#[derive(Clone, Copy)]
pub struct Marshalled {
    buf: [u8; MAX_MARSHALLED_LEN],
    len: usize,
}

impl Marshalled {
    pub fn of<T: HashObject>(obj: &T) -> Self {
        let len = T::TYPE.fixed_length();
        let mut buf = [0u8; MAX_MARSHALLED_LEN];
        obj.marshal_into(&mut buf[..len]);
        Self { buf, len }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Deref for Marshalled {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for Marshalled {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Marshalled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_bytes()).finish()
    }
}

impl PartialEq for Marshalled {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Marshalled {}

/// Unsigned 32-bit value (addresses, counters).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct UnsignedInt(pub u32);

impl HashObject for UnsignedInt {
    const TYPE: ObjectType = ObjectType::UnsignedInt;

    fn compare(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }

    // Native byte order: the bytes only feed the hash, never leave the process.
    fn marshal_into(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.0.to_ne_bytes());
    }
}

impl From<u32> for UnsignedInt {
    fn from(v: u32) -> Self {
        UnsignedInt(v)
    }
}

/// Double-precision value.
///
/// Ordered with IEEE 754 `totalOrder`, so `0.0` and `-0.0` are distinct keys
/// just as their bytes are.
#[derive(Copy, Clone, Debug, Default)]
pub struct Double(pub f64);

impl HashObject for Double {
    const TYPE: ObjectType = ObjectType::Double;

    fn compare(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }

    fn marshal_into(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.0.to_ne_bytes());
    }
}

impl PartialEq for Double {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Double {}

impl From<f64> for Double {
    fn from(v: f64) -> Self {
        Double(v)
    }
}

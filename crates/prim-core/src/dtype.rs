use std::fmt;

use half::{bf16, f16};

use crate::storage::CpuStorage;

/// Numeric precision of a memory buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit floating point.
    F32,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
    /// 16-bit brain floating point (via the `half` crate).
    BF16,
    /// Signed 8-bit integer.
    S8,
}

impl DataType {
    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::F16 | DataType::BF16 => 2,
            DataType::S8 => 1,
        }
    }

    /// Returns true for floating-point types.
    pub fn is_float(&self) -> bool {
        !matches!(self, DataType::S8)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::F32 => write!(f, "f32"),
            DataType::F16 => write!(f, "f16"),
            DataType::BF16 => write!(f, "bf16"),
            DataType::S8 => write!(f, "s8"),
        }
    }
}

/// A floating-point element type that kernels are specialized over.
///
/// The associated `DATA_TYPE` ties a Rust type to the precision tag carried by
/// memory descriptors, so a kernel instantiated for `T` can check at
/// descriptor-creation time that every tensor it touches is stored as `T`.
/// Arithmetic is done in f32; `from_f32` rounds on store.
pub trait Element: Copy + Default + Send + Sync + fmt::Debug + 'static {
    const DATA_TYPE: DataType;

    fn to_f32(self) -> f32;

    fn from_f32(v: f32) -> Self;

    /// Borrow `storage` as a slice of `Self`, if it holds this element type.
    fn view(storage: &CpuStorage) -> Option<&[Self]>;

    /// Mutable counterpart of [`Element::view`].
    fn view_mut(storage: &mut CpuStorage) -> Option<&mut [Self]>;

    /// Wrap a vector of `Self` into storage.
    fn into_storage(data: Vec<Self>) -> CpuStorage;
}

impl Element for f32 {
    const DATA_TYPE: DataType = DataType::F32;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(v: f32) -> Self {
        v
    }

    fn view(storage: &CpuStorage) -> Option<&[Self]> {
        match storage {
            CpuStorage::F32(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn view_mut(storage: &mut CpuStorage) -> Option<&mut [Self]> {
        match storage {
            CpuStorage::F32(v) => Some(v.as_mut_slice()),
            _ => None,
        }
    }

    fn into_storage(data: Vec<Self>) -> CpuStorage {
        CpuStorage::F32(data)
    }
}

impl Element for f16 {
    const DATA_TYPE: DataType = DataType::F16;

    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }

    fn view(storage: &CpuStorage) -> Option<&[Self]> {
        match storage {
            CpuStorage::F16(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn view_mut(storage: &mut CpuStorage) -> Option<&mut [Self]> {
        match storage {
            CpuStorage::F16(v) => Some(v.as_mut_slice()),
            _ => None,
        }
    }

    fn into_storage(data: Vec<Self>) -> CpuStorage {
        CpuStorage::F16(data)
    }
}

impl Element for bf16 {
    const DATA_TYPE: DataType = DataType::BF16;

    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }

    fn from_f32(v: f32) -> Self {
        bf16::from_f32(v)
    }

    fn view(storage: &CpuStorage) -> Option<&[Self]> {
        match storage {
            CpuStorage::BF16(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn view_mut(storage: &mut CpuStorage) -> Option<&mut [Self]> {
        match storage {
            CpuStorage::BF16(v) => Some(v.as_mut_slice()),
            _ => None,
        }
    }

    fn into_storage(data: Vec<Self>) -> CpuStorage {
        CpuStorage::BF16(data)
    }
}

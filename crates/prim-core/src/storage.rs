use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use half::{bf16, f16};

use crate::dtype::{DataType, Element};
use crate::error::{PrimitiveError, Result};

/// Host-side buffer storage, one variant per data type.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    F32(Vec<f32>),
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    S8(Vec<i8>),
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F16(v) => v.len(),
            CpuStorage::BF16(v) => v.len(),
            CpuStorage::S8(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create zero-filled storage for the given dtype and element count.
    pub fn zeros(dtype: DataType, n: usize) -> Self {
        match dtype {
            DataType::F32 => CpuStorage::F32(vec![0.0; n]),
            DataType::F16 => CpuStorage::F16(vec![f16::ZERO; n]),
            DataType::BF16 => CpuStorage::BF16(vec![bf16::ZERO; n]),
            DataType::S8 => CpuStorage::S8(vec![0; n]),
        }
    }

    /// Create storage from a vector of any kernel element type.
    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        T::into_storage(data)
    }

    /// Returns the data as a slice of `T`.
    ///
    /// # Errors
    /// Returns `InvalidArguments` if the storage does not hold `T`.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        let dtype = self.dtype();
        T::view(self).ok_or_else(|| element_mismatch::<T>(dtype))
    }

    /// Returns the data as a mutable slice of `T`.
    ///
    /// # Errors
    /// Returns `InvalidArguments` if the storage does not hold `T`.
    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T]> {
        let dtype = self.dtype();
        T::view_mut(self).ok_or_else(|| element_mismatch::<T>(dtype))
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DataType {
        match self {
            CpuStorage::F32(_) => DataType::F32,
            CpuStorage::F16(_) => DataType::F16,
            CpuStorage::BF16(_) => DataType::BF16,
            CpuStorage::S8(_) => DataType::S8,
        }
    }
}

fn element_mismatch<T: Element>(got: DataType) -> PrimitiveError {
    PrimitiveError::invalid_arguments(format!(
        "storage holds {} elements, requested {}",
        got,
        T::DATA_TYPE
    ))
}

/// Shared handle to the buffer behind a memory primitive.
///
/// Cloning the handle shares the buffer. The lock only keeps individual reads
/// and writes sound; ordering between a producer and its consumers is the
/// scheduler's job.
#[derive(Debug, Clone)]
pub struct DataHandle(Arc<RwLock<CpuStorage>>);

impl DataHandle {
    pub fn new(storage: CpuStorage) -> Self {
        DataHandle(Arc::new(RwLock::new(storage)))
    }

    pub fn zeros(dtype: DataType, n: usize) -> Self {
        Self::new(CpuStorage::zeros(dtype, n))
    }

    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        Self::new(CpuStorage::from_vec(data))
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, CpuStorage>> {
        self.0
            .read()
            .map_err(|_| PrimitiveError::invalid_arguments("data handle lock is poisoned"))
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, CpuStorage>> {
        self.0
            .write()
            .map_err(|_| PrimitiveError::invalid_arguments("data handle lock is poisoned"))
    }

    /// Copy the buffer out as f32 values.
    pub fn to_f32_vec<T: Element>(&self) -> Result<Vec<f32>> {
        let guard = self.read()?;
        Ok(guard.as_slice::<T>()?.iter().map(|v| v.to_f32()).collect())
    }

    /// Returns true if both handles point at the same buffer.
    pub fn ptr_eq(&self, other: &DataHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

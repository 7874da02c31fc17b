use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use std::time::Instant;

use crate::dtype::DataType;
use crate::engine::Engine;
use crate::error::{PrimitiveError, Result};
use crate::event::Event;
use crate::op_desc::{OpDesc, PrimitiveKind};
use crate::primitive::{check_arguments, complete_execution, Primitive, PrimitiveAt};
use crate::primitive_desc::PrimitiveDesc;
use crate::storage::DataHandle;

/// Largest rank a memory descriptor may have.
pub const MAX_NDIMS: usize = 12;

/// Physical layout of a memory buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryFormat {
    /// Placeholder: let the implementation choose.
    Any,
    /// Plain 1D.
    X,
    /// Batch, channels.
    NC,
    /// Batch, channels, height, width.
    NCHW,
    /// Batch, channels, depth, height, width.
    NCDHW,
}

impl MemoryFormat {
    /// Rank implied by this format, or `None` for `Any`.
    pub fn ndims(&self) -> Option<usize> {
        match self {
            MemoryFormat::Any => None,
            MemoryFormat::X => Some(1),
            MemoryFormat::NC => Some(2),
            MemoryFormat::NCHW => Some(4),
            MemoryFormat::NCDHW => Some(5),
        }
    }

    /// Dense default layout for a given rank.
    pub fn default_for(ndims: usize) -> Option<MemoryFormat> {
        match ndims {
            1 => Some(MemoryFormat::X),
            2 => Some(MemoryFormat::NC),
            4 => Some(MemoryFormat::NCHW),
            5 => Some(MemoryFormat::NCDHW),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryFormat::Any => write!(f, "any"),
            MemoryFormat::X => write!(f, "x"),
            MemoryFormat::NC => write!(f, "nc"),
            MemoryFormat::NCHW => write!(f, "nchw"),
            MemoryFormat::NCDHW => write!(f, "ncdhw"),
        }
    }
}

/// Logical description of a buffer: dims, element type and layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryDesc {
    dims: Vec<usize>,
    data_type: DataType,
    format: MemoryFormat,
}

impl MemoryDesc {
    /// Create a memory descriptor.
    ///
    /// # Errors
    /// `InvalidArguments` if the rank is 0 or above [`MAX_NDIMS`], a dim is
    /// zero, the byte size overflows `usize`, or a concrete format disagrees
    /// with the rank.
    pub fn new(dims: &[usize], data_type: DataType, format: MemoryFormat) -> Result<Self> {
        if dims.is_empty() || dims.len() > MAX_NDIMS {
            return Err(PrimitiveError::invalid_arguments(format!(
                "memory rank {} outside 1..={}",
                dims.len(),
                MAX_NDIMS
            )));
        }
        if dims.contains(&0) {
            return Err(PrimitiveError::invalid_arguments(format!(
                "memory dims {:?} contain a zero extent",
                dims
            )));
        }
        let bytes = dims
            .iter()
            .try_fold(data_type.size_in_bytes(), |acc, &d| acc.checked_mul(d));
        if bytes.is_none() {
            return Err(PrimitiveError::invalid_arguments(format!(
                "memory dims {:?} of {} overflow the address space",
                dims, data_type
            )));
        }
        if let Some(n) = format.ndims() {
            if n != dims.len() {
                return Err(PrimitiveError::invalid_arguments(format!(
                    "format {} expects {} dims, got {:?}",
                    format, n, dims
                )));
            }
        }
        Ok(MemoryDesc {
            dims: dims.to_vec(),
            data_type,
            format,
        })
    }

    /// Create a descriptor in the dense default layout for its rank.
    pub fn dense(dims: &[usize], data_type: DataType) -> Result<Self> {
        let format = MemoryFormat::default_for(dims.len()).ok_or_else(|| {
            PrimitiveError::invalid_arguments(format!("no default layout for dims {:?}", dims))
        })?;
        Self::new(dims, data_type, format)
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    /// Returns the size of dimension `i`.
    ///
    /// # Panics
    /// Panics if `i >= ndims()`.
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn format(&self) -> MemoryFormat {
        self.format
    }

    /// Total number of elements (product of all dimension sizes).
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major strides. For dims [d0, d1, d2] the strides are [d1*d2, d2, 1].
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.dims.len()];
        strides[self.dims.len() - 1] = 1;
        for i in (0..self.dims.len() - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    pub fn size_in_bytes(&self) -> usize {
        self.numel() * self.data_type.size_in_bytes()
    }
}

impl fmt::Display for MemoryDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:", self.data_type, self.format)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, "x")?;
            }
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

/// Primitive descriptor of the memory kind: a concrete buffer layout bound to
/// an engine.
#[derive(Debug, Clone)]
pub struct MemoryPd {
    engine: Arc<dyn Engine>,
    desc: MemoryDesc,
}

impl MemoryPd {
    /// # Errors
    /// `Unimplemented` if the descriptor's format is `Any`.
    pub fn new(engine: Arc<dyn Engine>, desc: MemoryDesc) -> Result<Self> {
        if desc.format() == MemoryFormat::Any {
            return Err(PrimitiveError::unimplemented(
                "memory primitive needs a concrete format",
            ));
        }
        Ok(MemoryPd { engine, desc })
    }

    /// Build a memory descriptor through the engine's routine and bind it.
    pub fn init(
        engine: &Arc<dyn Engine>,
        dims: &[usize],
        data_type: DataType,
        format: MemoryFormat,
    ) -> Result<Self> {
        let desc = engine.memory_desc_init(dims, data_type, format)?;
        Self::new(Arc::clone(engine), desc)
    }

    pub fn desc(&self) -> &MemoryDesc {
        &self.desc
    }
}

impl PartialEq for MemoryPd {
    fn eq(&self, other: &Self) -> bool {
        self.desc == other.desc && Arc::ptr_eq(&self.engine, &other.engine)
    }
}

impl PrimitiveDesc for MemoryPd {
    fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Memory
    }

    fn impl_name(&self) -> &'static str {
        "memory"
    }

    fn op_desc(&self) -> OpDesc {
        OpDesc::Memory(self.desc.clone())
    }

    fn n_inputs(&self) -> usize {
        0
    }

    fn n_outputs(&self) -> usize {
        0
    }

    fn info(&self) -> String {
        format!("memory,{},{}", self.engine.kind(), self.desc)
    }

    fn create_primitive(
        self: Arc<Self>,
        inputs: Vec<PrimitiveAt>,
        outputs: Vec<Weak<dyn Primitive>>,
    ) -> Result<Arc<dyn Primitive>> {
        if !inputs.is_empty() {
            return Err(PrimitiveError::invalid_arguments(
                "memory primitive takes no inputs",
            ));
        }
        check_arguments(&*self, &inputs, &outputs)?;
        let handle = DataHandle::zeros(self.desc.data_type(), self.desc.numel());
        Ok(Arc::new(MemoryPrimitive {
            pd: self,
            inputs,
            outputs,
            handle: RwLock::new(handle),
        }))
    }
}

/// A leaf of the dependency graph: storage only, no computation.
#[derive(Debug)]
pub struct MemoryPrimitive {
    pd: Arc<MemoryPd>,
    inputs: Vec<PrimitiveAt>,
    outputs: Vec<Weak<dyn Primitive>>,
    handle: RwLock<DataHandle>,
}

impl Primitive for MemoryPrimitive {
    fn pd(&self) -> &dyn PrimitiveDesc {
        &*self.pd
    }

    fn inputs(&self) -> &[PrimitiveAt] {
        &self.inputs
    }

    fn outputs(&self) -> &[Weak<dyn Primitive>] {
        &self.outputs
    }

    fn execute(&self, event: &mut Event) {
        complete_execution(event, self.pd(), Instant::now(), Ok(()));
    }

    fn get_data_handle(&self) -> Result<DataHandle> {
        let handle = self
            .handle
            .read()
            .map_err(|_| PrimitiveError::invalid_arguments("memory handle lock is poisoned"))?;
        Ok(handle.clone())
    }

    /// Replace the buffer. The new buffer must hold the descriptor's data type
    /// and at least `numel` elements; otherwise the old handle stays.
    fn set_data_handle(&self, handle: DataHandle) -> Result<()> {
        {
            let storage = handle.read()?;
            let desc = self.pd.desc();
            if storage.dtype() != desc.data_type() || storage.len() < desc.numel() {
                return Err(PrimitiveError::invalid_arguments(format!(
                    "buffer of {} {} elements does not fit {}",
                    storage.len(),
                    storage.dtype(),
                    desc
                )));
            }
        }
        let mut slot = self
            .handle
            .write()
            .map_err(|_| PrimitiveError::invalid_arguments("memory handle lock is poisoned"))?;
        *slot = handle;
        Ok(())
    }
}

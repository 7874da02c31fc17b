use std::fmt;

use crate::dtype::DataType;
use crate::error::{PrimitiveError, Result};
use crate::memory::{MemoryDesc, MemoryFormat};

/// Operator identity of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PrimitiveKind {
    Memory,
    BatchNormalization,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveKind::Memory => write!(f, "memory"),
            PrimitiveKind::BatchNormalization => write!(f, "batch_normalization"),
        }
    }
}

/// Propagation mode of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropKind {
    ForwardTraining,
    ForwardInference,
    /// Gradients with respect to data and weights.
    Backward,
    /// Gradients with respect to data only.
    BackwardData,
}

impl PropKind {
    pub fn is_forward(&self) -> bool {
        matches!(self, PropKind::ForwardTraining | PropKind::ForwardInference)
    }
}

impl fmt::Display for PropKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKind::ForwardTraining => write!(f, "forward_training"),
            PropKind::ForwardInference => write!(f, "forward_inference"),
            PropKind::Backward => write!(f, "backward"),
            PropKind::BackwardData => write!(f, "backward_data"),
        }
    }
}

/// Batch normalization options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BatchNormFlags {
    /// Take mean and variance as inputs instead of computing them.
    pub use_global_stats: bool,
    /// Apply a per-channel scale and shift packed as `[2, C]`.
    pub use_scaleshift: bool,
}

impl fmt::Display for BatchNormFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flags:")?;
        if self.use_global_stats {
            write!(f, "G")?;
        }
        if self.use_scaleshift {
            write!(f, "S")?;
        }
        Ok(())
    }
}

/// Operation description of a batch normalization, before any
/// implementation has looked at it.
///
/// Data is laid out as `[N, C, spatial...]`. The scale/shift descriptor is
/// `[2, C]` and the statistics descriptor `[C]`, both in the data type of the
/// data descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchNormDesc {
    prop_kind: PropKind,
    data_desc: MemoryDesc,
    diff_data_desc: Option<MemoryDesc>,
    data_scaleshift_desc: MemoryDesc,
    diff_data_scaleshift_desc: Option<MemoryDesc>,
    stat_desc: MemoryDesc,
    epsilon: f32,
    flags: BatchNormFlags,
}

impl BatchNormDesc {
    /// Describe a batch normalization without gradient tensors.
    ///
    /// The propagation kind is not checked here; whether it is supported is
    /// up to the implementation.
    ///
    /// # Errors
    /// `InvalidArguments` if the data has fewer than 2 dims or `epsilon` is
    /// negative or not finite.
    pub fn new(
        prop_kind: PropKind,
        data_desc: MemoryDesc,
        epsilon: f32,
        flags: BatchNormFlags,
    ) -> Result<Self> {
        if data_desc.ndims() < 2 {
            return Err(PrimitiveError::invalid_arguments(format!(
                "batch normalization needs [N, C, ...] data, got {:?}",
                data_desc.dims()
            )));
        }
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(PrimitiveError::invalid_arguments(format!(
                "batch normalization epsilon must be finite and >= 0, got {}",
                epsilon
            )));
        }
        let channels = data_desc.dim(1);
        let data_type = data_desc.data_type();
        let data_scaleshift_desc = MemoryDesc::new(&[2, channels], data_type, MemoryFormat::NC)?;
        let stat_desc = MemoryDesc::new(&[channels], data_type, MemoryFormat::X)?;

        Ok(BatchNormDesc {
            prop_kind,
            data_desc,
            diff_data_desc: None,
            data_scaleshift_desc,
            diff_data_scaleshift_desc: None,
            stat_desc,
            epsilon,
            flags,
        })
    }

    /// Describe a batch normalization backward pass.
    ///
    /// # Errors
    /// As [`BatchNormDesc::new`], plus `InvalidArguments` when the gradient
    /// dims differ from the data dims.
    pub fn backward(
        prop_kind: PropKind,
        diff_data_desc: MemoryDesc,
        data_desc: MemoryDesc,
        epsilon: f32,
        flags: BatchNormFlags,
    ) -> Result<Self> {
        if diff_data_desc.dims() != data_desc.dims() {
            return Err(PrimitiveError::invalid_arguments(format!(
                "diff data dims {:?} do not match data dims {:?}",
                diff_data_desc.dims(),
                data_desc.dims()
            )));
        }
        let mut desc = Self::new(prop_kind, data_desc, epsilon, flags)?;
        let channels = desc.channels();
        desc.diff_data_scaleshift_desc = Some(MemoryDesc::new(
            &[2, channels],
            diff_data_desc.data_type(),
            MemoryFormat::NC,
        )?);
        desc.diff_data_desc = Some(diff_data_desc);
        Ok(desc)
    }

    pub fn prop_kind(&self) -> PropKind {
        self.prop_kind
    }

    pub fn data_desc(&self) -> &MemoryDesc {
        &self.data_desc
    }

    pub fn diff_data_desc(&self) -> Option<&MemoryDesc> {
        self.diff_data_desc.as_ref()
    }

    pub fn data_scaleshift_desc(&self) -> &MemoryDesc {
        &self.data_scaleshift_desc
    }

    pub fn diff_data_scaleshift_desc(&self) -> Option<&MemoryDesc> {
        self.diff_data_scaleshift_desc.as_ref()
    }

    pub fn stat_desc(&self) -> &MemoryDesc {
        &self.stat_desc
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn flags(&self) -> BatchNormFlags {
        self.flags
    }

    /// Mini-batch size `N`.
    pub fn batch(&self) -> usize {
        self.data_desc.dim(0)
    }

    /// Channel count `C`.
    pub fn channels(&self) -> usize {
        self.data_desc.dim(1)
    }

    /// Product of the dims after `C` (1 for `[N, C]` data).
    pub fn spatial(&self) -> usize {
        self.data_desc.dims()[2..].iter().product()
    }
}

/// Operation description handed to the registry.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum OpDesc {
    Memory(MemoryDesc),
    BatchNormalization(BatchNormDesc),
}

impl OpDesc {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            OpDesc::Memory(_) => PrimitiveKind::Memory,
            OpDesc::BatchNormalization(_) => PrimitiveKind::BatchNormalization,
        }
    }

    /// Precision the registry dispatches on.
    pub fn data_type(&self) -> DataType {
        match self {
            OpDesc::Memory(d) => d.data_type(),
            OpDesc::BatchNormalization(d) => d.data_desc().data_type(),
        }
    }

    pub fn prop_kind(&self) -> Option<PropKind> {
        match self {
            OpDesc::Memory(_) => None,
            OpDesc::BatchNormalization(d) => Some(d.prop_kind()),
        }
    }
}

impl From<MemoryDesc> for OpDesc {
    fn from(desc: MemoryDesc) -> Self {
        OpDesc::Memory(desc)
    }
}

impl From<BatchNormDesc> for OpDesc {
    fn from(desc: BatchNormDesc) -> Self {
        OpDesc::BatchNormalization(desc)
    }
}

pub mod ref_bwd;
pub mod ref_fwd;

use std::sync::{Arc, Weak};

use prim_core::{
    output_handle, BatchNormDesc, Element, Engine, EngineKind, MemoryDesc, MemoryFormat,
    Primitive, PrimitiveAt, PrimitiveError, Result,
};

pub use ref_bwd::{RefBatchNormBwd, RefBatchNormBwdPd};
pub use ref_fwd::{RefBatchNormFwd, RefBatchNormFwdPd};

/// `[N, C, spatial]` extents of batch normalization data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Geometry {
    pub n: usize,
    pub c: usize,
    pub sp: usize,
}

impl Geometry {
    pub fn of(desc: &BatchNormDesc) -> Self {
        Geometry {
            n: desc.batch(),
            c: desc.channels(),
            sp: desc.spatial(),
        }
    }

    pub fn numel(&self) -> usize {
        self.n * self.c * self.sp
    }

    /// Elements reduced per channel.
    pub fn per_channel(&self) -> usize {
        self.n * self.sp
    }

    pub fn offset(&self, n: usize, c: usize, s: usize) -> usize {
        (n * self.c + c) * self.sp + s
    }
}

/// Layouts the reference kernels can index as `[N, C, spatial]`.
pub(crate) fn is_supported_layout(desc: &MemoryDesc) -> bool {
    matches!(
        desc.format(),
        MemoryFormat::NC | MemoryFormat::NCHW | MemoryFormat::NCDHW
    )
}

pub(crate) fn check_cpu_engine(engine: &Arc<dyn Engine>) -> Result<()> {
    if engine.kind() != EngineKind::Cpu {
        return Err(PrimitiveError::invalid_arguments(format!(
            "cpu implementation bound to a {} engine",
            engine.kind()
        )));
    }
    Ok(())
}

/// Read `len` elements of type `T` from an input, widened to f32.
pub(crate) fn read_input<T: Element>(at: &PrimitiveAt, len: usize, what: &str) -> Result<Vec<f32>> {
    let handle = at.data_handle()?;
    let storage = handle.read()?;
    let data = storage.as_slice::<T>()?;
    if data.len() < len {
        return Err(PrimitiveError::invalid_arguments(format!(
            "{} buffer holds {} elements, needs {}",
            what,
            data.len(),
            len
        )));
    }
    Ok(data[..len].iter().map(|v| v.to_f32()).collect())
}

/// Store f32 values into an output of type `T`.
pub(crate) fn write_output<T: Element>(
    out: &Weak<dyn Primitive>,
    values: &[f32],
    what: &str,
) -> Result<()> {
    let handle = output_handle(out)?;
    let mut storage = handle.write()?;
    let data = storage.as_mut_slice::<T>()?;
    if data.len() < values.len() {
        return Err(PrimitiveError::invalid_arguments(format!(
            "{} buffer holds {} elements, needs {}",
            what,
            data.len(),
            values.len()
        )));
    }
    for (d, &v) in data.iter_mut().zip(values) {
        *d = T::from_f32(v);
    }
    Ok(())
}

/// Per-channel mean and biased variance.
pub(crate) fn channel_stats(src: &[f32], geo: Geometry) -> (Vec<f32>, Vec<f32>) {
    let count = geo.per_channel() as f32;
    let mut mean = vec![0.0f32; geo.c];
    let mut variance = vec![0.0f32; geo.c];

    for c in 0..geo.c {
        let mut sum = 0.0f32;
        for n in 0..geo.n {
            for s in 0..geo.sp {
                sum += src[geo.offset(n, c, s)];
            }
        }
        mean[c] = sum / count;

        let mut sq = 0.0f32;
        for n in 0..geo.n {
            for s in 0..geo.sp {
                let d = src[geo.offset(n, c, s)] - mean[c];
                sq += d * d;
            }
        }
        variance[c] = sq / count;
    }

    (mean, variance)
}

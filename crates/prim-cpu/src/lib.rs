//! `prim-cpu` - host CPU engine and reference kernels for primitive-runtime.

pub mod batch_norm;
pub mod engine;
pub mod registry;

pub use batch_norm::{RefBatchNormBwd, RefBatchNormBwdPd, RefBatchNormFwd, RefBatchNormFwdPd};
pub use engine::{CpuEngine, CpuEngineConfig};
pub use registry::{default_registry, register_cpu_impls};

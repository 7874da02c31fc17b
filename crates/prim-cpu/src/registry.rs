use std::sync::Arc;

use once_cell::sync::Lazy;
use prim_core::{
    BatchNormDesc, DataType, Element, Engine, EngineKind, ImplKey, MemoryPd, OpDesc,
    PrimitiveDesc, PrimitiveError, PrimitiveKind, Registry, Result,
};

use crate::batch_norm::{RefBatchNormBwdPd, RefBatchNormFwdPd};

static DEFAULT_REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::new();
    register_cpu_impls(&mut registry);
    tracing::debug!(registry = ?registry, "cpu implementations registered");
    registry
});

/// Registry holding every CPU implementation of this crate.
pub fn default_registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}

/// Register memory and batch normalization for each supported precision.
pub fn register_cpu_impls(registry: &mut Registry) {
    for dt in [DataType::F32, DataType::F16, DataType::BF16, DataType::S8] {
        registry.register(
            ImplKey::new(PrimitiveKind::Memory, dt, EngineKind::Cpu),
            "memory",
            create_memory_pd,
        );
    }
    register_batch_norm::<f32>(registry);
    register_batch_norm::<half::f16>(registry);
    register_batch_norm::<half::bf16>(registry);
}

fn register_batch_norm<T: Element>(registry: &mut Registry) {
    let key = ImplKey::new(PrimitiveKind::BatchNormalization, T::DATA_TYPE, EngineKind::Cpu);
    registry
        .register(key, "ref:fwd", create_fwd_pd::<T>)
        .register(key, "ref:bwd", create_bwd_pd::<T>);
}

fn create_memory_pd(
    op: &OpDesc,
    engine: &Arc<dyn Engine>,
    _hint: Option<&dyn PrimitiveDesc>,
) -> Result<Arc<dyn PrimitiveDesc>> {
    match op {
        OpDesc::Memory(desc) => Ok(Arc::new(MemoryPd::new(engine.clone(), desc.clone())?)),
        _ => Err(PrimitiveError::unimplemented("not a memory description")),
    }
}

fn batch_norm_desc(op: &OpDesc) -> Result<&BatchNormDesc> {
    match op {
        OpDesc::BatchNormalization(desc) => Ok(desc),
        _ => Err(PrimitiveError::unimplemented(
            "not a batch normalization description",
        )),
    }
}

fn create_fwd_pd<T: Element>(
    op: &OpDesc,
    engine: &Arc<dyn Engine>,
    _hint: Option<&dyn PrimitiveDesc>,
) -> Result<Arc<dyn PrimitiveDesc>> {
    let desc = batch_norm_desc(op)?;
    Ok(Arc::new(RefBatchNormFwdPd::<T>::new(engine.clone(), desc)?))
}

fn create_bwd_pd<T: Element>(
    op: &OpDesc,
    engine: &Arc<dyn Engine>,
    hint: Option<&dyn PrimitiveDesc>,
) -> Result<Arc<dyn PrimitiveDesc>> {
    let desc = batch_norm_desc(op)?;
    Ok(Arc::new(RefBatchNormBwdPd::<T>::new(engine.clone(), desc, hint)?))
}

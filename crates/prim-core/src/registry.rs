use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dtype::DataType;
use crate::engine::{Engine, EngineKind};
use crate::error::{PrimitiveError, Result};
use crate::op_desc::{OpDesc, PrimitiveKind};
use crate::primitive_desc::PrimitiveDesc;

/// Builds a primitive descriptor from an operation description, the engine
/// and an optional hint descriptor (e.g. the forward pass of a backward op).
pub type PdFactory = Arc<
    dyn Fn(&OpDesc, &Arc<dyn Engine>, Option<&dyn PrimitiveDesc>) -> Result<Arc<dyn PrimitiveDesc>>
        + Send
        + Sync,
>;

/// Dispatch key: which operator, at which precision, on which device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImplKey {
    pub kind: PrimitiveKind,
    pub data_type: DataType,
    pub engine_kind: EngineKind,
}

impl ImplKey {
    pub fn new(kind: PrimitiveKind, data_type: DataType, engine_kind: EngineKind) -> Self {
        ImplKey {
            kind,
            data_type,
            engine_kind,
        }
    }
}

impl fmt::Display for ImplKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.data_type, self.engine_kind)
    }
}

struct ImplEntry {
    name: &'static str,
    factory: PdFactory,
}

/// Maps (operator kind, precision, engine kind) to descriptor factories.
///
/// Several implementations may share a key; they are tried in registration
/// order. An implementation answering `Unimplemented` passes the request on
/// to the next one, any other error ends the search.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<ImplKey, Vec<ImplEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an implementation for `key`. Returns self for chained registration.
    pub fn register<F>(&mut self, key: ImplKey, name: &'static str, factory: F) -> &mut Self
    where
        F: Fn(&OpDesc, &Arc<dyn Engine>, Option<&dyn PrimitiveDesc>) -> Result<Arc<dyn PrimitiveDesc>>
            + Send
            + Sync
            + 'static,
    {
        self.entries.entry(key).or_default().push(ImplEntry {
            name,
            factory: Arc::new(factory),
        });
        self
    }

    pub fn contains(&self, key: &ImplKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Names of the implementations registered under `key`, in dispatch
    /// order.
    pub fn implementations(&self, key: &ImplKey) -> Vec<&'static str> {
        self.entries
            .get(key)
            .map(|list| list.iter().map(|e| e.name).collect())
            .unwrap_or_default()
    }

    /// Create the first descriptor that accepts `op_desc` on `engine`.
    ///
    /// # Errors
    /// `Unimplemented` if nothing is registered for the key or every
    /// implementation declined; otherwise the first non-`Unimplemented` error.
    pub fn create_pd(
        &self,
        op_desc: &OpDesc,
        engine: &Arc<dyn Engine>,
        hint: Option<&dyn PrimitiveDesc>,
    ) -> Result<Arc<dyn PrimitiveDesc>> {
        let key = ImplKey::new(op_desc.kind(), op_desc.data_type(), engine.kind());
        let list = self.lookup(&key)?;

        for entry in list {
            match (entry.factory)(op_desc, engine, hint) {
                Ok(pd) => {
                    tracing::debug!(key = %key, implementation = entry.name, "primitive descriptor created");
                    return Ok(pd);
                }
                Err(PrimitiveError::Unimplemented(reason)) => {
                    tracing::debug!(key = %key, implementation = entry.name, %reason, "implementation declined");
                }
                Err(e) => return Err(e),
            }
        }

        Err(PrimitiveError::unimplemented(format!(
            "no implementation of {} accepts this configuration",
            key
        )))
    }

    /// Every descriptor that accepts `op_desc`, in dispatch order.
    ///
    /// # Errors
    /// As [`Registry::create_pd`] when the result would be empty.
    pub fn candidates(
        &self,
        op_desc: &OpDesc,
        engine: &Arc<dyn Engine>,
        hint: Option<&dyn PrimitiveDesc>,
    ) -> Result<Vec<Arc<dyn PrimitiveDesc>>> {
        let key = ImplKey::new(op_desc.kind(), op_desc.data_type(), engine.kind());
        let list = self.lookup(&key)?;

        let mut accepted = Vec::new();
        for entry in list {
            match (entry.factory)(op_desc, engine, hint) {
                Ok(pd) => accepted.push(pd),
                Err(PrimitiveError::Unimplemented(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if accepted.is_empty() {
            return Err(PrimitiveError::unimplemented(format!(
                "no implementation of {} accepts this configuration",
                key
            )));
        }
        Ok(accepted)
    }

    fn lookup(&self, key: &ImplKey) -> Result<&[ImplEntry]> {
        match self.entries.get(key) {
            Some(list) => Ok(list.as_slice()),
            None => {
                tracing::debug!(key = %key, "no implementation registered");
                Err(PrimitiveError::unimplemented(format!(
                    "no implementation registered for {}",
                    key
                )))
            }
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, list) in &self.entries {
            let names: Vec<&str> = list.iter().map(|e| e.name).collect();
            map.entry(&key.to_string(), &names);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::TestEngine;
    use crate::memory::{MemoryDesc, MemoryFormat, MemoryPd};

    fn memory_factory(
        op: &OpDesc,
        engine: &Arc<dyn Engine>,
        _hint: Option<&dyn PrimitiveDesc>,
    ) -> Result<Arc<dyn PrimitiveDesc>> {
        match op {
            OpDesc::Memory(d) => Ok(Arc::new(MemoryPd::new(engine.clone(), d.clone())?)),
            _ => Err(PrimitiveError::invalid_arguments("not a memory op")),
        }
    }

    fn declining(
        _op: &OpDesc,
        _engine: &Arc<dyn Engine>,
        _hint: Option<&dyn PrimitiveDesc>,
    ) -> Result<Arc<dyn PrimitiveDesc>> {
        Err(PrimitiveError::unimplemented("declines everything"))
    }

    fn rejecting(
        _op: &OpDesc,
        _engine: &Arc<dyn Engine>,
        _hint: Option<&dyn PrimitiveDesc>,
    ) -> Result<Arc<dyn PrimitiveDesc>> {
        Err(PrimitiveError::invalid_arguments("bad hint"))
    }

    fn mem_key(dt: DataType) -> ImplKey {
        ImplKey::new(PrimitiveKind::Memory, dt, EngineKind::Cpu)
    }

    fn x_desc(dt: DataType) -> OpDesc {
        OpDesc::Memory(MemoryDesc::new(&[4], dt, MemoryFormat::X).unwrap())
    }

    #[test]
    fn test_lookup_miss_is_unimplemented() {
        let registry = Registry::new();
        let engine = TestEngine::shared();
        let err = registry
            .create_pd(&x_desc(DataType::F32), &engine, None)
            .unwrap_err();
        assert!(matches!(err, PrimitiveError::Unimplemented(_)));
    }

    #[test]
    fn test_dispatch_by_precision_and_engine() {
        let mut registry = Registry::new();
        registry.register(mem_key(DataType::F32), "memory", memory_factory);

        let cpu = TestEngine::shared();
        let pd = registry.create_pd(&x_desc(DataType::F32), &cpu, None).unwrap();
        assert_eq!(pd.kind(), PrimitiveKind::Memory);

        assert!(registry.create_pd(&x_desc(DataType::F16), &cpu, None).is_err());
        let gpu = TestEngine::shared_gpu();
        assert!(registry.create_pd(&x_desc(DataType::F32), &gpu, None).is_err());
    }

    #[test]
    fn test_declining_implementation_falls_through() {
        let mut registry = Registry::new();
        registry
            .register(mem_key(DataType::F32), "declines", declining)
            .register(mem_key(DataType::F32), "memory", memory_factory);
        assert_eq!(
            registry.implementations(&mem_key(DataType::F32)),
            vec!["declines", "memory"]
        );

        let engine = TestEngine::shared();
        let pd = registry.create_pd(&x_desc(DataType::F32), &engine, None).unwrap();
        assert_eq!(pd.impl_name(), "memory");

        let all = registry.candidates(&x_desc(DataType::F32), &engine, None).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_all_declining_is_unimplemented() {
        let mut registry = Registry::new();
        registry.register(mem_key(DataType::F32), "declines", declining);
        let engine = TestEngine::shared();
        let err = registry
            .create_pd(&x_desc(DataType::F32), &engine, None)
            .unwrap_err();
        assert!(matches!(err, PrimitiveError::Unimplemented(_)));
        assert!(registry
            .candidates(&x_desc(DataType::F32), &engine, None)
            .is_err());
    }

    #[test]
    fn test_unimplemented_from_factory_tries_next() {
        let mut registry = Registry::new();
        registry
            .register(mem_key(DataType::F32), "memory", memory_factory)
            .register(mem_key(DataType::F32), "declines", declining);
        let engine = TestEngine::shared();
        let any = OpDesc::Memory(MemoryDesc::new(&[4], DataType::F32, MemoryFormat::Any).unwrap());
        // MemoryPd rejects `Any` with Unimplemented, so the next entry is tried
        let err = registry.create_pd(&any, &engine, None).unwrap_err();
        assert!(matches!(err, PrimitiveError::Unimplemented(_)));
    }

    #[test]
    fn test_other_errors_stop_dispatch() {
        let mut strict = Registry::new();
        strict
            .register(mem_key(DataType::F32), "rejects", rejecting)
            .register(mem_key(DataType::F32), "memory", memory_factory);
        let engine = TestEngine::shared();
        let err = strict
            .create_pd(&x_desc(DataType::F32), &engine, None)
            .unwrap_err();
        assert!(matches!(err, PrimitiveError::InvalidArguments(_)));
    }

    #[test]
    fn test_contains_and_debug() {
        let mut registry = Registry::new();
        registry.register(mem_key(DataType::BF16), "memory", memory_factory);
        assert!(registry.contains(&mem_key(DataType::BF16)));
        assert!(!registry.contains(&mem_key(DataType::F32)));
        assert!(format!("{:?}", registry).contains("memory/bf16/cpu"));
    }
}

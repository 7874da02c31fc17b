use std::fmt::{self, Debug};

use crate::dtype::DataType;
use crate::error::Result;
use crate::memory::{MemoryDesc, MemoryFormat};

/// Device or capability class of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Cpu,
    Gpu,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Cpu => write!(f, "cpu"),
            EngineKind::Gpu => write!(f, "gpu"),
        }
    }
}

/// Execution context that descriptors and primitives are bound to.
///
/// Engines are created outside this crate and shared as `Arc<dyn Engine>`;
/// every descriptor and primitive holds a clone, so an engine outlives
/// everything it backs. Identity is the `Arc` pointer.
pub trait Engine: Send + Sync + Debug {
    /// Returns the device class of this engine.
    fn kind(&self) -> EngineKind;

    /// Index of the device within its kind.
    fn index(&self) -> usize {
        0
    }

    /// Whether primitives should log a summary line per execution.
    fn verbose(&self) -> bool {
        false
    }

    /// Initialize a memory descriptor for buffers living on this engine.
    ///
    /// The default accepts any layout `MemoryDesc::new` accepts.
    fn memory_desc_init(
        &self,
        dims: &[usize],
        data_type: DataType,
        format: MemoryFormat,
    ) -> Result<MemoryDesc> {
        MemoryDesc::new(dims, data_type, format)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;

    /// Minimal engine for exercising the contract without a device crate.
    #[derive(Debug)]
    pub(crate) struct TestEngine {
        pub(crate) kind: EngineKind,
    }

    impl TestEngine {
        pub(crate) fn shared() -> Arc<dyn Engine> {
            Arc::new(TestEngine {
                kind: EngineKind::Cpu,
            })
        }

        pub(crate) fn shared_gpu() -> Arc<dyn Engine> {
            Arc::new(TestEngine {
                kind: EngineKind::Gpu,
            })
        }
    }

    impl Engine for TestEngine {
        fn kind(&self) -> EngineKind {
            self.kind
        }
    }

    #[test]
    fn test_default_memory_desc_init() {
        let engine = TestEngine::shared();
        let d = engine
            .memory_desc_init(&[32], DataType::F32, MemoryFormat::X)
            .unwrap();
        assert_eq!(d.dims(), &[32]);
        assert_eq!(engine.index(), 0);
        assert!(!engine.verbose());
    }

    #[test]
    fn test_engine_kind_display() {
        assert_eq!(EngineKind::Cpu.to_string(), "cpu");
        assert_eq!(TestEngine::shared_gpu().kind(), EngineKind::Gpu);
    }
}

//! `prim-core` - Primitive descriptor / primitive / completion event contract
//! for primitive-runtime.
//!
//! This crate provides:
//! - `PrimitiveDesc`: validated, immutable operator descriptions with derived
//!   memory descriptors
//! - `Primitive`: executable instances wired to their inputs and outputs by
//!   non-owning references
//! - `Event`: the tri-state completion signal written by `execute`
//! - `Engine`: the execution context everything is bound to
//! - `Registry`: capability dispatch over (kind, precision, engine kind)
//! - Memory descriptors, memory primitives and host storage

pub mod dtype;
pub mod engine;
pub mod error;
pub mod event;
pub mod memory;
pub mod op_desc;
pub mod primitive;
pub mod primitive_desc;
pub mod registry;
pub mod storage;

// Re-export primary types at the crate root for convenience.
pub use dtype::{DataType, Element};
pub use engine::{Engine, EngineKind};
pub use error::{PrimitiveError, Result, Status};
pub use event::{Event, EventState};
pub use memory::{MemoryDesc, MemoryFormat, MemoryPd, MemoryPrimitive};
pub use op_desc::{BatchNormDesc, BatchNormFlags, OpDesc, PrimitiveKind, PropKind};
pub use primitive::{check_arguments, complete_execution, output_handle, Primitive, PrimitiveAt};
pub use primitive_desc::PrimitiveDesc;
pub use registry::{ImplKey, PdFactory, Registry};
pub use storage::{CpuStorage, DataHandle};

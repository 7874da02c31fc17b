use std::fmt::Debug;
use std::sync::{Arc, Weak};

use crate::engine::Engine;
use crate::error::Result;
use crate::memory::MemoryPd;
use crate::op_desc::{OpDesc, PrimitiveKind};
use crate::primitive::{Primitive, PrimitiveAt};

/// A validated, immutable description of one operator instance.
///
/// Implementations validate in their constructor and either return a fully
/// built descriptor (all derived memory descriptors computed) or an error;
/// there is no half-initialized state to observe. A descriptor is shared as
/// `Arc<dyn PrimitiveDesc>` and may back any number of primitives on any
/// thread.
pub trait PrimitiveDesc: Send + Sync + Debug {
    /// Engine this descriptor is bound to.
    fn engine(&self) -> &Arc<dyn Engine>;

    fn kind(&self) -> PrimitiveKind;

    /// Name of the implementation, e.g. `"ref:any"`.
    fn impl_name(&self) -> &'static str;

    /// The operation description this descriptor was created from.
    fn op_desc(&self) -> OpDesc;

    /// Auxiliary buffer the implementation needs at execution time, if any.
    fn workspace_pd(&self) -> Option<&MemoryPd> {
        None
    }

    /// Every memory descriptor derived during validation.
    fn derived_pds(&self) -> Vec<&MemoryPd> {
        self.workspace_pd().into_iter().collect()
    }

    /// Minimum number of inputs a primitive needs.
    fn n_inputs(&self) -> usize;

    /// Minimum number of outputs a primitive needs.
    fn n_outputs(&self) -> usize;

    /// One-line summary used in execution logs.
    fn info(&self) -> String {
        format!("{},{},{}", self.kind(), self.impl_name(), self.engine().kind())
    }

    /// Instantiate a primitive bound to this descriptor.
    ///
    /// Performs no computation.
    ///
    /// # Errors
    /// `InvalidArguments` if the inputs or outputs do not fit this
    /// descriptor.
    fn create_primitive(
        self: Arc<Self>,
        inputs: Vec<PrimitiveAt>,
        outputs: Vec<Weak<dyn Primitive>>,
    ) -> Result<Arc<dyn Primitive>>;
}

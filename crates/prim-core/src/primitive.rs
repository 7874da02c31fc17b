use std::fmt::Debug;
use std::sync::{Arc, Weak};
use std::time::Instant;

use crate::engine::Engine;
use crate::error::{PrimitiveError, Result};
use crate::event::{Event, EventState};
use crate::op_desc::PrimitiveKind;
use crate::primitive_desc::PrimitiveDesc;
use crate::storage::DataHandle;

/// Non-owning reference to one output of a producer primitive.
#[derive(Debug, Clone)]
pub struct PrimitiveAt {
    primitive: Weak<dyn Primitive>,
    output_index: usize,
}

impl PrimitiveAt {
    pub fn new(primitive: &Arc<dyn Primitive>, output_index: usize) -> Self {
        PrimitiveAt {
            primitive: Arc::downgrade(primitive),
            output_index,
        }
    }

    /// The producer, if it is still alive.
    pub fn primitive(&self) -> Option<Arc<dyn Primitive>> {
        self.primitive.upgrade()
    }

    pub fn output_index(&self) -> usize {
        self.output_index
    }

    /// Resolve the producer's data handle.
    ///
    /// # Errors
    /// `InvalidArguments` if the producer was dropped or has no data handle.
    pub fn data_handle(&self) -> Result<DataHandle> {
        self.primitive()
            .ok_or_else(|| PrimitiveError::invalid_arguments("input primitive was dropped"))?
            .get_data_handle()
    }
}

impl PartialEq for PrimitiveAt {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.primitive, &other.primitive) && self.output_index == other.output_index
    }
}

impl From<&Arc<dyn Primitive>> for PrimitiveAt {
    fn from(primitive: &Arc<dyn Primitive>) -> Self {
        PrimitiveAt::new(primitive, 0)
    }
}

/// Resolve the data handle of an output reference.
///
/// # Errors
/// `InvalidArguments` if the output was dropped or has no data handle.
pub fn output_handle(output: &Weak<dyn Primitive>) -> Result<DataHandle> {
    output
        .upgrade()
        .ok_or_else(|| PrimitiveError::invalid_arguments("output primitive was dropped"))?
        .get_data_handle()
}

/// Runtime instance of an operator, bound to one descriptor.
///
/// Inputs and outputs are dependency edges for a scheduler to read. They do
/// not own the primitives they point to, and a primitive never checks whether
/// its inputs have been computed.
pub trait Primitive: Send + Sync + Debug {
    fn pd(&self) -> &dyn PrimitiveDesc;

    fn inputs(&self) -> &[PrimitiveAt];

    fn outputs(&self) -> &[Weak<dyn Primitive>];

    /// Run the computation and report the outcome through `event`.
    ///
    /// The event ends up `Ready` on success or `Error` on failure. Depending on
    /// the engine the outcome may be written after this call returns, so a
    /// caller must observe the event before reading outputs.
    fn execute(&self, event: &mut Event);

    fn engine(&self) -> &Arc<dyn Engine> {
        self.pd().engine()
    }

    fn kind(&self) -> PrimitiveKind {
        self.pd().kind()
    }

    /// Only memory primitives carry a buffer.
    fn get_data_handle(&self) -> Result<DataHandle> {
        Err(PrimitiveError::invalid_arguments(format!(
            "{} primitive has no data handle",
            self.kind()
        )))
    }

    /// Only memory primitives carry a buffer.
    fn set_data_handle(&self, _handle: DataHandle) -> Result<()> {
        Err(PrimitiveError::invalid_arguments(format!(
            "{} primitive has no data handle",
            self.kind()
        )))
    }
}

/// Check inputs and outputs against what `pd` requires before a primitive
/// is built.
///
/// # Errors
/// `InvalidArguments` on too few inputs or outputs, or a reference whose
/// primitive was already dropped.
pub fn check_arguments(
    pd: &dyn PrimitiveDesc,
    inputs: &[PrimitiveAt],
    outputs: &[Weak<dyn Primitive>],
) -> Result<()> {
    if inputs.len() < pd.n_inputs() {
        return Err(PrimitiveError::invalid_arguments(format!(
            "{} needs {} inputs, got {}",
            pd.kind(),
            pd.n_inputs(),
            inputs.len()
        )));
    }
    if outputs.len() < pd.n_outputs() {
        return Err(PrimitiveError::invalid_arguments(format!(
            "{} needs {} outputs, got {}",
            pd.kind(),
            pd.n_outputs(),
            outputs.len()
        )));
    }
    if let Some(i) = inputs.iter().position(|at| at.primitive().is_none()) {
        return Err(PrimitiveError::invalid_arguments(format!(
            "{} input {} was dropped",
            pd.kind(),
            i
        )));
    }
    if let Some(i) = outputs.iter().position(|out| out.upgrade().is_none()) {
        return Err(PrimitiveError::invalid_arguments(format!(
            "{} output {} was dropped",
            pd.kind(),
            i
        )));
    }
    Ok(())
}

/// Write the outcome of a synchronous execution into `event` and log it.
pub fn complete_execution(
    event: &mut Event,
    pd: &dyn PrimitiveDesc,
    start: Instant,
    outcome: Result<()>,
) {
    let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;
    match outcome {
        Ok(()) => {
            event.set_state(EventState::Ready);
            tracing::debug!(info = %pd.info(), elapsed_ms, "primitive executed");
            if pd.engine().verbose() {
                tracing::info!("exec,{},{:.4}", pd.info(), elapsed_ms);
            }
        }
        Err(e) => {
            tracing::error!(info = %pd.info(), error = %e, "primitive execution failed");
            event.set_state(EventState::Error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DataType;
    use crate::engine::tests::TestEngine;
    use crate::memory::{MemoryFormat, MemoryPd};
    use crate::op_desc::OpDesc;

    /// Copies its single input buffer into its single output buffer.
    #[derive(Debug)]
    struct CopyPd {
        engine: Arc<dyn Engine>,
        len: usize,
    }

    #[derive(Debug)]
    struct CopyPrimitive {
        pd: Arc<CopyPd>,
        inputs: Vec<PrimitiveAt>,
        outputs: Vec<Weak<dyn Primitive>>,
    }

    impl PrimitiveDesc for CopyPd {
        fn engine(&self) -> &Arc<dyn Engine> {
            &self.engine
        }

        fn kind(&self) -> PrimitiveKind {
            PrimitiveKind::BatchNormalization
        }

        fn impl_name(&self) -> &'static str {
            "test:copy"
        }

        fn op_desc(&self) -> OpDesc {
            OpDesc::Memory(
                crate::memory::MemoryDesc::new(&[self.len], DataType::F32, MemoryFormat::X)
                    .unwrap(),
            )
        }

        fn n_inputs(&self) -> usize {
            1
        }

        fn n_outputs(&self) -> usize {
            1
        }

        fn create_primitive(
            self: Arc<Self>,
            inputs: Vec<PrimitiveAt>,
            outputs: Vec<Weak<dyn Primitive>>,
        ) -> Result<Arc<dyn Primitive>> {
            check_arguments(&*self, &inputs, &outputs)?;
            Ok(Arc::new(CopyPrimitive {
                pd: self,
                inputs,
                outputs,
            }))
        }
    }

    impl CopyPrimitive {
        fn copy(&self) -> Result<()> {
            let src = self.inputs[0].data_handle()?.to_f32_vec::<f32>()?;
            let dst = output_handle(&self.outputs[0])?;
            let mut guard = dst.write()?;
            guard.as_mut_slice::<f32>()?.copy_from_slice(&src);
            Ok(())
        }
    }

    impl Primitive for CopyPrimitive {
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
            complete_execution(event, self.pd(), Instant::now(), self.copy());
        }
    }

    fn memory(engine: &Arc<dyn Engine>, len: usize) -> Arc<dyn Primitive> {
        Arc::new(MemoryPd::init(engine, &[len], DataType::F32, MemoryFormat::X).unwrap())
            .create_primitive(vec![], vec![])
            .unwrap()
    }

    #[test]
    fn test_inputs_outputs_preserved_in_order() {
        let engine = TestEngine::shared();
        let a = memory(&engine, 2);
        let b = memory(&engine, 2);
        let out = memory(&engine, 2);
        let pd = Arc::new(CopyPd {
            engine: engine.clone(),
            len: 2,
        });

        // duplicates and order are kept as given
        let inputs = vec![
            PrimitiveAt::new(&b, 0),
            PrimitiveAt::new(&a, 0),
            PrimitiveAt::new(&b, 0),
        ];
        let outputs = vec![Arc::downgrade(&out), Arc::downgrade(&out)];
        let p = pd.create_primitive(inputs.clone(), outputs.clone()).unwrap();

        assert_eq!(p.inputs(), inputs.as_slice());
        assert_eq!(p.outputs().len(), 2);
        for (got, want) in p.outputs().iter().zip(outputs.iter()) {
            assert!(Weak::ptr_eq(got, want));
        }
        assert_ne!(p.inputs()[0], p.inputs()[1]);
    }

    #[test]
    fn test_default_data_handle_is_invalid() {
        let engine = TestEngine::shared();
        let src = memory(&engine, 2);
        let dst = memory(&engine, 2);
        let p = Arc::new(CopyPd { engine, len: 2 })
            .create_primitive(vec![PrimitiveAt::from(&src)], vec![Arc::downgrade(&dst)])
            .unwrap();

        let err = p.get_data_handle().unwrap_err();
        assert!(matches!(err, PrimitiveError::InvalidArguments(_)));
        let err = p
            .set_data_handle(DataHandle::zeros(DataType::F32, 2))
            .unwrap_err();
        assert!(matches!(err, PrimitiveError::InvalidArguments(_)));
        // nothing else changed
        assert_eq!(p.inputs().len(), 1);
        assert!(p.get_data_handle().is_err());
    }

    #[test]
    fn test_check_arguments_arity_and_liveness() {
        let engine = TestEngine::shared();
        let pd = Arc::new(CopyPd {
            engine: engine.clone(),
            len: 2,
        });
        let dst = memory(&engine, 2);

        let err = pd
            .clone()
            .create_primitive(vec![], vec![Arc::downgrade(&dst)])
            .unwrap_err();
        assert!(matches!(err, PrimitiveError::InvalidArguments(_)));

        let dropped = {
            let tmp = memory(&engine, 2);
            PrimitiveAt::from(&tmp)
        };
        assert!(dropped.primitive().is_none());
        let err = pd
            .create_primitive(vec![dropped], vec![Arc::downgrade(&dst)])
            .unwrap_err();
        assert!(matches!(err, PrimitiveError::InvalidArguments(_)));
    }

    #[test]
    fn test_execute_sets_event() {
        let engine = TestEngine::shared();
        let src = memory(&engine, 2);
        let dst = memory(&engine, 2);
        src.set_data_handle(DataHandle::from_vec(vec![3.0f32, 4.0]))
            .unwrap();
        let p = Arc::new(CopyPd { engine, len: 2 })
            .create_primitive(vec![PrimitiveAt::from(&src)], vec![Arc::downgrade(&dst)])
            .unwrap();

        let mut event = Event::new();
        assert_eq!(event.state(), EventState::NotReady);
        p.execute(&mut event);
        assert_eq!(event.state(), EventState::Ready);
        assert_eq!(
            dst.get_data_handle().unwrap().to_f32_vec::<f32>().unwrap(),
            vec![3.0, 4.0]
        );
    }

    #[test]
    fn test_execute_reports_error_through_event() {
        let engine = TestEngine::shared();
        let src = memory(&engine, 2);
        let dst = memory(&engine, 2);
        let p = Arc::new(CopyPd { engine, len: 2 })
            .create_primitive(vec![PrimitiveAt::from(&src)], vec![Arc::downgrade(&dst)])
            .unwrap();
        drop(dst);

        let mut event = Event::new();
        p.execute(&mut event);
        assert_eq!(event.state(), EventState::Error);
    }
}

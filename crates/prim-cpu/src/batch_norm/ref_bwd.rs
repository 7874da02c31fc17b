use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::time::Instant;

use prim_core::{
    check_arguments, complete_execution, BatchNormDesc, Element, Engine, Event, MemoryPd, OpDesc,
    Primitive, PrimitiveAt, PrimitiveDesc, PrimitiveError, PrimitiveKind, PropKind, Result,
};

use super::{check_cpu_engine, is_supported_layout, read_input, write_output, Geometry};

/// Reference batch normalization backward descriptor for element type `T`.
///
/// When built with a forward hint that derived a workspace, the same
/// workspace layout is adopted and the statistics are read from it instead
/// of separate mean and variance inputs.
#[derive(Debug, Clone)]
pub struct RefBatchNormBwdPd<T: Element> {
    engine: Arc<dyn Engine>,
    desc: BatchNormDesc,
    workspace_pd: Option<MemoryPd>,
    _elem: PhantomData<T>,
}

impl<T: Element> RefBatchNormBwdPd<T> {
    pub const IMPL_NAME: &'static str = "ref:any";

    /// Validate `desc` against this implementation and an optional forward
    /// hint.
    ///
    /// # Errors
    /// - `Unimplemented` for a forward propagation kind, a descriptor without
    ///   gradient tensors, tensors not stored as `T`, or an unsupported layout
    /// - `InvalidArguments` for a non-CPU engine, or a hint that is not a
    ///   batch normalization forward descriptor over the same data, epsilon
    ///   and flags on the same engine
    pub fn new(
        engine: Arc<dyn Engine>,
        desc: &BatchNormDesc,
        hint: Option<&dyn PrimitiveDesc>,
    ) -> Result<Self> {
        check_cpu_engine(&engine)?;

        let prop_kind = desc.prop_kind();
        if !matches!(prop_kind, PropKind::Backward | PropKind::BackwardData) {
            return Err(PrimitiveError::unimplemented(format!(
                "batch normalization backward does not support {}",
                prop_kind
            )));
        }
        let diff_data = match desc.diff_data_desc() {
            Some(dd) => dd,
            None => {
                return Err(PrimitiveError::unimplemented(
                    "batch normalization backward needs gradient descriptors",
                ))
            }
        };
        let types = [desc.data_desc().data_type(), diff_data.data_type()];
        if types.iter().any(|&t| t != T::DATA_TYPE) {
            return Err(PrimitiveError::unimplemented(format!(
                "{} implementation cannot run tensors of types {:?}",
                T::DATA_TYPE,
                types
            )));
        }
        if !is_supported_layout(desc.data_desc()) || !is_supported_layout(diff_data) {
            return Err(PrimitiveError::unimplemented(format!(
                "layouts {} / {} are not supported",
                desc.data_desc().format(),
                diff_data.format()
            )));
        }

        let workspace_pd = match hint {
            Some(hint) => Self::workspace_from_hint(&engine, desc, hint)?,
            None => None,
        };

        tracing::debug!(
            prop_kind = %prop_kind,
            data = %desc.data_desc(),
            workspace = workspace_pd.is_some(),
            "batch normalization backward descriptor created"
        );

        Ok(RefBatchNormBwdPd {
            engine,
            desc: desc.clone(),
            workspace_pd,
            _elem: PhantomData,
        })
    }

    fn workspace_from_hint(
        engine: &Arc<dyn Engine>,
        desc: &BatchNormDesc,
        hint: &dyn PrimitiveDesc,
    ) -> Result<Option<MemoryPd>> {
        let matches = match hint.op_desc() {
            OpDesc::BatchNormalization(fwd) => {
                fwd.prop_kind().is_forward()
                    && fwd.data_desc().dims() == desc.data_desc().dims()
                    && fwd.data_desc().data_type() == T::DATA_TYPE
                    && fwd.epsilon() == desc.epsilon()
                    && fwd.flags() == desc.flags()
            }
            _ => false,
        };
        if !matches {
            return Err(PrimitiveError::invalid_arguments(
                "hint is not a batch normalization forward descriptor over the same data",
            ));
        }
        if !Arc::ptr_eq(hint.engine(), engine) {
            return Err(PrimitiveError::invalid_arguments(
                "hint is bound to a different engine",
            ));
        }
        match hint.workspace_pd() {
            Some(ws) if ws.desc().data_type() != T::DATA_TYPE => {
                Err(PrimitiveError::invalid_arguments(format!(
                    "hint workspace is {}, expected {}",
                    ws.desc().data_type(),
                    T::DATA_TYPE
                )))
            }
            ws => Ok(ws.cloned()),
        }
    }

    pub fn desc(&self) -> &BatchNormDesc {
        &self.desc
    }

    /// Whether gradients of scale and shift are produced.
    pub fn outputs_diff_scaleshift(&self) -> bool {
        self.desc.prop_kind() == PropKind::Backward && self.desc.flags().use_scaleshift
    }
}

impl<T: Element> PrimitiveDesc for RefBatchNormBwdPd<T> {
    fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::BatchNormalization
    }

    fn impl_name(&self) -> &'static str {
        Self::IMPL_NAME
    }

    fn op_desc(&self) -> OpDesc {
        OpDesc::BatchNormalization(self.desc.clone())
    }

    fn workspace_pd(&self) -> Option<&MemoryPd> {
        self.workspace_pd.as_ref()
    }

    /// `src`, `mean` and `variance` unless a workspace is used, `diff_dst`,
    /// `scaleshift` when enabled, then `workspace` when used.
    fn n_inputs(&self) -> usize {
        let stats = if self.workspace_pd.is_some() { 1 } else { 2 };
        2 + stats + usize::from(self.desc.flags().use_scaleshift)
    }

    /// `diff_src`, then `diff_scaleshift` for `Backward` with scale/shift.
    fn n_outputs(&self) -> usize {
        1 + usize::from(self.outputs_diff_scaleshift())
    }

    fn info(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.kind(),
            self.impl_name(),
            self.desc.prop_kind(),
            self.desc.data_desc(),
            self.desc.flags()
        )
    }

    fn create_primitive(
        self: Arc<Self>,
        inputs: Vec<PrimitiveAt>,
        outputs: Vec<Weak<dyn Primitive>>,
    ) -> Result<Arc<dyn Primitive>> {
        check_arguments(&*self, &inputs, &outputs)?;
        Ok(Arc::new(RefBatchNormBwd {
            conf: (*self).clone(),
            inputs,
            outputs,
        }))
    }
}

/// Reference batch normalization backward primitive.
#[derive(Debug)]
pub struct RefBatchNormBwd<T: Element> {
    conf: RefBatchNormBwdPd<T>,
    inputs: Vec<PrimitiveAt>,
    outputs: Vec<Weak<dyn Primitive>>,
}

impl<T: Element> RefBatchNormBwd<T> {
    fn execute_backward(&self) -> Result<()> {
        let desc = self.conf.desc();
        let flags = desc.flags();
        let geo = Geometry::of(desc);

        let src = read_input::<T>(&self.inputs[0], geo.numel(), "src")?;
        let mut next = 1;
        let explicit_stats = if self.conf.workspace_pd().is_none() {
            let mean = read_input::<T>(&self.inputs[1], geo.c, "mean")?;
            let variance = read_input::<T>(&self.inputs[2], geo.c, "variance")?;
            next = 3;
            Some((mean, variance))
        } else {
            None
        };
        let diff_dst = read_input::<T>(&self.inputs[next], geo.numel(), "diff_dst")?;
        next += 1;
        let scaleshift = if flags.use_scaleshift {
            let ss = read_input::<T>(&self.inputs[next], 2 * geo.c, "scaleshift")?;
            next += 1;
            Some(ss)
        } else {
            None
        };
        let (mean, variance) = match explicit_stats {
            Some(stats) => stats,
            None => {
                let mut packed = read_input::<T>(&self.inputs[next], 2 * geo.c, "workspace")?;
                let variance = packed.split_off(geo.c);
                (packed, variance)
            }
        };

        let count = geo.per_channel() as f32;
        let mut diff_src = vec![0.0f32; geo.numel()];
        let mut diff_scaleshift = vec![0.0f32; 2 * geo.c];

        for c in 0..geo.c {
            let inv_std = 1.0 / (variance[c] + desc.epsilon()).sqrt();
            let gamma = scaleshift.as_ref().map_or(1.0, |ss| ss[c]);

            let mut diff_gamma = 0.0f32;
            let mut diff_beta = 0.0f32;
            for n in 0..geo.n {
                for s in 0..geo.sp {
                    let off = geo.offset(n, c, s);
                    diff_gamma += (src[off] - mean[c]) * diff_dst[off];
                    diff_beta += diff_dst[off];
                }
            }
            diff_gamma *= inv_std;
            diff_scaleshift[c] = diff_gamma;
            diff_scaleshift[geo.c + c] = diff_beta;

            for n in 0..geo.n {
                for s in 0..geo.sp {
                    let off = geo.offset(n, c, s);
                    let mut v = diff_dst[off];
                    if !flags.use_global_stats {
                        v -= diff_beta / count
                            + (src[off] - mean[c]) * diff_gamma * inv_std / count;
                    }
                    diff_src[off] = v * gamma * inv_std;
                }
            }
        }

        write_output::<T>(&self.outputs[0], &diff_src, "diff_src")?;
        if self.conf.outputs_diff_scaleshift() {
            write_output::<T>(&self.outputs[1], &diff_scaleshift, "diff_scaleshift")?;
        }
        Ok(())
    }
}

impl<T: Element> Primitive for RefBatchNormBwd<T> {
    fn pd(&self) -> &dyn PrimitiveDesc {
        &self.conf
    }

    fn inputs(&self) -> &[PrimitiveAt] {
        &self.inputs
    }

    fn outputs(&self) -> &[Weak<dyn Primitive>] {
        &self.outputs
    }

    fn execute(&self, event: &mut Event) {
        let start = Instant::now();
        let outcome = self.execute_backward();
        complete_execution(event, &self.conf, start, outcome);
    }
}

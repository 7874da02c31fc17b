use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::time::Instant;

use prim_core::{
    check_arguments, complete_execution, BatchNormDesc, Element, Engine, Event, MemoryFormat,
    MemoryPd, OpDesc, Primitive, PrimitiveAt, PrimitiveDesc, PrimitiveError, PrimitiveKind,
    PropKind, Result,
};

use super::{channel_stats, check_cpu_engine, is_supported_layout, read_input, write_output, Geometry};

/// Reference batch normalization forward descriptor for element type `T`.
///
/// Training derives a workspace of `2 * C` elements holding the batch mean
/// followed by the batch variance.
#[derive(Debug, Clone)]
pub struct RefBatchNormFwdPd<T: Element> {
    engine: Arc<dyn Engine>,
    desc: BatchNormDesc,
    workspace_pd: Option<MemoryPd>,
    _elem: PhantomData<T>,
}

impl<T: Element> RefBatchNormFwdPd<T> {
    pub const IMPL_NAME: &'static str = "ref:any";

    /// Validate `desc` and derive the workspace layout.
    ///
    /// # Errors
    /// - `Unimplemented` for a non-forward propagation kind, tensors not
    ///   stored as `T`, or a layout other than `nc`/`nchw`/`ncdhw`
    /// - `InvalidArguments` when `engine` is not a CPU engine
    pub fn new(engine: Arc<dyn Engine>, desc: &BatchNormDesc) -> Result<Self> {
        check_cpu_engine(&engine)?;

        let prop_kind = desc.prop_kind();
        if !matches!(prop_kind, PropKind::ForwardTraining | PropKind::ForwardInference) {
            return Err(PrimitiveError::unimplemented(format!(
                "batch normalization forward does not support {}",
                prop_kind
            )));
        }
        let data_type = desc.data_desc().data_type();
        if data_type != T::DATA_TYPE {
            return Err(PrimitiveError::unimplemented(format!(
                "{} implementation cannot run {} data",
                T::DATA_TYPE,
                data_type
            )));
        }
        if !is_supported_layout(desc.data_desc()) {
            return Err(PrimitiveError::unimplemented(format!(
                "layout {} is not supported",
                desc.data_desc().format()
            )));
        }

        let workspace_pd = if prop_kind == PropKind::ForwardTraining {
            let len = desc.channels().checked_mul(2).ok_or_else(|| {
                PrimitiveError::invalid_arguments(format!(
                    "workspace for {} channels overflows",
                    desc.channels()
                ))
            })?;
            Some(MemoryPd::init(&engine, &[len], T::DATA_TYPE, MemoryFormat::X)?)
        } else {
            None
        };

        tracing::debug!(
            prop_kind = %prop_kind,
            data = %desc.data_desc(),
            workspace = workspace_pd.is_some(),
            "batch normalization forward descriptor created"
        );

        Ok(RefBatchNormFwdPd {
            engine,
            desc: desc.clone(),
            workspace_pd,
            _elem: PhantomData,
        })
    }

    pub fn desc(&self) -> &BatchNormDesc {
        &self.desc
    }

    pub fn is_training(&self) -> bool {
        self.desc.prop_kind() == PropKind::ForwardTraining
    }

    /// Whether the batch mean and variance are written to outputs.
    pub fn outputs_stats(&self) -> bool {
        self.is_training() && !self.desc.flags().use_global_stats
    }
}

impl<T: Element> PrimitiveDesc for RefBatchNormFwdPd<T> {
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

    /// `src`, then `mean` and `variance` with global stats, then
    /// `scaleshift` when enabled.
    fn n_inputs(&self) -> usize {
        let flags = self.desc.flags();
        1 + 2 * usize::from(flags.use_global_stats) + usize::from(flags.use_scaleshift)
    }

    /// `dst`. Optional trailing outputs: `mean` and `variance` when
    /// statistics are computed in training, then `workspace` in training.
    fn n_outputs(&self) -> usize {
        1
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
        Ok(Arc::new(RefBatchNormFwd {
            conf: (*self).clone(),
            inputs,
            outputs,
        }))
    }
}

/// Reference batch normalization forward primitive.
#[derive(Debug)]
pub struct RefBatchNormFwd<T: Element> {
    conf: RefBatchNormFwdPd<T>,
    inputs: Vec<PrimitiveAt>,
    outputs: Vec<Weak<dyn Primitive>>,
}

impl<T: Element> RefBatchNormFwd<T> {
    fn execute_forward(&self) -> Result<()> {
        let desc = self.conf.desc();
        let flags = desc.flags();
        let geo = Geometry::of(desc);

        let src = read_input::<T>(&self.inputs[0], geo.numel(), "src")?;
        let (mean, variance) = if flags.use_global_stats {
            (
                read_input::<T>(&self.inputs[1], geo.c, "mean")?,
                read_input::<T>(&self.inputs[2], geo.c, "variance")?,
            )
        } else {
            channel_stats(&src, geo)
        };
        let scaleshift = if flags.use_scaleshift {
            let idx = if flags.use_global_stats { 3 } else { 1 };
            Some(read_input::<T>(&self.inputs[idx], 2 * geo.c, "scaleshift")?)
        } else {
            None
        };

        let mut dst = vec![0.0f32; geo.numel()];
        for c in 0..geo.c {
            let inv_std = 1.0 / (variance[c] + desc.epsilon()).sqrt();
            let (gamma, beta) = match &scaleshift {
                Some(ss) => (ss[c], ss[geo.c + c]),
                None => (1.0, 0.0),
            };
            for n in 0..geo.n {
                for s in 0..geo.sp {
                    let off = geo.offset(n, c, s);
                    dst[off] = gamma * (src[off] - mean[c]) * inv_std + beta;
                }
            }
        }
        write_output::<T>(&self.outputs[0], &dst, "dst")?;

        let mut slot = 1;
        if self.conf.outputs_stats() {
            if let Some(out) = self.outputs.get(1) {
                write_output::<T>(out, &mean, "mean")?;
            }
            if let Some(out) = self.outputs.get(2) {
                write_output::<T>(out, &variance, "variance")?;
            }
            slot = 3;
        }
        if self.conf.is_training() {
            if let Some(out) = self.outputs.get(slot) {
                let packed: Vec<f32> = mean.iter().chain(variance.iter()).copied().collect();
                write_output::<T>(out, &packed, "workspace")?;
            }
        }
        Ok(())
    }
}

impl<T: Element> Primitive for RefBatchNormFwd<T> {
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
        let outcome = self.execute_forward();
        complete_execution(event, &self.conf, start, outcome);
    }
}

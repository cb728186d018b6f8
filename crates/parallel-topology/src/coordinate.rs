use serde::{Deserialize, Serialize};

use crate::{ParallelDegrees, ParallelDim, TopologyError};

/// Position of one device in the six-dimensional parallelism mesh.
///
/// A coordinate is derived from a linear device index and a [`ParallelDegrees`] with
/// [`decompose`]; it is never stored alongside the configuration and must be recomputed
/// whenever the degrees change.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCoordinate {
    /// Slot inside the shared tensor / expert communication group.
    pub tp_ep_idx: usize,
    /// Tensor parallel rank.
    pub tp_idx: usize,
    /// Expert parallel rank.
    pub ep_idx: usize,
    /// Shard index inside one expert, in `[0, actual_etp)`.
    pub etp_idx: usize,
    /// Context parallel rank.
    pub cp_idx: usize,
    /// Data parallel rank.
    pub dp_idx: usize,
    /// Pipeline stage.
    pub pp_idx: usize,
    /// Expert-tensor degree in effect, explicit or inherited from TP.
    pub actual_etp: usize,
}

impl DeviceCoordinate {
    /// Index of this device along `dim`.
    ///
    /// For [`ParallelDim::Etp`] this is the shard index inside the expert, whose range is
    /// [`actual_etp`](Self::actual_etp) rather than the configured ETP degree.
    pub fn index(&self, dim: ParallelDim) -> usize {
        match dim {
            ParallelDim::Dp => self.dp_idx,
            ParallelDim::Tp => self.tp_idx,
            ParallelDim::Pp => self.pp_idx,
            ParallelDim::Cp => self.cp_idx,
            ParallelDim::Ep => self.ep_idx,
            ParallelDim::Etp => self.etp_idx,
        }
    }

    /// Recomposes the linear device index this coordinate was decomposed from.
    pub fn linear_index(&self, degrees: &ParallelDegrees) -> usize {
        let group = degrees.tensor_expert_group_size();
        ((self.pp_idx * degrees.dp + self.dp_idx) * degrees.cp + self.cp_idx) * group
            + self.tp_ep_idx
    }

    /// Whether this device runs the first pipeline stage, which holds the embedding.
    pub fn is_first_stage(&self) -> bool {
        self.pp_idx == 0
    }

    /// Whether this device runs the last pipeline stage, which holds the LM head.
    pub fn is_last_stage(&self, degrees: &ParallelDegrees) -> bool {
        self.pp_idx + 1 == degrees.pp
    }
}

/// Where the expert-tensor split of a configuration comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpertTensorSource {
    /// ETP was set explicitly (`etp > 1`).
    Explicit,
    /// ETP was left at one; the TP fan-out not used by EP is absorbed instead.
    Inherited,
}

/// Returns how the expert-tensor degree of `degrees` is obtained.
pub fn expert_tensor_source(degrees: &ParallelDegrees) -> ExpertTensorSource {
    if degrees.etp > 1 {
        ExpertTensorSource::Explicit
    } else {
        ExpertTensorSource::Inherited
    }
}

/// Expert-tensor degree in effect for the expert layers.
///
/// An explicit `etp > 1` wins. Otherwise the tensor fan-out not consumed by expert
/// parallelism, `tp / ep`, is reinterpreted as expert-tensor fan-out, clamped to one.
/// With `tp < ep` every pair collapses to one.
pub fn expert_tensor_degree(degrees: &ParallelDegrees) -> usize {
    match expert_tensor_source(degrees) {
        ExpertTensorSource::Explicit => degrees.etp,
        ExpertTensorSource::Inherited => (degrees.tp / degrees.ep).max(1),
    }
}

/// Fallible variant of [`decompose`].
///
/// # Returns
/// [`TopologyError::InvalidDegree`] if a degree is zero, [`TopologyError::DeviceOutOfRange`]
/// if `index` is not below the device count of `degrees`.
pub fn try_decompose(
    index: usize,
    degrees: &ParallelDegrees,
) -> Result<DeviceCoordinate, TopologyError> {
    degrees.validate()?;

    let total = degrees.total_device_count();
    if index >= total {
        return Err(TopologyError::DeviceOutOfRange { index, total });
    }

    // Mixed radix, fastest axis first: tensor/expert group, context, data, pipeline.
    let group = degrees.tensor_expert_group_size();
    let mut rem = index;
    let tp_ep_idx = rem % group;
    rem /= group;
    let cp_idx = rem % degrees.cp;
    rem /= degrees.cp;
    let dp_idx = rem % degrees.dp;
    rem /= degrees.dp;
    let pp_idx = rem % degrees.pp;

    let actual_etp = expert_tensor_degree(degrees);

    Ok(DeviceCoordinate {
        tp_ep_idx,
        tp_idx: tp_ep_idx % degrees.tp,
        ep_idx: (tp_ep_idx / actual_etp) % degrees.ep,
        etp_idx: tp_ep_idx % actual_etp,
        cp_idx,
        dp_idx,
        pp_idx,
        actual_etp,
    })
}

/// Maps a linear device index to its coordinate in the parallelism mesh.
///
/// The mapping is a bijection between `[0, total)` and
/// `[0, pp) x [0, dp) x [0, cp) x [0, max(tp, ep * etp))`, with the pipeline stage
/// varying slowest and the tensor/expert group slot fastest.
///
/// # Panics
/// If a degree is zero or `index` is not below `degrees.total_device_count()`. Both are
/// caller bugs; use [`try_decompose`] to handle them as errors.
pub fn decompose(index: usize, degrees: &ParallelDegrees) -> DeviceCoordinate {
    match try_decompose(index, degrees) {
        Ok(coordinate) => coordinate,
        Err(err) => panic!("{err}"),
    }
}

/// Coordinates of every device of `degrees`, in linear index order.
pub fn coordinates(degrees: ParallelDegrees) -> impl Iterator<Item = DeviceCoordinate> {
    (0..degrees.total_device_count()).map(move |index| decompose(index, &degrees))
}

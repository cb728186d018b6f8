use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::TopologyError;

/// A parallelism dimension of the cluster.
///
/// Variants iterate in the order the controls present them, and display as
/// their lowercase short id (`"dp"`, `"tp"`, ...).
#[derive(
    Clone,
    Copy,
    Debug,
    Hash,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ParallelDim {
    /// Data parallel: replicate the model, split the batch.
    Dp,
    /// Tensor parallel: split individual weight matrices.
    Tp,
    /// Pipeline parallel: split the layers into relay stages.
    Pp,
    /// Context parallel: split the sequence length.
    Cp,
    /// Expert parallel: place different experts on different devices.
    Ep,
    /// Expert-tensor parallel: split the weights inside one expert.
    Etp,
}

impl ParallelDim {
    /// Human-readable name of the strategy.
    pub fn name(&self) -> &'static str {
        match self {
            ParallelDim::Dp => "Data Parallel (DP)",
            ParallelDim::Tp => "Tensor Parallel (TP)",
            ParallelDim::Pp => "Pipeline Parallel (PP)",
            ParallelDim::Cp => "Context Parallel (CP)",
            ParallelDim::Ep => "Expert Parallel (EP)",
            ParallelDim::Etp => "Expert-Tensor Parallel (ETP)",
        }
    }

    /// One-line description of what the strategy splits.
    pub fn description(&self) -> &'static str {
        match self {
            ParallelDim::Dp => {
                "Replicates the model and splits the batch. The basic way to scale throughput."
            }
            ParallelDim::Tp => {
                "Splits the base weight matrices. Communication heavy, usually kept inside one NVLink node."
            }
            ParallelDim::Pp => {
                "Splits the model by layers. Devices relay activations; the first stage holds the embedding, the last the LM head."
            }
            ParallelDim::Cp => {
                "Splits very long sequences. Keeps long-context activations within a single device's memory."
            }
            ParallelDim::Ep => {
                "MoE only. Different devices own different experts, sharing the TP communication group."
            }
            ParallelDim::Etp => {
                "MoE only. Splits the weights inside each expert, usually combined with EP."
            }
        }
    }
}

/// How many ways each parallelism dimension is split.
///
/// Every field must be at least one; a degree of one means the dimension is not split.
/// Degrees are plain values: build a candidate with [`with`](Self::with), check it, then
/// commit it.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelDegrees {
    /// Data parallel degree.
    pub dp: usize,
    /// Tensor parallel degree.
    pub tp: usize,
    /// Pipeline parallel degree.
    pub pp: usize,
    /// Context parallel degree.
    pub cp: usize,
    /// Expert parallel degree.
    pub ep: usize,
    /// Expert-tensor parallel degree. One means "not configured".
    pub etp: usize,
}

impl Default for ParallelDegrees {
    fn default() -> Self {
        Self::ONES
    }
}

impl ParallelDegrees {
    /// Nothing split: a single device.
    pub const ONES: Self = Self {
        dp: 1,
        tp: 1,
        pp: 1,
        cp: 1,
        ep: 1,
        etp: 1,
    };

    /// Returns the degree of `dim`.
    pub fn get(&self, dim: ParallelDim) -> usize {
        match dim {
            ParallelDim::Dp => self.dp,
            ParallelDim::Tp => self.tp,
            ParallelDim::Pp => self.pp,
            ParallelDim::Cp => self.cp,
            ParallelDim::Ep => self.ep,
            ParallelDim::Etp => self.etp,
        }
    }

    /// Sets the degree of `dim` in place, without any admissibility check.
    pub fn set(&mut self, dim: ParallelDim, value: usize) {
        let field = match dim {
            ParallelDim::Dp => &mut self.dp,
            ParallelDim::Tp => &mut self.tp,
            ParallelDim::Pp => &mut self.pp,
            ParallelDim::Cp => &mut self.cp,
            ParallelDim::Ep => &mut self.ep,
            ParallelDim::Etp => &mut self.etp,
        };
        *field = value;
    }

    /// Returns a candidate copy with one dimension replaced.
    pub fn with(mut self, dim: ParallelDim, value: usize) -> Self {
        self.set(dim, value);
        self
    }

    /// Checks that every degree is at least one.
    pub fn validate(&self) -> Result<(), TopologyError> {
        use strum::IntoEnumIterator;

        match ParallelDim::iter().find(|&dim| self.get(dim) == 0) {
            Some(dim) => Err(TopologyError::InvalidDegree { dim, value: 0 }),
            None => Ok(()),
        }
    }

    /// Size of the shared tensor / expert communication domain, `max(tp, ep * etp)`.
    ///
    /// TP and EP x ETP reuse the same physical group, so the group is as wide as the
    /// larger of the two ways of using it.
    pub fn tensor_expert_group_size(&self) -> usize {
        self.tp.max(self.ep.saturating_mul(self.etp))
    }

    /// Devices needed by this configuration, or `None` if the product overflows.
    pub fn checked_total_device_count(&self) -> Option<usize> {
        self.dp
            .checked_mul(self.pp)?
            .checked_mul(self.cp)?
            .checked_mul(self.tp.max(self.ep.checked_mul(self.etp)?))
    }

    /// Devices needed by this configuration, `dp * pp * cp * max(tp, ep * etp)`.
    ///
    /// Saturates at `usize::MAX`, which no budget admits.
    pub fn total_device_count(&self) -> usize {
        self.checked_total_device_count().unwrap_or(usize::MAX)
    }
}

/// Devices needed by `degrees`. See [`ParallelDegrees::total_device_count`].
pub fn total_device_count(degrees: &ParallelDegrees) -> usize {
    degrees.total_device_count()
}

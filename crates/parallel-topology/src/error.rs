use crate::ParallelDim;

/// Represents errors that can occur when building, mutating or querying a topology.
///
/// A rejected mutation through [`Topology::set_degree`](crate::Topology::set_degree) is not
/// an error; only the fallible `try_*` entry points surface these variants.
#[derive(thiserror::Error, Debug)]
pub enum TopologyError {
    /// A parallelism degree was smaller than one.
    #[error("degree of {dim} must be >= 1, got {value}")]
    InvalidDegree {
        /// The offending dimension.
        dim: ParallelDim,
        /// The rejected value.
        value: usize,
    },
    /// The configuration needs more devices than the budget allows.
    #[error("configuration needs {total} devices, budget is {budget}")]
    BudgetExceeded {
        /// Devices the candidate would occupy, saturated at `usize::MAX` on overflow.
        total: usize,
        /// The device budget.
        budget: usize,
    },
    /// A linear device index outside `[0, total)`.
    #[error("device index {index} out of range for {total} devices")]
    DeviceOutOfRange {
        /// The requested index.
        index: usize,
        /// Devices in the current configuration.
        total: usize,
    },
    /// A value the controls do not offer for this dimension.
    #[error("{value} is not a selectable degree for {dim}")]
    UnselectableDegree {
        /// The offending dimension.
        dim: ParallelDim,
        /// The rejected value.
        value: usize,
    },
    /// The number of device handles doesn't match the configuration.
    #[error("device count ({actual}) doesn't match mesh size {expected}")]
    DeviceCountMismatch {
        /// Devices required by the degrees.
        expected: usize,
        /// Devices supplied.
        actual: usize,
    },
    /// The topology configuration is invalid.
    #[error("invalid topology config: {0}")]
    InvalidConfig(String),
    /// The configuration text could not be parsed.
    #[error("failed to parse topology config")]
    Json(#[from] serde_json::Error),
}

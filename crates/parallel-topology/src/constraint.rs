use crate::{ParallelDegrees, TopologyError};

/// Number of device slots the simulated cluster offers.
pub const DEFAULT_DEVICE_BUDGET: usize = 16;

/// Returns `true` if `candidate` fits in `budget` devices.
///
/// The candidate needs `dp * pp * cp * max(tp, ep * etp)` devices. Degrees must all be
/// at least one; that is the caller's contract and is not checked here. Use
/// [`check_admissible`] for a validating variant.
pub fn is_admissible(candidate: &ParallelDegrees, budget: usize) -> bool {
    candidate
        .checked_total_device_count()
        .is_some_and(|total| total <= budget)
}

/// Validating variant of [`is_admissible`].
///
/// # Returns
/// The device count of `candidate` if it is well formed and fits in `budget`, otherwise
/// [`TopologyError::InvalidDegree`] or [`TopologyError::BudgetExceeded`].
pub fn check_admissible(
    candidate: &ParallelDegrees,
    budget: usize,
) -> Result<usize, TopologyError> {
    candidate.validate()?;

    let total = candidate.total_device_count();
    if total > budget {
        return Err(TopologyError::BudgetExceeded { total, budget });
    }

    Ok(total)
}

/// Device slots left unused by `degrees`, zero when the budget is exhausted or exceeded.
pub fn free_slots(degrees: &ParallelDegrees, budget: usize) -> usize {
    budget.saturating_sub(degrees.total_device_count())
}

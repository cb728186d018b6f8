use serde::{Deserialize, Serialize};

use crate::{
    DEFAULT_DEVICE_BUDGET, DeviceCoordinate, DeviceMesh, DeviceMeshBuilder, ParallelDegrees,
    ParallelDim, TopologyError, check_admissible, coordinates, decompose, expert_tensor_degree,
    free_slots, is_admissible, try_decompose,
};

/// Static settings of a [`Topology`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Maximum number of devices a configuration may occupy.
    #[serde(default = "default_budget")]
    pub budget: usize,
    /// Degree values the controls offer for every dimension.
    #[serde(default = "default_selectable_degrees")]
    pub selectable_degrees: Vec<usize>,
}

fn default_budget() -> usize {
    DEFAULT_DEVICE_BUDGET
}

fn default_selectable_degrees() -> Vec<usize> {
    vec![1, 2, 4]
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            selectable_degrees: default_selectable_degrees(),
        }
    }
}

impl TopologyConfig {
    /// Parses a config from JSON text. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, TopologyError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the budget is positive and that every selectable degree is positive,
    /// including one so that a reset configuration stays selectable.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.budget == 0 {
            return Err(TopologyError::InvalidConfig(
                "budget must be at least one device".into(),
            ));
        }
        if self.selectable_degrees.contains(&0) {
            return Err(TopologyError::InvalidConfig(
                "selectable degrees must be >= 1".into(),
            ));
        }
        if !self.selectable_degrees.contains(&1) {
            return Err(TopologyError::InvalidConfig(
                "selectable degrees must include 1".into(),
            ));
        }
        Ok(())
    }
}

/// How one selectable degree value of a dimension is presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionState {
    /// The value currently in effect.
    Selected,
    /// Choosing the value would keep the configuration within budget.
    Available,
    /// Choosing the value would exceed the budget.
    Disabled,
}

/// The live parallelism configuration and the device currently being inspected.
///
/// Every mutation goes through the budget check; a rejected mutation leaves the state
/// unchanged.
#[derive(Clone, Debug)]
pub struct Topology {
    config: TopologyConfig,
    degrees: ParallelDegrees,
    inspected: Option<usize>,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            config: TopologyConfig::default(),
            degrees: ParallelDegrees::ONES,
            inspected: None,
        }
    }
}

impl Topology {
    /// Creates a single-device topology with the given config.
    pub fn new(config: TopologyConfig) -> Result<Self, TopologyError> {
        config.validate()?;

        Ok(Self {
            config,
            degrees: ParallelDegrees::ONES,
            inspected: None,
        })
    }

    /// The live degrees.
    pub fn degrees(&self) -> &ParallelDegrees {
        &self.degrees
    }

    /// The static settings.
    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// The device budget.
    pub fn budget(&self) -> usize {
        self.config.budget
    }

    /// Sets the degree of `dim` if the resulting configuration fits the budget.
    ///
    /// # Returns
    /// `true` if the change was applied. On `false` the state is unchanged.
    pub fn set_degree(&mut self, dim: ParallelDim, value: usize) -> bool {
        self.try_set_degree(dim, value).is_ok()
    }

    /// Like [`set_degree`](Self::set_degree), reporting why a change was rejected.
    pub fn try_set_degree(&mut self, dim: ParallelDim, value: usize) -> Result<(), TopologyError> {
        let candidate = self.degrees.with(dim, value);

        let total = match check_admissible(&candidate, self.config.budget) {
            Ok(total) => total,
            Err(err) => {
                log::debug!("Rejected {dim}={value}: {err}");
                return Err(err);
            }
        };

        self.degrees = candidate;
        if self.inspected.is_some_and(|index| index >= total) {
            self.inspected = None;
        }
        log::debug!("Set {dim}={value}, {total} devices in use");

        Ok(())
    }

    /// Applies a value picked from the controls.
    ///
    /// Values outside [`TopologyConfig::selectable_degrees`] are rejected with
    /// [`TopologyError::UnselectableDegree`] before the budget is checked.
    pub fn select(&mut self, dim: ParallelDim, value: usize) -> Result<(), TopologyError> {
        if !self.config.selectable_degrees.contains(&value) {
            log::debug!("Rejected {dim}={value}: not a selectable degree");
            return Err(TopologyError::UnselectableDegree { dim, value });
        }
        self.try_set_degree(dim, value)
    }

    /// Puts every degree back to one and clears the inspected device.
    pub fn reset(&mut self) {
        self.degrees = ParallelDegrees::ONES;
        self.inspected = None;
        log::debug!("Reset topology to a single device");
    }

    /// Devices used by the live configuration.
    pub fn total_device_count(&self) -> usize {
        self.degrees.total_device_count()
    }

    /// Device slots not used by the live configuration.
    pub fn free_slots(&self) -> usize {
        free_slots(&self.degrees, self.config.budget)
    }

    /// Whether every device slot is in use.
    pub fn is_at_capacity(&self) -> bool {
        self.total_device_count() == self.config.budget
    }

    /// Presentation state of `value` for `dim`.
    ///
    /// A value is disabled when it is not the current one and the configuration with it
    /// would not fit the budget.
    pub fn option_state(&self, dim: ParallelDim, value: usize) -> OptionState {
        if self.degrees.get(dim) == value {
            return OptionState::Selected;
        }

        let candidate = self.degrees.with(dim, value);
        if value >= 1 && is_admissible(&candidate, self.config.budget) {
            OptionState::Available
        } else {
            OptionState::Disabled
        }
    }

    /// Presentation state of every selectable value of `dim`, in configured order.
    pub fn options(&self, dim: ParallelDim) -> Vec<(usize, OptionState)> {
        self.config
            .selectable_degrees
            .iter()
            .map(|&value| (value, self.option_state(dim, value)))
            .collect()
    }

    /// Marks device `index` as the one being inspected.
    pub fn inspect(&mut self, index: usize) -> Result<(), TopologyError> {
        let total = self.total_device_count();
        if index >= total {
            return Err(TopologyError::DeviceOutOfRange { index, total });
        }

        self.inspected = Some(index);
        log::debug!("Inspecting device {index}");
        Ok(())
    }

    /// Clears the inspected device.
    pub fn clear_inspection(&mut self) {
        if let Some(index) = self.inspected.take() {
            log::debug!("Stopped inspecting device {index}");
        }
    }

    /// The inspected device, if any.
    pub fn inspected(&self) -> Option<usize> {
        self.inspected
    }

    /// Coordinate of the inspected device, if any.
    pub fn inspected_coordinate(&self) -> Option<DeviceCoordinate> {
        self.inspected.map(|index| decompose(index, &self.degrees))
    }

    /// Coordinate of device `index` in the live configuration.
    pub fn coordinate(&self, index: usize) -> Result<DeviceCoordinate, TopologyError> {
        try_decompose(index, &self.degrees)
    }

    /// Coordinates of every device of the live configuration.
    pub fn coordinates(&self) -> impl Iterator<Item = DeviceCoordinate> + use<> {
        coordinates(self.degrees)
    }

    /// Expert-tensor degree the expert layers are split by.
    pub fn expert_tensor_degree(&self) -> usize {
        expert_tensor_degree(&self.degrees)
    }

    /// The live configuration as a mesh of linear device indices.
    pub fn mesh(&self) -> Result<DeviceMesh<usize>, TopologyError> {
        DeviceMeshBuilder::new((0..self.total_device_count()).collect(), self.degrees)
            .with_budget(self.config.budget)
            .build()
    }

    /// Communication group of device `index` along `dim`, by linear index.
    pub fn group(&self, index: usize, dim: ParallelDim) -> Result<Vec<usize>, TopologyError> {
        self.mesh()?.group(index, dim)
    }
}

//! Physical device mesh of a parallelism configuration and its communication groups.

use hashbrown::HashMap;

use crate::{
    DeviceCoordinate, ParallelDegrees, ParallelDim, TopologyError, check_admissible,
    expert_tensor_degree, try_decompose,
};

/// Represents a physical axis of the device mesh, identified by a unique name.
///
/// Six parallelism dimensions fold onto four physical axes: tensor, expert and
/// expert-tensor parallelism share the innermost `tp_ep` axis.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct MeshDim {
    /// A name that uniquely identifies the mesh axis.
    name: String,
}

impl MeshDim {
    /// Constructs a new [`MeshDim`] with the given name.
    pub fn new<S: Into<String>>(name: S) -> Self {
        MeshDim { name: name.into() }
    }

    /// The axis name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Axis names of the mesh, outermost (slowest varying) first.
pub const MESH_AXES: [&str; 4] = ["pp", "dp", "cp", "tp_ep"];

/// Device handles arranged by a parallelism configuration.
///
/// The mesh has shape `[pp, dp, cp, max(tp, ep * etp)]`; the linear position of a device
/// in `devices` is its index for [`decompose`](crate::decompose).
#[derive(Clone, Debug)]
pub struct DeviceMesh<T> {
    /// Physical devices in linear index order.
    devices: Vec<T>,
    /// Shape of the physical mesh.
    shape: Vec<usize>,
    /// Maps axis names to their indices in the mesh.
    dims: HashMap<MeshDim, usize>,
    /// Degrees the mesh was built from.
    degrees: ParallelDegrees,
}

/// A builder for constructing a [`DeviceMesh`].
#[derive(Clone, Debug)]
pub struct DeviceMeshBuilder<T> {
    /// Physical devices in linear index order.
    devices: Vec<T>,
    /// Degrees the mesh is built from.
    degrees: ParallelDegrees,
    /// Optional device budget the configuration must fit.
    budget: Option<usize>,
}

impl<T> DeviceMeshBuilder<T> {
    /// Creates a new [`DeviceMeshBuilder`] with the given devices and degrees.
    ///
    /// # Arguments
    /// * `devices` - Device handles, one per linear index.
    /// * `degrees` - The parallelism configuration to arrange them by.
    pub fn new(devices: Vec<T>, degrees: ParallelDegrees) -> Self {
        Self {
            devices,
            degrees,
            budget: None,
        }
    }

    /// Requires the configuration to fit in `budget` devices.
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Builds a [`DeviceMesh`] from the current configuration.
    ///
    /// # Returns
    /// A `DeviceMesh` if the degrees are valid, fit the budget (when one is set) and the
    /// number of devices matches, or a [`TopologyError`] otherwise.
    pub fn build(self) -> Result<DeviceMesh<T>, TopologyError> {
        let expected = match self.budget {
            Some(budget) => check_admissible(&self.degrees, budget)?,
            None => {
                self.degrees.validate()?;
                self.degrees.total_device_count()
            }
        };

        if self.devices.len() != expected {
            return Err(TopologyError::DeviceCountMismatch {
                expected,
                actual: self.devices.len(),
            });
        }

        let d = &self.degrees;
        let shape = vec![d.pp, d.dp, d.cp, d.tensor_expert_group_size()];
        let dims = MESH_AXES
            .iter()
            .enumerate()
            .map(|(idx, name)| (MeshDim::new(*name), idx))
            .collect();

        log::debug!("Built device mesh with shape {shape:?}");

        Ok(DeviceMesh {
            devices: self.devices,
            shape,
            dims,
            degrees: self.degrees,
        })
    }
}

impl<T> DeviceMesh<T> {
    /// Shape of the mesh, `[pp, dp, cp, tp_ep]`.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Maps every axis name to its index in [`shape`](Self::shape).
    pub fn dims(&self) -> &HashMap<MeshDim, usize> {
        &self.dims
    }

    /// Index of a named axis in [`shape`](Self::shape).
    pub fn dim_index(&self, dim: &MeshDim) -> Option<usize> {
        self.dims.get(dim).copied()
    }

    /// Degrees the mesh was built from.
    pub fn degrees(&self) -> &ParallelDegrees {
        &self.degrees
    }

    /// All device handles, in linear index order.
    pub fn devices(&self) -> &[T] {
        &self.devices
    }

    /// Number of devices in the mesh.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the mesh holds no device. Never true for a built mesh.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// The device handle at linear index `index`.
    pub fn device(&self, index: usize) -> Option<&T> {
        self.devices.get(index)
    }

    /// Coordinate of the device at linear index `index`.
    pub fn coordinate(&self, index: usize) -> Result<DeviceCoordinate, TopologyError> {
        try_decompose(index, &self.degrees)
    }

    /// Communication group of device `index` along `dim`.
    ///
    /// The group holds every device whose coordinate matches on all axes but `dim`,
    /// listed by linear index. TP groups are blocks of `tp` consecutive slots of the
    /// shared `tp_ep` axis; an EP group shares the expert shard index, an ETP group the
    /// expert.
    pub fn group(&self, index: usize, dim: ParallelDim) -> Result<Vec<usize>, TopologyError> {
        let key = self.group_key(&self.coordinate(index)?, dim);

        Ok((0..self.len())
            .filter(|&other| {
                try_decompose(other, &self.degrees)
                    .is_ok_and(|coord| self.group_key(&coord, dim) == key)
            })
            .collect())
    }

    fn group_key(&self, coord: &DeviceCoordinate, dim: ParallelDim) -> [usize; 5] {
        let expert_span = self.degrees.ep * expert_tensor_degree(&self.degrees);
        let mut key = [coord.pp_idx, coord.dp_idx, coord.cp_idx, 0, 0];

        match dim {
            ParallelDim::Pp => key[0] = 0,
            ParallelDim::Dp => key[1] = 0,
            ParallelDim::Cp => key[2] = 0,
            _ => {}
        }
        match dim {
            ParallelDim::Pp | ParallelDim::Dp | ParallelDim::Cp => key[3] = coord.tp_ep_idx,
            ParallelDim::Tp => key[3] = coord.tp_ep_idx / self.degrees.tp,
            ParallelDim::Ep => {
                key[3] = coord.tp_ep_idx / expert_span;
                key[4] = coord.etp_idx;
            }
            ParallelDim::Etp => {
                key[3] = coord.tp_ep_idx / expert_span;
                key[4] = coord.ep_idx;
            }
        }

        key
    }
}

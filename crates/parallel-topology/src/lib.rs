#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Parallelism topology of a simulated GPU cluster.
//!
//! Labels every device of a cluster split along data, tensor, pipeline, context, expert
//! and expert-tensor parallelism with its coordinate, and keeps configurations within a
//! fixed device budget.

mod constraint;
mod coordinate;
mod degrees;
mod error;
mod topology;

pub mod mesh;

pub use constraint::*;
pub use coordinate::*;
pub use degrees::*;
pub use error::*;
pub use mesh::{DeviceMesh, DeviceMeshBuilder, MeshDim};
pub use topology::*;

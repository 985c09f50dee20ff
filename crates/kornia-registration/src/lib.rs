#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Matching of the data points against the model.
pub mod correspondence;

/// Error types for the registration.
pub mod error;

mod icp_point_plane;
pub use icp_point_plane::{
    icp_point_plane, icp_point_plane_with, IcpConfig, IcpResult, IterationState, MIN_POINTS,
};

/// Transformation helpers on 4x4 homogeneous matrices.
pub mod ops;

/// Linearized point-to-plane solver.
pub mod point_plane;

/// Point clouds with normals.
pub mod pointcloud;

/// Selection of the points taking part in the registration.
pub mod selection;

/// Nearest neighbour search over the model points.
pub mod spatial_index;

/// Scoring of a registration result.
pub mod validation;

pub use error::IcpError;
pub use point_plane::DegeneracyPolicy;
pub use pointcloud::{PointCloudNormal, PointNormal};
pub use spatial_index::{KdTreeIndex, SpatialIndex};
pub use validation::EuclideanValidator;

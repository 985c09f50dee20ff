use glam::DMat4;

use crate::pointcloud::PointCloudNormal;

/// Select the model points that can be seen from the current view.
///
/// A point is kept when its normal, rotated into the view frame by
/// `inverse_initial_transformation`, has a negative component along the
/// viewing axis (z). The kept points are NOT transformed.
///
/// # Arguments
///
/// * `model` - The model point cloud.
/// * `inverse_initial_transformation` - The inverse of the initial guess.
///
/// # Returns
///
/// A compacted point cloud with the front facing model points.
pub fn select_model_points(
    model: &PointCloudNormal,
    inverse_initial_transformation: &DMat4,
) -> PointCloudNormal {
    model
        .iter()
        .filter(|p| inverse_initial_transformation.transform_vector3(p.normal).z < 0.0)
        .copied()
        .collect()
}

/// Select the data points with finite positions and normals.
pub fn select_data_points(data: &PointCloudNormal) -> PointCloudNormal {
    data.iter().filter(|p| p.is_finite()).copied().collect()
}

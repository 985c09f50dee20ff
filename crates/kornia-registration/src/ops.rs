use glam::{DMat3, DMat4, DVec3, DVec4};

/// Compute the centroids of two sets of points independently.
///
/// # Arguments
///
/// * `points1` - A set of points.
/// * `points2` - Another set of points.
///
/// # Returns
///
/// The centroids of the two sets of points.
pub(crate) fn compute_centroids(points1: &[DVec3], points2: &[DVec3]) -> (DVec3, DVec3) {
    let centroid1 = points1.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / points1.len() as f64;
    let centroid2 = points2.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / points2.len() as f64;
    (centroid1, centroid2)
}

/// Build a homogeneous transformation from the six point-to-plane parameters.
///
/// `x = [alpha, beta, gamma, tx, ty, tz]` where the rotation is composed as
/// `Rz(gamma) * Ry(beta) * Rx(alpha)`.
pub(crate) fn euler_zyx_transform(x: &[f64; 6]) -> DMat4 {
    let (sa, ca) = x[0].sin_cos();
    let (sb, cb) = x[1].sin_cos();
    let (sg, cg) = x[2].sin_cos();

    DMat4::from_cols(
        DVec4::new(cg * cb, sg * cb, -sb, 0.0),
        DVec4::new(-sg * ca + cg * sb * sa, cg * ca + sg * sb * sa, cb * sa, 0.0),
        DVec4::new(sg * sa + cg * sb * ca, -cg * sa + sg * sb * ca, cb * ca, 0.0),
        DVec4::new(x[3], x[4], x[5], 1.0),
    )
}

/// Similarity transformation that moves `centroid` to the origin and scales by `factor`.
pub(crate) fn normalization_transform(centroid: DVec3, factor: f64) -> DMat4 {
    DMat4::from_cols(
        DVec4::new(factor, 0.0, 0.0, 0.0),
        DVec4::new(0.0, factor, 0.0, 0.0),
        DVec4::new(0.0, 0.0, factor, 0.0),
        (-centroid * factor).extend(1.0),
    )
}

/// Inverse of [`normalization_transform`].
pub(crate) fn denormalization_transform(centroid: DVec3, factor: f64) -> DMat4 {
    let inv_factor = 1.0 / factor;
    DMat4::from_cols(
        DVec4::new(inv_factor, 0.0, 0.0, 0.0),
        DVec4::new(0.0, inv_factor, 0.0, 0.0),
        DVec4::new(0.0, 0.0, inv_factor, 0.0),
        centroid.extend(1.0),
    )
}

/// Build a rigid transformation from a row-major rotation matrix and a translation.
///
/// Example:
///
/// ```
/// use kornia_registration::ops::rigid_transform;
///
/// let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// let translation = [1.0, 2.0, 3.0];
/// let transformation = rigid_transform(&rotation, &translation);
/// assert_eq!(transformation.w_axis.x, 1.0);
/// ```
pub fn rigid_transform(rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> DMat4 {
    let r = DMat3::from_cols_array_2d(rotation).transpose();
    DMat4::from_cols(
        r.x_axis.extend(0.0),
        r.y_axis.extend(0.0),
        r.z_axis.extend(0.0),
        DVec3::from_array(*translation).extend(1.0),
    )
}

/// Inverse of a rigid transformation: `[R^T, -R^T * t]`.
pub fn rigid_inverse(transformation: &DMat4) -> DMat4 {
    let r_inv = DMat3::from_mat4(*transformation).transpose();
    let t_inv = -(r_inv * transformation.w_axis.truncate());
    DMat4::from_cols(
        r_inv.x_axis.extend(0.0),
        r_inv.y_axis.extend(0.0),
        r_inv.z_axis.extend(0.0),
        t_inv.extend(1.0),
    )
}

/// Check that the transformation is a rigid motion within `tolerance`.
///
/// The top-left 3x3 block must be orthonormal with a positive determinant and
/// the last row must be `[0, 0, 0, 1]`.
pub fn is_rigid(transformation: &DMat4, tolerance: f64) -> bool {
    let r = DMat3::from_mat4(*transformation);
    let should_be_identity = r.transpose() * r;
    should_be_identity.abs_diff_eq(DMat3::IDENTITY, tolerance)
        && (r.determinant() - 1.0).abs() <= tolerance
        && transformation
            .row(3)
            .abs_diff_eq(DVec4::new(0.0, 0.0, 0.0, 1.0), tolerance)
}

/// Extract the rotation block as a row-major array.
pub fn rotation_to_array(transformation: &DMat4) -> [[f64; 3]; 3] {
    DMat3::from_mat4(*transformation).transpose().to_cols_array_2d()
}

/// Extract the translation column as an array.
pub fn translation_to_array(transformation: &DMat4) -> [f64; 3] {
    transformation.w_axis.truncate().to_array()
}

use glam::{DMat4, DVec3};
use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

use crate::error::IcpError;
use crate::ops::{
    compute_centroids, denormalization_transform, euler_zyx_transform, normalization_transform,
};
use crate::pointcloud::PointNormal;

/// How the point-to-plane solve treats a rank deficient system.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DegeneracyPolicy {
    /// Solve anyway; a degenerate geometry yields a degenerate update.
    #[default]
    Propagate,
    /// Fail with [`IcpError::SolverDegenerate`] when the reciprocal condition
    /// of the system is below the given value.
    Reject(f64),
}

#[inline]
fn to_na(v: DVec3) -> Vector3<f64> {
    Vector3::new(v.x, v.y, v.z)
}

/// Compute the rigid transformation minimizing the linearized point-to-plane error.
///
/// Finds `T` such that every `T * source[i]` lies on the tangent plane of `target[i]`,
/// i.e. minimizes `Σ ((T * p_s - p_t) · n_t)²`, using the small-angle linearization
/// of the rotation.
///
/// The algorithm:
/// 1. Compute the centroids of both position sets and subtract them.
/// 2. Rescale both sets by `2n / Σ(|p_s| + |p_t|)` so rotations and translations
///    have comparable magnitudes in the linear system.
/// 3. Accumulate the 6x6 normal equations `C * x = b` with `cross = p_s × n_t`
///    and `dot = (p_t - p_s) · n_t`.
/// 4. Solve for `x = [alpha, beta, gamma, tx, ty, tz]` with a Cholesky factorization,
///    or the minimum norm least squares solution when the system is rank deficient.
/// 5. Compose the Z-Y-X rotation and translation in the normalized frame and map
///    it back: `T = T_target^-1 * T_normalized * T_source`.
///
/// For more details, see: Low, K. "Linear Least-Squares Optimization for
/// Point-to-Plane ICP Surface Registration." UNC Technical Report, 2004.
///
/// # Arguments
///
/// * `source` - Source points, only the positions are used.
/// * `target` - Target points with their normals, one per source point.
/// * `policy` - What to do with a rank deficient system.
///
/// # Returns
///
/// The transformation from the source to the target frame.
pub fn minimize_point_plane(
    source: &[PointNormal],
    target: &[PointNormal],
    policy: DegeneracyPolicy,
) -> Result<DMat4, IcpError> {
    if source.len() != target.len() {
        return Err(IcpError::MismatchedLength {
            source_len: source.len(),
            target_len: target.len(),
        });
    }

    // nothing to align
    if source.is_empty() {
        return Ok(DMat4::IDENTITY);
    }

    let n = source.len();
    let xyz_s = source.iter().map(|p| p.point).collect::<Vec<_>>();
    let xyz_t = target.iter().map(|p| p.point).collect::<Vec<_>>();

    let (c_s, c_t) = compute_centroids(&xyz_s, &xyz_t);

    // radius of the bounding sphere through both shapes, averaged
    let accum = xyz_s
        .iter()
        .zip(xyz_t.iter())
        .map(|(&p_s, &p_t)| (p_s - c_s).length() + (p_t - c_t).length())
        .sum::<f64>();

    let factor = 2.0 * n as f64 / accum;
    let factor_squared = factor * factor;

    let mut c_tl = Matrix3::<f64>::zeros();
    let mut c_tr = Matrix3::<f64>::zeros();
    let mut c_br = Matrix3::<f64>::zeros();
    let mut b_t = Vector3::<f64>::zeros();
    let mut b_b = Vector3::<f64>::zeros();

    for ((&p_s, &p_t), pt_t) in xyz_s.iter().zip(xyz_t.iter()).zip(target.iter()) {
        let p_s = p_s - c_s;
        let p_t = p_t - c_t;

        let cross = to_na(p_s.cross(pt_t.normal));
        let normal = to_na(pt_t.normal);
        let dot = (p_t - p_s).dot(pt_t.normal);

        c_tl += cross * cross.transpose();
        c_tr += cross * normal.transpose();
        c_br += normal * normal.transpose();

        b_t += cross * dot;
        b_b += normal * dot;
    }

    c_tl *= factor_squared;
    c_tr *= factor;

    let mut c = Matrix6::<f64>::zeros();
    c.fixed_view_mut::<3, 3>(0, 0).copy_from(&c_tl);
    c.fixed_view_mut::<3, 3>(0, 3).copy_from(&c_tr);
    c.fixed_view_mut::<3, 3>(3, 0).copy_from(&c_tr.transpose());
    c.fixed_view_mut::<3, 3>(3, 3).copy_from(&c_br);

    let mut b = Vector6::<f64>::zeros();
    b.fixed_rows_mut::<3>(0).copy_from(&(b_t * factor_squared));
    b.fixed_rows_mut::<3>(3).copy_from(&(b_b * factor));

    let x = match solve_normal_equations(&c, &b, policy)? {
        Some(x) => x,
        None => return Ok(DMat4::NAN),
    };

    log::trace!("point-to-plane update: {:?}", x.as_slice());

    let x = [x[0], x[1], x[2], x[3], x[4], x[5]];
    let tt = euler_zyx_transform(&x);

    // transformation matrices into the normalized frames of source and target
    let t_s = normalization_transform(c_s, factor);
    let t_t_inv = denormalization_transform(c_t, factor);

    Ok(t_t_inv * tt * t_s)
}

/// Solve the symmetric system `c * x = b`.
///
/// Returns `Ok(None)` when the system is not finite and the policy lets it through.
fn solve_normal_equations(
    c: &Matrix6<f64>,
    b: &Vector6<f64>,
    policy: DegeneracyPolicy,
) -> Result<Option<Vector6<f64>>, IcpError> {
    let finite = c.iter().chain(b.iter()).all(|v| v.is_finite());

    if !finite {
        return match policy {
            DegeneracyPolicy::Reject(_) => Err(IcpError::SolverDegenerate { rcond: f64::NAN }),
            DegeneracyPolicy::Propagate => Ok(None),
        };
    }

    let rcond = reciprocal_condition(c);
    if let DegeneracyPolicy::Reject(min_rcond) = policy {
        if rcond < min_rcond {
            return Err(IcpError::SolverDegenerate { rcond });
        }
    }

    // rounding can leave a rank deficient system barely positive definite
    let eps = f64::EPSILON * 6.0;
    let cholesky = if rcond > eps { c.cholesky() } else { None };

    // only the lower triangle is read by the factorization
    let x = match cholesky {
        Some(chol) => chol.solve(b),
        None => {
            // positive semi-definite: take the minimum norm solution
            c.svd(true, true)
                .solve(b, eps * c.amax())
                .map_err(|_| IcpError::SolverDegenerate { rcond })?
        }
    };

    if let DegeneracyPolicy::Reject(_) = policy {
        if !x.iter().all(|v| v.is_finite()) {
            return Err(IcpError::SolverDegenerate { rcond: f64::NAN });
        }
    }

    Ok(Some(x))
}

/// Ratio between the smallest and the largest eigenvalue of a symmetric matrix.
fn reciprocal_condition(c: &Matrix6<f64>) -> f64 {
    let eigenvalues = c.symmetric_eigenvalues();
    let max = eigenvalues.max();
    if max > 0.0 {
        eigenvalues.min().max(0.0) / max
    } else {
        0.0
    }
}

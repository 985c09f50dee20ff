use glam::{DMat4, DVec3};

/// Error types for building point clouds.
#[derive(thiserror::Error, Debug)]
pub enum PointCloudError {
    /// Positions and normals must have the same length.
    #[error("Mismatched lengths: points ({points}) != normals ({normals})")]
    MismatchedLength {
        /// Number of positions.
        points: usize,
        /// Number of normals.
        normals: usize,
    },
}

/// A 3D point with its unit surface normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointNormal {
    /// The position of the point.
    pub point: DVec3,
    /// The surface normal at the point.
    pub normal: DVec3,
}

impl PointNormal {
    /// Create a new point from its position and normal.
    pub fn new(point: [f64; 3], normal: [f64; 3]) -> Self {
        Self {
            point: DVec3::from_array(point),
            normal: DVec3::from_array(normal),
        }
    }

    /// Check that both the position and the normal have only finite components.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.point.is_finite() && self.normal.is_finite()
    }

    /// Apply a rigid transformation to the point.
    ///
    /// The position is fully transformed while the normal only gets rotated.
    #[inline]
    pub fn transformed(&self, transformation: &DMat4) -> Self {
        Self {
            point: transformation.transform_point3(self.point),
            normal: transformation.transform_vector3(self.normal),
        }
    }
}

/// An ordered set of points carrying surface normals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloudNormal {
    // The points with their normals.
    points: Vec<PointNormal>,
}

impl PointCloudNormal {
    /// Create a new point cloud from a vector of points.
    pub fn new(points: Vec<PointNormal>) -> Self {
        Self { points }
    }

    /// Create a new point cloud from separate position and normal vectors.
    ///
    /// # Arguments
    ///
    /// * `points` - The positions of the points.
    /// * `normals` - The normals of the points, one per position.
    ///
    /// # Returns
    ///
    /// The point cloud or an error if the lengths differ.
    pub fn from_points_normals(
        points: Vec<[f64; 3]>,
        normals: Vec<[f64; 3]>,
    ) -> Result<Self, PointCloudError> {
        if points.len() != normals.len() {
            return Err(PointCloudError::MismatchedLength {
                points: points.len(),
                normals: normals.len(),
            });
        }

        Ok(points
            .into_iter()
            .zip(normals)
            .map(|(p, n)| PointNormal::new(p, n))
            .collect())
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[PointNormal] {
        &self.points
    }

    /// Iterate over the points in the point cloud.
    pub fn iter(&self) -> std::slice::Iter<'_, PointNormal> {
        self.points.iter()
    }

    /// Copy the positions out as plain arrays.
    pub fn positions(&self) -> Vec<[f64; 3]> {
        self.points.iter().map(|p| p.point.to_array()).collect()
    }

    /// Return a copy of the point cloud with every point transformed.
    pub fn transformed(&self, transformation: &DMat4) -> Self {
        self.points
            .iter()
            .map(|p| p.transformed(transformation))
            .collect()
    }

    /// Number of points the underlying storage can hold without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.points.capacity()
    }
}

impl FromIterator<PointNormal> for PointCloudNormal {
    fn from_iter<I: IntoIterator<Item = PointNormal>>(iter: I) -> Self {
        let mut points = iter.into_iter().collect::<Vec<_>>();
        points.shrink_to_fit();
        Self { points }
    }
}

impl<'a> IntoIterator for &'a PointCloudNormal {
    type Item = &'a PointNormal;
    type IntoIter = std::slice::Iter<'a, PointNormal>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

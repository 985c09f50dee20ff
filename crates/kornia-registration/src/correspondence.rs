use glam::DMat4;

use crate::error::IcpError;
use crate::pointcloud::{PointCloudNormal, PointNormal};
use crate::spatial_index::SpatialIndex;

/// Correspondences between the transformed data points and the model points.
///
/// `model[i]` is the match of `data[i]`; a model point may appear more than once.
#[derive(Debug, Clone, Default)]
pub struct Correspondences {
    /// The matched model points.
    pub model: Vec<PointNormal>,
    /// The data points, expressed in the model frame by the current transformation.
    pub data: Vec<PointNormal>,
    /// Sum of the squared distances of the accepted matches.
    pub squared_distance_sum: f64,
}

impl Correspondences {
    /// Number of accepted correspondences.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if no correspondence was accepted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn shrink_to_fit(&mut self) {
        self.model.shrink_to_fit();
        self.data.shrink_to_fit();
    }
}

/// Find the correspondences of the data points in the model.
///
/// Every data point is moved by `transformation` (the normal is only rotated)
/// and matched to its nearest model point. The match is kept when the squared
/// distance is below `squared_distance_threshold` and the normals agree, i.e. their
/// dot product is above `normals_threshold`.
///
/// # Arguments
///
/// * `data` - The selected data points.
/// * `model` - The selected model points, the ones the index was built with.
/// * `index` - The spatial index over `model`.
/// * `transformation` - The current estimate from the data to the model frame.
/// * `squared_distance_threshold` - Outlier rejection threshold.
/// * `normals_threshold` - Minimum cosine between the normals.
///
/// # Returns
///
/// The accepted correspondences or [`IcpError::IndexQueryFailed`].
pub fn find_correspondences<I: SpatialIndex>(
    data: &PointCloudNormal,
    model: &PointCloudNormal,
    index: &I,
    transformation: &DMat4,
    squared_distance_threshold: f64,
    normals_threshold: f64,
) -> Result<Correspondences, IcpError> {
    let mut correspondences = Correspondences {
        model: Vec::with_capacity(data.len()),
        data: Vec::with_capacity(data.len()),
        squared_distance_sum: 0.0,
    };

    for (data_index, pt_d) in data.iter().enumerate() {
        let pt_d = pt_d.transformed(transformation);

        let nn = index
            .nearest_one(&pt_d.point)
            .ok_or(IcpError::IndexQueryFailed { data_index })?;

        if nn.squared_distance >= squared_distance_threshold {
            continue;
        }

        // an index answering outside of the model is broken, not a bad input
        let pt_m = model
            .points()
            .get(nn.index)
            .ok_or(IcpError::IndexQueryFailed { data_index })?;

        if pt_m.normal.dot(pt_d.normal) > normals_threshold {
            correspondences.squared_distance_sum += nn.squared_distance;
            correspondences.model.push(*pt_m);
            correspondences.data.push(pt_d);
        }
    }

    correspondences.shrink_to_fit();

    Ok(correspondences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial_index::{KdTreeIndex, Neighbor};
    use approx::assert_relative_eq;
    use glam::DVec3;

    fn square_model() -> PointCloudNormal {
        PointCloudNormal::new(vec![
            PointNormal::new([0.0, 0.0, 1.0], [0.0, 0.0, -1.0]),
            PointNormal::new([1.0, 0.0, 1.0], [0.0, 0.0, -1.0]),
            PointNormal::new([0.0, 1.0, 1.0], [0.0, 0.0, -1.0]),
            PointNormal::new([1.0, 1.0, 1.0], [0.0, 0.0, -1.0]),
        ])
    }

    #[test]
    fn test_find_correspondences_translation() -> Result<(), IcpError> {
        let model = square_model();
        let index = KdTreeIndex::build(model.points());

        // data shifted by -0.1 in z, the transformation brings it back
        let data = model.transformed(&DMat4::from_translation(DVec3::new(0.0, 0.0, -0.1)));
        let transformation = DMat4::from_translation(DVec3::new(0.0, 0.0, 0.05));

        let corr =
            find_correspondences(&data, &model, &index, &transformation, f64::INFINITY, 0.7)?;

        assert_eq!(corr.len(), 4);
        assert_eq!(corr.model.len(), corr.data.len());
        assert_eq!(corr.model, model.points().to_vec());
        assert_relative_eq!(corr.squared_distance_sum, 4.0 * 0.0025, epsilon = 1e-12);
        assert_relative_eq!(corr.data[0].point.z, 0.95, epsilon = 1e-12);
        assert_eq!(corr.data.capacity(), corr.data.len());
        assert_eq!(corr.model.capacity(), corr.model.len());

        Ok(())
    }

    #[test]
    fn test_find_correspondences_distance_threshold() -> Result<(), IcpError> {
        let model = square_model();
        let index = KdTreeIndex::build(model.points());
        let data = PointCloudNormal::new(vec![
            PointNormal::new([0.0, 0.0, 1.1], [0.0, 0.0, -1.0]),
            PointNormal::new([1.0, 0.0, 1.5], [0.0, 0.0, -1.0]),
        ]);

        let corr = find_correspondences(&data, &model, &index, &DMat4::IDENTITY, 0.1, 0.7)?;

        assert_eq!(corr.len(), 1);
        assert_eq!(corr.data[0].point, data.points()[0].point);

        // the threshold is strict
        let corr = find_correspondences(&data, &model, &index, &DMat4::IDENTITY, 0.25, 0.7)?;
        assert_eq!(corr.len(), 1);

        Ok(())
    }

    #[test]
    fn test_find_correspondences_normals_threshold() -> Result<(), IcpError> {
        let model = square_model();
        let index = KdTreeIndex::build(model.points());

        // 60 degrees apart from the model normal fails, 30 degrees passes
        let (s60, c60) = 60f64.to_radians().sin_cos();
        let (s30, c30) = 30f64.to_radians().sin_cos();
        let data = PointCloudNormal::new(vec![
            PointNormal::new([0.0, 0.0, 1.0], [s60, 0.0, -c60]),
            PointNormal::new([1.0, 1.0, 1.0], [0.0, s30, -c30]),
            PointNormal::new([1.0, 0.0, 1.0], [0.0, 0.0, 1.0]),
        ]);

        let corr = find_correspondences(&data, &model, &index, &DMat4::IDENTITY, 1.0, 0.7)?;

        assert_eq!(corr.len(), 1);
        assert_eq!(corr.data[0], data.points()[1]);
        assert_eq!(corr.model[0], model.points()[3]);

        Ok(())
    }

    #[test]
    fn test_find_correspondences_many_to_one() -> Result<(), IcpError> {
        let model = square_model();
        let index = KdTreeIndex::build(model.points());
        let data = PointCloudNormal::new(vec![
            PointNormal::new([0.1, 0.0, 1.0], [0.0, 0.0, -1.0]),
            PointNormal::new([0.0, 0.1, 1.0], [0.0, 0.0, -1.0]),
            PointNormal::new([-0.1, 0.0, 1.0], [0.0, 0.0, -1.0]),
        ]);

        let corr = find_correspondences(&data, &model, &index, &DMat4::IDENTITY, 1.0, 0.7)?;

        assert_eq!(corr.len(), 3);
        assert!(corr.model.iter().all(|p| *p == model.points()[0]));

        Ok(())
    }

    struct OutOfRangeIndex;

    impl SpatialIndex for OutOfRangeIndex {
        fn build(_points: &[PointNormal]) -> Self {
            Self
        }

        fn nearest_one(&self, _query: &DVec3) -> Option<Neighbor> {
            Some(Neighbor {
                index: usize::MAX,
                squared_distance: 0.0,
            })
        }
    }

    #[test]
    fn test_find_correspondences_index_out_of_range() {
        let model = square_model();
        let index = OutOfRangeIndex::build(model.points());

        let corr = find_correspondences(&model, &model, &index, &DMat4::IDENTITY, 1.0, 0.7);

        assert!(matches!(
            corr,
            Err(IcpError::IndexQueryFailed { data_index: 0 })
        ));
    }
}

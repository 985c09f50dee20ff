use glam::{DMat4, DVec3};

use crate::pointcloud::PointNormal;
use crate::spatial_index::{KdTreeIndex, SpatialIndex};

/// Scores a transformation by the mean squared distance between the transformed
/// source points and their nearest target points.
///
/// Pairs farther apart than `max_range` do not contribute to the score.
#[derive(Debug, Clone, PartialEq)]
pub struct EuclideanValidator {
    /// Maximum distance between a point and its nearest neighbour to be counted.
    pub max_range: f64,
    /// Scores strictly below this value are valid.
    pub threshold: f64,
}

impl EuclideanValidator {
    /// Create a validator without a range limit.
    pub fn new(threshold: f64) -> Self {
        Self {
            max_range: f64::INFINITY,
            threshold,
        }
    }

    /// Builder-style setter for the maximum range.
    pub fn with_max_range(mut self, max_range: f64) -> Self {
        self.max_range = max_range;
        self
    }

    /// Compute the score of `transformation` from the source to the target frame.
    ///
    /// Returns `None` if no source point has a neighbour within range.
    pub fn score(
        &self,
        source: &[PointNormal],
        target: &[PointNormal],
        transformation: &DMat4,
    ) -> Option<f64> {
        let index = KdTreeIndex::build(target);
        self.score_with(&index, source, transformation)
    }

    /// Same as [`EuclideanValidator::score`] with an index already built over the target.
    pub fn score_with<I: SpatialIndex>(
        &self,
        index: &I,
        source: &[PointNormal],
        transformation: &DMat4,
    ) -> Option<f64> {
        let max_squared_range = self.max_range * self.max_range;

        let (sum, count) = source
            .iter()
            .map(|p| transformation.transform_point3(p.point))
            .filter_map(|p: DVec3| index.nearest_one(&p))
            .filter(|nn| nn.squared_distance <= max_squared_range)
            .fold((0.0, 0usize), |(sum, count), nn| {
                (sum + nn.squared_distance, count + 1)
            });

        match count {
            0 => None,
            _ => Some(sum / count as f64),
        }
    }

    /// Check whether `transformation` scores below the threshold.
    pub fn is_valid(
        &self,
        source: &[PointNormal],
        target: &[PointNormal],
        transformation: &DMat4,
    ) -> bool {
        self.score(source, target, transformation)
            .is_some_and(|score| score < self.threshold)
    }

    /// Check whether `score1` is better than `score2`.
    #[inline]
    pub fn is_better(score1: f64, score2: f64) -> bool {
        score1 < score2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_points() -> Vec<PointNormal> {
        vec![
            PointNormal::new([0.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            PointNormal::new([1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            PointNormal::new([0.0, 1.0, 0.0], [0.0, 0.0, -1.0]),
            PointNormal::new([1.0, 1.0, 0.0], [0.0, 0.0, -1.0]),
        ]
    }

    #[test]
    fn test_score_identity() {
        let points = create_points();
        let validator = EuclideanValidator::new(1e-6);

        let score = validator.score(&points, &points, &DMat4::IDENTITY);

        assert_eq!(score, Some(0.0));
        assert!(validator.is_valid(&points, &points, &DMat4::IDENTITY));
    }

    #[test]
    fn test_score_translation() {
        let points = create_points();
        let validator = EuclideanValidator::new(1e-3);
        let transformation = DMat4::from_translation(DVec3::new(0.0, 0.0, 0.1));

        let score = validator.score(&points, &points, &transformation);

        assert!(score.is_some());
        if let Some(score) = score {
            assert_relative_eq!(score, 0.01, epsilon = 1e-12);
        }
        assert!(!validator.is_valid(&points, &points, &transformation));
    }

    #[test]
    fn test_score_max_range() {
        let target = create_points();
        let mut source = create_points();
        source.push(PointNormal::new([5.0, 5.0, 0.0], [0.0, 0.0, -1.0]));

        let validator = EuclideanValidator::new(1e-3).with_max_range(0.5);
        assert_eq!(validator.score(&source, &target, &DMat4::IDENTITY), Some(0.0));

        // everything out of range
        let far = DMat4::from_translation(DVec3::new(0.0, 0.0, 10.0));
        assert_eq!(validator.score(&source, &target, &far), None);
        assert!(!validator.is_valid(&source, &target, &far));
    }

    #[test]
    fn test_is_better() {
        assert!(EuclideanValidator::is_better(0.1, 0.2));
        assert!(!EuclideanValidator::is_better(0.2, 0.1));
    }
}

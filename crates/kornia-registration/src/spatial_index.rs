use glam::DVec3;
use kiddo::immutable::float::kdtree::ImmutableKdTree;

use crate::pointcloud::PointNormal;

/// The nearest neighbour returned by a [`SpatialIndex`] query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the matched point in the indexed set.
    pub index: usize,
    /// Squared euclidean distance between the query and the matched point.
    pub squared_distance: f64,
}

/// Nearest neighbour search over a fixed set of points.
///
/// An index is built once per registration and only read afterwards.
pub trait SpatialIndex {
    /// Build the index over the positions of the given points.
    fn build(points: &[PointNormal]) -> Self
    where
        Self: Sized;

    /// Find the single nearest indexed point to `query`.
    ///
    /// Returns `None` when the index cannot answer the query.
    fn nearest_one(&self, query: &DVec3) -> Option<Neighbor>;
}

/// Default [`SpatialIndex`] backed by an immutable kd-tree.
pub struct KdTreeIndex {
    // kept empty when there is nothing to index
    tree: Option<ImmutableKdTree<f64, u32, 3, 32>>,
}

impl SpatialIndex for KdTreeIndex {
    fn build(points: &[PointNormal]) -> Self {
        let positions = points.iter().map(|p| p.point.to_array()).collect::<Vec<_>>();
        let tree = if positions.is_empty() {
            None
        } else {
            Some(ImmutableKdTree::new_from_slice(&positions))
        };
        Self { tree }
    }

    fn nearest_one(&self, query: &DVec3) -> Option<Neighbor> {
        let nn = self
            .tree
            .as_ref()?
            .nearest_one::<kiddo::SquaredEuclidean>(&query.to_array());
        Some(Neighbor {
            index: nn.item as usize,
            squared_distance: nn.distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdtree_index_nearest_one() {
        let points = vec![
            PointNormal::new([0.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            PointNormal::new([1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            PointNormal::new([0.0, 1.0, 0.0], [0.0, 0.0, -1.0]),
            PointNormal::new([0.0, 0.0, 1.0], [0.0, 0.0, -1.0]),
        ];
        let index = KdTreeIndex::build(&points);

        let nn = index.nearest_one(&DVec3::new(0.9, 0.1, 0.0));
        assert_eq!(nn.map(|n| n.index), Some(1));
        if let Some(nn) = nn {
            approx::assert_relative_eq!(nn.squared_distance, 0.02, epsilon = 1e-12);
        }

        let nn = index.nearest_one(&DVec3::new(0.0, 0.0, 3.0));
        assert_eq!(nn.map(|n| n.index), Some(3));
    }

    #[test]
    fn test_kdtree_index_empty() {
        let index = KdTreeIndex::build(&[]);
        assert!(index.nearest_one(&DVec3::ZERO).is_none());
    }
}

//! The "SPACE" Engine - static R*-tree over plan waypoint positions.
//!
//! Bulk-loaded once when a plan loads and never mutated afterwards. Queries
//! run every tick (50 Hz), so nearest-waypoint search must stay sublinear in
//! the number of waypoints.

use nalgebra::Vector3;
use rstar::primitives::GeomWithData;
use rstar::RTree;

/// A waypoint position tagged with its plan index.
type IndexedPoint = GeomWithData<[f64; 3], usize>;

/// Static spatial index for nearest-waypoint queries.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    /// Builds the index. Point `i` keeps index `i` in query results.
    pub fn build(points: &[Vector3<f64>]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new(to_point(p), i))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// True if no points are indexed.
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Closest point to `query` as `(index, distance)`.
    ///
    /// Euclidean distance; equal distances resolve to the lowest index.
    /// Returns `None` only for an empty index.
    pub fn nearest(&self, query: &Vector3<f64>) -> Option<(usize, f64)> {
        let mut hits = self.tree.nearest_neighbor_iter_with_distance_2(&to_point(query));
        let (first, best_d2) = hits.next()?;
        // Hits arrive in distance order, so all ties are adjacent.
        let index = hits
            .take_while(|(_, d2)| *d2 == best_d2)
            .map(|(p, _)| p.data)
            .fold(first.data, usize::min);
        Some((index, best_d2.sqrt()))
    }

    /// All points within `radius` of `query`, sorted by distance then index.
    pub fn within_radius(&self, query: &Vector3<f64>, radius: f64) -> Vec<(usize, f64)> {
        if !(radius >= 0.0) {
            return Vec::new();
        }
        let mut hits: Vec<(usize, f64)> = self
            .tree
            .locate_within_distance(to_point(query), radius * radius)
            .map(|p| (p.data, (Vector3::from(*p.geom()) - query).norm_squared()))
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits.into_iter().map(|(i, d2)| (i, d2.sqrt())).collect()
    }
}

fn to_point(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

/// Reference linear scan with the same tie-breaking rule as `SpatialIndex::nearest`.
pub fn nearest_linear(points: &[Vector3<f64>], query: &Vector3<f64>) -> Option<(usize, f64)> {
    points
        .iter()
        .enumerate()
        .map(|(index, p)| (index, (p - query).norm_squared()))
        .reduce(|best, c| if c.1 < best.1 { c } else { best })
        .map(|(index, d2)| (index, d2.sqrt()))
}

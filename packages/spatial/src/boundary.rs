//! Per-point composite boundaries.
//!
//! Every point is clipped by the intersection of all boundary polygons
//! that touch it. Boundaries are kept in an R-tree keyed by their
//! bounding box; candidates from the tree are re-sorted into layer order
//! before folding so the id list reads in scan order.

use catchment_isochrone_models::{BoundaryFeature, FeatureId, PointFeature};
use geo::{BoundingRect, Intersects, MultiPoint, MultiPolygon, Rect};
use rstar::{AABB, RTree, RTreeObject};

use crate::intersection::intersect;

/// The intersection of all boundaries touching one point.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeBoundary {
    ids: Vec<FeatureId>,
    geometry: MultiPolygon<f64>,
}

impl CompositeBoundary {
    fn seed(id: FeatureId, geometry: MultiPolygon<f64>) -> Self {
        Self {
            ids: vec![id],
            geometry,
        }
    }

    fn narrow(&mut self, id: FeatureId, geometry: &MultiPolygon<f64>) {
        self.geometry = intersect(&self.geometry, geometry);
        self.ids.push(id);
    }

    /// Contributing boundary ids in scan order.
    #[must_use]
    pub fn ids(&self) -> &[FeatureId] {
        &self.ids
    }

    /// Contributing ids joined with commas, e.g. `"3,7"`.
    #[must_use]
    pub fn fids(&self) -> String {
        self.ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The composite area. May be empty when the boundaries only touch.
    #[must_use]
    pub const fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }
}

struct BoundaryEntry {
    order: usize,
    id: FeatureId,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index over a boundary layer.
pub struct BoundaryIndex {
    tree: RTree<BoundaryEntry>,
}

impl BoundaryIndex {
    /// Indexes `boundaries`, remembering their order. Boundaries with an
    /// empty geometry can never touch a point and are skipped.
    #[must_use]
    pub fn new(boundaries: &[BoundaryFeature]) -> Self {
        let entries: Vec<BoundaryEntry> = boundaries
            .iter()
            .enumerate()
            .filter_map(|(order, boundary)| {
                let Some(rect) = boundary.geometry.bounding_rect() else {
                    log::debug!("Skipping boundary {} without geometry", boundary.id);
                    return None;
                };
                Some(BoundaryEntry {
                    order,
                    id: boundary.id,
                    envelope: to_envelope(rect),
                    polygon: boundary.geometry.clone(),
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed boundaries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether no boundary is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Folds every boundary touching `point` into a composite, or `None`
    /// if no boundary touches it.
    ///
    /// A point on the shared edge of two adjacent boundaries touches both
    /// and is clipped to their (possibly empty) overlap.
    #[must_use]
    pub fn composite_for(&self, point: &MultiPoint<f64>) -> Option<CompositeBoundary> {
        let rect = point.bounding_rect()?;

        let mut touching: Vec<&BoundaryEntry> = self
            .tree
            .locate_in_envelope_intersecting(&to_envelope(rect))
            .filter(|entry| entry.polygon.intersects(point))
            .collect();
        touching.sort_by_key(|entry| entry.order);

        let mut touching = touching.into_iter();
        let first = touching.next()?;
        let mut composite = CompositeBoundary::seed(first.id, first.polygon.clone());
        for entry in touching {
            composite.narrow(entry.id, &entry.polygon);
        }
        Some(composite)
    }
}

/// Resolves one optional composite boundary per point, in point order.
#[must_use]
pub fn resolve(
    points: &[PointFeature],
    boundaries: &[BoundaryFeature],
) -> Vec<Option<CompositeBoundary>> {
    if boundaries.is_empty() {
        return vec![None; points.len()];
    }

    let index = BoundaryIndex::new(boundaries);
    let composites: Vec<_> = points
        .iter()
        .map(|point| index.composite_for(&point.geometry))
        .collect();

    log::debug!(
        "Resolved boundaries for {} of {} points against {} boundaries",
        composites.iter().filter(|c| c.is_some()).count(),
        points.len(),
        index.len()
    );

    composites
}

fn to_envelope(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

#[cfg(test)]
mod tests {
    use geo::{Area, BoundingRect, MultiPoint, point, polygon};

    use super::*;
    use crate::fixtures::{square, triangle};

    fn point_at(id: i64, x: f64, y: f64) -> PointFeature {
        PointFeature::new(FeatureId(id), point!(x: x, y: y))
    }

    #[test]
    fn no_boundaries_means_no_clipping() {
        let points = vec![point_at(1, 1.0, 1.0), point_at(2, 5.0, 5.0)];
        assert_eq!(resolve(&points, &[]), vec![None, None]);
    }

    #[test]
    fn single_containing_boundary_is_used_as_is() {
        let points = vec![point_at(1, 1.0, 1.0)];
        let boundaries = vec![BoundaryFeature::new(FeatureId(7), square())];
        let resolved = resolve(&points, &boundaries);
        let composite = resolved[0].as_ref().unwrap();
        assert_eq!(composite.fids(), "7");
        assert_eq!(composite.geometry(), &MultiPolygon::from(square()));
    }

    #[test]
    fn point_outside_every_boundary_is_unclipped() {
        let points = vec![point_at(1, 10.0, 10.0)];
        let boundaries = vec![
            BoundaryFeature::new(FeatureId(1), square()),
            BoundaryFeature::new(FeatureId(2), triangle()),
        ];
        assert_eq!(resolve(&points, &boundaries), vec![None]);
    }

    #[test]
    fn overlapping_boundaries_narrow_to_their_overlap() {
        let shifted = polygon![
            (x: 1.0, y: 1.0),
            (x: 3.0, y: 1.0),
            (x: 3.0, y: 3.0),
            (x: 1.0, y: 3.0),
        ];
        let points = vec![point_at(1, 1.5, 1.5)];
        let boundaries = vec![
            BoundaryFeature::new(FeatureId(1), square()),
            BoundaryFeature::new(FeatureId(2), shifted),
        ];
        let composite = resolve(&points, &boundaries).remove(0).unwrap();
        assert_eq!(composite.fids(), "1,2");
        assert_eq!(composite.ids(), &[FeatureId(1), FeatureId(2)]);

        let geometry = composite.geometry();
        assert_eq!(geometry.0.len(), 1);
        assert!((geometry.unsigned_area() - 1.0).abs() < 1e-9);
        let rect = geometry.bounding_rect().unwrap();
        assert!((rect.min().x - 1.0).abs() < 1e-9);
        assert!((rect.min().y - 1.0).abs() < 1e-9);
        assert!((rect.max().x - 2.0).abs() < 1e-9);
        assert!((rect.max().y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn ids_follow_scan_order_not_tree_order() {
        let points = vec![point_at(1, 1.0, 1.0)];
        let boundaries = vec![
            BoundaryFeature::new(FeatureId(20), triangle()),
            BoundaryFeature::new(FeatureId(10), square()),
        ];
        let composite = resolve(&points, &boundaries).remove(0).unwrap();
        assert_eq!(composite.fids(), "20,10");
    }

    #[test]
    fn accumulation_order_does_not_change_area() {
        let points = vec![point_at(1, 1.0, 1.0)];
        let forward = resolve(
            &points,
            &[
                BoundaryFeature::new(FeatureId(1), square()),
                BoundaryFeature::new(FeatureId(2), triangle()),
            ],
        )
        .remove(0)
        .unwrap();
        let backward = resolve(
            &points,
            &[
                BoundaryFeature::new(FeatureId(2), triangle()),
                BoundaryFeature::new(FeatureId(1), square()),
            ],
        )
        .remove(0)
        .unwrap();
        assert!(
            (forward.geometry().unsigned_area() - backward.geometry().unsigned_area()).abs()
                < 1e-9
        );
    }

    #[test]
    fn point_on_shared_edge_touches_both_neighbours() {
        let neighbour = polygon![
            (x: 2.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 2.0),
            (x: 2.0, y: 2.0),
        ];
        let points = vec![point_at(1, 2.0, 1.0)];
        let boundaries = vec![
            BoundaryFeature::new(FeatureId(1), square()),
            BoundaryFeature::new(FeatureId(2), neighbour),
        ];
        let composite = resolve(&points, &boundaries).remove(0).unwrap();
        assert_eq!(composite.fids(), "1,2");
        assert!(composite.geometry().0.is_empty());
    }

    #[test]
    fn multipoint_matches_boundaries_of_any_part() {
        let far_square = polygon![
            (x: 10.0, y: 10.0),
            (x: 12.0, y: 10.0),
            (x: 12.0, y: 12.0),
            (x: 10.0, y: 12.0),
        ];
        let points = vec![PointFeature::new(
            FeatureId(1),
            MultiPoint::new(vec![point!(x: 1.0, y: 1.0), point!(x: 11.0, y: 11.0)]),
        )];
        let boundaries = vec![
            BoundaryFeature::new(FeatureId(1), square()),
            BoundaryFeature::new(FeatureId(2), far_square),
        ];
        let composite = resolve(&points, &boundaries).remove(0).unwrap();
        assert_eq!(composite.fids(), "1,2");
    }

    #[test]
    fn empty_boundaries_are_not_indexed() {
        let index = BoundaryIndex::new(&[
            BoundaryFeature::new(FeatureId(1), MultiPolygon::<f64>::new(Vec::new())),
            BoundaryFeature::new(FeatureId(2), square()),
        ]);
        assert_eq!(index.len(), 1);
        assert!(!index.is_empty());
    }
}

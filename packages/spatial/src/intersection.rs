//! Polygon intersection normalized to two-dimensional parts.
//!
//! Intersecting two areas that only share an edge or a corner yields
//! zero-area remnants. Those carry no area and are dropped, so callers
//! always get a multi-polygon of real polygons (possibly empty).

use geo::{Area, BooleanOps, MultiPolygon, Polygon};

/// Fewest coordinates a closed ring needs to enclose an area.
const MIN_RING_LEN: usize = 4;

/// Intersects two polygonal areas.
///
/// The result contains only polygons with a positive area. Disjoint
/// inputs give an empty multi-polygon.
#[must_use]
pub fn intersect<A, B>(a: &A, b: &B) -> MultiPolygon<f64>
where
    A: BooleanOps<Scalar = f64>,
    B: BooleanOps<Scalar = f64>,
{
    normalize(a.intersection(b))
}

/// Drops every part of `multi` that does not enclose an area.
#[must_use]
pub fn normalize(multi: MultiPolygon<f64>) -> MultiPolygon<f64> {
    multi.into_iter().filter(is_areal).collect()
}

fn is_areal(polygon: &Polygon<f64>) -> bool {
    polygon.exterior().0.len() >= MIN_RING_LEN && polygon.unsigned_area() > 0.0
}

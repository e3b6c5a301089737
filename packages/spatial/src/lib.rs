#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Spatial helpers for clipping isochrones to limiting boundaries.
//!
//! - [`intersection`]: polygon intersection normalized to clean
//!   multi-polygons.
//! - [`boundary`]: R-tree backed lookup of the boundary polygons touching
//!   each point, folded into one composite boundary per point.
//! - [`reproject`]: moving input layers into WGS 84 before they are sent
//!   to the isochrone service.

pub mod boundary;
pub mod intersection;
pub mod reproject;

pub use boundary::{BoundaryIndex, CompositeBoundary, resolve};
pub use intersection::intersect;
pub use reproject::{ReprojectError, Reprojector, WebMercatorReprojector};

/// Shapes shared by the tests of this crate and its dependents.
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures {
    use geo::{MultiPolygon, Polygon, polygon};

    /// Unit-free square `[0, 2] x [0, 2]`.
    pub fn square() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
        ]
    }

    /// Triangle with its apex above the square's centre.
    pub fn triangle() -> Polygon<f64> {
        polygon![
            (x: -1.0, y: -1.0),
            (x: 3.0, y: -1.0),
            (x: 1.0, y: 2.0),
        ]
    }

    /// The square plus a second, distant square.
    pub fn two_squares() -> MultiPolygon<f64> {
        MultiPolygon::new(vec![
            square(),
            polygon![
                (x: 4.0, y: 4.0),
                (x: 6.0, y: 4.0),
                (x: 6.0, y: 6.0),
                (x: 4.0, y: 6.0),
            ],
        ])
    }

    /// A comb: a bar above `y = 2.5` with three teeth reaching down to
    /// `y = -0.5`. Every tooth crosses the triangle, the bar does not.
    pub fn comb() -> Polygon<f64> {
        polygon![
            (x: -2.0, y: 3.0),
            (x: -2.0, y: 2.5),
            (x: -0.5, y: 2.5),
            (x: -0.5, y: -0.5),
            (x: -0.3, y: -0.5),
            (x: -0.3, y: 2.5),
            (x: 0.9, y: 2.5),
            (x: 0.9, y: -0.5),
            (x: 1.1, y: -0.5),
            (x: 1.1, y: 2.5),
            (x: 2.3, y: 2.5),
            (x: 2.3, y: -0.5),
            (x: 2.5, y: -0.5),
            (x: 2.5, y: 2.5),
            (x: 4.0, y: 2.5),
            (x: 4.0, y: 3.0),
        ]
    }
}

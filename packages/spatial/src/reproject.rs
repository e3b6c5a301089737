//! Reprojection of input layers into the service's coordinate system.
//!
//! The task only needs "reproject this layer to WGS 84, keeping ids and
//! selection". [`Reprojector`] is that seam; [`WebMercatorReprojector`]
//! covers the spherical Mercator case with closed-form formulas.

use std::f64::consts::PI;

use catchment_isochrone_models::{BoundaryLayer, Crs, PointLayer};
use geo::{Coord, MapCoords};

const EARTH_RADIUS_EQUATOR: f64 = 6_378_137.0;
const R2D: f64 = 180.0 / PI;
/// Latitude limit of spherical Mercator.
const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

/// Errors from reprojecting a layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReprojectError {
    /// No transformation between the two systems is available.
    #[error("no transformation from {from} to {to}")]
    Unsupported {
        /// Source system.
        from: String,
        /// Target system.
        to: String,
    },
}

/// Moves layers between coordinate reference systems.
pub trait Reprojector: Send + Sync {
    /// Returns `layer` in `target`, with ids, attributes and selection
    /// preserved.
    ///
    /// # Errors
    ///
    /// Returns [`ReprojectError`] if the transformation is not available.
    fn reproject_points(&self, layer: &PointLayer, target: &Crs)
    -> Result<PointLayer, ReprojectError>;

    /// Returns `layer` in `target`, with ids preserved.
    ///
    /// # Errors
    ///
    /// Returns [`ReprojectError`] if the transformation is not available.
    fn reproject_boundaries(
        &self,
        layer: &BoundaryLayer,
        target: &Crs,
    ) -> Result<BoundaryLayer, ReprojectError>;
}

/// Transforms between EPSG:3857 and EPSG:4326. Layers already in the
/// target system are copied unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercatorReprojector;

impl WebMercatorReprojector {
    fn transform(from: &Crs, to: &Crs) -> Result<fn(Coord<f64>) -> Coord<f64>, ReprojectError> {
        match (from.authid(), to.authid()) {
            (a, b) if a == b => Ok(identity),
            (Crs::WEB_MERCATOR, Crs::WGS84) => Ok(webmercator_to_wgs84),
            (Crs::WGS84, Crs::WEB_MERCATOR) => Ok(wgs84_to_webmercator),
            _ => Err(ReprojectError::Unsupported {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

impl Reprojector for WebMercatorReprojector {
    fn reproject_points(
        &self,
        layer: &PointLayer,
        target: &Crs,
    ) -> Result<PointLayer, ReprojectError> {
        let transform = Self::transform(&layer.crs, target)?;
        Ok(layer.map_geometries(target.clone(), |geometry| geometry.map_coords(transform)))
    }

    fn reproject_boundaries(
        &self,
        layer: &BoundaryLayer,
        target: &Crs,
    ) -> Result<BoundaryLayer, ReprojectError> {
        let transform = Self::transform(&layer.crs, target)?;
        let mut reprojected = layer.clone();
        reprojected.crs = target.clone();
        for feature in &mut reprojected.features {
            feature.geometry = feature.geometry.map_coords(transform);
        }
        Ok(reprojected)
    }
}

const fn identity(c: Coord<f64>) -> Coord<f64> {
    c
}

/// Spherical Mercator meters to longitude/latitude degrees.
#[must_use]
pub fn webmercator_to_wgs84(c: Coord<f64>) -> Coord<f64> {
    Coord {
        x: c.x * R2D / EARTH_RADIUS_EQUATOR,
        y: 2.0f64.mul_add(-(-c.y / EARTH_RADIUS_EQUATOR).exp().atan(), PI * 0.5) * R2D,
    }
}

/// Longitude/latitude degrees to spherical Mercator meters. Latitudes are
/// clamped to the projection's limit.
#[must_use]
pub fn wgs84_to_webmercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    Coord {
        x: EARTH_RADIUS_EQUATOR * c.x.to_radians(),
        y: EARTH_RADIUS_EQUATOR * PI.mul_add(0.25, 0.5 * lat.to_radians()).tan().ln(),
    }
}

#[cfg(test)]
mod tests {
    use catchment_isochrone_models::{BoundaryFeature, FeatureId, PointFeature};
    use geo::{BoundingRect, point};

    use super::*;
    use crate::fixtures::square;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    #[test]
    fn known_coordinate_converts() {
        let c = webmercator_to_wgs84(Coord {
            x: 2_764_333.0,
            y: 8_438_737.0,
        });
        assert!((c.x - 24.832).abs() < 1e-3);
        assert!((c.y - 60.175).abs() < 1e-3);
    }

    #[test]
    fn round_trip_is_stable() {
        let original = Coord { x: 24.94, y: 60.17 };
        let back = webmercator_to_wgs84(wgs84_to_webmercator(original));
        assert_close(back.x, original.x);
        assert_close(back.y, original.y);
    }

    #[test]
    fn point_layer_keeps_selection_and_ids() {
        let mut layer = PointLayer::new("schools", Crs::web_mercator(), Vec::new());
        layer.push(PointFeature::new(FeatureId(4), point!(x: 0.0, y: 0.0)));
        layer.push(
            PointFeature::new(FeatureId(5), point!(x: 111_319.490_793_273_6, y: 0.0))
                .with_attribute("name", "school"),
        );
        layer.select([FeatureId(5)]);

        let reprojected = WebMercatorReprojector
            .reproject_points(&layer, &Crs::wgs84())
            .unwrap();
        assert!(reprojected.crs.is_wgs84());
        assert_eq!(reprojected.name, "schools");
        assert_eq!(reprojected.selected_ids(), layer.selected_ids());
        let moved = &reprojected.features()[1];
        assert_eq!(moved.id, FeatureId(5));
        assert_close(moved.geometry.0[0].x(), 1.0);
        assert_close(moved.geometry.0[0].y(), 0.0);
    }

    #[test]
    fn boundary_layer_is_reprojected() {
        let layer = BoundaryLayer::new(
            "areas",
            Crs::wgs84(),
            vec![BoundaryFeature::new(FeatureId(1), square())],
        );
        let reprojected = WebMercatorReprojector
            .reproject_boundaries(&layer, &Crs::web_mercator())
            .unwrap();
        let rect = reprojected.features[0].geometry.bounding_rect().unwrap();
        assert_close(rect.max().x, 2.0 * 111_319.490_793_273_6);
        assert_eq!(reprojected.crs, Crs::web_mercator());
    }

    #[test]
    fn unknown_systems_are_rejected() {
        let layer = PointLayer::new("schools", Crs::new("EPSG:3067"), Vec::new());
        let err = WebMercatorReprojector
            .reproject_points(&layer, &Crs::wgs84())
            .unwrap_err();
        assert_eq!(
            err,
            ReprojectError::Unsupported {
                from: "EPSG:3067".to_string(),
                to: "EPSG:4326".to_string(),
            }
        );
    }
}

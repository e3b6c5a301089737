//! JSON records exchanged with the isochrone service.
//!
//! Only the members the task reads are modelled; everything else in a
//! response body is ignored.

use geo::{LineString, Polygon};
use serde::{Deserialize, Serialize};

/// Body of a successful `GET /isochrone` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsochroneResponse {
    /// One record per bucket.
    pub polygons: Vec<RawIsochrone>,
}

/// A single isochrone polygon as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIsochrone {
    /// Per-polygon properties.
    pub properties: IsochroneProperties,
    /// Polygon geometry.
    pub geometry: IsochroneGeometry,
}

/// Properties of a [`RawIsochrone`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsochroneProperties {
    /// Zero-based bucket index.
    pub bucket: u32,
}

/// `GeoJSON`-style polygon coordinates of a [`RawIsochrone`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsochroneGeometry {
    /// Rings of `[lon, lat]` pairs; the first one is the outer ring.
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

impl RawIsochrone {
    /// Creates a record from an outer ring.
    #[must_use]
    pub fn new(bucket: u32, ring: Vec<[f64; 2]>) -> Self {
        Self {
            properties: IsochroneProperties { bucket },
            geometry: IsochroneGeometry {
                coordinates: vec![ring],
            },
        }
    }

    /// Zero-based bucket index.
    #[must_use]
    pub const fn bucket(&self) -> u32 {
        self.properties.bucket
    }

    /// The outer ring as a polygon. Inner rings are not used by the
    /// service and are dropped. A record without rings gives an empty
    /// polygon.
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        let ring = self
            .geometry
            .coordinates
            .first()
            .cloned()
            .unwrap_or_default();
        Polygon::new(LineString::from(ring), Vec::new())
    }
}

/// Error body of a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_response() {
        let body = r#"{
            "polygons": [{
                "type": "Feature",
                "properties": {"bucket": 1},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
                }
            }],
            "info": {"copyrights": ["GraphHopper"], "took": 12}
        }"#;
        let response: IsochroneResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.polygons.len(), 1);
        let polygon = &response.polygons[0];
        assert_eq!(polygon.bucket(), 1);
        assert_eq!(polygon.to_polygon().exterior().0.len(), 4);
    }

    #[test]
    fn missing_rings_give_empty_polygon() {
        let raw = RawIsochrone {
            properties: IsochroneProperties { bucket: 0 },
            geometry: IsochroneGeometry {
                coordinates: Vec::new(),
            },
        };
        assert!(raw.to_polygon().exterior().0.is_empty());
    }

    #[test]
    fn parses_error_message() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"message": "Cannot find point 0: 1.0,1.0", "hints": []}"#)
                .unwrap();
        assert_eq!(body.message, "Cannot find point 0: 1.0,1.0");
    }
}

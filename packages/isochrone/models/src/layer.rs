//! Feature and layer types for the input points and boundaries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use geo::{MultiPoint, MultiPolygon};
use serde::{Deserialize, Serialize};

/// Coordinate reference system, identified by its authority id
/// (e.g. `"EPSG:4326"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs(String);

impl Crs {
    /// Authority id of WGS 84, the system the isochrone service expects.
    pub const WGS84: &'static str = "EPSG:4326";
    /// Authority id of spherical (web) Mercator.
    pub const WEB_MERCATOR: &'static str = "EPSG:3857";

    /// Creates a CRS from an authority id. The id is upper-cased so that
    /// `epsg:4326` and `EPSG:4326` compare equal.
    #[must_use]
    pub fn new(authid: &str) -> Self {
        Self(authid.trim().to_ascii_uppercase())
    }

    /// WGS 84 (`EPSG:4326`).
    #[must_use]
    pub fn wgs84() -> Self {
        Self(Self::WGS84.to_string())
    }

    /// Web Mercator (`EPSG:3857`).
    #[must_use]
    pub fn web_mercator() -> Self {
        Self(Self::WEB_MERCATOR.to_string())
    }

    /// The authority id.
    #[must_use]
    pub fn authid(&self) -> &str {
        &self.0
    }

    /// Whether this is WGS 84.
    #[must_use]
    pub fn is_wgs84(&self) -> bool {
        self.0 == Self::WGS84
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable feature identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FeatureId(pub i64);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single attribute value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Missing value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Real(f64),
    /// Text.
    Text(String),
}

impl AttributeValue {
    /// The [`FieldType`] this value belongs to, `None` for [`Self::Null`].
    #[must_use]
    pub const fn field_type(&self) -> Option<FieldType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(FieldType::Bool),
            Self::Int(_) => Some(FieldType::Int),
            Self::Real(_) => Some(FieldType::Real),
            Self::Text(_) => Some(FieldType::Text),
        }
    }

    /// Returns the text if this is a [`Self::Text`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a float if it is numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value if it is an [`Self::Int`].
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Storage type of a [`Field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Int,
    /// Double precision float.
    Real,
    /// Variable length text.
    Text,
}

/// A named, typed attribute column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Column type.
    pub field_type: FieldType,
}

impl Field {
    /// Creates a field.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// An input point (or multi-point) feature.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    /// Identifier within its layer.
    pub id: FeatureId,
    /// Attribute values keyed by field name.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// One or more coordinate pairs (x = longitude, y = latitude in WGS 84).
    pub geometry: MultiPoint<f64>,
}

impl PointFeature {
    /// Creates a feature without attributes.
    #[must_use]
    pub fn new(id: FeatureId, geometry: impl Into<MultiPoint<f64>>) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
            geometry: geometry.into(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Looks up an attribute by field name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// A layer of point features with a field schema and a selection.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLayer {
    /// Display name.
    pub name: String,
    /// Coordinate reference system of the geometries.
    pub crs: Crs,
    /// Ordered field schema.
    pub fields: Vec<Field>,
    features: Vec<PointFeature>,
    selected: BTreeSet<FeatureId>,
}

impl PointLayer {
    /// Creates an empty layer.
    #[must_use]
    pub fn new(name: impl Into<String>, crs: Crs, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            crs,
            fields,
            features: Vec::new(),
            selected: BTreeSet::new(),
        }
    }

    /// Appends a feature.
    pub fn push(&mut self, feature: PointFeature) {
        self.features.push(feature);
    }

    /// All features in insertion order.
    #[must_use]
    pub fn features(&self) -> &[PointFeature] {
        &self.features
    }

    /// Number of features.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Adds `ids` to the selection. Ids not present in the layer are ignored.
    pub fn select(&mut self, ids: impl IntoIterator<Item = FeatureId>) {
        for id in ids {
            if self.features.iter().any(|f| f.id == id) {
                self.selected.insert(id);
            }
        }
    }

    /// Ids of the selected features.
    #[must_use]
    pub const fn selected_ids(&self) -> &BTreeSet<FeatureId> {
        &self.selected
    }

    /// Selected features in layer order.
    pub fn selected_features(&self) -> impl Iterator<Item = &PointFeature> {
        self.features
            .iter()
            .filter(|f| self.selected.contains(&f.id))
    }

    /// Number of selected features.
    #[must_use]
    pub fn selected_feature_count(&self) -> usize {
        self.selected.len()
    }

    /// Returns a copy with each geometry replaced by `map`, keeping ids,
    /// attributes and the selection.
    #[must_use]
    pub fn map_geometries(
        &self,
        crs: Crs,
        map: impl Fn(&MultiPoint<f64>) -> MultiPoint<f64>,
    ) -> Self {
        Self {
            name: self.name.clone(),
            crs,
            fields: self.fields.clone(),
            features: self
                .features
                .iter()
                .map(|f| PointFeature {
                    id: f.id,
                    attributes: f.attributes.clone(),
                    geometry: map(&f.geometry),
                })
                .collect(),
            selected: self.selected.clone(),
        }
    }
}

/// A limiting boundary polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFeature {
    /// Identifier within its layer.
    pub id: FeatureId,
    /// Polygonal area.
    pub geometry: MultiPolygon<f64>,
}

impl BoundaryFeature {
    /// Creates a boundary feature.
    #[must_use]
    pub fn new(id: FeatureId, geometry: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            id,
            geometry: geometry.into(),
        }
    }
}

/// A layer of boundary polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryLayer {
    /// Display name.
    pub name: String,
    /// Coordinate reference system of the geometries.
    pub crs: Crs,
    /// Boundary polygons in scan order.
    pub features: Vec<BoundaryFeature>,
}

impl BoundaryLayer {
    /// Creates a layer.
    #[must_use]
    pub fn new(name: impl Into<String>, crs: Crs, features: Vec<BoundaryFeature>) -> Self {
        Self {
            name: name.into(),
            crs,
            features,
        }
    }
}

#[cfg(test)]
mod tests {
    use geo::point;

    use super::*;

    fn layer() -> PointLayer {
        let mut layer = PointLayer::new(
            "schools",
            Crs::wgs84(),
            vec![
                Field::new("fid", FieldType::Int),
                Field::new("name", FieldType::Text),
            ],
        );
        for id in 1..=3 {
            layer.push(
                PointFeature::new(FeatureId(id), point!(x: 1.0, y: 1.0))
                    .with_attribute("fid", id)
                    .with_attribute("name", format!("school {id}")),
            );
        }
        layer
    }

    #[test]
    fn crs_ids_compare_case_insensitively() {
        assert_eq!(Crs::new("epsg:4326"), Crs::wgs84());
        assert!(Crs::new(" EPSG:4326 ").is_wgs84());
        assert!(!Crs::web_mercator().is_wgs84());
    }

    #[test]
    fn selection_ignores_unknown_ids() {
        let mut layer = layer();
        layer.select([FeatureId(2), FeatureId(9)]);
        assert_eq!(layer.selected_feature_count(), 1);
        let selected: Vec<_> = layer.selected_features().map(|f| f.id).collect();
        assert_eq!(selected, vec![FeatureId(2)]);
    }

    #[test]
    fn map_geometries_keeps_selection_and_attributes() {
        let mut layer = layer();
        layer.select([FeatureId(3)]);
        let moved = layer.map_geometries(Crs::web_mercator(), |mp| {
            MultiPoint::new(mp.iter().map(|p| point!(x: p.x() * 2.0, y: p.y())).collect())
        });
        assert_eq!(moved.crs, Crs::web_mercator());
        assert_eq!(moved.selected_ids(), layer.selected_ids());
        assert_eq!(moved.features()[0].geometry.0[0].x(), 2.0);
        assert_eq!(
            moved.features()[2].attribute("name"),
            Some(&AttributeValue::from("school 3"))
        );
    }

    #[test]
    fn attribute_values_serialize_untagged() {
        let json = serde_json::to_string(&vec![
            AttributeValue::Null,
            AttributeValue::Int(1),
            AttributeValue::Real(2.5),
            AttributeValue::from("school"),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,1,2.5,"school"]"#);
    }
}

//! `GeoJSON` input layers and result persistence.
//!
//! Input files are `FeatureCollection`s. A feature's id is taken from its
//! `id` member, then from a `fid` property, then from its position. The
//! coordinate system comes from a legacy `crs` member when there is one
//! and defaults to WGS 84.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use catchment_isochrone_models::{
    AttributeValue, BoundaryFeature, BoundaryLayer, Crs, FeatureId, Field, FieldType,
    PointFeature, PointLayer,
};
use geo::{MultiPoint, MultiPolygon};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue, feature::Id};

use crate::layer::{ID_FIELD, IsochroneFeature, IsochroneLayer, LayerStyle, ORIGINAL_FID};

/// Errors from reading or writing layer files.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The text is not valid `GeoJSON`.
    #[error("Invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The document is a bare geometry or feature.
    #[error("Expected a FeatureCollection")]
    NotACollection,

    /// A feature has a geometry of the wrong kind.
    #[error("Feature {index} has a {found} geometry, expected {expected}")]
    UnexpectedGeometry {
        /// Position of the feature in the collection.
        index: usize,
        /// Geometry kind the layer needs.
        expected: &'static str,
        /// Geometry kind found.
        found: &'static str,
    },
}

/// A result layer written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedLayer {
    /// Layer name.
    pub name: String,
    /// File the layer was written to.
    pub path: PathBuf,
    /// Number of features written.
    pub feature_count: usize,
    /// Rendering hints carried over from the in-memory layer.
    pub style: LayerStyle,
}

impl PersistedLayer {
    /// Reads the features back from [`Self::path`].
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if the file cannot be read or parsed.
    pub fn load(&self) -> Result<Vec<IsochroneFeature>, PersistError> {
        let collection = read_collection(&self.path)?;
        collection
            .features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| {
                let geometry = polygons_of(index, feature.geometry.clone())?;
                let attributes = properties_of(&feature)
                    .into_iter()
                    .map(|(name, value)| (name.clone(), to_attribute(value)))
                    .collect::<BTreeMap<_, _>>();
                let original_fid = attributes
                    .get(ORIGINAL_FID)
                    .and_then(AttributeValue::as_i64)
                    .map_or_else(|| fallback_id(index), FeatureId);
                Ok(IsochroneFeature {
                    original_fid,
                    attributes,
                    geometry,
                })
            })
            .collect()
    }
}

/// Writes `layer` to `<dir>/<name>.<extension>`, creating `dir` if needed.
///
/// # Errors
///
/// Returns [`PersistError::Io`] if the directory or file cannot be written.
pub fn persist_layer(
    layer: &IsochroneLayer,
    dir: &Path,
    extension: &str,
) -> Result<PersistedLayer, PersistError> {
    std::fs::create_dir_all(dir).map_err(|source| PersistError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(format!("{}.{extension}", file_stem(layer.name())));
    let text = GeoJson::from(to_collection(layer)).to_string();
    std::fs::write(&path, text).map_err(|source| PersistError::Io {
        path: path.clone(),
        source,
    })?;

    log::info!(
        "Wrote {} isochrones to {}",
        layer.feature_count(),
        path.display()
    );

    Ok(PersistedLayer {
        name: layer.name().to_string(),
        path,
        feature_count: layer.feature_count(),
        style: layer.style(),
    })
}

/// Replaces characters that are not allowed in file names.
#[must_use]
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = stem.trim();
    if stem.is_empty() {
        "isochrones".to_string()
    } else {
        stem.to_string()
    }
}

fn to_collection(layer: &IsochroneLayer) -> FeatureCollection {
    let features = layer
        .features()
        .iter()
        .zip(1_i64..)
        .map(|(feature, id)| {
            let mut properties = JsonObject::new();
            for field in layer.schema().fields() {
                let value = feature.attribute(&field.name).unwrap_or(&AttributeValue::Null);
                properties.insert(field.name.clone(), to_json(value));
            }
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(
                    &feature.geometry,
                ))),
                id: Some(Id::Number(id.into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let mut foreign_members = JsonObject::new();
    foreign_members.insert(
        "name".to_string(),
        JsonValue::String(layer.name().to_string()),
    );

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    }
}

/// Reads a point layer. Features without geometry are skipped.
///
/// # Errors
///
/// Returns [`PersistError`] if the file cannot be read, is not a
/// `FeatureCollection`, or has non-point geometries.
pub fn read_point_layer(path: &Path) -> Result<PointLayer, PersistError> {
    let collection = read_collection(path)?;
    point_layer_from(collection, &default_name(path))
}

/// Parses a point layer from `GeoJSON` text.
///
/// # Errors
///
/// See [`read_point_layer`].
pub fn parse_point_layer(text: &str, name: &str) -> Result<PointLayer, PersistError> {
    point_layer_from(parse_collection(text)?, name)
}

/// Reads a boundary layer. Features without geometry are skipped.
///
/// # Errors
///
/// Returns [`PersistError`] if the file cannot be read, is not a
/// `FeatureCollection`, or has non-polygon geometries.
pub fn read_boundary_layer(path: &Path) -> Result<BoundaryLayer, PersistError> {
    let collection = read_collection(path)?;
    boundary_layer_from(collection, &default_name(path))
}

/// Parses a boundary layer from `GeoJSON` text.
///
/// # Errors
///
/// See [`read_boundary_layer`].
pub fn parse_boundary_layer(text: &str, name: &str) -> Result<BoundaryLayer, PersistError> {
    boundary_layer_from(parse_collection(text)?, name)
}

fn point_layer_from(collection: FeatureCollection, name: &str) -> Result<PointLayer, PersistError> {
    let name = collection_name(&collection).unwrap_or(name).to_string();
    let crs = collection_crs(&collection);
    let fields = infer_fields(&collection.features);
    let mut layer = PointLayer::new(name, crs, fields);

    for (index, feature) in collection.features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry.clone() else {
            log::warn!("Skipping point feature {index} without geometry");
            continue;
        };
        let geometry = points_of(index, geometry)?;
        let mut point = PointFeature::new(feature_id(index, &feature), geometry);
        for (key, value) in properties_of(&feature) {
            point.attributes.insert(key.clone(), to_attribute(value));
        }
        layer.push(point);
    }

    Ok(layer)
}

fn boundary_layer_from(
    collection: FeatureCollection,
    name: &str,
) -> Result<BoundaryLayer, PersistError> {
    let name = collection_name(&collection).unwrap_or(name).to_string();
    let crs = collection_crs(&collection);
    let mut features = Vec::with_capacity(collection.features.len());

    for (index, feature) in collection.features.iter().enumerate() {
        if feature.geometry.is_none() {
            log::warn!("Skipping boundary feature {index} without geometry");
            continue;
        }
        let geometry = polygons_of(index, feature.geometry.clone())?;
        features.push(BoundaryFeature::new(feature_id(index, feature), geometry));
    }

    Ok(BoundaryLayer::new(name, crs, features))
}

fn read_collection(path: &Path) -> Result<FeatureCollection, PersistError> {
    let text = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_collection(&text)
}

fn parse_collection(text: &str) -> Result<FeatureCollection, PersistError> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        GeoJson::Feature(_) | GeoJson::Geometry(_) => Err(PersistError::NotACollection),
    }
}

fn default_name(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "layer".to_string(), |s| s.to_string_lossy().into_owned())
}

fn collection_name(collection: &FeatureCollection) -> Option<&str> {
    collection
        .foreign_members
        .as_ref()?
        .get("name")?
        .as_str()
}

fn collection_crs(collection: &FeatureCollection) -> Crs {
    collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(JsonValue::as_str)
        .map_or_else(Crs::wgs84, parse_crs_name)
}

/// Maps the names used in `crs` members (`EPSG:3857`,
/// `urn:ogc:def:crs:EPSG::3857`, `urn:ogc:def:crs:OGC:1.3:CRS84`) to a
/// [`Crs`].
fn parse_crs_name(name: &str) -> Crs {
    if name.ends_with("CRS84") {
        return Crs::wgs84();
    }
    if name.to_ascii_uppercase().contains("EPSG")
        && let Some(code) = name.rsplit(':').next().filter(|c| !c.is_empty())
    {
        return Crs::new(&format!("EPSG:{code}"));
    }
    Crs::new(name)
}

#[allow(clippy::cast_possible_wrap)]
const fn fallback_id(index: usize) -> FeatureId {
    FeatureId(index as i64 + 1)
}

fn feature_id(index: usize, feature: &Feature) -> FeatureId {
    let from_member = match &feature.id {
        Some(Id::Number(n)) => n.as_i64(),
        Some(Id::String(s)) => s.parse().ok(),
        None => None,
    };
    from_member
        .or_else(|| {
            feature
                .properties
                .as_ref()
                .and_then(|p| p.get(ID_FIELD))
                .and_then(JsonValue::as_i64)
        })
        .map_or_else(|| fallback_id(index), FeatureId)
}

fn properties_of(feature: &Feature) -> Vec<(&String, &JsonValue)> {
    feature
        .properties
        .as_ref()
        .map(|p| p.iter().collect())
        .unwrap_or_default()
}

/// Collects the property names in order of first appearance. A field's
/// type is that of its first non-null value; integers widen to reals when
/// a later value is fractional.
fn infer_fields(features: &[Feature]) -> Vec<Field> {
    let mut fields: Vec<(String, Option<FieldType>)> = Vec::new();

    for feature in features {
        for (key, value) in properties_of(feature) {
            let observed = to_attribute(value).field_type();
            match fields.iter_mut().find(|(name, _)| name == key) {
                None => fields.push((key.clone(), observed)),
                Some((_, slot @ None)) => *slot = observed,
                Some((_, Some(current))) => {
                    if *current == FieldType::Int && observed == Some(FieldType::Real) {
                        *current = FieldType::Real;
                    }
                }
            }
        }
    }

    fields
        .into_iter()
        .map(|(name, field_type)| Field::new(name, field_type.unwrap_or(FieldType::Text)))
        .collect()
}

fn to_attribute(value: &JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Number(n) => n.as_i64().map_or_else(
            || AttributeValue::Real(n.as_f64().unwrap_or(f64::NAN)),
            AttributeValue::Int,
        ),
        JsonValue::String(s) => AttributeValue::Text(s.clone()),
        other => AttributeValue::Text(other.to_string()),
    }
}

fn to_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Bool(b) => JsonValue::Bool(*b),
        AttributeValue::Int(i) => JsonValue::from(*i),
        AttributeValue::Real(r) => {
            serde_json::Number::from_f64(*r).map_or(JsonValue::Null, JsonValue::Number)
        }
        AttributeValue::Text(s) => JsonValue::String(s.clone()),
    }
}

const fn kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

fn points_of(index: usize, geometry: geojson::Geometry) -> Result<MultiPoint<f64>, PersistError> {
    match geo::Geometry::<f64>::try_from(geometry)? {
        geo::Geometry::Point(point) => Ok(point.into()),
        geo::Geometry::MultiPoint(points) => Ok(points),
        other => Err(PersistError::UnexpectedGeometry {
            index,
            expected: "Point",
            found: kind(&other),
        }),
    }
}

fn polygons_of(
    index: usize,
    geometry: Option<geojson::Geometry>,
) -> Result<MultiPolygon<f64>, PersistError> {
    let Some(geometry) = geometry else {
        return Ok(MultiPolygon::new(Vec::new()));
    };
    match geo::Geometry::<f64>::try_from(geometry)? {
        geo::Geometry::Polygon(polygon) => Ok(polygon.into()),
        geo::Geometry::MultiPolygon(polygons) => Ok(polygons),
        other => Err(PersistError::UnexpectedGeometry {
            index,
            expected: "Polygon",
            found: kind(&other),
        }),
    }
}

//! The result layer: output schema, isochrone features and style.

use std::collections::BTreeMap;

use catchment_isochrone_models::{AttributeValue, Crs, FeatureId, Field, FieldType, PointFeature};
use geo::{BoundingRect, MultiPolygon, Rect, coord};

/// Point id the isochrone was generated for.
pub const ORIGINAL_FID: &str = "original_fid";
/// Upper limit of the isochrone's bucket, in the run's unit.
pub const ISOCHRONE_DISTANCE: &str = "isochrone_distance";
/// Ids of the boundaries the isochrone was clipped to.
pub const BOUNDARY_FIDS: &str = "boundary_fids";
/// Identifier field of input layers. Replaced by [`ORIGINAL_FID`].
pub const ID_FIELD: &str = "fid";

const RESERVED: [&str; 3] = [ORIGINAL_FID, ISOCHRONE_DISTANCE, BOUNDARY_FIDS];
const COLLISION_PREFIX: &str = "original_";

/// Output field list plus the mapping from input field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    fields: Vec<Field>,
    copies: Vec<(String, String)>,
}

impl OutputSchema {
    /// Derives the output schema from the input fields.
    ///
    /// `original_fid` comes first, then every input field except `fid`,
    /// then `isochrone_distance` and `boundary_fids`. Input fields named
    /// like one of the generated fields get an `original_` prefix.
    #[must_use]
    pub fn from_input(input: &[Field]) -> Self {
        let mut fields = vec![Field::new(ORIGINAL_FID, FieldType::Int)];
        let mut copies = Vec::new();

        for field in input.iter().filter(|f| f.name != ID_FIELD) {
            let mut target = field.name.clone();
            while RESERVED.contains(&target.as_str()) || fields.iter().any(|f| f.name == target)
            {
                target = format!("{COLLISION_PREFIX}{target}");
            }
            if target != field.name {
                log::debug!("Copying input field {} as {target}", field.name);
            }
            fields.push(Field::new(target.clone(), field.field_type));
            copies.push((field.name.clone(), target));
        }

        fields.push(Field::new(ISOCHRONE_DISTANCE, FieldType::Real));
        fields.push(Field::new(BOUNDARY_FIDS, FieldType::Text));

        Self { fields, copies }
    }

    /// Output fields in order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Output name an input field is copied to, if it is copied.
    #[must_use]
    pub fn target_of(&self, input: &str) -> Option<&str> {
        self.copies
            .iter()
            .find(|(source, _)| source == input)
            .map(|(_, target)| target.as_str())
    }

    /// Builds the output feature for one bucket of `point`.
    #[must_use]
    pub fn feature(
        &self,
        point: &PointFeature,
        isochrone_distance: f64,
        boundary_fids: &str,
        geometry: MultiPolygon<f64>,
    ) -> IsochroneFeature {
        let mut attributes = BTreeMap::new();
        attributes.insert(ORIGINAL_FID.to_string(), AttributeValue::Int(point.id.0));
        for (source, target) in &self.copies {
            let value = point.attribute(source).cloned().unwrap_or_default();
            attributes.insert(target.clone(), value);
        }
        attributes.insert(
            ISOCHRONE_DISTANCE.to_string(),
            AttributeValue::Real(isochrone_distance),
        );
        attributes.insert(
            BOUNDARY_FIDS.to_string(),
            AttributeValue::Text(boundary_fids.to_string()),
        );

        IsochroneFeature {
            original_fid: point.id,
            attributes,
            geometry,
        }
    }
}

/// Upper limit of zero-based `bucket` when `distance` is split into
/// `buckets` equal steps.
#[must_use]
pub fn bucket_distance(bucket: u32, distance: u32, buckets: u32) -> f64 {
    f64::from(bucket + 1) * (f64::from(distance) / f64::from(buckets.max(1)))
}

/// One isochrone polygon of the result layer.
#[derive(Debug, Clone, PartialEq)]
pub struct IsochroneFeature {
    /// Id of the point the isochrone belongs to.
    pub original_fid: FeatureId,
    /// Attribute values keyed by output field name.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Reachable area, clipped to the point's boundaries if it had any.
    pub geometry: MultiPolygon<f64>,
}

impl IsochroneFeature {
    /// Looks up an attribute by output field name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// The `isochrone_distance` value.
    #[must_use]
    pub fn isochrone_distance(&self) -> Option<f64> {
        self.attribute(ISOCHRONE_DISTANCE)
            .and_then(AttributeValue::as_f64)
    }

    /// The `boundary_fids` value.
    #[must_use]
    pub fn boundary_fids(&self) -> Option<&str> {
        self.attribute(BOUNDARY_FIDS).and_then(AttributeValue::as_str)
    }
}

/// Rendering hints passed along with the layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerStyle {
    /// Fill opacity between 0 and 1.
    pub fill_opacity: f64,
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self { fill_opacity: 0.15 }
    }
}

/// In-memory polygon layer assembled by a run.
#[derive(Debug, Clone, PartialEq)]
pub struct IsochroneLayer {
    name: String,
    crs: Crs,
    schema: OutputSchema,
    style: LayerStyle,
    features: Vec<IsochroneFeature>,
    extent: Option<Rect<f64>>,
}

impl IsochroneLayer {
    /// Creates an empty WGS 84 layer.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: OutputSchema, style: LayerStyle) -> Self {
        Self {
            name: name.into(),
            crs: Crs::wgs84(),
            schema,
            style,
            features: Vec::new(),
            extent: None,
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Coordinate reference system of the geometries.
    #[must_use]
    pub const fn crs(&self) -> &Crs {
        &self.crs
    }

    /// Output schema.
    #[must_use]
    pub const fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    /// Rendering hints.
    #[must_use]
    pub const fn style(&self) -> LayerStyle {
        self.style
    }

    /// Appends a feature. The extent is not updated until
    /// [`Self::update_extents`] is called.
    pub fn add_feature(&mut self, feature: IsochroneFeature) {
        self.features.push(feature);
    }

    /// Appends several features.
    pub fn extend(&mut self, features: impl IntoIterator<Item = IsochroneFeature>) {
        self.features.extend(features);
    }

    /// Features in insertion order.
    #[must_use]
    pub fn features(&self) -> &[IsochroneFeature] {
        &self.features
    }

    /// Number of features.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Whether the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Recomputes the bounding box over all features.
    pub fn update_extents(&mut self) {
        self.extent = self
            .features
            .iter()
            .filter_map(|f| f.geometry.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                    coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
                )
            });
    }

    /// Bounding box as of the last [`Self::update_extents`].
    #[must_use]
    pub const fn extent(&self) -> Option<Rect<f64>> {
        self.extent
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Isochrone request options, layer and wire-format types.
//!
//! Shared by the spatial helpers, the isochrone task and the CLI host.
//! Nothing in this crate performs I/O.

pub mod layer;
pub mod wire;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use layer::{
    AttributeValue, BoundaryFeature, BoundaryLayer, Crs, FeatureId, Field, FieldType,
    PointFeature, PointLayer,
};

/// Travel profile understood by the isochrone service.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Profile {
    /// On foot.
    #[default]
    #[serde(rename = "hike")]
    #[strum(serialize = "hike")]
    Walking,
    /// By bicycle.
    #[serde(rename = "bike")]
    #[strum(serialize = "bike")]
    Cycling,
    /// By car.
    #[serde(rename = "car")]
    #[strum(serialize = "car")]
    Driving,
}

/// Unit of the isochrone limit.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Unit {
    /// Travel time in minutes.
    #[default]
    Minutes,
    /// Travel distance in meters.
    Meters,
}

/// Allowed distance values for a [`Unit`], as offered to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceRange {
    /// Increment between offered values.
    pub step: u32,
    /// Smallest accepted value.
    pub min: u32,
    /// Largest accepted value.
    pub max: u32,
    /// Value preselected for a fresh run.
    pub default: u32,
}

impl DistanceRange {
    /// Whether `distance` lies within `min..=max`.
    #[must_use]
    pub const fn contains(&self, distance: u32) -> bool {
        distance >= self.min && distance <= self.max
    }
}

impl Unit {
    /// Returns the distance presets for this unit.
    #[must_use]
    pub const fn distance_range(self) -> DistanceRange {
        match self {
            Self::Minutes => DistanceRange {
                step: 5,
                min: 5,
                max: 120,
                default: 30,
            },
            Self::Meters => DistanceRange {
                step: 500,
                min: 500,
                max: 10_000,
                default: 2000,
            },
        }
    }
}

/// Everything the caller supplies to start an isochrone run.
///
/// Fields are optional the way a half-filled form is; use
/// [`IsochroneOptions::validate`] to obtain a [`ValidOptions`].
#[derive(Debug, Clone)]
pub struct IsochroneOptions {
    /// Base URL of the isochrone service (scheme optional).
    pub url: String,
    /// API key appended as `key` when non-empty.
    pub api_key: Option<String>,
    /// Source point layer.
    pub layer: Option<PointLayer>,
    /// Optional limiting boundary polygons.
    pub boundary_layer: Option<BoundaryLayer>,
    /// Only use the selected features of [`Self::layer`].
    pub selected_only: bool,
    /// Total distance or time limit.
    pub distance: Option<u32>,
    /// Unit of [`Self::distance`].
    pub unit: Option<Unit>,
    /// Number of concentric buckets per point.
    pub buckets: u32,
    /// Travel profile.
    pub profile: Option<Profile>,
    /// Directory to persist the result layer into.
    pub output_dir: Option<PathBuf>,
}

impl Default for IsochroneOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            layer: None,
            boundary_layer: None,
            selected_only: false,
            distance: None,
            unit: None,
            buckets: 1,
            profile: None,
            output_dir: None,
        }
    }
}

/// Reasons an [`IsochroneOptions`] bundle cannot be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    /// No service URL given.
    #[error("isochrone service URL is empty")]
    EmptyUrl,
    /// No point layer given.
    #[error("no point layer selected")]
    MissingLayer,
    /// No distance given.
    #[error("no distance given")]
    MissingDistance,
    /// No unit given.
    #[error("no distance unit selected")]
    MissingUnit,
    /// No profile given.
    #[error("no travel profile selected")]
    MissingProfile,
    /// Bucket count below one.
    #[error("bucket count must be at least 1")]
    ZeroBuckets,
}

/// A complete options bundle.
#[derive(Debug, Clone)]
pub struct ValidOptions {
    /// Base URL of the isochrone service, as entered.
    pub url: String,
    /// API key, `None` when not configured.
    pub api_key: Option<String>,
    /// Source point layer.
    pub layer: PointLayer,
    /// Optional limiting boundary polygons.
    pub boundary_layer: Option<BoundaryLayer>,
    /// Only use the selected features of [`Self::layer`].
    pub selected_only: bool,
    /// Total distance or time limit.
    pub distance: u32,
    /// Unit of [`Self::distance`].
    pub unit: Unit,
    /// Number of concentric buckets per point.
    pub buckets: u32,
    /// Travel profile.
    pub profile: Profile,
    /// Directory to persist the result layer into.
    pub output_dir: Option<PathBuf>,
}

impl IsochroneOptions {
    /// Whether the layer, distance, unit and profile are set and the URL
    /// is non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.layer.is_some()
            && self.distance.is_some()
            && self.unit.is_some()
            && self.profile.is_some()
            && !self.url.is_empty()
    }

    /// Converts into a [`ValidOptions`].
    ///
    /// # Errors
    ///
    /// Returns the first [`OptionsError`] found.
    pub fn validate(self) -> Result<ValidOptions, OptionsError> {
        if self.url.is_empty() {
            return Err(OptionsError::EmptyUrl);
        }
        let layer = self.layer.ok_or(OptionsError::MissingLayer)?;
        let distance = self.distance.ok_or(OptionsError::MissingDistance)?;
        let unit = self.unit.ok_or(OptionsError::MissingUnit)?;
        let profile = self.profile.ok_or(OptionsError::MissingProfile)?;
        if self.buckets == 0 {
            return Err(OptionsError::ZeroBuckets);
        }

        Ok(ValidOptions {
            url: self.url,
            api_key: self.api_key.filter(|key| !key.is_empty()),
            layer,
            boundary_layer: self.boundary_layer,
            selected_only: self.selected_only,
            distance,
            unit,
            buckets: self.buckets,
            profile,
            output_dir: self.output_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> IsochroneOptions {
        IsochroneOptions {
            url: "http://mock.url".to_string(),
            layer: Some(PointLayer::new("points", Crs::wgs84(), Vec::new())),
            distance: Some(30),
            unit: Some(Unit::Minutes),
            profile: Some(Profile::Walking),
            ..IsochroneOptions::default()
        }
    }

    #[test]
    fn profile_uses_service_names() {
        assert_eq!(Profile::Walking.to_string(), "hike");
        assert_eq!(Profile::Cycling.as_ref(), "bike");
        assert_eq!("car".parse::<Profile>().unwrap(), Profile::Driving);
    }

    #[test]
    fn unit_round_trips_through_strings() {
        assert_eq!(Unit::Minutes.to_string(), "minutes");
        assert_eq!("meters".parse::<Unit>().unwrap(), Unit::Meters);
        assert!("miles".parse::<Unit>().is_err());
    }

    #[test]
    fn complete_options_validate() {
        let opts = complete();
        assert!(opts.is_complete());
        let valid = opts.validate().unwrap();
        assert_eq!(valid.distance, 30);
        assert_eq!(valid.buckets, 1);
        assert!(valid.api_key.is_none());
    }

    #[test]
    fn each_missing_field_is_reported() {
        let mut opts = complete();
        opts.url.clear();
        assert!(!opts.is_complete());
        assert_eq!(opts.validate().unwrap_err(), OptionsError::EmptyUrl);

        let mut opts = complete();
        opts.layer = None;
        assert!(!opts.is_complete());
        assert_eq!(opts.validate().unwrap_err(), OptionsError::MissingLayer);

        let mut opts = complete();
        opts.distance = None;
        assert_eq!(opts.validate().unwrap_err(), OptionsError::MissingDistance);

        let mut opts = complete();
        opts.unit = None;
        assert_eq!(opts.validate().unwrap_err(), OptionsError::MissingUnit);

        let mut opts = complete();
        opts.profile = None;
        assert_eq!(opts.validate().unwrap_err(), OptionsError::MissingProfile);
    }

    #[test]
    fn zero_buckets_rejected() {
        let mut opts = complete();
        opts.buckets = 0;
        assert_eq!(opts.validate().unwrap_err(), OptionsError::ZeroBuckets);
    }

    #[test]
    fn empty_api_key_is_dropped() {
        let mut opts = complete();
        opts.api_key = Some(String::new());
        assert!(opts.validate().unwrap().api_key.is_none());
    }

    #[test]
    fn distance_presets() {
        let minutes = Unit::Minutes.distance_range();
        assert_eq!(minutes.default, 30);
        assert!(minutes.contains(120));
        assert!(!minutes.contains(121));

        let meters = Unit::Meters.distance_range();
        assert_eq!(meters.step, 500);
        assert!(meters.contains(2000));
        assert!(!meters.contains(100));
    }
}

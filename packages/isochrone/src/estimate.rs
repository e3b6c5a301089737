//! Run duration heuristic.
//!
//! Request cost grows exponentially with the area an isochrone covers.
//! The distance is first converted to the minutes a pedestrian would need,
//! then fed into an exponential per-request cost.

use catchment_isochrone_models::{Profile, Unit};

/// Walking speed used to turn meters into minutes (5 km/h).
const METERS_PER_WALKING_MINUTE: f64 = 83.3;
/// Requests per batch the cost model is calibrated for.
const REQUESTS_PER_BATCH: f64 = 200.0;
/// Longest run, in minutes, that is still offered.
const MAX_MINUTES: f64 = 120.0;

/// Reasons no duration can be offered.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum EstimateError {
    /// The run would take longer than two hours.
    #[error("Estimated processing time exceeds two hours")]
    TooHeavy,
}

/// Distance a pedestrian covers in the same time, in walking minutes.
#[must_use]
pub fn walking_minutes(distance: u32, unit: Unit, profile: Profile) -> f64 {
    let distance = f64::from(distance);
    match (unit, profile) {
        (Unit::Meters, _) => distance / METERS_PER_WALKING_MINUTE,
        (Unit::Minutes, Profile::Cycling) => 3.0 * distance,
        (Unit::Minutes, Profile::Driving) => 10.0 * distance,
        (Unit::Minutes, Profile::Walking) => distance,
    }
}

/// Estimates the run duration in whole minutes.
///
/// Returns `Ok(None)` when there is nothing to fetch.
///
/// # Errors
///
/// Returns [`EstimateError::TooHeavy`] if the estimate exceeds two hours
/// or cannot be computed.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn estimate_duration(
    points: usize,
    buckets: u32,
    distance: u32,
    unit: Unit,
    profile: Profile,
) -> Result<Option<u64>, EstimateError> {
    if points == 0 || buckets == 0 {
        return Ok(None);
    }
    let count = points as f64 * f64::from(buckets);

    let baseline = walking_minutes(distance, unit, profile);
    let minutes_per_thousand = 10.0 * 2f64.powf(baseline / 100.0 - 6.0);
    let total = count / REQUESTS_PER_BATCH * (minutes_per_thousand + 1.0);

    if !total.is_finite() || total > MAX_MINUTES {
        return Err(EstimateError::TooHeavy);
    }
    Ok(Some(total.floor() as u64))
}

/// Operator-facing text for an estimate.
#[must_use]
pub fn describe_estimate(estimate: Result<Option<u64>, EstimateError>) -> String {
    match estimate {
        Ok(None) => "No points to process.".to_string(),
        Ok(Some(0)) => "Approximate processing time: less than a minute".to_string(),
        Ok(Some(minutes)) => format!(
            "Approximate processing time: {minutes} mins (depends on the speed of your \
             GraphHopper instance)"
        ),
        Err(EstimateError::TooHeavy) => "Processing could take hours. Consider fewer points, \
                                         fewer buckets or a smaller distance."
            .to_string(),
    }
}

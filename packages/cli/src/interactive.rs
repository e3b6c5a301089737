//! Interactive mode.
//!
//! Walks the operator through the same choices as `catchment run`, using
//! the saved settings as defaults, then starts the run.

use std::path::PathBuf;

use catchment_cli_utils::MultiProgress;
use catchment_isochrone::estimate::{describe_estimate, estimate_duration};
use catchment_isochrone::io::read_point_layer;
use catchment_isochrone_models::{Profile, Unit};
use dialoguer::{Confirm, Input, Select};

use crate::run::{self, RunArgs};
use crate::settings::Settings;

const PROFILES: &[(Profile, &str)] = &[
    (Profile::Walking, "Walking (hike)"),
    (Profile::Cycling, "Cycling (bike)"),
    (Profile::Driving, "Driving (car)"),
];

const UNITS: &[(Unit, &str)] = &[(Unit::Minutes, "Minutes"), (Unit::Meters, "Meters")];

/// Prompts for run parameters and executes the run.
///
/// # Errors
///
/// Returns an error if a prompt fails or the run cannot start.
#[allow(clippy::future_not_send)]
pub async fn run(
    multi: &MultiProgress,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Catchment isochrones");
    println!();

    let points: String = Input::new()
        .with_prompt("Point layer (GeoJSON)")
        .interact_text()?;
    let points = PathBuf::from(points);

    let boundaries: String = Input::new()
        .with_prompt("Boundary layer (empty for none)")
        .allow_empty(true)
        .interact_text()?;

    let url: String = Input::new()
        .with_prompt("GraphHopper URL")
        .default(settings.url.clone().unwrap_or_default())
        .interact_text()?;

    let labels: Vec<&str> = PROFILES.iter().map(|(_, label)| *label).collect();
    let profile = PROFILES[Select::new()
        .with_prompt("Travel profile")
        .items(&labels)
        .default(0)
        .interact()?]
    .0;

    let labels: Vec<&str> = UNITS.iter().map(|(_, label)| *label).collect();
    let unit = UNITS[Select::new()
        .with_prompt("Unit")
        .items(&labels)
        .default(0)
        .interact()?]
    .0;

    let range = unit.distance_range();
    let distance_str: String = Input::new()
        .with_prompt(format!(
            "Distance ({}..={} {unit}, step {})",
            range.min, range.max, range.step
        ))
        .default(range.default.to_string())
        .interact_text()?;
    let distance: u32 = distance_str.parse().unwrap_or(range.default);

    let buckets_str: String = Input::new()
        .with_prompt("Buckets")
        .default("1".to_string())
        .interact_text()?;
    let buckets: u32 = buckets_str.parse().unwrap_or(1);

    if let Ok(layer) = read_point_layer(&points) {
        println!(
            "{}",
            describe_estimate(estimate_duration(
                layer.feature_count(),
                buckets,
                distance,
                unit,
                profile,
            ))
        );
    }

    if !Confirm::new()
        .with_prompt("Start fetching isochrones?")
        .default(true)
        .interact()?
    {
        println!("Cancelled.");
        return Ok(());
    }

    let args = RunArgs {
        points,
        boundaries: Some(PathBuf::from(boundaries)).filter(|p| !p.as_os_str().is_empty()),
        url: Some(url),
        api_key: None,
        distance: Some(distance),
        unit,
        profile,
        buckets,
        selected: Vec::new(),
        output_dir: None,
        config: None,
    };
    run::execute(multi, args, settings).await?;
    Ok(())
}

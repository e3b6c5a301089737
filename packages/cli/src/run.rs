//! The `run` command: fetch isochrones for a point file and register the
//! result layer.

use std::path::PathBuf;
use std::sync::Arc;

use catchment_cli_utils::{IndicatifProgress, MultiProgress};
use catchment_isochrone::MAIN_TARGET;
use catchment_isochrone::config::TaskConfig;
use catchment_isochrone::estimate::{describe_estimate, estimate_duration};
use catchment_isochrone::io::{read_boundary_layer, read_point_layer};
use catchment_isochrone::outcome::{LogSink, ProjectHost, ResultLayer};
use catchment_isochrone::task::IsochroneTask;
use catchment_isochrone_models::{
    BoundaryLayer, FeatureId, IsochroneOptions, PointLayer, Profile, Unit,
};
use catchment_spatial::WebMercatorReprojector;
use clap::Args;

use crate::settings::Settings;

/// Arguments of a run.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// `GeoJSON` file with the starting points
    #[arg(long)]
    pub points: PathBuf,
    /// `GeoJSON` file with polygons limiting the isochrones
    #[arg(long)]
    pub boundaries: Option<PathBuf>,
    /// Isochrone service URL (defaults to the `url` setting)
    #[arg(long)]
    pub url: Option<String>,
    /// Service API key (defaults to the `api_key` setting)
    #[arg(long)]
    pub api_key: Option<String>,
    /// Travel limit in `--unit` (defaults to the unit's preset)
    #[arg(long)]
    pub distance: Option<u32>,
    /// Unit of the travel limit: minutes or meters
    #[arg(long, default_value = "minutes")]
    pub unit: Unit,
    /// Travel profile: hike, bike or car
    #[arg(long, default_value = "hike")]
    pub profile: Profile,
    /// Number of concentric isochrones per point
    #[arg(long, default_value = "1")]
    pub buckets: u32,
    /// Only use these point ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub selected: Vec<i64>,
    /// Directory to write the result layer to (defaults to the
    /// `result_dir` setting)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Task configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Problems with the command line that stop a run before it starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// Neither `--url` nor the `url` setting is present.
    #[error("No isochrone service URL. Pass --url or run `catchment settings set url <url>`")]
    MissingUrl,

    /// The travel limit is outside the unit's accepted range.
    #[error("Distance {distance} is outside {min}..={max} {unit}")]
    DistanceOutOfRange {
        /// Requested limit.
        distance: u32,
        /// Unit of the limit.
        unit: Unit,
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
    },

    /// None of the `--selected` ids exist in the point layer.
    #[error("None of the selected ids exist in {0}")]
    EmptySelection(String),
}

/// Combines the arguments, the settings and the loaded layers into task
/// options. Command line values win over settings.
///
/// # Errors
///
/// Returns [`RunError`] if no URL is known, the distance is out of range or
/// the selection matches no point.
pub fn options_from(
    args: &RunArgs,
    settings: &Settings,
    mut layer: PointLayer,
    boundary_layer: Option<BoundaryLayer>,
) -> Result<IsochroneOptions, RunError> {
    let url = args
        .url
        .clone()
        .or_else(|| settings.url.clone())
        .filter(|url| !url.trim().is_empty())
        .ok_or(RunError::MissingUrl)?;

    let range = args.unit.distance_range();
    let distance = args.distance.unwrap_or(range.default);
    if !range.contains(distance) {
        return Err(RunError::DistanceOutOfRange {
            distance,
            unit: args.unit,
            min: range.min,
            max: range.max,
        });
    }

    let selected_only = !args.selected.is_empty();
    if selected_only {
        layer.select(args.selected.iter().copied().map(FeatureId));
        if layer.selected_feature_count() == 0 {
            return Err(RunError::EmptySelection(layer.name));
        }
    }

    Ok(IsochroneOptions {
        url,
        api_key: args.api_key.clone().or_else(|| settings.api_key.clone()),
        layer: Some(layer),
        boundary_layer,
        selected_only,
        distance: Some(distance),
        unit: Some(args.unit),
        buckets: args.buckets,
        profile: Some(args.profile),
        output_dir: args
            .output_dir
            .clone()
            .or_else(|| settings.result_dir.clone()),
    })
}

/// Runs a task to completion and prints what was added.
///
/// Ctrl-C cancels the run after the point in flight. Returns whether a
/// result layer was registered.
///
/// # Errors
///
/// Returns an error if the configuration or an input file cannot be read,
/// the options are unusable, or the HTTP client cannot be built.
pub async fn execute(
    multi: &MultiProgress,
    args: RunArgs,
    settings: &Settings,
) -> Result<bool, Box<dyn std::error::Error>> {
    let config = match args.config.as_deref() {
        Some(path) => TaskConfig::load(path)?,
        None => TaskConfig::embedded()?,
    };
    let layer = read_point_layer(&args.points)?;
    let boundary_layer = args
        .boundaries
        .as_deref()
        .map(read_boundary_layer)
        .transpose()?;
    let options = options_from(&args, settings, layer, boundary_layer)?;

    let task = IsochroneTask::new(options, &WebMercatorReprojector, config)?;
    log::info!(
        target: MAIN_TARGET,
        "{}",
        describe_estimate(estimate_duration(
            task.points().len(),
            args.buckets,
            args.distance.unwrap_or(args.unit.distance_range().default),
            args.unit,
            args.profile,
        ))
    );

    let service = Arc::new(task.http_service()?);
    let finalizer = task.finalizer();
    let progress = IndicatifProgress::task_bar(multi, &task.description());
    let handle = task.spawn(service, progress);

    let cancel = handle.cancellation_flag();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!(target: MAIN_TARGET, "Cancelling after the current point...");
            cancel.cancel();
        }
    });
    let outcome = handle.join().await;
    interrupt.abort();

    let state = outcome.state();
    let mut host = ProjectHost::new();
    let result = finalizer.finalize(outcome, &mut host, &LogSink);

    match &result {
        Some(ResultLayer::File(persisted)) => println!(
            "{} ({} isochrones) saved to {}",
            persisted.name,
            persisted.feature_count,
            persisted.path.display()
        ),
        Some(layer @ ResultLayer::Memory(_)) => println!(
            "{} ({} isochrones) was not saved; pass --output-dir to keep it",
            layer.name(),
            layer.feature_count()
        ),
        None => println!("No layer added (task {state})"),
    }

    Ok(result.is_some())
}

#[cfg(test)]
mod tests {
    use catchment_isochrone_models::{Crs, PointFeature};
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["catchment", "--points", "schools.geojson"];
        argv.extend_from_slice(extra);
        TestCli::parse_from(argv).run
    }

    fn layer() -> PointLayer {
        let mut layer = PointLayer::new("schools", Crs::wgs84(), Vec::new());
        layer.push(PointFeature::new(FeatureId(1), geo::point!(x: 1.0, y: 1.0)));
        layer.push(PointFeature::new(FeatureId(2), geo::point!(x: 2.0, y: 2.0)));
        layer
    }

    fn settings() -> Settings {
        Settings {
            url: Some("localhost:8989".to_string()),
            api_key: Some("stored".to_string()),
            result_dir: Some(PathBuf::from("/tmp/results")),
        }
    }

    #[test]
    fn defaults_come_from_settings_and_presets() {
        let options = options_from(&args(&[]), &settings(), layer(), None).unwrap();
        assert_eq!(options.url, "localhost:8989");
        assert_eq!(options.api_key.as_deref(), Some("stored"));
        assert_eq!(options.output_dir, Some(PathBuf::from("/tmp/results")));
        assert_eq!(options.distance, Some(30));
        assert_eq!(options.unit, Some(Unit::Minutes));
        assert_eq!(options.profile, Some(Profile::Walking));
        assert_eq!(options.buckets, 1);
        assert!(!options.selected_only);
    }

    #[test]
    fn arguments_override_settings() {
        let a = args(&[
            "--url",
            "https://graphhopper.example",
            "--api-key",
            "abc",
            "--unit",
            "meters",
            "--profile",
            "bike",
            "--buckets",
            "3",
            "--output-dir",
            "out",
        ]);
        let options = options_from(&a, &settings(), layer(), None).unwrap();
        assert_eq!(options.url, "https://graphhopper.example");
        assert_eq!(options.api_key.as_deref(), Some("abc"));
        assert_eq!(options.distance, Some(2000));
        assert_eq!(options.profile, Some(Profile::Cycling));
        assert_eq!(options.buckets, 3);
        assert_eq!(options.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn missing_url_is_rejected() {
        let result = options_from(&args(&[]), &Settings::default(), layer(), None);
        assert_eq!(result.unwrap_err(), RunError::MissingUrl);
    }

    #[test]
    fn distance_must_fit_the_unit() {
        let result = options_from(&args(&["--distance", "500"]), &settings(), layer(), None);
        assert_eq!(
            result.unwrap_err(),
            RunError::DistanceOutOfRange {
                distance: 500,
                unit: Unit::Minutes,
                min: 5,
                max: 120,
            }
        );
    }

    #[test]
    fn selection_restricts_points() {
        let options =
            options_from(&args(&["--selected", "2,9"]), &settings(), layer(), None).unwrap();
        assert!(options.selected_only);
        let layer = options.layer.unwrap();
        assert_eq!(layer.selected_feature_count(), 1);
        assert!(layer.selected_ids().contains(&FeatureId(2)));
    }

    #[test]
    fn unknown_selection_is_rejected() {
        let result = options_from(&args(&["--selected", "7"]), &settings(), layer(), None);
        assert_eq!(
            result.unwrap_err(),
            RunError::EmptySelection("schools".to_string())
        );
    }

    #[tokio::test]
    async fn missing_points_file_fails_before_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(&[]);
        a.points = dir.path().join("missing.geojson");
        let multi = MultiProgress::new();
        assert!(execute(&multi, a, &settings()).await.is_err());
    }
}

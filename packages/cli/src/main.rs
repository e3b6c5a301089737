#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line host for isochrone runs.
//!
//! ```text
//! catchment run --points schools.geojson --distance 15 --profile bike
//! catchment estimate --points 1200 --distance 30
//! catchment settings show
//! catchment settings set url localhost:8989
//! ```
//!
//! Running `catchment` with no subcommand enters interactive mode.
//!
//! Uses `indicatif-log-bridge` (via [`catchment_cli_utils::init_logger`])
//! so that task log lines and the progress bar never fight for the
//! terminal.

mod interactive;
mod run;
mod settings;

use std::path::PathBuf;

use catchment_isochrone::estimate::{describe_estimate, estimate_duration};
use catchment_isochrone_models::{Profile, Unit};
use clap::{Parser, Subcommand};

use crate::run::RunArgs;
use crate::settings::{DEFAULT_SETTINGS_PATH, SettingKey, Settings};

#[derive(Parser)]
#[command(
    name = "catchment",
    about = "Fetch GraphHopper isochrones for point layers"
)]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch isochrones for every point of a layer
    Run(RunArgs),
    /// Estimate how long a run would take
    Estimate {
        /// Number of points
        #[arg(long)]
        points: usize,
        /// Travel limit in `--unit` (defaults to the unit's preset)
        #[arg(long)]
        distance: Option<u32>,
        /// Unit of the travel limit: minutes or meters
        #[arg(long, default_value = "minutes")]
        unit: Unit,
        /// Travel profile: hike, bike or car
        #[arg(long, default_value = "hike")]
        profile: Profile,
        /// Number of concentric isochrones per point
        #[arg(long, default_value = "1")]
        buckets: u32,
    },
    /// Show or change saved settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print the saved settings
    Show,
    /// Change one setting (an empty value clears it)
    Set {
        /// Setting to change
        key: SettingKey,
        /// New value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = catchment_cli_utils::init_logger();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.settings)?;

    let Some(command) = cli.command else {
        return interactive::run(&multi, &settings).await;
    };

    match command {
        Commands::Run(args) => {
            if !run::execute(&multi, args, &settings).await? {
                std::process::exit(1);
            }
        }
        Commands::Estimate {
            points,
            distance,
            unit,
            profile,
            buckets,
        } => {
            let distance = distance.unwrap_or(unit.distance_range().default);
            println!(
                "{}",
                describe_estimate(estimate_duration(points, buckets, distance, unit, profile))
            );
        }
        Commands::Settings { command } => match command {
            SettingsCommand::Show => {
                println!("{}", cli.settings.display());
                println!("{settings}");
            }
            SettingsCommand::Set { key, value } => {
                let mut settings = settings;
                settings.set(key, &value);
                settings.save(&cli.settings)?;
                println!("Saved {}", cli.settings.display());
            }
        },
    }

    Ok(())
}

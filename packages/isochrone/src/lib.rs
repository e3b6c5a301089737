#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Isochrone fetching and assembly.
//!
//! An [`IsochroneTask`](task::IsochroneTask) takes a point layer, asks a
//! GraphHopper-compatible service for the isochrones around every point,
//! clips them to the limiting boundaries resolved by
//! [`catchment_spatial`], and collects the result in an
//! [`IsochroneLayer`](layer::IsochroneLayer). The run ends in a
//! [`TaskOutcome`](outcome::TaskOutcome) which a
//! [`Finalizer`](outcome::Finalizer) turns into host side effects:
//! registering the layer, persisting it, and telling the operator what
//! happened.
//!
//! Log output goes to two targets: [`MAIN_TARGET`] for messages meant for
//! the operator and [`TASK_TARGET`] for the background worker.

pub mod client;
pub mod config;
pub mod estimate;
pub mod io;
pub mod layer;
pub mod outcome;
pub mod progress;
pub mod task;

use catchment_spatial::ReprojectError;
use thiserror::Error;

/// Log target for operator-facing messages.
pub const MAIN_TARGET: &str = "catchment::main";

/// Log target for the background worker.
pub const TASK_TARGET: &str = "catchment::task";

/// Errors from a single isochrone request that abort the whole run.
///
/// Routing failures (HTTP 400) are not errors; the client absorbs them.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure: DNS, refused connection, timeout, TLS.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a status other than success or 400.
    #[error("{url} returned {status}")]
    Status {
        /// Requested URL without query.
        url: String,
        /// Status received.
        status: reqwest::StatusCode,
    },

    /// The response body is not an isochrone response.
    #[error("Could not decode isochrone response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors that end a task without a result layer.
#[derive(Debug, Error)]
pub enum TaskError {
    /// An isochrone request failed for a reason other than routing.
    #[error("Network request failed: {0}")]
    Fetch(#[from] FetchError),

    /// An input layer could not be brought into WGS 84.
    #[error("Reprojection failed: {0}")]
    Reprojection(#[from] ReprojectError),

    /// The background worker stopped without producing an outcome.
    #[error("Isochrone task aborted: {0}")]
    Aborted(String),
}

//! The isochrone assembly task.
//!
//! Construction does all the preparation that needs no network: option
//! validation, reprojection to WGS 84, point selection, boundary
//! resolution, naming and the output schema. [`IsochroneTask::step`] then
//! fetches and assembles one point at a time; [`IsochroneTask::run`] drives
//! `step` to completion, reporting progress and honouring cancellation
//! between points.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use catchment_isochrone_models::{
    BoundaryLayer, Crs, IsochroneOptions, PointFeature, PointLayer, Unit, ValidOptions,
};
use catchment_spatial::{CompositeBoundary, Reprojector, intersect, resolve};
use geo::MultiPolygon;
use strum_macros::{AsRefStr, Display};
use tokio::task::JoinHandle;

use crate::client::{HttpIsochroneService, IsochroneService, RequestParams, normalize_base_url};
use crate::config::TaskConfig;
use crate::layer::{IsochroneFeature, IsochroneLayer, LayerStyle, OutputSchema, bucket_distance};
use crate::outcome::{EmptyReason, Finalizer, TaskOutcome};
use crate::progress::ProgressCallback;
use crate::{FetchError, TASK_TARGET, TaskError};

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum TaskState {
    /// Constructed, not started.
    Pending,
    /// Fetching.
    Running,
    /// Finished, with or without features.
    Succeeded,
    /// Stopped by a fatal error.
    Failed,
    /// Stopped on request.
    Cancelled,
}

impl TaskState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Succeeded => 2,
            Self::Failed => 3,
            Self::Cancelled => 4,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Succeeded,
            3 => Self::Failed,
            _ => Self::Cancelled,
        }
    }

    /// Whether the task has stopped.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// State cell shared between a task and its handle.
#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(TaskState::Pending.to_u8())))
    }

    fn get(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: TaskState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

/// Cooperative cancellation request, checked once per point.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Creates a flag that is not raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. The request in flight is finished first.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the flag is raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Loop position after one [`IsochroneTask::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// Points processed so far.
    pub processed: usize,
    /// Points in the run.
    pub total: usize,
    /// Features produced by this step.
    pub features: usize,
    /// `processed / total * 100`.
    pub percent: f64,
    /// Progress line logged at this checkpoint, if it fell on the log
    /// interval.
    pub report: Option<String>,
}

/// Run parameters that only exist for complete options.
#[derive(Debug, Clone)]
struct Plan {
    params: RequestParams,
    distance: u32,
    buckets: u32,
    layer: IsochroneLayer,
}

/// Fetches isochrones for a point layer and assembles them into a layer.
pub struct IsochroneTask {
    name: String,
    url: String,
    output_dir: Option<PathBuf>,
    config: TaskConfig,
    points: Vec<PointFeature>,
    boundaries: Vec<Option<CompositeBoundary>>,
    plan: Option<Plan>,
    next: usize,
    state: SharedState,
}

impl IsochroneTask {
    /// Prepares a run.
    ///
    /// Incomplete options give a task without points that finishes as an
    /// empty success without contacting the service.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Reprojection`] if an input layer cannot be
    /// brought into WGS 84.
    pub fn new(
        options: IsochroneOptions,
        reprojector: &dyn Reprojector,
        config: TaskConfig,
    ) -> Result<Self, TaskError> {
        let url = normalize_base_url(&options.url, &config.service);
        let options = match options.validate() {
            Ok(valid) => valid,
            Err(e) => {
                log::warn!(target: TASK_TARGET, "Isochrone options incomplete: {e}");
                return Ok(Self {
                    name: String::new(),
                    url,
                    output_dir: None,
                    config,
                    points: Vec::new(),
                    boundaries: Vec::new(),
                    plan: None,
                    next: 0,
                    state: SharedState::new(),
                });
            }
        };

        let name = layer_name(&options);
        let ValidOptions {
            api_key,
            layer,
            boundary_layer,
            selected_only,
            distance,
            unit,
            buckets,
            profile,
            output_dir,
            ..
        } = options;

        let layer = to_wgs84_points(layer, reprojector)?;
        let boundary_layer = boundary_layer
            .map(|b| to_wgs84_boundaries(b, reprojector))
            .transpose()?;

        let points: Vec<PointFeature> = if selected_only {
            layer.selected_features().cloned().collect()
        } else {
            layer.features().to_vec()
        };
        let boundaries = boundary_layer.map_or_else(
            || vec![None; points.len()],
            |b| resolve(&points, &b.features),
        );

        let schema = OutputSchema::from_input(&layer.fields);
        let style = LayerStyle {
            fill_opacity: config.fill_opacity,
        };
        let plan = Plan {
            params: RequestParams::new(profile, buckets, distance, unit, api_key.as_deref()),
            distance,
            buckets,
            layer: IsochroneLayer::new(name.clone(), schema, style),
        };

        log::debug!(
            target: TASK_TARGET,
            "Prepared {} points for {url} ({})",
            points.len(),
            name
        );

        Ok(Self {
            name,
            url,
            output_dir,
            config,
            points,
            boundaries,
            plan: Some(plan),
            next: 0,
            state: SharedState::new(),
        })
    }

    /// Name of the result layer. Empty for incomplete options.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text describing the task to the operator.
    #[must_use]
    pub fn description(&self) -> String {
        format!("Fetching GraphHopper isochrones: {}", self.name)
    }

    /// Normalized isochrone endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Points the run will fetch isochrones for.
    #[must_use]
    pub fn points(&self) -> &[PointFeature] {
        &self.points
    }

    /// Composite boundary of each point, in point order.
    #[must_use]
    pub fn boundaries(&self) -> &[Option<CompositeBoundary>] {
        &self.boundaries
    }

    /// Points processed so far.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.next
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// Builds the HTTP service for this task's endpoint and parameters.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the HTTP client cannot be built.
    pub fn http_service(&self) -> Result<HttpIsochroneService, FetchError> {
        let params = self
            .plan
            .as_ref()
            .map(|plan| plan.params.clone())
            .unwrap_or_default();
        HttpIsochroneService::new(self.url.clone(), params, &self.config.service)
    }

    /// The finalizer that applies this task's outcome on the caller side.
    #[must_use]
    pub fn finalizer(&self) -> Finalizer {
        Finalizer::new(
            self.url.clone(),
            self.output_dir.clone(),
            self.config.output_extension.clone(),
        )
    }

    /// Fetches and assembles the next point.
    ///
    /// Returns `None` once every point has been processed.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the request fails for a reason other than
    /// routing. The point is not counted as processed.
    pub async fn step(
        &mut self,
        service: &dyn IsochroneService,
    ) -> Result<Option<Checkpoint>, FetchError> {
        let (Some(plan), Some(point)) = (self.plan.as_mut(), self.points.get(self.next)) else {
            return Ok(None);
        };

        let isochrones = service.fetch_for_point(&point.geometry).await?;
        let boundary = self.boundaries.get(self.next).and_then(Option::as_ref);

        let features: Vec<IsochroneFeature> = isochrones
            .iter()
            .map(|raw| {
                let polygon = raw.to_polygon();
                let (geometry, fids) = match boundary {
                    Some(composite) => (intersect(composite.geometry(), &polygon), composite.fids()),
                    None => (MultiPolygon::from(polygon), String::new()),
                };
                let distance = bucket_distance(raw.bucket(), plan.distance, plan.buckets);
                plan.layer.schema().feature(point, distance, &fids, geometry)
            })
            .collect();
        let produced = features.len();
        plan.layer.extend(features);

        self.next += 1;
        let total = self.points.len();
        let report = progress_line(self.next, total, self.config.progress_log_interval);
        if let Some(line) = &report {
            log::info!(target: TASK_TARGET, "{line}");
        }

        #[allow(clippy::cast_precision_loss)]
        let percent = self.next as f64 / total as f64 * 100.0;
        Ok(Some(Checkpoint {
            processed: self.next,
            total,
            features: produced,
            percent,
            report,
        }))
    }

    /// Processes every remaining point and reports how the run ended.
    ///
    /// `cancel` is checked before each remaining point; a raised flag stops
    /// the run with the features gathered so far. A flag raised while the
    /// last point is in flight no longer stops anything.
    pub async fn run(
        &mut self,
        service: &dyn IsochroneService,
        progress: &dyn ProgressCallback,
        cancel: &CancellationFlag,
    ) -> TaskOutcome {
        self.state.set(TaskState::Running);
        progress.set_total(100);
        progress.set_message(self.description());
        log::info!(target: TASK_TARGET, "Starting isochrone fetch...");

        loop {
            if self.next < self.points.len() && cancel.is_cancelled() {
                return self.cancelled(progress);
            }
            match self.step(service).await {
                Ok(Some(checkpoint)) => {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    progress.set_position(checkpoint.percent.floor() as u64);
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!(
                        target: TASK_TARGET,
                        "Network request failed, aborting run. Error: {e}"
                    );
                    self.state.set(TaskState::Failed);
                    progress.finish_and_clear();
                    return TaskOutcome::Failed(TaskError::Fetch(e));
                }
            }
        }

        self.state.set(TaskState::Succeeded);
        progress.finish(format!("Fetched isochrones for {} points", self.next));
        self.completed()
    }

    /// Spawns [`Self::run`] on the tokio runtime.
    #[must_use]
    pub fn spawn(
        mut self,
        service: Arc<dyn IsochroneService>,
        progress: Arc<dyn ProgressCallback>,
    ) -> TaskHandle {
        let cancel = CancellationFlag::new();
        let state = self.state.clone();
        let worker_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            self.run(service.as_ref(), progress.as_ref(), &worker_cancel)
                .await
        });
        TaskHandle {
            cancel,
            state,
            join,
        }
    }

    fn completed(&mut self) -> TaskOutcome {
        let Some(plan) = self.plan.take() else {
            return TaskOutcome::EmptySuccess(EmptyReason::NoInputPoints);
        };
        let mut layer = plan.layer;
        let count = layer.feature_count();
        let expected = plan.buckets as usize * self.points.len();

        for line in summary_lines(count, expected) {
            log::info!(target: TASK_TARGET, "{line}");
        }

        if count == 0 {
            return TaskOutcome::EmptySuccess(if self.points.is_empty() {
                EmptyReason::NoInputPoints
            } else {
                EmptyReason::NoIsochrones
            });
        }
        layer.update_extents();
        TaskOutcome::Succeeded(layer)
    }

    fn cancelled(&mut self, progress: &dyn ProgressCallback) -> TaskOutcome {
        let total = self.points.len();
        log::warn!(
            target: TASK_TARGET,
            "Task cancelled, only {} out of {total} isochrones calculated",
            self.next
        );
        self.state.set(TaskState::Cancelled);
        progress.finish_and_clear();

        let layer = self.plan.take().map(|plan| {
            let mut layer = plan.layer;
            layer.update_extents();
            layer
        });
        TaskOutcome::Cancelled {
            layer,
            processed: self.next,
            total,
        }
    }
}

/// Handle to a task running on the tokio runtime.
pub struct TaskHandle {
    cancel: CancellationFlag,
    state: SharedState,
    join: JoinHandle<TaskOutcome>,
}

impl TaskHandle {
    /// Asks the task to stop after the point in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the task's cancellation flag, e.g. for a signal handler.
    #[must_use]
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// Waits for the task to finish.
    ///
    /// A worker that panicked or was aborted is reported as
    /// [`TaskError::Aborted`].
    pub async fn join(self) -> TaskOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!(target: TASK_TARGET, "Isochrone worker stopped: {e}");
                self.state.set(TaskState::Failed);
                TaskOutcome::Failed(TaskError::Aborted(e.to_string()))
            }
        }
    }
}

/// `"<k> out of <n> objects fetched"` every `interval` points. Zero disables
/// the line.
fn progress_line(processed: usize, total: usize, interval: usize) -> Option<String> {
    (interval > 0 && processed % interval == 0)
        .then(|| format!("{processed} out of {total} objects fetched"))
}

fn summary_lines(generated: usize, expected: usize) -> [String; 2] {
    [
        format!("Total of {generated} isochrones generated."),
        format!(
            "{} isochrones could not be generated.",
            expected.saturating_sub(generated)
        ),
    ]
}

/// `"<distance> <unit> to [selected ]<layer>[ by <profile>][ limited by <boundaries>]"`.
///
/// The profile is only named for time limits; a distance limit reads the
/// same for every profile. Requests always use reverse flow, hence "to".
fn layer_name(options: &ValidOptions) -> String {
    let selected = if options.selected_only { "selected " } else { "" };
    let profile = match options.unit {
        Unit::Minutes => format!(" by {}", options.profile),
        Unit::Meters => String::new(),
    };
    let limited = options
        .boundary_layer
        .as_ref()
        .map(|b| format!(" limited by {}", b.name))
        .unwrap_or_default();
    format!(
        "{} {} to {selected}{}{profile}{limited}",
        options.distance, options.unit, options.layer.name
    )
}

fn to_wgs84_points(
    layer: PointLayer,
    reprojector: &dyn Reprojector,
) -> Result<PointLayer, TaskError> {
    if layer.crs.is_wgs84() {
        return Ok(layer);
    }
    log::debug!(target: TASK_TARGET, "Reprojecting {} from {}", layer.name, layer.crs);
    Ok(reprojector.reproject_points(&layer, &Crs::wgs84())?)
}

fn to_wgs84_boundaries(
    layer: BoundaryLayer,
    reprojector: &dyn Reprojector,
) -> Result<BoundaryLayer, TaskError> {
    if layer.crs.is_wgs84() {
        return Ok(layer);
    }
    log::debug!(target: TASK_TARGET, "Reprojecting {} from {}", layer.name, layer.crs);
    Ok(reprojector.reproject_boundaries(&layer, &Crs::wgs84())?)
}

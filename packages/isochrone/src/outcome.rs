//! How a run ended and what the host does about it.
//!
//! A task produces exactly one [`TaskOutcome`]. [`Finalizer::finalize`] is
//! the only place that acts on it: it persists and registers a result
//! layer, or tells the operator why there is none.

use std::path::PathBuf;

use log::Level;

use crate::io::{PersistedLayer, persist_layer};
use crate::layer::{IsochroneLayer, LayerStyle};
use crate::task::TaskState;
use crate::{MAIN_TARGET, TASK_TARGET, TaskError};

/// Position result layers are inserted at, right below the top layer.
pub const RESULT_LAYER_INDEX: usize = 1;

/// Why a finished run has no features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// There were no points to fetch isochrones for.
    NoInputPoints,
    /// Every request failed to route.
    NoIsochrones,
}

/// Result of an [`IsochroneTask`](crate::task::IsochroneTask) run.
#[derive(Debug)]
pub enum TaskOutcome {
    /// At least one isochrone was assembled.
    Succeeded(IsochroneLayer),
    /// The run finished without features.
    EmptySuccess(EmptyReason),
    /// A fatal error stopped the run.
    Failed(TaskError),
    /// The run was cancelled after `processed` of `total` points.
    Cancelled {
        /// Features gathered before cancellation, `None` if the task never
        /// had a layer.
        layer: Option<IsochroneLayer>,
        /// Points processed.
        processed: usize,
        /// Points in the run.
        total: usize,
    },
}

impl TaskOutcome {
    /// Whether the run produced a layer to register.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// Terminal state the outcome corresponds to.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        match self {
            Self::Succeeded(_) | Self::EmptySuccess(_) => TaskState::Succeeded,
            Self::Failed(_) => TaskState::Failed,
            Self::Cancelled { .. } => TaskState::Cancelled,
        }
    }
}

/// A registered result layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultLayer {
    /// Kept in memory only.
    Memory(IsochroneLayer),
    /// Persisted to disk.
    File(PersistedLayer),
}

impl ResultLayer {
    /// Layer name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Memory(layer) => layer.name(),
            Self::File(layer) => &layer.name,
        }
    }

    /// Number of features.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        match self {
            Self::Memory(layer) => layer.feature_count(),
            Self::File(layer) => layer.feature_count,
        }
    }

    /// Rendering hints.
    #[must_use]
    pub const fn style(&self) -> LayerStyle {
        match self {
            Self::Memory(layer) => layer.style(),
            Self::File(layer) => layer.style,
        }
    }
}

/// The host's ordered list of layers.
pub trait LayerTree {
    /// Number of layers.
    fn len(&self) -> usize;

    /// Whether the tree has no layers.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `layer` at `index`, which is at most [`Self::len`].
    fn insert_layer(&mut self, index: usize, layer: ResultLayer);
}

/// Minimal in-memory project: a flat list of layers, top first.
#[derive(Debug, Default)]
pub struct ProjectHost {
    layers: Vec<ResultLayer>,
}

impl ProjectHost {
    /// Creates an empty project.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Layers, top first.
    #[must_use]
    pub fn layers(&self) -> &[ResultLayer] {
        &self.layers
    }
}

impl LayerTree for ProjectHost {
    fn len(&self) -> usize {
        self.layers.len()
    }

    fn insert_layer(&mut self, index: usize, layer: ResultLayer) {
        self.layers.insert(index.min(self.layers.len()), layer);
    }
}

/// Receives messages meant for the operator.
pub trait MessageSink: Send + Sync {
    /// Shows `text`, with optional `details` on what to do about it.
    fn message(&self, level: Level, text: &str, details: Option<&str>);
}

/// Writes operator messages to the `catchment::main` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn message(&self, level: Level, text: &str, details: Option<&str>) {
        match details {
            Some(details) => log::log!(target: MAIN_TARGET, level, "{text}. {details}"),
            None => log::log!(target: MAIN_TARGET, level, "{text}"),
        }
    }
}

/// Applies a [`TaskOutcome`] to the host.
#[derive(Debug, Clone)]
pub struct Finalizer {
    url: String,
    output_dir: Option<PathBuf>,
    output_extension: String,
}

impl Finalizer {
    /// Creates a finalizer. `url` is named in failure messages; layers are
    /// persisted into `output_dir` when one is given.
    #[must_use]
    pub const fn new(url: String, output_dir: Option<PathBuf>, output_extension: String) -> Self {
        Self {
            url,
            output_dir,
            output_extension,
        }
    }

    /// Acts on `outcome` and returns the registered layer, if any.
    ///
    /// A successful layer is persisted when an output directory is set,
    /// falling back to the in-memory layer if writing fails, and inserted
    /// into `tree` at [`RESULT_LAYER_INDEX`]. Every other outcome only
    /// produces a message.
    pub fn finalize(
        &self,
        outcome: TaskOutcome,
        tree: &mut dyn LayerTree,
        sink: &dyn MessageSink,
    ) -> Option<ResultLayer> {
        match outcome {
            TaskOutcome::Succeeded(layer) => {
                let result = self.persist(layer);
                sink.message(
                    Level::Info,
                    &format!(
                        "Added {} with {} isochrones",
                        result.name(),
                        result.feature_count()
                    ),
                    None,
                );
                tree.insert_layer(RESULT_LAYER_INDEX.min(tree.len()), result.clone());
                Some(result)
            }
            TaskOutcome::EmptySuccess(EmptyReason::NoIsochrones) => {
                sink.message(
                    Level::Error,
                    "No results, no roads found close to any of the points",
                    Some("Please make sure that Graphhopper contains the roads in your region."),
                );
                None
            }
            TaskOutcome::EmptySuccess(EmptyReason::NoInputPoints) => {
                sink.message(
                    Level::Error,
                    "Starting layer was empty, no isochrones generated",
                    Some("Please check that your starting layer contains at least one point."),
                );
                None
            }
            TaskOutcome::Failed(TaskError::Reprojection(e)) => {
                sink.message(
                    Level::Error,
                    &format!("Could not reproject input layers: {e}"),
                    Some("Please use layers in EPSG:4326 or EPSG:3857."),
                );
                None
            }
            TaskOutcome::Failed(e) => {
                log::debug!(target: TASK_TARGET, "Run failed: {e}");
                sink.message(
                    Level::Error,
                    &format!("GraphHopper request to {} failed", self.url),
                    Some("Please check your Graphhopper url and your Internet connection."),
                );
                None
            }
            TaskOutcome::Cancelled {
                processed, total, ..
            } => {
                sink.message(
                    Level::Warn,
                    &format!(
                        "Task cancelled, only {processed} out of {total} isochrones calculated"
                    ),
                    None,
                );
                None
            }
        }
    }

    fn persist(&self, layer: IsochroneLayer) -> ResultLayer {
        let Some(dir) = self.output_dir.as_deref() else {
            return ResultLayer::Memory(layer);
        };
        if layer.is_empty() {
            return ResultLayer::Memory(layer);
        }
        match persist_layer(&layer, dir, &self.output_extension) {
            Ok(persisted) => {
                log::info!(
                    target: TASK_TARGET,
                    "Saved to file {}",
                    persisted.path.display()
                );
                ResultLayer::File(persisted)
            }
            Err(e) => {
                log::error!(target: TASK_TARGET, "Could not save file: {e}");
                ResultLayer::Memory(layer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::FetchError;
    use crate::fixtures::{point_layer, school};
    use crate::layer::OutputSchema;

    /// Collects messages instead of logging them.
    #[derive(Default)]
    pub struct RecordingSink {
        pub messages: Mutex<Vec<(Level, String, Option<String>)>>,
    }

    impl MessageSink for RecordingSink {
        fn message(&self, level: Level, text: &str, details: Option<&str>) {
            self.messages.lock().unwrap().push((
                level,
                text.to_string(),
                details.map(ToString::to_string),
            ));
        }
    }

    fn layer(features: usize) -> IsochroneLayer {
        let schema = OutputSchema::from_input(&point_layer().fields);
        let mut layer = IsochroneLayer::new(
            "30 minutes to test_points by hike",
            schema.clone(),
            LayerStyle::default(),
        );
        for id in 0..features {
            #[allow(clippy::cast_possible_wrap)]
            let point = school(id as i64 + 1, 1.0, 1.0);
            layer.add_feature(schema.feature(
                &point,
                30.0,
                "",
                geo::MultiPolygon::from(crate::fixtures::square()),
            ));
        }
        layer.update_extents();
        layer
    }

    fn finalizer(output_dir: Option<PathBuf>) -> Finalizer {
        Finalizer::new(
            "http://mock.url/isochrone".to_string(),
            output_dir,
            "geojson".to_string(),
        )
    }

    #[test]
    fn success_registers_layer_below_top() {
        let mut project = ProjectHost::new();
        let sink = RecordingSink::default();
        let f = finalizer(None);

        let first = f.finalize(TaskOutcome::Succeeded(layer(1)), &mut project, &sink);
        assert!(matches!(first, Some(ResultLayer::Memory(_))));
        assert_eq!(project.len(), 1);

        let second = f.finalize(TaskOutcome::Succeeded(layer(2)), &mut project, &sink);
        assert_eq!(second.as_ref().map(ResultLayer::feature_count), Some(2));
        assert_eq!(project.layers()[1].feature_count(), 2);
        assert_eq!(project.layers()[0].feature_count(), 1);
        assert!((project.layers()[1].style().fill_opacity - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn success_with_directory_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = ProjectHost::new();
        let sink = RecordingSink::default();

        let result = finalizer(Some(dir.path().to_path_buf())).finalize(
            TaskOutcome::Succeeded(layer(2)),
            &mut project,
            &sink,
        );
        let Some(ResultLayer::File(persisted)) = result else {
            panic!("expected a persisted layer");
        };
        assert_eq!(
            persisted.path,
            dir.path().join("30 minutes to test_points by hike.geojson")
        );
        assert_eq!(persisted.load().unwrap().len(), 2);
        assert_eq!(project.layers()[0].name(), "30 minutes to test_points by hike");
    }

    #[test]
    fn failed_write_keeps_memory_layer() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "").unwrap();

        let mut project = ProjectHost::new();
        let result = finalizer(Some(blocker)).finalize(
            TaskOutcome::Succeeded(layer(1)),
            &mut project,
            &RecordingSink::default(),
        );
        assert!(matches!(result, Some(ResultLayer::Memory(_))));
        assert_eq!(project.len(), 1);
    }

    #[test]
    fn empty_outcomes_only_message() {
        let mut project = ProjectHost::new();
        let sink = RecordingSink::default();
        let f = finalizer(None);

        assert!(
            f.finalize(
                TaskOutcome::EmptySuccess(EmptyReason::NoIsochrones),
                &mut project,
                &sink
            )
            .is_none()
        );
        assert!(
            f.finalize(
                TaskOutcome::EmptySuccess(EmptyReason::NoInputPoints),
                &mut project,
                &sink
            )
            .is_none()
        );
        assert!(project.is_empty());

        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages[0].0, Level::Error);
        assert_eq!(
            messages[0].1,
            "No results, no roads found close to any of the points"
        );
        assert_eq!(
            messages[1].1,
            "Starting layer was empty, no isochrones generated"
        );
        assert!(messages[1].2.is_some());
    }

    #[test]
    fn failure_names_the_url_and_registers_nothing() {
        let mut project = ProjectHost::new();
        let sink = RecordingSink::default();
        let outcome = TaskOutcome::Failed(TaskError::Fetch(FetchError::Status {
            url: "http://mock.url/isochrone".to_string(),
            status: reqwest::StatusCode::NOT_FOUND,
        }));
        assert_eq!(outcome.state(), TaskState::Failed);

        assert!(finalizer(None).finalize(outcome, &mut project, &sink).is_none());
        assert!(project.is_empty());
        let messages = sink.messages.lock().unwrap();
        assert_eq!(
            messages[0].1,
            "GraphHopper request to http://mock.url/isochrone failed"
        );
        assert_eq!(
            messages[0].2.as_deref(),
            Some("Please check your Graphhopper url and your Internet connection.")
        );
    }

    #[test]
    fn cancellation_is_reported_not_registered() {
        let mut project = ProjectHost::new();
        let sink = RecordingSink::default();
        let outcome = TaskOutcome::Cancelled {
            layer: Some(layer(3)),
            processed: 3,
            total: 10,
        };
        assert_eq!(outcome.state(), TaskState::Cancelled);
        assert!(!outcome.is_success());

        assert!(finalizer(None).finalize(outcome, &mut project, &sink).is_none());
        assert!(project.is_empty());
        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages[0].0, Level::Warn);
        assert_eq!(
            messages[0].1,
            "Task cancelled, only 3 out of 10 isochrones calculated"
        );
    }

    #[test]
    fn empty_success_is_not_success() {
        let outcome = TaskOutcome::EmptySuccess(EmptyReason::NoIsochrones);
        assert!(!outcome.is_success());
        assert_eq!(outcome.state(), TaskState::Succeeded);
    }
}

//! Shared types for cloche: the workflow graph, run/capture records, the
//! status-stream protocol, and the `Runtime`/`PersistenceStore` seams the
//! rest of the workspace builds against.

pub mod id;
pub mod marker;
pub mod observer;
pub mod persistence;
pub mod run;
pub mod runtime;
pub mod workflow;

pub use id::{InstanceId, RunId};
pub use marker::{extract_marker, RESULT_MARKER_PREFIX};
pub use observer::{NullObserver, StepObserver};
pub use persistence::{completed_capture, started_capture, PersistenceStore, StoreError};
pub use run::{merge_captures, Capture, CapturePhase, Run, RunState, StepExecution};
pub use runtime::{Runtime, RuntimeError, RuntimeStartConfig, StatusSource};
pub use status::StatusMessage;
pub use workflow::{Collect, CollectMode, Step, StepKind, Target, Wire, Workflow};

mod status;

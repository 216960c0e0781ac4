//! `gstflow-runs`: the event-sourced run lifecycle.
//!
//! A [`Run`] is rebuilt from its [`RunEvent`] stream; the [`RunStore`] port
//! also keeps the run's write-once input and append-only outputs so a run can
//! be reconstructed and resumed after suspension.

pub mod result;
pub mod run;
pub mod store;

pub use result::{RunResult, RunSummary};
pub use run::{
    CancelRun, CompleteRun, FailRun, HaltRun, ResumeRun, Run, RunCancelled, RunCommand, RunCompleted,
    RunEvent, RunFailed, RunHalted, RunResumed, RunStarted, RunStatus, RunSuspended, StartRun,
    SuspendRun,
};
pub use store::{RunInput, RunOutput, RunStore, RunStoreError};

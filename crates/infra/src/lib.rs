//! Infrastructure layer: in-memory port adapters, configuration and the run
//! coordinator that wires the pipeline together.

pub mod config;
pub mod coordinator;
pub mod decision_store;
pub mod numbering;
pub mod run_store;

pub use config::PipelineConfig;
pub use coordinator::{CoordinatorError, RunCoordinator};

mod integration_tests;

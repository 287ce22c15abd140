pub mod orchestrator;
pub mod plan;

pub use orchestrator::{RunOrchestrator, RunSummary};
pub use plan::{ExtractionUnit, RunPlan};

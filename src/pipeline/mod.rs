// Feature pipeline: ingestion, processing stages and the driver that composes them

pub mod ingestion;
pub mod pipeline;
pub mod processing;
pub mod report;

pub use pipeline::{InspectSummary, Pipeline, PipelineOutcome};
pub use report::TransformationReport;

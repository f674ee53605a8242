pub mod config;
pub mod constants;
pub mod error;
pub mod logging;

// Domain data shapes shared across layers
pub mod domain;

// Stages and the driver that composes them
pub mod pipeline;

// Application and infrastructure boundaries
pub mod app;
pub mod infra;

pub mod observability;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineOutcome, TransformationReport};

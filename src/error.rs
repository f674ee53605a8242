use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input file not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Could not decode {path} as UTF-8 or Latin-1")]
    Encoding { path: String },

    #[error("Missing required column(s): {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{orphans} check step(s) reference no order header after linking")]
    LinkIntegrity { orphans: usize },

    #[error("Output validation failed: {}", failures.join("; "))]
    Validation { failures: Vec<String> },

    #[error("Input contains no order header rows")]
    EmptyInput,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

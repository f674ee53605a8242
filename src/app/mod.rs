pub mod feature_pipeline_use_case;
pub mod ports;

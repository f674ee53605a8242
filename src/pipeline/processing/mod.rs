// Pipeline processing: row classification, linking, filtering, pivot, features and validation

pub mod classify;
pub mod features;
pub mod link;
pub mod origin_filter;
pub mod pivot;
pub mod quality_gate;

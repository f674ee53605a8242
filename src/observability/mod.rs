// Observability: stage metrics

pub mod metrics;

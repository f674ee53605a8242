// Pipeline ingestion: reading and decoding the export

pub mod loader;

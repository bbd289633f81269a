// src/config/mod.rs
pub mod oracle;
pub mod pipeline;

pub use oracle::OracleConfig;
pub use pipeline::PipelineConfig;

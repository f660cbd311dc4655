//! CLI configuration

pub(crate) mod engine;
pub(crate) mod observability;

pub(crate) use engine::EngineConfig;
pub(crate) use observability::{LogFormat, LoggingConfig};

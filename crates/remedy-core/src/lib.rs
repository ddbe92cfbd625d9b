pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ArtifactsConfig, ConfigLoader, LoggingConfig, NotifyConfig, PipelineConfig, ProbeConfig,
    RollbackPolicy, RunnerConfig, SecretsConfig, Settings, TargetConfig,
};
pub use error::*;
pub use types::*;

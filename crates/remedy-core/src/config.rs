use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config as cfg;
use schemars::JsonSchema;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::info;

/// The source file under repair and the test target that guards it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TargetConfig {
    #[serde(default = "TargetConfig::default_source_path")]
    pub source_path: PathBuf,
    #[serde(default = "TargetConfig::default_test_target")]
    pub test_target: PathBuf,
}

impl TargetConfig {
    fn default_source_path() -> PathBuf {
        PathBuf::from("service/cpu_task.py")
    }

    fn default_test_target() -> PathBuf {
        PathBuf::from("tests/test_cpu_task.py")
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            source_path: Self::default_source_path(),
            test_target: Self::default_test_target(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProbeConfig {
    /// Endpoint answering with a JSON object carrying the elapsed time
    #[serde(default = "ProbeConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "ProbeConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Measurement substituted when the probe cannot be read
    #[serde(default = "ProbeConfig::default_sentinel_ms")]
    pub sentinel_ms: f64,
    /// JSON field holding the elapsed milliseconds
    #[serde(default = "ProbeConfig::default_field")]
    pub field: String,
}

impl ProbeConfig {
    fn default_endpoint() -> String {
        "http://127.0.0.1:8000/api/heavy".to_string()
    }

    fn default_timeout_ms() -> u64 {
        10_000
    }

    fn default_sentinel_ms() -> f64 {
        9999.0
    }

    fn default_field() -> String {
        "elapsed_ms".to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            timeout_ms: Self::default_timeout_ms(),
            sentinel_ms: Self::default_sentinel_ms(),
            field: Self::default_field(),
        }
    }
}

/// What to do with a persisted patch whose correctness check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Leave the patch in place and report the regression.
    Keep,
    /// Restore the original text.
    Revert,
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        Self::Keep
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    /// Test-stage runs stop early when the first measurement is at or below this
    #[serde(default = "PipelineConfig::default_threshold_ms")]
    pub threshold_ms: f64,
    /// Pause between persisting a patch and re-measuring
    #[serde(default = "PipelineConfig::default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default)]
    pub rollback: RollbackPolicy,
}

impl PipelineConfig {
    fn default_threshold_ms() -> f64 {
        1500.0
    }

    fn default_settle_delay_ms() -> u64 {
        1000
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold_ms: Self::default_threshold_ms(),
            settle_delay_ms: Self::default_settle_delay_ms(),
            rollback: RollbackPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunnerConfig {
    #[serde(default = "RunnerConfig::default_program")]
    pub program: String,
    /// Arguments placed before the test target
    #[serde(default = "RunnerConfig::default_args")]
    pub args: Vec<String>,
    #[serde(default = "RunnerConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl RunnerConfig {
    fn default_program() -> String {
        "python".to_string()
    }

    fn default_args() -> Vec<String> {
        vec!["-m".into(), "pytest".into(), "-q".into()]
    }

    fn default_timeout_secs() -> u64 {
        300
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
            args: Self::default_args(),
            timeout_secs: Self::default_timeout_secs(),
            working_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotifyConfig {
    #[serde(default = "NotifyConfig::default_enabled")]
    pub enabled: bool,
    /// Webhook receiving prod reports; reports are only logged when unset
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "NotifyConfig::default_recipient")]
    pub recipient: String,
    #[serde(default = "NotifyConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl NotifyConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_recipient() -> String {
        "oncall@example.com".to_string()
    }

    fn default_timeout_secs() -> u64 {
        30
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            endpoint: None,
            recipient: Self::default_recipient(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactsConfig {
    #[serde(default = "ArtifactsConfig::default_dir")]
    pub dir: PathBuf,
}

impl ArtifactsConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from("agent/knowledge")
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct SecretsConfig {
    // Do not serialize secrets; allow deserialization from config/env only.
    #[serde(default, skip_serializing)]
    #[schemars(skip)]
    pub notify_token: Option<SecretString>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Settings {
    #[serde(default = "Settings::default_env")]
    pub env: String,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Self::default_env(),
            target: TargetConfig::default(),
            probe: ProbeConfig::default(),
            pipeline: PipelineConfig::default(),
            runner: RunnerConfig::default(),
            notify: NotifyConfig::default(),
            artifacts: ArtifactsConfig::default(),
            logging: LoggingConfig::default(),
            secrets: SecretsConfig::default(),
        }
    }
}

impl Settings {
    fn default_env() -> String {
        env::var("REMEDY_ENV")
            .ok()
            .or_else(|| env::var("APP_ENV").ok())
            .unwrap_or_else(|| "development".to_string())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.target.source_path.as_os_str().is_empty(),
            "target.source_path cannot be empty"
        );
        anyhow::ensure!(
            !self.probe.endpoint.trim().is_empty(),
            "probe.endpoint cannot be empty"
        );
        anyhow::ensure!(self.probe.timeout_ms > 0, "probe.timeout_ms must be > 0");
        anyhow::ensure!(
            self.probe.sentinel_ms.is_finite() && self.probe.sentinel_ms > 0.0,
            "probe.sentinel_ms must be a positive number"
        );
        anyhow::ensure!(
            self.pipeline.threshold_ms.is_finite() && self.pipeline.threshold_ms > 0.0,
            "pipeline.threshold_ms must be a positive number"
        );
        anyhow::ensure!(
            !self.runner.program.trim().is_empty(),
            "runner.program cannot be empty"
        );
        anyhow::ensure!(self.runner.timeout_secs > 0, "runner.timeout_secs must be > 0");
        anyhow::ensure!(
            !self.artifacts.dir.as_os_str().is_empty(),
            "artifacts.dir cannot be empty"
        );
        Ok(())
    }
}

/// Layered settings loader.
///
/// Sources, lowest precedence first:
/// 1. default.{toml,yaml,yml,json}
/// 2. {environment}.{toml,yaml,yml,json}
/// 3. local.toml
/// 4. Environment variables (REMEDY__* prefix, `__` between sections)
pub struct ConfigLoader;

impl ConfigLoader {
    /// Get the default configuration directory.
    ///
    /// Priority order:
    /// 1. ~/.remedy/ (user-level config)
    /// 2. ./config/ (project-level config)
    /// 3. Current directory (fallback)
    pub fn default_config_dir() -> PathBuf {
        if let Some(home_dir) = dirs::home_dir() {
            let remedy_dir = home_dir.join(".remedy");
            if remedy_dir.exists() {
                info!("Using config directory: {:?}", remedy_dir);
                return remedy_dir;
            }
        }

        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let project_config = cwd.join("config");
        if project_config.exists() {
            info!("Using config directory: {:?}", project_config);
            return project_config;
        }

        info!("Using config directory: {:?}", cwd);
        cwd
    }

    /// Get the config directory path, with an option to specify a custom location
    pub fn get_config_dir(custom_path: Option<PathBuf>) -> PathBuf {
        custom_path.unwrap_or_else(Self::default_config_dir)
    }

    /// Load and validate settings.
    pub fn load(config_dir: Option<PathBuf>, env_override: Option<String>) -> Result<Settings> {
        let env_name = env_override.unwrap_or_else(Settings::default_env);
        let config_dir = Self::get_config_dir(config_dir);
        let settings = Self::load_from_sources(&config_dir, &env_name)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_from_sources(config_dir: &Path, env_name: &str) -> Result<Settings> {
        let mut builder = cfg::Config::builder();
        for stem in ["default", env_name] {
            for ext in ["toml", "yaml", "yml", "json"] {
                builder = builder.add_source(
                    cfg::File::from(config_dir.join(format!("{}.{}", stem, ext))).required(false),
                );
            }
        }
        let builder = builder
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(cfg::Environment::with_prefix("REMEDY").separator("__"))
            .set_default("env", env_name)
            .context("setting default environment name")?;

        let settings: Settings = builder
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;
        Ok(settings)
    }

    /// Render the effective settings as TOML. Secrets are never included.
    pub fn to_toml(settings: &Settings) -> Result<String> {
        toml::to_string_pretty(settings).context("serializing settings to TOML")
    }
}

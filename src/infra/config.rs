use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::fallback::OpeningMode;
use crate::core::parse::BeatLineParser;
use crate::core::planner::{AgentNames, PersistPolicy, PlannerConfig};
use crate::core::rewrite::RewriteConfig;
use crate::core::sanitize::SanitizeThresholds;
use crate::core::violation::DetectThresholds;

/// Config file names probed in the working directory, in priority order
pub const CONFIG_FILES: [&str; 4] = ["beatguard.toml", "beatguard.yaml", "beatguard.json", ".beatguard.toml"];

/// Environment prefix; nested keys use `__` (`BEATGUARD_BACKEND__BASE_URL`)
pub const ENV_PREFIX: &str = "BEATGUARD";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Content store and agent endpoint
    pub backend: BackendConfig,

    /// Agent types per pipeline stage
    pub agents: AgentNames,

    /// Sanitizer and detector thresholds
    pub thresholds: ThresholdsConfig,

    /// Rewrite loop budget
    pub rewrite: RewriteConfig,

    /// Beat-line bounds
    pub parser: BeatLineParser,

    /// Generation settings
    pub generation: GenerationConfig,

    /// Fallback beat settings
    pub fallback: FallbackConfig,

    /// Persistence defaults
    pub persist: PersistConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig
{
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig
{
    fn default() -> Self
    {
        Self { base_url: "http://127.0.0.1:8000".to_string(), timeout_secs: 120 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig
{
    pub sanitize: SanitizeThresholds,
    pub detect: DetectThresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig
{
    /// Planner temperature; unset leaves it to the agent
    pub temperature: Option<f32>,
    /// Skip the model judge and rely on the local detector
    pub local_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig
{
    /// Force a first-chapter opening instead of detecting it
    pub opening: Option<OpeningMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig
{
    /// Policy used by `plan` when `--persist` is not given
    pub policy: Option<PersistPolicy>,
}

impl Config
{
    /// Pipeline settings for a planning session
    pub fn planner(&self) -> PlannerConfig
    {
        PlannerConfig {
            agents: self
                .agents
                .clone(),
            sanitize: self
                .thresholds
                .sanitize,
            detect: self
                .thresholds
                .detect,
            rewrite: self.rewrite,
            parser: self.parser,
            temperature: self
                .generation
                .temperature,
            opening: self
                .fallback
                .opening,
            local_only: self
                .generation
                .local_only,
        }
    }

    pub fn timeout(&self) -> Duration
    {
        Duration::from_secs(
            self.backend
                .timeout_secs,
        )
    }
}

/// Expand `~` and `$VAR` in a user-supplied path
pub fn expand_path(path: &Path) -> Result<PathBuf>
{
    let raw = path.to_string_lossy();
    let expanded =
        shellexpand::full(&raw).with_context(|| format!("Failed to expand path {}", path.display()))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Load configuration: an explicit file, else the first config file found
/// in the working directory, then `BEATGUARD_*` overrides.
pub fn load_config(explicit: Option<&Path>) -> Result<Config>
{
    let mut builder = config::Config::builder();

    match explicit
    {
        Some(path) =>
        {
            let path = expand_path(path)?;
            if !path.exists()
            {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            builder = builder.add_source(config::File::from(path));
        }
        None =>
        {
            if let Some(found) = CONFIG_FILES
                .iter()
                .find(|p| Path::new(p).exists())
            {
                builder = builder.add_source(config::File::with_name(found));
            }
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let dir = expand_path(&args.path)?;
    let config_path = dir.join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        println!("Would write {}:\n{toml_string}", config_path.display());
        return Ok(());
    }

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

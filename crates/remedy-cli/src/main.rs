use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use remedy_core::{ConfigLoader, Hotspot, Settings, Stage};
use remedy_parser::{HotspotDetector, PatchSynthesizer};
use remedy_pipeline::{unified_diff, SourceFile, VerificationPipeline};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod server;

#[derive(Parser)]
#[command(name = "remedy")]
#[command(about = "Remedy - detect and repair exponential recursion in a Python service", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Configuration directory (defaults to ~/.remedy, then ./config)
    #[arg(long, global = true, env = "REMEDY_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Configuration environment overlay (e.g. staging)
    #[arg(long, global = true)]
    env: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Clone, ValueEnum)]
enum StageArg {
    Test,
    Prod,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Test => Stage::Test,
            StageArg::Prod => Stage::Prod,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the measure, patch and verify pipeline against the configured target
    Run {
        /// Pipeline stage
        #[arg(short, long, value_enum, default_value = "test")]
        stage: StageArg,
    },

    /// Show the recursion hotspot of a Python file
    Detect {
        /// Python source file
        file: PathBuf,

        /// List every recursive candidate in priority order
        #[arg(long)]
        all: bool,
    },

    /// Show the patch for the hotspot of a Python file
    Patch {
        /// Python source file
        file: PathBuf,

        /// Persist the patched source
        #[arg(long)]
        write: bool,
    },

    /// Serve the HTTP trigger endpoints
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8088")]
        addr: SocketAddr,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct DetectResult {
    file: String,
    hotspot: Option<Hotspot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidates: Option<Vec<Hotspot>>,
}

#[derive(Serialize)]
struct PatchResult {
    file: String,
    function: Option<String>,
    kind: Option<String>,
    changed: bool,
    written: bool,
    diff: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match execute_command(&cli).await {
        Ok(output) => {
            print_output(&cli.output, &output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    ConfigLoader::load(cli.config_dir.clone(), cli.env.clone())
        .context("Failed to load configuration")
}

/// Logs go to stderr so `--output json` stays machine readable.
fn init_tracing(level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { level };
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn execute_command(cli: &Cli) -> Result<serde_json::Value> {
    match &cli.command {
        Commands::Run { stage } => {
            let settings = load_settings(cli)?;
            init_tracing(&settings.logging.level, cli.verbose);
            let pipeline = VerificationPipeline::from_settings(settings)
                .context("Failed to initialize pipeline")?;
            let result = pipeline
                .run(stage.clone().into())
                .await
                .context("Auto-resolution run failed")?;
            Ok(serde_json::to_value(result)?)
        }

        Commands::Detect { file, all } => {
            init_tracing("warn", cli.verbose);
            execute_detect(file, *all).await
        }

        Commands::Patch { file, write } => {
            init_tracing("warn", cli.verbose);
            execute_patch(file, *write).await
        }

        Commands::Serve { addr } => {
            let settings = load_settings(cli)?;
            init_tracing(&settings.logging.level, cli.verbose);
            let pipeline = VerificationPipeline::from_settings(settings)
                .context("Failed to initialize pipeline")?;
            let state = server::AppState {
                pipeline: Arc::new(pipeline),
            };
            server::serve(*addr, state).await?;
            Ok(serde_json::json!({ "status": "stopped" }))
        }

        Commands::Config => {
            let settings = load_settings(cli)?;
            Ok(serde_json::json!({
                "config": ConfigLoader::to_toml(&settings)?,
            }))
        }
    }
}

async fn execute_detect(file: &Path, all: bool) -> Result<serde_json::Value> {
    let source = SourceFile::new(file)
        .read()
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let detector = HotspotDetector::new();
    let candidates = detector
        .candidates(&source)
        .with_context(|| format!("Failed to analyze {}", file.display()))?;

    let result = DetectResult {
        file: file.display().to_string(),
        hotspot: candidates.first().cloned(),
        candidates: all.then_some(candidates),
    };
    Ok(serde_json::to_value(result)?)
}

async fn execute_patch(file: &Path, write: bool) -> Result<serde_json::Value> {
    let target = SourceFile::new(file);
    let source = target
        .read()
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let hotspot = HotspotDetector::new()
        .detect(&source)
        .with_context(|| format!("Failed to analyze {}", file.display()))?;

    let Some(hotspot) = hotspot else {
        return Ok(serde_json::to_value(PatchResult {
            file: file.display().to_string(),
            function: None,
            kind: None,
            changed: false,
            written: false,
            diff: String::new(),
        })?);
    };

    let synthesis = PatchSynthesizer::new()
        .synthesize(&source, &hotspot)
        .context("Failed to synthesize patch")?;
    let changed = synthesis.changed();

    let written = write && changed;
    if written {
        target
            .write_atomic(&synthesis.text)
            .await
            .with_context(|| format!("Failed to write {}", file.display()))?;
    }

    let result = PatchResult {
        file: file.display().to_string(),
        function: Some(hotspot.function_name.clone()),
        kind: Some(hotspot.kind.to_string()),
        changed,
        written,
        diff: unified_diff(&source, &synthesis.text, &target.file_name()),
    };
    Ok(serde_json::to_value(result)?)
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) if key == "diff" => {
                        println!("{}:", key_colored);
                        print_diff(s);
                    }
                    serde_json::Value::String(s) if s.contains('\n') => {
                        println!("{}:\n{}", key_colored, s);
                    }
                    serde_json::Value::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b {
                            "true".green()
                        } else {
                            "false".red()
                        };
                        println!("{}: {}", key_colored, val_colored);
                    }
                    serde_json::Value::Null => {
                        println!("{}: {}", key_colored, "-".dimmed());
                    }
                    serde_json::Value::Object(_) => {
                        println!("{}:", key_colored);
                        print_pretty(val)?;
                    }
                    _ => {
                        println!("{}: {}", key_colored, val);
                    }
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("\n{}{}:", "Item ".cyan(), (i + 1).to_string().yellow());
                print_pretty(item)?;
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}

fn print_diff(diff: &str) {
    if diff.is_empty() {
        println!("{}", "(no change)".dimmed());
        return;
    }
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else {
            println!("{}", line);
        }
    }
}

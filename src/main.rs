//! Command-line entry point: convert a detector checkpoint into an engine.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use tracing::{error, info};

use det2engine::logging::{LogConfig, init_logging};
use det2engine::profile::parse_shape;
use det2engine::{
    AnchorPoolLoader, ArtifactPersister, ConversionRequest, Converter, Device, EnginePlan,
    ReferenceCompiler, ShapeProfile,
};

/// Convert a two-stage detector into a shape-optimized inference engine
#[derive(Parser, Debug)]
#[command(name = "det2engine")]
#[command(version)]
#[command(about = "Convert a detector checkpoint into an inference engine", long_about = None)]
struct Cli {
    /// Path to the detector config file
    #[arg(long)]
    config: PathBuf,

    /// Path to the detector checkpoint file
    #[arg(long)]
    checkpoint: PathBuf,

    /// Path where the engine state will be saved
    #[arg(long)]
    output: PathBuf,

    /// Enable fp16 inference
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    fp16: bool,

    /// Also save the raw engine next to the state file
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    save_engine: bool,

    /// Target device (cpu, cuda, cuda:N)
    #[arg(long, default_value = "cuda:0")]
    device: String,

    /// Builder workspace limit in bytes
    #[arg(long, default_value_t = det2engine::request::DEFAULT_WORKSPACE_SIZE)]
    workspace_size: u64,

    /// Minimum input shape, e.g. 1x3x800x800
    #[arg(long, requires_all = ["opt_shape", "max_shape"])]
    min_shape: Option<String>,

    /// Optimal input shape, e.g. 1x3x1333x800
    #[arg(long, requires_all = ["min_shape", "max_shape"])]
    opt_shape: Option<String>,

    /// Maximum input shape, e.g. 1x3x1333x1333
    #[arg(long, requires_all = ["min_shape", "opt_shape"])]
    max_shape: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    fn shape_profile(&self) -> Result<Option<ShapeProfile>> {
        match (&self.min_shape, &self.opt_shape, &self.max_shape) {
            (Some(min), Some(opt), Some(max)) => Ok(Some(ShapeProfile::new(
                parse_shape(min)?,
                parse_shape(opt)?,
                parse_shape(max)?,
            )?)),
            (None, None, None) => Ok(None),
            _ => bail!("--min-shape, --opt-shape and --max-shape must be given together"),
        }
    }

    fn request(&self) -> Result<ConversionRequest> {
        let device: Device = self.device.parse()?;
        let mut builder = ConversionRequest::builder(&self.config, &self.checkpoint)
            .device(device)
            .fp16(self.fp16)
            .max_workspace_size(self.workspace_size);
        if let Some(profile) = self.shape_profile()? {
            builder = builder.shape_profile(profile);
        }
        Ok(builder.build())
    }
}

fn run(cli: &Cli) -> Result<()> {
    let request = cli.request()?;
    let converter = Converter::new(ReferenceCompiler::new());

    let conversion = converter
        .run(&AnchorPoolLoader, &request)
        .map_err(|err| {
            let stage = err.stage();
            anyhow::Error::new(err).context(format!("conversion failed at the {stage} stage"))
        })?;
    let artifact = conversion.artifact;

    let written = ArtifactPersister::new(cli.save_engine)
        .save(&artifact, &cli.output)
        .with_context(|| format!("saving engine to {}", cli.output.display()))?;

    if let Some(bytes) = artifact.engine_bytes() {
        let plan = EnginePlan::decode(bytes)?;
        info!(
            profile = %plan.shape_profile,
            precision = %plan.precision,
            device = %plan.device,
            workspace = plan.workspace_required,
            "engine built"
        );
    }
    info!(state = %written.state.display(), engine = ?written.engine, "done");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::info()
    };
    if let Err(err) = init_logging(&log_config) {
        eprintln!("warning: {err}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

//! auscult CLI: classify lung sound recordings and explain the predictions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auscult::{
    default_device, default_device_kind, AnalysisReport, Analyzer, AstConfig,
    AttentionRolloutAnalyzer, AudioClassificationAnalyzer, DefaultBackend, DefaultEngine,
    EngineConfig, FeatureExtractorConfig, GradientSaliencyAnalyzer,
};
use auscult_models::{CheckpointMetadata, ModelCheckpoint};

#[derive(Parser)]
#[command(name = "auscult")]
#[command(author, version)]
#[command(about = "Explainable lung sound classification (Normal / Abnormal)")]
#[command(long_about = "auscult: classify lung auscultation recordings with an Audio Spectrogram
Transformer and explain each prediction as a time-frequency heatmap.

EXAMPLES:
  # Classify a recording
  auscult classify recording.wav --model-dir ./model

  # Gradient saliency, exporting the maps to ./outputs
  auscult explain recording.wav --method gradient --export

  # Attention rollout, printing the full maps
  auscult explain recording.wav --method attention --full

  # Write a randomly initialized model for smoke testing
  auscult init --model-dir ./model --hidden 192 --layers 4 --heads 3")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Engine config JSON; defaults apply to missing fields
    #[arg(long, global = true, env = "AUSCULT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model directory, overriding the config
    #[arg(long, global = true, env = "AUSCULT_MODEL_DIR", value_name = "DIR")]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a recording as Normal or Abnormal
    Classify {
        /// Audio file (wav, flac, mp3, ogg, m4a, ...)
        audio: PathBuf,
    },
    /// Classify a recording and explain the prediction
    Explain {
        /// Audio file
        audio: PathBuf,

        /// Explanation method
        #[arg(long, value_enum, default_value = "gradient")]
        method: Method,

        /// Export the maps as JSON
        #[arg(long)]
        export: bool,

        /// Export directory, overriding the config
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Print full maps instead of their shapes
        #[arg(long)]
        full: bool,
    },
    /// Write configs and randomly initialized weights into the model directory
    Init {
        /// Mel bins
        #[arg(long, default_value = "128")]
        mel_bins: usize,

        /// Frames per input
        #[arg(long, default_value = "1024")]
        max_length: usize,

        /// Embedding width
        #[arg(long, default_value = "768")]
        hidden: usize,

        /// Encoder layers
        #[arg(long, default_value = "12")]
        layers: usize,

        /// Attention heads
        #[arg(long, default_value = "12")]
        heads: usize,
    },
    /// Show backend, config and model geometry
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    /// Input-gradient saliency
    Gradient,
    /// Attention rollout
    Attention,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let config = engine_config(cli.config.as_deref(), cli.model_dir)?;

    match cli.command {
        Commands::Classify { audio } => handle_classify(config, &audio),
        Commands::Explain {
            audio,
            method,
            export,
            output_dir,
            full,
        } => {
            let export = config.export || export;
            let mut config = config.with_export(export);
            if let Some(dir) = output_dir {
                config = config.with_output_dir(dir);
            }
            handle_explain(config, &audio, method, full)
        }
        Commands::Init {
            mel_bins,
            max_length,
            hidden,
            layers,
            heads,
        } => handle_init(&config, mel_bins, max_length, hidden, layers, heads),
        Commands::Info => handle_info(&config),
    }
}

fn engine_config(path: Option<&Path>, model_dir: Option<PathBuf>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    Ok(match model_dir {
        Some(dir) => config.with_model_dir(dir),
        None => config,
    })
}

fn handle_classify(config: EngineConfig, audio: &Path) -> Result<()> {
    let engine = Arc::new(DefaultEngine::from_config(config, default_device()));
    let report = run(&AudioClassificationAnalyzer::new(engine), audio)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_explain(config: EngineConfig, audio: &Path, method: Method, full: bool) -> Result<()> {
    let engine = Arc::new(DefaultEngine::from_config(config, default_device()));
    let analyzer: Box<dyn Analyzer> = match method {
        Method::Gradient => Box::new(GradientSaliencyAnalyzer::new(engine)),
        Method::Attention => Box::new(AttentionRolloutAnalyzer::new(engine)),
    };

    let report = run(analyzer.as_ref(), audio)?;
    let mut value = serde_json::to_value(&report)?;
    if !full {
        elide_maps(&mut value);
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run(analyzer: &dyn Analyzer, audio: &Path) -> Result<AnalysisReport> {
    tracing::info!("Running {} on {}", analyzer.name(), audio.display());
    match analyzer.run(audio) {
        Ok(report) => Ok(report),
        Err(e) => bail!("{} failed [{}]: {}", analyzer.name(), e.kind(), e),
    }
}

/// Replace each 2-D map with a short shape summary.
fn elide_maps(value: &mut Value) {
    for key in ["importance_map", "background_spectrogram"] {
        if let Some(map) = value.get_mut(key) {
            let rows = map.as_array().map_or(0, Vec::len);
            let cols = map
                .get(0)
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            *map = json!(format!("<{rows}x{cols} map, use --full to print>"));
        }
    }
}

fn handle_init(
    config: &EngineConfig,
    mel_bins: usize,
    max_length: usize,
    hidden: usize,
    layers: usize,
    heads: usize,
) -> Result<()> {
    let ast = AstConfig::new(mel_bins, max_length)
        .with_hidden_size(hidden)
        .with_num_layers(layers)
        .with_num_heads(heads);
    ast.validate().context("Invalid model configuration")?;

    let extractor = FeatureExtractorConfig::default()
        .with_feature_size(mel_bins)
        .with_max_length(max_length);

    std::fs::create_dir_all(&config.model_dir)
        .with_context(|| format!("Failed to create {}", config.model_dir.display()))?;

    println!("Initializing model in {}", config.model_dir.display());
    println!("  Mel bins:     {}", mel_bins);
    println!("  Frames:       {}", max_length);
    println!("  Hidden size:  {}", hidden);
    println!("  Layers:       {}", layers);
    println!("  Heads:        {}", heads);
    println!(
        "  Patches:      {} ({}x{})",
        ast.num_patches(),
        ast.frequency_patches(),
        ast.time_patches()
    );

    extractor.save(config.extractor_config_path())?;
    ast.save(config.model_config_path())?;

    let device = default_device();
    let model = ast.init::<DefaultBackend>(&device)?;
    model.save_checkpoint(config.weights_path())?;

    CheckpointMetadata::new("ast")
        .with_config(&ast)?
        .with_extra("source", "random-init")
        .save(config.metadata_path())?;

    println!("\nWrote {}", config.weights_path().display());
    println!(
        "Weights are random: predictions are not meaningful until trained weights replace them."
    );
    Ok(())
}

fn handle_info(config: &EngineConfig) -> Result<()> {
    println!("auscult {}", env!("CARGO_PKG_VERSION"));
    println!("─────────────────────────────────────────");
    println!(
        "  Device:        {} ({:?})",
        default_device_kind(),
        default_device()
    );
    println!("  Model dir:     {}", config.model_dir.display());
    println!("  Output dir:    {}", config.output_dir.display());
    println!("  Export:        {}", if config.export { "enabled" } else { "disabled" });

    let model_config = config.model_config_path();
    if model_config.exists() {
        let ast = AstConfig::from_file(&model_config)?;
        println!();
        println!("  Input:         {} frames x {} mel bins", ast.max_length, ast.num_mel_bins);
        println!(
            "  Encoder:       {} layers, {} heads, width {}",
            ast.num_hidden_layers, ast.num_attention_heads, ast.hidden_size
        );
        println!(
            "  Patches:       {} ({}x{}), {} tokens",
            ast.num_patches(),
            ast.frequency_patches(),
            ast.time_patches(),
            ast.seq_len()
        );
        let weights = if config.weights_path().exists() {
            "present"
        } else {
            "missing"
        };
        println!("  Weights:       {}", weights);
    } else {
        println!(
            "\nNo model config at {}. Run 'auscult init' to create one.",
            model_config.display()
        );
    }
    Ok(())
}

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::*;
use face_quant::WeightLayout;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::commands;

#[derive(Parser)]
#[command(
    name = "face-quant",
    version,
    about = "UINT8 weight quantization for face detection and recognition models",
    long_about = "Quantize the FP32 weights of ONNX face models to UINT8 and report the size reduction"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by `run` and `quantize`.
#[derive(Args)]
struct QuantArgs {
    /// in-place (retype weights, annotate scale/zero point) or qdq (DequantizeLinear nodes)
    #[arg(long)]
    layout: Option<WeightLayout>,

    /// Leave tensors with fewer elements in FP32
    #[arg(long, value_name = "N")]
    min_elements: Option<usize>,

    /// Initializer name to keep in FP32 (repeatable)
    #[arg(long = "exclude", value_name = "NAME")]
    exclude: Vec<String>,

    /// Load each produced model with the inference engine
    #[arg(long)]
    validate: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Quantize the configured models (the face detector/recognizer pair by default)
    Run {
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<String>,

        #[command(flatten)]
        quant: QuantArgs,

        /// Exit non-zero when any model fails
        #[arg(long)]
        strict: bool,
    },

    /// Quantize a single model
    Quantize {
        #[arg(value_name = "MODEL")]
        input: String,

        /// Defaults to the *_int8 sibling of MODEL
        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        quant: QuantArgs,
    },

    /// Show model metadata and initializer statistics
    Info {
        #[arg(value_name = "MODEL")]
        input: String,
    },

    /// Check that a model loads and its graph is connected
    Validate {
        #[arg(value_name = "MODEL")]
        input: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    println!("{}", format!("face-quant v{}", face_quant::VERSION).bold().cyan());
    println!();

    let ok = match cli.command {
        Commands::Run { config, quant, strict } => {
            commands::run(config.as_deref(), &quant.into(), strict)?
        }
        Commands::Quantize { input, output, quant } => {
            commands::quantize(&input, output.as_deref(), &quant.into())?
        }
        Commands::Info { input } => commands::info(&input)?,
        Commands::Validate { input } => commands::validate(&input)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

impl From<QuantArgs> for commands::Overrides {
    fn from(args: QuantArgs) -> Self {
        Self {
            layout: args.layout,
            min_elements: args.min_elements,
            excluded_layers: args.exclude,
            validate: args.validate,
        }
    }
}

//! Command implementations
//!
//! Each command returns `Ok(true)` on success and `Ok(false)` when the process
//! should exit non-zero; configuration errors come back as `Err`.

use anyhow::{Context, Result};
use colored::Colorize;
use face_quant::batch::{run_job, BatchSummary, JobResult, JobStatus, ModelJob};
use face_quant::config::{Config, ModelConfig};
use face_quant::onnx_utils::OnnxModel;
use face_quant::validation::validate_loadable;
use face_quant::WeightLayout;

/// Command-line settings layered over the configuration file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub layout: Option<WeightLayout>,
    pub min_elements: Option<usize>,
    pub excluded_layers: Vec<String>,
    pub validate: bool,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(layout) = self.layout {
            config.layout = layout;
            for model in &mut config.models {
                model.layout = None;
            }
        }
        if let Some(min_elements) = self.min_elements {
            config.min_elements = min_elements;
        }
        config.excluded_layers.extend(self.excluded_layers.iter().cloned());
        config.validate |= self.validate;
    }
}

pub fn run(config_path: Option<&str>, overrides: &Overrides, strict: bool) -> Result<bool> {
    let mut config = match config_path {
        Some(path) => {
            println!("📄 Loading config: {}", path.bold());
            Config::from_file(path).with_context(|| format!("invalid config file '{path}'"))?
        }
        None => Config::face_models(),
    };
    overrides.apply(&mut config);
    config.strict |= strict;
    config.validate()?;

    let jobs = config.jobs();
    println!("🔧 Quantizing {} model(s) to UINT8 ({} layout)", jobs.len(), config.layout);
    println!();

    let mut summary = BatchSummary::default();
    for job in &jobs {
        let result = run_and_print(job, config.validate);
        summary.push(result);
    }

    print_summary(&summary);
    Ok(!config.strict || summary.all_succeeded())
}

pub fn quantize(input: &str, output: Option<&str>, overrides: &Overrides) -> Result<bool> {
    let mut model_config = ModelConfig::new(input, input);
    model_config.name = None;
    model_config.output = output.map(str::to_string);

    let mut config = Config {
        models: vec![model_config],
        ..Config::face_models()
    };
    overrides.apply(&mut config);
    config.validate()?;

    let mut ok = true;
    for job in config.jobs() {
        ok &= run_and_print(&job, config.validate).is_success();
    }
    Ok(ok)
}

pub fn info(input: &str) -> Result<bool> {
    println!("📊 Model Information: {}", input.bold());
    println!();

    let model = OnnxModel::load(input)?;
    let info = model.info();

    println!("  Name:       {}", info.name.cyan());
    if !info.producer.is_empty() {
        println!("  Producer:   {}", info.producer);
    }
    println!("  IR version: {}", info.ir_version);
    println!("  Version:    {}", info.model_version);
    match info.opset {
        Some(opset) => println!("  Opset:      {}", opset),
        None => println!("  Opset:      (not declared)"),
    }
    println!("  Nodes:      {}", info.num_nodes);
    println!();

    println!("  Inputs ({}):", info.inputs.len());
    for input in &info.inputs {
        println!("    - {}", input);
    }
    println!();

    println!("  Outputs ({}):", info.outputs.len());
    for output in &info.outputs {
        println!("    - {}", output);
    }
    println!();

    println!("  Initializers ({}):", info.num_initializers);
    for (dtype, stats) in model.initializer_summary() {
        println!(
            "    {:<8} {:>6} tensors  {:>10.2} MB",
            dtype,
            stats.count,
            stats.bytes as f64 / 1_048_576.0
        );
    }

    let quantized = model.load_quantized_info();
    if !quantized.is_empty() {
        println!();
        let layout = model
            .recorded_layout()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("  Quantized weights: {} ({} layout)", quantized.len(), layout);
    }

    Ok(true)
}

pub fn validate(input: &str) -> Result<bool> {
    println!("🔍 Validating: {}", input.bold());
    println!();

    let model = OnnxModel::load(input)?;
    let connectivity = model.validate_connectivity();
    print!("{}", connectivity.summary());

    let loadable = match validate_loadable(input) {
        Ok(report) => {
            println!(
                "  {} Inference engine: OK ({} inputs, {} outputs)",
                "✓".green(),
                report.inputs.len(),
                report.outputs.len()
            );
            true
        }
        Err(e) => {
            println!("  {} Inference engine: {}", "✗".red(), e);
            false
        }
    };

    Ok(connectivity.valid && loadable)
}

fn run_and_print(job: &ModelJob, validate: bool) -> JobResult {
    println!("📦 {}", job.name.bold());
    println!("  Input:  {}", job.input.display());
    println!("  Output: {}", job.output.display());

    let result = run_job(job, validate);
    print_job_result(&result);
    println!();
    result
}

fn print_job_result(result: &JobResult) {
    match &result.status {
        JobStatus::Succeeded(success) => {
            let size = &success.size;
            let report = &success.report;
            println!("{}", "  ✓ Quantization complete".green());
            println!("  Original size:    {:.2} MB", size.original_mb());
            println!("  Quantized size:   {:.2} MB", size.quantized_mb());
            println!("  Reduction:        {:.1}%", size.reduction_percent());
            println!(
                "  Tensors:          {} quantized, {} skipped",
                report.quantized_count(),
                report.skipped_count()
            );
            println!("  Avg MSE error:    {:.6}", report.average_mse());

            match &success.validation {
                Some(Ok(v)) => println!(
                    "  {} Loads in inference engine ({} inputs, {} outputs)",
                    "✓".green(),
                    v.inputs.len(),
                    v.outputs.len()
                ),
                Some(Err(e)) => println!("  {} {}", "⚠ Validation failed:".yellow(), e),
                None => {}
            }
        }
        JobStatus::SkippedExisting => {
            println!("{}", "  ⏭  Output exists, skipped".yellow());
        }
        JobStatus::Failed(e) => {
            println!("  {} {}", "✗".red(), e);
        }
    }
}

fn print_summary(summary: &BatchSummary) {
    let line = format!("Summary: {}/{} models succeeded", summary.success_count(), summary.total());
    if summary.all_succeeded() {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.yellow().bold());
        for name in summary.failed_names() {
            println!("  {} {}", "✗".red(), name);
        }
    }
}

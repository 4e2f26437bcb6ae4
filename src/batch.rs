//! Sequential per-model quantization jobs and their size statistics.
//!
//! Each job is independent: a missing input or a failed load/transform/save
//! is recorded for that job and the batch moves on to the next one.

use crate::errors::{QuantizeError, Result};
use crate::onnx_utils::OnnxModel;
use crate::quantization::{QuantConfig, QuantizeReport, Quantizer};
use crate::validation::{validate_loadable, ValidationReport};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const BYTES_PER_MB: f64 = 1_048_576.0;

/// `dir/name.onnx` -> `dir/name_int8.onnx`
pub fn int8_sibling(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}_int8.{}", ext.to_string_lossy()),
        None => format!("{stem}_int8"),
    };
    path.with_file_name(file_name)
}

/// One model to quantize.
#[derive(Debug, Clone)]
pub struct ModelJob {
    pub name: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub quant: QuantConfig,
    /// Leave an existing output untouched instead of overwriting it.
    pub skip_existing: bool,
}

impl ModelJob {
    /// Job writing to the `*_int8` sibling of `input`.
    pub fn new(name: &str, input: impl Into<PathBuf>, quant: QuantConfig) -> Self {
        let input = input.into();
        Self {
            name: name.to_string(),
            output: int8_sibling(&input),
            input,
            quant,
            skip_existing: false,
        }
    }
}

/// File sizes before and after quantization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeReport {
    pub original_bytes: u64,
    pub quantized_bytes: u64,
}

impl SizeReport {
    pub fn original_mb(&self) -> f64 {
        self.original_bytes as f64 / BYTES_PER_MB
    }

    pub fn quantized_mb(&self) -> f64 {
        self.quantized_bytes as f64 / BYTES_PER_MB
    }

    /// `(original - quantized) / original * 100`, or `0` for an empty original.
    /// Negative when the output grew.
    pub fn reduction_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        (self.original_bytes as f64 - self.quantized_bytes as f64) / self.original_bytes as f64 * 100.0
    }
}

#[derive(Debug)]
pub struct JobSuccess {
    pub size: SizeReport,
    pub report: QuantizeReport,
    /// `None` when validation was not requested. A failed validation does not
    /// make the job fail.
    pub validation: Option<Result<ValidationReport>>,
}

#[derive(Debug)]
pub enum JobStatus {
    Succeeded(JobSuccess),
    /// Output already present and the job asked to keep it.
    SkippedExisting,
    Failed(QuantizeError),
}

#[derive(Debug)]
pub struct JobResult {
    pub name: String,
    pub output: PathBuf,
    pub status: JobStatus,
}

impl JobResult {
    /// Successful and skipped-existing jobs both count as success.
    pub fn is_success(&self) -> bool {
        !matches!(self.status, JobStatus::Failed(_))
    }
}

/// Results of a whole batch, in job order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    pub fn push(&mut self, result: JobResult) {
        self.results.push(result);
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.success_count() == self.total()
    }
}

/// Load `input`, quantize it with `config` and write the result to `output`.
///
/// The input file is never written.
pub fn quantize_file(input: &Path, output: &Path, config: &QuantConfig) -> Result<QuantizeReport> {
    if input == output {
        return Err(QuantizeError::Config {
            reason: format!("output would overwrite input '{}'", input.display()),
        });
    }

    let mut model = OnnxModel::load(input)?;
    let report = Quantizer::new(config.clone()).quantize_model(&mut model)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| QuantizeError::ModelSave {
            path: output.to_path_buf(),
            reason: format!("failed to create output directory: {e}"),
        })?;
    }
    model.save(output)?;
    Ok(report)
}

/// Run one job. Never panics on a bad model; failures end up in the status.
pub fn run_job(job: &ModelJob, validate: bool) -> JobResult {
    let status = match execute(job, validate) {
        Ok(status) => status,
        Err(e) => {
            warn!(model = %job.name, error = %e, "job failed");
            JobStatus::Failed(e)
        }
    };
    JobResult {
        name: job.name.clone(),
        output: job.output.clone(),
        status,
    }
}

fn execute(job: &ModelJob, validate: bool) -> Result<JobStatus> {
    if !job.input.exists() {
        return Err(QuantizeError::InputNotFound {
            path: job.input.clone(),
        });
    }
    if job.skip_existing && job.output.exists() {
        info!(model = %job.name, output = %job.output.display(), "output exists, skipping");
        return Ok(JobStatus::SkippedExisting);
    }

    let original_bytes = file_size(&job.input).map_err(|reason| QuantizeError::ModelLoad {
        path: job.input.clone(),
        reason,
    })?;

    let report = quantize_file(&job.input, &job.output, &job.quant)?;

    let quantized_bytes = file_size(&job.output).map_err(|reason| QuantizeError::ModelSave {
        path: job.output.clone(),
        reason: format!("output missing after save: {reason}"),
    })?;

    let size = SizeReport {
        original_bytes,
        quantized_bytes,
    };
    info!(
        model = %job.name,
        original_mb = size.original_mb(),
        quantized_mb = size.quantized_mb(),
        reduction = size.reduction_percent(),
        "model quantized"
    );

    let validation = validate.then(|| validate_loadable(&job.output));
    if let Some(Err(e)) = &validation {
        warn!(model = %job.name, error = %e, "validation failed");
    }

    Ok(JobStatus::Succeeded(JobSuccess {
        size,
        report,
        validation,
    }))
}

fn file_size(path: &Path) -> std::result::Result<u64, String> {
    fs::metadata(path).map(|m| m.len()).map_err(|e| e.to_string())
}

/// Run every job in order; one failure never stops the rest.
pub fn run_batch(jobs: &[ModelJob], validate: bool) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for job in jobs {
        summary.push(run_job(job, validate));
    }
    summary
}

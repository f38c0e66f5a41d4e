use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dcard_analyzer_core::{
    analyze_bytes, AnalysisReport, AnalyzeOptions, FirmwareLookup, OutputMode,
    StaticFirmwareCatalog, TimedFirmwareLookup, DEFAULT_LOOKUP_TIMEOUT_MS,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    /// Name shown in the report; defaults to the input file name.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub input: Option<PathBuf>,
    /// Inline dump text, used when `input` is not set.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub mode: OutputMode,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub firmware_catalog: Option<PathBuf>,
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

fn default_lookup_timeout_ms() -> u64 {
    DEFAULT_LOOKUP_TIMEOUT_MS
}

impl Default for AnalyzeRequest {
    fn default() -> Self {
        Self {
            job_id: None,
            label: None,
            input: None,
            text: None,
            mode: OutputMode::Text,
            output: None,
            firmware_catalog: None,
            lookup_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub label: String,
    pub status: JobStatus,
    pub report_path: Option<PathBuf>,
    pub error: Option<String>,
    pub finding_count: usize,
}

#[derive(Debug, Clone)]
struct AnalysisJob {
    label: String,
    status: JobStatus,
    report_path: Option<PathBuf>,
    report: Option<AnalysisReport>,
    error: Option<String>,
}

static JOBS: Lazy<Mutex<HashMap<String, AnalysisJob>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub fn load_firmware_catalog(path: impl AsRef<Path>) -> Result<StaticFirmwareCatalog> {
    StaticFirmwareCatalog::load(path.as_ref())
}

/// Runs the pipeline for one request on the calling thread.
pub fn analyze_now(request: &AnalyzeRequest) -> Result<AnalysisReport> {
    let (label, bytes) = request_input(request)?;
    let options = request_options(request)?;
    let report = analyze_bytes(&label, &bytes, &options);

    if let Some(path) = &request.output {
        let payload =
            serde_json::to_string_pretty(&report).context("failed to serialize report payload")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }
    Ok(report)
}

/// Analyzes independent requests in parallel. Results keep request order.
pub fn analyze_many(requests: &[AnalyzeRequest]) -> Vec<Result<AnalysisReport>> {
    thread::scope(|scope| {
        let handles = requests
            .iter()
            .map(|request| scope.spawn(move || analyze_now(request)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("analysis thread panicked")))
            })
            .collect()
    })
}

pub fn submit_analysis(request: AnalyzeRequest) -> Result<String> {
    let job_id = request
        .job_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let label = request_label(&request);

    {
        let mut jobs = lock_jobs()?;
        jobs.insert(
            job_id.clone(),
            AnalysisJob {
                label,
                status: JobStatus::Running,
                report_path: request.output.clone(),
                report: None,
                error: None,
            },
        );
    }

    let thread_job_id = job_id.clone();
    thread::spawn(move || {
        let result = analyze_now(&request);
        let Ok(mut jobs) = lock_jobs() else {
            warn!("job {thread_job_id}: registry lock poisoned; result dropped");
            return;
        };
        let Some(job) = jobs.get_mut(&thread_job_id) else {
            return;
        };
        match result {
            Ok(report) => {
                info!(
                    "job {thread_job_id}: {} finished with {} finding(s)",
                    report.label,
                    report.findings.len()
                );
                job.report = Some(report);
                job.status = JobStatus::Completed;
                job.error = None;
            }
            Err(err) => {
                warn!("job {thread_job_id}: {err:#}");
                job.status = JobStatus::Failed;
                job.error = Some(format!("{err:#}"));
            }
        }
    });

    Ok(job_id)
}

pub fn get_job(job_id: &str) -> Result<JobSnapshot> {
    let jobs = lock_jobs()?;
    let job = jobs
        .get(job_id)
        .ok_or_else(|| anyhow!("analysis job not found: {job_id}"))?;

    Ok(JobSnapshot {
        job_id: job_id.to_string(),
        label: job.label.clone(),
        status: job.status.clone(),
        report_path: job.report_path.clone(),
        error: job.error.clone(),
        finding_count: job
            .report
            .as_ref()
            .map(|report| report.findings.len())
            .unwrap_or(0),
    })
}

/// Finished report of a job, or `None` while it is still running.
pub fn job_report(job_id: &str) -> Result<Option<AnalysisReport>> {
    let jobs = lock_jobs()?;
    let job = jobs
        .get(job_id)
        .ok_or_else(|| anyhow!("analysis job not found: {job_id}"))?;
    if job.status == JobStatus::Failed {
        return Err(anyhow!(
            "analysis job {job_id} failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(job.report.clone())
}

fn request_label(request: &AnalyzeRequest) -> String {
    if let Some(label) = &request.label {
        return label.clone();
    }
    request
        .input
        .as_ref()
        .and_then(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "inline dump".to_string())
}

fn request_input(request: &AnalyzeRequest) -> Result<(String, Vec<u8>)> {
    let label = request_label(request);
    match (&request.input, &request.text) {
        (Some(path), _) => {
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read dump {}", path.display()))?;
            Ok((label, bytes))
        }
        (None, Some(text)) => Ok((label, text.as_bytes().to_vec())),
        (None, None) => Err(anyhow!("request for {label} has neither an input path nor text")),
    }
}

fn request_options(request: &AnalyzeRequest) -> Result<AnalyzeOptions> {
    let mut options = AnalyzeOptions::default().with_mode(request.mode);
    if let Some(path) = &request.firmware_catalog {
        let catalog = load_firmware_catalog(path)?;
        let lookup: Arc<dyn FirmwareLookup> = Arc::new(TimedFirmwareLookup::new(
            Arc::new(catalog),
            Duration::from_millis(request.lookup_timeout_ms),
        ));
        options = options.with_firmware(lookup);
    }
    Ok(options)
}

fn lock_jobs() -> Result<std::sync::MutexGuard<'static, HashMap<String, AnalysisJob>>> {
    JOBS.lock()
        .map_err(|_| anyhow!("analysis job registry lock poisoned"))
}

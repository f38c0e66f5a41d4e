use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{AnalysisStatus, Family};
use crate::pipeline::{analyze_bytes, AnalyzeOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSuite {
    pub cases: Vec<EvaluationCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationCase {
    pub name: String,
    /// Dump path, relative to the suite file.
    pub dump: String,
    #[serde(default)]
    pub expected_family: Option<Family>,
    #[serde(default)]
    pub expected_codes: Vec<String>,
    #[serde(default)]
    pub forbidden_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub total_cases: usize,
    pub passed_cases: usize,
    pub code_recall: f32,
    pub forbidden_hits: usize,
    pub case_results: Vec<EvaluationCaseResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationCaseResult {
    pub name: String,
    pub passed: bool,
    pub status: AnalysisStatus,
    pub family: Option<Family>,
    pub observed_codes: Vec<String>,
    pub missing_codes: Vec<String>,
    pub forbidden_hits: Vec<String>,
}

pub fn evaluate_suite_file(path: &Path) -> Result<EvaluationResult> {
    let suite_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read evaluation suite {}", path.display()))?;
    let suite: EvaluationSuite =
        serde_json::from_str(&suite_text).context("failed to parse evaluation suite JSON")?;
    evaluate_suite(path, &suite)
}

pub fn evaluate_suite(suite_path: &Path, suite: &EvaluationSuite) -> Result<EvaluationResult> {
    let suite_dir = suite_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let options = AnalyzeOptions::default();

    let mut case_results = Vec::new();
    let mut passed_cases = 0_usize;
    let mut expected_total = 0_usize;
    let mut expected_found = 0_usize;
    let mut forbidden_total = 0_usize;

    for case in &suite.cases {
        let dump_path = suite_dir.join(&case.dump);
        let bytes = fs::read(&dump_path)
            .with_context(|| format!("failed to read dump fixture {}", dump_path.display()))?;
        let report = analyze_bytes(&case.name, &bytes, &options);

        let family = report.record.as_ref().map(|record| record.family);
        let observed_codes = report.finding_codes();
        let missing_codes = case
            .expected_codes
            .iter()
            .filter(|code| !observed_codes.contains(code))
            .cloned()
            .collect::<Vec<_>>();
        let forbidden_hits = case
            .forbidden_codes
            .iter()
            .filter(|code| observed_codes.contains(code))
            .cloned()
            .collect::<Vec<_>>();

        expected_total += case.expected_codes.len();
        expected_found += case.expected_codes.len() - missing_codes.len();
        forbidden_total += forbidden_hits.len();

        let passed = family == case.expected_family
            && missing_codes.is_empty()
            && forbidden_hits.is_empty();
        if passed {
            passed_cases += 1;
        }

        case_results.push(EvaluationCaseResult {
            name: case.name.clone(),
            passed,
            status: report.status,
            family,
            observed_codes,
            missing_codes,
            forbidden_hits,
        });
    }

    Ok(EvaluationResult {
        total_cases: suite.cases.len(),
        passed_cases,
        code_recall: if expected_total == 0 {
            1.0
        } else {
            expected_found as f32 / expected_total as f32
        },
        forbidden_hits: forbidden_total,
        case_results,
    })
}

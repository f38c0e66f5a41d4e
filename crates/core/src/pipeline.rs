use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::classify::classify;
use crate::extract::extract;
use crate::firmware::FirmwareLookup;
use crate::input::RawDump;
use crate::model::{AnalysisReport, AnalysisStatus, REPORT_VERSION};
use crate::report::{render, render_unparseable, OutputMode};
use crate::rules::{evaluate_with, RuleContext};

#[derive(Clone, Default)]
pub struct AnalyzeOptions {
    pub mode: OutputMode,
    pub firmware: Option<Arc<dyn FirmwareLookup>>,
}

impl AnalyzeOptions {
    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_firmware(mut self, lookup: Arc<dyn FirmwareLookup>) -> Self {
        self.firmware = Some(lookup);
        self
    }
}

/// Runs the whole pipeline on one dump. Never fails: input that cannot be
/// diagnosed yields an `Unrecognized` or `Unparseable` report.
pub fn analyze_bytes(label: &str, bytes: &[u8], options: &AnalyzeOptions) -> AnalysisReport {
    let mut report = AnalysisReport {
        report_version: REPORT_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339(),
        analysis_id: Uuid::new_v4().to_string(),
        label: label.to_string(),
        input_digest: RawDump::digest(bytes),
        status: AnalysisStatus::Unrecognized,
        error: None,
        record: None,
        findings: Vec::new(),
        rule_traces: Vec::new(),
        rendered: Vec::new(),
    };

    let dump = match RawDump::from_bytes(label, bytes) {
        Ok(dump) => dump,
        Err(err) => {
            info!("{label}: rejected input: {err}");
            let reason = err.to_string();
            report.rendered = render_unparseable(label, Some(&reason));
            report.error = Some(reason);
            return report;
        }
    };

    let Some(family) = classify(&dump.text) else {
        info!("{label}: no diagnostic card signature matched");
        report.error = Some("no diagnostic card signature matched".to_string());
        report.rendered = render_unparseable(label, None);
        return report;
    };

    let mut record = match extract(family, &dump) {
        Ok(record) => record,
        Err(err) => {
            info!("{label}: {family} card could not be parsed: {err}");
            report.status = AnalysisStatus::Unparseable;
            let reason = err.to_string();
            report.rendered = render_unparseable(label, Some(&reason));
            report.error = Some(reason);
            return report;
        }
    };
    if dump.lossy {
        record
            .notes
            .push("input contained invalid UTF-8 sequences that were replaced".to_string());
    }

    let ctx = RuleContext::new(&record);
    let ctx = match options.firmware.as_deref() {
        Some(lookup) => ctx.with_firmware(lookup),
        None => ctx,
    };
    let evaluation = evaluate_with(&ctx);
    info!(
        "{label}: diagnosed {family} serial {} with {} finding(s)",
        record.serial_number,
        evaluation.findings.len()
    );

    report.status = AnalysisStatus::Diagnosed;
    report.rendered = render(&record, &evaluation.findings, options.mode);
    report.findings = evaluation.findings;
    report.rule_traces = evaluation.rule_traces;
    report.record = Some(record);
    report
}

pub fn analyze_text(label: &str, text: &str, options: &AnalyzeOptions) -> AnalysisReport {
    analyze_bytes(label, text.as_bytes(), options)
}

pub fn analyze_file(path: &Path, options: &AnalyzeOptions) -> Result<AnalysisReport> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read dump {}", path.display()))?;
    let label = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(analyze_bytes(&label, &bytes, options))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{analyze_bytes, analyze_file, analyze_text, AnalyzeOptions};
    use crate::firmware::StaticFirmwareCatalog;
    use crate::model::AnalysisStatus;

    #[test]
    fn foreign_text_is_unrecognized() {
        let report = analyze_text(
            "list.txt",
            include_str!("../../../fixtures/unknown.txt"),
            &AnalyzeOptions::default(),
        );
        assert_eq!(report.status, AnalysisStatus::Unrecognized);
        assert!(report.record.is_none());
        assert_eq!(
            report.rendered,
            vec!["list.txt is not a valid diagnostic card or could not be parsed."]
        );
    }

    #[test]
    fn binary_input_is_unrecognized() {
        let report = analyze_bytes("blob.bin", b"\x89PNG\0\0", &AnalyzeOptions::default());
        assert_eq!(report.status, AnalysisStatus::Unrecognized);
        assert!(report.error.as_deref().is_some_and(|e| e.contains("NUL")));
        assert!(report.rendered.last().is_some_and(|line| line.contains("NUL")));
    }

    #[test]
    fn missing_identity_is_unparseable() {
        let text = include_str!("../../../fixtures/ptp-issues.txt")
            .replace("Serial number: 40098765\n", "");
        let report = analyze_text("ptp.txt", &text, &AnalyzeOptions::default());
        assert_eq!(report.status, AnalysisStatus::Unparseable);
        assert!(report.error.as_deref().is_some_and(|e| e.contains("serial_number")));
        assert_eq!(report.rendered.len(), 2);
        assert!(report.rendered[1].starts_with("Reason: "));
        assert!(report.rendered[1].contains("serial_number"));
    }

    #[test]
    fn diagnosed_report_carries_metadata() {
        let bytes = include_bytes!("../../../fixtures/backhaul-down.txt");
        let report = analyze_bytes("down.txt", bytes, &AnalyzeOptions::default());
        assert_eq!(report.status, AnalysisStatus::Diagnosed);
        assert_eq!(report.input_digest.len(), 64);
        assert!(!report.analysis_id.is_empty());
        assert!(chrono::DateTime::parse_from_rfc3339(&report.generated_at).is_ok());
        assert_eq!(report.finding_codes(), vec!["link-state"]);
        assert!(!report.rule_traces.is_empty());
    }

    #[test]
    fn firmware_catalog_adds_freshness_advisory() {
        let catalog = StaticFirmwareCatalog::from_json(r#"{"xg": {"XG1000": ["v1.2.35", "v1.3.2"]}}"#)
            .expect("catalog");
        let options = AnalyzeOptions::default().with_firmware(Arc::new(catalog));
        let report = analyze_text(
            "xg.txt",
            include_str!("../../../fixtures/backhaul-nominal.txt"),
            &options,
        );
        assert_eq!(report.finding_codes(), vec!["firmware-outdated"]);
    }

    #[test]
    fn lossy_input_is_noted() {
        let mut bytes = include_bytes!("../../../fixtures/mesh-nominal.txt").to_vec();
        bytes.extend_from_slice(b"\xFF\xFE trailing noise\n");
        let report = analyze_bytes("mesh.txt", &bytes, &AnalyzeOptions::default());
        let record = report.record.expect("record");
        assert!(record.notes.iter().any(|note| note.contains("invalid UTF-8")));
    }

    #[test]
    fn analyze_file_labels_with_file_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("card.txt");
        std::fs::write(&path, include_str!("../../../fixtures/mesh-nominal.txt")).expect("write");
        let report = analyze_file(&path, &AnalyzeOptions::default()).expect("report");
        assert_eq!(report.label, "card.txt");
        assert!(analyze_file(&dir.path().join("missing.txt"), &AnalyzeOptions::default()).is_err());
    }
}

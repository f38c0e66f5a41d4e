use anyhow::Result;
use std::path::PathBuf;

use dcard_analyzer_core::{
    analyze_file, classify, AnalysisReport, AnalysisStatus, AnalyzeOptions, Family, OutputMode,
    RuleTraceStatus, NO_ISSUES_MESSAGE,
};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // crates
    path.pop(); // workspace root
    path.push("fixtures");
    path.push(name);
    path
}

#[test]
fn nominal_mesh_card_reports_a_healthy_device() -> Result<()> {
    let report = analyze_file(&fixture("mesh-nominal.txt"), &AnalyzeOptions::default())?;

    assert_eq!(report.status, AnalysisStatus::Diagnosed);
    let record = report.record.as_ref().expect("record");
    assert_eq!(record.family, Family::MeshRadio);
    assert_eq!(record.serial_number, "112233");
    assert!(report.findings.is_empty());
    assert_eq!(
        report.rendered.last().map(String::as_str),
        Some(NO_ISSUES_MESSAGE)
    );
    Ok(())
}

#[test]
fn down_backhaul_link_reports_only_the_link_state() -> Result<()> {
    let report = analyze_file(&fixture("backhaul-down.txt"), &AnalyzeOptions::default())?;

    assert_eq!(report.finding_codes(), vec!["link-state"]);
    assert!(report.findings[0].message.contains("not established"));
    let skipped = report
        .rule_traces
        .iter()
        .filter(|trace| trace.status == RuleTraceStatus::Skipped)
        .map(|trace| trace.rule_id.as_str())
        .collect::<Vec<_>>();
    assert!(skipped.contains(&"rssi"));
    assert!(skipped.contains(&"cinr"));
    Ok(())
}

#[test]
fn rotated_ptp_antennas_report_polarization_mismatch() -> Result<()> {
    let options = AnalyzeOptions::default().with_mode(OutputMode::Markdown);
    let report = analyze_file(&fixture("ptp-polarization.txt"), &options)?;

    assert_eq!(report.finding_codes(), vec!["polarization-mismatch"]);
    assert!(report.rendered[0].starts_with("## "));
    assert!(report.rendered.iter().any(|line| line == "### Radio issues"));
    Ok(())
}

#[test]
fn classification_is_deterministic() -> Result<()> {
    for name in [
        "mesh-nominal.txt",
        "mesh-issues.txt",
        "backhaul-nominal.txt",
        "backhaul-down.txt",
        "backhaul-issues.txt",
        "ptp-polarization.txt",
        "ptp-issues.txt",
        "unknown.txt",
    ] {
        let text = std::fs::read_to_string(fixture(name))?;
        let first = classify(&text);
        for _ in 0..3 {
            assert_eq!(classify(&text), first, "{name}");
        }
    }
    Ok(())
}

#[test]
fn findings_are_stable_across_runs() -> Result<()> {
    let options = AnalyzeOptions::default();
    let first = analyze_file(&fixture("mesh-issues.txt"), &options)?;
    let second = analyze_file(&fixture("mesh-issues.txt"), &options)?;

    assert_eq!(first.findings, second.findings);
    assert_eq!(first.rendered, second.rendered);
    assert_eq!(first.input_digest, second.input_digest);
    assert_ne!(first.analysis_id, second.analysis_id);
    Ok(())
}

#[test]
fn report_survives_json_round_trip() -> Result<()> {
    let report = analyze_file(&fixture("backhaul-issues.txt"), &AnalyzeOptions::default())?;
    let json = serde_json::to_string_pretty(&report)?;
    let parsed: AnalysisReport = serde_json::from_str(&json)?;
    assert_eq!(parsed.findings, report.findings);
    assert_eq!(parsed.rule_traces, report.rule_traces);

    // Raw dump text is not serialized.
    let original = report.record.expect("record");
    let restored = parsed.record.expect("record");
    assert!(restored.raw_text.is_empty());
    assert_eq!(restored.details, original.details);
    assert_eq!(restored.ethernet_status, original.ethernet_status);
    Ok(())
}

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dcard_analyzer_core::{
    analyze_bytes, evaluate_suite_file, matching_signature, registry, AnalysisReport,
    AnalysisStatus, AnalyzeOptions, Family, FirmwareLookup, OutputMode, RawDump,
    StaticFirmwareCatalog, TimedFirmwareLookup, DEFAULT_LOOKUP_TIMEOUT_MS,
};
use dcard_analyzer_core::rules::LinkGate;
use globset::{Glob, GlobMatcher};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Debug, Parser)]
#[command(
    name = "dcard-analyzer",
    version,
    about = "Diagnose wireless radio units from their diagnostic card dumps."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Analyze one diagnostic card and print the report.
    Analyze(AnalyzeArgs),
    /// Print the device family a dump belongs to.
    Classify(ClassifyArgs),
    /// Analyze every matching dump under a directory.
    Batch(BatchArgs),
    /// List the diagnostic rules registered for each family.
    Rules(RulesArgs),
    /// Evaluate findings against a fixture suite.
    Eval(EvalArgs),
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliFormat {
    Text,
    Jira,
    Markdown,
    Json,
}

impl CliFormat {
    fn output_mode(self) -> OutputMode {
        match self {
            CliFormat::Text | CliFormat::Json => OutputMode::Text,
            CliFormat::Jira => OutputMode::Jira,
            CliFormat::Markdown => OutputMode::Markdown,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            CliFormat::Text | CliFormat::Jira => "txt",
            CliFormat::Markdown => "md",
            CliFormat::Json => "json",
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliFamily {
    Mesh,
    Backhaul,
    Ptp,
}

impl From<CliFamily> for Family {
    fn from(value: CliFamily) -> Self {
        match value {
            CliFamily::Mesh => Family::MeshRadio,
            CliFamily::Backhaul => Family::BackhaulRadio,
            CliFamily::Ptp => Family::PtpRadio,
        }
    }
}

#[derive(Debug, Args)]
struct LookupArgs {
    /// JSON firmware catalog enabling the firmware freshness advisory.
    #[arg(long, value_name = "FILE")]
    firmware_catalog: Option<PathBuf>,

    /// Give up on a firmware lookup after this many milliseconds.
    #[arg(long, default_value_t = DEFAULT_LOOKUP_TIMEOUT_MS, value_name = "MS")]
    lookup_timeout_ms: u64,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Diagnostic card dump.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    #[arg(long, value_enum, default_value = "text")]
    format: CliFormat,

    /// Write the report here instead of stdout.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(flatten)]
    lookup: LookupArgs,
}

#[derive(Debug, Args)]
struct ClassifyArgs {
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
}

#[derive(Debug, Args)]
struct BatchArgs {
    /// Directory walked recursively for dumps.
    #[arg(long, value_name = "DIR")]
    dir: PathBuf,

    /// File name glob selecting dumps.
    #[arg(long, default_value = "*.txt", value_name = "GLOB")]
    pattern: String,

    /// Write one report per dump into this directory instead of stdout.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    format: CliFormat,

    #[command(flatten)]
    lookup: LookupArgs,
}

#[derive(Debug, Args)]
struct RulesArgs {
    /// Only list rules for this family.
    #[arg(long, value_enum)]
    family: Option<CliFamily>,
}

#[derive(Debug, Args)]
struct EvalArgs {
    /// Evaluation suite JSON file.
    #[arg(long, value_name = "FILE", default_value = "fixtures/eval-suite.json")]
    suite: PathBuf,

    /// Optional JSON output file for evaluation result.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => run_analyze_command(args),
        Commands::Classify(args) => run_classify_command(args),
        Commands::Batch(args) => run_batch_command(args),
        Commands::Rules(args) => {
            run_rules_command(args);
            Ok(())
        }
        Commands::Eval(args) => run_eval_command(args),
    }
}

fn analyze_options(format: CliFormat, lookup: &LookupArgs) -> Result<AnalyzeOptions> {
    let mut options = AnalyzeOptions::default().with_mode(format.output_mode());
    if let Some(path) = &lookup.firmware_catalog {
        let catalog = StaticFirmwareCatalog::load(path)?;
        let timed = TimedFirmwareLookup::new(
            Arc::new(catalog),
            Duration::from_millis(lookup.lookup_timeout_ms),
        );
        let lookup: Arc<dyn FirmwareLookup> = Arc::new(timed);
        options = options.with_firmware(lookup);
    }
    Ok(options)
}

fn format_report(report: &AnalysisReport, format: CliFormat) -> Result<String> {
    match format {
        CliFormat::Json => {
            serde_json::to_string_pretty(report).context("failed to serialize report")
        }
        _ => Ok(report.rendered_text()),
    }
}

fn run_analyze_command(args: AnalyzeArgs) -> Result<()> {
    let options = analyze_options(args.format, &args.lookup)?;
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let report = analyze_bytes(&display_label(&args.input), &bytes, &options);
    if let Some(error) = &report.error {
        warn!("{}: {error}", report.label);
    }

    let payload = format_report(&report, args.format)?;
    match args.output {
        Some(output) => {
            fs::write(&output, payload)
                .with_context(|| format!("failed to write report to {}", output.display()))?;
            println!("Report written to {}", output.display());
        }
        None => print!("{payload}"),
    }
    Ok(())
}

fn run_classify_command(args: ClassifyArgs) -> Result<()> {
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let dump = RawDump::from_bytes(display_label(&args.input), &bytes)?;
    match matching_signature(&dump.text) {
        Some((family, signature)) => println!("{family} (signature {signature})"),
        None => println!("{}: not a recognized diagnostic card", dump.label),
    }
    Ok(())
}

fn run_batch_command(args: BatchArgs) -> Result<()> {
    let matcher: GlobMatcher = Glob::new(&args.pattern)
        .with_context(|| format!("invalid pattern {}", args.pattern))?
        .compile_matcher();
    let options = analyze_options(args.format, &args.lookup)?;
    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    }

    let mut seen_digests = HashSet::new();
    let mut analyzed = 0_usize;
    let mut duplicates = 0_usize;
    let mut diagnosed = 0_usize;

    for entry in WalkDir::new(&args.dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() || !matcher.is_match(entry.file_name()) {
            continue;
        }

        let path = entry.path();
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        if !seen_digests.insert(RawDump::digest(&bytes)) {
            info!("{}: identical to an earlier dump, skipped", path.display());
            duplicates += 1;
            continue;
        }

        let report = analyze_bytes(&display_label(path), &bytes, &options);
        analyzed += 1;
        if report.status == AnalysisStatus::Diagnosed {
            diagnosed += 1;
        }

        let payload = format_report(&report, args.format)?;
        match &args.output_dir {
            Some(dir) => {
                let stem = report_stem(&args.dir, path)
                    .unwrap_or_else(|| report.analysis_id.clone());
                let output = dir.join(format!("{stem}.report.{}", args.format.extension()));
                fs::write(&output, payload)
                    .with_context(|| format!("failed to write report to {}", output.display()))?;
            }
            None => {
                println!("==> {} <==", path.display());
                print!("{payload}");
                println!();
            }
        }
    }

    println!(
        "Batch: {analyzed} dump(s) analyzed, {diagnosed} diagnosed, {duplicates} duplicate(s) skipped."
    );
    Ok(())
}

fn run_rules_command(args: RulesArgs) {
    let families = match args.family {
        Some(family) => vec![Family::from(family)],
        None => Family::ALL.to_vec(),
    };
    for family in families {
        println!("{family}:");
        for rule in registry(family) {
            println!(
                "- {} [{}{}]",
                rule.id,
                rule.category.label(),
                match rule.gate {
                    LinkGate::Always => "",
                    LinkGate::RequiresLink => ", requires link",
                }
            );
        }
    }
}

fn run_eval_command(args: EvalArgs) -> Result<()> {
    let result = evaluate_suite_file(&args.suite)?;
    println!(
        "Eval: {}/{} cases passed | code recall {:.3} | forbidden hits {}",
        result.passed_cases, result.total_cases, result.code_recall, result.forbidden_hits
    );

    for case in &result.case_results {
        println!(
            "- [{}] {} | missing: {} | forbidden hits: {}",
            if case.passed { "PASS" } else { "FAIL" },
            case.name,
            join_or_none(&case.missing_codes),
            join_or_none(&case.forbidden_hits)
        );
    }

    if let Some(output) = args.output {
        let payload = serde_json::to_string_pretty(&result).context("failed to serialize eval")?;
        fs::write(&output, payload)
            .with_context(|| format!("failed to write eval output {}", output.display()))?;
        println!("Evaluation JSON written to {}", output.display());
    }

    Ok(())
}

fn join_or_none(codes: &[String]) -> String {
    if codes.is_empty() {
        "none".to_string()
    } else {
        codes.join(", ")
    }
}

/// Report file stem built from the dump's path under the batch root, so that equally named
/// dumps in different subdirectories get separate reports.
fn report_stem(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    let parts = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>();
    (!parts.is_empty()).then(|| parts.join("__"))
}

fn display_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{report_stem, Cli, CliFamily, CliFormat};
    use clap::Parser;
    use dcard_analyzer_core::{Family, OutputMode};

    #[test]
    fn parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "dcard-analyzer",
            "analyze",
            "--input",
            "card.txt",
            "--format",
            "jira",
            "--lookup-timeout-ms",
            "500",
        ])
        .expect("parse");
        match cli.command {
            super::Commands::Analyze(args) => {
                assert_eq!(args.format.output_mode(), OutputMode::Jira);
                assert_eq!(args.lookup.lookup_timeout_ms, 500);
                assert!(args.lookup.firmware_catalog.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn report_stems_keep_subdirectories_apart() {
        let root = Path::new("dumps");
        assert_eq!(
            report_stem(root, Path::new("dumps/card.txt")).as_deref(),
            Some("card")
        );
        let north = report_stem(root, Path::new("dumps/site-north/card.txt"));
        let south = report_stem(root, Path::new("dumps/site-south/card.txt"));
        assert_eq!(north.as_deref(), Some("site-north__card"));
        assert_eq!(south.as_deref(), Some("site-south__card"));
        assert_ne!(north, south);
    }

    #[test]
    fn family_flag_maps_to_core_family() {
        assert_eq!(Family::from(CliFamily::Ptp), Family::PtpRadio);
        assert_eq!(CliFormat::Json.extension(), "json");
        assert_eq!(CliFormat::Json.output_mode(), OutputMode::Text);
    }
}

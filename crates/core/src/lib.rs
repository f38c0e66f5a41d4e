pub mod classify;
pub mod error;
pub mod eval;
pub mod extract;
pub mod firmware;
pub mod input;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod rules;

pub use classify::{classify, matching_signature};
pub use error::{ExtractionError, InputError, LookupError, RuleError};
pub use eval::{
    evaluate_suite, evaluate_suite_file, EvaluationCase, EvaluationCaseResult, EvaluationResult,
    EvaluationSuite,
};
pub use extract::extract;
pub use firmware::{
    latest_version, FirmwareLookup, StaticFirmwareCatalog, TimedFirmwareLookup,
    DEFAULT_LOOKUP_TIMEOUT_MS,
};
pub use input::RawDump;
pub use model::{
    AnalysisReport, AnalysisStatus, Category, DeviceRecord, Family, FamilyDetails, Finding,
    LinkRole, Measurement, RuleTrace, RuleTraceStatus, Severity, Unit, REPORT_VERSION,
};
pub use pipeline::{analyze_bytes, analyze_file, analyze_text, AnalyzeOptions};
pub use report::{render, render_unparseable, OutputMode, NO_ISSUES_MESSAGE};
pub use rules::{evaluate, evaluate_with, registry, Evaluation, Rule, RuleContext};

mod backhaul;
mod common;
mod mesh;
mod ptp;

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::error::RuleError;
use crate::firmware::FirmwareLookup;
use crate::model::{Category, DeviceRecord, Family, Finding, RuleTrace, RuleTraceStatus};

pub type RuleCheck = fn(&RuleContext<'_>) -> Result<Vec<Finding>, RuleError>;

/// Whether a rule needs an established radio link to be meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkGate {
    Always,
    RequiresLink,
}

pub struct Rule {
    pub id: &'static str,
    pub category: Category,
    pub gate: LinkGate,
    pub check: RuleCheck,
}

#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub record: &'a DeviceRecord,
    pub firmware: Option<&'a dyn FirmwareLookup>,
}

impl<'a> RuleContext<'a> {
    pub fn new(record: &'a DeviceRecord) -> Self {
        Self {
            record,
            firmware: None,
        }
    }

    pub fn with_firmware(mut self, lookup: &'a dyn FirmwareLookup) -> Self {
        self.firmware = Some(lookup);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub findings: Vec<Finding>,
    pub rule_traces: Vec<RuleTrace>,
}

pub fn registry(family: Family) -> &'static [Rule] {
    match family {
        Family::MeshRadio => mesh::RULES,
        Family::BackhaulRadio => backhaul::RULES,
        Family::PtpRadio => ptp::RULES,
    }
}

pub fn evaluate(record: &DeviceRecord) -> Vec<Finding> {
    evaluate_with(&RuleContext::new(record)).findings
}

pub fn evaluate_with(ctx: &RuleContext<'_>) -> Evaluation {
    run_rules(registry(ctx.record.family), ctx)
}

/// Runs `rules` in order. A rule that errors or panics is traced as failed and
/// contributes nothing; the remaining rules still run.
pub fn run_rules(rules: &[Rule], ctx: &RuleContext<'_>) -> Evaluation {
    let link_up = ctx.record.link_is_nominal();
    let mut evaluation = Evaluation::default();

    for rule in rules {
        if rule.gate == LinkGate::RequiresLink && !link_up {
            evaluation.rule_traces.push(trace(
                rule.id,
                RuleTraceStatus::Skipped,
                "Radio link is not established; rule was not evaluated.".to_string(),
            ));
            continue;
        }

        match run_isolated(rule, ctx) {
            Ok(findings) if findings.is_empty() => {
                evaluation.rule_traces.push(trace(
                    rule.id,
                    RuleTraceStatus::Skipped,
                    "Rule conditions were not met.".to_string(),
                ));
            }
            Ok(findings) => {
                let codes = findings
                    .iter()
                    .map(|finding| finding.code.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                debug!("rule {} produced {} finding(s)", rule.id, findings.len());
                evaluation.rule_traces.push(trace(
                    rule.id,
                    RuleTraceStatus::Emitted,
                    format!("Rule produced {} finding(s): {}", findings.len(), codes),
                ));
                evaluation.findings.extend(findings);
            }
            Err(err) => {
                warn!(
                    "rule {} failed on {} {}: {err}",
                    rule.id, ctx.record.family, ctx.record.serial_number
                );
                evaluation
                    .rule_traces
                    .push(trace(rule.id, RuleTraceStatus::Failed, err.to_string()));
            }
        }
    }

    evaluation
}

fn run_isolated(rule: &Rule, ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    match catch_unwind(AssertUnwindSafe(|| (rule.check)(ctx))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|text| text.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(RuleError::Panicked(message))
        }
    }
}

fn trace(rule_id: &str, status: RuleTraceStatus, detail: String) -> RuleTrace {
    RuleTrace {
        rule_id: rule_id.to_string(),
        status,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate, evaluate_with, registry, run_rules, LinkGate, Rule, RuleContext};
    use crate::error::RuleError;
    use crate::extract;
    use crate::input::RawDump;
    use crate::model::{
        Category, DeviceRecord, Family, Finding, LinkRole, Measurement, RuleTraceStatus, Unit,
    };

    fn record(family: Family, text: &str) -> DeviceRecord {
        let dump = RawDump::from_text("card.txt", text).expect("dump");
        extract::extract(family, &dump).expect("record")
    }

    fn failing(_: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        Err(RuleError::Invalid("broken".to_string()))
    }

    fn panicking(_: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        panic!("rule blew up")
    }

    fn always(_: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
        Ok(vec![Finding::new(Category::Radio, "always", "always fires")])
    }

    #[test]
    fn registry_ids_are_unique_per_family() {
        for family in Family::ALL {
            let rules = registry(family);
            assert!(!rules.is_empty());
            let mut ids = rules.iter().map(|rule| rule.id).collect::<Vec<_>>();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), rules.len(), "{family}");
        }
    }

    #[test]
    fn failing_and_panicking_rules_are_isolated() {
        let record = record(
            Family::MeshRadio,
            include_str!("../../../../fixtures/mesh-nominal.txt"),
        );
        let rules = [
            Rule {
                id: "failing",
                category: Category::Radio,
                gate: LinkGate::Always,
                check: failing,
            },
            Rule {
                id: "panicking",
                category: Category::Radio,
                gate: LinkGate::Always,
                check: panicking,
            },
            Rule {
                id: "always",
                category: Category::Radio,
                gate: LinkGate::Always,
                check: always,
            },
        ];
        let evaluation = run_rules(&rules, &RuleContext::new(&record));
        assert_eq!(evaluation.findings.len(), 1);
        let statuses = evaluation
            .rule_traces
            .iter()
            .map(|trace| trace.status.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                RuleTraceStatus::Failed,
                RuleTraceStatus::Failed,
                RuleTraceStatus::Emitted
            ]
        );
        assert!(evaluation.rule_traces[1].detail.contains("rule blew up"));
    }

    #[test]
    fn unit_mismatch_fails_only_that_rule() {
        let mut record = record(
            Family::BackhaulRadio,
            include_str!("../../../../fixtures/backhaul-issues.txt"),
        );
        let details = match &mut record.details {
            crate::model::FamilyDetails::Backhaul(details) => details,
            _ => unreachable!(),
        };
        let carrier = details.radio_status.statistics.roles[&LinkRole::Master][0]
            .as_mut()
            .expect("carrier");
        if let Some(stream) = carrier.streams[0].as_mut() {
            stream.rssi = Some(Measurement::new(-83.4, Unit::Db));
        }

        let evaluation = evaluate_with(&RuleContext::new(&record));
        let failed = evaluation
            .rule_traces
            .iter()
            .filter(|trace| trace.status == RuleTraceStatus::Failed)
            .map(|trace| trace.rule_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(failed, vec!["rssi"]);
        let codes = evaluation
            .findings
            .iter()
            .map(|finding| finding.code.as_str())
            .collect::<Vec<_>>();
        assert!(codes.contains(&"cinr-severe"));
        assert!(codes.contains(&"ethernet-crc"));
        assert!(!codes.contains(&"rssi-weak"));
    }

    #[test]
    fn evaluation_is_idempotent() {
        let record = record(
            Family::PtpRadio,
            include_str!("../../../../fixtures/ptp-issues.txt"),
        );
        let first = evaluate_with(&RuleContext::new(&record));
        let second = evaluate_with(&RuleContext::new(&record));
        assert_eq!(first, second);
        assert_eq!(evaluate(&record), first.findings);
    }

    #[test]
    fn one_trace_per_registered_rule() {
        let record = record(
            Family::BackhaulRadio,
            include_str!("../../../../fixtures/backhaul-down.txt"),
        );
        let evaluation = evaluate_with(&RuleContext::new(&record));
        assert_eq!(
            evaluation.rule_traces.len(),
            registry(Family::BackhaulRadio).len()
        );
        let rssi = evaluation
            .rule_traces
            .iter()
            .find(|trace| trace.rule_id == "rssi")
            .expect("rssi trace");
        assert_eq!(rssi.status, RuleTraceStatus::Skipped);
        assert!(rssi.detail.starts_with("Radio link is not established"));
    }
}

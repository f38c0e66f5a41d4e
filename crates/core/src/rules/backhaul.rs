use once_cell::sync::Lazy;
use regex::Regex;

use super::common::{
    atpc_advisory, capitalize, ethernet_crc, ethernet_duplex, faults, firmware_freshness,
    link_flaps, quality_finding, reboot_reason, rssi, stream_subject, uptime,
};
use super::{LinkGate, Rule, RuleContext};
use crate::error::RuleError;
use crate::model::{BackhaulDetails, BackhaulLinkState, Category, Finding};

const CINR_SEVERE_DB: f64 = 15.0;
const CINR_MARGINAL_DB: f64 = 22.0;
const MAX_GAIN_DELTA: f64 = 10.0;
const FULL_MODULATION_ORDER: u32 = 1024;

pub(super) static RULES: &[Rule] = &[
    Rule {
        id: "link-state",
        category: Category::Radio,
        gate: LinkGate::Always,
        check: link_state,
    },
    Rule {
        id: "rssi",
        category: Category::Radio,
        gate: LinkGate::RequiresLink,
        check: rssi,
    },
    Rule {
        id: "cinr",
        category: Category::Radio,
        gate: LinkGate::RequiresLink,
        check: cinr,
    },
    Rule {
        id: "gain-imbalance",
        category: Category::Radio,
        gate: LinkGate::RequiresLink,
        check: gain_imbalance,
    },
    Rule {
        id: "ethernet-crc",
        category: Category::Ethernet,
        gate: LinkGate::Always,
        check: ethernet_crc,
    },
    Rule {
        id: "ethernet-duplex",
        category: Category::Ethernet,
        gate: LinkGate::Always,
        check: ethernet_duplex,
    },
    Rule {
        id: "ethernet-flaps",
        category: Category::Ethernet,
        gate: LinkGate::Always,
        check: link_flaps,
    },
    Rule {
        id: "faults",
        category: Category::Faults,
        gate: LinkGate::Always,
        check: faults,
    },
    Rule {
        id: "uptime",
        category: Category::Recommendations,
        gate: LinkGate::Always,
        check: uptime,
    },
    Rule {
        id: "reboot-reason",
        category: Category::Recommendations,
        gate: LinkGate::Always,
        check: reboot_reason,
    },
    Rule {
        id: "atpc",
        category: Category::Recommendations,
        gate: LinkGate::Always,
        check: atpc,
    },
    Rule {
        id: "max-modulation",
        category: Category::Recommendations,
        gate: LinkGate::Always,
        check: max_modulation,
    },
    Rule {
        id: "firmware-freshness",
        category: Category::Recommendations,
        gate: LinkGate::Always,
        check: firmware_freshness,
    },
];

fn details<'a>(ctx: &RuleContext<'a>) -> Result<&'a BackhaulDetails, RuleError> {
    ctx.record
        .backhaul()
        .ok_or_else(|| RuleError::Invalid("record is not a backhaul radio".to_string()))
}

fn link_state(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let Some(state) = &details(ctx)?.radio_status.link_state else {
        return Ok(Vec::new());
    };
    let (code, message) = match state {
        BackhaulLinkState::Up => return Ok(Vec::new()),
        BackhaulLinkState::Down => (
            "link-state",
            "Radio link is DOWN: the link is not established. Check alignment, frequencies and the remote unit.".to_string(),
        ),
        BackhaulLinkState::Error => (
            "link-state",
            "Radio link is in ERROR state: the radio module reported a failure.".to_string(),
        ),
        BackhaulLinkState::Starting => (
            "link-state",
            "Radio link is STARTING: the modem has not finished initialization.".to_string(),
        ),
        BackhaulLinkState::Stopped => (
            "link-state",
            "Radio link is STOPPED: the radio is administratively disabled.".to_string(),
        ),
        BackhaulLinkState::Phy => (
            "link-state",
            "Radio link is in PHY state: the physical layer is synchronized but the link is not established.".to_string(),
        ),
        BackhaulLinkState::Other(raw) => (
            "link-state-unknown",
            format!("Radio link state \"{raw}\" is not recognized."),
        ),
    };
    Ok(vec![Finding::new(Category::Radio, code, message)])
}

fn cinr(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for stream in details(ctx)?.radio_status.statistics.streams() {
        let Some(value) = &stream.metrics.cinr else {
            continue;
        };
        findings.extend(quality_finding(
            &stream_subject(&stream),
            "CINR",
            "cinr",
            value,
            CINR_SEVERE_DB,
            CINR_MARGINAL_DB,
        )?);
    }
    Ok(findings)
}

fn gain_imbalance(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for (role, carrier, status) in details(ctx)?.radio_status.statistics.carriers() {
        let [Some(first), Some(second)] = &status.streams else {
            continue;
        };
        let (Some(first_gain), Some(second_gain)) = (first.gain, second.gain) else {
            continue;
        };
        let delta = (first_gain - second_gain).abs();
        if delta > MAX_GAIN_DELTA {
            findings.push(Finding::new(
                Category::Radio,
                "gain-imbalance",
                format!(
                    "{} carrier {carrier}: receiver gain differs by {delta:.0} between streams ({first_gain:.0} and {second_gain:.0}); check the antenna feed and polarization alignment.",
                    capitalize(role.label())
                ),
            ));
        }
    }
    Ok(findings)
}

fn atpc(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    Ok(atpc_advisory(details(ctx)?.settings.atpc))
}

static MODULATION_ORDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(\d+)-?QAM|QAM-?(\d+)|(QPSK)|(BPSK))$")
        .expect("modulation pattern compiles")
});

/// Constellation size of a modulation name such as `QAM256`, `QPSK` or `BPSK`.
pub(crate) fn modulation_order(name: &str) -> Option<u32> {
    let caps = MODULATION_ORDER.captures(name.trim())?;
    if let Some(order) = caps.get(1).or_else(|| caps.get(2)) {
        return order.as_str().parse().ok();
    }
    if caps.get(3).is_some() {
        return Some(4);
    }
    caps.get(4).map(|_| 2)
}

fn max_modulation(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let Some(name) = details(ctx)?.settings.max_modulation.as_deref() else {
        return Ok(Vec::new());
    };
    let order = modulation_order(name)
        .ok_or_else(|| RuleError::Invalid(format!("unknown modulation {name}")))?;
    if order >= FULL_MODULATION_ORDER {
        return Ok(Vec::new());
    }
    Ok(vec![Finding::new(
        Category::Recommendations,
        "max-modulation-limited",
        format!(
            "Maximum modulation is limited to {name}; allow QAM1024 so adaptive modulation can reach full capacity."
        ),
    )])
}

#[cfg(test)]
mod tests {
    use super::modulation_order;
    use crate::extract;
    use crate::input::RawDump;
    use crate::model::{BackhaulLinkState, Category, DeviceRecord, Family, FamilyDetails};
    use crate::rules::evaluate;

    fn record(text: &str) -> DeviceRecord {
        let dump = RawDump::from_text("card.txt", text).expect("dump");
        extract::extract(Family::BackhaulRadio, &dump).expect("record")
    }

    fn codes(record: &DeviceRecord) -> Vec<String> {
        evaluate(record)
            .into_iter()
            .map(|finding| finding.code)
            .collect()
    }

    #[test]
    fn nominal_backhaul_has_no_findings() {
        let record = record(include_str!("../../../../fixtures/backhaul-nominal.txt"));
        assert!(evaluate(&record).is_empty());
    }

    #[test]
    fn down_link_reports_only_the_link_state() {
        let record = record(include_str!("../../../../fixtures/backhaul-down.txt"));
        let findings = evaluate(&record);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, "link-state");
        assert_eq!(findings[0].category, Category::Radio);
        assert!(findings[0].message.contains("not established"));
    }

    #[test]
    fn every_non_nominal_state_yields_one_finding() {
        let mut record = record(include_str!("../../../../fixtures/backhaul-nominal.txt"));
        for state in [
            BackhaulLinkState::Down,
            BackhaulLinkState::Error,
            BackhaulLinkState::Starting,
            BackhaulLinkState::Stopped,
            BackhaulLinkState::Phy,
            BackhaulLinkState::Other("SYNCING".to_string()),
        ] {
            if let FamilyDetails::Backhaul(details) = &mut record.details {
                details.radio_status.link_state = Some(state.clone());
            }
            let findings = evaluate(&record);
            assert_eq!(findings.len(), 1, "{state:?}");
        }
        assert_eq!(codes(&record), vec!["link-state-unknown"]);
    }

    #[test]
    fn degraded_backhaul_findings() {
        let record = record(include_str!("../../../../fixtures/backhaul-issues.txt"));
        assert_eq!(
            codes(&record),
            vec![
                "rssi-weak",
                "rssi-strong",
                "cinr-severe",
                "cinr-marginal",
                "gain-imbalance",
                "ethernet-crc",
                "device-fault",
                "unknown-fault",
                "uptime-short",
                "reboot-unexpected",
                "atpc-disabled",
                "max-modulation-limited",
            ]
        );
    }

    #[test]
    fn modulation_orders() {
        assert_eq!(modulation_order("QAM1024"), Some(1024));
        assert_eq!(modulation_order("256QAM"), Some(256));
        assert_eq!(modulation_order("QPSK"), Some(4));
        assert_eq!(modulation_order("bpsk"), Some(2));
        assert_eq!(modulation_order("OFDM"), None);
    }
}

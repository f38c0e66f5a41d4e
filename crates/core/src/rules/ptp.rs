use super::common::{
    atpc_advisory, capitalize, ethernet_crc, ethernet_duplex, faults, firmware_freshness,
    link_flaps, quality_finding, reboot_reason, rssi, stream_subject, uptime,
};
use super::{LinkGate, Rule, RuleContext};
use crate::error::RuleError;
use crate::model::{Category, Finding, PtpDetails, PtpLinkState, Unit};

const SNR_SEVERE_DB: f64 = 10.0;
const SNR_MARGINAL_DB: f64 = 16.0;
const MAX_POLARIZATION_DELTA_DB: f64 = 10.0;
const CROSSTALK_CEILING_DB: f64 = 0.0;
const FULL_MCS: u32 = 12;

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
        id: "snr",
        category: Category::Radio,
        gate: LinkGate::RequiresLink,
        check: snr,
    },
    Rule {
        id: "polarization",
        category: Category::Radio,
        gate: LinkGate::RequiresLink,
        check: polarization,
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
        id: "max-mcs",
        category: Category::Recommendations,
        gate: LinkGate::Always,
        check: max_mcs,
    },
    Rule {
        id: "firmware-freshness",
        category: Category::Recommendations,
        gate: LinkGate::Always,
        check: firmware_freshness,
    },
];

fn details<'a>(ctx: &RuleContext<'a>) -> Result<&'a PtpDetails, RuleError> {
    ctx.record
        .ptp()
        .ok_or_else(|| RuleError::Invalid("record is not a PTP radio".to_string()))
}

fn link_state(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let Some(state) = &details(ctx)?.radio_status.link_state else {
        return Ok(Vec::new());
    };
    let (code, message) = match state {
        PtpLinkState::Connected => return Ok(Vec::new()),
        PtpLinkState::Started => (
            "link-state",
            "Radio link is STARTED: the radio is transmitting but no peer has been found."
                .to_string(),
        ),
        PtpLinkState::Init => (
            "link-state",
            "Radio link is in INIT state: the radio is still initializing.".to_string(),
        ),
        PtpLinkState::Connecting => (
            "link-state",
            "Radio link is CONNECTING: the peer was found but the link is not established."
                .to_string(),
        ),
        PtpLinkState::Standby => (
            "link-state",
            "Radio link is in STANDBY: the radio is not transmitting.".to_string(),
        ),
        PtpLinkState::SectorDetection => (
            "link-state",
            "Radio link is in SECTOR_DETECTION: the radio is still searching for the peer; check antenna alignment."
                .to_string(),
        ),
        PtpLinkState::Other(raw) => (
            "link-state-unknown",
            format!("Radio link state \"{raw}\" is not recognized."),
        ),
    };
    Ok(vec![Finding::new(Category::Radio, code, message)])
}

fn snr(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for stream in details(ctx)?.radio_status.statistics.streams() {
        let Some(value) = &stream.metrics.snr else {
            continue;
        };
        findings.extend(quality_finding(
            &stream_subject(&stream),
            "SNR",
            "snr",
            value,
            SNR_SEVERE_DB,
            SNR_MARGINAL_DB,
        )?);
    }
    Ok(findings)
}

/// Large level difference between polarizations with crosstalk at or above 0 dB means the
/// antennas are rotated against each other. Reported once per record.
fn polarization(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    for (role, _, status) in details(ctx)?.radio_status.statistics.carriers() {
        let [Some(horizontal), Some(vertical)] = &status.streams else {
            continue;
        };
        let (Some(h_rssi), Some(v_rssi)) = (&horizontal.rssi, &vertical.rssi) else {
            continue;
        };
        let delta = (h_rssi.expect(Unit::Dbm, "RSSI")? - v_rssi.expect(Unit::Dbm, "RSSI")?).abs();
        if delta <= MAX_POLARIZATION_DELTA_DB {
            continue;
        }
        let mut crosstalk_high = false;
        for crosstalk in [&horizontal.crosstalk, &vertical.crosstalk].into_iter().flatten() {
            if crosstalk.expect(Unit::Db, "crosstalk")? >= CROSSTALK_CEILING_DB {
                crosstalk_high = true;
            }
        }
        if crosstalk_high {
            return Ok(vec![Finding::new(
                Category::Radio,
                "polarization-mismatch",
                format!(
                    "{}: RSSI differs by {delta:.1} dB between polarizations (H {h_rssi}, V {v_rssi}) and crosstalk is 0 dB or higher; the antennas are not aligned in polarization.",
                    capitalize(role.label())
                ),
            )]);
        }
    }
    Ok(Vec::new())
}

fn atpc(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    Ok(atpc_advisory(details(ctx)?.settings.atpc))
}

fn max_mcs(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    match details(ctx)?.settings.max_mcs {
        Some(mcs) if mcs < FULL_MCS => Ok(vec![Finding::new(
            Category::Recommendations,
            "max-mcs-limited",
            format!("Maximum MCS is limited to {mcs}; allow MCS 12 to reach full capacity."),
        )]),
        _ => Ok(Vec::new()),
    }
}

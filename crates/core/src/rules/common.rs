use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::RuleContext;
use crate::error::RuleError;
use crate::firmware::{latest_version, version_key};
use crate::model::{
    Category, DeviceRecord, Duplex, FamilyDetails, Finding, LinkStatistics, Measurement,
    StreamRef, Unit,
};

pub(super) const RSSI_WEAK_DBM: f64 = -80.0;
pub(super) const RSSI_STRONG_DBM: f64 = -40.0;
pub(super) const MAX_LINK_FLAPS: usize = 4;
pub(super) const MIN_UPTIME_SECONDS: u64 = 86_400;

const EXPECTED_REBOOT_REASONS: [&str; 3] = ["power on", "user reboot", "firmware upgrade"];

const KNOWN_FAULTS: [(&str, &str); 8] = [
    ("RF_PLL_UNLOCK", "RF synthesizer lost PLL lock"),
    ("MODEM_TIMEOUT", "Modem stopped responding"),
    ("DSP_HANG", "DSP hung and was restarted"),
    ("FPGA_CRC", "FPGA configuration failed its CRC check"),
    ("TEMP_CRITICAL", "Device temperature reached a critical level"),
    ("OUT_OF_MEMORY", "System ran out of memory"),
    ("ETH_PHY_RESET", "Ethernet PHY was reset"),
    ("POWER_DROP", "Supply voltage dropped below the operating range"),
];

pub(super) fn statistics(record: &DeviceRecord) -> Option<&LinkStatistics> {
    match &record.details {
        FamilyDetails::Mesh(_) => None,
        FamilyDetails::Backhaul(details) => Some(&details.radio_status.statistics),
        FamilyDetails::Ptp(details) => Some(&details.radio_status.statistics),
    }
}

pub(super) fn stream_subject(stream: &StreamRef<'_>) -> String {
    format!(
        "{} carrier {} stream {}",
        capitalize(stream.role.label()),
        stream.carrier,
        stream.stream
    )
}

pub(super) fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Every received signal level in the record, labelled with where it was measured.
fn signal_levels(record: &DeviceRecord) -> Vec<(String, &Measurement)> {
    if let Some(mesh) = record.mesh() {
        return mesh
            .radio_status
            .peers
            .iter()
            .flat_map(|(id, peer)| {
                peer.power.sides().into_iter().filter_map(move |(direction, power)| {
                    power.map(|power| (format!("Peer {id} {}", direction.label()), power))
                })
            })
            .collect();
    }
    statistics(record)
        .map(|statistics| {
            statistics
                .streams()
                .filter_map(|stream| {
                    stream
                        .metrics
                        .rssi
                        .as_ref()
                        .map(|rssi| (stream_subject(&stream), rssi))
                })
                .collect()
        })
        .unwrap_or_default()
}

pub(super) fn rssi(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for (subject, level) in signal_levels(ctx.record) {
        let value = level.expect(Unit::Dbm, "RSSI")?;
        if value < RSSI_WEAK_DBM {
            findings.push(Finding::new(
                Category::Radio,
                "rssi-weak",
                format!("{subject}: RSSI {level} is below -80 dBm; the signal is too weak."),
            ));
        } else if value > RSSI_STRONG_DBM {
            findings.push(Finding::new(
                Category::Radio,
                "rssi-strong",
                format!(
                    "{subject}: RSSI {level} is above -40 dBm; the receiver may saturate, lower the Tx power."
                ),
            ));
        }
    }
    Ok(findings)
}

/// Signal quality against a severe and a marginal floor.
pub(super) fn quality_finding(
    subject: &str,
    metric: &str,
    code_prefix: &str,
    value: &Measurement,
    severe: f64,
    marginal: f64,
) -> Result<Option<Finding>, RuleError> {
    let db = value.expect(Unit::Db, metric)?;
    let finding = if db < severe {
        Some(Finding::new(
            Category::Radio,
            &format!("{code_prefix}-severe"),
            format!(
                "{subject}: {metric} {value} is below {} dB; the link is unstable.",
                severe
            ),
        ))
    } else if db < marginal {
        Some(Finding::new(
            Category::Radio,
            &format!("{code_prefix}-marginal"),
            format!(
                "{subject}: {metric} {value} is below {} dB; the link has little fade margin.",
                marginal
            ),
        ))
    } else {
        None
    };
    Ok(finding)
}

pub(super) fn ethernet_crc(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    Ok(ctx
        .record
        .ethernet_status
        .iter()
        .filter_map(|(name, port)| port.crc_errors.map(|crc| (name, crc)))
        .filter(|(_, crc)| *crc > 0)
        .map(|(name, crc)| {
            Finding::new(
                Category::Ethernet,
                "ethernet-crc",
                format!("Port {name}: {crc} CRC errors; check the cable, connectors and grounding."),
            )
        })
        .collect())
}

pub(super) fn ethernet_duplex(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    Ok(ctx
        .record
        .ethernet_status
        .iter()
        .filter(|(_, port)| port.duplex == Some(Duplex::Half) && port.autoneg == Some(true))
        .map(|(name, _)| {
            Finding::new(
                Category::Ethernet,
                "ethernet-half-duplex",
                format!(
                    "Port {name} negotiated half duplex with autonegotiation enabled; check the cable and the switch port."
                ),
            )
        })
        .collect())
}

static LINK_EVENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:\d{4}-\d{2}-\d{2}|[a-z]{3}\s+\d{1,2})\s+\d{2}:\d{2}:\d{2}\s+((?:eth|ge|sfp|xe)\d+):?\s+link\s+(?:is\s+)?(up|down)\b",
    )
    .expect("link event pattern compiles")
});

/// Down-then-up transitions per interface, counted over timestamped log lines.
pub(super) fn count_link_flaps(lines: &[String]) -> IndexMap<String, usize> {
    let mut down: IndexMap<String, bool> = IndexMap::new();
    let mut flaps: IndexMap<String, usize> = IndexMap::new();
    for line in lines {
        let Some(caps) = LINK_EVENT.captures(line) else {
            continue;
        };
        let interface = caps[1].to_string();
        let is_up = caps[2].eq_ignore_ascii_case("up");
        let was_down = down.get(&interface).copied().unwrap_or(false);
        if is_up && was_down {
            *flaps.entry(interface.clone()).or_default() += 1;
        }
        down.insert(interface, !is_up);
    }
    flaps
}

pub(super) fn link_flaps(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    Ok(count_link_flaps(&ctx.record.raw_lines)
        .into_iter()
        .filter(|(_, count)| *count > MAX_LINK_FLAPS)
        .map(|(interface, count)| {
            Finding::new(
                Category::Ethernet,
                "ethernet-link-flaps",
                format!(
                    "Port {interface} went down and back up {count} times; check the cable and the connected equipment."
                ),
            )
        })
        .collect())
}

static FAULT_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:PANIC|WATCHDOG):\s*([A-Za-z0-9_]+)").expect("fault tag pattern compiles")
});

pub(super) fn faults(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let Some(messages) = ctx.record.panic_messages() else {
        return Ok(Vec::new());
    };
    let mut findings = Vec::new();
    for message in messages {
        let Some(tag) = FAULT_TAG
            .captures(message)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        else {
            findings.push(Finding::new(
                Category::Faults,
                "unknown-fault",
                format!("Unknown fault reported: {message}."),
            ));
            continue;
        };
        let known = KNOWN_FAULTS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(tag));
        findings.push(match known {
            Some((_, description)) => Finding::new(
                Category::Faults,
                "device-fault",
                format!("{description} ({message})."),
            ),
            None => Finding::new(
                Category::Faults,
                "unknown-fault",
                format!("Unknown fault {tag} reported: {message}."),
            ),
        });
    }
    Ok(findings)
}

pub(super) fn uptime(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let Some(uptime) = &ctx.record.uptime else {
        return Ok(Vec::new());
    };
    if uptime.seconds >= MIN_UPTIME_SECONDS {
        return Ok(Vec::new());
    }
    Ok(vec![Finding::new(
        Category::Recommendations,
        "uptime-short",
        format!(
            "Uptime is only {}; counters cover less than a day. Collect a new diagnostic card later.",
            uptime.text
        ),
    )])
}

pub(super) fn reboot_reason(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let Some(reason) = &ctx.record.last_reboot_reason else {
        return Ok(Vec::new());
    };
    let normalized = reason.trim().to_ascii_lowercase();
    if EXPECTED_REBOOT_REASONS.contains(&normalized.as_str()) {
        return Ok(Vec::new());
    }
    Ok(vec![Finding::new(
        Category::Recommendations,
        "reboot-unexpected",
        format!("Last reboot reason is \"{reason}\"; check power supply stability and the fault log."),
    )])
}

pub(super) fn atpc_advisory(atpc: Option<bool>) -> Vec<Finding> {
    if atpc != Some(false) {
        return Vec::new();
    }
    vec![Finding::new(
        Category::Recommendations,
        "atpc-disabled",
        "ATPC is disabled; enable automatic transmit power control to reduce interference.",
    )]
}

pub(super) fn firmware_freshness(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let Some(lookup) = ctx.firmware else {
        return Ok(Vec::new());
    };
    let record = ctx.record;
    let (Some(current), Some(platform)) = (&record.firmware_version, &record.platform) else {
        return Ok(Vec::new());
    };
    let current_key = version_key(current)
        .ok_or_else(|| RuleError::Invalid(format!("firmware version {current} has no number")))?;

    let versions = lookup.available_versions(record.family.product_line(), platform)?;
    let Some(latest) = latest_version(&versions) else {
        return Ok(Vec::new());
    };
    if version_key(latest).is_some_and(|latest_key| latest_key > current_key) {
        return Ok(vec![Finding::new(
            Category::Recommendations,
            "firmware-outdated",
            format!("Firmware {current} is outdated; upgrade to {latest}."),
        )]);
    }
    Ok(Vec::new())
}

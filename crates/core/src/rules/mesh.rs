use super::common::{
    atpc_advisory, ethernet_crc, ethernet_duplex, firmware_freshness, link_flaps,
    quality_finding, reboot_reason, rssi, uptime,
};
use super::{LinkGate, Rule, RuleContext};
use crate::error::RuleError;
use crate::firmware::version_key;
use crate::model::{Category, DistanceSetting, Finding, MeshDetails, Unit};

const SNR_SEVERE_DB: f64 = 10.0;
const SNR_MARGINAL_DB: f64 = 18.0;
const MAX_LEVEL_ASYMMETRY: u32 = 10;
const MAX_RETRY_PERCENT: f64 = 10.0;
const MAX_ERROR_PERCENT: f64 = 5.0;
const MAX_BROADCAST_SHARE: f64 = 0.10;
const MIN_BROADCAST_SAMPLE: u64 = 1_000;
const HIGHEST_SYSTEM_QUEUE: u32 = 16;
const LICENSE_QUEUES: [&str; 2] = ["0", "1"];

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
        id: "level-asymmetry",
        category: Category::Radio,
        gate: LinkGate::RequiresLink,
        check: level_asymmetry,
    },
    Rule {
        id: "retries",
        category: Category::Radio,
        gate: LinkGate::RequiresLink,
        check: retries,
    },
    Rule {
        id: "errors",
        category: Category::Radio,
        gate: LinkGate::RequiresLink,
        check: errors,
    },
    Rule {
        id: "distance",
        category: Category::Radio,
        gate: LinkGate::RequiresLink,
        check: distance,
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
        id: "switch-overflow",
        category: Category::Switch,
        gate: LinkGate::Always,
        check: switch_overflow,
    },
    Rule {
        id: "switch-loops",
        category: Category::Switch,
        gate: LinkGate::Always,
        check: switch_loops,
    },
    Rule {
        id: "switch-broadcast",
        category: Category::Switch,
        gate: LinkGate::Always,
        check: switch_broadcast,
    },
    Rule {
        id: "qos-license",
        category: Category::Qos,
        gate: LinkGate::Always,
        check: qos_license,
    },
    Rule {
        id: "qos-drops",
        category: Category::Qos,
        gate: LinkGate::Always,
        check: qos_drops,
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
        id: "autobitrate",
        category: Category::Recommendations,
        gate: LinkGate::Always,
        check: autobitrate,
    },
    Rule {
        id: "peer-firmware",
        category: Category::Recommendations,
        gate: LinkGate::Always,
        check: peer_firmware,
    },
    Rule {
        id: "firmware-freshness",
        category: Category::Recommendations,
        gate: LinkGate::Always,
        check: firmware_freshness,
    },
];

fn details<'a>(ctx: &RuleContext<'a>) -> Result<&'a MeshDetails, RuleError> {
    ctx.record
        .mesh()
        .ok_or_else(|| RuleError::Invalid("record is not a mesh radio".to_string()))
}

fn link_state(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let radio = &details(ctx)?.radio_status;
    let interface = radio.interface.as_deref().unwrap_or("radio interface");
    let finding = match radio.interface_up {
        None => return Ok(Vec::new()),
        Some(false) => Finding::new(
            Category::Radio,
            "link-state",
            format!("Radio interface {interface} is down; no link can be established."),
        ),
        Some(true) if radio.peers.is_empty() => Finding::new(
            Category::Radio,
            "link-state",
            format!("Radio interface {interface} is up but has no links to other nodes."),
        ),
        Some(true) => return Ok(Vec::new()),
    };
    Ok(vec![finding])
}

fn snr(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for (id, peer) in &details(ctx)?.radio_status.peers {
        for (direction, value) in peer.snr.sides() {
            let Some(value) = value else { continue };
            let subject = format!("Peer {id} {}", direction.label());
            findings.extend(quality_finding(
                &subject,
                "SNR",
                "snr",
                value,
                SNR_SEVERE_DB,
                SNR_MARGINAL_DB,
            )?);
        }
    }
    Ok(findings)
}

fn level_asymmetry(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for (id, peer) in &details(ctx)?.radio_status.peers {
        let (Some(rx), Some(tx)) = (peer.level.rx, peer.level.tx) else {
            continue;
        };
        if rx.abs_diff(tx) > MAX_LEVEL_ASYMMETRY {
            findings.push(Finding::new(
                Category::Radio,
                "level-asymmetry",
                format!(
                    "Peer {id}: signal levels differ by {} (Rx {rx}, Tx {tx}); check for interference near one of the nodes.",
                    rx.abs_diff(tx)
                ),
            ));
        }
    }
    Ok(findings)
}

fn retries(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for (id, peer) in &details(ctx)?.radio_status.peers {
        for (direction, value) in peer.retry.sides() {
            let Some(value) = value else { continue };
            if value.expect(Unit::Percent, "retries")? > MAX_RETRY_PERCENT {
                findings.push(Finding::new(
                    Category::Radio,
                    "retries-high",
                    format!(
                        "Peer {id} {}: {value} retransmissions exceed 10%.",
                        direction.label()
                    ),
                ));
            }
        }
    }
    Ok(findings)
}

fn errors(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let mut findings = Vec::new();
    for (id, peer) in &details(ctx)?.radio_status.peers {
        for (direction, value) in peer.errors.sides() {
            let Some(value) = value else { continue };
            if value.expect(Unit::Percent, "errors")? > MAX_ERROR_PERCENT {
                findings.push(Finding::new(
                    Category::Radio,
                    "errors-high",
                    format!(
                        "Peer {id} {}: {value} frame errors exceed 5%.",
                        direction.label()
                    ),
                ));
            }
        }
    }
    Ok(findings)
}

fn distance(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let details = details(ctx)?;
    let Some(DistanceSetting::Fixed(configured)) = &details.settings.distance else {
        return Ok(Vec::new());
    };
    let limit = configured.expect(Unit::Kilometers, "configured distance")?;
    let mut findings = Vec::new();
    for (id, peer) in &details.radio_status.peers {
        let Some(measured) = &peer.distance else {
            continue;
        };
        if measured.expect(Unit::Kilometers, "peer distance")? > limit {
            findings.push(Finding::new(
                Category::Radio,
                "distance-exceeded",
                format!(
                    "Peer {id} is {measured} away but the configured distance is {configured}; set distance to auto or increase it."
                ),
            ));
        }
    }
    Ok(findings)
}

fn switch_overflow(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    Ok(details(ctx)?
        .switch_status
        .iter()
        .filter(|(_, group)| group.overflow > 0)
        .map(|(id, group)| {
            Finding::new(
                Category::Switch,
                "switch-mac-overflow",
                format!(
                    "Switch group {id}: MAC table overflowed {} times ({} entries); split the broadcast domain.",
                    group.overflow, group.mac_entries
                ),
            )
        })
        .collect())
}

fn switch_loops(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    Ok(details(ctx)?
        .switch_status
        .iter()
        .filter(|(_, group)| group.loops > 0)
        .map(|(id, group)| {
            Finding::new(
                Category::Switch,
                "switch-loop",
                format!(
                    "Switch group {id}: {} loops detected; enable STP or fix the topology.",
                    group.loops
                ),
            )
        })
        .collect())
}

fn switch_broadcast(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    Ok(details(ctx)?
        .switch_status
        .iter()
        .filter(|(_, group)| group.packets >= MIN_BROADCAST_SAMPLE)
        .filter_map(|(id, group)| {
            let share = group.broadcast as f64 / group.packets as f64;
            (share > MAX_BROADCAST_SHARE).then(|| {
                Finding::new(
                    Category::Switch,
                    "switch-broadcast",
                    format!(
                        "Switch group {id}: broadcast is {:.1}% of {} packets; look for a broadcast storm source.",
                        share * 100.0,
                        group.packets
                    ),
                )
            })
        })
        .collect())
}

fn qos_license(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let queues = &details(ctx)?.qos_status;
    let dropped = LICENSE_QUEUES
        .iter()
        .filter_map(|id| queues.get(*id))
        .map(|queue| queue.dropped)
        .sum::<u64>();
    if dropped == 0 {
        return Ok(Vec::new());
    }
    Ok(vec![Finding::new(
        Category::Qos,
        "license-limit",
        format!(
            "License queues dropped {dropped} packets; traffic exceeds the licensed throughput."
        ),
    )])
}

fn qos_drops(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    Ok(details(ctx)?
        .qos_status
        .iter()
        .filter(|(id, queue)| {
            queue.dropped > 0
                && id
                    .parse::<u32>()
                    .is_ok_and(|number| number > HIGHEST_SYSTEM_QUEUE)
        })
        .map(|(id, queue)| {
            Finding::new(
                Category::Qos,
                "qos-drops",
                format!(
                    "Queue {id} ({}) dropped {} packets; review the QoS policy.",
                    queue.name, queue.dropped
                ),
            )
        })
        .collect())
}

fn atpc(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    Ok(atpc_advisory(details(ctx)?.settings.atpc))
}

fn autobitrate(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    if details(ctx)?.settings.autobitrate != Some(false) {
        return Ok(Vec::new());
    }
    Ok(vec![Finding::new(
        Category::Recommendations,
        "autobitrate-disabled",
        "Automatic bitrate is disabled; enable it so the link adapts to changing conditions.",
    )])
}

fn peer_firmware(ctx: &RuleContext<'_>) -> Result<Vec<Finding>, RuleError> {
    let Some(local) = ctx.record.firmware_version.as_deref() else {
        return Ok(Vec::new());
    };
    let Some(local_key) = version_key(local) else {
        return Ok(Vec::new());
    };
    let mut findings = Vec::new();
    for (id, peer) in &details(ctx)?.radio_status.peers {
        let Some(firmware) = peer.firmware.as_deref() else {
            continue;
        };
        if version_key(firmware).is_some_and(|key| key != local_key) {
            findings.push(Finding::new(
                Category::Recommendations,
                "peer-firmware-mismatch",
                format!(
                    "Peer {id} runs firmware {firmware} while this node runs {local}; use the same version on every node."
                ),
            ));
        }
    }
    Ok(findings)
}

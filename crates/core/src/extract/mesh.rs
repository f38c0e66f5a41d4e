use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::text::{
    block_text, capture, capture_measurement, capture_pair, capture_parse, capture_string,
    capture_switch, find_bounded_block, instances, parse_switch, parse_uptime, pattern,
};
use super::{model, parse_duplex, reboot_reason, require, serial_number, StepLog};
use crate::error::ExtractionError;
use crate::input::RawDump;
use crate::model::{
    DeviceRecord, DistanceSetting, EthernetPort, Family, FamilyDetails, Measurement, MeshDetails,
    MeshPeer, MeshRadioStatus, MeshSettings, MintProfile, Pair, QueueStatus, SwitchGroupConfig,
    SwitchGroupStatus, Unit,
};

static BANNER: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?m)^WANFleX (H\d{2})S\d{2}-(MINT|TDMA)\s+(v\d+(?:\.\d+)+)")
});
static UPTIME: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*System uptime:\s*(\S.*?)\s*$"));

fn block(name: &str) -> (Regex, Regex) {
    let name = regex::escape(name);
    (
        pattern(&format!(r"^#####\s+{name}\s+#####\s*$")),
        pattern(&format!(r"(?i)^#####\s+End of {name}\s+#####\s*$")),
    )
}

static CONFIGURATION: Lazy<(Regex, Regex)> = Lazy::new(|| block("Configuration"));
static LINKS: Lazy<(Regex, Regex)> = Lazy::new(|| block("MINT links"));
static ETHERNET: Lazy<(Regex, Regex)> = Lazy::new(|| block("Ethernet statistics"));
static SWITCH: Lazy<(Regex, Regex)> = Lazy::new(|| block("Switch statistics"));
static QOS: Lazy<(Regex, Regex)> = Lazy::new(|| block("QoS statistics"));

pub fn extract(dump: &RawDump) -> Result<DeviceRecord, ExtractionError> {
    let family = Family::MeshRadio;
    let serial_number = require(family, "serial_number", serial_number(&dump.text))?;
    let lines = dump.line_refs();
    let mut log = StepLog::default();

    let banner = BANNER.captures(&dump.text);
    let platform = banner.as_ref().map(|caps| caps[1].to_string());
    let subfamily = banner
        .as_ref()
        .map(|caps| caps[2].to_string())
        .unwrap_or_else(|| "2x2".to_string());
    let firmware_version = log.field(
        "firmware_version",
        banner
            .as_ref()
            .map(|caps| format!("{}{}", &caps[1], &caps[3])),
    );
    let uptime = log.field(
        "uptime",
        capture(&UPTIME, &dump.text).and_then(parse_uptime),
    );

    let configuration = section(&lines, &CONFIGURATION, "Configuration", &mut log);
    let links = section(&lines, &LINKS, "MINT links", &mut log);
    let ethernet = section(&lines, &ETHERNET, "Ethernet statistics", &mut log);
    let switch = section(&lines, &SWITCH, "Switch statistics", &mut log);
    let qos = section(&lines, &QOS, "QoS statistics", &mut log);

    let settings = configuration
        .map(|block| settings(&block))
        .unwrap_or_default();
    let radio_status = links
        .map(|block| radio_status(&block, &mut log))
        .unwrap_or_default();
    let ethernet_status = ethernet
        .map(|block| ethernet_status(&block))
        .unwrap_or_default();
    let switch_status = switch
        .map(|block| switch_status(&block))
        .unwrap_or_default();
    let qos_status = qos.map(|block| qos_status(&block)).unwrap_or_default();

    Ok(DeviceRecord {
        family,
        subfamily,
        model: model(&dump.text),
        serial_number,
        firmware_version,
        platform,
        uptime,
        last_reboot_reason: reboot_reason(&dump.text),
        raw_text: dump.text.clone(),
        raw_lines: dump.lines.clone(),
        details: FamilyDetails::Mesh(MeshDetails {
            settings,
            radio_status,
            switch_status,
            qos_status,
        }),
        ethernet_status,
        notes: log.into_notes(),
    })
}

fn section(
    lines: &[&str],
    markers: &(Regex, Regex),
    name: &str,
    log: &mut StepLog,
) -> Option<String> {
    let range = log.section(name, find_bounded_block(lines, &markers.0, &markers.1))?;
    Some(block_text(lines, range))
}

// ── Configuration ──

static IFC_RF: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^ifc\s+(rf\d+\.\d+)\s+(.*?)\s*$"));
static IFC_FREQ: Lazy<Regex> = Lazy::new(|| pattern(r"\bfreq\s+(\d+(?:\.\d+)?)"));
static IFC_BAND: Lazy<Regex> = Lazy::new(|| pattern(r"\bband\s+(\d+(?:\.\d+)?)"));
static IFC_BITRATE: Lazy<Regex> = Lazy::new(|| pattern(r"\bbitr\s+(\d+)"));
static IFC_TXPWR: Lazy<Regex> = Lazy::new(|| pattern(r"\btxpwr\s+(-?\d+(?:\.\d+)?)"));
static IFC_DISTANCE: Lazy<Regex> =
    Lazy::new(|| pattern(r"\bdistance\s+(auto|\d+(?:\.\d+)?)"));

static MINT_NAME: Lazy<Regex> = Lazy::new(|| pattern(r#"(?m)^mint\s+\S+\s+-name\s+"([^"]*)""#));
static MINT_TYPE: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^mint\s+\S+\s+-type\s+(\S+)"));
static MINT_MODE: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^mint\s+\S+\s+-mode\s+(\S+)"));
static MINT_AUTOBITRATE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?m)^mint\s+\S+\s+-autobitr\s+(\S+)"));
static MINT_ATPC: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^mint\s+\S+\s+-atpc\s+(\S+)"));
static MINT_SCRAMBLING: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?m)^mint\s+\S+\s+-scrambling\s+(\S+)"));

static PROFILE: Lazy<Regex> = Lazy::new(|| pattern(r"^mint\s+\S+\s+prof\s+(\d+)\s*(.*?)\s*$"));
static PROFILE_FREQ: Lazy<Regex> = Lazy::new(|| pattern(r"-freq\s+(\d+(?:\.\d+)?)"));
static PROFILE_BAND: Lazy<Regex> = Lazy::new(|| pattern(r"-band\s+(\d+(?:\.\d+)?)"));
static PROFILE_BITRATE: Lazy<Regex> = Lazy::new(|| pattern(r"-bitr\s+(\d+)"));
static PROFILE_SID: Lazy<Regex> = Lazy::new(|| pattern(r"-sid\s+(\S+)"));
static PROFILE_DISABLED: Lazy<Regex> = Lazy::new(|| pattern(r"(?:^|\s)-disable\b"));

static SWITCH_GROUP: Lazy<Regex> =
    Lazy::new(|| pattern(r"^sw\s+group\s+(\d+)\s+(\S+)\s*(.*?)\s*$"));

fn settings(block: &str) -> MeshSettings {
    let ifc = IFC_RF.captures(block);
    let options = ifc
        .as_ref()
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default();

    let distance = capture(&IFC_DISTANCE, options).and_then(|value| {
        if value == "auto" {
            Some(DistanceSetting::Auto)
        } else {
            value
                .parse()
                .ok()
                .map(|km| DistanceSetting::Fixed(Measurement::new(km, Unit::Kilometers)))
        }
    });

    MeshSettings {
        interface: ifc.as_ref().map(|caps| caps[1].to_string()),
        node_name: capture_string(&MINT_NAME, block),
        node_type: capture_string(&MINT_TYPE, block),
        mode: capture_string(&MINT_MODE, block),
        frequency: capture_measurement(&IFC_FREQ, options, Unit::Mhz),
        bandwidth: capture_measurement(&IFC_BAND, options, Unit::Mhz),
        fixed_bitrate: capture_measurement(&IFC_BITRATE, options, Unit::Kbps),
        tx_power: capture_measurement(&IFC_TXPWR, options, Unit::Dbm),
        distance,
        autobitrate: capture_switch(&MINT_AUTOBITRATE, block),
        atpc: capture_switch(&MINT_ATPC, block),
        scrambling: capture_switch(&MINT_SCRAMBLING, block),
        profiles: profiles(block),
        switch_groups: switch_groups(block),
    }
}

fn profiles(block: &str) -> IndexMap<String, MintProfile> {
    let mut profiles = IndexMap::new();
    for line in block.lines() {
        let Some(caps) = PROFILE.captures(line) else {
            continue;
        };
        let options = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        profiles.insert(
            caps[1].to_string(),
            MintProfile {
                frequency: capture_measurement(&PROFILE_FREQ, options, Unit::Mhz),
                bandwidth: capture_measurement(&PROFILE_BAND, options, Unit::Mhz),
                bitrate: capture_measurement(&PROFILE_BITRATE, options, Unit::Kbps),
                sid: capture_string(&PROFILE_SID, options),
                enabled: !PROFILE_DISABLED.is_match(options),
            },
        );
    }
    profiles
}

fn switch_groups(block: &str) -> IndexMap<String, SwitchGroupConfig> {
    let mut groups: IndexMap<String, SwitchGroupConfig> = IndexMap::new();
    for line in block.lines() {
        let Some(caps) = SWITCH_GROUP.captures(line) else {
            continue;
        };
        let group = groups.entry(caps[1].to_string()).or_default();
        let arguments = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
        match &caps[2] {
            "add" => {
                for token in arguments.split([' ', ',']).filter(|t| !t.is_empty()) {
                    match token.parse::<u32>() {
                        Ok(vlan) => group.vlans.push(vlan),
                        Err(_) => group.interfaces.push(token.to_string()),
                    }
                }
            }
            "stp" => group.stp = parse_switch(arguments),
            "start" => group.started = true,
            _ => {}
        }
    }
    groups
}

// ── MINT links ──

static LINK_HEADER: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?m)^(rf\d+\.\d+):\s+link\s+(\w+)\b(.*)$"));
static HEADER_FREQ: Lazy<Regex> = Lazy::new(|| pattern(r"\bfreq\s+(\d+(?:\.\d+)?)\s*MHz"));
static HEADER_BAND: Lazy<Regex> = Lazy::new(|| pattern(r"\bband\s+(\d+(?:\.\d+)?)\s*MHz"));
static HEADER_NOISE: Lazy<Regex> = Lazy::new(|| pattern(r"\bnoise\s+(-?\d+(?:\.\d+)?)\s*dBm"));
static DECLARED_LINKS: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^\s*Links:\s*(\d+)"));

static PEER_MARKER: Lazy<Regex> =
    Lazy::new(|| pattern(r#"^\s*Id\s+(\S+)(?:\s+"([^"]*)")?\s*$"#));
static PEER_ID: Lazy<Regex> = Lazy::new(|| pattern(r"^[0-9A-Fa-f]{12}$"));
static PEER_LEVEL: Lazy<Regex> = Lazy::new(|| pattern(r"\bLevel\s+([^\s/]+)/([^\s/]+)"));
static PEER_SNR: Lazy<Regex> = Lazy::new(|| pattern(r"\bSNR\s+([^\s/]+)/([^\s/]+)\s*dB\b"));
static PEER_POWER: Lazy<Regex> =
    Lazy::new(|| pattern(r"\bPower\s+([^\s/]+)/([^\s/]+)\s*dBm\b"));
static PEER_BITRATE: Lazy<Regex> =
    Lazy::new(|| pattern(r"\bBitrate\s+([^\s/]+)/([^\s/]+)\s*kbps\b"));
static PEER_RETRY: Lazy<Regex> = Lazy::new(|| pattern(r"\bRetry\s+([^\s/]+)/([^\s/]+)\s*%"));
static PEER_ERRORS: Lazy<Regex> = Lazy::new(|| pattern(r"\bErrors\s+([^\s/]+)/([^\s/]+)\s*%"));
static PEER_DISTANCE: Lazy<Regex> =
    Lazy::new(|| pattern(r"\bDistance\s+(\d+(?:\.\d+)?)\s*km\b"));
static PEER_UPTIME: Lazy<Regex> =
    Lazy::new(|| pattern(r"\bUptime\s+(\d+d\s+\d{1,2}:\d{2}:\d{2})"));
static PEER_FIRMWARE: Lazy<Regex> = Lazy::new(|| pattern(r"\bFirmware\s+(\S+)"));

fn radio_status(block: &str, log: &mut StepLog) -> MeshRadioStatus {
    let header = log.field("link header", LINK_HEADER.captures(block));
    let rest = header
        .as_ref()
        .and_then(|caps| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default();

    let lines = block.lines().collect::<Vec<_>>();
    let mut peers = IndexMap::new();
    for instance in instances(&lines, &PEER_MARKER) {
        let Some(id) = instance.capture(1).filter(|id| PEER_ID.is_match(id)) else {
            log.note(format!(
                "ignored peer with malformed id `{}`",
                instance.capture(1).unwrap_or_default()
            ));
            continue;
        };
        if peers.contains_key(id) {
            log.note(format!("ignored duplicate peer {id}"));
            continue;
        }
        let body = instance.body.as_str();
        peers.insert(
            id.to_string(),
            MeshPeer {
                name: instance.capture(2).map(str::to_string),
                level: pair(capture_pair(&PEER_LEVEL, body)),
                snr: measurement_pair(&PEER_SNR, body, Unit::Db),
                power: measurement_pair(&PEER_POWER, body, Unit::Dbm),
                bitrate: measurement_pair(&PEER_BITRATE, body, Unit::Kbps),
                retry: measurement_pair(&PEER_RETRY, body, Unit::Percent),
                errors: measurement_pair(&PEER_ERRORS, body, Unit::Percent),
                distance: capture_measurement(&PEER_DISTANCE, body, Unit::Kilometers),
                uptime: capture_string(&PEER_UPTIME, body),
                firmware: capture_string(&PEER_FIRMWARE, body),
            },
        );
    }

    MeshRadioStatus {
        interface: header.as_ref().map(|caps| caps[1].to_string()),
        interface_up: header.as_ref().and_then(|caps| parse_switch(&caps[2])),
        frequency: capture_measurement(&HEADER_FREQ, rest, Unit::Mhz),
        bandwidth: capture_measurement(&HEADER_BAND, rest, Unit::Mhz),
        noise_floor: capture_measurement(&HEADER_NOISE, rest, Unit::Dbm),
        declared_links: capture_parse(&DECLARED_LINKS, block),
        peers,
    }
}

fn pair<T>((rx, tx): (Option<T>, Option<T>)) -> Pair<T> {
    Pair { rx, tx }
}

fn measurement_pair(re: &Regex, text: &str, unit: Unit) -> Pair<Measurement> {
    let (rx, tx) = capture_pair::<f64>(re, text);
    Pair {
        rx: rx.map(|value| Measurement::new(value, unit)),
        tx: tx.map(|value| Measurement::new(value, unit)),
    }
}

// ── Ethernet, switch and QoS statistics ──

static PORT_MARKER: Lazy<Regex> =
    Lazy::new(|| pattern(r"^((?:eth|ge|sfp|xe)\d+):\s+link\s+(\w+)\b(.*)$"));
static PORT_MEDIA: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)\b(\d+)Mbps-(Full|Half)\b"));
static PORT_AUTONEG: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)\bautoneg\s+(on|off)\b"));
static PORT_RX: Lazy<Regex> = Lazy::new(|| pattern(r"\bRx packets\s+(\d+)"));
static PORT_TX: Lazy<Regex> = Lazy::new(|| pattern(r"\bTx packets\s+(\d+)"));
static PORT_CRC: Lazy<Regex> = Lazy::new(|| pattern(r"\bCRC\s+(\d+)"));

fn ethernet_status(block: &str) -> IndexMap<String, EthernetPort> {
    let lines = block.lines().collect::<Vec<_>>();
    let mut ports = IndexMap::new();
    for instance in instances(&lines, &PORT_MARKER) {
        let Some(name) = instance.capture(1) else {
            continue;
        };
        let rest = instance.capture(3).unwrap_or_default();
        let media = PORT_MEDIA.captures(rest);
        let port = EthernetPort {
            link_up: instance.capture(2).and_then(parse_switch),
            speed: media
                .as_ref()
                .and_then(|caps| caps[1].parse::<f64>().ok())
                .map(|value| Measurement::new(value, Unit::Mbps)),
            duplex: media.as_ref().and_then(|caps| parse_duplex(&caps[2])),
            autoneg: capture_switch(&PORT_AUTONEG, rest),
            crc_errors: capture_parse(&PORT_CRC, &instance.body),
            rx_packets: capture_parse(&PORT_RX, &instance.body),
            tx_packets: capture_parse(&PORT_TX, &instance.body),
        };
        ports.entry(name.to_string()).or_insert(port);
    }
    ports
}

static SWITCH_ROW: Lazy<Regex> = Lazy::new(|| {
    pattern(r"^\s*(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s*$")
});

fn switch_status(block: &str) -> IndexMap<String, SwitchGroupStatus> {
    let mut groups = IndexMap::new();
    for line in block.lines() {
        let Some(caps) = SWITCH_ROW.captures(line) else {
            continue;
        };
        let number = |index: usize| caps[index].parse::<u64>().unwrap_or_default();
        groups.entry(caps[1].to_string()).or_insert(SwitchGroupStatus {
            packets: number(2),
            flood: number(3),
            broadcast: number(4),
            loops: number(5),
            overflow: number(6),
            mac_entries: number(7),
        });
    }
    groups
}

static QUEUE_ROW: Lazy<Regex> =
    Lazy::new(|| pattern(r"^\s*(\d+)\s+(\S+)\s+(\d+)\s+(\d+)\s*$"));

fn qos_status(block: &str) -> IndexMap<String, QueueStatus> {
    let mut queues = IndexMap::new();
    for line in block.lines() {
        let Some(caps) = QUEUE_ROW.captures(line) else {
            continue;
        };
        queues.entry(caps[1].to_string()).or_insert(QueueStatus {
            name: caps[2].to_string(),
            packets: caps[3].parse().unwrap_or_default(),
            dropped: caps[4].parse().unwrap_or_default(),
        });
    }
    queues
}

#[cfg(test)]
mod tests {
    use super::extract;
    use crate::error::ExtractionError;
    use crate::input::RawDump;
    use crate::model::{DistanceSetting, Duplex, Family, Measurement, Unit};

    fn dump(text: &str) -> RawDump {
        RawDump::from_text("card.txt", text).expect("text dump")
    }

    #[test]
    fn extracts_nominal_mesh_card() {
        let record = extract(&dump(include_str!("../../../../fixtures/mesh-nominal.txt")))
            .expect("record");
        assert_eq!(record.family, Family::MeshRadio);
        assert_eq!(record.subfamily, "TDMA");
        assert_eq!(record.serial_number, "112233");
        assert_eq!(record.platform.as_deref(), Some("H11"));
        assert_eq!(record.firmware_version.as_deref(), Some("H11v1.90.45"));
        assert_eq!(record.uptime.as_ref().map(|u| u.seconds), Some(1_052_530));
        assert_eq!(record.last_reboot_reason.as_deref(), Some("Power on"));
        assert!(record.notes.is_empty(), "{:?}", record.notes);

        let mesh = record.mesh().expect("mesh details");
        assert_eq!(mesh.settings.node_name.as_deref(), Some("Tower-North"));
        assert_eq!(
            mesh.settings.distance,
            Some(DistanceSetting::Fixed(Measurement::new(10.0, Unit::Kilometers)))
        );
        assert_eq!(mesh.settings.autobitrate, Some(true));
        assert_eq!(mesh.settings.fixed_bitrate, None);
        assert_eq!(mesh.settings.profiles.len(), 2);
        assert!(!mesh.settings.profiles["2"].enabled);
        assert_eq!(mesh.settings.switch_groups["1"].vlans, vec![10]);
        assert_eq!(
            mesh.settings.switch_groups["1"].interfaces,
            vec!["rf5.0".to_string(), "eth0".to_string()]
        );
        assert_eq!(mesh.settings.switch_groups["1"].stp, Some(true));

        let radio = &mesh.radio_status;
        assert_eq!(radio.interface_up, Some(true));
        assert_eq!(radio.declared_links, Some(2));
        assert_eq!(radio.noise_floor, Some(Measurement::new(-98.0, Unit::Dbm)));
        let ids = radio.peers.keys().cloned().collect::<Vec<_>>();
        assert_eq!(ids, vec!["00043A1B2C3D", "00043A1B2C4E"]);
        let east = &radio.peers["00043A1B2C3D"];
        assert_eq!(east.name.as_deref(), Some("Node-East"));
        assert_eq!(east.level.rx, Some(24));
        assert_eq!(east.power.tx, Some(Measurement::new(-52.0, Unit::Dbm)));
        assert_eq!(east.distance, Some(Measurement::new(3.2, Unit::Kilometers)));
        assert_eq!(east.firmware.as_deref(), Some("H11v1.90.45"));

        let eth0 = &record.ethernet_status["eth0"];
        assert_eq!(eth0.duplex, Some(Duplex::Full));
        assert_eq!(eth0.crc_errors, Some(0));
        assert_eq!(eth0.rx_packets, Some(1_234_567));

        assert_eq!(mesh.switch_status["1"].packets, 1_203_345);
        assert_eq!(mesh.qos_status["18"].name, "data");
    }

    #[test]
    fn extracts_counters_from_degraded_card() {
        let record = extract(&dump(include_str!("../../../../fixtures/mesh-issues.txt")))
            .expect("record");
        let mesh = record.mesh().expect("mesh details");
        assert_eq!(record.subfamily, "MINT");
        assert_eq!(mesh.settings.autobitrate, Some(false));
        assert_eq!(
            mesh.settings.fixed_bitrate,
            Some(Measurement::new(52_000.0, Unit::Kbps))
        );
        assert_eq!(mesh.switch_status["1"].loops, 2);
        assert_eq!(mesh.qos_status["0"].dropped, 120);
        assert_eq!(record.ethernet_status["eth0"].duplex, Some(Duplex::Half));
        assert_eq!(record.ethernet_status["eth0"].crc_errors, Some(12));
    }

    #[test]
    fn missing_serial_number_is_an_identity_error() {
        let text = include_str!("../../../../fixtures/mesh-nominal.txt")
            .replace("Serial number: 112233", "Serial: unknown");
        assert_eq!(
            extract(&dump(&text)),
            Err(ExtractionError::MissingIdentity {
                family: Family::MeshRadio,
                field: "serial_number"
            })
        );
    }

    #[test]
    fn missing_sections_leave_fields_absent() {
        let text = "WANFleX H11S24-MINT v1.90.45 * OEM *\nSerial number: 42\n\
                    #####  MINT links  #####\nrf5.0: link DOWN\nLinks: 0\n";
        let record = extract(&dump(text)).expect("record");
        let mesh = record.mesh().expect("mesh details");
        assert!(mesh.radio_status.peers.is_empty());
        assert_eq!(mesh.radio_status.interface_up, None);
        assert!(mesh.switch_status.is_empty());
        assert!(record.ethernet_status.is_empty());
        assert!(record.uptime.is_none());
        assert!(record
            .notes
            .iter()
            .any(|note| note == "section `MINT links` not found"));
        assert!(record
            .notes
            .iter()
            .any(|note| note == "section `Configuration` not found"));
    }

    #[test]
    fn dropped_switch_section_leaves_other_sections_intact() {
        let text = include_str!("../../../../fixtures/mesh-nominal.txt")
            .replace("#####  Switch statistics  #####\n", "");
        let record = extract(&dump(&text)).expect("record");
        assert_eq!(record.notes, vec!["section `Switch statistics` not found"]);
        assert_eq!(record.serial_number, "112233");
        assert_eq!(record.firmware_version.as_deref(), Some("H11v1.90.45"));
        assert_eq!(record.uptime.as_ref().map(|u| u.seconds), Some(1_052_530));

        let mesh = record.mesh().expect("mesh details");
        assert!(mesh.switch_status.is_empty());
        assert_eq!(mesh.settings.node_name.as_deref(), Some("Tower-North"));
        assert_eq!(mesh.settings.switch_groups.len(), 2);
        assert_eq!(mesh.radio_status.interface_up, Some(true));
        assert_eq!(mesh.radio_status.peers.len(), 2);
        assert_eq!(mesh.qos_status.len(), 4);
        assert_eq!(record.ethernet_status["eth0"].crc_errors, Some(0));
    }

    #[test]
    fn malformed_and_duplicate_peers_are_noted() {
        let text = "WANFleX H11S24-MINT v1.90.45 * OEM *\nSerial number: 42\n\
                    #####  MINT links  #####\n\
                    rf5.0: link UP, noise -95 dBm\n\
                    Id 00043A1B2C3D \"A\"\n  Power -60/-61 dBm\n\
                    Id 00043A1B2C3D \"A\"\n  Power -70/-71 dBm\n\
                    Id ZZZ \"B\"\n\
                    #####  End of MINT links  #####\n";
        let record = extract(&dump(text)).expect("record");
        let peers = &record.mesh().expect("mesh").radio_status.peers;
        assert_eq!(peers.len(), 1);
        assert_eq!(
            peers["00043A1B2C3D"].power.rx,
            Some(Measurement::new(-60.0, Unit::Dbm))
        );
        assert!(record.notes.iter().any(|note| note.contains("duplicate peer")));
        assert!(record.notes.iter().any(|note| note.contains("`ZZZ`")));
    }
}

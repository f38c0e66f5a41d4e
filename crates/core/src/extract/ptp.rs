use once_cell::sync::Lazy;
use regex::Regex;

use super::text::{
    block_text, capture, capture_measurement, capture_measurement_pair, capture_pair,
    capture_parse, capture_string, capture_switch, find_bounded_block, parse_uptime, pattern,
};
use super::{
    collect_panics, ethernet_table, model, reboot_reason, require, role_case, serial_number,
    RoleAssembler, StepLog,
};
use crate::error::ExtractionError;
use crate::input::RawDump;
use crate::model::{
    DeviceRecord, Family, FamilyDetails, LinkRole, LinkStatistics, PtpDetails, PtpLinkState,
    PtpRadioStatus, PtpSettings, StreamMetrics, Unit,
};

static BANNER: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^((?:Quanta|Vector) 70)\b"));
static FIRMWARE: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?mi)^\s*Firmware version:\s*(\d+(?:\.\d+)+)(?:\s*\((\w+)\))?")
});
static UPTIME: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Uptime:\s*(\S.*?)\s*$"));
static DEVICE_ROLE: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Device role:\s*(\w+)"));

fn block(name: &str) -> (Regex, Regex) {
    let name = regex::escape(name);
    (
        pattern(&format!(r"(?i)^\[{name}\]\s*$")),
        pattern(&format!(r"(?i)^\[/{name}\]\s*$")),
    )
}

static CONFIGURATION: Lazy<(Regex, Regex)> = Lazy::new(|| block("Radio configuration"));
static STATUS: Lazy<(Regex, Regex)> = Lazy::new(|| block("Link status"));
static ETHERNET: Lazy<(Regex, Regex)> = Lazy::new(|| block("Ethernet"));

pub fn extract(dump: &RawDump) -> Result<DeviceRecord, ExtractionError> {
    let family = Family::PtpRadio;
    let serial_number = require(family, "serial_number", serial_number(&dump.text))?;
    let model = require(family, "model", model(&dump.text))?;
    let lines = dump.line_refs();
    let mut log = StepLog::default();

    let subfamily = capture_string(&BANNER, &dump.text).unwrap_or_else(|| "Quanta 70".to_string());
    let firmware = FIRMWARE.captures(&dump.text);
    let firmware_version = log.field(
        "firmware_version",
        firmware.as_ref().map(|caps| caps[1].to_string()),
    );
    let platform = firmware
        .as_ref()
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().to_string());
    let uptime = log.field(
        "uptime",
        capture(&UPTIME, &dump.text).and_then(parse_uptime),
    );
    let device_role = log.field("device_role", capture_string(&DEVICE_ROLE, &dump.text));

    let settings = section(&lines, &CONFIGURATION, "Radio configuration", &mut log)
        .map(|block| settings(&block, device_role.clone()))
        .unwrap_or_else(|| PtpSettings {
            device_role: device_role.clone(),
            ..PtpSettings::default()
        });
    let radio_status = section(&lines, &STATUS, "Link status", &mut log)
        .map(|block| radio_status(&block, device_role.as_deref(), &mut log))
        .unwrap_or_default();
    let ethernet_status = section(&lines, &ETHERNET, "Ethernet", &mut log)
        .map(|block| ethernet_table(&block.lines().collect::<Vec<_>>()))
        .unwrap_or_default();

    Ok(DeviceRecord {
        family,
        subfamily,
        model: Some(model),
        serial_number,
        firmware_version,
        platform,
        uptime,
        last_reboot_reason: reboot_reason(&dump.text),
        raw_text: dump.text.clone(),
        raw_lines: dump.lines.clone(),
        details: FamilyDetails::Ptp(PtpDetails {
            settings,
            radio_status,
            panic: collect_panics(&dump.text),
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

static FREQUENCY: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Frequency:\s*(\d+(?:\.\d+)?)\s*MHz"));
static CHANNEL_WIDTH: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Channel width:\s*(\d+(?:\.\d+)?)\s*MHz"));
static TX_POWER: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Tx power:\s*(-?\d+(?:\.\d+)?)\s*dBm"));
static ATPC: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*ATPC:\s*(\w+)"));
static MAX_MCS: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Max MCS:\s*(\d+)"));
static DISTANCE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Distance:\s*(\d+(?:\.\d+)?)\s*km"));

fn settings(block: &str, device_role: Option<String>) -> PtpSettings {
    PtpSettings {
        device_role,
        frequency: capture_measurement(&FREQUENCY, block, Unit::Mhz),
        channel_width: capture_measurement(&CHANNEL_WIDTH, block, Unit::Mhz),
        tx_power: capture_measurement(&TX_POWER, block, Unit::Dbm),
        atpc: capture_switch(&ATPC, block),
        max_mcs: capture_parse(&MAX_MCS, block),
        distance: capture_measurement(&DISTANCE, block, Unit::Kilometers),
    }
}

static STATE: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*State:\s*(\S+)"));
static MEASURED_AT: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Measured at:\s*(\w+)\s*,"));
static STREAM_LINE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Stream\s+(\d+)(?:\s*\([HV]\))?:\s*(.*)$"));
static RSSI: Lazy<Regex> = Lazy::new(|| pattern(r"\bRSSI\s+([^\s,;]+)\s*,\s*([^\s,;]+)\s*dBm"));
static SNR: Lazy<Regex> = Lazy::new(|| pattern(r"\bSNR\s+([^\s,;]+)\s*,\s*([^\s,;]+)\s*dB"));
static EVM: Lazy<Regex> = Lazy::new(|| pattern(r"\bEVM\s+([^\s,;]+)\s*,\s*([^\s,;]+)\s*dB"));
static CROSSTALK: Lazy<Regex> =
    Lazy::new(|| pattern(r"\bCrosstalk\s+([^\s,;]+)\s*,\s*([^\s,;]+)\s*dB"));
static MCS: Lazy<Regex> = Lazy::new(|| pattern(r"\bMCS\s+([^\s,;]+)\s*,\s*([^\s,;]+)"));

pub(crate) fn parse_link_state(value: &str) -> PtpLinkState {
    match value.trim().to_ascii_uppercase().as_str() {
        "CONNECTED" => PtpLinkState::Connected,
        "STARTED" => PtpLinkState::Started,
        "INIT" => PtpLinkState::Init,
        "CONNECTING" => PtpLinkState::Connecting,
        "STANDBY" => PtpLinkState::Standby,
        "SECTOR_DETECTION" => PtpLinkState::SectorDetection,
        _ => PtpLinkState::Other(value.trim().to_string()),
    }
}

fn radio_status(block: &str, device_role: Option<&str>, log: &mut StepLog) -> PtpRadioStatus {
    let link_state = log.field("link_state", capture(&STATE, block).map(parse_link_state));
    let first_column = capture(&MEASURED_AT, block);

    let Some(case) = role_case(device_role, first_column) else {
        log.note("radio statistics omitted: device role or measurement order is missing");
        return PtpRadioStatus {
            link_state,
            statistics: LinkStatistics::default(),
        };
    };

    // One carrier with a horizontal and a vertical polarization stream.
    let mut assembler = RoleAssembler::new(case, LinkRole::Uplink, LinkRole::Downlink, 1);
    for caps in STREAM_LINE.captures_iter(block) {
        let stream = caps[1].parse::<usize>().unwrap_or(usize::MAX);
        let fields = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        if !assembler.insert(0, stream, stream_pair(fields)) {
            log.note(format!("ignored stream {}", &caps[1]));
        }
    }

    let local_role = assembler.local_role();
    PtpRadioStatus {
        link_state,
        statistics: LinkStatistics {
            role_case: Some(case),
            local_role: Some(local_role),
            roles: assembler.finish(),
        },
    }
}

fn stream_pair(fields: &str) -> (StreamMetrics, StreamMetrics) {
    let (rssi_first, rssi_second) = capture_measurement_pair(&RSSI, fields, Unit::Dbm);
    let (snr_first, snr_second) = capture_measurement_pair(&SNR, fields, Unit::Db);
    let (evm_first, evm_second) = capture_measurement_pair(&EVM, fields, Unit::Db);
    let (crosstalk_first, crosstalk_second) =
        capture_measurement_pair(&CROSSTALK, fields, Unit::Db);
    let (mcs_first, mcs_second) = capture_pair::<u32>(&MCS, fields);
    (
        StreamMetrics {
            rssi: rssi_first,
            snr: snr_first,
            evm: evm_first,
            crosstalk: crosstalk_first,
            mcs: mcs_first,
            ..StreamMetrics::default()
        },
        StreamMetrics {
            rssi: rssi_second,
            snr: snr_second,
            evm: evm_second,
            crosstalk: crosstalk_second,
            mcs: mcs_second,
            ..StreamMetrics::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::{extract, parse_link_state};
    use crate::input::RawDump;
    use crate::model::{LinkRole, Measurement, PtpLinkState, RoleCase, Unit};

    fn dump(text: &str) -> RawDump {
        RawDump::from_text("card.txt", text).expect("text dump")
    }

    #[test]
    fn master_with_local_first_column_maps_to_uplink() {
        let record = extract(&dump(include_str!(
            "../../../../fixtures/ptp-polarization.txt"
        )))
        .expect("record");
        assert_eq!(record.subfamily, "Quanta 70");
        assert_eq!(record.firmware_version.as_deref(), Some("2.4.12"));
        assert_eq!(record.platform.as_deref(), Some("q70"));
        assert!(record.notes.is_empty(), "{:?}", record.notes);

        let ptp = record.ptp().expect("ptp details");
        assert_eq!(ptp.settings.max_mcs, Some(12));
        assert_eq!(
            ptp.settings.distance,
            Some(Measurement::new(2.4, Unit::Kilometers))
        );
        assert_eq!(ptp.radio_status.link_state, Some(PtpLinkState::Connected));
        assert!(ptp.panic.is_empty());

        let statistics = &ptp.radio_status.statistics;
        assert_eq!(statistics.role_case, Some(RoleCase::PrimaryIsLocal));
        assert_eq!(statistics.local_role, Some(LinkRole::Uplink));
        let uplink = statistics.roles[&LinkRole::Uplink][0]
            .as_ref()
            .expect("carrier");
        let horizontal = uplink.streams[0].as_ref().expect("stream 0");
        assert_eq!(horizontal.rssi, Some(Measurement::new(-45.0, Unit::Dbm)));
        assert_eq!(horizontal.crosstalk, Some(Measurement::new(0.0, Unit::Db)));
        assert_eq!(horizontal.mcs, Some(12));
        assert_eq!(statistics.streams().count(), 4);

        assert_eq!(record.ethernet_status["eth0"].autoneg, Some(false));
    }

    #[test]
    fn slave_with_remote_first_column_maps_first_column_to_uplink() {
        let record =
            extract(&dump(include_str!("../../../../fixtures/ptp-issues.txt"))).expect("record");
        assert_eq!(record.subfamily, "Vector 70");
        let ptp = record.ptp().expect("ptp details");
        let statistics = &ptp.radio_status.statistics;
        assert_eq!(statistics.role_case, Some(RoleCase::PrimaryIsRemote));
        assert_eq!(statistics.local_role, Some(LinkRole::Downlink));
        let downlink = statistics.roles[&LinkRole::Downlink][0]
            .as_ref()
            .expect("carrier");
        assert_eq!(
            downlink.streams[0].as_ref().and_then(|s| s.snr),
            Some(Measurement::new(8.1, Unit::Db))
        );
        assert_eq!(ptp.panic.len(), 2);
    }

    #[test]
    fn empty_fault_log_and_missing_link_status() {
        let text = "Quanta 70 Diagnostic Card\nModel: Q70-E-23\nSerial number: 1\n\
                    [Fault log]\n[/Fault log]\n";
        let record = extract(&dump(text)).expect("record");
        let ptp = record.ptp().expect("ptp details");
        assert!(ptp.panic.is_empty());
        assert_eq!(ptp.radio_status.link_state, None);
        assert!(record
            .notes
            .iter()
            .any(|note| note == "section `Link status` not found"));
    }

    #[test]
    fn dropped_configuration_section_leaves_other_sections_intact() {
        let text = include_str!("../../../../fixtures/ptp-polarization.txt")
            .replace("[Radio configuration]\n", "");
        let record = extract(&dump(&text)).expect("record");
        assert_eq!(record.notes, vec!["section `Radio configuration` not found"]);
        assert_eq!(record.serial_number, "40012345");
        assert_eq!(record.platform.as_deref(), Some("q70"));

        let ptp = record.ptp().expect("ptp details");
        assert_eq!(ptp.settings.max_mcs, None);
        assert_eq!(ptp.settings.distance, None);
        assert_eq!(ptp.settings.device_role.as_deref(), Some("master"));
        assert_eq!(ptp.radio_status.link_state, Some(PtpLinkState::Connected));
        assert_eq!(ptp.radio_status.statistics.local_role, Some(LinkRole::Uplink));
        assert_eq!(ptp.radio_status.statistics.streams().count(), 4);
        assert_eq!(record.ethernet_status.len(), 2);
    }

    #[test]
    fn link_states() {
        assert_eq!(
            parse_link_state("SECTOR_DETECTION"),
            PtpLinkState::SectorDetection
        );
        assert_eq!(
            parse_link_state("ALIGNING"),
            PtpLinkState::Other("ALIGNING".to_string())
        );
    }
}

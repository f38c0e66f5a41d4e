use once_cell::sync::Lazy;
use regex::Regex;

use super::text::{
    block_text, capture, capture_measurement, capture_measurement_pair, capture_pair,
    capture_parse, capture_string, capture_string_pair, capture_switch, find_bounded_block,
    instances, parse_uptime, pattern,
};
use super::{
    collect_panics, ethernet_table, model, reboot_reason, require, role_case, serial_number,
    RoleAssembler, StepLog,
};
use crate::error::ExtractionError;
use crate::input::RawDump;
use crate::model::{
    BackhaulDetails, BackhaulLinkState, BackhaulRadioStatus, BackhaulSettings, DeviceRecord,
    Family, FamilyDetails, LinkRole, LinkStatistics, StreamMetrics, Unit,
};

/// Carrier slots reserved for every backhaul record; single-carrier units leave slot 1 empty.
pub const CARRIER_SLOTS: usize = 2;

static BANNER_XG_1000: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^InfiLINK XG 1000\b"));
static MODEL_XG_500: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)^IXG-500\b"));
static FIRMWARE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Firmware:\s*(?:XG\s+)?(v?\d+(?:\.\d+)+)"));
static UPTIME: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Uptime:\s*(\S.*?)\s*$"));
static DEVICE_TYPE: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Device type:\s*(\w+)"));

fn block(name: &str) -> (Regex, Regex) {
    let name = regex::escape(name);
    (
        pattern(&format!(r"(?i)^===\s+{name}\s+===\s*$")),
        pattern(&format!(r"(?i)^===\s+End of {name}\s+===\s*$")),
    )
}

static SETTINGS: Lazy<(Regex, Regex)> = Lazy::new(|| block("Radio settings"));
static STATUS: Lazy<(Regex, Regex)> = Lazy::new(|| block("Radio status"));
static ETHERNET: Lazy<(Regex, Regex)> = Lazy::new(|| block("Ethernet status"));

pub fn extract(dump: &RawDump) -> Result<DeviceRecord, ExtractionError> {
    let family = Family::BackhaulRadio;
    let serial_number = require(family, "serial_number", serial_number(&dump.text))?;
    let model = require(family, "model", model(&dump.text))?;
    let lines = dump.line_refs();
    let mut log = StepLog::default();

    let single_carrier = !BANNER_XG_1000.is_match(&dump.text) && MODEL_XG_500.is_match(&model);
    let subfamily = if single_carrier { "XG 500" } else { "XG 1000" };
    let carriers_in_use = if single_carrier { 1 } else { CARRIER_SLOTS };

    let firmware_version = log.field("firmware_version", capture_string(&FIRMWARE, &dump.text));
    let uptime = log.field(
        "uptime",
        capture(&UPTIME, &dump.text).and_then(parse_uptime),
    );
    let device_type = log.field("device_type", capture_string(&DEVICE_TYPE, &dump.text));

    let settings = section(&lines, &SETTINGS, "Radio settings", &mut log)
        .map(|block| settings(&block, device_type.clone()))
        .unwrap_or_else(|| BackhaulSettings {
            device_type: device_type.clone(),
            ..BackhaulSettings::default()
        });
    let radio_status = section(&lines, &STATUS, "Radio status", &mut log)
        .map(|block| radio_status(&block, device_type.as_deref(), carriers_in_use, &mut log))
        .unwrap_or_default();
    let ethernet_status = section(&lines, &ETHERNET, "Ethernet status", &mut log)
        .map(|block| ethernet_table(&block.lines().collect::<Vec<_>>()))
        .unwrap_or_default();

    Ok(DeviceRecord {
        family,
        subfamily: subfamily.to_string(),
        platform: Some(subfamily.replace(' ', "")),
        model: Some(model),
        serial_number,
        firmware_version,
        uptime,
        last_reboot_reason: reboot_reason(&dump.text),
        raw_text: dump.text.clone(),
        raw_lines: dump.lines.clone(),
        details: FamilyDetails::Backhaul(BackhaulDetails {
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

static TX_FREQUENCY: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Frequency TX:\s*(\d+(?:\.\d+)?)\s*MHz"));
static RX_FREQUENCY: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Frequency RX:\s*(\d+(?:\.\d+)?)\s*MHz"));
static BANDWIDTH: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Bandwidth:\s*(\d+(?:\.\d+)?)\s*MHz"));
static CARRIERS: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Carriers:\s*(\d+)"));
static TX_POWER: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Tx power:\s*(-?\d+(?:\.\d+)?)\s*dBm"));
static ATPC: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*ATPC:\s*(\w+)"));
static ADAPTIVE_MODULATION: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Adaptive modulation:\s*(\w+)"));
static MAX_MODULATION: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Max modulation:\s*(\S+)"));
static DISTANCE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Distance:\s*(\d+(?:\.\d+)?)\s*m\s*$"));

fn settings(block: &str, device_type: Option<String>) -> BackhaulSettings {
    BackhaulSettings {
        device_type,
        tx_frequency: capture_measurement(&TX_FREQUENCY, block, Unit::Mhz),
        rx_frequency: capture_measurement(&RX_FREQUENCY, block, Unit::Mhz),
        bandwidth: capture_measurement(&BANDWIDTH, block, Unit::Mhz),
        carriers: capture_parse(&CARRIERS, block),
        tx_power: capture_measurement(&TX_POWER, block, Unit::Dbm),
        atpc: capture_switch(&ATPC, block),
        adaptive_modulation: capture_switch(&ADAPTIVE_MODULATION, block),
        max_modulation: capture_string(&MAX_MODULATION, block),
        distance: capture_measurement(&DISTANCE, block, Unit::Meters),
    }
}

static LINK_STATE: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Link state:\s*(\S+)"));
static COLUMNS: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Columns:\s*(\w+)\s*\|"));
static CARRIER_MARKER: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)^\s*Carrier\s+(\d+)\s*$"));
static STREAM_LINE: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Stream\s+(\d+):\s*(.*)$"));
static RSSI: Lazy<Regex> = Lazy::new(|| pattern(r"\bRSSI\s+([^\s|;]+)\s*\|\s*([^\s|;]+)\s*dBm"));
static CINR: Lazy<Regex> = Lazy::new(|| pattern(r"\bCINR\s+([^\s|;]+)\s*\|\s*([^\s|;]+)\s*dB"));
static GAIN: Lazy<Regex> = Lazy::new(|| pattern(r"\bGain\s+([^\s|;]+)\s*\|\s*([^\s|;]+)"));
static CROSSTALK: Lazy<Regex> =
    Lazy::new(|| pattern(r"\bCrosstalk\s+([^\s|;]+)\s*\|\s*([^\s|;]+)\s*dB"));
static MODULATION: Lazy<Regex> =
    Lazy::new(|| pattern(r"\bModulation\s+([^\s|;]+)\s*\|\s*([^\s|;]+)"));

pub(crate) fn parse_link_state(value: &str) -> BackhaulLinkState {
    match value.trim().to_ascii_uppercase().as_str() {
        "UP" => BackhaulLinkState::Up,
        "DOWN" => BackhaulLinkState::Down,
        "ERROR" => BackhaulLinkState::Error,
        "STARTING" => BackhaulLinkState::Starting,
        "STOPPED" => BackhaulLinkState::Stopped,
        "PHY" => BackhaulLinkState::Phy,
        _ => BackhaulLinkState::Other(value.trim().to_string()),
    }
}

fn radio_status(
    block: &str,
    device_type: Option<&str>,
    carriers_in_use: usize,
    log: &mut StepLog,
) -> BackhaulRadioStatus {
    let link_state = log.field("link_state", capture(&LINK_STATE, block).map(parse_link_state));
    let first_column = capture(&COLUMNS, block);

    let Some(case) = role_case(device_type, first_column) else {
        log.note("radio statistics omitted: device type or column order is missing");
        return BackhaulRadioStatus {
            link_state,
            statistics: LinkStatistics::default(),
        };
    };

    let mut assembler = RoleAssembler::new(case, LinkRole::Master, LinkRole::Slave, CARRIER_SLOTS);
    let lines = block.lines().collect::<Vec<_>>();
    for carrier in instances(&lines, &CARRIER_MARKER) {
        let Some(index) = carrier.capture(1).and_then(|value| value.parse::<usize>().ok()) else {
            continue;
        };
        if index >= carriers_in_use.min(assembler.max_carriers()) {
            log.note(format!("ignored carrier {index}: unit has {carriers_in_use} carrier(s)"));
            continue;
        }
        for caps in STREAM_LINE.captures_iter(&carrier.body) {
            let stream = caps[1].parse::<usize>().unwrap_or(usize::MAX);
            let fields = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            if !assembler.insert(index, stream, stream_pair(fields)) {
                log.note(format!("ignored stream {} of carrier {index}", &caps[1]));
            }
        }
    }

    let local_role = assembler.local_role();
    BackhaulRadioStatus {
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
    let (cinr_first, cinr_second) = capture_measurement_pair(&CINR, fields, Unit::Db);
    let (gain_first, gain_second) = capture_pair::<f64>(&GAIN, fields);
    let (crosstalk_first, crosstalk_second) =
        capture_measurement_pair(&CROSSTALK, fields, Unit::Db);
    let (modulation_first, modulation_second) = capture_string_pair(&MODULATION, fields);
    (
        StreamMetrics {
            rssi: rssi_first,
            cinr: cinr_first,
            gain: gain_first,
            crosstalk: crosstalk_first,
            modulation: modulation_first,
            ..StreamMetrics::default()
        },
        StreamMetrics {
            rssi: rssi_second,
            cinr: cinr_second,
            gain: gain_second,
            crosstalk: crosstalk_second,
            modulation: modulation_second,
            ..StreamMetrics::default()
        },
    )
}

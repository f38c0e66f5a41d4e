pub mod backhaul;
pub mod mesh;
pub mod ptp;
pub mod text;

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::ExtractionError;
use crate::input::RawDump;
use crate::model::{
    CarrierStatus, DeviceRecord, Duplex, EthernetPort, Family, LinkRole, Measurement, RoleCase,
    StreamMetrics, Unit,
};
use text::{capture, pattern, EndpointType, Locality};

pub use text::{find_bounded_block, resolve_roles};

pub fn extract(family: Family, dump: &RawDump) -> Result<DeviceRecord, ExtractionError> {
    match family {
        Family::MeshRadio => mesh::extract(dump),
        Family::BackhaulRadio => backhaul::extract(dump),
        Family::PtpRadio => ptp::extract(dump),
    }
}

/// Collects notes about sections and instances that could not be recovered.
#[derive(Debug, Default)]
pub(crate) struct StepLog {
    notes: Vec<String>,
}

impl StepLog {
    pub fn section<T>(&mut self, name: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            debug!("section `{name}` not found");
            self.notes.push(format!("section `{name}` not found"));
        }
        value
    }

    pub fn field<T>(&mut self, name: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            debug!("field `{name}` not found");
            self.notes.push(format!("field `{name}` not found"));
        }
        value
    }

    pub fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        debug!("{note}");
        self.notes.push(note);
    }

    pub fn into_notes(self) -> Vec<String> {
        self.notes
    }
}

pub(crate) fn require<T>(
    family: Family,
    field: &'static str,
    value: Option<T>,
) -> Result<T, ExtractionError> {
    value.ok_or(ExtractionError::MissingIdentity { family, field })
}

static SERIAL_NUMBER: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Serial number:\s*(\d+)\s*$"));
static MODEL: Lazy<Regex> = Lazy::new(|| pattern(r"(?mi)^\s*Model:\s*(\S.*?)\s*$"));
static REBOOT_REASON: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?mi)^\s*Last reboot reason:\s*(\S.*?)\s*$"));

pub(crate) fn serial_number(text: &str) -> Option<String> {
    capture(&SERIAL_NUMBER, text).map(str::to_string)
}

pub(crate) fn model(text: &str) -> Option<String> {
    capture(&MODEL, text).map(str::to_string)
}

pub(crate) fn reboot_reason(text: &str) -> Option<String> {
    capture(&REBOOT_REASON, text).map(str::to_string)
}

static FAULT_LINE: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)\b((?:PANIC|WATCHDOG):.*?)\s*$"));

/// Fault messages from the marker onward, de-duplicated by exact text in first-seen order.
pub(crate) fn collect_panics(text: &str) -> IndexSet<String> {
    FAULT_LINE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

static ETHERNET_ROW: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"(?i)^\s*((?:eth|ge|sfp|xe)\d+)\s+(up|down)\s+(\d+|-)\s+(full|half|-)\s+(on|off|-)\s+(\d+|-)\s*$",
    )
});

/// Columnar port table used by the point-to-point families: port, link, speed, duplex,
/// autoneg, CRC errors.
pub(crate) fn ethernet_table(lines: &[&str]) -> IndexMap<String, EthernetPort> {
    let mut ports = IndexMap::new();
    for line in lines {
        let Some(caps) = ETHERNET_ROW.captures(line) else {
            continue;
        };
        let name = caps[1].to_string();
        let port = EthernetPort {
            link_up: text::parse_switch(&caps[2]),
            speed: caps[3]
                .parse::<f64>()
                .ok()
                .map(|value| Measurement::new(value, Unit::Mbps)),
            duplex: parse_duplex(&caps[4]),
            autoneg: text::parse_switch(&caps[5]),
            crc_errors: caps[6].parse().ok(),
            rx_packets: None,
            tx_packets: None,
        };
        ports.entry(name).or_insert(port);
    }
    ports
}

pub(crate) fn parse_duplex(value: &str) -> Option<Duplex> {
    match value.trim().to_ascii_lowercase().as_str() {
        "full" => Some(Duplex::Full),
        "half" => Some(Duplex::Half),
        _ => None,
    }
}

/// Role cues shared by the point-to-point families.
pub(crate) fn role_case(device_type: Option<&str>, first_column: Option<&str>) -> Option<RoleCase> {
    let device = EndpointType::parse(device_type?)?;
    let first_column = Locality::parse(first_column?)?;
    Some(resolve_roles(device, first_column))
}

/// Places column-ordered stream metrics into schema roles.
pub(crate) struct RoleAssembler {
    case: RoleCase,
    primary: LinkRole,
    secondary: LinkRole,
    max_carriers: usize,
    first: Vec<Option<CarrierStatus>>,
    second: Vec<Option<CarrierStatus>>,
}

impl RoleAssembler {
    pub fn new(case: RoleCase, primary: LinkRole, secondary: LinkRole, max_carriers: usize) -> Self {
        Self {
            case,
            primary,
            secondary,
            max_carriers,
            first: vec![None; max_carriers],
            second: vec![None; max_carriers],
        }
    }

    pub fn max_carriers(&self) -> usize {
        self.max_carriers
    }

    pub fn insert(
        &mut self,
        carrier: usize,
        stream: usize,
        metrics: (StreamMetrics, StreamMetrics),
    ) -> bool {
        if carrier >= self.max_carriers || stream >= 2 {
            return false;
        }
        let (first, second) = metrics;
        self.first[carrier].get_or_insert_with(CarrierStatus::default).streams[stream] =
            Some(first);
        self.second[carrier].get_or_insert_with(CarrierStatus::default).streams[stream] =
            Some(second);
        true
    }

    pub fn local_role(&self) -> LinkRole {
        if self.case.primary_is_local() {
            self.primary
        } else {
            self.secondary
        }
    }

    /// Roles in schema order: primary first.
    pub fn finish(self) -> IndexMap<LinkRole, Vec<Option<CarrierStatus>>> {
        let (primary, secondary) = if self.case.first_column_is_primary() {
            (self.first, self.second)
        } else {
            (self.second, self.first)
        };
        let mut roles = IndexMap::new();
        roles.insert(self.primary, primary);
        roles.insert(self.secondary, secondary);
        roles
    }
}

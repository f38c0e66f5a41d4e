use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::error::RuleError;

pub const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    MeshRadio,
    BackhaulRadio,
    PtpRadio,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::MeshRadio, Family::BackhaulRadio, Family::PtpRadio];

    /// Product line key used by the firmware catalog.
    pub fn product_line(self) -> &'static str {
        match self {
            Family::MeshRadio => "r5000",
            Family::BackhaulRadio => "xg",
            Family::PtpRadio => "quanta",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Family::MeshRadio => "R5000 mesh radio",
            Family::BackhaulRadio => "InfiLINK XG backhaul",
            Family::PtpRadio => "Quanta/Vector 70 PTP",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Dbm,
    Db,
    Mhz,
    Kbps,
    Mbps,
    Percent,
    Meters,
    Kilometers,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Dbm => "dBm",
            Unit::Db => "dB",
            Unit::Mhz => "MHz",
            Unit::Kbps => "kbps",
            Unit::Mbps => "Mbps",
            Unit::Percent => "%",
            Unit::Meters => "m",
            Unit::Kilometers => "km",
        }
    }
}

/// A number exactly as printed by the dump, tagged with the unit printed next to it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    pub value: f64,
    pub unit: Unit,
}

impl Measurement {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn expect(&self, unit: Unit, metric: &str) -> Result<f64, RuleError> {
        if self.unit == unit {
            Ok(self.value)
        } else {
            Err(RuleError::UnitMismatch {
                metric: metric.to_string(),
                expected: unit.symbol(),
                found: self.unit.symbol(),
            })
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Unit::Percent => write!(f, "{}%", trim_number(self.value)),
            unit => write!(f, "{} {}", trim_number(self.value), unit.symbol()),
        }
    }
}

pub(crate) fn trim_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Uptime {
    pub text: String,
    pub seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRecord {
    pub family: Family,
    pub subfamily: String,
    pub model: Option<String>,
    pub serial_number: String,
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    pub uptime: Option<Uptime>,
    pub last_reboot_reason: Option<String>,
    #[serde(skip)]
    pub raw_text: String,
    #[serde(skip)]
    pub raw_lines: Vec<String>,
    pub details: FamilyDetails,
    #[serde(default)]
    pub ethernet_status: IndexMap<String, EthernetPort>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl DeviceRecord {
    pub fn mesh(&self) -> Option<&MeshDetails> {
        match &self.details {
            FamilyDetails::Mesh(details) => Some(details),
            _ => None,
        }
    }

    pub fn backhaul(&self) -> Option<&BackhaulDetails> {
        match &self.details {
            FamilyDetails::Backhaul(details) => Some(details),
            _ => None,
        }
    }

    pub fn ptp(&self) -> Option<&PtpDetails> {
        match &self.details {
            FamilyDetails::Ptp(details) => Some(details),
            _ => None,
        }
    }

    /// Whether the radio link is in its nominal state; gated rules only run when it is.
    pub fn link_is_nominal(&self) -> bool {
        match &self.details {
            FamilyDetails::Mesh(details) => {
                details.radio_status.interface_up == Some(true)
                    && !details.radio_status.peers.is_empty()
            }
            FamilyDetails::Backhaul(details) => {
                details.radio_status.link_state == Some(BackhaulLinkState::Up)
            }
            FamilyDetails::Ptp(details) => {
                details.radio_status.link_state == Some(PtpLinkState::Connected)
            }
        }
    }

    pub fn panic_messages(&self) -> Option<&IndexSet<String>> {
        match &self.details {
            FamilyDetails::Mesh(_) => None,
            FamilyDetails::Backhaul(details) => Some(&details.panic),
            FamilyDetails::Ptp(details) => Some(&details.panic),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FamilyDetails {
    Mesh(MeshDetails),
    Backhaul(BackhaulDetails),
    Ptp(PtpDetails),
}

// ── Mesh family ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MeshDetails {
    pub settings: MeshSettings,
    pub radio_status: MeshRadioStatus,
    #[serde(default)]
    pub switch_status: IndexMap<String, SwitchGroupStatus>,
    #[serde(default)]
    pub qos_status: IndexMap<String, QueueStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MeshSettings {
    pub interface: Option<String>,
    pub node_name: Option<String>,
    pub node_type: Option<String>,
    pub mode: Option<String>,
    pub frequency: Option<Measurement>,
    pub bandwidth: Option<Measurement>,
    pub fixed_bitrate: Option<Measurement>,
    pub tx_power: Option<Measurement>,
    pub distance: Option<DistanceSetting>,
    pub autobitrate: Option<bool>,
    pub atpc: Option<bool>,
    pub scrambling: Option<bool>,
    #[serde(default)]
    pub profiles: IndexMap<String, MintProfile>,
    #[serde(default)]
    pub switch_groups: IndexMap<String, SwitchGroupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceSetting {
    Auto,
    Fixed(Measurement),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MintProfile {
    pub frequency: Option<Measurement>,
    pub bandwidth: Option<Measurement>,
    pub bitrate: Option<Measurement>,
    pub sid: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SwitchGroupConfig {
    #[serde(default)]
    pub vlans: Vec<u32>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    pub stp: Option<bool>,
    pub started: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MeshRadioStatus {
    pub interface: Option<String>,
    pub interface_up: Option<bool>,
    pub frequency: Option<Measurement>,
    pub bandwidth: Option<Measurement>,
    pub noise_floor: Option<Measurement>,
    pub declared_links: Option<u32>,
    #[serde(default)]
    pub peers: IndexMap<String, MeshPeer>,
}

/// Per-neighbor metrics; every `(rx, tx)` pair is (measured locally, measured by the peer).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MeshPeer {
    pub name: Option<String>,
    pub level: Pair<u32>,
    pub snr: Pair<Measurement>,
    pub power: Pair<Measurement>,
    pub bitrate: Pair<Measurement>,
    pub retry: Pair<Measurement>,
    pub errors: Pair<Measurement>,
    pub distance: Option<Measurement>,
    pub uptime: Option<String>,
    pub firmware: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pair<T> {
    pub rx: Option<T>,
    pub tx: Option<T>,
}

impl<T> Default for Pair<T> {
    fn default() -> Self {
        Self { rx: None, tx: None }
    }
}

impl<T> Pair<T> {
    pub fn sides(&self) -> [(Direction, Option<&T>); 2] {
        [(Direction::Rx, self.rx.as_ref()), (Direction::Tx, self.tx.as_ref())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Rx => "Rx",
            Direction::Tx => "Tx",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SwitchGroupStatus {
    pub packets: u64,
    pub flood: u64,
    pub broadcast: u64,
    pub loops: u64,
    pub overflow: u64,
    pub mac_entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStatus {
    pub name: String,
    pub packets: u64,
    pub dropped: u64,
}

// ── Point-to-point families ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LinkRole {
    Master,
    Slave,
    Downlink,
    Uplink,
}

impl LinkRole {
    pub fn label(self) -> &'static str {
        match self {
            LinkRole::Master => "master",
            LinkRole::Slave => "slave",
            LinkRole::Downlink => "downlink",
            LinkRole::Uplink => "uplink",
        }
    }
}

/// Which endpoint the first statistics column belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoleCase {
    PrimaryIsLocal,
    PrimaryIsRemote,
    SecondaryIsLocal,
    SecondaryIsRemote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LinkStatistics {
    pub role_case: Option<RoleCase>,
    pub local_role: Option<LinkRole>,
    /// Role -> carrier slots; slot count is the family maximum, unused slots stay `None`.
    #[serde(default)]
    pub roles: IndexMap<LinkRole, Vec<Option<CarrierStatus>>>,
}

impl LinkStatistics {
    pub fn streams(&self) -> impl Iterator<Item = StreamRef<'_>> {
        self.roles.iter().flat_map(|(role, carriers)| {
            carriers
                .iter()
                .enumerate()
                .filter_map(|(carrier, slot)| slot.as_ref().map(|status| (carrier, status)))
                .flat_map(move |(carrier, status)| {
                    status
                        .streams
                        .iter()
                        .enumerate()
                        .filter_map(move |(stream, metrics)| {
                            metrics.as_ref().map(|metrics| StreamRef {
                                role: *role,
                                carrier,
                                stream,
                                metrics,
                            })
                        })
                })
        })
    }

    pub fn carriers(&self) -> impl Iterator<Item = (LinkRole, usize, &CarrierStatus)> {
        self.roles.iter().flat_map(|(role, carriers)| {
            carriers
                .iter()
                .enumerate()
                .filter_map(move |(index, slot)| slot.as_ref().map(|status| (*role, index, status)))
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamRef<'a> {
    pub role: LinkRole,
    pub carrier: usize,
    pub stream: usize,
    pub metrics: &'a StreamMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CarrierStatus {
    pub streams: [Option<StreamMetrics>; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StreamMetrics {
    pub rssi: Option<Measurement>,
    pub cinr: Option<Measurement>,
    pub snr: Option<Measurement>,
    pub evm: Option<Measurement>,
    pub gain: Option<f64>,
    pub crosstalk: Option<Measurement>,
    pub modulation: Option<String>,
    pub mcs: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackhaulLinkState {
    Up,
    Down,
    Error,
    Starting,
    Stopped,
    Phy,
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PtpLinkState {
    Connected,
    Started,
    Init,
    Connecting,
    Standby,
    SectorDetection,
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BackhaulDetails {
    pub settings: BackhaulSettings,
    pub radio_status: BackhaulRadioStatus,
    #[serde(default)]
    pub panic: IndexSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BackhaulSettings {
    pub device_type: Option<String>,
    pub tx_frequency: Option<Measurement>,
    pub rx_frequency: Option<Measurement>,
    pub bandwidth: Option<Measurement>,
    pub carriers: Option<u32>,
    pub tx_power: Option<Measurement>,
    pub atpc: Option<bool>,
    pub adaptive_modulation: Option<bool>,
    pub max_modulation: Option<String>,
    pub distance: Option<Measurement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BackhaulRadioStatus {
    pub link_state: Option<BackhaulLinkState>,
    pub statistics: LinkStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PtpDetails {
    pub settings: PtpSettings,
    pub radio_status: PtpRadioStatus,
    #[serde(default)]
    pub panic: IndexSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PtpSettings {
    pub device_role: Option<String>,
    pub frequency: Option<Measurement>,
    pub channel_width: Option<Measurement>,
    pub tx_power: Option<Measurement>,
    pub atpc: Option<bool>,
    pub max_mcs: Option<u32>,
    pub distance: Option<Measurement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PtpRadioStatus {
    pub link_state: Option<PtpLinkState>,
    pub statistics: LinkStatistics,
}

// ── Ethernet ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Duplex {
    Full,
    Half,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EthernetPort {
    pub link_up: Option<bool>,
    pub speed: Option<Measurement>,
    pub duplex: Option<Duplex>,
    pub autoneg: Option<bool>,
    pub crc_errors: Option<u64>,
    pub rx_packets: Option<u64>,
    pub tx_packets: Option<u64>,
}

// ── Findings ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Radio,
    Ethernet,
    Switch,
    Qos,
    Faults,
    Recommendations,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::Radio => "Radio issues",
            Category::Ethernet => "Ethernet issues",
            Category::Switch => "Switch issues",
            Category::Qos => "QoS issues",
            Category::Faults => "Device faults",
            Category::Recommendations => "Recommendations",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Category::Recommendations => Severity::Advisory,
            _ => Severity::Issue,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Issue,
    Advisory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    pub code: String,
    pub category: Category,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn new(category: Category, code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            category,
            severity: category.severity(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleTrace {
    pub rule_id: String,
    pub status: RuleTraceStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleTraceStatus {
    Emitted,
    #[default]
    Skipped,
    Failed,
}

// ── Analysis document ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Diagnosed,
    Unrecognized,
    Unparseable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisReport {
    pub report_version: String,
    pub generated_at: String,
    pub analysis_id: String,
    pub label: String,
    pub input_digest: String,
    pub status: AnalysisStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub record: Option<DeviceRecord>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub rule_traces: Vec<RuleTrace>,
    #[serde(default)]
    pub rendered: Vec<String>,
}

impl AnalysisReport {
    pub fn finding_codes(&self) -> Vec<String> {
        self.findings.iter().map(|finding| finding.code.clone()).collect()
    }

    pub fn rendered_text(&self) -> String {
        let mut text = self.rendered.join("\n");
        text.push('\n');
        text
    }
}

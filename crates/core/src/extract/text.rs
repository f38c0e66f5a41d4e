use std::ops::Range;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Measurement, RoleCase, Unit, Uptime};

pub(crate) fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("extraction pattern compiles")
}

/// Lines strictly between the first `start` match and the first `end` match after it.
pub fn find_bounded_block(lines: &[&str], start: &Regex, end: &Regex) -> Option<Range<usize>> {
    let start_index = lines.iter().position(|line| start.is_match(line))?;
    let end_index = lines
        .iter()
        .enumerate()
        .skip(start_index + 1)
        .find(|(_, line)| end.is_match(line))
        .map(|(index, _)| index)?;
    Some(start_index + 1..end_index)
}

pub(crate) fn block_text(lines: &[&str], range: Range<usize>) -> String {
    lines[range].join("\n")
}

/// One occurrence of a multi-instance marker: the marker captures and the lines it owns.
#[derive(Debug, Clone)]
pub(crate) struct Instance<'t> {
    pub captures: Vec<Option<&'t str>>,
    pub body: String,
}

impl<'t> Instance<'t> {
    pub fn capture(&self, index: usize) -> Option<&'t str> {
        self.captures.get(index).copied().flatten()
    }
}

/// Every marker occurrence in physical order; each owns the lines up to the next marker.
pub(crate) fn instances<'t>(lines: &[&'t str], marker: &Regex) -> Vec<Instance<'t>> {
    let positions = lines
        .iter()
        .copied()
        .enumerate()
        .filter_map(|(index, line)| marker.captures(line).map(|caps| (index, caps)))
        .collect::<Vec<_>>();

    let mut output = Vec::with_capacity(positions.len());
    for (slot, (index, caps)) in positions.iter().enumerate() {
        let next = positions
            .get(slot + 1)
            .map(|(next_index, _)| *next_index)
            .unwrap_or(lines.len());
        let captures = (0..caps.len())
            .map(|group| caps.get(group).map(|m| m.as_str()))
            .collect();
        output.push(Instance {
            captures,
            body: lines[*index..next].join("\n"),
        });
    }
    output
}

pub(crate) fn capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|value| !value.is_empty())
}

pub(crate) fn capture_string(re: &Regex, text: &str) -> Option<String> {
    capture(re, text).map(str::to_string)
}

pub(crate) fn capture_parse<T: FromStr>(re: &Regex, text: &str) -> Option<T> {
    capture(re, text).and_then(|value| value.parse().ok())
}

pub(crate) fn capture_measurement(re: &Regex, text: &str, unit: Unit) -> Option<Measurement> {
    capture_parse::<f64>(re, text).map(|value| Measurement::new(value, unit))
}

pub(crate) fn capture_switch(re: &Regex, text: &str) -> Option<bool> {
    capture(re, text).and_then(parse_switch)
}

/// Both sides of a two-column value; a side written as `-` is absent on that side only.
pub(crate) fn capture_pair<T: FromStr>(re: &Regex, text: &str) -> (Option<T>, Option<T>) {
    let Some(caps) = re.captures(text) else {
        return (None, None);
    };
    let side = |group: usize| {
        caps.get(group)
            .map(|m| m.as_str().trim())
            .and_then(|value| value.parse::<T>().ok())
    };
    (side(1), side(2))
}

pub(crate) fn capture_measurement_pair(
    re: &Regex,
    text: &str,
    unit: Unit,
) -> (Option<Measurement>, Option<Measurement>) {
    let (first, second) = capture_pair::<f64>(re, text);
    (
        first.map(|value| Measurement::new(value, unit)),
        second.map(|value| Measurement::new(value, unit)),
    )
}

pub(crate) fn capture_string_pair(re: &Regex, text: &str) -> (Option<String>, Option<String>) {
    let Some(caps) = re.captures(text) else {
        return (None, None);
    };
    let side = |group: usize| {
        caps.get(group)
            .map(|m| m.as_str().trim())
            .filter(|value| !value.is_empty() && *value != "-")
            .map(str::to_string)
    };
    (side(1), side(2))
}

pub(crate) fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "enabled" | "enable" | "yes" | "up" => Some(true),
        "off" | "disabled" | "disable" | "no" | "down" => Some(false),
        _ => None,
    }
}

static UPTIME_DAYS: Lazy<Regex> =
    Lazy::new(|| pattern(r"^(\d+)\s*(?:days?|d)\s+(\d{1,2}):(\d{2}):(\d{2})$"));
static UPTIME_CLOCK: Lazy<Regex> = Lazy::new(|| pattern(r"^(\d{1,2}):(\d{2}):(\d{2})$"));

pub(crate) fn parse_uptime(text: &str) -> Option<Uptime> {
    let text = text.trim();
    let (days, clock) = if let Some(caps) = UPTIME_DAYS.captures(text) {
        (caps[1].parse::<u64>().ok()?, [&caps[2], &caps[3], &caps[4]].map(str::to_string))
    } else if let Some(caps) = UPTIME_CLOCK.captures(text) {
        (0, [&caps[1], &caps[2], &caps[3]].map(str::to_string))
    } else {
        return None;
    };
    let [hours, minutes, seconds] = clock.map(|part| part.parse::<u64>().ok());
    let seconds = days
        .checked_mul(86_400)?
        .checked_add(hours? * 3_600 + minutes? * 60 + seconds?)?;
    Some(Uptime {
        text: text.to_string(),
        seconds,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointType {
    Master,
    Slave,
}

impl EndpointType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "master" => Some(Self::Master),
            "slave" => Some(Self::Slave),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    Local,
    Remote,
}

impl Locality {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }
}

/// Which endpoint the first statistics column belongs to, from the device type line
/// and the locality of the first column.
pub fn resolve_roles(device: EndpointType, first_column: Locality) -> RoleCase {
    match (device, first_column) {
        (EndpointType::Master, Locality::Local) => RoleCase::PrimaryIsLocal,
        (EndpointType::Master, Locality::Remote) => RoleCase::SecondaryIsRemote,
        (EndpointType::Slave, Locality::Local) => RoleCase::SecondaryIsLocal,
        (EndpointType::Slave, Locality::Remote) => RoleCase::PrimaryIsRemote,
    }
}

impl RoleCase {
    pub fn first_column_is_primary(self) -> bool {
        matches!(self, RoleCase::PrimaryIsLocal | RoleCase::PrimaryIsRemote)
    }

    pub fn primary_is_local(self) -> bool {
        matches!(self, RoleCase::PrimaryIsLocal | RoleCase::SecondaryIsRemote)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        capture_pair, find_bounded_block, instances, parse_uptime, pattern, resolve_roles,
        EndpointType, Locality,
    };
    use crate::model::RoleCase;

    #[test]
    fn bounded_block_excludes_markers() {
        let lines = ["head", "=== A ===", "one", "two", "=== End of a ===", "tail"];
        let range = find_bounded_block(&lines, &pattern("^=== A ===$"), &pattern("^=== End"));
        assert_eq!(range, Some(2..4));
    }

    #[test]
    fn bounded_block_is_absent_when_a_marker_is_missing() {
        let lines = ["=== A ===", "one"];
        assert_eq!(
            find_bounded_block(&lines, &pattern("^=== A"), &pattern("^=== End")),
            None
        );
        let lines = ["one", "=== End of a ==="];
        assert_eq!(
            find_bounded_block(&lines, &pattern("^=== A"), &pattern("^=== End")),
            None
        );
    }

    #[test]
    fn bounded_block_ignores_end_marker_before_start() {
        let lines = ["=== End ===", "=== A ===", "x", "=== End ==="];
        let range = find_bounded_block(&lines, &pattern("^=== A"), &pattern("^=== End"));
        assert_eq!(range, Some(2..3));
    }

    #[test]
    fn empty_block_is_an_empty_range() {
        let lines = ["[Fault log]", "[/Fault log]"];
        let range = find_bounded_block(&lines, &pattern(r"^\[Fault log\]"), &pattern(r"^\[/Fault"));
        assert_eq!(range, Some(1..1));
    }

    #[test]
    fn instances_own_lines_until_next_marker() {
        let lines = ["Carrier 0", "a", "b", "Carrier 1", "c"];
        let found = instances(&lines, &pattern(r"^Carrier (\d+)$"));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].capture(1), Some("0"));
        assert_eq!(found[0].body, "Carrier 0\na\nb");
        assert_eq!(found[1].body, "Carrier 1\nc");
    }

    #[test]
    fn pair_side_marked_with_dash_is_absent() {
        let re = pattern(r"RSSI\s+([^\s|]+)\s*\|\s*([^\s|]+)\s*dBm");
        assert_eq!(capture_pair::<f64>(&re, "RSSI -52.5 | - dBm"), (Some(-52.5), None));
        assert_eq!(capture_pair::<f64>(&re, "nothing"), (None, None));
    }

    #[test]
    fn uptime_formats() {
        assert_eq!(parse_uptime("12 days 04:22:10").map(|u| u.seconds), Some(1_052_530));
        assert_eq!(parse_uptime("0 days 03:10:00").map(|u| u.seconds), Some(11_400));
        assert_eq!(parse_uptime("5d 02:11:04").map(|u| u.seconds), Some(439_864));
        assert_eq!(parse_uptime("06:00:00").map(|u| u.seconds), Some(21_600));
        assert_eq!(parse_uptime("a while"), None);
    }

    #[test]
    fn oversized_day_count_is_absent() {
        assert_eq!(parse_uptime("999999999999999999 days 00:00:00"), None);
        assert_eq!(parse_uptime("213503982334601 days 07:00:16"), None);
    }

    #[test]
    fn role_decision_table_covers_all_four_cases() {
        assert_eq!(
            resolve_roles(EndpointType::Master, Locality::Local),
            RoleCase::PrimaryIsLocal
        );
        assert_eq!(
            resolve_roles(EndpointType::Master, Locality::Remote),
            RoleCase::SecondaryIsRemote
        );
        assert_eq!(
            resolve_roles(EndpointType::Slave, Locality::Local),
            RoleCase::SecondaryIsLocal
        );
        assert_eq!(
            resolve_roles(EndpointType::Slave, Locality::Remote),
            RoleCase::PrimaryIsRemote
        );
    }

    #[test]
    fn role_case_helpers() {
        assert!(RoleCase::PrimaryIsRemote.first_column_is_primary());
        assert!(!RoleCase::PrimaryIsRemote.primary_is_local());
        assert!(!RoleCase::SecondaryIsRemote.first_column_is_primary());
        assert!(RoleCase::SecondaryIsRemote.primary_is_local());
    }
}

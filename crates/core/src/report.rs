use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::{Category, DeviceRecord, Finding};

pub const NO_ISSUES_MESSAGE: &str =
    "The device is fine: no issues were found in the diagnostic card.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Text,
    Jira,
    Markdown,
}

/// Findings grouped by category, categories in order of first appearance.
pub fn group_findings(findings: &[Finding]) -> IndexMap<Category, Vec<&Finding>> {
    let mut groups: IndexMap<Category, Vec<&Finding>> = IndexMap::new();
    for finding in findings {
        groups.entry(finding.category).or_default().push(finding);
    }
    groups
}

pub fn render(record: &DeviceRecord, findings: &[Finding], mode: OutputMode) -> Vec<String> {
    let mut out = Vec::new();
    let title = format!("{} diagnostic ({})", record.family, record.subfamily);
    let fields = identity_fields(record);

    match mode {
        OutputMode::Text => {
            out.push(title);
            for (name, value) in fields {
                out.push(format!("{name}: {value}"));
            }
        }
        OutputMode::Jira => {
            out.push(format!("h3. {title}"));
            out.push("||Field||Value||".to_string());
            for (name, value) in fields {
                out.push(format!("|{name}|{}|", jira_escape(&value)));
            }
        }
        OutputMode::Markdown => {
            out.push(format!("## {title}"));
            out.push(String::new());
            for (name, value) in fields {
                out.push(format!("- **{name}:** {value}"));
            }
        }
    }
    out.push(String::new());

    if findings.is_empty() {
        out.push(NO_ISSUES_MESSAGE.to_string());
        return out;
    }

    for (category, group) in group_findings(findings) {
        match mode {
            OutputMode::Text => out.push(format!("{}:", category.label())),
            OutputMode::Jira => out.push(format!("h4. {}", category.label())),
            OutputMode::Markdown => {
                out.push(format!("### {}", category.label()));
                out.push(String::new());
            }
        }
        for finding in group {
            match mode {
                OutputMode::Text => out.push(format!("  - {}", finding.message)),
                OutputMode::Jira => out.push(format!("* {}", jira_escape(&finding.message))),
                OutputMode::Markdown => out.push(format!("- {}", finding.message)),
            }
        }
        out.push(String::new());
    }

    while out.last().is_some_and(|line| line.is_empty()) {
        out.pop();
    }
    out
}

pub fn render_unparseable(label: &str, reason: Option<&str>) -> Vec<String> {
    let mut out = vec![format!(
        "{label} is not a valid diagnostic card or could not be parsed."
    )];
    if let Some(reason) = reason {
        out.push(format!("Reason: {reason}"));
    }
    out
}

fn identity_fields(record: &DeviceRecord) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();
    if let Some(model) = &record.model {
        fields.push(("Model", model.clone()));
    }
    fields.push(("Serial number", record.serial_number.clone()));
    if let Some(firmware) = &record.firmware_version {
        fields.push(("Firmware", firmware.clone()));
    }
    if let Some(uptime) = &record.uptime {
        fields.push(("Uptime", uptime.text.clone()));
    }
    if let Some(reason) = &record.last_reboot_reason {
        fields.push(("Last reboot reason", reason.clone()));
    }
    fields
}

// Jira wiki markup treats these as table and formatting delimiters.
fn jira_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '|' | '{' | '}' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{group_findings, render, render_unparseable, OutputMode, NO_ISSUES_MESSAGE};
    use crate::extract;
    use crate::input::RawDump;
    use crate::model::{Category, DeviceRecord, Family, Finding};

    fn record() -> DeviceRecord {
        let dump = RawDump::from_text(
            "card.txt",
            include_str!("../../../fixtures/backhaul-nominal.txt"),
        )
        .expect("dump");
        extract::extract(Family::BackhaulRadio, &dump).expect("record")
    }

    fn findings() -> Vec<Finding> {
        vec![
            Finding::new(Category::Ethernet, "ethernet-crc", "Port ge0: 3 CRC errors."),
            Finding::new(Category::Radio, "rssi-weak", "Master carrier 0 stream 0: weak."),
            Finding::new(Category::Ethernet, "ethernet-half-duplex", "Port ge1 half duplex."),
        ]
    }

    #[test]
    fn empty_findings_render_the_fine_message() {
        let lines = render(&record(), &[], OutputMode::Text);
        assert_eq!(lines.first().map(String::as_str), Some("InfiLINK XG backhaul diagnostic (XG 1000)"));
        assert_eq!(lines.last().map(String::as_str), Some(NO_ISSUES_MESSAGE));
    }

    #[test]
    fn groups_keep_first_appearance_order() {
        let findings = findings();
        let groups = group_findings(&findings);
        let order = groups.keys().copied().collect::<Vec<_>>();
        assert_eq!(order, vec![Category::Ethernet, Category::Radio]);
        assert_eq!(groups[&Category::Ethernet].len(), 2);
    }

    #[test]
    fn text_mode_lists_findings_under_category_labels() {
        let lines = render(&record(), &findings(), OutputMode::Text);
        let ethernet = lines
            .iter()
            .position(|line| line == "Ethernet issues:")
            .expect("ethernet header");
        assert_eq!(lines[ethernet + 1], "  - Port ge0: 3 CRC errors.");
        assert_eq!(lines[ethernet + 2], "  - Port ge1 half duplex.");
        assert!(lines.contains(&"Radio issues:".to_string()));
        assert_ne!(lines.last().map(String::as_str), Some(""));
    }

    #[test]
    fn jira_and_markdown_markup() {
        let jira = render(&record(), &findings(), OutputMode::Jira);
        assert_eq!(jira[0], "h3. InfiLINK XG backhaul diagnostic (XG 1000)");
        assert!(jira.contains(&"|Serial number|283711|".to_string()));
        assert!(jira.contains(&"h4. Ethernet issues".to_string()));
        assert!(jira.contains(&"* Port ge0: 3 CRC errors.".to_string()));

        let markdown = render(&record(), &findings(), OutputMode::Markdown);
        assert_eq!(markdown[0], "## InfiLINK XG backhaul diagnostic (XG 1000)");
        assert!(markdown.contains(&"- **Serial number:** 283711".to_string()));
        assert!(markdown.contains(&"### Radio issues".to_string()));
    }

    #[test]
    fn unparseable_message() {
        assert_eq!(
            render_unparseable("upload-17.txt", None),
            vec!["upload-17.txt is not a valid diagnostic card or could not be parsed."]
        );
        assert_eq!(render_unparseable("a.txt", Some("no serial")).len(), 2);
    }
}

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::Family;

struct Signature {
    family: Family,
    name: &'static str,
    pattern: Regex,
}

// More specific banners first: "InfiLINK XG 1000" shares its prefix with "InfiLINK XG".
static SIGNATURES: Lazy<Vec<Signature>> = Lazy::new(|| {
    [
        (Family::BackhaulRadio, "xg-1000", r"(?m)^InfiLINK XG 1000\b"),
        (Family::BackhaulRadio, "xg", r"(?m)^InfiLINK XG\b"),
        (Family::PtpRadio, "quanta-70", r"(?m)^(?:Quanta|Vector) 70\b"),
        (
            Family::MeshRadio,
            "wanflex",
            r"(?m)^WANFleX H\d{2}S\d{2}-(?:MINT|TDMA)\b",
        ),
        (Family::MeshRadio, "r5000-2x2", r"(?m)^(?:InfiLINK|InfiMAN) 2x2\b"),
    ]
    .into_iter()
    .map(|(family, name, pattern)| Signature {
        family,
        name,
        pattern: Regex::new(pattern).expect("signature pattern compiles"),
    })
    .collect()
});

/// Returns the family of the first matching banner signature, or `None` for foreign input.
pub fn classify(text: &str) -> Option<Family> {
    matching_signature(text).map(|(family, _)| family)
}

pub fn matching_signature(text: &str) -> Option<(Family, &'static str)> {
    SIGNATURES
        .iter()
        .find(|signature| signature.pattern.is_match(text))
        .map(|signature| (signature.family, signature.name))
}

#[cfg(test)]
mod tests {
    use super::{classify, matching_signature};
    use crate::model::Family;

    #[test]
    fn classifies_every_fixture_family() {
        let cases = [
            (include_str!("../../../fixtures/mesh-nominal.txt"), Family::MeshRadio),
            (include_str!("../../../fixtures/mesh-issues.txt"), Family::MeshRadio),
            (
                include_str!("../../../fixtures/backhaul-nominal.txt"),
                Family::BackhaulRadio,
            ),
            (
                include_str!("../../../fixtures/backhaul-down.txt"),
                Family::BackhaulRadio,
            ),
            (
                include_str!("../../../fixtures/backhaul-issues.txt"),
                Family::BackhaulRadio,
            ),
            (
                include_str!("../../../fixtures/ptp-polarization.txt"),
                Family::PtpRadio,
            ),
            (include_str!("../../../fixtures/ptp-issues.txt"), Family::PtpRadio),
        ];
        for (text, expected) in cases {
            assert_eq!(classify(text), Some(expected));
        }
    }

    #[test]
    fn foreign_text_is_not_classified() {
        assert_eq!(classify(include_str!("../../../fixtures/unknown.txt")), None);
        assert_eq!(classify("InfiLINK XGX bogus banner"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn specific_backhaul_signature_wins() {
        let text = "InfiLINK XG 1000 Diagnostic Card\n";
        assert_eq!(
            matching_signature(text),
            Some((Family::BackhaulRadio, "xg-1000"))
        );
        assert_eq!(
            matching_signature("InfiLINK XG Diagnostic Card\n"),
            Some((Family::BackhaulRadio, "xg"))
        );
    }

    #[test]
    fn banner_must_start_a_line() {
        assert_eq!(classify("see also: Quanta 70 manual"), None);
        assert_eq!(classify("notes\nQuanta 70 Diagnostic Card"), Some(Family::PtpRadio));
    }
}

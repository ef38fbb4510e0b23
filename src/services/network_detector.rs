//! Ghana mobile network detection
//!
//! Maps a local or international phone number to the carrier that owns its
//! operator prefix. Detection never fails: numbers that cannot be attributed
//! yield `None`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

const COUNTRY_CODE: &str = "233";
const NATIONAL_NUMBER_LEN: usize = 9;

const MTN_PREFIXES: [&str; 6] = ["24", "25", "53", "54", "55", "59"];
const TELECEL_PREFIXES: [&str; 2] = ["20", "50"];
const AIRTELTIGO_PREFIXES: [&str; 4] = ["26", "27", "56", "57"];

/// Mobile network operator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Carrier {
    Mtn,
    Telecel,
    AirtelTigo,
}

impl Carrier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Carrier::Mtn => "MTN",
            Carrier::Telecel => "TELECEL",
            Carrier::AirtelTigo => "AIRTELTIGO",
        }
    }

    pub fn all() -> [Carrier; 3] {
        [Carrier::Mtn, Carrier::Telecel, Carrier::AirtelTigo]
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Carrier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "MTN" => Ok(Carrier::Mtn),
            // Vodafone Ghana rebranded to Telecel
            "TELECEL" | "VODAFONE" => Ok(Carrier::Telecel),
            "AIRTELTIGO" | "AIRTEL_TIGO" | "AT" => Ok(Carrier::AirtelTigo),
            other => Err(format!("unsupported network: {}", other)),
        }
    }
}

/// Canonical `233XXXXXXXXX` form of a phone number.
///
/// Non-digits are stripped first. Numbers already carrying the country code are
/// kept, a leading trunk zero is replaced by the country code, and a bare
/// national number gets the country code prepended. Anything else is returned
/// as the stripped digit string.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.starts_with(COUNTRY_CODE) {
        digits
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("{}{}", COUNTRY_CODE, rest)
    } else if digits.len() == NATIONAL_NUMBER_LEN {
        format!("{}{}", COUNTRY_CODE, digits)
    } else {
        digits
    }
}

/// Detect the carrier owning the number's two-digit operator prefix
pub fn detect_network(phone: &str) -> Option<Carrier> {
    let normalized = normalize_phone(phone);
    let prefix = normalized.get(3..5)?;

    if MTN_PREFIXES.contains(&prefix) {
        Some(Carrier::Mtn)
    } else if TELECEL_PREFIXES.contains(&prefix) {
        Some(Carrier::Telecel)
    } else if AIRTELTIGO_PREFIXES.contains(&prefix) {
        Some(Carrier::AirtelTigo)
    } else {
        None
    }
}

fn ghana_phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\+?233|0)\d{9}$").expect("static phone pattern"))
}

/// Format check for Ghana numbers written as `0XXXXXXXXX`, `233XXXXXXXXX` or
/// `+233XXXXXXXXX`; spaces and dashes are ignored.
pub fn is_valid_ghana_phone(phone: &str) -> bool {
    let compact: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    ghana_phone_pattern().is_match(&compact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_local_and_international_forms() {
        assert_eq!(normalize_phone("0241234567"), "233241234567");
        assert_eq!(normalize_phone("+233 24 123 4567"), "233241234567");
        assert_eq!(normalize_phone("233241234567"), "233241234567");
        assert_eq!(normalize_phone("241234567"), "233241234567");
        assert_eq!(normalize_phone("024-123-4567"), "233241234567");
    }

    #[test]
    fn short_garbage_is_left_as_digits() {
        assert_eq!(normalize_phone("12ab34"), "1234");
        assert_eq!(normalize_phone(""), "");
    }

    #[test]
    fn detects_every_known_prefix() {
        for prefix in MTN_PREFIXES {
            assert_eq!(detect_network(&format!("0{}1234567", prefix)), Some(Carrier::Mtn));
        }
        for prefix in TELECEL_PREFIXES {
            assert_eq!(
                detect_network(&format!("0{}1234567", prefix)),
                Some(Carrier::Telecel)
            );
        }
        for prefix in AIRTELTIGO_PREFIXES {
            assert_eq!(
                detect_network(&format!("0{}1234567", prefix)),
                Some(Carrier::AirtelTigo)
            );
        }
    }

    #[test]
    fn unknown_prefixes_and_short_input_yield_none() {
        assert_eq!(detect_network("0281234567"), None);
        assert_eq!(detect_network("123"), None);
        assert_eq!(detect_network(""), None);
    }

    #[test]
    fn validates_ghana_phone_format() {
        assert!(is_valid_ghana_phone("0241234567"));
        assert!(is_valid_ghana_phone("+233241234567"));
        assert!(is_valid_ghana_phone("233 24 123 4567"));
        assert!(!is_valid_ghana_phone("024123456"));
        assert!(!is_valid_ghana_phone("08012345678"));
        assert!(!is_valid_ghana_phone("02412345ab"));
    }

    #[test]
    fn carrier_parsing_accepts_legacy_names() {
        assert_eq!("vodafone".parse::<Carrier>(), Ok(Carrier::Telecel));
        assert_eq!("AirtelTigo".parse::<Carrier>(), Ok(Carrier::AirtelTigo));
        assert!("glo".parse::<Carrier>().is_err());
    }

    #[test]
    fn carrier_serializes_uppercase() {
        let json = serde_json::to_string(&Carrier::AirtelTigo).unwrap();
        assert_eq!(json, "\"AIRTELTIGO\"");
    }
}

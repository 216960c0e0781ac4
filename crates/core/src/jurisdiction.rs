//! Indian state jurisdiction: GSTIN home-state lookup and destination-state
//! classification.
//!
//! Classification is total over the table and partial over everything else:
//! an unknown state yields `None`, never a default jurisdiction.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// (GST state code, abbreviation, canonical name)
const STATES: &[(&str, &str, &str)] = &[
    ("01", "JK", "JAMMU AND KASHMIR"),
    ("02", "HP", "HIMACHAL PRADESH"),
    ("03", "PB", "PUNJAB"),
    ("04", "CH", "CHANDIGARH"),
    ("05", "UK", "UTTARAKHAND"),
    ("06", "HR", "HARYANA"),
    ("07", "DL", "DELHI"),
    ("08", "RJ", "RAJASTHAN"),
    ("09", "UP", "UTTAR PRADESH"),
    ("10", "BR", "BIHAR"),
    ("11", "SK", "SIKKIM"),
    ("12", "AR", "ARUNACHAL PRADESH"),
    ("13", "NL", "NAGALAND"),
    ("14", "MN", "MANIPUR"),
    ("15", "MZ", "MIZORAM"),
    ("16", "TR", "TRIPURA"),
    ("17", "ML", "MEGHALAYA"),
    ("18", "AS", "ASSAM"),
    ("19", "WB", "WEST BENGAL"),
    ("20", "JH", "JHARKHAND"),
    ("21", "OR", "ODISHA"),
    ("22", "CG", "CHHATTISGARH"),
    ("23", "MP", "MADHYA PRADESH"),
    ("24", "GJ", "GUJARAT"),
    ("25", "DD", "DAMAN AND DIU"),
    ("26", "DN", "DADRA AND NAGAR HAVELI"),
    ("27", "MH", "MAHARASHTRA"),
    ("28", "AP", "ANDHRA PRADESH"),
    ("29", "KA", "KARNATAKA"),
    ("30", "GA", "GOA"),
    ("31", "LD", "LAKSHADWEEP"),
    ("32", "KL", "KERALA"),
    ("33", "TN", "TAMIL NADU"),
    ("34", "PY", "PUDUCHERRY"),
    ("35", "AN", "ANDAMAN AND NICOBAR ISLANDS"),
    ("36", "TG", "TELANGANA"),
    ("37", "AP", "ANDHRA PRADESH"),
    ("38", "LA", "LADAKH"),
];

/// Legacy or colloquial names seen in marketplace extracts.
const ALIASES: &[(&str, &str)] = &[
    ("ORISSA", "OR"),
    ("PONDICHERRY", "PY"),
    ("UTTARANCHAL", "UK"),
    ("NEW DELHI", "DL"),
    ("NCT OF DELHI", "DL"),
    ("JAMMU & KASHMIR", "JK"),
    ("ANDAMAN & NICOBAR ISLANDS", "AN"),
    ("DADRA & NAGAR HAVELI", "DN"),
    ("DAMAN & DIU", "DD"),
    ("TS", "TG"),
];

/// A classified state abbreviation (`"TN"`, `"MH"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateCode(String);

impl StateCode {
    /// Classify a raw destination state: an abbreviation, a full name, or a
    /// known alias, case- and whitespace-insensitive.
    pub fn classify(raw: &str) -> Option<StateCode> {
        let needle = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        if needle.is_empty() {
            return None;
        }

        STATES
            .iter()
            .find(|(_, abbr, name)| *abbr == needle || *name == needle)
            .map(|(_, abbr, _)| *abbr)
            .or_else(|| {
                ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == needle)
                    .map(|(_, abbr)| *abbr)
            })
            .map(|abbr| StateCode(abbr.to_string()))
    }

    /// Look up the state for a two-digit GST state code (`"33"` -> TN).
    pub fn from_gst_code(code: &str) -> Option<StateCode> {
        STATES
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, abbr, _)| StateCode((*abbr).to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for StateCode {}

impl core::fmt::Display for StateCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 15-character GST registration number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Gstin(String);

impl Gstin {
    pub const LEN: usize = 15;

    pub fn parse(raw: &str) -> DomainResult<Self> {
        let value = raw.trim().to_uppercase();
        if value.len() != Self::LEN || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::validation(format!(
                "gstin '{raw}' must be {} alphanumeric characters",
                Self::LEN
            )));
        }
        Ok(Self(value))
    }

    /// Home state encoded in the first two digits, if it is a known code.
    pub fn home_state(&self) -> Option<StateCode> {
        self.0.get(..2).and_then(StateCode::from_gst_code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Gstin {}

impl core::fmt::Display for Gstin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Gstin {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Gstin> for String {
    fn from(value: Gstin) -> Self {
        value.0
    }
}

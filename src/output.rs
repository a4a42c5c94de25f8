//! Result types handed back to the caller of a scan.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which of a patient's two insurance slots a card fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsuranceType {
    #[default]
    Primary,
    Secondary,
}

impl InsuranceType {
    /// Column that stores the card link for this slot.
    pub fn card_column(self) -> &'static str {
        match self {
            InsuranceType::Primary => "primary_insurance_card",
            InsuranceType::Secondary => "secondary_insurance_card",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InsuranceType::Primary => "primary",
            InsuranceType::Secondary => "secondary",
        }
    }
}

impl fmt::Display for InsuranceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsuranceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Ok(InsuranceType::Primary),
            "secondary" => Ok(InsuranceType::Secondary),
            other => Err(format!(
                "insurance type must be 'primary' or 'secondary', got '{other}'"
            )),
        }
    }
}

/// The five fields pulled off the front of a card.
///
/// Every field is always populated; absent values carry their defaults
/// (see [`crate::pipeline::extract`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFields {
    pub first_name: String,
    pub last_name: String,
    pub member_id: String,
    pub group_id: String,
    pub insurance_company: String,
}

impl CardFields {
    /// "First Last", used for display and file naming.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Outcome of one successful scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Reference URL of the stored PDF.
    pub link: String,
    /// Capitalized "First Last".
    pub full_name: String,
    pub fields: CardFields,
    /// Record the link was attached to, when one was supplied.
    pub insurance_id: Option<i64>,
    pub insurance_type: InsuranceType,
    /// True when the link was written to the database.
    pub persisted: bool,
    /// Pages in the assembled PDF.
    pub page_count: usize,
}

//! Field extraction: OCR text → [`CardFields`] via the LLM.
//!
//! The LLM is asked for five `Field Name: value` lines (see
//! [`crate::prompts`]). Parsing is deliberately forgiving: unknown lines are
//! skipped, keys are matched case-insensitively, and any field that is
//! missing or carries a "not found"-style token gets its default. The only
//! way this stage fails is the LLM call itself.

use crate::error::ScanError;
use crate::output::CardFields;
use crate::pipeline::postprocess::clean_response;
use crate::prompts::{extraction_request, EXTRACTION_SYSTEM_PROMPT};
use crate::services::TextCompleter;
use std::collections::HashMap;
use tracing::{debug, info};

/// Field names, in prompt order. Part of the LLM wire contract.
pub const FIELD_NAMES: [&str; 5] = [
    "Patient First Name",
    "Patient Last Name",
    "Member ID",
    "Group ID",
    "Insurance Company",
];

/// Values the model uses to say "not on the card". Compared lowercased and trimmed.
pub const ABSENT_VALUES: [&str; 5] = ["not found", "not provided", "not available", "n/a", ""];

/// One of the five extracted fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    FirstName,
    LastName,
    MemberId,
    GroupId,
    InsuranceCompany,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::FirstName,
        Field::LastName,
        Field::MemberId,
        Field::GroupId,
        Field::InsuranceCompany,
    ];

    /// Key as it appears in the LLM response.
    pub fn name(self) -> &'static str {
        match self {
            Field::FirstName => FIELD_NAMES[0],
            Field::LastName => FIELD_NAMES[1],
            Field::MemberId => FIELD_NAMES[2],
            Field::GroupId => FIELD_NAMES[3],
            Field::InsuranceCompany => FIELD_NAMES[4],
        }
    }

    /// Value used when the field is absent.
    pub fn default_value(self) -> &'static str {
        match self {
            Field::FirstName => "Friend",
            Field::LastName => "Unknown",
            Field::MemberId | Field::GroupId | Field::InsuranceCompany => "Not Found",
        }
    }

    /// Other spellings models commonly use for the same key (lowercase).
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::FirstName => &["first name", "patient first name"],
            Field::LastName => &["last name", "patient last name"],
            Field::MemberId => &["member id", "member number", "subscriber id"],
            Field::GroupId => &["group id", "group number", "group id/ group number", "group no"],
            Field::InsuranceCompany => &["insurance company", "insurance company name", "insurer"],
        }
    }

    fn from_key(key: &str) -> Option<Field> {
        let key = key.trim().to_lowercase();
        Field::ALL
            .into_iter()
            .find(|f| f.aliases().iter().any(|a| *a == key))
    }
}

/// True if `value` is one of the "absent" tokens.
pub fn is_absent(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    ABSENT_VALUES.contains(&v.as_str())
}

/// Split every `key: value` line on its first colon.
///
/// Lines without a colon or with an empty key are ignored. Later duplicates
/// overwrite earlier ones.
pub fn parse_lines(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Capitalize each word: first letter upper, rest lower.
///
/// Words are split on spaces and hyphens, which are kept.
pub fn capitalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;
    for ch in name.trim().chars() {
        if ch.is_whitespace() || ch == '-' {
            out.push(ch);
            at_word_start = true;
        } else if at_word_start {
            out.extend(ch.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Turn a raw LLM response into a complete record.
pub fn parse_fields(response: &str) -> CardFields {
    let cleaned = clean_response(response);
    let mut found: HashMap<Field, String> = HashMap::new();
    for (key, value) in parse_lines(&cleaned) {
        if let Some(field) = Field::from_key(&key) {
            found.insert(field, value);
        }
    }

    let value_of = |field: Field| -> String {
        match found.get(&field) {
            Some(v) if !is_absent(v) => v.clone(),
            _ => {
                debug!("{} absent, using default '{}'", field.name(), field.default_value());
                field.default_value().to_string()
            }
        }
    };

    CardFields {
        first_name: capitalize_name(&value_of(Field::FirstName)),
        last_name: capitalize_name(&value_of(Field::LastName)),
        member_id: value_of(Field::MemberId),
        group_id: value_of(Field::GroupId),
        insurance_company: value_of(Field::InsuranceCompany),
    }
}

/// Ask the LLM for the card fields and parse its answer.
pub async fn extract_fields(
    completer: &dyn TextCompleter,
    ocr_text: &str,
) -> Result<CardFields, ScanError> {
    let request = extraction_request(ocr_text);
    let response = completer
        .complete(EXTRACTION_SYSTEM_PROMPT, &request)
        .await?;
    debug!("LLM response: {} chars", response.len());

    let fields = parse_fields(&response);
    info!("Extracted fields for {}", fields.full_name());
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn defaults() -> CardFields {
        CardFields {
            first_name: "Friend".into(),
            last_name: "Unknown".into(),
            member_id: "Not Found".into(),
            group_id: "Not Found".into(),
            insurance_company: "Not Found".into(),
        }
    }

    #[test]
    fn empty_response_gives_all_defaults() {
        assert_eq!(parse_fields(""), defaults());
    }

    #[test]
    fn unrelated_text_gives_all_defaults() {
        assert_eq!(
            parse_fields("I could not read this card.\nSorry!"),
            defaults()
        );
    }

    #[test]
    fn first_name_is_capitalized() {
        let f = parse_fields("Patient First Name: jane");
        assert_eq!(f.first_name, "Jane");
        assert_eq!(f.last_name, "Unknown");
    }

    #[test]
    fn full_response_parses() {
        let response = "Patient First Name: JANE\n\
                        Patient Last Name: o'neil-smith\n\
                        Member ID: W123456789\n\
                        Group ID: 00421\n\
                        Insurance Company: Blue Cross Blue Shield";
        let f = parse_fields(response);
        assert_eq!(f.first_name, "Jane");
        assert_eq!(f.last_name, "O'neil-Smith");
        assert_eq!(f.member_id, "W123456789");
        assert_eq!(f.group_id, "00421");
        assert_eq!(f.insurance_company, "Blue Cross Blue Shield");
    }

    #[test]
    fn absent_synonyms_use_defaults() {
        let response = "Patient First Name: N/A\n\
                        Patient Last Name: not provided\n\
                        Member ID: NOT AVAILABLE\n\
                        Group ID:\n\
                        Insurance Company: Not Found";
        assert_eq!(parse_fields(response), defaults());
    }

    #[test]
    fn keys_are_case_insensitive_and_aliased() {
        let f = parse_fields("member id: A1\nGROUP NUMBER: G2\ninsurance company name: Aetna");
        assert_eq!(f.member_id, "A1");
        assert_eq!(f.group_id, "G2");
        assert_eq!(f.insurance_company, "Aetna");
    }

    #[test]
    fn value_keeps_colons_after_the_first() {
        let f = parse_fields("Insurance Company: UHC: Choice Plus");
        assert_eq!(f.insurance_company, "UHC: Choice Plus");
    }

    #[test]
    fn decorated_response_is_cleaned_first() {
        let f = parse_fields("```\n- **Patient First Name:** jane\n- **Member ID:** X9\n```");
        assert_eq!(f.first_name, "Jane");
        assert_eq!(f.member_id, "X9");
    }

    #[test]
    fn parse_lines_ignores_non_matching() {
        let map = parse_lines("no colon here\n: empty key\nKey: v");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Key").map(String::as_str), Some("v"));
    }

    #[test]
    fn capitalize_handles_words_and_hyphens() {
        assert_eq!(capitalize_name("mary ann"), "Mary Ann");
        assert_eq!(capitalize_name("JEAN-LUC"), "Jean-Luc");
        assert_eq!(capitalize_name("  jane  "), "Jane");
        assert_eq!(capitalize_name(""), "");
    }

    struct Scripted {
        reply: Result<String, String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextCompleter for Scripted {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, ScanError> {
            self.seen.lock().unwrap().push(user.to_string());
            self.reply.clone().map_err(ScanError::Extraction)
        }
    }

    #[tokio::test]
    async fn extract_fields_sends_ocr_text() {
        let llm = Scripted {
            reply: Ok("Patient First Name: jane\nPatient Last Name: doe".into()),
            seen: Mutex::new(Vec::new()),
        };
        let f = extract_fields(&llm, "MEMBER: JANE DOE").await.unwrap();
        assert_eq!(f.full_name(), "Jane Doe");
        assert!(llm.seen.lock().unwrap()[0].contains("MEMBER: JANE DOE"));
    }

    #[tokio::test]
    async fn extract_fields_surfaces_llm_error() {
        let llm = Scripted {
            reply: Err("503 from provider".into()),
            seen: Mutex::new(Vec::new()),
        };
        let err = extract_fields(&llm, "text").await.unwrap_err();
        assert!(matches!(err, ScanError::Extraction(_)));
    }
}
